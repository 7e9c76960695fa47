/// Canonical serialization of proof types.
///
/// Anything that gets hashed or signed goes through this trait so that both
/// parties agree on the exact bytes.
pub(crate) trait CanonicalSerialize {
    /// Serializes the type.
    fn serialize(&self) -> Vec<u8>;
}

impl<T> CanonicalSerialize for T
where
    T: serde::Serialize,
{
    fn serialize(&self) -> Vec<u8> {
        // BCS only fails on container depth or sequence length limits, neither
        // of which our types can reach.
        bcs::to_bytes(self).expect("type should be bcs serializable")
    }
}

/// A type with a domain separator which prefixes its canonical serialization
/// during hashing.
pub(crate) trait DomainSeparator {
    /// Returns the domain separator for the type.
    fn domain(&self) -> &[u8];
}

macro_rules! impl_domain_separator {
    ($type:ty) => {
        impl $crate::serialize::DomainSeparator for $type {
            fn domain(&self) -> &[u8] {
                use std::sync::LazyLock;

                // 16 byte hash of the qualified type name.
                static DOMAIN: LazyLock<[u8; 16]> = LazyLock::new(|| {
                    let domain: [u8; 32] =
                        blake3::hash(concat!("tlsproof::", stringify!($type)).as_bytes()).into();
                    let mut separator = [0u8; 16];
                    separator.copy_from_slice(&domain[..16]);
                    separator
                });

                &*DOMAIN
            }
        }
    };
}

pub(crate) use impl_domain_separator;
