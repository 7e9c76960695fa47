//! Common code shared between `tlsproof-prover` and `tlsproof-verifier`.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod config;
pub mod error;
pub mod mirror;
pub mod msgs;

use tokio::io::{AsyncRead, AsyncWrite};

/// An IO object a session can run over.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A message channel over a boxed IO object.
pub type IoChannel = channel::Channel<Box<dyn Io>>;
