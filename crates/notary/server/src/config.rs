use config::{Config, Environment};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    util::{parse_config_file, prepend_file_path},
    CliFields,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotaryServerProperties {
    pub host: String,
    pub port: u16,
    /// Static html response returned from the root endpoint "/". The
    /// placeholders {version} and {public_key} are replaced in server.rs.
    pub html_info: String,
    /// The maximum number of concurrent notarization sessions
    pub concurrency: usize,
    /// Seconds a client is asked to wait when all sessions are taken
    pub retry_after: u64,
    /// Setting for notarization
    pub notarization: NotarizationProperties,
    /// Setting for TLS connection between prover and notary
    pub tls: TLSProperties,
    /// Setting for logging
    pub log: LogProperties,
}

impl NotaryServerProperties {
    pub fn new(cli_fields: &CliFields) -> Result<Self> {
        // Uses config file if given.
        if let Some(config_path) = &cli_fields.config {
            let mut config: NotaryServerProperties = parse_config_file(config_path)?;

            // Relative paths in the config file are relative to its directory.
            let parent_dir = Path::new(config_path)
                .parent()
                .ok_or(eyre!("Failed to get parent directory of config file"))?
                .to_str()
                .ok_or_else(|| eyre!("Failed to convert path to str"))?
                .to_string();

            if let Some(path) = &config.notarization.private_key_path {
                config.notarization.private_key_path = Some(prepend_file_path(path, &parent_dir)?);
            }
            if let Some(path) = &config.tls.private_key_path {
                config.tls.private_key_path = Some(prepend_file_path(path, &parent_dir)?);
            }
            if let Some(path) = &config.tls.certificate_path {
                config.tls.certificate_path = Some(prepend_file_path(path, &parent_dir)?);
            }

            Ok(config)
        } else {
            let default_config = Config::try_from(&NotaryServerProperties::default())?;

            let config = Config::builder()
                .add_source(default_config)
                // Environment variables with a prefix of NS, e.g. NS_PORT or
                // NS_NOTARIZATION__MAX_SENT_DATA.
                .add_source(
                    Environment::with_prefix("NS")
                        .try_parsing(true)
                        .prefix_separator("_")
                        .separator("__"),
                )
                .build()?
                .try_deserialize()?;

            Ok(config)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotarizationProperties {
    /// Global limit for maximum number of bytes that can be sent
    pub max_sent_data: usize,
    /// Global limit for maximum number of bytes that can be received
    pub max_recv_data: usize,
    /// Seconds a notarization may take before it is dropped
    pub timeout: u64,
    /// File path of private key (in PEM format) used to sign attestations
    pub private_key_path: Option<String>,
    /// Signature algorithm used to generate a random private key when
    /// private_key_path is not set
    pub signature_algorithm: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TLSProperties {
    /// Flag to turn on/off TLS between prover and notary. Turn it off only
    /// when TLS terminates in front of the server or for local testing.
    pub enabled: bool,
    /// File path of TLS private key (in PEM format)
    pub private_key_path: Option<String>,
    /// File path of TLS cert (in PEM format)
    pub certificate_path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogProperties {
    /// Log verbosity level of the default filtering logic, which is
    /// notary_server=<level>,tlsproof_verifier=<level>
    pub level: String,
    /// Custom filtering logic in `EnvFilter` syntax, overrides the level
    pub filter: Option<String>,
    /// Log format. Available options are "COMPACT" and "JSON"
    pub format: LogFormat,
}

impl Default for NotaryServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7047,
            html_info: r#"
                <head>
                    <meta charset='UTF-8'>
                    <meta name='viewport' content='width=device-width, initial-scale=1.0'>
                </head>
                <body>
                    <h1>Notary Server {version}</h1>
                    <ul>
                    <li>public key: <pre>{public_key}</pre></li>
                    <li><a href='healthcheck'>health check</a></li>
                    <li><a href='info'>info</a></li>
                    </ul>
                </body>
            "#
            .to_string(),
            concurrency: 32,
            retry_after: 5,
            notarization: Default::default(),
            tls: Default::default(),
            log: Default::default(),
        }
    }
}

impl Default for NotarizationProperties {
    fn default() -> Self {
        Self {
            max_sent_data: 1 << 12,
            max_recv_data: 1 << 14,
            timeout: 1800,
            private_key_path: None,
            signature_algorithm: "secp256k1".to_string(),
        }
    }
}

impl Default for LogProperties {
    fn default() -> Self {
        Self {
            level: "DEBUG".to_string(),
            filter: None,
            format: LogFormat::Compact,
        }
    }
}

impl std::fmt::Display for NotaryServerProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "host: {}", self.host)?;
        writeln!(f, "port: {}", self.port)?;
        writeln!(f, "concurrency: {}", self.concurrency)?;
        writeln!(f, "retry_after: {}", self.retry_after)?;
        writeln!(f, "notarization: \n{}", self.notarization)?;
        writeln!(f, "tls: \n{}", self.tls)?;
        write!(f, "log: \n{}", self.log)
    }
}

impl std::fmt::Display for NotarizationProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   max_sent_data: {}", self.max_sent_data)?;
        writeln!(f, "   max_recv_data: {}", self.max_recv_data)?;
        writeln!(f, "   timeout: {}", self.timeout)?;
        writeln!(f, "   private_key_path: {:?}", self.private_key_path)?;
        write!(f, "   signature_algorithm: {}", self.signature_algorithm)
    }
}

impl std::fmt::Display for TLSProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   enabled: {}", self.enabled)?;
        writeln!(f, "   private_key_path: {:?}", self.private_key_path)?;
        write!(f, "   certificate_path: {:?}", self.certificate_path)
    }
}

impl std::fmt::Display for LogProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   level: {}", self.level)?;
        writeln!(f, "   filter: {:?}", self.filter)?;
        write!(f, "   format: {:?}", self.format)
    }
}
