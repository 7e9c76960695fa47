//! Hosted notary for notarized TLS proofs.
//!
//! Serves the notary HTTP API: a client opens a session with `POST /session`
//! and upgrades `GET /notarize` to a raw connection over which the
//! [`tlsproof_verifier::Verifier`] runs.

mod cli;
mod config;
mod error;
mod server;
mod server_tracing;
mod service;
mod signing;
mod types;
mod util;

pub use cli::CliFields;
pub use crate::config::{
    LogFormat, LogProperties, NotarizationProperties, NotaryServerProperties, TLSProperties,
};
pub use error::NotaryServerError;
pub use server::{run_server, serve};
pub use server_tracing::init_tracing;
pub use signing::AttestationKey;
pub use util::parse_config_file;
