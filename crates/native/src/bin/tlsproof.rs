use std::{error::Error, path::PathBuf};

use clap::Parser;
use tlsproof_core::signing::VerifyingKey;
use tlsproof_native::{prove_notarized_with, NotaryDialer, ProveOptions};
use tracing_subscriber::EnvFilter;

/// Produces a notarized proof of an HTTPS response.
#[derive(Debug, Parser)]
#[command(name = "tlsproof", version)]
struct Args {
    /// Host of the Notary.
    #[arg(long)]
    notary: String,
    /// Port of the Notary.
    #[arg(long, default_value_t = 443)]
    notary_port: u16,
    /// Connect to the Notary without TLS.
    #[arg(long)]
    no_notary_tls: bool,
    /// PEM file with the public key the Notary must sign with.
    #[arg(long)]
    notary_key: Option<PathBuf>,
    /// Domain of the server.
    domain: String,
    /// Target of the request.
    #[arg(default_value = "/")]
    uri: String,
    /// Output file. The artifact is printed as hex if not set.
    #[arg(long, short)]
    out: Option<PathBuf>,
    /// File to save the notarization to, for disclosing other ranges later.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut options = ProveOptions::builder();
    options
        .notary_host(args.notary)
        .notary_port(args.notary_port)
        .notary_tls(!args.no_notary_tls)
        .domain(args.domain)
        .uri(args.uri);
    if let Some(path) = args.notary_key {
        let pem = std::fs::read_to_string(path)?;
        options.notary_key(VerifyingKey::from_public_key_pem(&pem)?);
    }
    let options = options.build()?;

    let dialer = NotaryDialer::new(&options)?;
    let proof = prove_notarized_with(&options, &dialer)?;
    let artifact = proof.artifact;

    if let Some(path) = args.save {
        std::fs::write(path, &proof.notarization)?;
    }

    match args.out {
        Some(path) => std::fs::write(path, &artifact)?,
        None => println!("{}", hex::encode(&artifact)),
    }

    Ok(())
}
