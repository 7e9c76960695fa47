use clap::Parser;
use eyre::{eyre, Result};
use notary_server::{init_tracing, run_server, CliFields, NotaryServerProperties};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_fields = CliFields::parse();

    let config = NotaryServerProperties::new(&cli_fields)
        .map_err(|err| eyre!("Failed to load config: {}", err))?;

    init_tracing(&config).map_err(|err| eyre!("Failed to set up tracing: {err}"))?;

    debug!("Server config loaded: \n{}", config);

    run_server(&config).await?;

    Ok(())
}
