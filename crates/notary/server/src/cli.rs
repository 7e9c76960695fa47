use clap::Parser;

/// Fields loaded from the command line when launching this server.
#[derive(Clone, Debug, Parser)]
#[command(name = "notary-server", version, about = "Notary server for tlsproof")]
pub struct CliFields {
    /// Configuration file location. Without it the defaults apply, overridden
    /// by `NS_` environment variables.
    #[arg(long)]
    pub config: Option<String>,
}
