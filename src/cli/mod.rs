use clap::Parser;
use std::path::PathBuf;

pub mod config;
pub mod run;

#[derive(Parser, Debug)]
#[command(name = "claimchat")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Presence and chat over NATS with signed claims", long_about = None)]
pub struct Cli {
    /// NATS server URL (default: connect.ngs.global, or [server] url from config)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Display name (default: first word of the name in the user JWT)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Credentials file holding the user JWT and nkey seed
    #[arg(long)]
    pub creds: Option<PathBuf>,

    /// Path to config file (default: ~/.config/claimchat/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use an in-process bus instead of connecting to a server
    #[arg(long)]
    pub local: bool,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    run::execute(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_all_flags() {
        let cli = Cli::parse_from([
            "claimchat",
            "-s",
            "nats://localhost:4222",
            "-n",
            "alice",
            "--creds",
            "/tmp/user.creds",
            "--config",
            "/tmp/config.toml",
            "--local",
        ]);

        assert_eq!(cli.server.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(cli.name.as_deref(), Some("alice"));
        assert_eq!(cli.creds, Some(PathBuf::from("/tmp/user.creds")));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert!(cli.local);
    }

    #[test]
    fn test_cli_parse_long_flags() {
        let cli = Cli::parse_from(["claimchat", "--server", "demo.nats.io", "--name", "bob"]);
        assert_eq!(cli.server.as_deref(), Some("demo.nats.io"));
        assert_eq!(cli.name.as_deref(), Some("bob"));
        assert!(cli.creds.is_none());
        assert!(!cli.local);
    }

    #[test]
    fn test_cli_rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["claimchat", "--bogus"]).is_err());
    }
}
