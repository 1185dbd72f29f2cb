use super::config::{ChatConfig, LoggingConfig};
use super::Cli;
use claimchat::bus::{MemoryBus, MessageBus, NatsBus};
use claimchat::coordinator::Coordinator;
use claimchat::directory::{short_subject, View};
use claimchat::identity::{display_name, Identity};
use claimchat::session::{Session, SessionConfig};
use claimchat::ui::console::{render_loop, run_input, stdin_lines};
use claimchat::ui::ConsoleUi;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Run a chat session
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided (must exist)
/// 2. Default config at `~/.config/claimchat/config.toml` if present
/// 3. Built-in defaults
///
/// `--server`, `--name` and `--local` override the file.
///
/// ## Shutdown
///
/// `/quit`, end of input and Ctrl-C end the session normally. The bus
/// closing underneath us is an error.
pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let creds = cli
        .creds
        .clone()
        .ok_or("Missing credentials: pass --creds <FILE>")?;

    let config = ChatConfig::load_or_default(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    let identity = Identity::load(&creds)?;
    let name = resolve_name(cli.name.as_deref(), &identity);
    let session_config = config.session_config()?;
    info!(subject = %identity.subject(), %name, "identity loaded");

    if cli.local {
        println!("Using in-process bus (messages stay on this machine)");
        return chat(identity, &name, MemoryBus::new().with_no_echo(), session_config).await;
    }

    let server = cli.server.unwrap_or(config.server.url);
    println!("Connecting to {}...", server);
    let bus = NatsBus::connect(&server, &creds).await?;
    chat(identity, &name, bus, session_config).await
}

/// `--name` if given, else the claim name, else the short subject.
///
/// Names are normalized the way peers normalize our presence, so we see
/// ourselves under the name everyone else sees.
fn resolve_name(flag: Option<&str>, identity: &Identity) -> String {
    [flag.unwrap_or_default(), identity.claim_name()]
        .into_iter()
        .map(display_name)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| short_subject(identity.subject()).to_string())
}

fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| format!("Invalid log level '{}': {}", config.level, e))?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if let Err(e) = installed {
        // Only happens when a subscriber is already set, e.g. under test.
        debug!("Logging already initialized: {}", e);
    }
    Ok(())
}

async fn chat<B: MessageBus>(
    identity: Identity,
    name: &str,
    bus: B,
    config: SessionConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let first_channel = config.channels.first().cloned();
    let session = Arc::new(Session::new(identity, name, bus, config));
    let (ui, updates) = ConsoleUi::new();
    let coordinator = Coordinator::new(session.clone(), ui.clone());

    // Subscribe before the first announcement so replies to it are not missed.
    let mut inbound = coordinator.subscribe_all().await?;
    let presence = coordinator.presence().clone().spawn();
    let renderer = tokio::spawn(render_loop(updates, tokio::io::stdout()));

    ui.notice(format!(
        "Signed in as {} ({}). Type /help for commands.",
        name,
        short_subject(session.subject())
    ));
    if let Some(channel) = first_channel {
        let view = View::Channel(channel);
        ui.set_view(Some(view.clone()));
        coordinator.show(&view);
    }

    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        _ = run_input(&coordinator, &ui, stdin_lines()) => Ok(()),
        _ = tokio::signal::ctrl_c() => Ok(()),
        _ = &mut inbound => Err("Connection to the message bus closed".into()),
    };

    info!("shutting down");
    presence.abort();
    inbound.abort();
    renderer.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimchat::claims::{self, Claim};
    use claimchat::crypto::{nkey::encode_seed, KeyPair, KeyRole};
    use claimchat::identity::format_bundle;
    use clap::Parser;
    use tempfile::TempDir;

    fn identity_named(name: &str) -> Identity {
        let seed = [7u8; 32];
        let user = KeyPair::from_raw_seed(KeyRole::User, &seed).unwrap();
        let account = KeyPair::generate(KeyRole::Account).unwrap();
        let claim = Claim {
            jti: "run-test".to_string(),
            sub: user.public_key().to_string(),
            name: name.to_string(),
            claim_type: "user".to_string(),
            ..Default::default()
        };
        let jwt = claims::encode(&claim, &account).unwrap();
        let bundle = format_bundle(&jwt, &encode_seed(KeyRole::User, &seed));
        Identity::from_bundle(bundle.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_run_without_creds_fails() {
        let cli = Cli::parse_from(["claimchat", "--local"]);
        let err = execute(cli).await.unwrap_err();
        assert!(err.to_string().contains("--creds"));
    }

    #[tokio::test]
    async fn test_run_with_unreadable_creds_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "").unwrap();
        let creds = temp_dir.path().join("missing.creds");

        let cli = Cli::parse_from([
            "claimchat",
            "--local",
            "--config",
            config_path.to_str().unwrap(),
            "--creds",
            creds.to_str().unwrap(),
        ]);
        let err = execute(cli).await.unwrap_err();
        assert!(err.to_string().contains("Could not read credentials"));
    }

    #[test]
    fn test_resolve_name() {
        let identity = identity_named("Alice Example");
        assert_eq!(resolve_name(None, &identity), "alice");
        assert_eq!(resolve_name(Some("  "), &identity), "alice");
        assert_eq!(resolve_name(Some("Ally"), &identity), "ally");
        assert_eq!(resolve_name(Some("  Bob Stone"), &identity), "bob");

        let nameless = identity_named("");
        assert_eq!(
            resolve_name(None, &nameless),
            short_subject(nameless.subject())
        );
        assert_eq!(resolve_name(Some("Ally"), &nameless), "ally");
    }

    #[test]
    fn test_name_flag_matches_what_peers_see() {
        let identity = identity_named("Alice Example");
        let flag = "Alice Smith";
        assert_eq!(resolve_name(Some(flag), &identity), display_name(flag));
        assert_eq!(resolve_name(Some(flag), &identity), "alice");
    }
}
