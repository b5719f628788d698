//! sway-ipc CLI
//!
//! Query and control a running sway session over its IPC socket.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::Value;
use sway_ipc::{EventKind, SwayClient};
use sway_ipc_config::{Config, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "sway-ipc")]
#[command(about = "Talk to sway over its IPC socket")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Socket path (overrides config and $SWAYSOCK)
    #[arg(short, long)]
    socket: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run sway commands, e.g. `command workspace 2`
    Command {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// List workspaces
    Workspaces,

    /// List outputs
    Outputs,

    /// Print the layout tree
    Tree,

    /// List window marks
    Marks,

    /// Show a bar's configuration
    BarConfig {
        /// Bar id; defaults to the first configured bar
        id: Option<String>,
    },

    /// List configured bar ids
    BarIds,

    /// Show the compositor version
    Version,

    /// List binding modes
    BindingModes,

    /// Print the loaded compositor config
    Config,

    /// Broadcast a tick event to subscribers
    Tick {
        #[arg(default_value = "")]
        payload: String,
    },

    /// Send a sync request
    Sync,

    /// Show the active binding mode
    BindingState,

    /// List input devices
    Inputs,

    /// List seats
    Seats,

    /// Print events as JSON lines until interrupted
    Subscribe {
        /// Event names; defaults to the config's `subscribe` list
        events: Vec<EventKind>,
    },

    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    if let Commands::Validate = cli.command {
        init_tracing(sway_ipc_config::LogLevel::default());
        return cmd_validate(&config_path);
    }

    let config = sway_ipc_config::load_config(&config_path)?;
    init_tracing(config.global.log_level);

    let socket = resolve_socket(cli.socket.as_deref(), &config)?;
    let client = SwayClient::with_config(config.client_config(socket));
    tracing::debug!("Using socket {}", client.socket_path().display());

    run(cli.command, &client, &config)
        .await
        .map_err(|e| miette::miette!("{:#}", e))
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(level: sway_ipc_config::LogLevel) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter())),
        )
        .init();
}

/// Pick the socket path: `--socket`, then the config file, then the environment
fn resolve_socket(flag: Option<&str>, config: &Config) -> miette::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(shellexpand::tilde(path).into_owned().into());
    }
    if let Some(path) = &config.global.socket {
        return Ok(path.clone());
    }
    sway_ipc::get_socket_path().map_err(|e| {
        miette::miette!(
            help = "Run inside a sway session or pass --socket",
            "{}",
            e
        )
    })
}

async fn run(command: Commands, client: &SwayClient, config: &Config) -> anyhow::Result<()> {
    let reply = match command {
        Commands::Command { words } => {
            let command = words.join(" ");
            let reply = client
                .run_command(&command)
                .await
                .with_context(|| format!("Failed to run command `{}`", command))?;
            print_json(&reply)?;
            return check_command_results(&reply);
        }
        Commands::Workspaces => client.get_workspaces().await.context("Failed to get workspaces")?,
        Commands::Outputs => client.get_outputs().await.context("Failed to get outputs")?,
        Commands::Tree => client.get_tree().await.context("Failed to get tree")?,
        Commands::Marks => client.get_marks().await.context("Failed to get marks")?,
        Commands::BarIds => client
            .get_bar_config_ids()
            .await
            .context("Failed to get bar ids")?,
        Commands::BarConfig { id } => client
            .get_bar_config(id.as_deref())
            .await
            .context("Failed to get bar config")?
            .context("No bars configured")?,
        Commands::Version => client.get_version().await.context("Failed to get version")?,
        Commands::BindingModes => client
            .get_binding_modes()
            .await
            .context("Failed to get binding modes")?,
        Commands::Config => client.get_config().await.context("Failed to get config")?,
        Commands::Tick { payload } => client.send_tick(&payload).await.context("Failed to send tick")?,
        Commands::Sync => client.sync().await.context("Failed to sync")?,
        Commands::BindingState => client
            .get_binding_state()
            .await
            .context("Failed to get binding state")?,
        Commands::Inputs => client.get_inputs().await.context("Failed to get inputs")?,
        Commands::Seats => client.get_seats().await.context("Failed to get seats")?,
        Commands::Subscribe { events } => {
            let events = if events.is_empty() {
                config.subscribe.clone()
            } else {
                events
            };
            return cmd_subscribe(client, &events).await;
        }
        Commands::Validate => anyhow::bail!("validate does not talk to sway"),
    };

    print_json(&reply)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to format reply")?;
    println!("{}", text);
    Ok(())
}

/// A `RUN_COMMAND` reply is a list of `{"success": bool, "error"?: str}`;
/// fail if any command failed
fn check_command_results(reply: &Value) -> anyhow::Result<()> {
    let failures: Vec<String> = reply
        .as_array()
        .into_iter()
        .flatten()
        .filter(|r| r.get("success").and_then(Value::as_bool) == Some(false))
        .map(|r| {
            r.get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string()
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Command failed: {}", failures.join("; "))
    }
}

async fn cmd_subscribe(client: &SwayClient, events: &[EventKind]) -> anyhow::Result<()> {
    if events.is_empty() {
        anyhow::bail!("No events given and no `subscribe` list in the config file");
    }

    let mut subscription = client
        .subscribe(events)
        .await
        .context("Failed to subscribe")?;
    tracing::info!("Subscribed to {} event type(s)", events.len());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, closing subscription");
                subscription.cancel();
                break;
            }
            event = subscription.next() => {
                let Some(event) = event else {
                    tracing::info!("Event stream ended");
                    break;
                };
                let line = serde_json::to_string(&event).context("Failed to format event")?;
                println!("{}", line);
            }
        }
    }

    Ok(())
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = sway_ipc_config::parse_config(config_path)?;

    println!("Configuration is valid!");
    match &config.global.socket {
        Some(socket) => println!("  Socket: {}", socket.display()),
        None => println!("  Socket: from $SWAYSOCK"),
    }
    println!("  Log level: {}", config.global.log_level.as_filter());
    println!("  Connect retries: {}", config.global.connect_retries);
    match config.global.reply_timeout_ms {
        Some(ms) => println!("  Reply timeout: {}ms", ms),
        None => println!("  Reply timeout: none"),
    }
    if !config.subscribe.is_empty() {
        let names: Vec<&str> = config.subscribe.iter().map(|k| k.name()).collect();
        println!("  Subscribe: {}", names.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_command_words_are_joined() {
        let cli = Cli::parse_from(["sway-ipc", "command", "workspace", "2"]);
        match cli.command {
            Commands::Command { words } => assert_eq!(words.join(" "), "workspace 2"),
            other => panic!("Expected Command, got: {:?}", other),
        }
    }

    #[test]
    fn test_command_accepts_hyphen_words() {
        let cli = Cli::parse_from(["sway-ipc", "command", "exec", "foot", "--server"]);
        match cli.command {
            Commands::Command { words } => assert_eq!(words, ["exec", "foot", "--server"]),
            other => panic!("Expected Command, got: {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_parses_event_names() {
        let cli = Cli::parse_from(["sway-ipc", "subscribe", "window", "Workspace"]);
        match cli.command {
            Commands::Subscribe { events } => {
                assert_eq!(events, vec![EventKind::Window, EventKind::Workspace])
            }
            other => panic!("Expected Subscribe, got: {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_rejects_unknown_event() {
        assert!(Cli::try_parse_from(["sway-ipc", "subscribe", "focus"]).is_err());
    }

    #[test]
    fn test_config_default_path() {
        let cli = Cli::parse_from(["sway-ipc", "version"]);
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        assert!(cli.socket.is_none());
    }

    #[test]
    fn test_socket_flag_wins() {
        let mut config = Config::default();
        config.global.socket = Some(PathBuf::from("/from/config.sock"));

        let path = resolve_socket(Some("/from/flag.sock"), &config).unwrap();
        assert_eq!(path, PathBuf::from("/from/flag.sock"));
    }

    #[test]
    fn test_socket_from_config() {
        let mut config = Config::default();
        config.global.socket = Some(PathBuf::from("/from/config.sock"));

        let path = resolve_socket(None, &config).unwrap();
        assert_eq!(path, PathBuf::from("/from/config.sock"));
    }

    #[test]
    fn test_command_results_success() {
        let reply = json!([{"success": true}, {"success": true}]);
        assert!(check_command_results(&reply).is_ok());
    }

    #[test]
    fn test_command_results_failure() {
        let reply = json!([
            {"success": true},
            {"success": false, "parse_error": true, "error": "Unknown command"}
        ]);

        let err = check_command_results(&reply).unwrap_err();
        assert!(err.to_string().contains("Unknown command"));
    }
}
