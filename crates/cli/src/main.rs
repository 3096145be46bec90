use clap::{Parser, Subcommand, ValueEnum};
use lib::binding::{AuthPrompt, BindingContext, BindingManager, BindingUi, ServiceIdentity};
use lib::channels::{read_frame, write_frame, BridgeAuthenticator};
use lib::config;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(name = "ponte")]
#[command(about = "Ponte agent-interoperability gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UiMode {
    /// Human-readable output on stdout.
    Terminal,
    /// JSON transition events on stdout, for an embedding web front-end.
    Web,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (peer HTTP/WS server plus the local socket listener).
    Gateway {
        /// Config file path (default: PONTE_CONFIG_PATH or ~/.ponte/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Peer HTTP/WS port (default from config or 7410)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Bind a channel: run the onboarding auth state machine against its
    /// bridge, then exit 0 on success or 1 on any auth failure or timeout.
    Bind {
        /// Channel type to onboard (e.g. whatsapp, signal)
        channel_type: String,

        /// Config file path (default: PONTE_CONFIG_PATH or ~/.ponte/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Bridge base URL (default from config channels.bridge.baseUrl)
        #[arg(long, value_name = "URL")]
        bridge_url: Option<String>,

        /// Overall timeout in seconds (default from config or 300)
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,

        /// How binding progress is rendered
        #[arg(long, value_enum, default_value_t = UiMode::Terminal)]
        ui: UiMode,
    },

    /// Chat with the gateway over the local socket protocol (interactive).
    Chat {
        /// Gateway socket host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Gateway socket port (default 7411)
        #[arg(long, default_value_t = 7411)]
        port: u16,
    },
}

/// Prints binding transitions and auth prompts to the terminal.
struct TerminalBindingUi;

#[async_trait::async_trait]
impl BindingUi for TerminalBindingUi {
    async fn render(
        &self,
        ctx: &BindingContext,
        prompt: Option<&AuthPrompt>,
    ) -> anyhow::Result<()> {
        println!("[{}] state: {:?}", ctx.channel_type, ctx.status);
        if let Some(p) = prompt {
            println!("\n{}\n", p.instructions);
            if let Some(qr) = p.data.get("qr").and_then(|v| v.as_str()) {
                println!("QR payload: {}\n", qr);
            }
        }
        Ok(())
    }
}

/// Emits one JSON event per transition, for a web front-end driving the bind.
struct WebBindingUi;

#[async_trait::async_trait]
impl BindingUi for WebBindingUi {
    async fn render(
        &self,
        ctx: &BindingContext,
        prompt: Option<&AuthPrompt>,
    ) -> anyhow::Result<()> {
        let event = serde_json::json!({
            "channelType": ctx.channel_type,
            "status": ctx.status,
            "prompt": prompt,
            "error": ctx.error,
        });
        println!("{}", event);
        Ok(())
    }
}

async fn run_bind(
    channel_type: String,
    config_path: Option<std::path::PathBuf>,
    bridge_url: Option<String>,
    timeout_secs: Option<u64>,
    ui: UiMode,
) -> anyhow::Result<()> {
    let (config, _path) = config::load_config(config_path)?;
    let bridge_url = bridge_url
        .or_else(|| config.channels.bridge.base_url.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("no bridge URL (pass --bridge-url or set channels.bridge.baseUrl)")
        })?;

    let identity_path = config::resolve_identity_path(&config);
    let identity = ServiceIdentity::load(&identity_path);
    if identity.is_none() {
        log::debug!(
            "no service identity at {}, skipping identity check",
            identity_path.display()
        );
    }

    let ui: Arc<dyn BindingUi> = match ui {
        UiMode::Terminal => Arc::new(TerminalBindingUi),
        UiMode::Web => Arc::new(WebBindingUi),
    };
    let manager = BindingManager::new(identity, ui)
        .with_poll_interval(Duration::from_secs(config.binding.poll_interval_secs));
    let authenticator = BridgeAuthenticator::new(channel_type, bridge_url);
    let timeout = Duration::from_secs(timeout_secs.unwrap_or(config.binding.timeout_secs));

    let ctx = manager.bind(&authenticator, timeout).await?;
    println!(
        "✅ channel {} bound (completed at {})",
        ctx.channel_type,
        ctx.completed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    );
    Ok(())
}

async fn run_chat(host: String, port: u16) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect((host.as_str(), port)).await?;

    let welcome = read_frame(&mut stream)
        .await?
        .ok_or_else(|| anyhow::anyhow!("gateway closed before welcome"))?;
    let welcome: serde_json::Value = serde_json::from_slice(&welcome)?;
    let session_id = welcome
        .get("session_id")
        .and_then(|v| v.as_str())
        .unwrap_or("?");
    println!("connected (session {}). Type a message, Ctrl+D to quit.", session_id);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let frame = serde_json::json!({ "text": line });
        write_frame(&mut stream, frame.to_string().as_bytes()).await?;
        let Some(payload) = read_frame(&mut stream).await? else {
            println!("gateway closed the connection");
            break;
        };
        let reply: serde_json::Value = serde_json::from_slice(&payload)?;
        let text = reply.get("text").and_then(|v| v.as_str()).unwrap_or("");
        if reply.get("type").and_then(|v| v.as_str()) == Some("error") {
            println!("❌ Error: {}", text);
        } else {
            println!("{}", text);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Version => {
            println!("ponte {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Gateway { config, port } => {
            match config::load_config(config) {
                Ok((mut config, _path)) => {
                    if let Some(p) = port {
                        config.gateway.port = p;
                    }
                    lib::gateway::run_gateway(config).await
                }
                Err(e) => Err(e),
            }
        }
        Commands::Bind {
            channel_type,
            config,
            bridge_url,
            timeout_secs,
            ui,
        } => run_bind(channel_type, config, bridge_url, timeout_secs, ui).await,
        Commands::Chat { host, port } => run_chat(host, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}
