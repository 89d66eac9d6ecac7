use clap::{Parser, Subcommand};
use osaurus_core::backend::EchoBackend;
use osaurus_core::control::{ActivityCounter, ControlCommand};
use osaurus_core::gateway::{build_router, GatewayState};
use osaurus_core::lifecycle::Server;
use osaurus_core::router::CorsConfig;
use osaurus_core::{config, init};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "osaurus")]
#[command(about = "Osaurus CLI — local chat-completions gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json
    Init {
        /// Config file path (default: OSU_CONFIG_PATH or ~/.osaurus/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (the HTTP streaming surface).
    Serve {
        /// Config file path (default: OSU_CONFIG_PATH or ~/.osaurus/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Listen port (default from config or 1337)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Request a co-located running gateway to stop, via the local control socket.
    Stop,

    /// Poll a running gateway's health endpoint.
    Status {
        /// Port to poll (default from config or 1337)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("osaurus {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Stop) => {
            if let Err(e) = run_stop().await {
                log::error!("stop failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Status { port }) => {
            if let Err(e) = run_status(port).await {
                log::error!("status check failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

/// Wires a gateway backed by the bundled `EchoBackend`: the real model runtime is
/// an out-of-scope external collaborator (see `osaurus_core::backend`), so this
/// binary serves a deterministic echo until a real backend is plugged in.
async fn run_serve(config_path: Option<std::path::PathBuf>, port_override: Option<u16>) -> anyhow::Result<()> {
    let (mut cfg, path) = config::load_config(config_path)?;
    init::require_initialized(&path)?;
    if let Some(p) = port_override {
        cfg.port = p;
    }
    let port = config::resolve_port(&cfg);
    let host = cfg.host().to_string();

    let activity = Arc::new(ActivityCounter::new());
    let state = GatewayState {
        backend: Arc::new(EchoBackend::new(vec![])),
        installed_models: vec![],
        system_default_available: true,
        activity: activity.clone(),
        generation: cfg.generation.clone(),
    };
    let cors = CorsConfig {
        allowed_origins: cfg.allowed_origins.clone(),
    };
    let router = build_router(state, cors);

    let server = Arc::new(Server::with_activity(activity));
    let bound_port = server.start(&host, port, router).await?;
    log::info!("osaurus listening on {}:{}", host, bound_port);

    #[cfg(unix)]
    {
        let socket_path = osaurus_core::control::socket::default_socket_path();
        let control_plane = server.control_plane();
        tokio::spawn(async move {
            if let Err(e) = osaurus_core::control::socket::serve(&socket_path, control_plane).await {
                log::warn!("control socket exited: {}", e);
            }
        });
    }

    let control_loop_server = server.clone();
    tokio::spawn(control_loop_server.run_control_loop());

    shutdown_signal().await;
    server.control_plane().dispatch(ControlCommand::Stop);
    server.stop().await?;
    log::info!("osaurus stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(unix)]
async fn run_stop() -> anyhow::Result<()> {
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    let socket_path = osaurus_core::control::socket::default_socket_path();
    let mut stream = UnixStream::connect(&socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("connecting to control socket {}: {}", socket_path.display(), e))?;
    let line = serde_json::to_string(&ControlCommand::Stop)? + "\n";
    stream.write_all(line.as_bytes()).await?;
    println!("stop requested");
    Ok(())
}

#[cfg(not(unix))]
async fn run_stop() -> anyhow::Result<()> {
    anyhow::bail!("the local control socket is only implemented on unix hosts")
}

async fn run_status(port_override: Option<u16>) -> anyhow::Result<()> {
    let (cfg, _path) = config::load_config(None)?;
    let port = port_override.unwrap_or_else(|| config::resolve_port(&cfg));
    let url = format!("http://127.0.0.1:{}/health", port);
    let resp = reqwest::get(&url).await?;
    let body: serde_json::Value = resp.json().await?;
    println!("{}", body);
    Ok(())
}
