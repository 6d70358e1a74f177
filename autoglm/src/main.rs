mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use autoglm_api::AppState;
use autoglm_core::adb::{Adb, AdbTransport};
use autoglm_core::{logging, Config};
use autoglm_stream::ScrcpyLauncher;

use server::Server;

/// Relay Android screens to the browser over WebSocket
#[derive(Parser, Debug)]
#[command(name = "autoglm", version, about)]
struct Args {
    /// Address to bind
    #[arg(long, env = "AUTOGLM_HOST")]
    host: Option<String>,

    /// Port to bind; without it the first free port from the configured one is used
    #[arg(long, env = "AUTOGLM_PORT")]
    port: Option<u16>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short)]
    config: Option<String>,

    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this file (rolled daily)
    #[arg(long, conflicts_with = "no_log_file")]
    log_file: Option<String>,

    /// Console logging only
    #[arg(long)]
    no_log_file: bool,

    /// adb executable
    #[arg(long)]
    adb_path: Option<String>,

    /// Save every relayed stream under the debug directory
    #[arg(long)]
    debug_save_stream: bool,
}

impl Args {
    /// Command-line values take priority over the file and environment.
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if self.no_log_file {
            config.logging.file_path = None;
        } else if let Some(file) = &self.log_file {
            config.logging.file_path = Some(file.clone());
        }
        if let Some(path) = &self.adb_path {
            config.adb.path.clone_from(path);
        }
        if self.debug_save_stream {
            config.stream.debug_save_stream = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 2. Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init_logging(&config.logging)?;
    info!("AutoGLM server starting...");

    if !std::path::Path::new(&config.stream.server_path).exists() {
        warn!(
            path = %config.stream.server_path,
            "scrcpy server not found, video streaming will fail until it is installed"
        );
    }
    if config.stream.debug_save_stream {
        info!(dir = %config.stream.debug_dir, "Saving relayed streams for debugging");
    }

    // 3. Wire services
    let transport = Arc::new(AdbTransport::new(&config.adb));
    let launcher = Arc::new(ScrcpyLauncher::new(
        Adb::from_config(&config.adb),
        config.stream.clone(),
    ));
    let state = AppState::new(&config, transport, launcher);

    // 4. Serve until Ctrl-C / SIGTERM
    Server::new(config, state, args.port.is_none()).run().await
}
