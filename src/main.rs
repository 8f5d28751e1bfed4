use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use quiz_session::QuizError;
use quiz_session::config::AppConfig;
use quiz_session::logging::setup_logging;
use quiz_session::server::{self, Game, LoggingHooks};

/// Real-time multiplayer quiz server.
///
/// Host commands are read from stdin; `quit` stops the server. When stdin
/// reaches end of input (for example `</dev/null`), the server keeps running
/// until Ctrl-C.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "quiz.toml")]
    config: PathBuf,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind to
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Start with registration closed (use `open` to accept players)
    #[arg(long)]
    closed_registration: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error running server: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), QuizError> {
    let mut config = AppConfig::load(&args.config)?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json_format |= args.json_logs;
    // The host opens registration at startup unless told otherwise.
    config.game.accepting_new_players = !args.closed_registration;

    setup_logging(&config.logging)?;

    let game = Arc::new(Game::with_hooks(config.game.clone(), Arc::new(LoggingHooks)));
    server::run(&config.server, game).await
}
