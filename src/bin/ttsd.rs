//! The `ttsd` process entry point: parses CLI flags and an optional config
//! file, binds the listener, and runs the server until shutdown.

use clap::Parser;

use tts::config::{self, Cli, FileConfig};
use tts::server::Server;

fn main() {
    let cli = Cli::parse();

    // Loaded before the logger so `init_logger` can seed its filter from
    // `log_level` — `env_logger::init()` only ever reads `RUST_LOG`, and by
    // the time `run` could report a load failure through `log::error!` the
    // logger wouldn't exist yet to report it with.
    let file_config = match &cli.config {
        Some(path) => match FileConfig::load(path) {
            Ok(file_config) => file_config,
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    init_logger(&file_config);

    if let Err(e) = run(&cli, &file_config) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

/// Builds the `env_logger` filter from the config file's `log_level`
/// (defaulting to `info`), with `RUST_LOG` taking precedence when set —
/// same CLI/config/default precedence order `config::resolve_listen_addr`
/// uses for the listen address.
fn init_logger(file_config: &FileConfig) {
    let level = file_config
        .log_level
        .as_deref()
        .and_then(|s| s.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);

    env_logger::Builder::new()
        .filter_level(level)
        .parse_env(env_logger::Env::default().filter_env("RUST_LOG"))
        .init();
}

fn run(cli: &Cli, file_config: &FileConfig) -> anyhow::Result<()> {
    let addr = config::resolve_listen_addr(cli, file_config)?;
    let server = Server::bind(addr)?;

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || shutdown.request_shutdown())?;

    server.run()?;
    Ok(())
}
