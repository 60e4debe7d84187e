use anyhow::Context;
use clap::Parser;
use tracing::{debug, warn};

use obra_cli::cli::Cli;
use obra_cli::config::ObraConfig;
use obra_cli::{app, logging};

// ─── logging ─────────────────────────────────────────────────────────────────

/// Applies the `[logging]` settings on top of the startup defaults.
///
/// * `RUST_LOG`, when set, keeps priority over the configured level.
/// * A log file that cannot be opened is reported and otherwise ignored.
fn configure_logging(cli: &Cli, config: &ObraConfig) -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        logging::set_log_level(&config.logging.level)?;
    }
    if cli.quiet {
        logging::set_console_enabled(false)?;
    }
    if let Some(path) = &config.logging.file {
        if let Err(e) = logging::enable_file_logging(path) {
            warn!(error = %e, "file logging disabled");
        }
    }
    Ok(())
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging("info");

    let cli = Cli::parse();

    let mut config = ObraConfig::load(&cli.config)?;
    config.apply_overrides(cli.overrides());
    configure_logging(&cli, &config)?;

    debug!(
        backend = %config.database.backend,
        db = %config.database.connection_string,
        "opening repository"
    );
    let registry = app::build_registry();
    let repo = registry
        .create(&config.database)
        .await
        .with_context(|| format!("cannot open '{}' database", config.database.backend))?;

    let output = app::run(&*repo, cli.command, &config).await?;
    print!("{output}");

    Ok(())
}
