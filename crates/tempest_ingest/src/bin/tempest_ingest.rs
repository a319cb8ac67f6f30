use argh::FromArgs;
use std::path::PathBuf;
use tempest_ingest::status::run_status_reporter;
use tempest_ingest::{Config, Engine};

#[derive(FromArgs)]
/// Tempest weather station ingestion service
struct Args {
    /// path to a YAML configuration file (optional; TEMPEST_* env vars override it)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// print version and exit
    #[argh(switch)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();
    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "Starting tempest_ingest v{} (device {}, station {} '{}')",
        env!("CARGO_PKG_VERSION"),
        config.device_id,
        config.station_id,
        config.station_name
    );

    let engine = Engine::new(&config)?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let status_task = tokio::spawn(run_status_reporter(
        config.station_name.clone(),
        engine.store(),
        config.status_interval(),
        shutdown_rx.clone(),
    ));

    log::info!("Ingestion running. Press Ctrl+C to stop.");
    engine.run(shutdown_rx).await;
    status_task.abort();

    log::info!("tempest_ingest stopped");
    Ok(())
}
