use anyhow::Context;
use chanwatch::app::build_pipeline;
use chanwatch::utils::logger;
use chanwatch::{CliConfig, WatchEngine, WatchError, WatchSettings};
use clap::Parser;

fn exit_with(e: &WatchError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real env vars win over it
    let _ = dotenvy::dotenv();
    let config = CliConfig::parse();

    if config.json_logs {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting chanwatch");

    let settings = match WatchSettings::load(&config) {
        Ok(settings) => settings,
        Err(e) => exit_with(&e),
    };
    tracing::debug!("Settings: {:?}", settings);
    tracing::info!(
        "Watching {} channels, state in {}",
        settings.channels.len(),
        settings.state_dir
    );
    if settings.dry_run {
        tracing::info!("🔍 DRY RUN MODE - digest is logged, not sent");
    }

    let interval = settings.interval;
    let pipeline = build_pipeline(settings).context("failed to set up the SMTP transport")?;
    let engine = WatchEngine::new(pipeline);

    match interval {
        Some(interval) => {
            tracing::info!("Polling every {:?}, Ctrl-C to stop", interval);
            let runs = engine
                .run_every(interval, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Cannot listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await;
            tracing::info!("Stopped after {} successful runs", runs);
        }
        None => match engine.run().await {
            Ok(summary) => {
                tracing::info!(
                    "✅ Done: {} fetched, {} new, mail sent: {}",
                    summary.fetched,
                    summary.new,
                    summary.notified
                );
            }
            Err(e) => exit_with(&e),
        },
    }

    Ok(())
}
