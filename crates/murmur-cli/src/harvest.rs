//! `harvest` command: drive one harvest run from start to summary.

use std::time::Duration;

use murmur_core::{AppConfig, Source};
use murmur_harvest::{HarvestRequest, HarvestSettings, HarvestSupervisor, SourceRegistry};
use sqlx::SqlitePool;

#[derive(Debug)]
pub(crate) struct HarvestArgs {
    pub topic: String,
    pub max_items: Option<usize>,
    pub sources: Vec<Source>,
    pub duration_secs: Option<u64>,
}

/// Start a harvest, wait for exhaustion, the duration limit or Ctrl-C, then
/// stop it and print the summary.
///
/// # Errors
///
/// Returns an error if the registry cannot be built, the request is invalid,
/// or the run ledger cannot be written.
pub(crate) async fn run_harvest(
    pool: &SqlitePool,
    config: &AppConfig,
    args: HarvestArgs,
) -> anyhow::Result<()> {
    let registry = SourceRegistry::from_app_config(config)?;
    let sources = if args.sources.is_empty() {
        registry.sources()
    } else {
        args.sources
    };
    let request = HarvestRequest {
        topic: args.topic,
        max_items: args.max_items.unwrap_or(config.harvest_max_items),
        sources,
    };

    let supervisor = HarvestSupervisor::new(
        pool.clone(),
        registry,
        HarvestSettings::from_app_config(config, "cli"),
    );
    let run_id = supervisor.start(request).await?;
    println!("harvest {run_id} started; press Ctrl-C to stop early");

    let duration_elapsed = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        () = supervisor.wait_until_exhausted() => {
            tracing::info!(%run_id, "all sources exhausted");
        }
        () = duration_elapsed => {
            tracing::info!(%run_id, "harvest duration elapsed");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to listen for ctrl-c; stopping harvest");
            } else {
                tracing::info!(%run_id, "interrupted");
            }
        }
    }

    let summary = supervisor.stop().await?;
    print!("{summary}");
    Ok(())
}
