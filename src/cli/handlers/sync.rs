//! Sync command handlers

use std::sync::Arc;

use crate::cli::commands::SyncCommands;
use crate::cli::handlers::enrich::build_enricher;
use crate::cli::output::print_error;
use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::database::Store;
use crate::sync::Dispatcher;
use crate::sync::HttpHubClient;
use crate::sync::HubClient;
use crate::sync::SyncMode;
use crate::AppConfig;
use crate::Result;

/// Run one sync mode to completion
///
/// Live mode stops cleanly on Ctrl-C after saving its checkpoint. When
/// enrichment is enabled, ingested casts are queued to a background enricher
/// that drains before this returns.
///
/// # Errors
/// Hub connection failures, stream termination, or database failures
pub async fn handle_sync_command(config: &AppConfig, store: Arc<dyn Store>, command: SyncCommands) -> Result<()> {
    let (mode, enrich) = match command {
        SyncCommands::Backfill { enrich } => (SyncMode::Backfill, enrich),
        SyncCommands::Live { from_event_id, enrich } => (SyncMode::Live { from_event_id }, enrich),
        SyncCommands::Manual { fids, casts, enrich } => {
            if fids.is_empty() && casts.is_empty() {
                print_warning("Nothing to sync: pass --fid or --cast");
                return Ok(());
            }
            (SyncMode::Manual { fids, casts }, enrich)
        }
    };

    let hub = HttpHubClient::from_config(config)?;
    let info = match hub.connect().await {
        Ok(info) => info,
        Err(e) => {
            print_error(&format!("Cannot reach hub {}: {e}", config.hub_endpoint()));
            return Err(e);
        }
    };
    print_info(&format!(
        "🔗 Connected to hub {} (version {})",
        config.hub_endpoint(),
        if info.version.is_empty() { "unknown" } else { info.version.as_str() }
    ));

    let mut dispatcher = Dispatcher::new(Arc::new(hub), store.clone(), config.sync.clone());
    let enrichment = if config.enrichment.enabled && !enrich.no_enrich {
        let enricher = Arc::new(build_enricher(config, store)?);
        let (queue, handle) = enricher.spawn(config.enrichment.concurrency * 4);
        dispatcher = dispatcher.with_enrichment(queue);
        Some(handle)
    } else {
        None
    };

    let result = match mode {
        SyncMode::Live { .. } => dispatcher.run_until(mode, shutdown_signal()).await,
        other => dispatcher.run(other).await,
    };
    drop(dispatcher);

    if let Some(handle) = enrichment {
        match handle.await {
            Ok(stats) => print_info(&format!(
                "🔑 Enrichment: {} casts, {} keywords, {} failed",
                stats.enriched, stats.keywords_written, stats.failed
            )),
            Err(e) => print_warning(&format!("Enrichment task ended abnormally: {e}")),
        }
    }

    let stats = result?;
    print_success(&format!("Sync finished: {}", stats.format()));
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, stopping live sync");
}
