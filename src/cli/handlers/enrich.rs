//! Keyword enrichment sweep

use std::sync::Arc;

use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::database::Store;
use crate::enrichment::HttpKeywordExtractor;
use crate::enrichment::KeywordEnricher;
use crate::AppConfig;
use crate::Result;

/// Build the enricher described by the `[enrichment]` section
///
/// # Errors
/// Missing endpoint or an invalid URL
pub fn build_enricher(config: &AppConfig, store: Arc<dyn Store>) -> Result<KeywordEnricher> {
    let extractor = HttpKeywordExtractor::from_config(&config.enrichment, &config.hub)?;
    Ok(KeywordEnricher::new(
        store,
        Arc::new(extractor),
        config.enrichment.concurrency,
        config.enrichment.batch_size,
    )
    .with_write_chunk_size(config.sync.write_chunk_size))
}

/// # Errors
/// Configuration or database failures
pub async fn handle_enrich_command(config: &AppConfig, store: Arc<dyn Store>, limit: usize) -> Result<()> {
    if !config.enrichment.enabled {
        print_warning("Enrichment is disabled in the config; running the sweep anyway");
    }
    let enricher = build_enricher(config, store)?;
    let stats = enricher.sweep(limit).await?;

    print_success(&format!(
        "Enriched {} casts ({} keywords), {} failed",
        stats.enriched, stats.keywords_written, stats.failed
    ));
    Ok(())
}
