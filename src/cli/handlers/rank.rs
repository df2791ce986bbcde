//! Ranking views

use std::sync::Arc;

use chrono::Utc;

use crate::cli::commands::RankCommands;
use crate::cli::output::print_info;
use crate::cli::output::print_json;
use crate::cli::output::truncate_str;
use crate::database::Store;
use crate::ranking::RankingEngine;
use crate::ranking::TopQuery;
use crate::ranking::TopScope;
use crate::AppConfig;
use crate::Result;

/// # Errors
/// Database failures
pub async fn handle_rank_command(config: &AppConfig, store: Arc<dyn Store>, command: RankCommands) -> Result<()> {
    let engine = RankingEngine::new(store, config.ranking.clone());
    let now = Utc::now();

    match command {
        RankCommands::Hot { page, json } => {
            let entries = engine.hot(now, page).await?;
            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                print_info("No reacted casts in the hot window");
                return Ok(());
            }
            println!("{:>4}  {:<60} {:>7} {:>7} {:>9}", "#", "cast", "likes", "recasts", "score");
            for (idx, entry) in entries.iter().enumerate() {
                println!(
                    "{:>4}  {:<60} {:>7} {:>7} {:>9.3}",
                    page * config.ranking.page_size + idx + 1,
                    truncate_str(&entry.target.to_string(), 60),
                    entry.likes,
                    entry.recasts,
                    entry.score
                );
            }
        }
        RankCommands::Top {
            window,
            metric,
            author,
            replies,
            channel,
            limit,
            offset,
            json,
        } => {
            let scope = match (author, channel) {
                (Some(fid), _) if replies => TopScope::AuthorReplies(fid),
                (Some(fid), _) => TopScope::Author(fid),
                (None, Some(url)) => TopScope::Channel(url),
                (None, None) => TopScope::Global,
            };
            let query = TopQuery {
                window,
                metric,
                scope,
                limit,
                offset,
            };
            let entries = engine.top(&query, now).await?;
            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                print_info("No reactions in this window");
                return Ok(());
            }
            println!("{:>4}  {:<60} {:>7}", "#", "cast", "count");
            for (idx, entry) in entries.iter().enumerate() {
                println!(
                    "{:>4}  {:<60} {:>7}",
                    offset + idx + 1,
                    truncate_str(&entry.target.to_string(), 60),
                    entry.count
                );
            }
        }
        RankCommands::Engagement {
            kind,
            window,
            limit,
            json,
        } => {
            let rows = engine.engagement(kind, window, now).await?;
            let rows = &rows[..rows.len().min(limit)];
            if json {
                return print_json(rows);
            }
            if rows.is_empty() {
                print_info("No activity in this window");
                return Ok(());
            }
            println!(
                "{:>4} {:>6}  {:<48} {:>6} {:>7} {:>6} {:>7} {:>10}",
                "rank", "Δ", "subject", "posts", "replies", "likes", "recasts", "engagement"
            );
            for row in rows {
                let delta = row
                    .rank_delta
                    .as_ref()
                    .map_or_else(|| "new".to_string(), |d| format!("{:+}", d.engagement));
                println!(
                    "{:>4} {:>6}  {:<48} {:>6} {:>7} {:>6} {:>7} {:>10.2}",
                    row.rank,
                    delta,
                    truncate_str(&row.counts.subject, 48),
                    row.counts.posts,
                    row.counts.replies,
                    row.counts.likes,
                    row.counts.recasts,
                    row.engagement
                );
            }
        }
    }
    Ok(())
}
