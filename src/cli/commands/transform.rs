//! Bronze-to-silver transform command.

use console::style;

use transitlake::config::SilverConfig;
use transitlake::services::{IncrementalLoader, LoadOutcome};

/// Run one incremental load. "No new data" is a successful run.
pub async fn cmd_transform(config: SilverConfig) -> anyhow::Result<()> {
    println!(
        "{} Transforming {}.{} into {}.{}",
        style("→").cyan(),
        config.source_schema,
        config.source_table,
        config.target_schema,
        config.target_table
    );
    if config.reset_tables {
        println!(
            "  {} Reset requested: silver rows and checkpoint history will be replaced",
            style("!").yellow()
        );
    }

    let outcome =
        tokio::task::spawn_blocking(move || IncrementalLoader::new(&config).run()).await??;

    match outcome {
        LoadOutcome::NoNewData { checkpoint } => {
            println!(
                "{} No new data in bronze since load {}",
                style("✓").green(),
                checkpoint
            );
        }
        LoadOutcome::Merged(summary) => {
            println!("  Fetched:    {}", summary.fetched);
            println!("  Normalized: {}", summary.normalized);
            if summary.dropped > 0 {
                println!(
                    "  Dropped:    {} {}",
                    summary.dropped,
                    style("(null values)").yellow()
                );
            }
            if summary.duplicates > 0 {
                println!(
                    "  Duplicates: {} {}",
                    summary.duplicates,
                    style("(collapsed)").yellow()
                );
            }
            println!(
                "{} Inserted {} of {} rows, checkpoint {} -> {}",
                style("✓").green(),
                summary.inserted,
                summary.merged,
                summary.previous_checkpoint,
                summary.checkpoint
            );
        }
    }

    Ok(())
}
