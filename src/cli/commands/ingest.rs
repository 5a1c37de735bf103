//! Bronze ingest command.

use console::style;

use transitlake::config::IngestConfig;
use transitlake::services::ingest;

pub async fn cmd_ingest(config: IngestConfig) -> anyhow::Result<()> {
    println!("{} Fetching {}", style("→").cyan(), config.url);

    let summary = ingest(&config).await?;

    if summary.rows == 0 {
        println!("{} Response contained no vehicles", style("!").yellow());
        return Ok(());
    }
    if summary.skipped > 0 {
        println!(
            "  {} Skipped {} items that were not objects",
            style("!").yellow(),
            summary.skipped
        );
    }
    println!(
        "{} Appended {} rows to {}.{} as load {}",
        style("✓").green(),
        summary.rows,
        config.target_schema,
        config.target_table,
        summary.load_id
    );
    Ok(())
}
