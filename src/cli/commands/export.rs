//! Silver-to-gold export command.

use console::style;

use transitlake::config::ExportConfig;
use transitlake::services::export;

pub async fn cmd_export(config: ExportConfig) -> anyhow::Result<()> {
    println!(
        "{} Exporting {}.{} to {}",
        style("→").cyan(),
        config.source_schema,
        config.source_table,
        config.target_db.display()
    );

    let target_table = config.target_table.clone();
    let summary = tokio::task::spawn_blocking(move || export(&config)).await??;

    println!(
        "{} Merged {} rows, {} now has {} rows",
        style("✓").green(),
        summary.exported,
        target_table,
        summary.gold_rows
    );
    Ok(())
}
