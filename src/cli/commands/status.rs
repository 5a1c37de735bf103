//! Checkpoint history command.

use console::style;
use serde::Serialize;

use transitlake::config::StatusConfig;
use transitlake::models::{Checkpoint, LoadId};
use transitlake::repository::SilverStore;

#[derive(Serialize)]
struct StatusReport<'a> {
    table: String,
    rows: i64,
    checkpoint: Option<&'a LoadId>,
    history: &'a [Checkpoint],
}

pub fn cmd_status(config: &StatusConfig) -> anyhow::Result<()> {
    if !config.target_db.exists() {
        println!(
            "{} {} does not exist yet. Run 'transitlake transform' first.",
            style("!").yellow(),
            config.target_db.display()
        );
        return Ok(());
    }

    let store = SilverStore::open_read_only(
        &config.target_db,
        &config.target_schema,
        &config.target_table,
        config.busy_timeout,
    )?;
    let history = store.history()?;
    let rows = store.row_count()?;

    if config.json {
        let report = StatusReport {
            table: format!("{}.{}", config.target_schema, config.target_table),
            rows,
            checkpoint: history.last().map(|c| &c.load_id),
            history: &history,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {}.{}",
        style("Silver table").bold(),
        config.target_schema,
        config.target_table
    );
    println!("  Rows: {}", rows);

    match history.last() {
        Some(latest) => println!("  Checkpoint: {}", latest.load_id),
        None => {
            println!("  Checkpoint: {}", style("none").yellow());
            return Ok(());
        }
    }

    println!();
    println!("{:<22} {:>10}  {}", "LOAD ID", "ROWS", "LOADED AT");
    for checkpoint in &history {
        let loaded_at = checkpoint
            .loaded_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<22} {:>10}  {}",
            checkpoint.load_id, checkpoint.loaded_rows, loaded_at
        );
    }
    Ok(())
}
