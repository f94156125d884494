use std::path::Path;

use anyhow::Result;

use crate::client::ApiClient;

use super::helpers::{print_entries_table, print_totals};

pub(crate) async fn cmd_analyze(client: &ApiClient, image: &Path, json: bool) -> Result<()> {
    let result = client.analyze(image).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}\n", result.analysis.trim());

    if result.food_items.is_empty() {
        eprintln!("No food items recognized; nothing was logged.");
    } else {
        let added = result.food_items.len();
        println!("Logged {added} item(s):");
        print_entries_table(&result.food_items);
    }

    let total = result.food_log.len();
    println!("\n  Food log: {total} entries");
    print_totals(&result.summary);
    Ok(())
}
