use std::process;

use anyhow::Result;

use crate::client::ApiClient;

use super::helpers::{print_entries_table, print_totals, print_turn};

pub(crate) async fn cmd_log(client: &ApiClient, json: bool) -> Result<()> {
    let snapshot = client.food_log().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if snapshot.food_log.is_empty() {
        eprintln!("No entries logged yet");
        process::exit(2);
    }

    print_entries_table(&snapshot.food_log);
    println!();
    print_totals(&snapshot.summary);
    Ok(())
}

pub(crate) async fn cmd_history(client: &ApiClient, json: bool) -> Result<()> {
    let history = client.chat_history().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.chat_history.is_empty() {
        eprintln!("No chat history yet");
        process::exit(2);
    }

    for (i, turn) in history.chat_history.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_turn(turn);
    }
    Ok(())
}
