use anyhow::Result;

use crate::client::ApiClient;

pub(crate) async fn cmd_chat(client: &ApiClient, message: &str, json: bool) -> Result<()> {
    let result = client.chat(message).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.response.trim());
    }
    Ok(())
}
