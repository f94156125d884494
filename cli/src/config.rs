use std::time::Duration;

use anyhow::{Context, Result, bail};
use axum::http::HeaderValue;
use clap::Args;

use crate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "NUTRISNAP_PORT", default_value = "8000")]
    pub port: u16,
    /// Address to bind to (use 0.0.0.0 to expose to the network)
    #[arg(short, long, env = "NUTRISNAP_BIND", default_value = "127.0.0.1")]
    pub bind: String,
    /// Google AI Studio API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Gemini model used for image analysis and chat
    #[arg(long, env = "NUTRISNAP_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
    /// Base URL of the Gemini REST API
    #[arg(long, env = "NUTRISNAP_GEMINI_URL", default_value = DEFAULT_BASE_URL)]
    pub gemini_url: String,
    /// Browser origins allowed to call the API (comma-separated)
    #[arg(
        long,
        env = "NUTRISNAP_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173,http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,
    /// Seconds to wait for the model before giving up
    #[arg(long, env = "NUTRISNAP_TIMEOUT_SECS", default_value = "60")]
    pub timeout_secs: u64,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub api_key: String,
    pub model: String,
    pub gemini_url: String,
    pub allowed_origins: Vec<HeaderValue>,
    pub timeout: Duration,
}

impl Config {
    pub fn load(args: ServeArgs) -> Result<Self> {
        let api_key = args
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .context("GOOGLE_API_KEY is not set (export it or add it to .env)")?;

        if args.timeout_secs == 0 {
            bail!("--timeout-secs must be greater than 0");
        }

        let allowed_origins = args
            .allowed_origins
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("Invalid allowed origin '{o}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Config {
            port: args.port,
            bind: args.bind,
            api_key,
            model: args.model,
            gemini_url: args.gemini_url,
            allowed_origins,
            timeout: Duration::from_secs(args.timeout_secs),
        })
    }
}
