//! Command-line arguments

use clap::{Parser, Subcommand};
use dispatch::Method;

/// Call a bearer-token API, refreshing the session when the access token expires.
#[derive(Debug, Parser)]
#[command(name = "authfetch")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (falls back to CONFIG_PATH, then authfetch.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Show the signed-in identity
    Whoami,

    /// Import a credential pair and resolve its identity
    Login {
        /// Access token
        access: String,
        /// Refresh token
        refresh: Option<String>,
    },

    /// Forget stored credentials
    Logout,

    /// Send one authenticated call
    Request {
        /// HTTP method, case-insensitive
        #[arg(value_parser = parse_method)]
        method: Method,
        /// Path relative to the API base URL
        #[arg(value_parser = parse_path)]
        path: String,
        /// JSON request body
        #[arg(value_parser = parse_body)]
        body: Option<serde_json::Value>,
        /// Fail on 401 instead of refreshing and redirecting to sign-in
        #[arg(long)]
        skip_auth_redirect: bool,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}

fn parse_path(raw: &str) -> Result<String, String> {
    if raw.starts_with('/') {
        Ok(raw.to_string())
    } else {
        Err(format!("must start with '/', got: {raw}"))
    }
}

fn parse_body(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))
}
