//! authfetch
//!
//! Command-line client for a bearer-token API:
//! 1. Loads the API base URL and credential file location from TOML
//! 2. Restores the stored access/refresh pair
//! 3. Sends calls through the refresh-aware client, replaying them after a
//!    single shared token refresh when the access token has expired
//! 4. Tells the user to sign in again when the session cannot be recovered

mod cli;
mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auth_client::{ApiClient, CallOptions, RecordingNavigator, Session};
use clap::Parser;
use dispatch::{ApiRequest, ApiResponse, HttpDispatcher};
use session_auth::CredentialStore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;

/// Exit code when the session ended and the user must sign in again.
const EXIT_SIGN_IN: i32 = 2;

/// Everything one invocation needs, wired from configuration.
struct App {
    config: Config,
    session: Session,
    navigator: Arc<RecordingNavigator>,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let store = CredentialStore::load(config.session.credentials_path.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to load credentials from {}",
                    config.session.credentials_path.display()
                )
            })?;

        let dispatcher = HttpDispatcher::new(
            reqwest::Client::new(),
            config.api.base_url.clone(),
            Duration::from_secs(config.api.timeout_secs),
        );
        let navigator = Arc::new(RecordingNavigator::new());
        let client = ApiClient::new(
            Arc::new(dispatcher),
            Arc::new(store),
            navigator.clone(),
            config.session.login_path.clone(),
        );

        Ok(Self {
            config,
            session: Session::new(Arc::new(client)),
            navigator,
        })
    }

    /// Run one command and return what should be printed on success.
    async fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::Whoami => match self.session.bootstrap().await {
                Some(identity) => Ok(serde_json::to_string_pretty(identity.as_json())?),
                None => Ok("not signed in".to_string()),
            },
            Command::Login { access, refresh } => {
                let identity = self
                    .session
                    .login(&access, refresh.as_deref())
                    .await
                    .context("login failed")?;
                Ok(serde_json::to_string_pretty(identity.as_json())?)
            }
            Command::Logout => {
                self.session.logout().await.context("logout failed")?;
                Ok("signed out".to_string())
            }
            Command::Request {
                method,
                path,
                body,
                skip_auth_redirect,
            } => {
                let mut request = ApiRequest::new(method, path);
                if let Some(body) = body {
                    request = request.with_body(body);
                }
                let options = CallOptions { skip_auth_redirect };
                let response = self
                    .session
                    .client()
                    .send(request, options)
                    .await
                    .context("request failed")?;
                Ok(render(&response))
            }
        }
    }

    /// Whether the client asked to send the user to the login page.
    fn needs_sign_in(&self) -> bool {
        self.navigator.last().is_some()
    }
}

/// Status line followed by the body, pretty-printed when it is JSON.
fn render(response: &ApiResponse) -> String {
    let body = match response.json::<serde_json::Value>() {
        Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_else(|_| response.text()),
        Err(_) => response.text(),
    };
    format!("{}\n{body}", response.status)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr so stdout stays clean for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path).context("failed to load configuration")?;

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        credentials_path = %config.session.credentials_path.display(),
        "configuration loaded"
    );

    let app = App::build(config).await?;
    let outcome = app.execute(cli.command).await;

    if app.needs_sign_in() {
        eprintln!("session expired, sign in at {}", app.config.login_url());
        std::process::exit(EXIT_SIGN_IN);
    }

    println!("{}", outcome?);
    Ok(())
}
