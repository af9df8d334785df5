use crate::{api, auth::AuthConfig, cli::telemetry, store::PgStore};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub auth_config: AuthConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the schema cannot be
/// applied, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let result = serve(args).await;

    telemetry::shutdown_tracer();

    result
}

async fn serve(args: Args) -> Result<()> {
    info!("Connecting to {}", redact_dsn(args.dsn.expose_secret()));

    let store = PgStore::connect(args.dsn.expose_secret()).await?;
    store
        .migrate()
        .await
        .context("Failed to apply database schema")?;

    api::new(args.port, Arc::new(store), args.auth_config).await
}

/// Render a DSN for logs with the password masked.
fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("***")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        Err(_) => "<unparsable dsn>".to_string(),
    }
}
