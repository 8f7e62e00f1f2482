use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::Level;

use drshub_engine::{DrsHubConfig, HttpGateway, Resolver, handle_resolve};

/// Resolve a DRS URI into the requested fields and print the response as
/// JSON. Exits non-zero when the resolution fails.
#[derive(Debug, Parser)]
#[command(name = "drshub", version, about)]
struct Cli {
    /// The DRS URI to resolve, conventional or compact-identifier based.
    #[arg(value_name = "DRS_URI")]
    url: String,

    /// Comma-separated response fields; defaults to the core set plus
    /// googleServiceAccount.
    #[arg(long, value_delimiter = ',', value_name = "FIELD,...")]
    fields: Option<Vec<String>>,

    /// Bearer token to authorize backend calls with (sent as
    /// `Authorization: Bearer <token>`). Falls back to $DRSHUB_TOKEN.
    #[arg(long, env = "DRSHUB_TOKEN", value_name = "TOKEN")]
    auth: Option<String>,

    /// Request an access URL even when the provider's method policy says
    /// not to.
    #[arg(long)]
    force_access_url: bool,

    /// Request-wide deadline in seconds; slow optional calls past it are
    /// abandoned.
    #[arg(long, default_value_t = 58, value_name = "SECONDS")]
    pencils_down_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let config = DrsHubConfig::from_env();
    let gateway = HttpGateway::new(config.clone()).context("build HTTP gateway")?;
    let resolver = Resolver::new(Arc::new(gateway), config)
        .with_pencils_down(Duration::from_secs(cli.pencils_down_seconds));

    let mut body = json!({ "url": cli.url });
    if let Some(fields) = cli.fields {
        body["fields"] = json!(fields);
    }
    let authorization = cli.auth.map(|token| format!("Bearer {token}"));

    let response = handle_resolve(
        &resolver,
        &body,
        authorization.as_deref(),
        cli.force_access_url,
    )
    .await;

    println!(
        "{}",
        serde_json::to_string_pretty(&response.body).context("render response")?
    );
    Ok(if response.status == 200 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .try_init();
}
