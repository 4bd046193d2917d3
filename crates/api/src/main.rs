use anyhow::{Context, Result};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    stakedrop_api::server::run_from_env().await
}

/// `RUST_LOG` wins; `LOG_FORMAT=json` switches to structured output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("stakedrop_api=info,stakedrop_indexer=info,tower_http=info,sqlx=warn")
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
