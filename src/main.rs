use chunkwise::config::Config;
use chunkwise::{api, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    tracing::info!("chunkwise v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    api::serve(config).await
}
