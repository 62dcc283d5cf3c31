use anyhow::Result;
use feedguard::{
    app::FeedGuardApp,
    config,
    infrastructure::{logging, shutdown},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    logging::init_tracing(&config.logging)?;

    let shutdown = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());

    let app = FeedGuardApp::initialize(config, shutdown)?;
    app.run().await
}
