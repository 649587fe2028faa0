mod app;

use std::sync::Arc;

use news_core::{AppConfig, HttpTransport, Transport};
use reqwest::{redirect, ClientBuilder};
use tokio::runtime::Runtime;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::app::NewsDeck;

fn main() -> std::io::Result<()> {
    init_tracing();

    let runtime = Arc::new(Runtime::new().expect("failed to initialise Tokio runtime"));
    let config = AppConfig::load();
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent("newsdeck/0.1")
        .build()
        .expect("failed to build HTTP client");

    let transport: Arc<dyn Transport> = match HttpTransport::new(client, config.api.clone()) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!(error = %e, "invalid API configuration");
            std::process::exit(2);
        }
    };

    let mut deck = NewsDeck::new(runtime, transport, &config);
    deck.run(std::io::stdin().lock(), std::io::stdout())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
