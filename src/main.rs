use std::process::ExitCode;
use std::sync::Arc;

use correios_frete::api;
use correios_frete::cache::MemoryQuoteStore;
use correios_frete::carrier::CorreiosCarrier;
use correios_frete::config::AppConfig;
use correios_frete::correios::CorreiosClient;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env first so RUST_LOG from the file applies.
    let dotenv_result = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    info!(
        service = %app_config.carrier.service,
        origin = %app_config.carrier.origin_postal_code,
        url = app_config.web_service.url(),
        "Correios shipping service starting"
    );

    let client = match CorreiosClient::new(&app_config.web_service) {
        Ok(client) => client,
        Err(err) => {
            error!("Could not build the Correios client: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let store = Arc::new(MemoryQuoteStore::new());
    let carrier = Arc::new(CorreiosCarrier::new(app_config.carrier, client, store));

    if let Err(err) = api::start_api_server(app_config.api, carrier).await {
        error!("API server terminated with an error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
