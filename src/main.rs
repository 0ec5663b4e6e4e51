use boxstack::api;
use boxstack::config::AppConfig;

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Could not load .env: {err}");
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_config = AppConfig::from_env();
    log::info!("Packing service starting");

    if let Err(err) = api::start_api_server(app_config.api, app_config.packing).await {
        log::error!("API server terminated with an error: {err}");
        std::process::exit(1);
    }
}
