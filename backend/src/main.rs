use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use pneumoscan::config::AppConfig;
use pneumoscan::inference::{ModelConfig, Predictor, load_classifier};
use pneumoscan::report::ReportGenerator;
use pneumoscan::routes::configure_routes;
use pneumoscan::session::PredictionStore;
use std::sync::Arc;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let model_config = ModelConfig::load_or_default(&config.model_config_path)
        .map_err(|e| startup_error("Failed to load model config", e))?;
    let classifier = load_classifier(&config.model_path, &model_config)
        .map_err(|e| startup_error("Failed to load model", e))?;
    let predictor = Predictor::new(Arc::from(classifier), model_config)
        .map_err(|e| startup_error("Failed to initialise predictor", e))?;
    log::info!("Model {} ready", predictor.model_version());

    let store = config.file_store();
    store
        .ensure_dirs()
        .map_err(|e| startup_error("Failed to create storage directories", e))?;
    store.sweep();
    match config.retention_hours {
        Some(hours) => log::info!("Uploads and reports are kept for {} hour(s)", hours),
        None => log::info!("Uploads and reports are kept indefinitely"),
    }

    let generator = ReportGenerator::new(store.clone(), predictor.model_version());
    let predictor = web::Data::new(predictor);
    let store_data = web::Data::new(store);
    let generator = web::Data::new(generator);
    let predictions = web::Data::new(PredictionStore::new(config.max_sessions));

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let static_dir = config.static_dir.clone();
    let upload_dir = config.upload_dir.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(predictor.clone())
            .app_data(store_data.clone())
            .app_data(generator.clone())
            .app_data(predictions.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone(), upload_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
