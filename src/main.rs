use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info};

mod auth;
mod balance;
mod config;
mod error;
mod ledger;
mod mongo;
mod routes;
mod schemas;
mod split;
mod store;

use config::Config;
use ledger::Ledger;
use mongo::MongoStore;

fn cors(allowed_origin: Option<&str>) -> Cors {
    match allowed_origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allow_any_method()
            .allow_any_header(),
        None => Cors::permissive(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config: {err}");
            std::process::exit(1);
        }
    };
    config.init_logging();

    let store = match MongoStore::connect(&config.mongodb_uri, &config.database).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "failed to connect to MongoDB");
            std::process::exit(1);
        }
    };
    let ledger = web::Data::new(Ledger::new(Arc::new(store)));
    let auth = web::Data::new(config.auth.clone());
    let allowed_origin = config.allowed_origin.clone();

    info!(host = %config.host, port = config.port, "listening");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors(allowed_origin.as_deref()))
            .app_data(ledger.clone())
            .app_data(auth.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
