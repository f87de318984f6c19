use actix_web::{middleware, web, App, HttpServer};
use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use tonic::transport::Server;

use file_storage::api;
use file_storage::app_state::AppState;
use file_storage::config::AppConfig;
use file_storage::grpc::FileStorageService;

fn init_logging(config_file: &str) {
    match log4rs::init_file(config_file, Default::default()) {
        Ok(()) => info!("Logging configured from {}", config_file),
        Err(e) => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
            warn!("Could not load log config {}: {}, logging to stderr", config_file, e);
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let (config, report) = AppConfig::load().map_err(|e| io::Error::other(e.to_string()))?;
    init_logging(&config.logging.config_file);
    report.log();

    let state = AppState::from_config(config.clone()).map_err(|e| io::Error::other(e.to_string()))?;
    let host = config.server.host.clone();

    let grpc_addr: SocketAddr = format!("{}:{}", host, config.server.grpc_port)
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid gRPC address: {}", e)))?;
    let grpc_service = FileStorageService::new(state.file_service.clone()).into_server();
    let grpc = Server::builder().add_service(grpc_service).serve(grpc_addr);

    let http_state = web::Data::new(state);
    let http = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(http_state.clone())
            .configure(api::configure)
    })
    .workers(config.server.workers)
    .bind((host.as_str(), config.server.http_port))?
    .run();

    info!("Starting HTTP server on {}:{}", host, config.server.http_port);
    info!("Starting gRPC server on {}", grpc_addr);

    tokio::select! {
        result = http => {
            info!("HTTP server stopped");
            result
        }
        result = grpc => {
            result.map_err(|e| {
                error!("gRPC server failed: {}", e);
                io::Error::other(e.to_string())
            })
        }
    }
}
