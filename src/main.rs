//! chunk-relay server binary.
//!
//! Receives files as ordered multipart chunks, appends them to a per-file
//! working file under a per-name lock, and atomically renames the working
//! file into place when the last chunk lands.

mod atomic;
mod background;
mod chunk;
mod config;
mod error;
mod http;
mod locking;
mod logging;
mod storage;
mod upload;
mod version;

use axum::extract::Extension;
use axum::routing::get;
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::background::spawn_background_tasks;
use crate::config::Args;
use crate::http::{build_cors_layer, request_span};
use crate::locking::LockManager;
use crate::storage::UploadStore;
use crate::upload::UploadConfig;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let store = Arc::new(UploadStore::new(PathBuf::from(&args.upload_dir)));
    let locks = Arc::new(LockManager::new());
    let upload_config = Arc::new(UploadConfig {
        max_request_size: args.max_request_size,
        lock_timeout: (args.lock_timeout_secs > 0)
            .then(|| Duration::from_secs(args.lock_timeout_secs)),
        part_ttl: Duration::from_secs(args.part_ttl_secs),
    });
    store
        .ensure_root()
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    let mut app = Router::new()
        .merge(upload::routes(&upload_config))
        .route("/api/version", get(version::get_version_info))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(store.clone()))
        .layer(Extension(locks.clone()))
        .layer(Extension(upload_config.clone()));

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.http_port);
    let handle = Handle::new();

    info!(
        upload_dir = %store.root_path().display(),
        "starting HTTP server at {}",
        addr
    );

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(store, locks, upload_config);
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
