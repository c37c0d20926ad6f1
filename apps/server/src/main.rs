// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TerraBIM Server - terrain and building model generation service.
//!
//! Converts a polygonal area of interest into an IFC model containing
//! clipped terrain TINs and CityGML-derived building volumes, produced
//! asynchronously through a job queue.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /generate-model` - Validate the request and enqueue a job
//! - `GET /generation-state/:task_id` - Poll the task state
//! - `GET /generated-file/:task_id` - Fetch the produced IFC file

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

mod config;
mod error;
mod routes;
mod services;
mod types;
mod worker;

use config::Configuration;
use services::{AssetCache, ModelGenerator, PostgisService, StacClient};
use worker::{Job, TaskRegistry};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: TaskRegistry,
    pub queue: mpsc::Sender<Job>,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::var("TERRABIM_CONFIG").unwrap_or_else(|_| "config.yml".into());
    let config = match Configuration::load(&PathBuf::from(&config_path)) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("failed to load configuration from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging_level.clone()),
        )
        .init();

    tracing::info!(
        port = config.port,
        workers = config.workers,
        output_dir = %config.output_dir.display(),
        cache_dir = %config.cache_dir.display(),
        "Starting TerraBIM Server"
    );

    for dir in [&config.output_dir, &config.cache_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!(error = %e, path = %dir.display(), "failed to create directory");
        }
    }

    let postgis = PostgisService::connect(&config.db)
        .await
        .expect("failed to connect to the spatial database");
    let cache = AssetCache::new(&config.cache_dir).await;
    let stac = StacClient::new(cache, config.cache_dir.clone());
    let generator = ModelGenerator::new(config.clone(), postgis, stac);

    let registry = TaskRegistry::default();
    let (queue, receiver) = mpsc::channel::<Job>(64);
    worker::spawn_workers(
        config.workers,
        receiver,
        registry.clone(),
        generator,
        config.output_dir.clone(),
    );

    let state = AppState { registry, queue };

    let app = Router::new()
        .route("/health", get(routes::health::check))
        .route("/generate-model", post(routes::generate::generate_model))
        .route(
            "/generation-state/:task_id",
            get(routes::generate::generation_state),
        )
        .route(
            "/generated-file/:task_id",
            get(routes::generate::generated_file),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
