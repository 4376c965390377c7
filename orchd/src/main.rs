// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

mod config;
mod controller;
mod cron;
mod response;
mod scheduling;
mod storage;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = config::Config::load();
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::metadata::LevelFilter::INFO.into())
        .with_env_var("ORCHD_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bus = redis_bus::RedisBus::connect(&config.redis.url).await?;
    tracing::info!(url = %config.redis.url, "connected to the control bus");
    let storage = storage::inmemory::Storage::new();
    let ctx = controller::ContextBuilder::new(storage, bus)
        .api_key(config.endpoints.key.clone())
        .build();
    let ctx = Arc::new(ctx);

    tokio::spawn(cron::run(
        Arc::clone(&ctx),
        Duration::from_secs(config.cron.check_interval),
    ));

    let addr = config.listener.address;
    let make_svc = make_service_fn(move |_conn| {
        let ctx = Arc::clone(&ctx);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                controller::entrypoint(req, Arc::clone(&ctx))
            }))
        }
    });
    let server = hyper::Server::bind(&addr).serve(make_svc);
    tracing::info!("listening on http://{}", addr);
    server.await?;
    Ok(())
}
