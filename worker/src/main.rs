// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

mod client;
mod config;
mod engine;
mod httpcheck;
mod logbus;
mod mapping;
mod pipeline;
mod scanners;
mod validate;
mod vulbuffer;

use std::sync::Arc;
use std::time::Duration;

use clap::ArgAction;
use redis_bus::Bus;

use crate::client::{HttpTaskPlane, TaskPlane};
use crate::config::WorkerConfig;
use crate::engine::Engine;
use crate::httpcheck::HttpServiceTable;
use crate::logbus::LogPublisher;
use crate::pipeline::Pipeline;
use crate::scanners::Scanners;

fn load_config() -> WorkerConfig {
    let matches = clap::Command::new("worker")
        .arg(
            clap::Arg::new("server")
                .short('s')
                .env("WORKER_SERVER")
                .action(ArgAction::Set)
                .help("task plane endpoint, e.g. http://127.0.0.1:9000"),
        )
        .arg(
            clap::Arg::new("redis")
                .short('r')
                .env("WORKER_REDIS")
                .action(ArgAction::Set)
                .help("log bus address, e.g. 127.0.0.1:6379; empty disables streaming"),
        )
        .arg(
            clap::Arg::new("redis-pass")
                .long("rp")
                .env("WORKER_REDIS_PASS")
                .action(ArgAction::Set)
                .help("log bus password"),
        )
        .arg(
            clap::Arg::new("name")
                .short('n')
                .env("WORKER_NAME")
                .action(ArgAction::Set)
                .help("worker name, defaults to <hostname>-<pid>"),
        )
        .arg(
            clap::Arg::new("concurrency")
                .short('c')
                .env("WORKER_CONCURRENCY")
                .value_parser(clap::value_parser!(usize))
                .help("number of concurrently executed tasks"),
        )
        .arg(
            clap::Arg::new("timeout")
                .short('t')
                .env("WORKER_TIMEOUT")
                .value_parser(clap::value_parser!(u64))
                .value_name("SECONDS")
                .help("per task timeout in seconds"),
        )
        .get_matches();

    let mut config = WorkerConfig::default();
    if let Some(server) = matches.get_one::<String>("server") {
        config.server_addr = server.clone();
    }
    if let Some(redis) = matches.get_one::<String>("redis") {
        config.redis_addr = redis.clone();
    }
    if let Some(pass) = matches.get_one::<String>("redis-pass") {
        config.redis_pass = pass.clone();
    }
    if let Some(name) = matches.get_one::<String>("name") {
        if !name.is_empty() {
            config.name = name.clone();
        }
    }
    if let Some(concurrency) = matches.get_one::<usize>("concurrency") {
        config.concurrency = (*concurrency).max(1);
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.timeout = *timeout;
    }
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::metadata::LevelFilter::INFO.into())
        .with_env_var("WORKER_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config();
    let client = Arc::new(HttpTaskPlane::new(&config.server_addr, None)?);

    // fail fast when the task plane is unreachable
    if let Err(e) = client.http_service_mappings(true).await {
        tracing::error!(%e, server = %config.server_addr, "task plane unreachable at startup");
        std::process::exit(1);
    }

    let bus = match config.redis_url() {
        Some(url) => match redis_bus::RedisBus::connect(&url).await {
            Ok(bus) => {
                tracing::info!(addr = %config.redis_addr, "log bus connected, logs will be streamed");
                Some(Arc::new(bus))
            }
            Err(e) => {
                tracing::warn!(%e, "log bus connection failed, logs will not be streamed");
                None
            }
        },
        None => {
            tracing::info!("no log bus address (-r), logs will not be streamed");
            None
        }
    };
    let dyn_bus = bus
        .clone()
        .map(|b| b as Arc<dyn Bus + Send + Sync>);

    let logger = LogPublisher::new(dyn_bus.clone(), &config.name);
    let http_table = Arc::new(HttpServiceTable::new());
    let pipeline = Arc::new(Pipeline {
        worker_name: config.name.clone(),
        client: client.clone(),
        bus: dyn_bus.clone(),
        logger: logger.clone(),
        scanners: Scanners::new(),
        http_table,
        task_timeout: Duration::from_secs(config.timeout),
    });
    pipeline.load_http_mappings().await;

    let engine = Engine::new(config.clone(), pipeline, dyn_bus, logger);
    let handles = engine.start().await;
    if let Some(bus) = &bus {
        match bus.subscribe_query().await {
            Ok(pubsub) => {
                engine.spawn_query_responder(pubsub);
            }
            Err(e) => tracing::warn!(%e, "status query subscription failed"),
        }
    }
    println!(
        "Worker {} started, connecting to {}",
        config.name, config.server_addr
    );
    println!("Concurrency: {}", config.concurrency);

    tokio::signal::ctrl_c().await?;
    println!("Shutting down worker...");
    engine.shutdown();
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
