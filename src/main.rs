// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::Extension;
use scraplink::config::settings::Settings;
use scraplink::correlation::correlator::ResponseCorrelator;
use scraplink::engines::browser_engine::BrowserEngine;
use scraplink::engines::traits::Credentials;
use scraplink::presentation::routes;
use scraplink::proxy::selector::ProxySelector;
use scraplink::queue::dispatch_queue::DispatchQueue;
use scraplink::queue::memory_queue::InMemoryDispatchQueue;
use scraplink::queue::redis_queue::RedisDispatchQueue;
use scraplink::utils::telemetry;
use scraplink::workers::coordinator::WorkerPoolCoordinator;
use scraplink::workers::scheduler::DrainScheduler;
use scraplink::workers::scrape_worker::WorkerOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting scraplink...");

    // Initialize Prometheus Metrics
    scraplink::infrastructure::metrics::init_metrics();

    // 2. Load configuration (refuses to start on an empty proxy pool)
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // 3. Initialize dispatch queue
    let visibility_timeout = Duration::from_secs(settings.queue.visibility_timeout_secs);
    let queue: Arc<dyn DispatchQueue> = match settings.queue.backend.as_str() {
        "memory" => Arc::new(InMemoryDispatchQueue::new(
            visibility_timeout,
            settings.queue.max_delivery_count,
        )),
        _ => Arc::new(RedisDispatchQueue::new(
            &settings.queue.redis_url,
            visibility_timeout,
            settings.queue.max_delivery_count,
        )?),
    };
    info!("Dispatch queue initialized ({})", settings.queue.backend);

    // 4. Initialize Components
    let selector = ProxySelector::new(settings.proxy.addresses.clone())?;
    let credentials = Credentials {
        username: settings.scraper.username.clone(),
        password: settings.scraper.password.clone(),
    };
    let engine = Arc::new(BrowserEngine::new(
        settings.scraper.login_url.clone(),
        Duration::from_secs(30),
    ));
    let correlator = Arc::new(ResponseCorrelator::new(
        queue.clone(),
        settings.queue.response_channel.clone(),
        settings.correlation.poll_batch,
        Duration::from_secs(settings.correlation.poll_wait_secs),
    ));

    // 5. Start Worker Pool behind the recurring scheduler
    let coordinator = Arc::new(WorkerPoolCoordinator::new(
        queue.clone(),
        engine,
        selector,
        credentials,
        settings.queue.request_channel.clone(),
        settings.queue.response_channel.clone(),
        WorkerOptions {
            poll_batch: settings.worker.poll_batch,
            poll_wait: Duration::from_secs(settings.worker.poll_wait_secs),
            idle_polls: settings.worker.idle_polls,
            attempt_timeout: Duration::from_secs(settings.worker.attempt_timeout_secs),
        },
        settings.worker.count,
    ));

    let scheduler = DrainScheduler::new(Duration::from_secs(settings.scheduler.interval_secs));
    let drain_coordinator = coordinator.clone();
    let scheduler_handle = scheduler.start(move || {
        let coordinator = drain_coordinator.clone();
        async move { coordinator.drain().await }
    });
    info!(
        "Drain scheduler started (every {}s, first run immediate)",
        settings.scheduler.interval_secs
    );

    // 6. Start HTTP server
    let app = routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(Extension(queue))
        .layer(Extension(correlator))
        .layer(Extension(settings.clone()));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
            scheduler_handle.abort();
        })
        .await?;

    Ok(())
}
