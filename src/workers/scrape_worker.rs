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

use anyhow::Result;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::models::message::{ScrapeRequest, ScrapeResponse};
use crate::domain::models::profile::ProfileData;
use crate::engines::traits::{Credentials, EngineError, ProfileEngine};
use crate::proxy::selector::ProxySelector;
use crate::queue::dispatch_queue::{Delivery, DispatchQueue};

/// 工作器运行参数
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// 单次轮询的最大消息数
    pub poll_batch: usize,
    /// 单次轮询的阻塞等待上限
    pub poll_wait: Duration,
    /// 连续空轮询多少次后结束本轮排空
    pub idle_polls: u32,
    /// 单次抓取尝试的总超时（登录加抓取）
    pub attempt_timeout: Duration,
}

/// 抓取工作器
///
/// 持续排空请求通道并发布相关联的响应。每个工作器一次
/// 只处理一条消息，处理完成后才再次轮询；并发度来自
/// 工作器数量而不是单个工作器内的流水线。
pub struct ScrapeWorker<E: ProfileEngine> {
    queue: Arc<dyn DispatchQueue>,
    engine: Arc<E>,
    selector: ProxySelector,
    credentials: Credentials,
    request_channel: String,
    response_channel: String,
    options: WorkerOptions,
    worker_id: Uuid,
}

impl<E: ProfileEngine> ScrapeWorker<E> {
    /// 创建新的抓取工作器实例
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn DispatchQueue>,
        engine: Arc<E>,
        selector: ProxySelector,
        credentials: Credentials,
        request_channel: String,
        response_channel: String,
        options: WorkerOptions,
    ) -> Self {
        Self {
            queue,
            engine,
            selector,
            credentials,
            request_channel,
            response_channel,
            options,
            worker_id: Uuid::new_v4(),
        }
    }

    /// 运行工作器直到请求通道排空
    ///
    /// 阻塞轮询请求通道；连续`idle_polls`次空轮询后结束
    /// 本轮排空，由调度器在下个周期重新启动。队列瞬时
    /// 错误按有界指数退避重试。
    ///
    /// # 返回值
    ///
    /// 本轮成功发布响应的请求数
    pub async fn run_until_idle(&self) -> u64 {
        info!("Scrape worker {} started", self.worker_id);

        let mut processed = 0u64;
        let mut idle_streak = 0u32;
        let mut retry_backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(None)
            .build();

        loop {
            let batch = self
                .queue
                .receive_batch(
                    &self.request_channel,
                    self.options.poll_batch,
                    self.options.poll_wait,
                )
                .await;

            match batch {
                Ok(deliveries) if deliveries.is_empty() => {
                    retry_backoff.reset();
                    idle_streak += 1;
                    if idle_streak >= self.options.idle_polls {
                        break;
                    }
                }
                Ok(deliveries) => {
                    retry_backoff.reset();
                    idle_streak = 0;
                    for delivery in deliveries {
                        match self.process_delivery(&delivery).await {
                            Ok(true) => processed += 1,
                            Ok(false) => {}
                            Err(e) => {
                                error!(
                                    "Worker {} failed on message {}: {}",
                                    self.worker_id, delivery.message.id, e
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Worker {} queue receive failed: {}", self.worker_id, e);
                    let delay = retry_backoff
                        .next_backoff()
                        .unwrap_or(Duration::from_secs(30));
                    sleep(delay).await;
                }
            }
        }

        info!(
            "Scrape worker {} idle, ending run ({} processed)",
            self.worker_id, processed
        );
        processed
    }

    /// 处理单条投递
    ///
    /// 成功路径：选代理、登录、抓取、发布响应、确认请求。
    /// 整体失败（登录/导航/超时）不发布响应也不确认，
    /// 消息留在处理中状态，由锁过期机制重投给其他工作器。
    async fn process_delivery(&self, delivery: &Delivery) -> Result<bool> {
        let request: ScrapeRequest = match serde_json::from_value(delivery.message.body.clone()) {
            Ok(request) => request,
            Err(e) => {
                // 解析不出相关性键的请求永远无法匹配，确认移除避免重投循环
                warn!(
                    "Discarding malformed request {}: {}",
                    delivery.message.id, e
                );
                self.queue.acknowledge(delivery).await?;
                return Ok(false);
            }
        };

        // 提交端在入队前已做校验；来自其他生产者的非法URL同样确认移除
        if url::Url::parse(&request.target_url).is_err() {
            warn!(
                "Discarding request {} with invalid target URL {}",
                request.correlation_key, request.target_url
            );
            self.queue.acknowledge(delivery).await?;
            return Ok(false);
        }

        if delivery.message.delivery_count > 1 {
            info!(
                "Redelivery {} of request {}",
                delivery.message.delivery_count, request.correlation_key
            );
        }

        let proxy = self.selector.select();
        debug!(
            "Worker {} scraping {} via proxy {}",
            self.worker_id, request.target_url, proxy
        );

        let attempt = tokio::time::timeout(
            self.options.attempt_timeout,
            self.attempt(&proxy, &request.target_url),
        )
        .await;

        match attempt {
            Ok(Ok(profile)) => {
                let response = ScrapeResponse {
                    correlation_key: request.correlation_key.clone(),
                    profile,
                };
                self.queue
                    .send(
                        &self.response_channel,
                        &response.correlation_key.as_partition_key(),
                        serde_json::to_value(&response)?,
                    )
                    .await?;
                self.queue.acknowledge(delivery).await?;
                metrics::counter!("scrape_success_total").increment(1);
                Ok(true)
            }
            Ok(Err(e)) => {
                error!("Scrape attempt for {} failed: {}", request.target_url, e);
                metrics::counter!("scrape_failures_total").increment(1);
                Ok(false)
            }
            Err(_) => {
                error!(
                    "Scrape attempt for {} timed out after {:?}",
                    request.target_url, self.options.attempt_timeout
                );
                metrics::counter!("scrape_failures_total").increment(1);
                Ok(false)
            }
        }
    }

    /// 执行一次完整的抓取尝试
    ///
    /// 会话在成功和抓取失败两条路径上都无条件释放
    async fn attempt(&self, proxy: &str, url: &str) -> Result<ProfileData, EngineError> {
        let mut session = self.engine.login(proxy, &self.credentials).await?;
        let result = self.engine.scrape(&mut session, url).await;
        self.engine.close(session).await;
        result
    }
}
