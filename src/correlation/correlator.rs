// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::correlation::key::CorrelationKey;
use crate::domain::models::message::ScrapeResponse;
use crate::queue::dispatch_queue::{DispatchQueue, QueueError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 相关性匹配错误类型
#[derive(Error, Debug)]
pub enum CorrelationError {
    /// 队列错误
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// 相关性匹配结果
#[derive(Debug)]
pub enum CorrelationOutcome {
    /// 在截止时间内匹配到响应
    Matched(ScrapeResponse),
    /// 截止时间内未观察到匹配的响应
    TimedOut,
}

/// 响应匹配器
///
/// 多个并发调用方共享同一个响应通道。每个匹配器只确认
/// 与自己的键匹配的那一条消息，同一批次里观察到的其他
/// 消息全部释放回通道，其他匹配器因此不会丢失或被抢走
/// 自己的匹配。键永不复用，外来键的消息释放即可，不是
/// 错误状态。
pub struct ResponseCorrelator {
    queue: Arc<dyn DispatchQueue>,
    channel: String,
    poll_batch: usize,
    poll_wait: Duration,
}

impl ResponseCorrelator {
    /// 创建新的响应匹配器实例
    ///
    /// # 参数
    ///
    /// * `queue` - 分发队列
    /// * `channel` - 响应通道名
    /// * `poll_batch` - 单次轮询的最大消息数
    /// * `poll_wait` - 单次轮询的阻塞等待上限
    pub fn new(
        queue: Arc<dyn DispatchQueue>,
        channel: String,
        poll_batch: usize,
        poll_wait: Duration,
    ) -> Self {
        Self {
            queue,
            channel,
            poll_batch,
            poll_wait,
        }
    }

    /// 等待与指定键匹配的响应
    ///
    /// 反复轮询响应通道直到匹配或超过截止时间。队列可能
    /// 因重投为同一个键投递多条响应，取首个匹配，后续
    /// 重复消息释放给其他消费者处理。
    ///
    /// # 参数
    ///
    /// * `key` - 请求的相关性键
    /// * `deadline` - 最长等待时间
    ///
    /// # 返回值
    ///
    /// * `Ok(CorrelationOutcome::Matched)` - 匹配到的响应
    /// * `Ok(CorrelationOutcome::TimedOut)` - 超时，由调用方决定后续动作
    /// * `Err(CorrelationError)` - 队列错误
    pub async fn await_response(
        &self,
        key: &CorrelationKey,
        deadline: Duration,
    ) -> Result<CorrelationOutcome, CorrelationError> {
        let deadline_at = Instant::now() + deadline;

        loop {
            let now = Instant::now();
            if now >= deadline_at {
                metrics::counter!("correlation_timeouts_total").increment(1);
                return Ok(CorrelationOutcome::TimedOut);
            }
            let wait = (deadline_at - now).min(self.poll_wait);

            let deliveries = self
                .queue
                .receive_batch(&self.channel, self.poll_batch, wait)
                .await?;

            let mut matched: Option<ScrapeResponse> = None;
            for delivery in deliveries {
                if matched.is_none() && key.matches(&delivery.message.partition_key) {
                    match serde_json::from_value::<ScrapeResponse>(delivery.message.body.clone())
                    {
                        Ok(response) => {
                            self.queue.acknowledge(&delivery).await?;
                            matched = Some(response);
                        }
                        Err(e) => {
                            // 载荷损坏的消息无法交付给任何调用方，确认移除
                            warn!(
                                "Discarding malformed response for key {}: {}",
                                delivery.message.partition_key, e
                            );
                            self.queue.acknowledge(&delivery).await?;
                        }
                    }
                } else {
                    self.queue.release(&delivery).await?;
                }
            }

            if let Some(response) = matched {
                debug!("Matched response for key {}", key);
                return Ok(CorrelationOutcome::Matched(response));
            }
        }
    }
}
