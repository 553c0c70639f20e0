// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::dispatch_queue::{Delivery, DispatchQueue, QueueError, QueueMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// 单个通道的状态
#[derive(Default)]
struct ChannelState {
    /// 待投递消息ID，队头先出
    pending: VecDeque<Uuid>,
    /// 处理中消息ID及其锁过期时间
    inflight: HashMap<Uuid, Instant>,
    /// 消息内容
    messages: HashMap<Uuid, QueueMessage>,
    /// 死信消息
    dead: Vec<QueueMessage>,
}

/// 内存分发队列
///
/// 与Redis实现语义一致的进程内队列：至少一次投递、
/// 锁过期重投、超限死信。用于测试和单机部署。
pub struct InMemoryDispatchQueue {
    channels: Mutex<HashMap<String, ChannelState>>,
    notify: Notify,
    visibility_timeout: Duration,
    max_delivery_count: u32,
}

impl InMemoryDispatchQueue {
    /// 创建新的内存分发队列实例
    ///
    /// # 参数
    ///
    /// * `visibility_timeout` - 可见性窗口，超时未确认的消息将被重投
    /// * `max_delivery_count` - 最大投递次数，超限消息进入死信
    pub fn new(visibility_timeout: Duration, max_delivery_count: u32) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            visibility_timeout,
            max_delivery_count,
        }
    }

    /// 通道中待投递消息数（测试与诊断用）
    pub fn pending_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    /// 通道中死信消息数（测试与诊断用）
    pub fn dead_letter_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|s| s.dead.len())
            .unwrap_or(0)
    }

    /// 将锁已过期的处理中消息移回待投递队头，超限的移入死信
    fn reclaim_expired(state: &mut ChannelState, channel: &str, max_delivery_count: u32) {
        let now = Instant::now();
        let expired: Vec<Uuid> = state
            .inflight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            state.inflight.remove(&id);
            let exceeded = state
                .messages
                .get(&id)
                .map(|m| m.delivery_count >= max_delivery_count);
            match exceeded {
                None => continue,
                Some(true) => {
                    if let Some(message) = state.messages.remove(&id) {
                        warn!(
                            "Message {} on channel {} exceeded {} deliveries, moving to dead letter",
                            id, channel, max_delivery_count
                        );
                        metrics::counter!("queue_dead_lettered_total").increment(1);
                        state.dead.push(message);
                    }
                }
                Some(false) => state.pending.push_front(id),
            }
        }
    }
}

#[async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn send(
        &self,
        channel: &str,
        partition_key: &str,
        body: Value,
    ) -> Result<(), QueueError> {
        let message = QueueMessage::new(partition_key, body);
        {
            let mut channels = self.channels.lock();
            let state = channels.entry(channel.to_string()).or_default();
            state.pending.push_back(message.id);
            state.messages.insert(message.id, message);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive_batch(
        &self,
        channel: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            let deliveries = {
                let mut channels = self.channels.lock();
                let state = channels.entry(channel.to_string()).or_default();
                Self::reclaim_expired(state, channel, self.max_delivery_count);

                let mut out = Vec::new();
                while out.len() < max_messages {
                    let Some(id) = state.pending.pop_front() else {
                        break;
                    };
                    let Some(message) = state.messages.get_mut(&id) else {
                        continue;
                    };
                    message.delivery_count += 1;
                    state.inflight.insert(id, Instant::now() + self.visibility_timeout);
                    out.push(Delivery {
                        channel: channel.to_string(),
                        message: message.clone(),
                    });
                }
                out
            };

            if !deliveries.is_empty() {
                return Ok(deliveries);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            // 有界小睡：错过的唤醒最多延迟100ms，同时让锁过期
            // 的消息得到及时回收
            let nap = (deadline - now).min(Duration::from_millis(100));
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = delivery.message.id;
        let mut channels = self.channels.lock();
        let state = channels.entry(delivery.channel.clone()).or_default();
        if state.inflight.remove(&id).is_none() {
            return Err(QueueError::NotInFlight(id));
        }
        state.messages.remove(&id);
        Ok(())
    }

    async fn release(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = delivery.message.id;
        {
            let mut channels = self.channels.lock();
            let state = channels.entry(delivery.channel.clone()).or_default();
            if state.inflight.remove(&id).is_none() {
                return Err(QueueError::NotInFlight(id));
            }
            state.pending.push_front(id);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
