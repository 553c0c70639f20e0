// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::dispatch_queue::{Delivery, DispatchQueue, QueueError, QueueMessage};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Redis分发队列
///
/// 每个通道由四个键组成：`<channel>:pending`（待投递ID列表，
/// 尾进头出），`<channel>:inflight`（处理中ID列表），
/// `<channel>:leases`（ID到锁过期时间戳的哈希），
/// `<channel>:messages`（ID到消息信封JSON的哈希）。
/// 超过最大投递次数的消息进入`<channel>:dead`列表。
///
/// 消息ID只在列表之间移动，不会丢失；消费者在认领和写入
/// 租约之间崩溃时，该ID没有租约记录，回收逻辑视其为已过期，
/// 可能造成一次重复投递。协议本身容忍重复。
pub struct RedisDispatchQueue {
    client: redis::Client,
    visibility_timeout: Duration,
    max_delivery_count: u32,
}

impl RedisDispatchQueue {
    /// 创建新的Redis分发队列实例
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    /// * `visibility_timeout` - 可见性窗口，超时未确认的消息将被重投
    /// * `max_delivery_count` - 最大投递次数，超限消息进入死信
    pub fn new(
        redis_url: &str,
        visibility_timeout: Duration,
        max_delivery_count: u32,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            visibility_timeout,
            max_delivery_count,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn pending_key(channel: &str) -> String {
        format!("{}:pending", channel)
    }

    fn inflight_key(channel: &str) -> String {
        format!("{}:inflight", channel)
    }

    fn leases_key(channel: &str) -> String {
        format!("{}:leases", channel)
    }

    fn messages_key(channel: &str) -> String {
        format!("{}:messages", channel)
    }

    fn dead_key(channel: &str) -> String {
        format!("{}:dead", channel)
    }

    /// 将锁已过期的处理中消息移回待投递队头，超限的移入死信
    async fn reclaim_expired(
        &self,
        con: &mut MultiplexedConnection,
        channel: &str,
    ) -> Result<(), QueueError> {
        let inflight = Self::inflight_key(channel);
        let leases = Self::leases_key(channel);
        let messages = Self::messages_key(channel);
        let now = Utc::now().timestamp_millis();

        let ids: Vec<String> = con.lrange(&inflight, 0, -1).await?;
        for id in ids {
            let lease: Option<i64> = con.hget(&leases, &id).await?;
            // 无租约记录说明认领方在写入租约前崩溃，按已过期处理
            if lease.map(|deadline| deadline > now).unwrap_or(false) {
                continue;
            }

            let removed: i64 = con.lrem(&inflight, 0, &id).await?;
            if removed == 0 {
                // 已被其他消费者回收
                continue;
            }
            con.hdel::<_, _, ()>(&leases, &id).await?;

            let raw: Option<String> = con.hget(&messages, &id).await?;
            let Some(raw) = raw else {
                continue;
            };
            let message: QueueMessage = serde_json::from_str(&raw)?;
            if message.delivery_count >= self.max_delivery_count {
                con.hdel::<_, _, ()>(&messages, &id).await?;
                con.rpush::<_, _, ()>(Self::dead_key(channel), &raw).await?;
                warn!(
                    "Message {} on channel {} exceeded {} deliveries, moving to dead letter",
                    id, channel, self.max_delivery_count
                );
                metrics::counter!("queue_dead_lettered_total").increment(1);
            } else {
                con.lpush::<_, _, ()>(Self::pending_key(channel), &id).await?;
            }
        }
        Ok(())
    }

    /// 从待投递列表认领一条消息ID
    ///
    /// 第一条用BLMOVE阻塞等待，后续用LMOVE立即取
    async fn claim_next(
        &self,
        con: &mut MultiplexedConnection,
        channel: &str,
        wait: Option<Duration>,
    ) -> Result<Option<String>, QueueError> {
        let pending = Self::pending_key(channel);
        let inflight = Self::inflight_key(channel);

        let id: Option<String> = match wait {
            Some(wait) => {
                redis::cmd("BLMOVE")
                    .arg(&pending)
                    .arg(&inflight)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .arg(wait.as_secs_f64().max(0.001))
                    .query_async(con)
                    .await?
            }
            None => {
                redis::cmd("LMOVE")
                    .arg(&pending)
                    .arg(&inflight)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .query_async(con)
                    .await?
            }
        };
        Ok(id)
    }
}

#[async_trait]
impl DispatchQueue for RedisDispatchQueue {
    async fn send(
        &self,
        channel: &str,
        partition_key: &str,
        body: Value,
    ) -> Result<(), QueueError> {
        let message = QueueMessage::new(partition_key, body);
        let raw = serde_json::to_string(&message)?;
        let id = message.id.to_string();

        let mut con = self.connection().await?;
        con.hset::<_, _, _, ()>(Self::messages_key(channel), &id, raw)
            .await?;
        con.rpush::<_, _, ()>(Self::pending_key(channel), &id).await?;
        Ok(())
    }

    async fn receive_batch(
        &self,
        channel: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        let mut con = self.connection().await?;
        self.reclaim_expired(&mut con, channel).await?;

        let leases = Self::leases_key(channel);
        let messages = Self::messages_key(channel);
        let inflight = Self::inflight_key(channel);

        let mut deliveries = Vec::new();
        while deliveries.len() < max_messages {
            let blocking_wait = if deliveries.is_empty() {
                Some(wait)
            } else {
                None
            };
            let Some(id) = self.claim_next(&mut con, channel, blocking_wait).await? else {
                break;
            };

            // 先写租约，缩小认领与租约之间的崩溃窗口
            let deadline = Utc::now().timestamp_millis()
                + self.visibility_timeout.as_millis() as i64;
            con.hset::<_, _, _, ()>(&leases, &id, deadline).await?;

            let raw: Option<String> = con.hget(&messages, &id).await?;
            let Some(raw) = raw else {
                // 消息体已被确认删除，丢弃孤儿ID
                con.lrem::<_, _, ()>(&inflight, 0, &id).await?;
                con.hdel::<_, _, ()>(&leases, &id).await?;
                continue;
            };
            let mut message: QueueMessage = serde_json::from_str(&raw)?;
            message.delivery_count += 1;
            con.hset::<_, _, _, ()>(&messages, &id, serde_json::to_string(&message)?)
                .await?;

            deliveries.push(Delivery {
                channel: channel.to_string(),
                message,
            });
        }
        Ok(deliveries)
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = delivery.message.id.to_string();
        let channel = &delivery.channel;

        let mut con = self.connection().await?;
        let removed: i64 = con.lrem(Self::inflight_key(channel), 0, &id).await?;
        if removed == 0 {
            return Err(QueueError::NotInFlight(delivery.message.id));
        }
        con.hdel::<_, _, ()>(Self::leases_key(channel), &id).await?;
        con.hdel::<_, _, ()>(Self::messages_key(channel), &id).await?;
        Ok(())
    }

    async fn release(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let id = delivery.message.id.to_string();
        let channel = &delivery.channel;

        let mut con = self.connection().await?;
        let removed: i64 = con.lrem(Self::inflight_key(channel), 0, &id).await?;
        if removed == 0 {
            return Err(QueueError::NotInFlight(delivery.message.id));
        }
        con.hdel::<_, _, ()>(Self::leases_key(channel), &id).await?;
        // 回到队头，让其他消费者尽快观察到
        con.lpush::<_, _, ()>(Self::pending_key(channel), &id).await?;
        Ok(())
    }
}
