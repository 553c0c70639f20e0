// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 投递凭据无效（消息不在处理中集合里）
    #[error("Delivery {0} is not in flight")]
    NotInFlight(Uuid),
}

/// 队列消息信封
///
/// 分区键保证同键消息的投递顺序；投递次数在每次锁过期
/// 重投时递增，用于毒消息死信判定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// 消息唯一标识符
    pub id: Uuid,
    /// 分区键
    pub partition_key: String,
    /// 消息体
    pub body: Value,
    /// 入队时间
    pub enqueued_at: DateTime<Utc>,
    /// 已投递次数
    pub delivery_count: u32,
}

/// 一次消息投递
///
/// 持有者在可见性窗口内独占该消息，必须以acknowledge或
/// release结束投递；二者都不调用时，锁过期后消息会被
/// 重新投递给其他消费者。
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 来源通道
    pub channel: String,
    /// 消息内容
    pub message: QueueMessage,
}

/// 分发队列特质
///
/// 至少一次投递语义：消费者必须容忍重复消息。通道内对
/// 首次投递保持FIFO顺序；重投和release的消息会回到队头。
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// 发送消息到指定通道
    async fn send(
        &self,
        channel: &str,
        partition_key: &str,
        body: Value,
    ) -> Result<(), QueueError>;

    /// 批量接收消息
    ///
    /// 阻塞等待直到至少有一条消息可用或`wait`超时。
    /// 返回的消息进入处理中状态，可见性窗口内对其他
    /// 消费者不可见。
    async fn receive_batch(
        &self,
        channel: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError>;

    /// 确认消息，从通道中永久移除
    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// 释放消息，立即恢复对其他消费者可见
    async fn release(&self, delivery: &Delivery) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: DispatchQueue + ?Sized> DispatchQueue for Arc<T> {
    async fn send(
        &self,
        channel: &str,
        partition_key: &str,
        body: Value,
    ) -> Result<(), QueueError> {
        (**self).send(channel, partition_key, body).await
    }

    async fn receive_batch(
        &self,
        channel: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        (**self).receive_batch(channel, max_messages, wait).await
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError> {
        (**self).acknowledge(delivery).await
    }

    async fn release(&self, delivery: &Delivery) -> Result<(), QueueError> {
        (**self).release(delivery).await
    }
}

impl QueueMessage {
    /// 创建新的队列消息
    pub fn new(partition_key: &str, body: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            partition_key: partition_key.to_string(),
            body,
            enqueued_at: Utc::now(),
            delivery_count: 0,
        }
    }
}
