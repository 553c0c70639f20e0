// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 相关性键
///
/// 将请求与其最终响应跨异步通道关联起来的唯一令牌，
/// 同时用作队列分区键。基于UUIDv4，键空间足够大，
/// 系统生命周期内碰撞概率可忽略，键永不复用。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(Uuid);

impl CorrelationKey {
    /// 生成新的相关性键
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// 获取键的字符串形式（用作分区键）
    pub fn as_partition_key(&self) -> String {
        self.0.to_string()
    }

    /// 判断是否与给定分区键匹配
    pub fn matches(&self, partition_key: &str) -> bool {
        self.0.to_string() == partition_key
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}
