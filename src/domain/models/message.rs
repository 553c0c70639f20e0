// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::correlation::key::CorrelationKey;
use crate::domain::models::profile::ProfileData;
use serde::{Deserialize, Serialize};

/// 抓取请求消息
///
/// 由提交端创建并入队一次，随后不再修改。相关性键同时作为
/// 队列分区键，保证请求与响应可以跨异步通道匹配。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// 相关性键，提交时分配，不可变
    pub correlation_key: CorrelationKey,
    /// 要抓取的档案URL，入队前已通过绝对URI校验
    pub target_url: String,
}

/// 抓取响应消息
///
/// 由工作器在一次成功（或部分成功）的抓取后创建。
/// 相关性键从原始请求原样复制。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    /// 相关性键，与原始请求完全一致
    pub correlation_key: CorrelationKey,
    /// 档案数据载荷，各字段独立可空
    pub profile: ProfileData,
}
