// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::correlation::key::CorrelationKey;
use crate::domain::models::profile::ProfileData;
use serde::{Deserialize, Serialize};

/// 档案查询响应数据传输对象
#[derive(Debug, Deserialize, Serialize)]
pub struct LookupResponseDto {
    /// 请求处理是否成功
    pub success: bool,
    /// 本次查询的相关性键
    pub id: CorrelationKey,
    /// 匹配到的档案数据
    pub data: ProfileData,
}
