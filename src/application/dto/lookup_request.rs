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

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 档案查询请求数据传输对象
///
/// 链接必须是非空的绝对URL，校验在入队之前完成，
/// 不合法的请求同步拒绝，不会产生任何队列消息。
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct LookupRequestDto {
    /// 要查询的档案URL
    #[validate(
        length(min = 1, message = "link must not be empty"),
        url(message = "Invalid URL format")
    )]
    pub link: String,
}
