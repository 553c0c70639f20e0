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

use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use validator::Validate;

use crate::{
    application::dto::{lookup_request::LookupRequestDto, lookup_response::LookupResponseDto},
    config::settings::Settings,
    correlation::correlator::{CorrelationOutcome, ResponseCorrelator},
    correlation::key::CorrelationKey,
    domain::models::message::ScrapeRequest,
    queue::dispatch_queue::DispatchQueue,
};

/// 提交档案查询
///
/// 校验链接、生成相关性键、入队请求，然后在截止时间内
/// 等待匹配的响应。超时返回"no matching response"指示，
/// 是否重试由调用方决定。
pub async fn create_lookup(
    Extension(queue): Extension<Arc<dyn DispatchQueue>>,
    Extension(correlator): Extension<Arc<ResponseCorrelator>>,
    Extension(settings): Extension<Arc<Settings>>,
    Json(payload): Json<LookupRequestDto>,
) -> impl IntoResponse {
    // 校验失败同步拒绝，不产生任何队列消息
    if let Err(e) = payload.validate() {
        warn!("Rejected lookup request: {}", e);
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": e.to_string()
            })),
        )
            .into_response();
    }

    metrics::counter!("lookup_requests_total").increment(1);

    let key = CorrelationKey::generate();
    let request = ScrapeRequest {
        correlation_key: key.clone(),
        target_url: payload.link,
    };

    let body = match serde_json::to_value(&request) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize lookup request: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Failed to process request due to internal error."
                })),
            )
                .into_response();
        }
    };

    if let Err(e) = queue
        .send(
            &settings.queue.request_channel,
            &key.as_partition_key(),
            body,
        )
        .await
    {
        error!("Failed to enqueue lookup request: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "error": "Failed to enqueue request."
            })),
        )
            .into_response();
    }

    info!("Dispatched lookup {} for {}", key, request.target_url);

    let deadline = Duration::from_secs(settings.correlation.deadline_secs);
    match correlator.await_response(&key, deadline).await {
        Ok(CorrelationOutcome::Matched(response)) => (
            StatusCode::OK,
            Json(LookupResponseDto {
                success: true,
                id: key,
                data: response.profile,
            }),
        )
            .into_response(),
        Ok(CorrelationOutcome::TimedOut) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(serde_json::json!({
                "success": false,
                "error": "No matching response available"
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Correlation failed for {}: {}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Failed to await response."
                })),
            )
                .into_response()
        }
    }
}
