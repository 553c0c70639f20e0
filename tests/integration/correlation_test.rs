use crate::helpers::{alice_profile, memory_queue, spawn_worker, REQUESTS, RESPONSES};
use scraplink::correlation::correlator::{CorrelationOutcome, ResponseCorrelator};
use scraplink::correlation::key::CorrelationKey;
use scraplink::domain::models::message::{ScrapeRequest, ScrapeResponse};
use scraplink::domain::models::profile::ProfileData;
use scraplink::queue::dispatch_queue::DispatchQueue;
use scraplink::queue::memory_queue::InMemoryDispatchQueue;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn correlator(queue: Arc<InMemoryDispatchQueue>) -> ResponseCorrelator {
    ResponseCorrelator::new(queue, RESPONSES.to_string(), 100, Duration::from_millis(50))
}

async fn publish_response(queue: &InMemoryDispatchQueue, key: &CorrelationKey, name: &str) {
    let response = ScrapeResponse {
        correlation_key: key.clone(),
        profile: ProfileData {
            full_name: Some(name.to_string()),
            ..Default::default()
        },
    };
    queue
        .send(
            RESPONSES,
            &key.as_partition_key(),
            serde_json::to_value(&response).unwrap(),
        )
        .await
        .unwrap();
}

/// 多个并发调用方共享同一个响应通道，彼此的匹配既不会
/// 丢失也不会被抢走
#[tokio::test]
async fn test_concurrent_callers_share_one_response_channel() {
    let queue = memory_queue();
    let keys: Vec<CorrelationKey> = (0..3).map(|_| CorrelationKey::generate()).collect();

    let mut waiters = Vec::new();
    for key in &keys {
        let queue = queue.clone();
        let key = key.clone();
        waiters.push(tokio::spawn(async move {
            correlator(queue)
                .await_response(&key, Duration::from_secs(5))
                .await
                .unwrap()
        }));
    }

    // 按相反顺序发布响应，每个调用方仍只拿到自己的那条
    for (i, key) in keys.iter().enumerate().rev() {
        publish_response(&queue, key, &format!("Person {}", i)).await;
    }

    for (i, waiter) in waiters.into_iter().enumerate() {
        match waiter.await.unwrap() {
            CorrelationOutcome::Matched(response) => {
                assert_eq!(response.correlation_key, keys[i]);
                assert_eq!(
                    response.profile.full_name.as_deref(),
                    Some(format!("Person {}", i).as_str())
                );
            }
            CorrelationOutcome::TimedOut => panic!("caller {} timed out", i),
        }
    }

    // 所有响应都被各自的调用方确认移除
    assert_eq!(queue.pending_count(RESPONSES), 0);
}

/// 完整场景：提交URL，工作器经代理抓取，只找到姓名，
/// 调用方收到姓名加三个空字段的载荷，键与请求一致
#[tokio::test]
async fn test_end_to_end_profile_lookup_scenario() {
    let queue = memory_queue();
    let worker = spawn_worker(queue.clone(), alice_profile());

    let key = CorrelationKey::generate();
    let request = ScrapeRequest {
        correlation_key: key.clone(),
        target_url: "https://example.com/in/alice".to_string(),
    };
    queue
        .send(
            REQUESTS,
            &key.as_partition_key(),
            serde_json::to_value(&request).unwrap(),
        )
        .await
        .unwrap();

    let outcome = correlator(queue.clone())
        .await_response(&key, Duration::from_secs(5))
        .await
        .unwrap();

    let response = match outcome {
        CorrelationOutcome::Matched(response) => response,
        CorrelationOutcome::TimedOut => panic!("expected a matched response"),
    };
    assert_eq!(response.correlation_key, key);
    assert_eq!(
        serde_json::to_value(&response.profile).unwrap(),
        json!({
            "profilePicUrl": null,
            "backgroundCoverImageUrl": null,
            "fullName": "Alice Example",
            "headline": null
        })
    );

    worker.abort();
}

/// 同一个键被重投产生两条响应时，第一条被取走，
/// 第二条留给其他消费者，不构成错误
#[tokio::test]
async fn test_duplicate_response_is_tolerated() {
    let queue = memory_queue();
    let key = CorrelationKey::generate();
    publish_response(&queue, &key, "Alice Example").await;
    publish_response(&queue, &key, "Alice Example").await;

    let outcome = correlator(queue.clone())
        .await_response(&key, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(matches!(outcome, CorrelationOutcome::Matched(_)));
    assert_eq!(queue.pending_count(RESPONSES), 1);
}
