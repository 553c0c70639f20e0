use async_trait::async_trait;
use scraplink::config::settings::{
    CorrelationSettings, ProxySettings, QueueSettings, SchedulerSettings, ScraperSettings,
    ServerSettings, Settings, WorkerSettings,
};
use scraplink::domain::models::profile::ProfileData;
use scraplink::engines::traits::{Credentials, EngineError, ProfileEngine};
use scraplink::proxy::selector::ProxySelector;
use scraplink::queue::memory_queue::InMemoryDispatchQueue;
use scraplink::workers::scrape_worker::{ScrapeWorker, WorkerOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const REQUESTS: &str = "scraplink:requests";
pub const RESPONSES: &str = "scraplink:responses";

/// 固定返回给定档案的测试引擎
pub struct StubEngine {
    profile: ProfileData,
}

impl StubEngine {
    pub fn new(profile: ProfileData) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl ProfileEngine for StubEngine {
    type Session = ();

    async fn login(&self, _proxy: &str, _credentials: &Credentials) -> Result<(), EngineError> {
        Ok(())
    }

    async fn scrape(&self, _session: &mut (), _url: &str) -> Result<ProfileData, EngineError> {
        Ok(self.profile.clone())
    }

    async fn close(&self, _session: ()) {}
}

/// 只找到姓名的部分提取结果（其余字段为空）
pub fn alice_profile() -> ProfileData {
    ProfileData {
        full_name: Some("Alice Example".to_string()),
        ..Default::default()
    }
}

pub fn memory_queue() -> Arc<InMemoryDispatchQueue> {
    Arc::new(InMemoryDispatchQueue::new(Duration::from_secs(30), 5))
}

/// 在后台启动一个针对内存队列的抓取工作器
///
/// idle_polls给得足够大，让工作器在测试期间持续存活
pub fn spawn_worker(
    queue: Arc<InMemoryDispatchQueue>,
    profile: ProfileData,
) -> JoinHandle<u64> {
    let worker = ScrapeWorker::new(
        queue,
        Arc::new(StubEngine::new(profile)),
        ProxySelector::with_seed(vec!["10.0.0.5:8080".to_string()], 7).unwrap(),
        Credentials {
            username: "user".to_string(),
            password: "pass".to_string(),
        },
        REQUESTS.to_string(),
        RESPONSES.to_string(),
        WorkerOptions {
            poll_batch: 10,
            poll_wait: Duration::from_millis(100),
            idle_polls: 50,
            attempt_timeout: Duration::from_secs(5),
        },
    );
    tokio::spawn(async move { worker.run_until_idle().await })
}

/// 测试用配置：内存队列后端，短相关性截止时间
pub fn test_settings(deadline_secs: u64) -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        queue: QueueSettings {
            backend: "memory".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            request_channel: REQUESTS.to_string(),
            response_channel: RESPONSES.to_string(),
            visibility_timeout_secs: 30,
            max_delivery_count: 5,
        },
        worker: WorkerSettings {
            count: 1,
            poll_batch: 10,
            poll_wait_secs: 1,
            idle_polls: 2,
            attempt_timeout_secs: 5,
        },
        scheduler: SchedulerSettings { interval_secs: 300 },
        correlation: CorrelationSettings {
            deadline_secs,
            poll_batch: 100,
            poll_wait_secs: 1,
        },
        proxy: ProxySettings {
            addresses: vec!["10.0.0.5:8080".to_string()],
        },
        scraper: ScraperSettings {
            username: "user".to_string(),
            password: "pass".to_string(),
            login_url: "https://www.linkedin.com/login".to_string(),
        },
    }
}
