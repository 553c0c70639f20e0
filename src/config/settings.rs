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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// 应用程序配置设置
///
/// 包含服务器、队列、工作器、调度器、相关性匹配、代理池
/// 和抓取凭据等所有配置项。全部在启动时静态加载，不支持
/// 热更新。
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 队列配置
    pub queue: QueueSettings,
    /// 工作器配置
    pub worker: WorkerSettings,
    /// 调度器配置
    pub scheduler: SchedulerSettings,
    /// 相关性匹配配置
    pub correlation: CorrelationSettings,
    /// 代理池配置（未配置时为空池，启动校验会拒绝）
    #[serde(default)]
    pub proxy: ProxySettings,
    /// 抓取器配置
    pub scraper: ScraperSettings,
}

/// 服务器配置设置
#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 队列配置设置
#[derive(Debug, Deserialize)]
pub struct QueueSettings {
    /// 队列后端 (redis, memory)
    pub backend: String,
    /// Redis连接URL (当 backend=redis 时使用)
    pub redis_url: String,
    /// 请求通道名
    pub request_channel: String,
    /// 响应通道名
    pub response_channel: String,
    /// 可见性窗口（秒），超时未确认的消息将被重投
    pub visibility_timeout_secs: u64,
    /// 最大投递次数，超限消息进入死信
    pub max_delivery_count: u32,
}

/// 工作器配置设置
#[derive(Debug, Deserialize)]
pub struct WorkerSettings {
    /// 每轮排空启动的工作器数量
    pub count: usize,
    /// 单次轮询的最大消息数
    pub poll_batch: usize,
    /// 单次轮询的阻塞等待上限（秒）
    pub poll_wait_secs: u64,
    /// 连续空轮询多少次后结束本轮排空
    pub idle_polls: u32,
    /// 单次抓取尝试的总超时（秒）
    pub attempt_timeout_secs: u64,
}

/// 调度器配置设置
#[derive(Debug, Deserialize)]
pub struct SchedulerSettings {
    /// 排空周期（秒）
    pub interval_secs: u64,
}

/// 相关性匹配配置设置
#[derive(Debug, Deserialize)]
pub struct CorrelationSettings {
    /// 等待响应的截止时间（秒）
    pub deadline_secs: u64,
    /// 单次轮询的最大消息数
    pub poll_batch: usize,
    /// 单次轮询的阻塞等待上限（秒）
    pub poll_wait_secs: u64,
}

/// 代理池配置设置
#[derive(Debug, Default, Deserialize)]
pub struct ProxySettings {
    /// 出口代理地址池
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// 抓取器配置设置
#[derive(Debug, Deserialize)]
pub struct ScraperSettings {
    /// 登录用户名
    pub username: String,
    /// 登录密码
    pub password: String,
    /// 登录页URL
    pub login_url: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从默认值、可选配置文件和环境变量依次加载，随后做
    /// 启动校验：代理池为空、凭据为空或通道名为空时拒绝
    /// 启动，绝不在无代理的情况下分发流量。
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载并通过校验的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Start with default settings
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Default queue settings
            .set_default("queue.backend", "redis")?
            .set_default("queue.redis_url", "redis://127.0.0.1:6379")?
            .set_default("queue.request_channel", "scraplink:requests")?
            .set_default("queue.response_channel", "scraplink:responses")?
            .set_default("queue.visibility_timeout_secs", 120)?
            .set_default("queue.max_delivery_count", 5)?
            // Default worker settings
            .set_default("worker.count", 5)?
            .set_default("worker.poll_batch", 10)?
            .set_default("worker.poll_wait_secs", 5)?
            .set_default("worker.idle_polls", 2)?
            .set_default("worker.attempt_timeout_secs", 90)?
            // Default scheduler settings
            .set_default("scheduler.interval_secs", 300)?
            // Default correlation settings
            .set_default("correlation.deadline_secs", 60)?
            .set_default("correlation.poll_batch", 100)?
            .set_default("correlation.poll_wait_secs", 2)?
            // Default scraper settings
            .set_default("scraper.username", "")?
            .set_default("scraper.password", "")?
            .set_default("scraper.login_url", "https://www.linkedin.com/login")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("SCRAPLINK")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("proxy.addresses"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 启动校验
    fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.addresses.iter().all(|a| a.trim().is_empty()) {
            return Err(ConfigError::Message(
                "proxy.addresses must not be empty: refusing to dispatch unproxied traffic"
                    .to_string(),
            ));
        }
        if self.scraper.username.trim().is_empty() || self.scraper.password.trim().is_empty() {
            return Err(ConfigError::Message(
                "scraper.username and scraper.password must be configured".to_string(),
            ));
        }
        if self.queue.request_channel.trim().is_empty()
            || self.queue.response_channel.trim().is_empty()
        {
            return Err(ConfigError::Message(
                "queue channel names must not be empty".to_string(),
            ));
        }
        match self.queue.backend.as_str() {
            "redis" | "memory" => Ok(()),
            other => Err(ConfigError::Message(format!(
                "unknown queue backend: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        Settings {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            queue: QueueSettings {
                backend: "memory".to_string(),
                redis_url: "redis://127.0.0.1:6379".to_string(),
                request_channel: "scraplink:requests".to_string(),
                response_channel: "scraplink:responses".to_string(),
                visibility_timeout_secs: 120,
                max_delivery_count: 5,
            },
            worker: WorkerSettings {
                count: 5,
                poll_batch: 10,
                poll_wait_secs: 5,
                idle_polls: 2,
                attempt_timeout_secs: 90,
            },
            scheduler: SchedulerSettings { interval_secs: 300 },
            correlation: CorrelationSettings {
                deadline_secs: 60,
                poll_batch: 100,
                poll_wait_secs: 2,
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

    #[test]
    fn test_valid_settings_pass_validation() {
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn test_empty_proxy_pool_is_fatal() {
        let mut settings = valid_settings();
        settings.proxy.addresses.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_blank_credentials_are_fatal() {
        let mut settings = valid_settings();
        settings.scraper.username = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut settings = valid_settings();
        settings.queue.backend = "kafka".to_string();
        assert!(settings.validate().is_err());
    }
}
