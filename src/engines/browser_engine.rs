// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::profile::ProfileData;
use crate::engines::traits::{Credentials, EngineError, ProfileEngine};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

const LOGIN_USERNAME_SELECTOR: &str = "#username";
const LOGIN_PASSWORD_SELECTOR: &str = "#password";
const LOGIN_SUBMIT_SELECTOR: &str = "button[type='submit']";

const PROFILE_PIC_SELECTOR: &str =
    ".pv-top-card-profile-picture__image.pv-top-card-profile-picture__image--show.evi-image.ember-view";
const BACKGROUND_COVER_SELECTOR: &str =
    ".profile-background-image.profile-background-image--default";
const FULL_NAME_SELECTOR: &str = ".text-heading-xlarge.inline.t-24.v-align-middle.break-words";
const HEADLINE_SELECTOR: &str = ".text-body-medium.break-words";

/// 浏览器会话
///
/// 持有一个独立的浏览器进程、其事件处理任务和一个页面。
/// Drop时中止事件处理任务，浏览器进程随句柄释放，
/// 覆盖超时取消等非正常退出路径。
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// 浏览器引擎
///
/// 基于chromiumoxide的档案抓取实现。每个请求启动独立的
/// 无头浏览器实例，通过`--proxy-server`参数绑定本次选中的
/// 出口代理。
pub struct BrowserEngine {
    login_url: String,
    request_timeout: Duration,
}

impl BrowserEngine {
    /// 创建新的浏览器引擎实例
    ///
    /// # 参数
    ///
    /// * `login_url` - 登录页URL
    /// * `request_timeout` - 浏览器内部请求超时
    pub fn new(login_url: String, request_timeout: Duration) -> Self {
        Self {
            login_url,
            request_timeout,
        }
    }

    async fn find_text(page: &Page, selector: &str) -> Option<String> {
        match page.find_element(selector).await {
            Ok(element) => match element.inner_text().await {
                Ok(Some(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
                Ok(_) => None,
                Err(e) => {
                    debug!("Failed to read text for selector {}: {}", selector, e);
                    None
                }
            },
            Err(_) => {
                debug!("Element not found: {}", selector);
                None
            }
        }
    }

    async fn find_attribute(page: &Page, selector: &str, attribute: &str) -> Option<String> {
        match page.find_element(selector).await {
            Ok(element) => match element.attribute(attribute).await {
                Ok(value) => value,
                Err(e) => {
                    debug!("Failed to read {} for selector {}: {}", attribute, selector, e);
                    None
                }
            },
            Err(_) => {
                debug!("Element not found: {}", selector);
                None
            }
        }
    }
}

#[async_trait]
impl ProfileEngine for BrowserEngine {
    type Session = BrowserSession;

    /// 启动浏览器并完成登录
    ///
    /// # 参数
    ///
    /// * `proxy` - 本次尝试选中的出口代理地址
    /// * `credentials` - 登录凭据
    ///
    /// # 返回值
    ///
    /// * `Ok(BrowserSession)` - 已认证的会话
    /// * `Err(EngineError)` - 启动、导航或认证失败
    async fn login(
        &self,
        proxy: &str,
        credentials: &Credentials,
    ) -> Result<BrowserSession, EngineError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--proxy-server={}", proxy))
            .request_timeout(self.request_timeout)
            .build()
            .map_err(EngineError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::Browser(e.to_string()))?;

        // Spawn a handler to process browser events
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page(self.login_url.as_str())
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        let session = BrowserSession {
            browser,
            page,
            handler: handler_task,
        };

        // 登录表单元素缺失按认证错误处理，由上层决定是否放弃
        session
            .page
            .find_element(LOGIN_USERNAME_SELECTOR)
            .await
            .map_err(|e| EngineError::Authentication(format!("username field: {}", e)))?
            .type_str(&credentials.username)
            .await
            .map_err(|e| EngineError::Authentication(format!("username input: {}", e)))?;
        session
            .page
            .find_element(LOGIN_PASSWORD_SELECTOR)
            .await
            .map_err(|e| EngineError::Authentication(format!("password field: {}", e)))?
            .type_str(&credentials.password)
            .await
            .map_err(|e| EngineError::Authentication(format!("password input: {}", e)))?;
        session
            .page
            .find_element(LOGIN_SUBMIT_SELECTOR)
            .await
            .map_err(|e| EngineError::Authentication(format!("submit button: {}", e)))?
            .click()
            .await
            .map_err(|e| EngineError::Authentication(format!("submit click: {}", e)))?;
        session
            .page
            .wait_for_navigation()
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        Ok(session)
    }

    /// 抓取档案页面
    ///
    /// 四个字段各自独立查找，缺失字段记录诊断日志后置None
    async fn scrape(
        &self,
        session: &mut BrowserSession,
        url: &str,
    ) -> Result<ProfileData, EngineError> {
        session
            .page
            .goto(url)
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;
        session
            .page
            .wait_for_navigation()
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        let page = &session.page;
        Ok(ProfileData {
            profile_pic_url: Self::find_attribute(page, PROFILE_PIC_SELECTOR, "src").await,
            background_cover_image_url: Self::find_attribute(
                page,
                BACKGROUND_COVER_SELECTOR,
                "src",
            )
            .await,
            full_name: Self::find_text(page, FULL_NAME_SELECTOR).await,
            headline: Self::find_text(page, HEADLINE_SELECTOR).await,
        })
    }

    async fn close(&self, mut session: BrowserSession) {
        if let Err(e) = session.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
    }
}
