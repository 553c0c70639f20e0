// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::profile::ProfileData;
use async_trait::async_trait;
use thiserror::Error;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 浏览器启动或通信错误
    #[error("Browser error: {0}")]
    Browser(String),

    /// 认证错误（登录表单元素缺失或提交失败），不在本层重试
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// 页面导航错误
    #[error("Navigation failed: {0}")]
    Navigation(String),
}

/// 登录凭据
#[derive(Debug, Clone)]
pub struct Credentials {
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
}

/// 档案抓取引擎特质
///
/// 会话由单个工作器在单个请求的处理期间独占，处理结束后
/// 必须通过close无条件释放，成功与失败路径都不例外。
#[async_trait]
pub trait ProfileEngine: Send + Sync {
    /// 会话类型，持有已认证的浏览器资源
    type Session: Send;

    /// 通过指定代理建立已认证会话
    async fn login(
        &self,
        proxy: &str,
        credentials: &Credentials,
    ) -> Result<Self::Session, EngineError>;

    /// 抓取指定URL的档案数据
    ///
    /// 每个字段单独查找，找不到时该字段为None而不是整体失败
    async fn scrape(
        &self,
        session: &mut Self::Session,
        url: &str,
    ) -> Result<ProfileData, EngineError>;

    /// 释放会话资源
    async fn close(&self, session: Self::Session);
}
