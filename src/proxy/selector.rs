// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use thiserror::Error;

/// 代理选择错误类型
#[derive(Error, Debug)]
pub enum ProxyError {
    /// 代理池为空
    #[error("Proxy pool is empty")]
    EmptyPool,
}

/// 代理选择器
///
/// 从配置的出口地址池中均匀随机选取，每次抓取尝试选择一次。
/// 空池在构造时即报错，系统拒绝在无代理的情况下发出流量。
#[derive(Clone)]
pub struct ProxySelector {
    addresses: Arc<Vec<String>>,
    rng: Arc<Mutex<StdRng>>,
}

impl ProxySelector {
    /// 创建新的代理选择器实例
    ///
    /// # 参数
    ///
    /// * `addresses` - 代理地址池，不能为空
    ///
    /// # 返回值
    ///
    /// * `Ok(ProxySelector)` - 选择器实例
    /// * `Err(ProxyError)` - 地址池为空
    pub fn new(addresses: Vec<String>) -> Result<Self, ProxyError> {
        Self::with_rng(addresses, StdRng::from_os_rng())
    }

    /// 使用固定种子创建选择器，选取序列可复现（测试用）
    pub fn with_seed(addresses: Vec<String>, seed: u64) -> Result<Self, ProxyError> {
        Self::with_rng(addresses, StdRng::seed_from_u64(seed))
    }

    fn with_rng(addresses: Vec<String>, rng: StdRng) -> Result<Self, ProxyError> {
        if addresses.is_empty() {
            return Err(ProxyError::EmptyPool);
        }
        Ok(Self {
            addresses: Arc::new(addresses),
            rng: Arc::new(Mutex::new(rng)),
        })
    }

    /// 均匀随机选取一个代理地址
    pub fn select(&self) -> String {
        let idx = self.rng.lock().random_range(0..self.addresses.len());
        self.addresses[idx].clone()
    }
}
