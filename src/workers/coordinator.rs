// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{Credentials, ProfileEngine};
use crate::proxy::selector::ProxySelector;
use crate::queue::dispatch_queue::DispatchQueue;
use crate::workers::scrape_worker::{ScrapeWorker, WorkerOptions};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

/// 工作池协调器
///
/// 每轮排空启动固定数量的抓取工作器并等待它们全部
/// 空闲退出。工作器之间除队列外不共享可变状态，队列的
/// 消息租约是唯一的同步机制。
pub struct WorkerPoolCoordinator<E: ProfileEngine + 'static> {
    queue: Arc<dyn DispatchQueue>,
    engine: Arc<E>,
    selector: ProxySelector,
    credentials: Credentials,
    request_channel: String,
    response_channel: String,
    options: WorkerOptions,
    worker_count: usize,
}

impl<E: ProfileEngine + 'static> WorkerPoolCoordinator<E> {
    /// 创建新的工作池协调器实例
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn DispatchQueue>,
        engine: Arc<E>,
        selector: ProxySelector,
        credentials: Credentials,
        request_channel: String,
        response_channel: String,
        options: WorkerOptions,
        worker_count: usize,
    ) -> Self {
        Self {
            queue,
            engine,
            selector,
            credentials,
            request_channel,
            response_channel,
            options,
            worker_count,
        }
    }

    /// 执行一轮排空
    ///
    /// 启动`worker_count`个工作器并等待它们全部结束。
    /// 工作器在连续空轮询后自行退出，下一轮由调度器触发。
    pub async fn drain(&self) {
        info!("Starting drain run with {} workers", self.worker_count);

        let mut handles = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let worker = ScrapeWorker::new(
                self.queue.clone(),
                self.engine.clone(),
                self.selector.clone(),
                self.credentials.clone(),
                self.request_channel.clone(),
                self.response_channel.clone(),
                self.options.clone(),
            );
            // We spawn the worker loop on a separate task to avoid blocking the main thread
            // or the loop that spawns workers.
            handles.push(tokio::spawn(async move { worker.run_until_idle().await }));
        }

        let mut processed = 0u64;
        for result in join_all(handles).await {
            match result {
                Ok(count) => processed += count,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        info!("Drain run finished, {} requests processed", processed);
    }
}
