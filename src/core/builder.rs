//! 控制器构建器：统一的组装逻辑
//!
//! CLI 与 HTTP 服务共用同一套组装：配置 → 协作者 → 作业队列 → 分发器 → 执行器。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::dispatcher::{ActionDispatcher, DispatcherOptions, PluginServices, RequestContext};
use crate::core::messages::{EnglishCatalog, MessageCatalog};
use crate::jobs::{JobExecutor, JobNotification, JobQueue, PendingJob};
use crate::services::{CatalogError, InMemoryPluginStore};

/// 用同一个内存存储充当全部协作者
pub fn in_memory_services(store: Arc<InMemoryPluginStore>) -> PluginServices {
    PluginServices {
        registry: store.clone(),
        settings: store.clone(),
        initializer: store.clone(),
        job_runner: store,
    }
}

/// 按配置加载内存存储：配置了 catalog.path 则从文件加载，否则为空
pub fn load_store(config: &AppConfig) -> Result<Arc<InMemoryPluginStore>, CatalogError> {
    let store = match &config.catalog.path {
        Some(path) => InMemoryPluginStore::from_catalog_file(path)?,
        None => InMemoryPluginStore::new(),
    };
    Ok(Arc::new(store))
}

/// 控制器构建器
pub struct ControllerBuilder {
    config: AppConfig,
    services: PluginServices,
    catalog: Arc<dyn MessageCatalog>,
}

impl ControllerBuilder {
    pub fn new(config: AppConfig, services: PluginServices) -> Self {
        Self {
            config,
            services,
            catalog: Arc::new(EnglishCatalog),
        }
    }

    /// 替换消息目录（本地化）
    pub fn with_catalog(mut self, catalog: Arc<dyn MessageCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn build(self) -> Controller {
        let (queue, pending_rx, notification_rx) = JobQueue::new();
        let queue = Arc::new(queue);

        let options = DispatcherOptions {
            cluster_scope_default: self.config.jobs.cluster_scope,
            default_theme: self.config.themes.default_theme.clone(),
        };
        let dispatcher = Arc::new(ActionDispatcher::new(
            self.services,
            Arc::clone(&queue),
            self.catalog,
            options,
        ));

        Controller {
            config: self.config,
            dispatcher,
            queue,
            pending_rx: Some(pending_rx),
            notification_rx: Some(notification_rx),
        }
    }
}

/// 组装完成的控制器
pub struct Controller {
    pub config: AppConfig,
    pub dispatcher: Arc<ActionDispatcher>,
    pub queue: Arc<JobQueue>,
    pending_rx: Option<mpsc::UnboundedReceiver<PendingJob>>,
    notification_rx: Option<mpsc::UnboundedReceiver<JobNotification>>,
}

impl Controller {
    /// 启动后台执行器（只能启动一次）
    pub fn spawn_executor(&mut self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let pending_rx = self.pending_rx.take()?;
        let executor = JobExecutor::new(
            Arc::clone(&self.queue),
            self.config.jobs.effective_max_concurrent(),
        );
        Some(tokio::spawn(executor.start(pending_rx, shutdown)))
    }

    /// 取走通知接收端（只能取一次）
    pub fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<JobNotification>> {
        self.notification_rx.take()
    }

    /// 周期清理已结束的作业记录；扫描周期与保留时长无关，固定在 1s 到 60s 之间
    pub fn spawn_pruner(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let retain = Duration::from_secs(self.config.jobs.retain_finished_secs);
        let period = retain.clamp(Duration::from_secs(1), Duration::from_secs(60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = queue.prune_finished(retain).await;
                        if removed > 0 {
                            tracing::info!("Pruned {} finished job records", removed);
                        }
                    }
                }
            }
        })
    }

    /// 构造请求上下文：未指定站点时使用配置中的默认站点
    pub fn request_context(&self, site: Option<&str>, cluster_scope: Option<bool>) -> RequestContext {
        RequestContext::resolve(site, &self.config.site.default_site, cluster_scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobState;

    #[tokio::test]
    async fn test_build_and_run_install() {
        let store = Arc::new(InMemoryPluginStore::new());
        let mut controller =
            ControllerBuilder::new(AppConfig::default(), in_memory_services(store.clone())).build();
        let shutdown = CancellationToken::new();
        let executor = controller.spawn_executor(shutdown.clone()).unwrap();
        assert!(controller.spawn_executor(shutdown.clone()).is_none());
        let mut notifications = controller.take_notifications().unwrap();

        let ctx = controller.request_context(None, None);
        assert_eq!(ctx.site.site_id, "default");
        let reply = controller
            .dispatcher
            .dispatch("install", Some("plugin-x"), &ctx)
            .await;
        let job_id = reply.envelope().unwrap().data.clone().unwrap();

        let done = notifications.recv().await.unwrap();
        assert_eq!(done.job_id, job_id.as_str().unwrap());
        assert_eq!(done.state, JobState::Completed);
        assert!(store.is_installed("plugin-x").await);

        shutdown.cancel();
        executor.await.unwrap();
    }

    #[test]
    fn test_request_context_site_fallback() {
        let controller = ControllerBuilder::new(
            AppConfig::default(),
            in_memory_services(Arc::new(InMemoryPluginStore::new())),
        )
        .build();
        assert_eq!(controller.request_context(Some("eu"), None).site.site_id, "eu");
        assert_eq!(controller.request_context(Some(" "), None).site.site_id, "default");
        assert_eq!(
            controller.request_context(None, Some(false)).cluster_scope,
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_load_store_from_default_config() {
        use crate::services::{PluginRegistry, SiteContext};

        let cfg = crate::config::load_config(None).unwrap();
        let store = load_store(&cfg).unwrap();
        let found = store
            .find_plugin("seo-tools", &SiteContext::default())
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
