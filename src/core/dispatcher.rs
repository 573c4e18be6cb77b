//! 动作分发
//!
//! 单一入口 `dispatch(action, id, ctx)`：先校验（失败即 400，不触达任何 handler），
//! 再经能力表解析为 `Action` 并路由到对应 handler。每条路径恰好产出一个 `DispatchReply`，
//! 所有错误在此边界内转换为信封，不向外传播。

use std::sync::Arc;

use serde_json::json;

use crate::core::action::Action;
use crate::core::error::{JobError, ServiceError};
use crate::core::envelope::{
    DispatchReply, ResponseEnvelope, STATUS_BAD_REQUEST, STATUS_INTERNAL_ERROR,
};
use crate::core::messages::{MessageCatalog, MessageKey};
use crate::core::validator::ActionValidator;
use crate::jobs::{job_name, JobContext, JobKind, JobQueue, PluginJob};
use crate::pipeline::{reset_settings_pipeline, ResetState, TaskPipeline};
use crate::services::{
    JobRunner, PluginDetails, PluginInitializer, PluginRecord, PluginRegistry, SettingsService,
    SiteContext,
};

/// 请求级上下文
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub site: SiteContext,
    /// 卸载时本节点是否作为集群发起者；None 时回落到配置默认值
    pub cluster_scope: Option<bool>,
}

impl RequestContext {
    /// 由请求参数构造上下文：站点缺失或为空白时回落到 default_site
    pub fn resolve(site: Option<&str>, default_site: &str, cluster_scope: Option<bool>) -> Self {
        let site = site
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default_site);
        Self {
            site: SiteContext::new(site),
            cluster_scope,
        }
    }

    pub fn with_cluster_scope(mut self, cluster_scope: bool) -> Self {
        self.cluster_scope = Some(cluster_scope);
        self
    }
}

/// 分发器依赖的外部协作者
#[derive(Clone)]
pub struct PluginServices {
    pub registry: Arc<dyn PluginRegistry>,
    pub settings: Arc<dyn SettingsService>,
    pub initializer: Arc<dyn PluginInitializer>,
    pub job_runner: Arc<dyn JobRunner>,
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub cluster_scope_default: bool,
    /// 默认主题标识：即使查找失败也视为有效主题
    pub default_theme: String,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            cluster_scope_default: true,
            default_theme: "default".to_string(),
        }
    }
}

pub struct ActionDispatcher {
    validator: ActionValidator,
    catalog: Arc<dyn MessageCatalog>,
    services: PluginServices,
    queue: Arc<JobQueue>,
    reset_pipeline: TaskPipeline<ResetState>,
    options: DispatcherOptions,
}

impl ActionDispatcher {
    pub fn new(
        services: PluginServices,
        queue: Arc<JobQueue>,
        catalog: Arc<dyn MessageCatalog>,
        options: DispatcherOptions,
    ) -> Self {
        let reset_pipeline = reset_settings_pipeline(
            Arc::clone(&services.registry),
            Arc::clone(&services.settings),
            Arc::clone(&catalog),
        );
        Self {
            validator: ActionValidator::new(Arc::clone(&catalog)),
            catalog,
            services,
            queue,
            reset_pipeline,
            options,
        }
    }

    pub async fn dispatch(
        &self,
        action: &str,
        identifier: Option<&str>,
        ctx: &RequestContext,
    ) -> DispatchReply {
        tracing::info!(action, identifier = ?identifier, site = %ctx.site.site_id, "dispatch");

        let errors = self.validator.validate(action, identifier);
        if !errors.is_empty() {
            tracing::warn!(action, "request rejected: {}", errors.join("; "));
            return DispatchReply::failure(STATUS_BAD_REQUEST, errors);
        }

        // 校验已保证动作在能力表中，且需要时标识符非空
        let id = identifier.map(str::trim).unwrap_or_default();
        match Action::parse(action) {
            Some(Action::Install) => self.install(id).await,
            Some(Action::Uninstall) => self.uninstall(id, ctx).await,
            Some(Action::ResetSettings) => self.reset_settings(id, ctx).await,
            Some(Action::Initialize) => self.initialize(id, ctx).await,
            Some(Action::SetTheme) => self.set_active_theme(id, ctx).await,
            None => DispatchReply::failure(
                STATUS_BAD_REQUEST,
                vec![self.catalog.render(MessageKey::InvalidAction, &[action])],
            ),
        }
    }

    /// 安装：本节点总是集群发起者
    async fn install(&self, plugin_uid: &str) -> DispatchReply {
        self.schedule_job(JobKind::Install, plugin_uid, true).await
    }

    async fn uninstall(&self, plugin_uid: &str, ctx: &RequestContext) -> DispatchReply {
        let initiator = ctx
            .cluster_scope
            .unwrap_or(self.options.cluster_scope_default);
        self.schedule_job(JobKind::Uninstall, plugin_uid, initiator)
            .await
    }

    /// 创建作业并交给队列，立即返回作业 id；作业本身的成败不反映在响应中
    async fn schedule_job(&self, kind: JobKind, plugin_uid: &str, initiator: bool) -> DispatchReply {
        let name = job_name(kind, plugin_uid);
        let ctx = JobContext {
            name: name.clone(),
            plugin_uid: plugin_uid.to_string(),
            plugin_service: Arc::clone(&self.services.job_runner),
            initiator,
        };
        let mut job = PluginJob::new(kind, ctx, Arc::clone(&self.queue));

        match start_job(&mut job, &name, initiator).await {
            Ok(()) => {
                tracing::info!(
                    job = job.id(),
                    kind = job.kind().as_str(),
                    plugin = job.plugin_uid(),
                    initiator = job.is_initiator(),
                    "job scheduled"
                );
                DispatchReply::ok(
                    ResponseEnvelope::success(
                        self.catalog.render(MessageKey::JobScheduled, &[name.as_str()]),
                    )
                    .with_data(json!(job.id())),
                )
            }
            Err(e) => {
                tracing::error!(name = %name, "failed to schedule job: {}", e);
                DispatchReply::failure(STATUS_INTERNAL_ERROR, vec![e.to_string()])
            }
        }
    }

    async fn reset_settings(&self, plugin_uid: &str, ctx: &RequestContext) -> DispatchReply {
        let mut state = ResetState::new(plugin_uid, ctx.site.clone());
        let result = self.reset_pipeline.execute(&mut state).await;

        if !result.succeeded {
            return DispatchReply::failure(STATUS_BAD_REQUEST, result.messages());
        }
        DispatchReply::ok(ResponseEnvelope::success(
            self.catalog
                .render(MessageKey::ResetSettingsSuccess, &[plugin_uid]),
        ))
    }

    /// 查找失败 → 500；初始化失败 → 400
    async fn initialize(&self, plugin_uid: &str, ctx: &RequestContext) -> DispatchReply {
        let record = match self
            .services
            .registry
            .find_plugin(plugin_uid, &ctx.site)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                return DispatchReply::failure(
                    STATUS_INTERNAL_ERROR,
                    vec![self.catalog.render(MessageKey::PluginNotFound, &[plugin_uid])],
                )
            }
            Err(e) => {
                tracing::error!(plugin = plugin_uid, "plugin lookup failed: {}", e);
                return DispatchReply::failure(STATUS_INTERNAL_ERROR, vec![e.to_string()]);
            }
        };

        match self.services.initializer.initialize(&record, &ctx.site).await {
            Ok(()) => DispatchReply::ok(ResponseEnvelope::success(
                self.catalog
                    .render(MessageKey::InitializeSuccess, &[plugin_uid]),
            )),
            Err(e) => DispatchReply::failure(STATUS_BAD_REQUEST, e.messages()),
        }
    }

    /// 查找插件并加载详情；详情缺失按无主题处理
    async fn lookup_theme(
        &self,
        plugin_uid: &str,
        site: &SiteContext,
    ) -> Result<Option<(PluginRecord, Option<PluginDetails>)>, ServiceError> {
        let Some(record) = self.services.registry.find_plugin(plugin_uid, site).await? else {
            return Ok(None);
        };
        let details = self.services.registry.load_details(&record.directory).await?;
        Ok(Some((record, details)))
    }

    async fn set_active_theme(&self, identifier: &str, ctx: &RequestContext) -> DispatchReply {
        let is_default = identifier == self.options.default_theme;

        let theme_id = match self.lookup_theme(identifier, &ctx.site).await {
            Ok(Some((record, details))) => {
                let has_theme = details.map(|d| d.theme.is_some()).unwrap_or(false);
                if !has_theme && !is_default {
                    return DispatchReply::NotFound;
                }
                record.uid
            }
            Ok(None) if is_default => identifier.to_string(),
            Ok(None) => return DispatchReply::NotFound,
            Err(e) if is_default => {
                tracing::warn!("default theme lookup failed, continuing: {}", e);
                identifier.to_string()
            }
            Err(e) => {
                tracing::error!(theme = identifier, "theme lookup failed: {}", e);
                return DispatchReply::failure(STATUS_INTERNAL_ERROR, vec![e.to_string()]);
            }
        };

        match self
            .services
            .settings
            .set_active_theme(&theme_id, &ctx.site)
            .await
        {
            Ok(()) => DispatchReply::ok(ResponseEnvelope::success(
                self.catalog
                    .render(MessageKey::ThemeActivated, &[theme_id.as_str()]),
            )),
            Err(e) => {
                tracing::error!(theme = %theme_id, "failed to persist active theme: {}", e);
                DispatchReply::failure(STATUS_INTERNAL_ERROR, vec![e.to_string()])
            }
        }
    }
}

async fn start_job(job: &mut PluginJob, name: &str, initiator: bool) -> Result<(), JobError> {
    job.init(name)?;
    job.set_run_as_initiator(initiator);
    job.run(None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::envelope::{EnvelopeStatus, STATUS_OK};
    use crate::core::messages::EnglishCatalog;
    use crate::services::memory::CatalogEntry;
    use crate::services::{InMemoryPluginStore, ThemeDefinition};

    fn dispatcher_with(
        store: Arc<InMemoryPluginStore>,
        options: DispatcherOptions,
    ) -> (
        ActionDispatcher,
        tokio::sync::mpsc::UnboundedReceiver<crate::jobs::PendingJob>,
    ) {
        let (queue, pending_rx, _) = JobQueue::new();
        let services = PluginServices {
            registry: store.clone(),
            settings: store.clone(),
            initializer: store.clone(),
            job_runner: store,
        };
        let dispatcher = ActionDispatcher::new(
            services,
            Arc::new(queue),
            Arc::new(EnglishCatalog),
            options,
        );
        (dispatcher, pending_rx)
    }

    #[tokio::test]
    async fn test_install_schedules_initiator_job() {
        let store = Arc::new(InMemoryPluginStore::new());
        let options = DispatcherOptions {
            cluster_scope_default: false,
            ..DispatcherOptions::default()
        };
        let (dispatcher, mut pending_rx) = dispatcher_with(store, options);
        let ctx = RequestContext::default().with_cluster_scope(false);

        let reply = dispatcher.dispatch("install", Some("plugin-x"), &ctx).await;
        assert_eq!(reply.code(), STATUS_OK);
        let envelope = reply.envelope().unwrap();
        assert_eq!(envelope.status, EnvelopeStatus::Success);
        let job_id = envelope.data.as_ref().and_then(|d| d.as_str()).unwrap();
        assert!(!job_id.is_empty());

        let pending = pending_rx.try_recv().unwrap();
        assert_eq!(pending.spec.id, job_id);
        assert_eq!(pending.spec.name, "install-plugin-plugin-x");
        assert!(pending.spec.initiator);
    }

    #[tokio::test]
    async fn test_uninstall_initiator_follows_request_then_config() {
        let store = Arc::new(InMemoryPluginStore::new());
        let (dispatcher, mut pending_rx) = dispatcher_with(store, DispatcherOptions::default());

        dispatcher
            .dispatch("uninstall", Some("p"), &RequestContext::default())
            .await;
        assert!(pending_rx.try_recv().unwrap().spec.initiator);

        let local = RequestContext::default().with_cluster_scope(false);
        dispatcher.dispatch("uninstall", Some("p"), &local).await;
        let pending = pending_rx.try_recv().unwrap();
        assert!(!pending.spec.initiator);
        assert_eq!(pending.spec.name, "uninstall-plugin-p");
    }

    #[tokio::test]
    async fn test_install_fails_when_queue_closed() {
        let store = Arc::new(InMemoryPluginStore::new());
        let (dispatcher, pending_rx) = dispatcher_with(store, DispatcherOptions::default());
        drop(pending_rx);

        let reply = dispatcher
            .dispatch("install", Some("x"), &RequestContext::default())
            .await;
        assert_eq!(reply.code(), STATUS_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_initialize_paths() {
        let store = Arc::new(InMemoryPluginStore::with_entries([
            CatalogEntry::new("ready").installed(),
            CatalogEntry::new("raw"),
        ]));
        let (dispatcher, _rx) = dispatcher_with(store.clone(), DispatcherOptions::default());
        let ctx = RequestContext::default();

        let reply = dispatcher.dispatch("initialize", Some("ready"), &ctx).await;
        assert_eq!(reply.code(), STATUS_OK);
        assert!(store.is_initialized("ready", &ctx.site).await);

        let reply = dispatcher.dispatch("initialize", Some("raw"), &ctx).await;
        assert_eq!(reply.code(), STATUS_BAD_REQUEST);

        let reply = dispatcher.dispatch("initialize", Some("ghost"), &ctx).await;
        assert_eq!(reply.code(), STATUS_INTERNAL_ERROR);
        assert!(reply.envelope().unwrap().message[0].contains("ghost"));
    }

    #[tokio::test]
    async fn test_set_theme_uses_plugin_uid() {
        let store = Arc::new(InMemoryPluginStore::with_entries([
            CatalogEntry::new("aurora").with_theme(ThemeDefinition::default()),
            CatalogEntry::new("seo-tools"),
        ]));
        let (dispatcher, _rx) = dispatcher_with(store.clone(), DispatcherOptions::default());
        let ctx = RequestContext::default();

        let reply = dispatcher.dispatch("set_theme", Some("aurora"), &ctx).await;
        assert_eq!(reply.code(), STATUS_OK);
        assert_eq!(store.active_theme(&ctx.site).await.as_deref(), Some("aurora"));

        // 非主题插件与不存在的插件都走 not-found 信号
        let reply = dispatcher.dispatch("set_theme", Some("seo-tools"), &ctx).await;
        assert!(reply.is_not_found());
        let reply = dispatcher.dispatch("set_theme", Some("nope"), &ctx).await;
        assert!(reply.is_not_found());
        assert_eq!(store.active_theme(&ctx.site).await.as_deref(), Some("aurora"));
    }

    #[tokio::test]
    async fn test_default_theme_always_valid() {
        let store = Arc::new(InMemoryPluginStore::new());
        let (dispatcher, _rx) = dispatcher_with(store.clone(), DispatcherOptions::default());
        let ctx = RequestContext::default();

        let reply = dispatcher.dispatch("set_theme", Some("default"), &ctx).await;
        assert_eq!(reply.code(), STATUS_OK);
        assert_eq!(store.active_theme(&ctx.site).await.as_deref(), Some("default"));
    }

    #[test]
    fn test_request_context_resolve() {
        let ctx = RequestContext::resolve(Some(" eu "), "main", Some(false));
        assert_eq!(ctx.site.site_id, "eu");
        assert_eq!(ctx.cluster_scope, Some(false));

        for site in [None, Some(""), Some("   ")] {
            let ctx = RequestContext::resolve(site, "main", None);
            assert_eq!(ctx.site.site_id, "main");
            assert!(ctx.cluster_scope.is_none());
        }
    }
}
