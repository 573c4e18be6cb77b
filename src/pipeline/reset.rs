//! 重置设置流水线：加载插件 → 重置插件设置 → 重置主题设置

use std::sync::Arc;

use async_trait::async_trait;

use super::{PipelineStep, TaskPipeline};
use crate::core::error::OperationError;
use crate::core::messages::{MessageCatalog, MessageKey};
use crate::services::{PluginDetails, PluginRegistry, SettingsService, SiteContext};

/// 流水线局部状态；details 由加载步骤写入，供后续步骤使用
#[derive(Debug, Clone)]
pub struct ResetState {
    pub plugin_uid: String,
    pub site: SiteContext,
    pub details: Option<PluginDetails>,
}

impl ResetState {
    pub fn new(plugin_uid: impl Into<String>, site: SiteContext) -> Self {
        Self {
            plugin_uid: plugin_uid.into(),
            site,
            details: None,
        }
    }

    fn loaded_details(&self) -> Result<&PluginDetails, OperationError> {
        self.details.as_ref().ok_or_else(|| {
            OperationError::new(format!(
                "Plugin details for '{}' were not loaded",
                self.plugin_uid
            ))
        })
    }
}

/// 在当前站点范围内解析插件并加载详情
pub struct LoadPluginStep {
    registry: Arc<dyn PluginRegistry>,
    catalog: Arc<dyn MessageCatalog>,
}

impl LoadPluginStep {
    pub fn new(registry: Arc<dyn PluginRegistry>, catalog: Arc<dyn MessageCatalog>) -> Self {
        Self { registry, catalog }
    }

    fn not_found(&self, uid: &str) -> OperationError {
        OperationError::new(self.catalog.render(MessageKey::PluginNotFound, &[uid]))
    }
}

#[async_trait]
impl PipelineStep<ResetState> for LoadPluginStep {
    fn name(&self) -> &str {
        "load"
    }

    async fn run(&self, state: &mut ResetState) -> Result<(), OperationError> {
        let record = self
            .registry
            .find_plugin(&state.plugin_uid, &state.site)
            .await
            .map_err(|e| e.into_operation())?
            .ok_or_else(|| self.not_found(&state.plugin_uid))?;

        let details = self
            .registry
            .load_details(&record.directory)
            .await
            .map_err(|e| e.into_operation())?
            .ok_or_else(|| self.not_found(&state.plugin_uid))?;

        state.details = Some(details);
        Ok(())
    }
}

pub struct ResetSettingsStep {
    settings: Arc<dyn SettingsService>,
}

impl ResetSettingsStep {
    pub fn new(settings: Arc<dyn SettingsService>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PipelineStep<ResetState> for ResetSettingsStep {
    fn name(&self) -> &str {
        "reset_settings"
    }

    async fn run(&self, state: &mut ResetState) -> Result<(), OperationError> {
        let details = state.loaded_details()?;
        self.settings.reset_settings(details, &state.site).await
    }
}

/// 主题或主题设置缺失时直接成功
pub struct ResetThemeSettingsStep {
    settings: Arc<dyn SettingsService>,
}

impl ResetThemeSettingsStep {
    pub fn new(settings: Arc<dyn SettingsService>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PipelineStep<ResetState> for ResetThemeSettingsStep {
    fn name(&self) -> &str {
        "reset_theme_settings"
    }

    async fn run(&self, state: &mut ResetState) -> Result<(), OperationError> {
        let details = state.loaded_details()?;
        let has_theme_settings = details
            .theme
            .as_ref()
            .map(|t| t.has_settings())
            .unwrap_or(false);
        if !has_theme_settings {
            return Ok(());
        }
        self.settings.reset_theme_settings(details, &state.site).await
    }
}

pub fn reset_settings_pipeline(
    registry: Arc<dyn PluginRegistry>,
    settings: Arc<dyn SettingsService>,
    catalog: Arc<dyn MessageCatalog>,
) -> TaskPipeline<ResetState> {
    TaskPipeline::new("reset_settings")
        .step(LoadPluginStep::new(registry, catalog))
        .step(ResetSettingsStep::new(Arc::clone(&settings)))
        .step(ResetThemeSettingsStep::new(settings))
}
