//! 内存插件存储：同时实现注册表、设置存储、初始化器与作业体
//!
//! 可从 TOML 目录文件加载种子数据：
//!
//! ```toml
//! [[plugins]]
//! uid = "seo-tools"
//! name = "SEO Tools"
//! directory = "seo-tools"
//! version = "1.2.0"
//! sites = ["default"]          # 省略表示所有站点可见
//! installed = true
//!
//! [plugins.settings]
//! title_suffix = " | Shop"
//!
//! [plugins.theme.settings]
//! color = "blue"
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

use super::{
    JobRunner, PluginDetails, PluginInitializer, PluginRecord, PluginRegistry, SettingsService,
    SiteContext, ThemeDefinition,
};
use crate::core::error::{JobError, OperationError, ServiceError};
use crate::jobs::JobSpec;

/// 目录文件加载错误
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    plugins: Vec<CatalogEntry>,
}

/// 目录文件中的单个插件
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub uid: String,
    pub name: String,
    pub directory: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub theme: Option<ThemeDefinition>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl CatalogEntry {
    pub fn new(uid: impl Into<String>) -> Self {
        let uid = uid.into();
        Self {
            name: uid.clone(),
            directory: uid.clone(),
            uid,
            version: default_version(),
            sites: None,
            installed: false,
            settings: Map::new(),
            theme: None,
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn with_theme(mut self, theme: ThemeDefinition) -> Self {
        self.theme = Some(theme);
        self
    }

    pub fn installed(mut self) -> Self {
        self.installed = true;
        self
    }

    pub fn only_on(mut self, site: impl Into<String>) -> Self {
        self.sites.get_or_insert_with(Vec::new).push(site.into());
        self
    }

    fn visible_on(&self, site: &SiteContext) -> bool {
        match &self.sites {
            Some(sites) => sites.iter().any(|s| s == &site.site_id),
            None => true,
        }
    }

    fn record(&self) -> PluginRecord {
        PluginRecord {
            uid: self.uid.clone(),
            name: self.name.clone(),
            directory: self.directory.clone(),
            version: self.version.clone(),
        }
    }

    fn details(&self) -> PluginDetails {
        PluginDetails {
            uid: self.uid.clone(),
            directory: self.directory.clone(),
            settings: self.settings.clone(),
            theme: self.theme.clone(),
        }
    }
}

/// 每个 (站点, 插件) 的当前设置
#[derive(Debug, Clone, Default)]
struct StoredSettings {
    plugin: Map<String, Value>,
    theme: Map<String, Value>,
}

#[derive(Default)]
struct StoreInner {
    plugins: HashMap<String, CatalogEntry>,
    settings: HashMap<(String, String), StoredSettings>,
    active_theme: HashMap<String, String>,
    initialized: HashMap<(String, String), bool>,
}

/// 进程内插件存储
#[derive(Default)]
pub struct InMemoryPluginStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let plugins = entries
            .into_iter()
            .map(|entry| (entry.uid.clone(), entry))
            .collect();
        Self {
            inner: RwLock::new(StoreInner {
                plugins,
                ..StoreInner::default()
            }),
        }
    }

    /// 从 TOML 目录文件构建
    pub fn from_catalog_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let store = Self::from_catalog_str(&raw)?;
        Ok(store)
    }

    pub fn from_catalog_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        tracing::info!("Loaded {} plugins from catalog", file.plugins.len());
        Ok(Self::with_entries(file.plugins))
    }

    pub async fn is_installed(&self, uid: &str) -> bool {
        self.inner
            .read()
            .await
            .plugins
            .get(uid)
            .map(|p| p.installed)
            .unwrap_or(false)
    }

    pub async fn is_initialized(&self, uid: &str, site: &SiteContext) -> bool {
        let key = (site.site_id.clone(), uid.to_string());
        self.inner
            .read()
            .await
            .initialized
            .get(&key)
            .copied()
            .unwrap_or(false)
    }

    pub async fn active_theme(&self, site: &SiteContext) -> Option<String> {
        self.inner.read().await.active_theme.get(&site.site_id).cloned()
    }

    /// 写入某个设置的当前值（用于演示重置前的修改）
    pub async fn put_setting(&self, uid: &str, site: &SiteContext, key: &str, value: Value) {
        let mut inner = self.inner.write().await;
        inner
            .settings
            .entry((site.site_id.clone(), uid.to_string()))
            .or_default()
            .plugin
            .insert(key.to_string(), value);
    }

    pub async fn setting(&self, uid: &str, site: &SiteContext, key: &str) -> Option<Value> {
        let inner = self.inner.read().await;
        inner
            .settings
            .get(&(site.site_id.clone(), uid.to_string()))
            .and_then(|s| s.plugin.get(key).cloned())
    }

    pub async fn theme_setting(&self, uid: &str, site: &SiteContext, key: &str) -> Option<Value> {
        let inner = self.inner.read().await;
        inner
            .settings
            .get(&(site.site_id.clone(), uid.to_string()))
            .and_then(|s| s.theme.get(key).cloned())
    }
}

/// 默认值中不允许出现 null，逐项报告
fn validate_defaults(defaults: &Map<String, Value>) -> Vec<String> {
    defaults
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| format!("Setting '{}' has no default value", k))
        .collect()
}

#[async_trait]
impl PluginRegistry for InMemoryPluginStore {
    async fn find_plugin(
        &self,
        uid: &str,
        site: &SiteContext,
    ) -> Result<Option<PluginRecord>, ServiceError> {
        let inner = self.inner.read().await;
        Ok(inner
            .plugins
            .get(uid)
            .filter(|entry| entry.visible_on(site))
            .map(CatalogEntry::record))
    }

    async fn load_details(&self, directory: &str) -> Result<Option<PluginDetails>, ServiceError> {
        let inner = self.inner.read().await;
        Ok(inner
            .plugins
            .values()
            .find(|entry| entry.directory == directory)
            .map(CatalogEntry::details))
    }
}

#[async_trait]
impl SettingsService for InMemoryPluginStore {
    async fn reset_settings(
        &self,
        details: &PluginDetails,
        site: &SiteContext,
    ) -> Result<(), OperationError> {
        let errors = validate_defaults(&details.settings);
        if !errors.is_empty() {
            return Err(OperationError::new(format!(
                "Settings of plugin '{}' could not be reset",
                details.uid
            ))
            .with_validation_errors(errors));
        }

        let mut inner = self.inner.write().await;
        inner
            .settings
            .entry((site.site_id.clone(), details.uid.clone()))
            .or_default()
            .plugin = details.settings.clone();
        tracing::debug!(plugin = %details.uid, site = %site.site_id, "plugin settings reset");
        Ok(())
    }

    async fn reset_theme_settings(
        &self,
        details: &PluginDetails,
        site: &SiteContext,
    ) -> Result<(), OperationError> {
        let defaults = details
            .theme
            .as_ref()
            .and_then(|t| t.settings.clone())
            .unwrap_or_default();
        let errors = validate_defaults(&defaults);
        if !errors.is_empty() {
            return Err(OperationError::new(format!(
                "Theme settings of plugin '{}' could not be reset",
                details.uid
            ))
            .with_validation_errors(errors));
        }

        let mut inner = self.inner.write().await;
        inner
            .settings
            .entry((site.site_id.clone(), details.uid.clone()))
            .or_default()
            .theme = defaults;
        tracing::debug!(plugin = %details.uid, site = %site.site_id, "theme settings reset");
        Ok(())
    }

    async fn set_active_theme(
        &self,
        theme_id: &str,
        site: &SiteContext,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.write().await;
        inner
            .active_theme
            .insert(site.site_id.clone(), theme_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl PluginInitializer for InMemoryPluginStore {
    async fn initialize(
        &self,
        plugin: &PluginRecord,
        site: &SiteContext,
    ) -> Result<(), OperationError> {
        let mut inner = self.inner.write().await;
        let installed = inner
            .plugins
            .get(&plugin.uid)
            .map(|p| p.installed)
            .unwrap_or(false);
        if !installed {
            return Err(OperationError::new(format!(
                "Plugin '{}' must be installed before it can be initialized",
                plugin.uid
            )));
        }
        inner
            .initialized
            .insert((site.site_id.clone(), plugin.uid.clone()), true);
        Ok(())
    }
}

#[async_trait]
impl JobRunner for InMemoryPluginStore {
    async fn install(&self, job: &JobSpec) -> Result<(), JobError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .plugins
            .entry(job.plugin_uid.clone())
            .or_insert_with(|| CatalogEntry::new(job.plugin_uid.clone()));
        entry.installed = true;
        tracing::info!(
            job = %job.name,
            initiator = job.initiator,
            "plugin '{}' installed",
            job.plugin_uid
        );
        Ok(())
    }

    async fn uninstall(&self, job: &JobSpec) -> Result<(), JobError> {
        let mut inner = self.inner.write().await;
        match inner.plugins.get_mut(&job.plugin_uid) {
            Some(entry) if entry.installed => {
                entry.installed = false;
                tracing::info!(
                    job = %job.name,
                    initiator = job.initiator,
                    "plugin '{}' uninstalled",
                    job.plugin_uid
                );
                Ok(())
            }
            _ => Err(JobError::Failed(format!(
                "plugin '{}' is not installed",
                job.plugin_uid
            ))),
        }
    }
}
