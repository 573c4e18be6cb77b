//! 外部协作者接口与插件模型
//!
//! 插件注册表、设置存储、初始化器与作业体（安装 / 卸载的具体步骤）都不在编排核心之内，
//! 这里只定义编排所需的最小接口；`memory` 提供进程内实现，供二进制与测试使用。

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{JobError, OperationError, ServiceError};
use crate::jobs::JobSpec;

pub use memory::{CatalogError, InMemoryPluginStore};

/// 站点范围（不透明，仅用于协作者的作用域解析）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteContext {
    pub site_id: String,
}

impl SiteContext {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
        }
    }
}

impl Default for SiteContext {
    fn default() -> Self {
        Self::new("default")
    }
}

/// 注册表中的插件条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub uid: String,
    pub name: String,
    /// 插件所在目录名，用于加载详情
    pub directory: String,
    pub version: String,
}

/// 主题定义：settings 为主题自身的默认设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThemeDefinition {
    #[serde(default)]
    pub settings: Option<Map<String, Value>>,
}

impl ThemeDefinition {
    pub fn has_settings(&self) -> bool {
        self.settings.as_ref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

/// 插件详情（从插件目录加载）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDetails {
    pub uid: String,
    pub directory: String,
    /// 插件设置的默认值
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub theme: Option<ThemeDefinition>,
}

/// 插件注册表：按 uid + 站点查找，按目录名加载详情
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn find_plugin(
        &self,
        uid: &str,
        site: &SiteContext,
    ) -> Result<Option<PluginRecord>, ServiceError>;

    async fn load_details(&self, directory: &str) -> Result<Option<PluginDetails>, ServiceError>;
}

/// 设置存储：重置插件 / 主题设置，持久化当前主题
#[async_trait]
pub trait SettingsService: Send + Sync {
    async fn reset_settings(
        &self,
        details: &PluginDetails,
        site: &SiteContext,
    ) -> Result<(), OperationError>;

    async fn reset_theme_settings(
        &self,
        details: &PluginDetails,
        site: &SiteContext,
    ) -> Result<(), OperationError>;

    async fn set_active_theme(&self, theme_id: &str, site: &SiteContext)
        -> Result<(), ServiceError>;
}

/// 插件初始化器
#[async_trait]
pub trait PluginInitializer: Send + Sync {
    async fn initialize(
        &self,
        plugin: &PluginRecord,
        site: &SiteContext,
    ) -> Result<(), OperationError>;
}

/// 作业体：安装 / 卸载的实际步骤（文件、依赖、数据库写入）
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn install(&self, job: &JobSpec) -> Result<(), JobError>;

    async fn uninstall(&self, job: &JobSpec) -> Result<(), JobError>;
}
