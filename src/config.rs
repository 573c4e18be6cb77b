//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEEKEEPER__*` 覆盖（双下划线表示嵌套，如 `BEEKEEPER__JOBS__MAX_CONCURRENT=8`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub jobs: JobsSection,
    pub themes: ThemesSection,
    pub site: SiteSection,
    pub catalog: CatalogSection,
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// [jobs] 段：作业并发、集群范围默认值、已结束作业记录保留时长
#[derive(Debug, Clone, Deserialize)]
pub struct JobsSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// 卸载请求未显式携带 cluster 标志时使用的默认值：true 表示本节点同时作为集群发起者
    #[serde(default = "default_cluster_scope")]
    pub cluster_scope: bool,
    #[serde(default = "default_retain_finished_secs")]
    pub retain_finished_secs: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_cluster_scope() -> bool {
    true
}

fn default_retain_finished_secs() -> u64 {
    3600
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            cluster_scope: default_cluster_scope(),
            retain_finished_secs: default_retain_finished_secs(),
        }
    }
}

impl JobsSection {
    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.max(1)
    }
}

/// [themes] 段：默认主题标识（始终视为有效主题）
#[derive(Debug, Clone, Deserialize)]
pub struct ThemesSection {
    #[serde(default = "default_theme")]
    pub default_theme: String,
}

fn default_theme() -> String {
    "default".to_string()
}

impl Default for ThemesSection {
    fn default() -> Self {
        Self {
            default_theme: default_theme(),
        }
    }
}

/// [site] 段：请求未指定站点时使用的站点范围
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSection {
    #[serde(default = "default_site")]
    pub default_site: String,
}

fn default_site() -> String {
    "default".to_string()
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            default_site: default_site(),
        }
    }
}

/// [catalog] 段：内存插件注册表的种子文件（TOML）
///
/// 文件中写的相对路径按声明它的配置文件所在目录解析；经环境变量给出时按工作目录解析。
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogSection {
    pub path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 BEEKEEPER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEEKEEPER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();
    // 最后一个声明了 catalog.path 的配置文件所在目录
    let mut catalog_base: Option<PathBuf> = None;

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = PathBuf::from(format!("{}.toml", name));
        if path.exists() {
            catalog_base = declared_catalog_base(&path).or(catalog_base);
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            catalog_base = declared_catalog_base(path).or(catalog_base);
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEEKEEPER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let mut cfg: AppConfig = c.try_deserialize()?;

    if std::env::var_os("BEEKEEPER__CATALOG__PATH").is_none() {
        if let (Some(base), Some(path)) = (catalog_base, cfg.catalog.path.as_mut()) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
    Ok(cfg)
}

/// 若配置文件声明了 catalog.path，返回该文件所在目录
fn declared_catalog_base(file: &Path) -> Option<PathBuf> {
    let text = std::fs::read_to_string(file).ok()?;
    let table: toml::Table = text.parse().ok()?;
    table.get("catalog")?.get("path")?;
    Some(file.parent().map(Path::to_path_buf).unwrap_or_default())
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(cfg.jobs.cluster_scope);
        assert_eq!(cfg.themes.default_theme, "default");
        assert_eq!(cfg.site.default_site, "default");
        assert_eq!(cfg.jobs.max_concurrent, 4);
        assert!(cfg.catalog.path.is_none());
    }

    #[test]
    fn test_effective_max_concurrent_clamped() {
        let jobs = JobsSection {
            max_concurrent: 0,
            ..JobsSection::default()
        };
        assert_eq!(jobs.effective_max_concurrent(), 1);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[jobs]\nmax_concurrent = 2\ncluster_scope = false\n\n[themes]\ndefault_theme = \"classic\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.jobs.max_concurrent, 2);
        assert!(!cfg.jobs.cluster_scope);
        assert_eq!(cfg.themes.default_theme, "classic");
        // 未出现的段落回落到默认值
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        // catalog.path 来自 config/default.toml，按其所在目录解析
        assert_eq!(
            cfg.catalog.path.as_deref(),
            Some(Path::new("config").join("catalog.toml").as_path())
        );
    }

    #[test]
    fn test_catalog_path_relative_to_declaring_file() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = dir.path().join("conf");
        std::fs::create_dir(&conf_dir).unwrap();
        let conf = conf_dir.join("app.toml");
        std::fs::write(&conf, "[catalog]\npath = \"plugins.toml\"\n").unwrap();

        let cfg = load_config(Some(conf)).unwrap();
        assert_eq!(cfg.catalog.path, Some(conf_dir.join("plugins.toml")));
    }

    #[test]
    fn test_absolute_catalog_path_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("catalog.toml");
        let conf = dir.path().join("app.toml");
        std::fs::write(
            &conf,
            format!("[catalog]\npath = {:?}\n", catalog.display().to_string()),
        )
        .unwrap();

        let cfg = load_config(Some(conf)).unwrap();
        assert_eq!(cfg.catalog.path, Some(catalog));
    }

    #[test]
    fn test_declared_catalog_base() {
        let dir = tempfile::tempdir().unwrap();
        let with = dir.path().join("with.toml");
        let without = dir.path().join("without.toml");
        std::fs::write(&with, "[catalog]\npath = \"c.toml\"\n").unwrap();
        std::fs::write(&without, "[jobs]\nmax_concurrent = 1\n").unwrap();

        assert_eq!(declared_catalog_base(&with), Some(dir.path().to_path_buf()));
        assert_eq!(declared_catalog_base(&without), None);
        assert_eq!(declared_catalog_base(&dir.path().join("missing.toml")), None);
    }
}
