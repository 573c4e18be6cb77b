//! 动作与能力表
//!
//! 能力表是进程级只读常量：动作名 → (动作, 是否需要标识符)。
//! 不在表中的动作一律无效；路由只通过该表解析，不做按名字的动态调用。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 控制器支持的动作（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Install,
    Uninstall,
    ResetSettings,
    Initialize,
    SetTheme,
}

/// 单条能力声明
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    pub name: &'static str,
    pub action: Action,
    pub requires_identifier: bool,
}

/// 能力表：每个动作必须出现在这里
pub const CAPABILITY_TABLE: &[Capability] = &[
    Capability {
        name: "install",
        action: Action::Install,
        requires_identifier: true,
    },
    Capability {
        name: "uninstall",
        action: Action::Uninstall,
        requires_identifier: true,
    },
    Capability {
        name: "reset_settings",
        action: Action::ResetSettings,
        requires_identifier: true,
    },
    Capability {
        name: "initialize",
        action: Action::Initialize,
        requires_identifier: true,
    },
    Capability {
        name: "set_theme",
        action: Action::SetTheme,
        requires_identifier: true,
    },
];

/// 按名称查表（精确匹配，去除首尾空白）
pub fn lookup(name: &str) -> Option<&'static Capability> {
    let name = name.trim();
    CAPABILITY_TABLE.iter().find(|cap| cap.name == name)
}

/// 表未命中时视为不需要标识符
pub fn requires_identifier(name: &str) -> bool {
    lookup(name).map(|cap| cap.requires_identifier).unwrap_or(false)
}

impl Action {
    pub fn parse(name: &str) -> Option<Self> {
        lookup(name).map(|cap| cap.action)
    }

    pub fn as_str(&self) -> &'static str {
        CAPABILITY_TABLE
            .iter()
            .find(|cap| cap.action == *self)
            .map(|cap| cap.name)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
