//! 面向调用方的消息文案
//!
//! 本地化资源属于外部协作者，这里只定义键与渲染接口，并附带英文默认实现。

/// 消息键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    InvalidAction,
    MissingIdentifier,
    PluginNotFound,
    ResetSettingsSuccess,
    InitializeSuccess,
    ThemeActivated,
    JobScheduled,
}

/// 消息目录：按键渲染文案，`args` 依次替换 `{0}`、`{1}` ...
pub trait MessageCatalog: Send + Sync {
    fn render(&self, key: MessageKey, args: &[&str]) -> String;
}

/// 默认英文文案
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishCatalog;

impl EnglishCatalog {
    fn template(key: MessageKey) -> &'static str {
        match key {
            MessageKey::InvalidAction => "Invalid action: '{0}'",
            MessageKey::MissingIdentifier => "A plugin identifier is required for action '{0}'",
            MessageKey::PluginNotFound => "Plugin '{0}' was not found",
            MessageKey::ResetSettingsSuccess => "Settings for plugin '{0}' were reset",
            MessageKey::InitializeSuccess => "Plugin '{0}' was initialized",
            MessageKey::ThemeActivated => "Theme '{0}' is now active",
            MessageKey::JobScheduled => "Job '{0}' has been scheduled",
        }
    }
}

impl MessageCatalog for EnglishCatalog {
    fn render(&self, key: MessageKey, args: &[&str]) -> String {
        let mut text = Self::template(key).to_string();
        for (i, arg) in args.iter().enumerate() {
            text = text.replace(&format!("{{{}}}", i), arg);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_args() {
        let catalog = EnglishCatalog;
        assert_eq!(
            catalog.render(MessageKey::PluginNotFound, &["missing-plugin"]),
            "Plugin 'missing-plugin' was not found"
        );
    }

    #[test]
    fn test_render_without_args_keeps_placeholder() {
        let catalog = EnglishCatalog;
        assert_eq!(
            catalog.render(MessageKey::InvalidAction, &[]),
            "Invalid action: '{0}'"
        );
    }
}
