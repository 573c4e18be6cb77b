//! 动作校验：动作是否在能力表中、需要时是否提供了标识符
//!
//! 两条规则相互独立、全部收集，不短路；未知动作查表未命中即视为不需要标识符。

use std::sync::Arc;

use crate::core::action;
use crate::core::messages::{EnglishCatalog, MessageCatalog, MessageKey};

pub struct ActionValidator {
    catalog: Arc<dyn MessageCatalog>,
}

impl ActionValidator {
    pub fn new(catalog: Arc<dyn MessageCatalog>) -> Self {
        Self { catalog }
    }

    /// 返回错误消息列表；为空表示通过
    pub fn validate(&self, action_name: &str, identifier: Option<&str>) -> Vec<String> {
        let mut errors = Vec::new();
        let action_name = action_name.trim();

        if action_name.is_empty() || action::lookup(action_name).is_none() {
            errors.push(self.catalog.render(MessageKey::InvalidAction, &[action_name]));
        }

        let identifier_blank = identifier.map(|id| id.trim().is_empty()).unwrap_or(true);
        if action::requires_identifier(action_name) && identifier_blank {
            errors.push(
                self.catalog
                    .render(MessageKey::MissingIdentifier, &[action_name]),
            );
        }

        errors
    }
}

impl Default for ActionValidator {
    fn default() -> Self {
        Self::new(Arc::new(EnglishCatalog))
    }
}
