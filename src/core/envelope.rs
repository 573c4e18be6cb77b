//! 统一响应信封 `{status, message, data}` 与 dispatch 结果

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Failure,
}

/// 响应信封；失败时 message 为消息列表（主错误在前），成功时为单条文案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: EnvelopeStatus,
    pub message: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            message: vec![message.into()],
            data: None,
        }
    }

    pub fn failure(messages: Vec<String>) -> Self {
        Self {
            status: EnvelopeStatus::Failure,
            message: messages,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }
}

/// 一次 dispatch 的结果：信封 + 状态码，或不带信封的「资源不存在」信号
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchReply {
    Envelope {
        code: u16,
        envelope: ResponseEnvelope,
    },
    NotFound,
}

impl DispatchReply {
    pub fn ok(envelope: ResponseEnvelope) -> Self {
        Self::Envelope {
            code: STATUS_OK,
            envelope,
        }
    }

    pub fn failure(code: u16, messages: Vec<String>) -> Self {
        Self::Envelope {
            code,
            envelope: ResponseEnvelope::failure(messages),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            DispatchReply::Envelope { code, .. } => *code,
            DispatchReply::NotFound => 404,
        }
    }

    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            DispatchReply::Envelope { envelope, .. } => Some(envelope),
            DispatchReply::NotFound => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchReply::NotFound)
    }
}
