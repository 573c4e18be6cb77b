//! 错误分类
//!
//! - `OperationError`：设置重置、初始化、持久化等操作失败，可携带有序的子错误（校验错误）
//! - `ServiceError`：外部协作者（插件注册表、设置存储）返回的错误
//! - `JobError`：作业生命周期或作业体执行失败
//!
//! 所有错误都在 handler 边界被转换为 `DispatchReply`，不会越过 dispatcher 向外传播。

use thiserror::Error;

use crate::jobs::JobState;

/// 带子错误的操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
    /// 次级错误（按原顺序），例如设置校验失败的逐项说明
    pub validation_errors: Vec<String>,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            validation_errors: Vec::new(),
        }
    }

    pub fn with_validation_errors(mut self, errors: Vec<String>) -> Self {
        self.validation_errors = errors;
        self
    }

    /// 展平为消息列表：主错误在前，子错误依原顺序紧随
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(1 + self.validation_errors.len());
        out.push(self.message.clone());
        out.extend(self.validation_errors.iter().cloned());
        out
    }
}

/// 外部协作者错误
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl ServiceError {
    /// 转为 OperationError，保留子错误
    pub fn into_operation(self) -> OperationError {
        match self {
            ServiceError::Operation(op) => op,
            other => OperationError::new(other.to_string()),
        }
    }
}

/// 作业错误
#[derive(Error, Debug, Clone)]
pub enum JobError {
    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Job aborted before completion")]
    Aborted,

    #[error("Invalid job state: expected {expected:?}, got {actual:?}")]
    InvalidState { expected: JobState, actual: JobState },

    #[error("Job queue closed")]
    QueueClosed,
}
