//! 顺序任务流水线
//!
//! 步骤严格串行执行，前一步完成是下一步开始的前提；首个失败的步骤终止本次运行，
//! 失败信息（主错误 + 子错误）汇总进 `PipelineResult`。步骤之间通过流水线局部状态 `S` 传递数据。

pub mod reset;

use async_trait::async_trait;

use crate::core::error::OperationError;

pub use reset::{reset_settings_pipeline, ResetState};

/// 流水线中的单个步骤
#[async_trait]
pub trait PipelineStep<S>: Send + Sync
where
    S: Send + 'static,
{
    /// 步骤名称（用于日志）
    fn name(&self) -> &str;

    async fn run(&self, state: &mut S) -> Result<(), OperationError>;
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub succeeded: bool,
    pub primary_error: Option<String>,
    pub sub_errors: Vec<String>,
    /// 失败步骤名
    pub failed_step: Option<String>,
    /// 成功完成的步骤数
    pub completed_steps: usize,
}

impl PipelineResult {
    fn success(completed_steps: usize) -> Self {
        Self {
            succeeded: true,
            primary_error: None,
            sub_errors: Vec::new(),
            failed_step: None,
            completed_steps,
        }
    }

    fn failure(step: &str, completed_steps: usize, error: OperationError) -> Self {
        Self {
            succeeded: false,
            primary_error: Some(error.message),
            sub_errors: error.validation_errors,
            failed_step: Some(step.to_string()),
            completed_steps,
        }
    }

    /// 展平后的消息列表：主错误在前，子错误按原顺序
    pub fn messages(&self) -> Vec<String> {
        self.primary_error
            .iter()
            .cloned()
            .chain(self.sub_errors.iter().cloned())
            .collect()
    }
}

/// 有序步骤序列
pub struct TaskPipeline<S>
where
    S: Send + 'static,
{
    name: String,
    steps: Vec<Box<dyn PipelineStep<S>>>,
}

impl<S> TaskPipeline<S>
where
    S: Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl PipelineStep<S> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 依次执行所有步骤，遇到首个失败即停止
    pub async fn execute(&self, state: &mut S) -> PipelineResult {
        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!(pipeline = %self.name, step = step.name(), "running step");
            if let Err(error) = step.run(state).await {
                tracing::warn!(
                    pipeline = %self.name,
                    step = step.name(),
                    "step failed: {}",
                    error
                );
                return PipelineResult::failure(step.name(), index, error);
            }
        }
        PipelineResult::success(self.steps.len())
    }
}
