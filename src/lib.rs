//! Beekeeper - 插件生命周期编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 动作能力表、校验、响应信封、错误分类、分发器、组装与优雅关闭
//! - **jobs**: 安装 / 卸载作业句柄、作业队列与后台执行器
//! - **observability**: tracing 日志初始化
//! - **pipeline**: 顺序任务流水线与重置设置流水线
//! - **services**: 外部协作者接口（插件注册表、设置存储、初始化器、作业体）与内存实现
//! - **web**: axum HTTP 入口（feature = "web"）

pub mod config;
pub mod core;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod services;
#[cfg(feature = "web")]
pub mod web;

pub use crate::core::{ActionDispatcher, DispatchReply, RequestContext, ResponseEnvelope};
