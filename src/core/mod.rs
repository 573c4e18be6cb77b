//! 核心编排层：动作与能力表、校验、响应信封、错误、分发、组装与关闭

pub mod action;
pub mod builder;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod shutdown;
pub mod validator;

pub use action::{Action, Capability, CAPABILITY_TABLE};
pub use builder::{in_memory_services, load_store, Controller, ControllerBuilder};
pub use dispatcher::{ActionDispatcher, DispatcherOptions, PluginServices, RequestContext};
pub use envelope::{DispatchReply, EnvelopeStatus, ResponseEnvelope};
pub use error::{JobError, OperationError, ServiceError};
pub use messages::{EnglishCatalog, MessageCatalog, MessageKey};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use validator::ActionValidator;
