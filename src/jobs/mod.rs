//! 插件作业：句柄生命周期、作业队列与后台执行器

pub mod handle;
pub mod scheduler;

pub use handle::{job_name, JobCallback, JobContext, JobId, JobKind, JobSpec, JobState, PluginJob};
pub use scheduler::{JobExecutor, JobNotification, JobQueue, JobRecord, PendingJob};
