//! 插件作业句柄
//!
//! 生命周期：Created → Initialized（init）→ Running（run，交给队列后立即返回）
//! → Completed | Failed（由执行器在带外完成，请求方不可见）。
//! dispatcher 只在读取 id 之前持有句柄，之后作业归队列所有。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::scheduler::{JobQueue, PendingJob};
use crate::core::error::JobError;
use crate::services::JobRunner;

pub type JobId = String;

/// 作业完成回调（执行器在作业结束后调用一次）
pub type JobCallback = Box<dyn FnOnce(&Result<(), JobError>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Install,
    Uninstall,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Install => "install",
            JobKind::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Initialized,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// 作业名：按动作 + 插件 id 区分，同一插件的安装与卸载不会同名
pub fn job_name(kind: JobKind, plugin_uid: &str) -> String {
    format!("{}-plugin-{}", kind.as_str(), plugin_uid)
}

/// 执行器看到的作业描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub name: String,
    pub kind: JobKind,
    pub plugin_uid: String,
    pub initiator: bool,
}

/// 构造作业所需的上下文
pub struct JobContext {
    pub name: String,
    pub plugin_uid: String,
    pub plugin_service: Arc<dyn JobRunner>,
    pub initiator: bool,
}

/// 作业句柄
pub struct PluginJob {
    id: JobId,
    kind: JobKind,
    name: String,
    plugin_uid: String,
    initiator: bool,
    state: JobState,
    runner: Arc<dyn JobRunner>,
    queue: Arc<JobQueue>,
}

impl PluginJob {
    pub fn new(kind: JobKind, ctx: JobContext, queue: Arc<JobQueue>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            name: ctx.name,
            plugin_uid: ctx.plugin_uid,
            initiator: ctx.initiator,
            state: JobState::Created,
            runner: ctx.plugin_service,
            queue,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn plugin_uid(&self) -> &str {
        &self.plugin_uid
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn expect_state(&self, expected: JobState) -> Result<(), JobError> {
        if self.state != expected {
            return Err(JobError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// 绑定作业名，Created → Initialized
    pub fn init(&mut self, name: impl Into<String>) -> Result<(), JobError> {
        self.expect_state(JobState::Created)?;
        self.name = name.into();
        self.state = JobState::Initialized;
        Ok(())
    }

    /// 设置本节点是否为集群发起者（仅在 run 之前有效）
    pub fn set_run_as_initiator(&mut self, initiator: bool) {
        if self.state == JobState::Running {
            tracing::warn!(job = %self.id, "initiator flag changed after run, ignored");
            return;
        }
        self.initiator = initiator;
    }

    pub fn spec(&self) -> JobSpec {
        JobSpec {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            plugin_uid: self.plugin_uid.clone(),
            initiator: self.initiator,
        }
    }

    /// 交给作业队列后立即返回，不等待作业体执行
    pub async fn run(&mut self, callback: Option<JobCallback>) -> Result<(), JobError> {
        self.expect_state(JobState::Initialized)?;
        let pending = PendingJob {
            spec: self.spec(),
            runner: Arc::clone(&self.runner),
            callback,
        };
        self.queue.submit(pending).await?;
        self.state = JobState::Running;
        Ok(())
    }
}

impl fmt::Debug for PluginJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginJob")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("plugin_uid", &self.plugin_uid)
            .field("initiator", &self.initiator)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryPluginStore;

    fn new_job(queue: Arc<JobQueue>) -> PluginJob {
        let ctx = JobContext {
            name: job_name(JobKind::Install, "x"),
            plugin_uid: "x".into(),
            plugin_service: Arc::new(InMemoryPluginStore::new()),
            initiator: false,
        };
        PluginJob::new(JobKind::Install, ctx, queue)
    }

    #[test]
    fn test_job_names_disambiguate_action() {
        assert_eq!(job_name(JobKind::Install, "x"), "install-plugin-x");
        assert_ne!(
            job_name(JobKind::Install, "x"),
            job_name(JobKind::Uninstall, "x")
        );
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let (queue, mut pending_rx, _) = JobQueue::new();
        let queue = Arc::new(queue);
        let mut job = new_job(Arc::clone(&queue));
        assert_eq!(job.state(), JobState::Created);

        job.init("install-plugin-x").unwrap();
        job.set_run_as_initiator(true);
        assert_eq!(job.state(), JobState::Initialized);

        job.run(None).await.unwrap();
        assert_eq!(job.state(), JobState::Running);

        let pending = pending_rx.try_recv().unwrap();
        assert_eq!(pending.spec.id, job.id());
        assert!(pending.spec.initiator);

        let record = queue.get(job.id()).await.unwrap();
        assert_eq!(record.state, JobState::Running);
        assert!(record.started_at.is_none());
    }

    #[tokio::test]
    async fn test_run_before_init_rejected() {
        let (queue, _pending_rx, _) = JobQueue::new();
        let mut job = new_job(Arc::new(queue));

        let err = job.run(None).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidState {
                expected: JobState::Initialized,
                actual: JobState::Created
            }
        ));
    }

    #[tokio::test]
    async fn test_init_twice_rejected() {
        let (queue, _pending_rx, _) = JobQueue::new();
        let mut job = new_job(Arc::new(queue));
        job.init("a").unwrap();
        assert!(job.init("b").is_err());
        assert_eq!(job.name(), "a");
    }
}
