//! 作业队列与执行器
//!
//! 核心功能：
//! - 作业记录（内存）与状态追踪
//! - 后台异步执行（Semaphore 限制并发）
//! - 结束通知
//!
//! 请求路径只负责 submit；作业体的成败只通过记录与通知在带外可见。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use super::handle::{JobCallback, JobId, JobKind, JobSpec, JobState};
use crate::core::error::JobError;
use crate::services::JobRunner;

/// 已提交、等待执行器领取的作业
pub struct PendingJob {
    pub spec: JobSpec,
    pub runner: Arc<dyn JobRunner>,
    pub callback: Option<JobCallback>,
}

/// 作业记录（供查询）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub kind: JobKind,
    pub plugin_uid: String,
    pub initiator: bool,
    pub state: JobState,
    pub error: Option<String>,
    /// 提交时间（毫秒时间戳）
    pub created_at: i64,
    /// 执行器实际开始执行的时间
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl JobRecord {
    fn from_spec(spec: &JobSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            kind: spec.kind,
            plugin_uid: spec.plugin_uid.clone(),
            initiator: spec.initiator,
            state: JobState::Running,
            error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// 作业结束通知
#[derive(Debug, Clone)]
pub struct JobNotification {
    pub job_id: JobId,
    pub name: String,
    pub state: JobState,
    pub error: Option<String>,
}

/// 作业队列
pub struct JobQueue {
    records: RwLock<HashMap<JobId, JobRecord>>,
    pending_tx: mpsc::UnboundedSender<PendingJob>,
    notification_tx: mpsc::UnboundedSender<JobNotification>,
}

impl JobQueue {
    /// 创建队列，返回待执行接收端与通知接收端
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<PendingJob>,
        mpsc::UnboundedReceiver<JobNotification>,
    ) {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();

        (
            Self {
                records: RwLock::new(HashMap::new()),
                pending_tx,
                notification_tx,
            },
            pending_rx,
            notification_rx,
        )
    }

    /// 提交作业；同一插件的并发作业不做去重
    pub async fn submit(&self, job: PendingJob) -> Result<JobId, JobError> {
        let job_id = job.spec.id.clone();
        let record = JobRecord::from_spec(&job.spec);

        self.records.write().await.insert(job_id.clone(), record);

        if self.pending_tx.send(job).is_err() {
            self.records.write().await.remove(&job_id);
            return Err(JobError::QueueClosed);
        }

        tracing::debug!(job = %job_id, "job submitted");
        Ok(job_id)
    }

    pub async fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.records.read().await.get(job_id).cloned()
    }

    /// 全部记录，按提交时间排序
    pub async fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub async fn mark_running(&self, job_id: &str) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(job_id) {
            record.started_at = Some(chrono::Utc::now().timestamp_millis());
        }
    }

    pub async fn mark_completed(&self, job_id: &str) {
        self.finish(job_id, JobState::Completed, None).await;
    }

    pub async fn mark_failed(&self, job_id: &str, error: String) {
        self.finish(job_id, JobState::Failed, Some(error)).await;
    }

    async fn finish(&self, job_id: &str, state: JobState, error: Option<String>) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(job_id) {
            record.state = state;
            record.error = error.clone();
            record.finished_at = Some(chrono::Utc::now().timestamp_millis());

            let notification = JobNotification {
                job_id: record.id.clone(),
                name: record.name.clone(),
                state,
                error,
            };
            let _ = self.notification_tx.send(notification);
        }
    }

    /// 清理结束时间早于 max_age 的记录；max_age 超出 i64 毫秒范围时按永久保留处理
    pub async fn prune_finished(&self, max_age: Duration) -> usize {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(max_age_ms);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| {
            !(r.state.is_finished() && r.finished_at.map(|f| f < cutoff).unwrap_or(false))
        });
        before - records.len()
    }
}

/// 作业执行器
pub struct JobExecutor {
    queue: Arc<JobQueue>,
    max_concurrent: usize,
}

impl JobExecutor {
    pub fn new(queue: Arc<JobQueue>, max_concurrent: usize) -> Self {
        Self {
            queue,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 启动执行器，直到 shutdown 被取消或队列关闭
    pub async fn start(
        self,
        mut pending_rx: mpsc::UnboundedReceiver<PendingJob>,
        shutdown: CancellationToken,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = pending_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    abort_job(&self.queue, job).await;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let queue = Arc::clone(&self.queue);
            tokio::spawn(async move {
                let _permit = permit;
                execute_job(&queue, job).await;
            });
        }

        // 未领取的作业标记为中止
        pending_rx.close();
        while let Ok(job) = pending_rx.try_recv() {
            abort_job(&self.queue, job).await;
        }
        tracing::info!("Job executor stopped");
    }
}

async fn execute_job(queue: &JobQueue, job: PendingJob) {
    let PendingJob {
        spec,
        runner,
        callback,
    } = job;

    queue.mark_running(&spec.id).await;
    tracing::info!(
        job = %spec.id,
        name = %spec.name,
        initiator = spec.initiator,
        "job started"
    );

    // 作业体 panic 也要落到 Failed，否则记录停在 Running 且没有通知
    let body = async {
        match spec.kind {
            JobKind::Install => runner.install(&spec).await,
            JobKind::Uninstall => runner.uninstall(&spec).await,
        }
    };
    let result = match AssertUnwindSafe(body).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(JobError::Failed(format!(
            "job body panicked: {}",
            panic_message(panic.as_ref())
        ))),
    };

    // 回调先于结束通知，通知到达时回调已执行完
    if let Some(callback) = callback {
        callback(&result);
    }

    match &result {
        Ok(()) => {
            tracing::info!(job = %spec.id, name = %spec.name, "job completed");
            queue.mark_completed(&spec.id).await;
        }
        Err(e) => {
            tracing::error!(job = %spec.id, name = %spec.name, "job failed: {}", e);
            queue.mark_failed(&spec.id, e.to_string()).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn abort_job(queue: &JobQueue, job: PendingJob) {
    let result: Result<(), JobError> = Err(JobError::Aborted);
    tracing::warn!(job = %job.spec.id, name = %job.spec.name, "job aborted by shutdown");
    if let Some(callback) = job.callback {
        callback(&result);
    }
    queue.mark_failed(&job.spec.id, JobError::Aborted.to_string()).await;
}
