//! Beekeeper HTTP 服务
//!
//! 启动: cargo run --bin beekeeper-web --features web

#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use beekeeper::config::load_config;
use beekeeper::core::shutdown::join_with_timeout;
use beekeeper::core::{in_memory_services, load_store, ControllerBuilder, ShutdownManager};
use beekeeper::observability;
use beekeeper::web::{router, WebState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let store = load_store(&cfg).context("Failed to load plugin catalog")?;
    let bind = cfg.server.bind.clone();
    let default_site = cfg.site.default_site.clone();

    let mut controller = ControllerBuilder::new(cfg, in_memory_services(store)).build();
    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let executor = controller
        .spawn_executor(shutdown.token())
        .context("executor already started")?;
    let pruner = controller.spawn_pruner(shutdown.token());

    // 作业结束通知只记录日志；调用方通过 /api/jobs/:id 查询结果
    if let Some(mut notifications) = controller.take_notifications() {
        tokio::spawn(async move {
            while let Some(done) = notifications.recv().await {
                match &done.error {
                    Some(err) => tracing::warn!(job = %done.job_id, name = %done.name, "job failed: {}", err),
                    None => tracing::info!(job = %done.job_id, name = %done.name, "job finished"),
                }
            }
        });
    }

    let state = Arc::new(WebState {
        dispatcher: Arc::clone(&controller.dispatcher),
        queue: Arc::clone(&controller.queue),
        default_site,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Beekeeper listening on http://{}", bind);

    let signal = Arc::clone(&shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.wait_for_shutdown().await })
        .await
        .context("HTTP server failed")?;

    join_with_timeout("job executor", executor, Duration::from_secs(10)).await;
    join_with_timeout("job pruner", pruner, Duration::from_secs(1)).await;
    Ok(())
}
