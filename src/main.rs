//! Beekeeper CLI
//!
//! 用法：beekeeper <action> [id] [--site SITE] [--local] [--config PATH]
//!
//! 针对内存插件目录执行一次 dispatch，打印响应信封；若调度了作业，等待其结束通知后退出。

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use beekeeper::config::load_config;
use beekeeper::core::shutdown::join_with_timeout;
use beekeeper::core::{in_memory_services, load_store, ControllerBuilder, ShutdownManager, ShutdownReason};
use beekeeper::observability;
use beekeeper::DispatchReply;

struct CliArgs {
    action: String,
    id: Option<String>,
    site: Option<String>,
    local: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut positional = Vec::new();
    let mut site = None;
    let mut local = false;
    let mut config = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--site" => site = Some(args.next().context("--site requires a value")?),
            "--config" => config = Some(PathBuf::from(args.next().context("--config requires a value")?)),
            "--local" => local = true,
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(action) = positional.next() else {
        bail!("usage: beekeeper <action> [id] [--site SITE] [--local] [--config PATH]");
    };
    Ok(CliArgs {
        action,
        id: positional.next(),
        site,
        local,
        config,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config.clone()).context("Failed to load config")?;
    let store = load_store(&cfg).context("Failed to load plugin catalog")?;

    let mut controller = ControllerBuilder::new(cfg, in_memory_services(store)).build();
    let shutdown = ShutdownManager::new();
    let executor = controller
        .spawn_executor(shutdown.token())
        .context("executor already started")?;
    let mut notifications = controller
        .take_notifications()
        .context("notifications already taken")?;

    let ctx = controller.request_context(args.site.as_deref(), args.local.then_some(false));
    let reply = controller
        .dispatcher
        .dispatch(&args.action, args.id.as_deref(), &ctx)
        .await;

    let scheduled_job = match &reply {
        DispatchReply::Envelope { code, envelope } => {
            println!("{}", code);
            println!("{}", serde_json::to_string_pretty(envelope)?);
            if envelope.is_success() {
                envelope
                    .data
                    .as_ref()
                    .and_then(|d| d.as_str())
                    .map(str::to_string)
            } else {
                None
            }
        }
        DispatchReply::NotFound => {
            println!("404 not found");
            None
        }
    };

    if let Some(job_id) = scheduled_job {
        while let Some(done) = notifications.recv().await {
            if done.job_id == job_id {
                match done.error {
                    Some(err) => println!("job {} {:?}: {}", done.name, done.state, err),
                    None => println!("job {} {:?}", done.name, done.state),
                }
                break;
            }
        }
    }

    shutdown.shutdown(ShutdownReason::Finished);
    join_with_timeout("job executor", executor, Duration::from_secs(5)).await;
    Ok(())
}
