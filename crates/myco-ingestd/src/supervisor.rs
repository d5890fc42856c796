//! Process group lifecycle: run every pipeline process until a signal
//! arrives or one of them fails, then cancel the rest and drain.

use anyhow::Result;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ingest_worker::WorkerProcess;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn run(processes: Vec<WorkerProcess>) -> Result<()> {
    let ctx = CancellationToken::new();
    let mut tasks = JoinSet::new();
    for process in processes {
        tasks.spawn(process(ctx.clone()));
    }

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        Some(result) = tasks.join_next() => {
            match result {
                Ok(Ok(())) => warn!("pipeline process exited unexpectedly"),
                Ok(Err(e)) => error!(error = format!("{e:#}"), "pipeline process failed"),
                Err(e) => error!(error = %e, "pipeline process panicked"),
            }
        }
    }

    ctx.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("shutdown grace period elapsed, aborting remaining tasks");
        tasks.abort_all();
    }
    info!("all pipeline processes stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_returning(result: Result<()>) -> WorkerProcess {
        Box::new(move |_ctx| Box::pin(async move { result }))
    }

    #[tokio::test]
    async fn failed_process_cancels_the_rest() {
        let observed = CancellationToken::new();
        let witness = observed.clone();
        let waiter: WorkerProcess = Box::new(move |ctx| {
            Box::pin(async move {
                ctx.cancelled().await;
                witness.cancel();
                Ok(())
            })
        });

        run(vec![
            waiter,
            process_returning(Err(anyhow::anyhow!("broker gone"))),
        ])
        .await
        .unwrap();

        assert!(observed.is_cancelled());
    }

    #[tokio::test]
    async fn completed_process_group_drains_cleanly() {
        run(vec![process_returning(Ok(())), process_returning(Ok(()))])
            .await
            .unwrap();
    }
}
