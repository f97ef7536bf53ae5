//! Per-request copy driver.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hsiface_bus::report::{ReportClient, ReportClientError};
use hsiface_protocol::{FanoutMessage, MsgType, ReportMessage};
use tokio::time::interval;
use tracing::{info, warn};

use crate::spool::{Resolution, SliceMeta, SpoolIndex};

/// Abstraction over "the external copy agent". The
/// Worker itself only knows how to stage files locally via hard link; the
/// actual transfer to `destination_dir` is delegated so it can be swapped
/// for whatever site-local tool moves bytes to the SPADE ingest host.
pub trait CopyAgent: Send + Sync {
    fn transfer(
        &self,
        staging_dir: &Path,
        destination_dir: &str,
    ) -> impl std::future::Future<Output = Result<(), CopyAgentError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum CopyAgentError {
    #[error("copy agent exited with failure: {0}")]
    Failed(String),
    #[error("failed to launch copy agent: {0}")]
    Spawn(String),
}

/// Shells out to a configured external command: `<program> <args...> <staging_dir> <destination_dir>`.
pub struct ExternalCommandAgent {
    pub program: String,
    pub args: Vec<String>,
}

impl CopyAgent for ExternalCommandAgent {
    async fn transfer(&self, staging_dir: &Path, destination_dir: &str) -> Result<(), CopyAgentError> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(staging_dir)
            .arg(destination_dir)
            .status()
            .await
            .map_err(|e| CopyAgentError::Spawn(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(CopyAgentError::Failed(format!(
                "{} exited with {status}",
                self.program
            )))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("report channel error: {0}")]
    Report(#[from] ReportClientError),
}

/// Runs one request end to end: resolve, link, report STARTED, transfer
/// with WORKING keepalives, report DONE/FAILED, clean up. Errors reported
/// on the Report channel itself are not propagated as `Err` — only a
/// failure to even *emit* a report message is, since at that point the
/// Worker has no way to tell the Sender anything went wrong.
pub async fn drive_request(
    request: &FanoutMessage,
    host: &str,
    spool_dir: &Path,
    staging_root: &Path,
    max_span_ticks: Option<i64>,
    keepalive_interval: Duration,
    agent: &impl CopyAgent,
    report: &mut ReportClient,
) -> Result<(), DriveError> {
    let index = SpoolIndex::load(spool_dir);
    let resolution = index.resolve(request.start_ticks, request.stop_ticks, max_span_ticks);

    if resolution.is_empty() {
        report
            .send(&failed_message(request, host, "data not in spool"))
            .await?;
        return Ok(());
    }

    let timetag = request.start_ticks;
    let staging_dir = staging_root.join(format!("{}_{}_{}", request.prefix, timetag, host));

    if let Err(e) = std::fs::create_dir_all(&staging_dir) {
        report
            .send(&failed_message(
                request,
                host,
                &format!("failed to create staging directory: {e}"),
            ))
            .await?;
        return Ok(());
    }

    if let Err(e) = link_slices(spool_dir, &staging_dir, &resolution.slices) {
        let _ = std::fs::remove_dir_all(&staging_dir);
        report
            .send(&failed_message(
                request,
                host,
                &format!("failed to stage spool slices: {e}"),
            ))
            .await?;
        return Ok(());
    }

    report
        .send(&started_message(request, host, &staging_dir, &resolution))
        .await?;
    info!(request_id = %request.request_id, host, slices = resolution.slices.len(), "staged spool slices");

    let transfer = agent.transfer(&staging_dir, &request.destination_dir);
    tokio::pin!(transfer);
    let mut keepalive = interval(keepalive_interval);
    keepalive.tick().await;

    let outcome = loop {
        tokio::select! {
            result = &mut transfer => break result,
            _ = keepalive.tick() => {
                if let Err(e) = report.send(&working_message(request, host)).await {
                    warn!(request_id = %request.request_id, host, error = %e, "failed to emit WORKING keepalive");
                }
            }
        }
    };

    match outcome {
        Ok(()) => {
            report
                .send(&done_message(request, host, &staging_dir, &resolution))
                .await?;
        }
        Err(e) => {
            report
                .send(&failed_message(request, host, &e.to_string()))
                .await?;
        }
    }

    let _ = std::fs::remove_dir_all(&staging_dir);
    Ok(())
}

/// Hard-link each matched slice into `staging_dir`, falling back to a copy
/// when the spool and staging directory live on different filesystems.
/// Never links a slice already present twice.
fn link_slices(spool_dir: &Path, staging_dir: &Path, slices: &[SliceMeta]) -> std::io::Result<Vec<PathBuf>> {
    let mut linked = Vec::with_capacity(slices.len());
    for slice in slices {
        let name = format!("HitSpool-{}.dat", slice.n);
        let src = spool_dir.join(&name);
        let dst = staging_dir.join(&name);
        if dst.exists() {
            linked.push(dst);
            continue;
        }
        // Hard-linking can fail for reasons other than crossing a
        // filesystem boundary (e.g. a read-only staging root), but a plain
        // copy is always a safe fallback, so we don't special-case the error kind.
        if std::fs::hard_link(&src, &dst).is_err() {
            std::fs::copy(&src, &dst)?;
        }
        linked.push(dst);
    }
    Ok(linked)
}

fn started_message(request: &FanoutMessage, host: &str, staging_dir: &Path, resolution: &Resolution) -> ReportMessage {
    ReportMessage {
        msgtype: MsgType::Started,
        request_id: request.request_id.clone(),
        username: request.username.clone(),
        prefix: request.prefix.clone(),
        start_ticks: Some(resolution.effective_start),
        stop_ticks: Some(resolution.effective_stop),
        copy_dir: Some(staging_dir.display().to_string()),
        destination_dir: request.destination_dir.clone(),
        extract: false,
        host: host.to_owned(),
        hubs: request.hubs.clone(),
        version: request.version,
        reason: None,
    }
}

fn working_message(request: &FanoutMessage, host: &str) -> ReportMessage {
    ReportMessage {
        msgtype: MsgType::Working,
        request_id: request.request_id.clone(),
        username: request.username.clone(),
        prefix: request.prefix.clone(),
        start_ticks: None,
        stop_ticks: None,
        copy_dir: None,
        destination_dir: request.destination_dir.clone(),
        extract: false,
        host: host.to_owned(),
        hubs: request.hubs.clone(),
        version: request.version,
        reason: None,
    }
}

fn done_message(request: &FanoutMessage, host: &str, staging_dir: &Path, resolution: &Resolution) -> ReportMessage {
    ReportMessage {
        msgtype: MsgType::Done,
        request_id: request.request_id.clone(),
        username: request.username.clone(),
        prefix: request.prefix.clone(),
        start_ticks: Some(resolution.effective_start),
        stop_ticks: Some(resolution.effective_stop),
        copy_dir: Some(staging_dir.display().to_string()),
        destination_dir: request.destination_dir.clone(),
        extract: resolution.clamped,
        host: host.to_owned(),
        hubs: request.hubs.clone(),
        version: request.version,
        reason: None,
    }
}

fn failed_message(request: &FanoutMessage, host: &str, reason: &str) -> ReportMessage {
    ReportMessage {
        msgtype: MsgType::Failed,
        request_id: request.request_id.clone(),
        username: request.username.clone(),
        prefix: request.prefix.clone(),
        start_ticks: Some(request.start_ticks),
        stop_ticks: Some(request.stop_ticks),
        copy_dir: None,
        destination_dir: request.destination_dir.clone(),
        extract: false,
        host: host.to_owned(),
        hubs: request.hubs.clone(),
        version: request.version,
        reason: Some(reason.to_owned()),
    }
}
