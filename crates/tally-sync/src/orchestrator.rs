//! One pipeline run for one shop: catalog, the other jobs, then the merge.
//!
//! Jobs that do not read the catalog run alongside it. Jobs that resolve
//! identifiers against it start once it has committed, concurrently with each
//! other. A failing job is logged and recorded, and never stops its siblings
//! or the merge.

use chrono::{DateTime, Utc};
use futures::future::{join, join_all};
use serde::Serialize;
use strum::IntoEnumIterator;
use tally_client::{ApiClient, Transport};
use tally_core::{
  history::{SyncLogEntry, SyncStatus},
  store::ReportStore,
};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
  Result,
  context::RunContext,
  jobs::{JobKind, JobOutput},
  merge::{MergePlan, MergeReport, merge},
  settings::SyncSettings,
};

/// Job name of the merge step in the sync log.
pub const MERGE_JOB: &str = "merge";

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
  pub job:          JobKind,
  pub status:       SyncStatus,
  pub rows_written: usize,
  pub unresolved:   usize,
  pub warnings:     Vec<String>,
  /// Error text of a failed job.
  pub message:      Option<String>,
}

/// Outcome of the merge step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
  pub status:  SyncStatus,
  pub report:  Option<MergeReport>,
  pub message: Option<String>,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
  pub run_id:  Uuid,
  pub shop_id: i64,
  pub jobs:    Vec<JobReport>,
  pub merge:   MergeOutcome,
}

impl PipelineReport {
  pub fn job(&self, kind: JobKind) -> Option<&JobReport> { self.jobs.iter().find(|j| j.job == kind) }

  /// Jobs that did not finish cleanly, the merge included.
  pub fn problems(&self) -> usize {
    let jobs = self.jobs.iter().filter(|j| j.status != SyncStatus::Ok).count();
    jobs + usize::from(self.merge.status != SyncStatus::Ok)
  }
}

fn job_report(kind: JobKind, result: Result<JobOutput>, exhausted: u64) -> JobReport {
  match result {
    Ok(mut out) => {
      if exhausted > 0 {
        out.warn(format!("{exhausted} calls gave up after retries"));
      }
      let status = if out.warnings.is_empty() { SyncStatus::Ok } else { SyncStatus::Partial };
      JobReport {
        job: kind,
        status,
        rows_written: out.rows_written,
        unresolved: out.unresolved,
        warnings: out.warnings,
        message: None,
      }
    }
    Err(e) => JobReport {
      job:          kind,
      status:       SyncStatus::Failed,
      rows_written: 0,
      unresolved:   0,
      warnings:     Vec::new(),
      message:      Some(e.to_string()),
    },
  }
}

async fn record<S: ReportStore>(store: &S, entry: SyncLogEntry) {
  let job = entry.job.clone();
  if let Err(e) = store.record_sync(entry).await {
    warn!(job = %job, error = %e, "could not record sync log entry");
  }
}

async fn run_job<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>, kind: JobKind) -> JobReport {
  let job_ctx = ctx.for_job();
  let started_at = Utc::now();
  let result = kind.run(&job_ctx).instrument(info_span!("job", job = %kind)).await;
  let stats = job_ctx.client.stats().snapshot();

  let report = job_report(kind, result, stats.exhausted);
  match report.status {
    SyncStatus::Failed => error!(
      job = %kind,
      error = report.message.as_deref().unwrap_or(""),
      "job failed"
    ),
    status => info!(
      job = %kind,
      %status,
      rows = report.rows_written,
      unresolved = report.unresolved,
      requests = stats.requests,
      retries = stats.retries,
      "job finished"
    ),
  }

  record(ctx.store, SyncLogEntry {
    run_id: ctx.run_id,
    shop_id: ctx.shop_id,
    job: kind.to_string(),
    status: report.status,
    message: report.message.clone().or_else(|| {
      (!report.warnings.is_empty()).then(|| report.warnings.join("; "))
    }),
    rows_written: report.rows_written,
    unresolved: report.unresolved,
    warnings: report.warnings.len(),
    started_at,
    finished_at: Utc::now(),
  })
  .await;
  report
}

/// Run every job for `shop_id` and fold the results into the canonical
/// report.
///
/// Errors only when the settings or the merge plan are invalid; job and
/// merge failures are reported in the returned [`PipelineReport`].
pub async fn run_pipeline<S: ReportStore, T: Transport>(
  store: &S,
  client: ApiClient<T>,
  shop_id: i64,
  settings: &SyncSettings,
  now: DateTime<Utc>,
) -> Result<PipelineReport> {
  settings.validate()?;
  let plan = MergePlan::canonical()?;
  plan.validate()?;

  let run_id = Uuid::new_v4();
  let ctx = RunContext { run_id, shop_id, store, client, settings, now };

  async {
    info!(anchor = %ctx.anchor(), "pipeline started");
    let (readers, independent): (Vec<_>, Vec<_>) =
      JobKind::iter().filter(|k| *k != JobKind::Catalog).partition(|k| k.needs_catalog());
    let (catalog, early) = join(
      run_job(&ctx, JobKind::Catalog),
      join_all(independent.into_iter().map(|k| run_job(&ctx, k))),
    )
    .await;
    let mut jobs = vec![catalog];
    jobs.extend(early);
    jobs.extend(join_all(readers.into_iter().map(|k| run_job(&ctx, k))).await);

    let started_at = Utc::now();
    let merged = merge(store, shop_id, &plan).instrument(info_span!("merge")).await;
    let merge = match merged {
      Ok(report) => MergeOutcome {
        status:  if report.unresolved > 0 { SyncStatus::Partial } else { SyncStatus::Ok },
        report:  Some(report),
        message: None,
      },
      Err(e) => {
        error!(error = %e, "merge failed");
        MergeOutcome { status: SyncStatus::Failed, report: None, message: Some(e.to_string()) }
      }
    };
    let (rows_written, unresolved) =
      merge.report.as_ref().map(|r| (r.rows_folded, r.unresolved)).unwrap_or_default();
    record(store, SyncLogEntry {
      run_id,
      shop_id,
      job: MERGE_JOB.to_owned(),
      status: merge.status,
      message: merge.message.clone(),
      rows_written,
      unresolved,
      warnings: 0,
      started_at,
      finished_at: Utc::now(),
    })
    .await;

    let report = PipelineReport { run_id, shop_id, jobs, merge };
    info!(problems = report.problems(), "pipeline finished");
    Ok(report)
  }
  .instrument(info_span!("pipeline", shop_id, %run_id))
  .await
}
