//! Pipeline orchestrator
//!
//! Drives one roll number through `listing fetch -> listing parse ->
//! (detail fetch -> detail parse)* -> aggregate -> persist` and aggregates a
//! run summary over many roll numbers.
//!
//! Failure semantics follow the stage: a listing failure is fatal for that
//! roll number (no appeals can be discovered), a single appeal's detail
//! failure is recorded and the appeal persists without detail, and nothing
//! aborts the run as a whole. Roll numbers are processed concurrently under
//! a bounded worker count; the fetcher separately caps in-flight HTTP.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{AggregateResult, AppealDetailRecord, AppealEntry, AppealSummary};
use crate::infrastructure::fetcher::Fetcher;
use crate::infrastructure::parsing::{
    DetailParseContext, DetailParser, ListingParser, ParseContext,
};
use crate::infrastructure::repository::{AppealRepository, StoreReport};

/// Processing stages of one roll number. A failure names the stage that was
/// being performed when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Pending,
    ListingFetch,
    ListingParse,
    DetailFetch,
    DetailParse,
    Aggregate,
    Persist,
}

impl PipelineStage {
    pub fn is_listing_stage(self) -> bool {
        matches!(self, Self::ListingFetch | Self::ListingParse)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::ListingFetch => "listing fetch",
            Self::ListingParse => "listing parse",
            Self::DetailFetch => "detail fetch",
            Self::DetailParse => "detail parse",
            Self::Aggregate => "aggregate",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// One unit of input: a normalized roll number and its resolved listing URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollNumberTarget {
    pub roll_number: String,
    pub url: String,
}

/// Run-level behavior switches.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Follow each appeal's detail link and parse the detail page.
    pub fetch_details: bool,

    /// Roll numbers processed concurrently.
    pub max_concurrent_rolls: usize,

    /// Overall deadline; when it elapses the run's cancellation token fires.
    pub deadline: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch_details: true,
            max_concurrent_rolls: 4,
            deadline: None,
        }
    }
}

/// Terminal failure of one roll number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollNumberFailure {
    pub roll_number: String,
    pub stage: PipelineStage,
    pub cause: String,
}

/// Successful outcome of one roll number: the aggregate tree and what the
/// store did with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollNumberResult {
    pub aggregate: AggregateResult,
    pub report: StoreReport,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_at_listing: usize,
    pub succeeded_with_partial_detail: usize,
    pub failures: Vec<RollNumberFailure>,
    pub results: Vec<RollNumberResult>,
}

/// The acquisition & extraction pipeline.
pub struct Pipeline {
    worker: Arc<RollWorker>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        fetcher: Fetcher,
        listing_parser: ListingParser,
        detail_parser: DetailParser,
        repository: AppealRepository,
        options: PipelineOptions,
    ) -> Self {
        Self {
            worker: Arc::new(RollWorker {
                fetcher,
                listing_parser,
                detail_parser,
                repository,
                fetch_details: options.fetch_details,
            }),
            options,
        }
    }

    /// Process every target, collecting exactly one outcome per roll number.
    pub async fn run(
        &self,
        targets: Vec<RollNumberTarget>,
        cancel: CancellationToken,
    ) -> RunSummary {
        let total = targets.len();
        info!(
            "starting pipeline run: {} roll number(s), details {}",
            total,
            if self.options.fetch_details { "on" } else { "off" }
        );

        if let Some(deadline) = self.options.deadline {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                if !cancel.is_cancelled() {
                    warn!("run deadline of {:?} reached, cancelling", deadline);
                    cancel.cancel();
                }
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_rolls.max(1)));
        let mut tasks = Vec::with_capacity(total);

        for target in targets {
            let worker = Arc::clone(&self.worker);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let roll_number = target.roll_number.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(failure(&target.roll_number, PipelineStage::Pending, "worker pool closed"));
                    }
                };

                if cancel.is_cancelled() {
                    return Err(failure(&target.roll_number, PipelineStage::Pending, "run cancelled"));
                }

                worker.process(target, cancel).await
            });

            tasks.push((roll_number, handle));
        }

        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        for (roll_number, handle) in tasks {
            match handle.await {
                Ok(Ok(result)) => {
                    if !result.report.detail_failures.is_empty() {
                        summary.succeeded_with_partial_detail += 1;
                    }
                    summary.succeeded += 1;
                    summary.results.push(result);
                }
                Ok(Err(fail)) => {
                    if fail.stage.is_listing_stage() {
                        summary.failed_at_listing += 1;
                    }
                    summary.failures.push(fail);
                }
                Err(e) => {
                    summary.failures.push(failure(
                        &roll_number,
                        PipelineStage::Pending,
                        &format!("worker task failed: {e}"),
                    ));
                }
            }
        }

        info!(
            "pipeline run finished: {}/{} succeeded ({} with partial detail), {} failed at listing",
            summary.succeeded, summary.total, summary.succeeded_with_partial_detail,
            summary.failed_at_listing
        );

        summary
    }
}

fn failure(roll_number: &str, stage: PipelineStage, cause: &str) -> RollNumberFailure {
    RollNumberFailure {
        roll_number: roll_number.to_string(),
        stage,
        cause: cause.to_string(),
    }
}

/// Per-roll-number processing shared by the spawned workers.
struct RollWorker {
    fetcher: Fetcher,
    listing_parser: ListingParser,
    detail_parser: DetailParser,
    repository: AppealRepository,
    fetch_details: bool,
}

impl RollWorker {
    async fn process(
        &self,
        target: RollNumberTarget,
        cancel: CancellationToken,
    ) -> Result<RollNumberResult, RollNumberFailure> {
        let roll = target.roll_number.as_str();

        let listing_raw = self
            .fetcher
            .fetch_with_cancel(&target.url, &cancel)
            .await
            .map_err(|e| failure(roll, PipelineStage::ListingFetch, &e.to_string()))?;
        debug!("roll {}: listing fetched in {} attempt(s)", roll, listing_raw.attempts);

        let context = ParseContext::new(target.url.clone()).with_roll_number(roll);
        let page = self
            .listing_parser
            .parse(&listing_raw.body, &context)
            .map_err(|e| failure(roll, PipelineStage::ListingParse, &e.to_string()))?;
        debug!("roll {}: listing parsed, {} appeal(s)", roll, page.appeals.len());

        let entries = if self.fetch_details {
            let detail_tasks = page.appeals.iter().cloned().map(|summary| {
                let cancel = cancel.clone();
                async move {
                    let (detail, detail_failure) = self.fetch_detail(&summary, &cancel).await;
                    AppealEntry {
                        summary,
                        detail,
                        detail_failure,
                    }
                }
            });
            futures::future::join_all(detail_tasks).await
        } else {
            page.appeals
                .into_iter()
                .map(|summary| AppealEntry {
                    summary,
                    detail: None,
                    detail_failure: None,
                })
                .collect()
        };

        // A cancelled roll must not commit a half-fetched aggregate.
        if cancel.is_cancelled() {
            return Err(failure(roll, PipelineStage::Aggregate, "run cancelled"));
        }

        let aggregate = AggregateResult {
            roll_number: page.property.roll_number.clone(),
            source_url: target.url.clone(),
            property: page.property,
            appeals: entries,
            fetched_at: Utc::now(),
        };

        let report = self
            .repository
            .store_aggregate(&aggregate)
            .await
            .map_err(|e| failure(roll, PipelineStage::Persist, &e.to_string()))?;

        Ok(RollNumberResult { aggregate, report })
    }

    /// Fetch and parse one appeal's detail page. Failures here are recorded
    /// per appeal, never propagated: the appeal persists without detail.
    async fn fetch_detail(
        &self,
        summary: &AppealSummary,
        cancel: &CancellationToken,
    ) -> (Option<AppealDetailRecord>, Option<String>) {
        let Some(url) = &summary.detail_url else {
            debug!("appeal {} carries no detail link", summary.appeal_number);
            return (None, None);
        };

        let raw = match self.fetcher.fetch_with_cancel(url, cancel).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("appeal {}: detail fetch failed: {}", summary.appeal_number, e);
                return (None, Some(format!("detail fetch failed: {e}")));
            }
        };

        let context = DetailParseContext::new(summary.appeal_number.clone(), url.clone());
        match self.detail_parser.parse(&raw.body, &context) {
            Ok(detail) => (Some(detail), None),
            Err(e) => {
                warn!("appeal {}: detail parse failed: {}", summary.appeal_number, e);
                (None, Some(format!("detail parse failed: {e}")))
            }
        }
    }
}
