use crate::{
    error::RemapError,
    ids::{DataSourceId, EntityId, OwnerId},
    rewrite::Rewriter,
    store::{CandidateScope, CandidateStore, ExpressionUpdate, TargetingService},
};
use serde::Serialize;
use std::{collections::BTreeMap, thread, time::Duration};
use tracing::{debug, error, info, warn};

/// The knobs of a [`BatchDriver`] run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOptions {
    /// The amount of updates pushed per batch.
    pub batch_size: usize,
    /// Log the progress every `progress_every` candidates (`0` disables it).
    pub progress_every: usize,
    /// Pause after every full batch.
    pub batch_pause: Duration,
    pub scope: CandidateScope,
    /// Rewrite and report without pushing anything.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            progress_every: 100,
            batch_pause: Duration::ZERO,
            scope: CandidateScope::All,
            dry_run: false,
        }
    }
}

/// An update the targeting service rejected, with enough context to replay it by hand.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailedPush {
    pub entity_id: EntityId,
    pub owner_id: OwnerId,
    pub expression: String,
    pub reason: String,
}

/// The counters and the impact of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub processed: usize,
    pub changed: usize,
    pub pushed: usize,
    /// Candidates that could not be parsed and were skipped.
    pub malformed: Vec<EntityId>,
    pub failed: Vec<FailedPush>,
    /// The owners of every changed expression.
    pub impact: BTreeMap<OwnerId, String>,
}

/// Applies a [`Rewriter`] to every candidate of a store and pushes the changed expressions in
/// batches.
///
/// A failed push is logged and reported without stopping the run. Only a failed fetch aborts it.
#[derive(Debug)]
pub struct BatchDriver<'a, S: ?Sized, T: ?Sized> {
    rewriter: &'a Rewriter,
    store: &'a S,
    service: &'a T,
    options: RunOptions,
}

impl<'a, S, T> BatchDriver<'a, S, T>
where
    S: CandidateStore + ?Sized,
    T: TargetingService + ?Sized,
{
    pub fn new(rewriter: &'a Rewriter, store: &'a S, service: &'a T, options: RunOptions) -> Self {
        Self {
            rewriter,
            store,
            service,
            options,
        }
    }

    pub fn run(&self) -> Result<RunReport, RemapError> {
        let origins: Vec<DataSourceId> = self
            .rewriter
            .origins()
            .iter()
            .map(|rule| rule.data_source_id)
            .collect();
        let candidates = self.store.fetch_candidates(&origins, self.options.scope)?;
        let total = candidates.len();
        info!(
            ?origins,
            target = %self.rewriter.target(),
            candidates = total,
            dry_run = self.options.dry_run,
            "starting rewrite"
        );

        let batch_size = self.options.batch_size.max(1);
        let mut report = RunReport::default();
        let mut pending = Vec::with_capacity(batch_size);
        let mut batch = 0;
        for candidate in candidates {
            report.processed += 1;
            match self.rewriter.rewrite_text(&candidate.expression) {
                Ok(rewritten) if rewritten.changed => {
                    debug!(
                        entity_id = %candidate.entity_id,
                        owner_id = %candidate.owner_id,
                        expression = %rewritten.expression,
                        "rewrote expression"
                    );
                    report.changed += 1;
                    report
                        .impact
                        .insert(candidate.owner_id, candidate.owner_name);
                    pending.push(ExpressionUpdate {
                        entity_id: candidate.entity_id,
                        owner_id: candidate.owner_id,
                        expression: rewritten.expression,
                    });
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(entity_id = %candidate.entity_id, %error, "skipping malformed expression");
                    report.malformed.push(candidate.entity_id);
                }
            }

            if pending.len() >= batch_size {
                batch += 1;
                self.flush(batch, &mut pending, &mut report);
                if !self.options.batch_pause.is_zero() {
                    thread::sleep(self.options.batch_pause);
                }
            }

            let progress_every = self.options.progress_every;
            if progress_every != 0 && report.processed % progress_every == 0 {
                info!(processed = report.processed, total, "progress");
            }
        }

        if !pending.is_empty() {
            batch += 1;
            self.flush(batch, &mut pending, &mut report);
        }

        info!(
            processed = report.processed,
            changed = report.changed,
            pushed = report.pushed,
            failed = report.failed.len(),
            malformed = report.malformed.len(),
            owners = report.impact.len(),
            "rewrite complete"
        );
        Ok(report)
    }

    fn flush(&self, batch: usize, pending: &mut Vec<ExpressionUpdate>, report: &mut RunReport) {
        let size = pending.len();
        let failed_before = report.failed.len();
        for update in pending.drain(..) {
            if self.options.dry_run {
                info!(
                    entity_id = %update.entity_id,
                    expression = %update.expression,
                    "dry run, not pushing"
                );
                continue;
            }

            match self.service.push_update(&update) {
                Ok(()) => report.pushed += 1,
                Err(reason) => {
                    error!(
                        entity_id = %update.entity_id,
                        owner_id = %update.owner_id,
                        expression = %update.expression,
                        %reason,
                        "failed to push expression"
                    );
                    report.failed.push(FailedPush {
                        entity_id: update.entity_id,
                        owner_id: update.owner_id,
                        expression: update.expression,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        info!(
            batch,
            size,
            failed = report.failed.len() - failed_before,
            "flushed batch"
        );
    }
}
