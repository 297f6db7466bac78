use chrono::Utc;
use tracing::{info, warn};

use leadflow_core::errors::ApplicationError;

use crate::reconcile::{CreationOutcome, ReconcileEngine, UpdateOutcome};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub created: usize,
    pub merged: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReconcileEngine {
    /// Creation pass over every unlinked session below the attempt cap.
    /// One session's failure never aborts the rest of the sweep.
    pub async fn run_creation_sweep(&self) -> Result<SweepReport, ApplicationError> {
        let candidates = self
            .leads
            .list_unlinked(self.config.max_creation_attempts)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let mut report = SweepReport::default();

        for mut record in candidates {
            report.scanned += 1;

            let now = Utc::now();
            let lease_until = now + self.config.lease();
            match self.leads.try_claim(&record.session_id, now, lease_until).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(
                        event_name = "sweep.lease_held",
                        session_id = %record.session_id,
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(error) => {
                    warn!(
                        event_name = "sweep.claim_error",
                        session_id = %record.session_id,
                        error = %error,
                    );
                    report.failed += 1;
                    continue;
                }
            }
            record.lease_until = Some(lease_until);

            match self.reconcile_creation(&record).await {
                Ok(CreationOutcome::Created { .. }) => report.created += 1,
                Ok(CreationOutcome::MergedDuplicate { .. }) => report.merged += 1,
                Ok(CreationOutcome::Failed { message }) => {
                    warn!(
                        event_name = "sweep.creation_failed",
                        session_id = %record.session_id,
                        message = %message,
                    );
                    report.failed += 1;
                }
                Ok(_) => report.skipped += 1,
                Err(error) => {
                    warn!(
                        event_name = "sweep.session_error",
                        session_id = %record.session_id,
                        error = %error,
                    );
                    report.failed += 1;
                }
            }

            if let Err(error) = self.leads.release(&record.session_id).await {
                warn!(
                    event_name = "sweep.release_error",
                    session_id = %record.session_id,
                    error = %error,
                );
            }
        }

        info!(
            event_name = "sweep.creation_done",
            scanned = report.scanned,
            created = report.created,
            merged = report.merged,
            skipped = report.skipped,
            failed = report.failed,
        );
        Ok(report)
    }

    /// Update pass over linked sessions touched within the recency window.
    pub async fn run_update_sweep(&self) -> Result<SweepReport, ApplicationError> {
        let cutoff = Utc::now() - self.config.recency_window();
        let candidates = self
            .leads
            .list_recently_linked(cutoff, self.config.max_update_attempts)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let mut report = SweepReport::default();

        for mut record in candidates {
            report.scanned += 1;

            let now = Utc::now();
            let lease_until = now + self.config.lease();
            match self.leads.try_claim(&record.session_id, now, lease_until).await {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(error) => {
                    warn!(
                        event_name = "sweep.claim_error",
                        session_id = %record.session_id,
                        error = %error,
                    );
                    report.failed += 1;
                    continue;
                }
            }
            record.lease_until = Some(lease_until);

            match self.reconcile_update(&record, cutoff).await {
                Ok(UpdateOutcome::Updated { .. }) => report.updated += 1,
                Ok(UpdateOutcome::Failed { message }) => {
                    warn!(
                        event_name = "sweep.update_failed",
                        session_id = %record.session_id,
                        message = %message,
                    );
                    report.failed += 1;
                }
                Ok(_) => report.skipped += 1,
                Err(error) => {
                    warn!(
                        event_name = "sweep.session_error",
                        session_id = %record.session_id,
                        error = %error,
                    );
                    report.failed += 1;
                }
            }

            if let Err(error) = self.leads.release(&record.session_id).await {
                warn!(
                    event_name = "sweep.release_error",
                    session_id = %record.session_id,
                    error = %error,
                );
            }
        }

        info!(
            event_name = "sweep.update_done",
            scanned = report.scanned,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
        );
        Ok(report)
    }
}
