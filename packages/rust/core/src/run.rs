//! Distribution run: load a group's state, compute assignments, commit them.
//!
//! The read of unassigned leads and the batched write are not atomic as a
//! pair. The commit is therefore conditional on every lead still being
//! unassigned; when another run got there first the whole batch is dropped,
//! state is re-read, and assignments are recomputed, up to
//! [`DistributeOptions::max_attempts`] times.

use std::time::Instant;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use leaddesk_shared::{
    AssignmentAction, DistributionConfig, DistributionSetting, Group, GroupId, Lead, LeadDeskError,
    Result, TierFilter,
};
use leaddesk_storage::{CommitOutcome, Storage};

use crate::distributor::{compute_assignments, remaining_quota};
use crate::window::{DayWindow, assignment_counts};

// ---------------------------------------------------------------------------
// Storage seam
// ---------------------------------------------------------------------------

/// What a distribution run needs from storage.
///
/// `commit_assignments` must be all-or-nothing and must only claim leads
/// that are still unassigned, reporting the rest as a conflict.
#[allow(async_fn_in_trait)]
pub trait AssignmentStore {
    async fn get_group(&self, id: &GroupId) -> Result<Option<Group>>;

    async fn get_distribution_setting(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<DistributionSetting>>;

    async fn list_unassigned_leads(&self, filter: TierFilter) -> Result<Vec<Lead>>;

    async fn list_leads_assigned_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Lead>>;

    async fn commit_assignments(
        &self,
        actions: &[AssignmentAction],
        assigned_at: DateTime<Utc>,
    ) -> Result<CommitOutcome>;
}

impl AssignmentStore for Storage {
    async fn get_group(&self, id: &GroupId) -> Result<Option<Group>> {
        Storage::get_group(self, id).await
    }

    async fn get_distribution_setting(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<DistributionSetting>> {
        Storage::get_distribution_setting(self, group_id).await
    }

    async fn list_unassigned_leads(&self, filter: TierFilter) -> Result<Vec<Lead>> {
        Storage::list_unassigned_leads(self, filter).await
    }

    async fn list_leads_assigned_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Lead>> {
        Storage::list_leads_assigned_between(self, start, end).await
    }

    async fn commit_assignments(
        &self,
        actions: &[AssignmentAction],
        assigned_at: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        Storage::commit_assignments(self, actions, assigned_at).await
    }
}

// ---------------------------------------------------------------------------
// Options & report
// ---------------------------------------------------------------------------

/// Inputs of a distribution run that do not come from storage.
#[derive(Debug, Clone)]
pub struct DistributeOptions {
    /// Instant the run happens at; defines "today" and `assigned_at`.
    pub now: DateTime<Utc>,
    /// Offset of the clock whose midnight starts a new quota day.
    pub utc_offset: FixedOffset,
    /// Commit attempts before giving up on conflicts (at least 1).
    pub max_attempts: u32,
    /// Compute but do not commit.
    pub dry_run: bool,
}

impl DistributeOptions {
    /// Options from the `[distribution]` config section.
    pub fn from_config(config: &DistributionConfig, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            now,
            utc_offset: config.utc_offset()?,
            max_attempts: config.max_commit_attempts,
            dry_run: false,
        })
    }
}

/// How a distribution run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionOutcome {
    /// Assignments were committed.
    Assigned,
    /// Dry run: assignments were computed only.
    Planned,
    /// The group already received its daily quota.
    QuotaMet,
    /// The group has no members.
    NoEligibleCollaborators,
    /// No unassigned lead matches the group's tier filter.
    NoLeads,
    /// The run failed; only produced by [`distribute_all`].
    Failed { error: String },
}

/// Summary of one group's distribution run.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    pub group_id: GroupId,
    pub group_name: Option<String>,
    pub outcome: DistributionOutcome,
    pub actions: Vec<AssignmentAction>,
    /// Quota left before this run's assignments.
    pub remaining_quota: i64,
    /// Number of compute/commit rounds used.
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl DistributionReport {
    pub fn assigned(&self) -> usize {
        match self.outcome {
            DistributionOutcome::Assigned => self.actions.len(),
            _ => 0,
        }
    }

    fn failed(group_id: &GroupId, error: &LeadDeskError, start: Instant) -> Self {
        Self {
            group_id: group_id.clone(),
            group_name: None,
            outcome: DistributionOutcome::Failed {
                error: error.to_string(),
            },
            actions: Vec::new(),
            remaining_quota: 0,
            attempts: 0,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Progress callback for reporting distribution status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a group's run has finished (successfully or not).
    fn group_done(&self, report: &DistributionReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn group_done(&self, _report: &DistributionReport) {}
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Distribute today's remaining quota of one group.
///
/// 1. Load the group and its distribution setting
/// 2. Read unassigned leads (tier filtered) and today's assignments
/// 3. Compute assignments
/// 4. Commit them conditionally, recomputing on conflict
#[instrument(skip_all, fields(group = %group_id, dry_run = options.dry_run))]
pub async fn distribute_group<S: AssignmentStore>(
    store: &S,
    group_id: &GroupId,
    options: &DistributeOptions,
    progress: &dyn ProgressReporter,
) -> Result<DistributionReport> {
    let start = Instant::now();
    if options.max_attempts == 0 {
        return Err(LeadDeskError::validation("max_attempts must be at least 1"));
    }

    progress.phase("Loading group");
    let group = store
        .get_group(group_id)
        .await?
        .ok_or_else(|| LeadDeskError::not_found("group", group_id))?;
    let setting = store
        .get_distribution_setting(group_id)
        .await?
        .ok_or_else(|| {
            LeadDeskError::validation(format!(
                "group '{}' has no distribution setting",
                group.name
            ))
        })?;

    let window = DayWindow::containing(options.now, options.utc_offset);
    info!(
        group = %group.name,
        members = group.member_ids.len(),
        daily_quota = setting.daily_quota,
        lead_tier = %setting.lead_tier,
        window_start = %window.start,
        "starting distribution"
    );

    let mut attempts = 0;
    loop {
        attempts += 1;

        progress.phase("Computing assignments");
        let unassigned = store.list_unassigned_leads(setting.lead_tier).await?;
        let assigned_today = store
            .list_leads_assigned_between(window.start, window.end)
            .await?;
        let counts = assignment_counts(&assigned_today, &window);
        let remaining = remaining_quota(&group, &setting, &counts);
        let actions = compute_assignments(&group, &setting, &unassigned, &counts)?;

        let report = |outcome: DistributionOutcome, actions: Vec<AssignmentAction>| {
            DistributionReport {
                group_id: group.id.clone(),
                group_name: Some(group.name.clone()),
                outcome,
                actions,
                remaining_quota: remaining,
                attempts,
                elapsed_ms: start.elapsed().as_millis() as u64,
            }
        };

        if actions.is_empty() {
            let outcome = if group.member_ids.is_empty() {
                DistributionOutcome::NoEligibleCollaborators
            } else if remaining <= 0 {
                DistributionOutcome::QuotaMet
            } else {
                DistributionOutcome::NoLeads
            };
            info!(?outcome, remaining, "nothing to distribute");
            return Ok(report(outcome, actions));
        }

        if options.dry_run {
            info!(planned = actions.len(), "dry run, not committing");
            return Ok(report(DistributionOutcome::Planned, actions));
        }

        progress.phase("Committing assignments");
        match store.commit_assignments(&actions, options.now).await? {
            CommitOutcome::Committed { count } => {
                info!(assigned = count, attempts, "distribution committed");
                return Ok(report(DistributionOutcome::Assigned, actions));
            }
            CommitOutcome::Conflict { lead_ids } => {
                warn!(
                    attempt = attempts,
                    conflicts = lead_ids.len(),
                    "leads claimed concurrently, recomputing"
                );
                if attempts >= options.max_attempts {
                    return Err(LeadDeskError::conflict(format!(
                        "group '{}': {} lead(s) claimed concurrently after {attempts} attempt(s)",
                        group.name,
                        lead_ids.len()
                    )));
                }
            }
        }
    }
}

/// Distribute every listed group in turn.
///
/// A failing group does not stop the others; it shows up as a
/// [`DistributionOutcome::Failed`] report.
#[instrument(skip_all, fields(groups = group_ids.len()))]
pub async fn distribute_all<S: AssignmentStore>(
    store: &S,
    group_ids: &[GroupId],
    options: &DistributeOptions,
    progress: &dyn ProgressReporter,
) -> Vec<DistributionReport> {
    let mut reports = Vec::with_capacity(group_ids.len());

    for group_id in group_ids {
        let start = Instant::now();
        let report = match distribute_group(store, group_id, options, progress).await {
            Ok(report) => report,
            Err(e) => {
                warn!(group = %group_id, error = %e, "distribution failed, continuing");
                DistributionReport::failed(group_id, &e, start)
            }
        };
        progress.group_done(&report);
        reports.push(report);
    }

    let assigned: usize = reports.iter().map(DistributionReport::assigned).sum();
    info!(groups = reports.len(), assigned, "distribution pass complete");
    reports
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
