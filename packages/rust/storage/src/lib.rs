//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding leads,
//! collaborators, groups, distribution settings, and distribution history.
//!
//! **Access rules:**
//! - Write commands: read-write via [`Storage::open`]
//! - Listing/reporting: read-only via [`Storage::open_readonly`]
//!
//! Assignment writes go through [`Storage::commit_assignments`], which is
//! all-or-nothing and conditional on every lead still being unassigned.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use leaddesk_shared::{
    AssignmentAction, Collaborator, CollaboratorId, DistributionSetting, Group, GroupId, Lead,
    LeadDeskError, LeadId, LeadStatus, LeadTier, Result, TierFilter,
};
use libsql::{Connection, Database, TransactionBehavior, params};
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-connection settings. Writers wait up to 5s for a lock held by
/// another handle instead of failing right away.
const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000;
PRAGMA foreign_keys = ON;";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Result of an assignment commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every assignment was written.
    Committed { count: usize },
    /// Some leads were already claimed, or the database stayed locked;
    /// nothing was written.
    Conflict {
        /// Leads claimed by someone else. Empty when the lock timed out.
        lead_ids: Vec<LeadId>,
    },
}

/// One row of distribution history.
#[derive(Debug, Clone)]
pub struct DistributionRun {
    pub id: String,
    pub group_id: GroupId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats_json: Option<String>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadDeskError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(LeadDeskError::storage)?;

        let conn = connect(&db).await?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeadDeskError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(LeadDeskError::storage)?;

        let conn = connect(&db).await?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    ///
    /// Each migration runs in its own immediate transaction and re-reads the
    /// schema version once the write lock is held, so handles opening the
    /// same file at once apply every migration exactly once.
    async fn run_migrations(&self) -> Result<()> {
        let pending: Vec<_> = {
            let current_version = self.get_schema_version().await?;
            migrations::all_migrations()
                .into_iter()
                .filter(|m| m.version > current_version)
                .collect()
        };

        for migration in pending {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .await
                .map_err(LeadDeskError::storage)?;
            if schema_version(&tx).await? >= migration.version {
                tx.rollback().await.map_err(LeadDeskError::storage)?;
                continue;
            }

            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            if let Err(e) = tx.execute_batch(migration.sql).await {
                let _ = tx.rollback().await;
                return Err(LeadDeskError::Storage(format!(
                    "migration v{} failed: {e}",
                    migration.version
                )));
            }
            tx.commit().await.map_err(LeadDeskError::storage)?;
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> Result<u32> {
        schema_version(&self.conn).await
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadDeskError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lead operations
    // -----------------------------------------------------------------------

    /// Insert a newly ingested lead.
    pub async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        self.check_writable()?;
        lead.validate()?;
        self.conn
            .execute(
                "INSERT INTO leads (id, name, email, phone, source, score, tier, status,
                                    assigned_collaborator_id, assigned_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    lead.id.to_string(),
                    lead.name.as_str(),
                    lead.email.as_deref(),
                    lead.phone.as_deref(),
                    lead.source.as_deref(),
                    lead.score.map(i64::from),
                    lead.tier.map(|t| t.as_str()),
                    lead.status.as_str(),
                    lead.assigned_collaborator_id.as_ref().map(|id| id.to_string()),
                    lead.assigned_at.as_ref().map(timestamp),
                    timestamp(&lead.created_at),
                ],
            )
            .await
            .map_err(LeadDeskError::storage)?;
        Ok(())
    }

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(LeadDeskError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadDeskError::storage(e)),
        }
    }

    /// List leads in ingestion order, optionally only unassigned ones and
    /// only ones passing `filter`.
    pub async fn list_leads(&self, unassigned_only: bool, filter: TierFilter) -> Result<Vec<Lead>> {
        let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE 1 = 1");
        if unassigned_only {
            sql.push_str(" AND assigned_collaborator_id IS NULL");
        }
        let mut rows = match filter {
            TierFilter::All => {
                sql.push_str(" ORDER BY created_at, id");
                self.conn.query(&sql, params![]).await
            }
            TierFilter::Only(tier) => {
                sql.push_str(" AND tier = ?1 ORDER BY created_at, id");
                self.conn.query(&sql, params![tier.as_str()]).await
            }
        }
        .map_err(LeadDeskError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LeadDeskError::storage)? {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// Unassigned leads matching `filter`, oldest first.
    pub async fn list_unassigned_leads(&self, filter: TierFilter) -> Result<Vec<Lead>> {
        self.list_leads(true, filter).await
    }

    /// Leads whose `assigned_at` falls in `[start, end)`.
    pub async fn list_leads_assigned_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE assigned_collaborator_id IS NOT NULL
               AND assigned_at >= ?1 AND assigned_at < ?2
             ORDER BY assigned_at, id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![timestamp(&start), timestamp(&end)])
            .await
            .map_err(LeadDeskError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LeadDeskError::storage)? {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Assignment commit
    // -----------------------------------------------------------------------

    /// Apply a batch of assignments atomically.
    ///
    /// Each update only matches a lead that is still unassigned. If any lead
    /// in the batch was claimed in the meantime (or no longer exists), the
    /// transaction is rolled back and the offending ids are returned in
    /// [`CommitOutcome::Conflict`]. Either every lead gets
    /// `assigned_collaborator_id`, `status = new`, and `assigned_at`, or none
    /// does.
    ///
    /// The transaction takes the write lock up front. A lock still held by
    /// another handle after the busy timeout is also reported as a conflict
    /// (with no lead ids), since the caller's view of the leads is stale.
    pub async fn commit_assignments(
        &self,
        actions: &[AssignmentAction],
        assigned_at: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        self.check_writable()?;
        if actions.is_empty() {
            return Ok(CommitOutcome::Committed { count: 0 });
        }

        let tx = match self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
        {
            Ok(tx) => tx,
            Err(e) if is_busy(&e) => return Ok(busy_conflict(actions.len())),
            Err(e) => return Err(LeadDeskError::storage(e)),
        };
        let at = timestamp(&assigned_at);

        let mut conflicts = Vec::new();
        let mut failure = None;
        for action in actions {
            let updated = tx
                .execute(
                    "UPDATE leads
                     SET assigned_collaborator_id = ?1, status = ?2, assigned_at = ?3
                     WHERE id = ?4 AND assigned_collaborator_id IS NULL",
                    params![
                        action.collaborator_id.to_string(),
                        LeadStatus::New.as_str(),
                        at.as_str(),
                        action.lead_id.to_string(),
                    ],
                )
                .await;
            match updated {
                Ok(0) => conflicts.push(action.lead_id.clone()),
                Ok(_) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            let _ = tx.rollback().await;
            if is_busy(&e) {
                return Ok(busy_conflict(actions.len()));
            }
            return Err(LeadDeskError::Storage(format!("assignment commit failed: {e}")));
        }

        if !conflicts.is_empty() {
            tx.rollback().await.map_err(LeadDeskError::storage)?;
            warn!(
                conflicts = conflicts.len(),
                batch = actions.len(),
                "assignment batch rolled back, leads already claimed"
            );
            return Ok(CommitOutcome::Conflict { lead_ids: conflicts });
        }

        match tx.commit().await {
            Ok(()) => {}
            Err(e) if is_busy(&e) => return Ok(busy_conflict(actions.len())),
            Err(e) => return Err(LeadDeskError::storage(e)),
        }
        debug!(count = actions.len(), "assignment batch committed");
        Ok(CommitOutcome::Committed {
            count: actions.len(),
        })
    }

    // -----------------------------------------------------------------------
    // Collaborator operations
    // -----------------------------------------------------------------------

    /// Insert a collaborator.
    pub async fn insert_collaborator(&self, collaborator: &Collaborator) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO collaborators (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    collaborator.id.to_string(),
                    collaborator.name.as_str(),
                    collaborator.email.as_deref(),
                    timestamp(&collaborator.created_at),
                ],
            )
            .await
            .map_err(LeadDeskError::storage)?;
        Ok(())
    }

    /// Get a collaborator by ID.
    pub async fn get_collaborator(&self, id: &CollaboratorId) -> Result<Option<Collaborator>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, email, created_at FROM collaborators WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(LeadDeskError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_collaborator(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadDeskError::storage(e)),
        }
    }

    /// List all collaborators by name.
    pub async fn list_collaborators(&self) -> Result<Vec<Collaborator>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, email, created_at FROM collaborators ORDER BY name",
                params![],
            )
            .await
            .map_err(LeadDeskError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LeadDeskError::storage)? {
            results.push(row_to_collaborator(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Group operations
    // -----------------------------------------------------------------------

    /// Insert a group together with its initial members, all or nothing.
    pub async fn insert_group(&self, group: &Group) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(LeadDeskError::storage)?;

        let written = async {
            tx.execute(
                "INSERT INTO groups (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![
                    group.id.to_string(),
                    group.name.as_str(),
                    timestamp(&group.created_at),
                ],
            )
            .await
            .map_err(LeadDeskError::storage)?;
            for member in group.unique_members() {
                insert_group_member(&tx, &group.id, member).await?;
            }
            Ok::<_, LeadDeskError>(())
        }
        .await;

        match written {
            Ok(()) => tx.commit().await.map_err(LeadDeskError::storage),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Get a group by ID, members in the order they were added.
    pub async fn get_group(&self, id: &GroupId) -> Result<Option<Group>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, created_at FROM groups WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(LeadDeskError::storage)?;

        let row = match rows.next().await.map_err(LeadDeskError::storage)? {
            Some(row) => row,
            None => return Ok(None),
        };
        let mut group = row_to_group(&row)?;
        group.member_ids = self.group_member_ids(&group.id).await?;
        Ok(Some(group))
    }

    /// List all groups by name, with members.
    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let mut rows = self
            .conn
            .query("SELECT id, name, created_at FROM groups ORDER BY name", params![])
            .await
            .map_err(LeadDeskError::storage)?;

        let mut groups = Vec::new();
        while let Some(row) = rows.next().await.map_err(LeadDeskError::storage)? {
            groups.push(row_to_group(&row)?);
        }
        for group in &mut groups {
            group.member_ids = self.group_member_ids(&group.id).await?;
        }
        Ok(groups)
    }

    /// Append a collaborator to a group. Returns `false` if already a member.
    pub async fn add_group_member(
        &self,
        group_id: &GroupId,
        collaborator_id: &CollaboratorId,
    ) -> Result<bool> {
        self.check_writable()?;
        insert_group_member(&self.conn, group_id, collaborator_id).await
    }

    /// Remove a collaborator from a group. Returns `false` if not a member.
    pub async fn remove_group_member(
        &self,
        group_id: &GroupId,
        collaborator_id: &CollaboratorId,
    ) -> Result<bool> {
        self.check_writable()?;
        let removed = self
            .conn
            .execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND collaborator_id = ?2",
                params![group_id.to_string(), collaborator_id.to_string()],
            )
            .await
            .map_err(LeadDeskError::storage)?;
        Ok(removed > 0)
    }

    async fn group_member_ids(&self, group_id: &GroupId) -> Result<Vec<CollaboratorId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT collaborator_id FROM group_members WHERE group_id = ?1 ORDER BY position",
                params![group_id.to_string()],
            )
            .await
            .map_err(LeadDeskError::storage)?;

        let mut members = Vec::new();
        while let Some(row) = rows.next().await.map_err(LeadDeskError::storage)? {
            members.push(parse_id(&get_string(&row, 0)?)?);
        }
        Ok(members)
    }

    // -----------------------------------------------------------------------
    // Distribution settings
    // -----------------------------------------------------------------------

    /// Insert or replace the distribution setting of a group.
    pub async fn upsert_distribution_setting(&self, setting: &DistributionSetting) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO distribution_settings (group_id, daily_quota, lead_tier, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(group_id) DO UPDATE SET
                   daily_quota = excluded.daily_quota,
                   lead_tier = excluded.lead_tier,
                   updated_at = excluded.updated_at",
                params![
                    setting.group_id.to_string(),
                    setting.daily_quota,
                    setting.lead_tier.as_str(),
                    timestamp(&setting.updated_at),
                ],
            )
            .await
            .map_err(LeadDeskError::storage)?;
        Ok(())
    }

    /// Get the distribution setting of a group.
    pub async fn get_distribution_setting(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<DistributionSetting>> {
        let mut rows = self
            .conn
            .query(
                "SELECT group_id, daily_quota, lead_tier, updated_at
                 FROM distribution_settings WHERE group_id = ?1",
                params![group_id.to_string()],
            )
            .await
            .map_err(LeadDeskError::storage)?;

        let row = match rows.next().await.map_err(LeadDeskError::storage)? {
            Some(row) => row,
            None => return Ok(None),
        };

        let quota = get_i64(&row, 1)?;
        let daily_quota = u32::try_from(quota)
            .map_err(|_| LeadDeskError::Storage(format!("invalid daily_quota {quota}")))?;

        Ok(Some(DistributionSetting {
            group_id: parse_id(&get_string(&row, 0)?)?,
            daily_quota,
            lead_tier: get_string(&row, 2)?.parse()?,
            updated_at: parse_timestamp(&get_string(&row, 3)?)?,
        }))
    }

    // -----------------------------------------------------------------------
    // Distribution run history
    // -----------------------------------------------------------------------

    /// Record the start of a distribution run. Returns the generated run ID.
    pub async fn insert_distribution_run(&self, group_id: &GroupId) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO distribution_runs (id, group_id, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), group_id.to_string(), timestamp(&Utc::now())],
            )
            .await
            .map_err(LeadDeskError::storage)?;
        Ok(id)
    }

    /// Mark a distribution run finished with its stats.
    pub async fn finish_distribution_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE distribution_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![timestamp(&Utc::now()), stats_json, run_id],
            )
            .await
            .map_err(LeadDeskError::storage)?;
        Ok(())
    }

    /// Most recent runs of a group, newest first.
    pub async fn list_distribution_runs(
        &self,
        group_id: &GroupId,
        limit: u32,
    ) -> Result<Vec<DistributionRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, group_id, started_at, finished_at, stats_json
                 FROM distribution_runs WHERE group_id = ?1
                 ORDER BY started_at DESC, id DESC
                 LIMIT ?2",
                params![group_id.to_string(), limit],
            )
            .await
            .map_err(LeadDeskError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LeadDeskError::storage)? {
            results.push(DistributionRun {
                id: get_string(&row, 0)?,
                group_id: parse_id(&get_string(&row, 1)?)?,
                started_at: parse_timestamp(&get_string(&row, 2)?)?,
                finished_at: get_opt_string(&row, 3)
                    .map(|s| parse_timestamp(&s))
                    .transpose()?,
                stats_json: get_opt_string(&row, 4),
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Connection helpers
// ---------------------------------------------------------------------------

async fn connect(db: &Database) -> Result<Connection> {
    let conn = db.connect().map_err(LeadDeskError::storage)?;
    conn.execute_batch(CONNECTION_PRAGMAS)
        .await
        .map_err(LeadDeskError::storage)?;
    Ok(conn)
}

/// Highest applied migration, or 0 on a fresh database.
async fn schema_version(conn: &Connection) -> Result<u32> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name = 'schema_migrations'",
            params![],
        )
        .await
        .map_err(LeadDeskError::storage)?;
    let exists = match rows.next().await.map_err(LeadDeskError::storage)? {
        Some(row) => get_i64(&row, 0)? > 0,
        None => false,
    };
    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            params![],
        )
        .await
        .map_err(LeadDeskError::storage)?;
    let version = match rows.next().await.map_err(LeadDeskError::storage)? {
        Some(row) => get_i64(&row, 0)?,
        None => 0,
    };
    u32::try_from(version)
        .map_err(|_| LeadDeskError::Storage(format!("invalid schema version {version}")))
}

async fn insert_group_member(
    conn: &Connection,
    group_id: &GroupId,
    collaborator_id: &CollaboratorId,
) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT INTO group_members (group_id, collaborator_id, position)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(position) + 1, 0)
                              FROM group_members WHERE group_id = ?1))
             ON CONFLICT(group_id, collaborator_id) DO NOTHING",
            params![group_id.to_string(), collaborator_id.to_string()],
        )
        .await
        .map_err(LeadDeskError::storage)?;
    Ok(inserted > 0)
}

/// SQLITE_BUSY / SQLITE_LOCKED, i.e. another handle holds the lock.
fn is_busy(err: &libsql::Error) -> bool {
    let msg = err.to_string();
    msg.contains("database is locked")
        || msg.contains("database table is locked")
        || msg.contains("SQLITE_BUSY")
}

fn busy_conflict(batch: usize) -> CommitOutcome {
    warn!(batch, "database busy, assignment batch not written");
    CommitOutcome::Conflict {
        lead_ids: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

const LEAD_COLUMNS: &str = "id, name, email, phone, source, score, tier, status, \
                            assigned_collaborator_id, assigned_at, created_at";

/// Fixed-width UTC RFC 3339 so that text comparison matches time order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadDeskError::Storage(format!("invalid date '{s}': {e}")))
}

fn parse_id<T>(s: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e| LeadDeskError::Storage(format!("invalid id '{s}': {e}")))
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(LeadDeskError::storage)
}

fn get_opt_string(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

fn get_i64(row: &libsql::Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx).map_err(LeadDeskError::storage)
}

fn get_score(row: &libsql::Row, idx: i32) -> Result<Option<u8>> {
    match row.get_value(idx).map_err(LeadDeskError::storage)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(v) => u8::try_from(v)
            .ok()
            .filter(|score| *score <= 100)
            .map(Some)
            .ok_or_else(|| LeadDeskError::Storage(format!("invalid score {v}"))),
        other => Err(LeadDeskError::Storage(format!(
            "invalid score value {other:?}"
        ))),
    }
}

/// Convert a database row (selected with `LEAD_COLUMNS`) to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    Ok(Lead {
        id: parse_id(&get_string(row, 0)?)?,
        name: get_string(row, 1)?,
        email: get_opt_string(row, 2),
        phone: get_opt_string(row, 3),
        source: get_opt_string(row, 4),
        score: get_score(row, 5)?,
        tier: get_opt_string(row, 6)
            .map(|s| s.parse::<LeadTier>())
            .transpose()?,
        status: get_string(row, 7)?.parse()?,
        assigned_collaborator_id: get_opt_string(row, 8)
            .map(|s| parse_id::<CollaboratorId>(&s))
            .transpose()?,
        assigned_at: get_opt_string(row, 9)
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        created_at: parse_timestamp(&get_string(row, 10)?)?,
    })
}

fn row_to_collaborator(row: &libsql::Row) -> Result<Collaborator> {
    Ok(Collaborator {
        id: parse_id(&get_string(row, 0)?)?,
        name: get_string(row, 1)?,
        email: get_opt_string(row, 2),
        created_at: parse_timestamp(&get_string(row, 3)?)?,
    })
}

/// Group without members; callers fill `member_ids`.
fn row_to_group(row: &libsql::Row) -> Result<Group> {
    Ok(Group {
        id: parse_id(&get_string(row, 0)?)?,
        name: get_string(row, 1)?,
        member_ids: Vec::new(),
        created_at: parse_timestamp(&get_string(row, 2)?)?,
    })
}
