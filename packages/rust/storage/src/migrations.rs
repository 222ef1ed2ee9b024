//! SQL migration definitions for the LeadDesk database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: leads, collaborators, groups, group_members, distribution_settings",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS collaborators (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    email       TEXT,
    created_at  TEXT NOT NULL
);

-- Leads; assignment columns are NULL until distribution claims the lead
CREATE TABLE IF NOT EXISTS leads (
    id                       TEXT PRIMARY KEY,
    name                     TEXT NOT NULL,
    email                    TEXT,
    phone                    TEXT,
    source                   TEXT,
    score                    INTEGER,
    tier                     TEXT,
    status                   TEXT NOT NULL,
    assigned_collaborator_id TEXT REFERENCES collaborators(id),
    assigned_at              TEXT,
    created_at               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_unassigned ON leads(assigned_collaborator_id, tier);
CREATE INDEX IF NOT EXISTS idx_leads_assigned_at ON leads(assigned_at);

CREATE TABLE IF NOT EXISTS groups (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

-- Position keeps member order stable for tie-breaking
CREATE TABLE IF NOT EXISTS group_members (
    group_id         TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    collaborator_id  TEXT NOT NULL REFERENCES collaborators(id) ON DELETE CASCADE,
    position         INTEGER NOT NULL,
    PRIMARY KEY (group_id, collaborator_id)
);

CREATE INDEX IF NOT EXISTS idx_group_members_group ON group_members(group_id, position);

CREATE TABLE IF NOT EXISTS distribution_settings (
    group_id     TEXT PRIMARY KEY REFERENCES groups(id) ON DELETE CASCADE,
    daily_quota  INTEGER NOT NULL CHECK (daily_quota >= 0),
    lead_tier    TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Distribution run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS distribution_runs (
    id          TEXT PRIMARY KEY,
    group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_distribution_runs_group ON distribution_runs(group_id, started_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
