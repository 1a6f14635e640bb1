//! SQL migrations for the JobRadar database.
//!
//! Applied in ascending order when the database is opened. Each migration
//! records its own version in `schema_migrations`.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: companies, jobs",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Tracked employers; ATS sources walk one board per company
CREATE TABLE IF NOT EXISTS companies (
    id            TEXT PRIMARY KEY,
    ticker        TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    website_url   TEXT,
    ats_type      TEXT NOT NULL DEFAULT 'unknown',
    ats_board_url TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Canonical postings. created_at == updated_at marks a row that has
-- never been touched since insert.
CREATE TABLE IF NOT EXISTS jobs (
    id            TEXT PRIMARY KEY,
    company_id    TEXT REFERENCES companies(id) ON DELETE SET NULL,
    company       TEXT NOT NULL,
    title         TEXT NOT NULL,
    location      TEXT NOT NULL DEFAULT '',
    url           TEXT NOT NULL DEFAULT '',
    description   TEXT NOT NULL DEFAULT '',
    department    TEXT NOT NULL DEFAULT '',
    track         TEXT,
    source        TEXT NOT NULL,
    source_job_id TEXT NOT NULL,
    posted_at     TEXT,
    content_hash  TEXT NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE(source, source_job_id)
);

CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source);
CREATE INDEX IF NOT EXISTS idx_jobs_company_id ON jobs(company_id);
CREATE INDEX IF NOT EXISTS idx_jobs_content_hash ON jobs(content_hash);
CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
