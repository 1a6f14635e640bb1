//! libSQL storage layer (local file mode).
//!
//! [`JobStore`] is the persistence contract the ingestion pipeline depends
//! on; [`Storage`] implements it over a local libSQL database holding the
//! tracked companies and every job posting ever seen.
//!
//! Timestamps are stored as RFC 3339 strings with nanosecond precision so
//! that `created_at == updated_at` survives a round trip and reliably marks
//! rows inserted by the current upsert.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use jobradar_shared::{AtsType, Company, Job, JobRadarError, PersistedJob, Result, Source};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Persistence operations the pipeline needs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Every tracked company, ordered by name.
    async fn fetch_companies(&self) -> Result<Vec<Company>>;

    /// Insert-or-update keyed on `(source, source_job_id)`.
    ///
    /// Inserted rows come back with `created_at == updated_at`; updated rows
    /// keep their original `created_at` and get a fresh `updated_at`.
    async fn upsert_jobs(&self, jobs: &[Job]) -> Result<Vec<PersistedJob>>;

    /// Insert-or-update keyed on `ticker`. Returns the stored rows, whose
    /// ids may differ from the input for companies that already existed.
    async fn upsert_companies(&self, companies: &[Company]) -> Result<Vec<Company>>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

const JOB_COLUMNS: &str = "id, company_id, company, title, location, url, description, department, \
     track, source, source_job_id, posted_at, content_hash, is_active, created_at, updated_at";

const COMPANY_COLUMNS: &str = "id, ticker, name, website_url, ats_type, ats_board_url";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes write transactions issued by concurrent pipeline workers.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobRadarError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        JobRadarError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Read queries
    // -----------------------------------------------------------------------

    /// Most recently seen jobs first, optionally restricted to one source.
    pub async fn list_jobs(&self, source: Option<Source>, limit: usize) -> Result<Vec<PersistedJob>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = match source {
            Some(source) => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {JOB_COLUMNS} FROM jobs WHERE source = ?1
                             ORDER BY updated_at DESC LIMIT ?2"
                        ),
                        params![source.as_str(), limit],
                    )
                    .await
            }
            None => {
                self.conn
                    .query(
                        &format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY updated_at DESC LIMIT ?1"),
                        params![limit],
                    )
                    .await
            }
        }
        .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?
        {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Number of stored jobs per source, for `jobs list` summaries.
    pub async fn count_jobs_by_source(&self) -> Result<Vec<(Source, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source, COUNT(*) FROM jobs GROUP BY source ORDER BY source",
                params![],
            )
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?
        {
            let tag = row
                .get::<String>(0)
                .map_err(|e| JobRadarError::Storage(e.to_string()))?;
            let count = row
                .get::<i64>(1)
                .map_err(|e| JobRadarError::Storage(e.to_string()))?;
            // Rows written under a since-removed source tag are skipped.
            if let Ok(source) = tag.parse::<Source>() {
                results.push((source, count.max(0) as u64));
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl JobStore for Storage {
    async fn fetch_companies(&self) -> Result<Vec<Company>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {COMPANY_COLUMNS} FROM companies ORDER BY name, ticker"),
                params![],
            )
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?
        {
            results.push(row_to_company(&row)?);
        }
        Ok(results)
    }

    #[instrument(skip_all, fields(jobs = jobs.len()))]
    async fn upsert_jobs(&self, jobs: &[Job]) -> Result<Vec<PersistedJob>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        let now = timestamp(Utc::now());
        let sql = format!(
            "INSERT INTO jobs ({JOB_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
             ON CONFLICT(source, source_job_id) DO UPDATE SET
               company_id = COALESCE(excluded.company_id, jobs.company_id),
               company = excluded.company,
               title = excluded.title,
               location = excluded.location,
               url = excluded.url,
               description = excluded.description,
               department = excluded.department,
               track = COALESCE(excluded.track, jobs.track),
               posted_at = COALESCE(excluded.posted_at, jobs.posted_at),
               content_hash = excluded.content_hash,
               is_active = excluded.is_active,
               updated_at = excluded.updated_at
             RETURNING {JOB_COLUMNS}"
        );

        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let mut rows = tx
                .query(
                    &sql,
                    params![
                        Uuid::now_v7().to_string(),
                        job.company_id.as_deref(),
                        job.company.as_str(),
                        job.title.as_str(),
                        job.location.as_str(),
                        job.url.as_str(),
                        job.description.as_str(),
                        job.department.as_str(),
                        job.track.as_deref(),
                        job.source.as_str(),
                        job.source_job_id.as_str(),
                        job.posted_at.map(timestamp),
                        job.content_hash.as_str(),
                        i64::from(job.is_active),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(|e| JobRadarError::Storage(e.to_string()))?;

            match rows
                .next()
                .await
                .map_err(|e| JobRadarError::Storage(e.to_string()))?
            {
                Some(row) => results.push(row_to_job(&row)?),
                None => {
                    return Err(JobRadarError::Storage(format!(
                        "upsert of {}/{} returned no row",
                        job.source, job.source_job_id
                    )));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        debug!(
            inserted = results.iter().filter(|r| r.is_new()).count(),
            "upserted jobs"
        );
        Ok(results)
    }

    #[instrument(skip_all, fields(companies = companies.len()))]
    async fn upsert_companies(&self, companies: &[Company]) -> Result<Vec<Company>> {
        if companies.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;

        let now = timestamp(Utc::now());
        let sql = format!(
            "INSERT INTO companies ({COMPANY_COLUMNS}, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(ticker) DO UPDATE SET
               name = excluded.name,
               website_url = COALESCE(excluded.website_url, companies.website_url),
               ats_type = excluded.ats_type,
               ats_board_url = COALESCE(excluded.ats_board_url, companies.ats_board_url),
               updated_at = excluded.updated_at
             RETURNING {COMPANY_COLUMNS}"
        );

        let mut results = Vec::with_capacity(companies.len());
        for company in companies {
            let ticker = company.ticker.trim();
            if ticker.is_empty() {
                return Err(JobRadarError::validation(format!(
                    "company '{}' has no ticker",
                    company.name
                )));
            }
            let id = if company.id.trim().is_empty() {
                Uuid::now_v7().to_string()
            } else {
                company.id.clone()
            };

            let mut rows = tx
                .query(
                    &sql,
                    params![
                        id,
                        ticker,
                        company.name.as_str(),
                        company.website_url.as_deref(),
                        company.ats_type.as_str(),
                        company.ats_board_url.as_deref(),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(|e| JobRadarError::Storage(e.to_string()))?;

            match rows
                .next()
                .await
                .map_err(|e| JobRadarError::Storage(e.to_string()))?
            {
                Some(row) => results.push(row_to_company(&row)?),
                None => {
                    return Err(JobRadarError::Storage(format!(
                        "upsert of company {ticker} returned no row"
                    )));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| JobRadarError::Storage(e.to_string()))?;
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobRadarError::Storage(format!("invalid date '{s}': {e}")))
}

fn row_to_job(row: &libsql::Row) -> Result<PersistedJob> {
    let get = |i: i32| {
        row.get::<String>(i)
            .map_err(|e| JobRadarError::Storage(e.to_string()))
    };

    let source = get(9)?
        .parse::<Source>()
        .map_err(|e| JobRadarError::Storage(e.to_string()))?;
    let posted_at = match row.get::<String>(11).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };

    Ok(PersistedJob {
        id: get(0)?,
        job: Job {
            company_id: row.get::<String>(1).ok(),
            company: get(2)?,
            title: get(3)?,
            location: get(4)?,
            url: get(5)?,
            description: get(6)?,
            department: get(7)?,
            track: row.get::<String>(8).ok(),
            source,
            source_job_id: get(10)?,
            posted_at,
            content_hash: get(12)?,
            is_active: row.get::<i64>(13).map(|v| v != 0).unwrap_or(true),
        },
        created_at: parse_timestamp(&get(14)?)?,
        updated_at: parse_timestamp(&get(15)?)?,
    })
}

fn row_to_company(row: &libsql::Row) -> Result<Company> {
    let get = |i: i32| {
        row.get::<String>(i)
            .map_err(|e| JobRadarError::Storage(e.to_string()))
    };

    Ok(Company {
        id: get(0)?,
        ticker: get(1)?,
        name: get(2)?,
        website_url: row.get::<String>(3).ok(),
        ats_type: AtsType::parse_lenient(&get(4)?),
        ats_board_url: row.get::<String>(5).ok(),
    })
}
