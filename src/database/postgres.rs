//! PostgreSQL [`JobStore`] using runtime-checked SQLx queries.
//!
//! Schema lives in `migrations/`. Status columns hold the SCREAMING_SNAKE_CASE
//! names of [`ProcessingState`]; compare-and-set writes are single `UPDATE ...
//! WHERE status = $expected` statements.

use super::{BatchCompletion, JobCompletion, JobStore};
use crate::config::DatabaseConfig;
use crate::error::{EnrichmentError, Result};
use crate::models::{Batch, Contact, EmailCheck, Job, NewBatch, NewContact, NewJob};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

/// Rows per multi-row INSERT, well under the bind parameter limit
const CONTACT_INSERT_CHUNK: usize = 1000;

const JOB_COLUMNS: &str = "job_id, filename, status, total_count, success_count, failure_count, \
                           created_at, started_at, completed_at";
const BATCH_COLUMNS: &str = "batch_id, job_id, batch_number, status, total_count, processed_count, \
                             created_at, started_at, completed_at";
const CONTACT_COLUMNS: &str = "contact_id, job_id, batch_id, name, email, company, phone, status, \
                               email_valid, email_check, company_domain, company_size, \
                               company_location, claimed_at, processed_at, error_message";

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct JobRow {
    job_id: i64,
    filename: String,
    status: String,
    total_count: i64,
    success_count: i64,
    failure_count: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct BatchRow {
    batch_id: i64,
    job_id: i64,
    batch_number: i32,
    status: String,
    total_count: i64,
    processed_count: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct ContactRow {
    contact_id: i64,
    job_id: i64,
    batch_id: i64,
    name: Option<String>,
    email: Option<String>,
    company: Option<String>,
    phone: Option<String>,
    status: String,
    email_valid: bool,
    email_check: String,
    company_domain: Option<String>,
    company_size: Option<String>,
    company_location: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

fn parse_status(raw: &str) -> Result<ProcessingState> {
    raw.parse::<ProcessingState>()
        .map_err(|e| EnrichmentError::DatabaseError(format!("Corrupt status column: {e}")))
}

impl TryFrom<JobRow> for Job {
    type Error = EnrichmentError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            job_id: row.job_id,
            filename: row.filename,
            status: parse_status(&row.status)?,
            total_count: row.total_count,
            success_count: row.success_count,
            failure_count: row.failure_count,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

impl TryFrom<BatchRow> for Batch {
    type Error = EnrichmentError;

    fn try_from(row: BatchRow) -> Result<Self> {
        Ok(Batch {
            batch_id: row.batch_id,
            job_id: row.job_id,
            batch_number: row.batch_number,
            status: parse_status(&row.status)?,
            total_count: row.total_count,
            processed_count: row.processed_count,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

impl TryFrom<ContactRow> for Contact {
    type Error = EnrichmentError;

    fn try_from(row: ContactRow) -> Result<Self> {
        let email_check = row.email_check.parse::<EmailCheck>().map_err(|e| {
            EnrichmentError::DatabaseError(format!("Corrupt email_check column: {e}"))
        })?;

        Ok(Contact {
            contact_id: row.contact_id,
            job_id: row.job_id,
            batch_id: row.batch_id,
            name: row.name,
            email: row.email,
            company: row.company,
            phone: row.phone,
            status: parse_status(&row.status)?,
            email_valid: row.email_valid,
            email_check,
            company_domain: row.company_domain,
            company_size: row.company_size,
            company_location: row.company_location,
            claimed_at: row.claimed_at,
            processed_at: row.processed_at,
            error_message: row.error_message,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = EnrichmentError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn status_mismatch(
    entity: &str,
    id: i64,
    actual: ProcessingState,
    expected: ProcessingState,
) -> EnrichmentError {
    EnrichmentError::StateTransitionError(format!(
        "{entity} {id} is {actual}, expected {expected}"
    ))
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the configured pool settings and apply pending migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            EnrichmentError::ConfigurationError("database.url is not set".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EnrichmentError::DatabaseError(format!("Migration failed: {e}")))?;

        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL job store"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn job_or_mismatch(&self, job_id: i64, expected: ProcessingState) -> EnrichmentError {
        match self.find_job(job_id).await {
            Ok(Some(job)) => status_mismatch("job", job_id, job.status, expected),
            Ok(None) => EnrichmentError::job_not_found(job_id),
            Err(e) => e,
        }
    }

    async fn batch_or_mismatch(&self, batch_id: i64, expected: ProcessingState) -> EnrichmentError {
        match self.find_batch(batch_id).await {
            Ok(Some(batch)) => status_mismatch("batch", batch_id, batch.status, expected),
            Ok(None) => EnrichmentError::batch_not_found(batch_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, new_job: NewJob) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO enrichment_jobs (filename, total_count) VALUES ($1, $2) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(&new_job.filename)
        .bind(new_job.total_count)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_job(&self, job_id: i64) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM enrichment_jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn update_job_total(&self, job_id: i64, total_count: i64) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE enrichment_jobs SET total_count = $2 \
             WHERE job_id = $1 AND status = $3 RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(total_count)
        .bind(ProcessingState::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.job_or_mismatch(job_id, ProcessingState::Pending).await),
        }
    }

    async fn mark_job_started(&self, job_id: i64, started_at: DateTime<Utc>) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE enrichment_jobs SET status = $2, started_at = $3 \
             WHERE job_id = $1 AND status = $4 RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(ProcessingState::InProgress.as_str())
        .bind(started_at)
        .bind(ProcessingState::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.job_or_mismatch(job_id, ProcessingState::Pending).await),
        }
    }

    #[instrument(skip(self, completion), fields(status = %completion.status))]
    async fn finalize_job(
        &self,
        job_id: i64,
        expected: ProcessingState,
        completion: JobCompletion,
    ) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE enrichment_jobs \
             SET status = $2, success_count = $3, failure_count = $4, completed_at = $5 \
             WHERE job_id = $1 AND status = $6 RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(completion.status.as_str())
        .bind(completion.success_count)
        .bind(completion.failure_count)
        .bind(completion.completed_at)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.job_or_mismatch(job_id, expected).await),
        }
    }

    #[instrument(skip(self, new_batch, contacts), fields(job_id = new_batch.job_id, batch_number = new_batch.batch_number, contacts = contacts.len()))]
    async fn create_batch_with_contacts(
        &self,
        new_batch: NewBatch,
        contacts: Vec<NewContact>,
    ) -> Result<Batch> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "INSERT INTO enrichment_batches (job_id, batch_number, total_count) \
             VALUES ($1, $2, $3) RETURNING {BATCH_COLUMNS}"
        ))
        .bind(new_batch.job_id)
        .bind(new_batch.batch_number)
        .bind(new_batch.total_count)
        .fetch_one(&mut *tx)
        .await?;

        let batch: Batch = row.try_into()?;

        for chunk in contacts.chunks(CONTACT_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO enrichment_contacts (job_id, batch_id, name, email, company, phone) ",
            );
            builder.push_values(chunk, |mut row, contact| {
                row.push_bind(contact.job_id)
                    .push_bind(batch.batch_id)
                    .push_bind(contact.name.clone())
                    .push_bind(contact.email.clone())
                    .push_bind(contact.company.clone())
                    .push_bind(contact.phone.clone());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!(batch_id = batch.batch_id, "Created batch with contacts");
        Ok(batch)
    }

    async fn delete_batches_for_job(&self, job_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM enrichment_batches WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_batches(&self, job_id: i64) -> Result<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM enrichment_batches \
             WHERE job_id = $1 ORDER BY batch_number"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn find_batch(&self, batch_id: i64) -> Result<Option<Batch>> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM enrichment_batches WHERE batch_id = $1"
        ))
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Batch::try_from).transpose()
    }

    async fn mark_batch_started(&self, batch_id: i64, started_at: DateTime<Utc>) -> Result<Batch> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "UPDATE enrichment_batches SET status = $2, started_at = $3 \
             WHERE batch_id = $1 AND status = $4 RETURNING {BATCH_COLUMNS}"
        ))
        .bind(batch_id)
        .bind(ProcessingState::InProgress.as_str())
        .bind(started_at)
        .bind(ProcessingState::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.batch_or_mismatch(batch_id, ProcessingState::Pending).await),
        }
    }

    async fn finalize_batch(
        &self,
        batch_id: i64,
        expected: ProcessingState,
        completion: BatchCompletion,
    ) -> Result<Batch> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "UPDATE enrichment_batches \
             SET status = $2, processed_count = $3, completed_at = $4 \
             WHERE batch_id = $1 AND status = $5 RETURNING {BATCH_COLUMNS}"
        ))
        .bind(batch_id)
        .bind(completion.status.as_str())
        .bind(completion.processed_count)
        .bind(completion.completed_at)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.batch_or_mismatch(batch_id, expected).await),
        }
    }

    async fn pending_contacts(&self, batch_id: i64) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM enrichment_contacts \
             WHERE batch_id = $1 AND status = $2 ORDER BY contact_id"
        ))
        .bind(batch_id)
        .bind(ProcessingState::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn save_contact(&self, contact: &Contact, expected: ProcessingState) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE enrichment_contacts \
             SET status = $2, email_valid = $3, email_check = $4, company_domain = $5, \
                 company_size = $6, company_location = $7, claimed_at = $8, \
                 processed_at = $9, error_message = $10 \
             WHERE contact_id = $1 AND status = $11",
        )
        .bind(contact.contact_id)
        .bind(contact.status.as_str())
        .bind(contact.email_valid)
        .bind(contact.email_check.as_str())
        .bind(&contact.company_domain)
        .bind(&contact.company_size)
        .bind(&contact.company_location)
        .bind(contact.claimed_at)
        .bind(contact.processed_at)
        .bind(&contact.error_message)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_contacts(&self, batch_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM enrichment_contacts WHERE batch_id = $1")
                .bind(batch_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn list_contacts(&self, batch_id: i64) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM enrichment_contacts \
             WHERE batch_id = $1 ORDER BY contact_id"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn list_job_contacts(&self, job_id: i64) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM enrichment_contacts \
             WHERE job_id = $1 ORDER BY contact_id"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn stale_contacts(&self, claimed_before: DateTime<Utc>) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM enrichment_contacts \
             WHERE status = $1 AND claimed_at < $2 ORDER BY contact_id"
        ))
        .bind(ProcessingState::InProgress.as_str())
        .bind(claimed_before)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn stale_batches(&self, started_before: DateTime<Utc>) -> Result<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM enrichment_batches \
             WHERE status = $1 AND started_at < $2 ORDER BY batch_id"
        ))
        .bind(ProcessingState::InProgress.as_str())
        .bind(started_before)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn delete_job(&self, job_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM enrichment_jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EnrichmentError::job_not_found(job_id));
        }
        Ok(())
    }
}
