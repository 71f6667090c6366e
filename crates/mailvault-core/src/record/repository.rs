//! Record repository: persistent source of truth for lifecycle state.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use super::model::{Classification, HeaderSnapshot, NewRecord, Record, RecordFilter, RecordId};
use crate::Result;

/// Column list shared by every SELECT so `row_to_record` stays in sync.
const COLUMNS: &str = "id, mailbox_account, subject, sender, sender_organization, body, \
     received_at, is_spam, is_invoice, has_attachment, attachment_path, \
     processed_path, uploaded, return_path, envelope_to, delivery_date, \
     received_from, dkim_signature, spam_status, spam_report";

/// Repository for ingested-message records.
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mailbox_account TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                sender_organization TEXT,
                body TEXT NOT NULL DEFAULT '',
                received_at TEXT NOT NULL,
                is_spam INTEGER NOT NULL DEFAULT 0,
                is_invoice INTEGER NOT NULL DEFAULT 0,
                has_attachment INTEGER NOT NULL DEFAULT 0,
                attachment_path TEXT,
                processed_path TEXT,
                uploaded INTEGER NOT NULL DEFAULT 0,
                return_path TEXT,
                envelope_to TEXT,
                delivery_date TEXT,
                received_from TEXT,
                dkim_signature TEXT,
                spam_status TEXT,
                spam_report TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for the classification stage's selection
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_records_unclassified
            ON records(has_attachment, sender_organization)
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for the export stager's selections
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_records_staging
            ON records(processed_path, uploaded)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a freshly ingested record.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert(&self, record: &NewRecord) -> Result<RecordId> {
        let result = sqlx::query(
            r"
            INSERT INTO records (
                mailbox_account, subject, sender, body, received_at,
                is_spam, has_attachment, attachment_path,
                return_path, envelope_to, delivery_date, received_from,
                dkim_signature, spam_status, spam_report
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&record.mailbox_account)
        .bind(&record.subject)
        .bind(&record.sender)
        .bind(&record.body)
        .bind(record.received_at.to_rfc3339())
        .bind(record.is_spam)
        .bind(record.has_attachment)
        .bind(&record.attachment_path)
        .bind(&record.headers.return_path)
        .bind(&record.headers.envelope_to)
        .bind(record.headers.delivery_date.map(|d| d.to_rfc3339()))
        .bind(&record.headers.received_from)
        .bind(&record.headers.dkim_signature)
        .bind(&record.headers.spam_status)
        .bind(&record.headers.spam_report)
        .execute(&self.pool)
        .await?;

        Ok(RecordId(result.last_insert_rowid()))
    }

    /// Fetch a single record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: RecordId) -> Result<Option<Record>> {
        let sql = format!("SELECT {COLUMNS} FROM records WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    /// Fetch all records, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn all(&self) -> Result<Vec<Record>> {
        let sql = format!("SELECT {COLUMNS} FROM records ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Administrative filtered query by account / attachment presence / spam flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn filter(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let mut sql = format!("SELECT {COLUMNS} FROM records WHERE 1=1");
        if filter.mailbox_account.is_some() {
            sql.push_str(" AND mailbox_account = ?");
        }
        if filter.has_attachment.is_some() {
            sql.push_str(" AND has_attachment = ?");
        }
        if filter.is_spam.is_some() {
            sql.push_str(" AND is_spam = ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(account) = &filter.mailbox_account {
            query = query.bind(account);
        }
        if let Some(has_attachment) = filter.has_attachment {
            query = query.bind(has_attachment);
        }
        if let Some(is_spam) = filter.is_spam {
            query = query.bind(is_spam);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Records awaiting classification: PDF attachment present, no
    /// organization yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn unclassified_with_pdf(&self) -> Result<Vec<Record>> {
        let sql = format!(
            r"
            SELECT {COLUMNS} FROM records
            WHERE has_attachment = 1
              AND attachment_path LIKE '%.pdf'
              AND sender_organization IS NULL
            ORDER BY id
            "
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Records ready for staging: classified, PDF attachment present, not
    /// yet staged. Export runs strictly after classification.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn classified_unstaged(&self, limit: u32) -> Result<Vec<Record>> {
        let sql = format!(
            r"
            SELECT {COLUMNS} FROM records
            WHERE has_attachment = 1
              AND attachment_path LIKE '%.pdf'
              AND sender_organization IS NOT NULL
              AND processed_path IS NULL
            ORDER BY id
            LIMIT ?
            "
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Records staged locally but not yet uploaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn staged_not_uploaded(&self) -> Result<Vec<Record>> {
        let sql = format!(
            r"
            SELECT {COLUMNS} FROM records
            WHERE processed_path IS NOT NULL AND uploaded = 0
            ORDER BY id
            "
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Commit a classification to a record.
    ///
    /// The organization is set at most once: a record that already carries
    /// one is left untouched and `false` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn apply_classification(
        &self,
        id: RecordId,
        classification: &Classification,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE records
            SET sender_organization = ?, is_spam = ?, is_invoice = ?
            WHERE id = ? AND sender_organization IS NULL
            ",
        )
        .bind(&classification.organization)
        .bind(classification.is_spam)
        .bind(classification.is_invoice)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record staged paths for a whole categorize batch in one transaction.
    ///
    /// All-or-nothing: a crash mid-batch leaves either every record of the
    /// batch advanced or none of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is persisted then.
    pub async fn mark_staged(&self, staged: &[(RecordId, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (id, path) in staged {
            sqlx::query(
                r"
                UPDATE records SET processed_path = ?, uploaded = 0
                WHERE id = ?
                ",
            )
            .bind(path)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Flip the terminal uploaded flag.
    ///
    /// Guarded by `processed_path`: a record can never become uploaded
    /// without having been staged first.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_uploaded(&self, id: RecordId) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE records SET uploaded = 1
            WHERE id = ? AND processed_path IS NOT NULL
            ",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a record. Administrative only; no pipeline stage calls this.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: RecordId) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Parses a stored RFC 3339 timestamp, falling back to now on corruption.
fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text).map_or_else(|_| Utc::now(), |d| d.with_timezone(&Utc))
}

fn row_to_record(row: &SqliteRow) -> Record {
    Record {
        id: RecordId(row.get("id")),
        mailbox_account: row.get("mailbox_account"),
        subject: row.get("subject"),
        sender: row.get("sender"),
        sender_organization: row.get("sender_organization"),
        body: row.get("body"),
        received_at: parse_timestamp(row.get::<String, _>("received_at").as_str()),
        is_spam: row.get("is_spam"),
        is_invoice: row.get("is_invoice"),
        has_attachment: row.get("has_attachment"),
        attachment_path: row.get("attachment_path"),
        processed_path: row.get("processed_path"),
        uploaded: row.get("uploaded"),
        headers: HeaderSnapshot {
            return_path: row.get("return_path"),
            envelope_to: row.get("envelope_to"),
            delivery_date: row
                .get::<Option<String>, _>("delivery_date")
                .map(|d| parse_timestamp(&d)),
            received_from: row.get("received_from"),
            dkim_signature: row.get("dkim_signature"),
            spam_status: row.get("spam_status"),
            spam_report: row.get("spam_report"),
        },
    }
}
