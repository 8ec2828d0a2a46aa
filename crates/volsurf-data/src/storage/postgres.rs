//! PostgreSQL 저장소 구현.
//!
//! - [`PgRawLedger`]: 키별 advisory lock으로 버전 부여를 직렬화
//! - [`PgCleanStore`]: 후보마다 하나의 트랜잭션 (`FOR UPDATE` + `ON CONFLICT DO NOTHING`)
//! - [`PgChunkStore`]: `backfill_chunk` 테이블

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};
use volsurf_core::{
    BackfillChunk, LedgerKey, NaturalKey, NewRawRecord, NormalizedRecord, Provenance, RawRecord,
    UpsertDecision,
};

use super::database::Database;
use super::{assign_version, AppendOutcome, ChunkStore, CleanStore, RawLedger};
use crate::error::{DataError, Result};

fn parse_column<T>(column: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e: String| DataError::InvalidData(format!("{}: {}", column, e)))
}

// =============================================================================
// Raw ledger
// =============================================================================

#[derive(Debug, FromRow)]
struct RawRow {
    raw_data_id: i64,
    expression: String,
    date: NaiveDate,
    value: Option<f64>,
    fetch_timestamp: DateTime<Utc>,
    version: i32,
    ingestion_mode: String,
    source_file_uri: String,
}

impl TryFrom<RawRow> for RawRecord {
    type Error = DataError;

    fn try_from(row: RawRow) -> Result<Self> {
        Ok(RawRecord {
            id: row.raw_data_id,
            expression: row.expression,
            date: row.date,
            value: row.value,
            fetch_timestamp: row.fetch_timestamp,
            version: row.version,
            ingestion_mode: parse_column("ingestion_mode", &row.ingestion_mode)?,
            source_file_uri: row.source_file_uri,
        })
    }
}

const RAW_COLUMNS: &str = "raw_data_id, expression, date, value, fetch_timestamp, version, \
                           ingestion_mode, source_file_uri";

/// PostgreSQL 원천 레코드 원장.
#[derive(Clone)]
pub struct PgRawLedger {
    db: Database,
}

impl PgRawLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RawLedger for PgRawLedger {
    async fn latest_version(&self, key: &LedgerKey) -> Result<Option<i32>> {
        let version: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(version) FROM raw_data WHERE expression = $1 AND date = $2",
        )
        .bind(&key.expression)
        .bind(key.date)
        .fetch_one(self.db.pool())
        .await?;
        Ok(version)
    }

    #[instrument(skip(self, record), fields(key = %record.key()))]
    async fn append(&self, record: NewRawRecord) -> Result<AppendOutcome> {
        let key = record.key();
        let mut tx = self.db.pool().begin().await?;

        // 같은 키에 대한 버전 부여는 트랜잭션 종료까지 직렬화
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{}|{}", key.expression, key.date))
            .execute(&mut *tx)
            .await?;

        let latest: Option<(i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT version, fetch_timestamp FROM raw_data
            WHERE expression = $1 AND date = $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(&key.expression)
        .bind(key.date)
        .fetch_optional(&mut *tx)
        .await?;

        let duplicate_fetch = latest.is_some();
        if duplicate_fetch {
            warn!(key = %key, "DuplicateFetchWarning: 이미 버전이 있는 키를 다시 가져왔습니다");
        }
        let (version, fetch_timestamp) = assign_version(latest, record.fetch_timestamp);

        let row: RawRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO raw_data
                (expression, date, value, fetch_timestamp, version, ingestion_mode, source_file_uri)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            RAW_COLUMNS
        ))
        .bind(&record.expression)
        .bind(record.date)
        .bind(record.value)
        .bind(fetch_timestamp)
        .bind(version)
        .bind(record.ingestion_mode.as_str())
        .bind(&record.source_file_uri)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(id = row.raw_data_id, version, "Raw record appended");
        Ok(AppendOutcome {
            record: row.try_into()?,
            duplicate_fetch,
        })
    }

    async fn versioned_dates(
        &self,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT date FROM raw_data
            WHERE expression = $1 AND date BETWEEN $2 AND $3
            "#,
        )
        .bind(expression)
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await?;
        Ok(dates.into_iter().collect())
    }

    async fn latest_records(
        &self,
        expressions: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>> {
        let rows: Vec<RawRow> = sqlx::query_as(&format!(
            r#"
            SELECT DISTINCT ON (expression, date) {}
            FROM raw_data
            WHERE expression = ANY($1) AND date BETWEEN $2 AND $3
            ORDER BY expression, date, version DESC
            "#,
            RAW_COLUMNS
        ))
        .bind(expressions)
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(RawRecord::try_from).collect()
    }

    async fn history(&self, key: &LedgerKey) -> Result<Vec<RawRecord>> {
        let rows: Vec<RawRow> = sqlx::query_as(&format!(
            "SELECT {} FROM raw_data WHERE expression = $1 AND date = $2 ORDER BY version",
            RAW_COLUMNS
        ))
        .bind(&key.expression)
        .bind(key.date)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(RawRecord::try_from).collect()
    }
}

// =============================================================================
// Clean store
// =============================================================================

#[derive(Debug, FromRow)]
struct CleanRow {
    date: NaiveDate,
    currency: String,
    x: String,
    y: String,
    reference_rate: String,
    value: f64,
    expression: String,
    raw_data_id: i64,
    version: i32,
    fetch_timestamp: DateTime<Utc>,
}

impl TryFrom<CleanRow> for NormalizedRecord {
    type Error = DataError;

    fn try_from(row: CleanRow) -> Result<Self> {
        Ok(NormalizedRecord {
            key: NaturalKey {
                date: row.date,
                currency: parse_column("currency", &row.currency)?,
                option_tenor: parse_column("x", &row.x)?,
                swap_tenor: parse_column("y", &row.y)?,
                reference_rate: parse_column("ref", &row.reference_rate)?,
            },
            value: row.value,
            expression: row.expression,
            provenance: Provenance {
                raw_data_id: row.raw_data_id,
                version: row.version,
                fetch_timestamp: row.fetch_timestamp,
            },
        })
    }
}

const CLEAN_SELECT: &str = r#"
    SELECT c.date, c.currency, c.x, c.y, c.ref AS reference_rate, c.value, c.expression,
           c.raw_data_id, r.version, r.fetch_timestamp
    FROM clean_data c
    JOIN raw_data r ON r.raw_data_id = c.raw_data_id
"#;

const KEY_FILTER: &str =
    "c.date = $1 AND c.currency = $2 AND c.x = $3 AND c.y = $4 AND c.ref = $5";

/// 자연키 행을 잠그고 현재 계보를 읽습니다.
async fn lock_existing(conn: &mut PgConnection, key: &NaturalKey) -> Result<Option<Provenance>> {
    let row: Option<(i64, i32, DateTime<Utc>)> = sqlx::query_as(&format!(
        r#"
        SELECT c.raw_data_id, r.version, r.fetch_timestamp
        FROM clean_data c
        JOIN raw_data r ON r.raw_data_id = c.raw_data_id
        WHERE {}
        FOR UPDATE OF c
        "#,
        KEY_FILTER
    ))
    .bind(key.date)
    .bind(key.currency.as_str())
    .bind(key.option_tenor.as_str())
    .bind(key.swap_tenor.as_str())
    .bind(key.reference_rate.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(raw_data_id, version, fetch_timestamp)| Provenance {
        raw_data_id,
        version,
        fetch_timestamp,
    }))
}

/// PostgreSQL 정규화 레코드 저장소.
#[derive(Clone)]
pub struct PgCleanStore {
    db: Database,
}

impl PgCleanStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn update(conn: &mut PgConnection, candidate: &NormalizedRecord) -> Result<()> {
        let key = &candidate.key;
        sqlx::query(
            r#"
            UPDATE clean_data
            SET value = $6, raw_data_id = $7, expression = $8, updated_at = NOW()
            WHERE date = $1 AND currency = $2 AND x = $3 AND y = $4 AND ref = $5
            "#,
        )
        .bind(key.date)
        .bind(key.currency.as_str())
        .bind(key.option_tenor.as_str())
        .bind(key.swap_tenor.as_str())
        .bind(key.reference_rate.as_str())
        .bind(candidate.value)
        .bind(candidate.provenance.raw_data_id)
        .bind(&candidate.expression)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CleanStore for PgCleanStore {
    #[instrument(skip(self, candidate), fields(key = %candidate.key))]
    async fn apply(&self, candidate: &NormalizedRecord) -> Result<UpsertDecision> {
        let key = &candidate.key;
        let mut tx = self.db.pool().begin().await?;

        let mut existing = lock_existing(&mut *tx, key).await?;
        if existing.is_none() {
            let inserted = sqlx::query(
                r#"
                INSERT INTO clean_data (date, currency, x, y, ref, value, raw_data_id, expression)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT ON CONSTRAINT clean_data_natural_key DO NOTHING
                "#,
            )
            .bind(key.date)
            .bind(key.currency.as_str())
            .bind(key.option_tenor.as_str())
            .bind(key.swap_tenor.as_str())
            .bind(key.reference_rate.as_str())
            .bind(candidate.value)
            .bind(candidate.provenance.raw_data_id)
            .bind(&candidate.expression)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 1 {
                tx.commit().await?;
                return Ok(UpsertDecision::Insert);
            }

            // 다른 트랜잭션이 먼저 삽입함
            existing = lock_existing(&mut *tx, key).await?;
            if existing.is_none() {
                return Err(DataError::QueryError(format!(
                    "clean_data row for {} vanished after insert conflict",
                    key
                )));
            }
        }

        let decision = UpsertDecision::decide(existing.as_ref(), &candidate.provenance);
        if decision == UpsertDecision::Update {
            Self::update(&mut *tx, candidate).await?;
        }
        tx.commit().await?;
        Ok(decision)
    }

    async fn get(&self, key: &NaturalKey) -> Result<Option<NormalizedRecord>> {
        let row: Option<CleanRow> =
            sqlx::query_as(&format!("{} WHERE {}", CLEAN_SELECT, KEY_FILTER))
                .bind(key.date)
                .bind(key.currency.as_str())
                .bind(key.option_tenor.as_str())
                .bind(key.swap_tenor.as_str())
                .bind(key.reference_rate.as_str())
                .fetch_optional(self.db.pool())
                .await?;

        row.map(NormalizedRecord::try_from).transpose()
    }

    async fn records(&self) -> Result<Vec<NormalizedRecord>> {
        let rows: Vec<CleanRow> = sqlx::query_as(CLEAN_SELECT)
            .fetch_all(self.db.pool())
            .await?;

        let mut records = rows
            .into_iter()
            .map(NormalizedRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    async fn duplicate_keys(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT 1 FROM clean_data
                GROUP BY date, currency, x, y, ref
                HAVING COUNT(*) > 1
            ) dup
            "#,
        )
        .fetch_one(self.db.pool())
        .await?;
        Ok(count.max(0) as u64)
    }
}

// =============================================================================
// Chunk store
// =============================================================================

#[derive(Debug, FromRow)]
struct ChunkRow {
    run_key: String,
    chunk_index: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    error_detail: Option<String>,
}

impl TryFrom<ChunkRow> for BackfillChunk {
    type Error = DataError;

    fn try_from(row: ChunkRow) -> Result<Self> {
        Ok(BackfillChunk {
            run_key: row.run_key,
            chunk_index: row.chunk_index,
            start_date: row.start_date,
            end_date: row.end_date,
            status: parse_column("status", &row.status)?,
            attempts: row.attempts,
            last_attempt_at: row.last_attempt_at,
            error_detail: row.error_detail,
        })
    }
}

/// PostgreSQL 백필 청크 저장소.
#[derive(Clone)]
pub struct PgChunkStore {
    db: Database,
}

impl PgChunkStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn load(&self, run_key: &str) -> Result<Vec<BackfillChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT run_key, chunk_index, start_date, end_date, status, attempts,
                   last_attempt_at, error_detail
            FROM backfill_chunk
            WHERE run_key = $1
            ORDER BY chunk_index
            "#,
        )
        .bind(run_key)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(BackfillChunk::try_from).collect()
    }

    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    async fn insert_plan(&self, chunks: &[BackfillChunk]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO backfill_chunk (run_key, chunk_index, start_date, end_date, status, attempts)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (run_key, chunk_index) DO NOTHING
                "#,
            )
            .bind(&chunk.run_key)
            .bind(chunk.chunk_index)
            .bind(chunk.start_date)
            .bind(chunk.end_date)
            .bind(chunk.status.as_str())
            .bind(chunk.attempts)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, chunk: &BackfillChunk) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE backfill_chunk
            SET status = $3, attempts = $4, last_attempt_at = $5, error_detail = $6
            WHERE run_key = $1 AND chunk_index = $2
            "#,
        )
        .bind(&chunk.run_key)
        .bind(chunk.chunk_index)
        .bind(chunk.status.as_str())
        .bind(chunk.attempts)
        .bind(chunk.last_attempt_at)
        .bind(&chunk.error_detail)
        .execute(self.db.pool())
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DataError::NotFound(format!(
                "backfill chunk {}#{}",
                chunk.run_key, chunk.chunk_index
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volsurf_core::{ChunkStatus, Currency, IngestionMode};

    #[test]
    fn test_parse_column_maps_errors() {
        let mode: IngestionMode = parse_column("ingestion_mode", "old_codes").unwrap();
        assert_eq!(mode, IngestionMode::OldCodes);
        let status: ChunkStatus = parse_column("status", "in_progress").unwrap();
        assert_eq!(status, ChunkStatus::InProgress);

        let err = parse_column::<Currency>("currency", "JPY").unwrap_err();
        assert!(matches!(err, DataError::InvalidData(msg) if msg.starts_with("currency")));
    }

    #[test]
    fn test_clean_row_conversion() {
        let row = CleanRow {
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            currency: "USD".to_string(),
            x: "1y".to_string(),
            y: "5y".to_string(),
            reference_rate: "SOFR".to_string(),
            value: 1587.45,
            expression: "DB(COV,VOLSWAPTION,USDD,5y,1y,PAYER,VOLBPVOL)".to_string(),
            raw_data_id: 7,
            version: 2,
            fetch_timestamp: Utc::now(),
        };
        let record = NormalizedRecord::try_from(row).unwrap();
        assert_eq!(record.key.currency, Currency::Usd);
        assert_eq!(record.provenance.version, 2);
    }
}
