//! 인메모리 저장소 구현.
//!
//! `DATABASE_URL`이 없을 때와 테스트에서 사용합니다. 각 저장소는 하나의
//! 뮤텍스로 쓰기 경로를 직렬화합니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use volsurf_core::{
    BackfillChunk, LedgerKey, NaturalKey, NewRawRecord, NormalizedRecord, RawRecord,
    UpsertDecision,
};

use super::{assign_version, AppendOutcome, ChunkStore, CleanStore, RawLedger};
use crate::error::{DataError, Result};

// =============================================================================
// Raw ledger
// =============================================================================

#[derive(Default)]
struct LedgerArena {
    /// 추가 순서대로 쌓이는 레코드 (id = 인덱스 + 1)
    records: Vec<RawRecord>,
    /// 키 → 버전 오름차순 레코드 인덱스
    index: HashMap<LedgerKey, Vec<usize>>,
}

impl LedgerArena {
    fn latest(&self, key: &LedgerKey) -> Option<&RawRecord> {
        self.index
            .get(key)
            .and_then(|slots| slots.last())
            .map(|&slot| &self.records[slot])
    }
}

/// 인메모리 원천 레코드 원장.
#[derive(Default)]
pub struct MemoryRawLedger {
    arena: Mutex<LedgerArena>,
}

impl MemoryRawLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 전체 레코드 수.
    pub async fn len(&self) -> usize {
        self.arena.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RawLedger for MemoryRawLedger {
    async fn latest_version(&self, key: &LedgerKey) -> Result<Option<i32>> {
        Ok(self.arena.lock().await.latest(key).map(|r| r.version))
    }

    #[instrument(skip(self, record), fields(key = %record.key()))]
    async fn append(&self, record: NewRawRecord) -> Result<AppendOutcome> {
        let key = record.key();
        let mut arena = self.arena.lock().await;

        let latest = arena
            .latest(&key)
            .map(|r| (r.version, r.fetch_timestamp));
        let duplicate_fetch = latest.is_some();
        if duplicate_fetch {
            warn!(key = %key, "DuplicateFetchWarning: 이미 버전이 있는 키를 다시 가져왔습니다");
        }
        let (version, fetch_timestamp) = assign_version(latest, record.fetch_timestamp);

        let slot = arena.records.len();
        let stored = RawRecord {
            id: slot as i64 + 1,
            expression: record.expression,
            date: record.date,
            value: record.value,
            fetch_timestamp,
            version,
            ingestion_mode: record.ingestion_mode,
            source_file_uri: record.source_file_uri,
        };
        arena.records.push(stored.clone());
        arena.index.entry(key).or_default().push(slot);

        debug!(id = stored.id, version, "Raw record appended");
        Ok(AppendOutcome {
            record: stored,
            duplicate_fetch,
        })
    }

    async fn versioned_dates(
        &self,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        let arena = self.arena.lock().await;
        Ok(arena
            .index
            .keys()
            .filter(|k| k.expression == expression && k.date >= start && k.date <= end)
            .map(|k| k.date)
            .collect())
    }

    async fn latest_records(
        &self,
        expressions: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>> {
        let arena = self.arena.lock().await;
        let mut latest: Vec<RawRecord> = arena
            .index
            .iter()
            .filter(|(k, _)| {
                k.date >= start && k.date <= end && expressions.iter().any(|e| *e == k.expression)
            })
            .filter_map(|(_, slots)| slots.last().map(|&slot| arena.records[slot].clone()))
            .collect();
        latest.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(latest)
    }

    async fn history(&self, key: &LedgerKey) -> Result<Vec<RawRecord>> {
        let arena = self.arena.lock().await;
        Ok(arena
            .index
            .get(key)
            .map(|slots| slots.iter().map(|&slot| arena.records[slot].clone()).collect())
            .unwrap_or_default())
    }
}

// =============================================================================
// Clean store
// =============================================================================

/// 인메모리 정규화 레코드 저장소.
///
/// 자연키를 맵의 키로 쓰므로 자연키당 2건 이상은 구조적으로 존재할 수 없습니다.
#[derive(Default)]
pub struct MemoryCleanStore {
    rows: Mutex<BTreeMap<NaturalKey, NormalizedRecord>>,
}

impl MemoryCleanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CleanStore for MemoryCleanStore {
    #[instrument(skip(self, candidate), fields(key = %candidate.key))]
    async fn apply(&self, candidate: &NormalizedRecord) -> Result<UpsertDecision> {
        if !(candidate.value.is_finite() && candidate.value > 0.0) {
            return Err(DataError::InvalidData(format!(
                "value must be positive: {} for {}",
                candidate.value, candidate.key
            )));
        }

        let mut rows = self.rows.lock().await;
        let existing = rows.get(&candidate.key).map(|r| r.provenance);
        let decision = UpsertDecision::decide(existing.as_ref(), &candidate.provenance);
        if decision.writes() {
            rows.insert(candidate.key, candidate.clone());
        }
        Ok(decision)
    }

    async fn get(&self, key: &NaturalKey) -> Result<Option<NormalizedRecord>> {
        Ok(self.rows.lock().await.get(key).cloned())
    }

    async fn records(&self) -> Result<Vec<NormalizedRecord>> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn duplicate_keys(&self) -> Result<u64> {
        Ok(0)
    }
}

// =============================================================================
// Chunk store
// =============================================================================

/// 인메모리 백필 청크 저장소.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<BTreeMap<(String, i32), BackfillChunk>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn load(&self, run_key: &str) -> Result<Vec<BackfillChunk>> {
        let chunks = self.chunks.lock().await;
        Ok(chunks
            .values()
            .filter(|c| c.run_key == run_key)
            .cloned()
            .collect())
    }

    async fn insert_plan(&self, plan: &[BackfillChunk]) -> Result<()> {
        let mut chunks = self.chunks.lock().await;
        for chunk in plan {
            chunks
                .entry((chunk.run_key.clone(), chunk.chunk_index))
                .or_insert_with(|| chunk.clone());
        }
        Ok(())
    }

    async fn save(&self, chunk: &BackfillChunk) -> Result<()> {
        let mut chunks = self.chunks.lock().await;
        match chunks.get_mut(&(chunk.run_key.clone(), chunk.chunk_index)) {
            Some(stored) => {
                *stored = chunk.clone();
                Ok(())
            }
            None => Err(DataError::NotFound(format!(
                "backfill chunk {}#{}",
                chunk.run_key, chunk.chunk_index
            ))),
        }
    }
}
