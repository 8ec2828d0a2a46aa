//! 저장소 인터페이스와 구현.
//!
//! - [`RawLedger`]: 원천 레코드 원장 (추가 전용, 키별 버전 부여)
//! - [`CleanStore`]: 정규화 레코드 저장소 (자연키당 1건)
//! - [`ChunkStore`]: 백필 청크 상태 저장소
//!
//! 각 인터페이스는 PostgreSQL 구현(`postgres`)과 인메모리 구현(`memory`)을 가집니다.

pub mod database;
pub mod integrity;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use std::collections::BTreeSet;
use volsurf_core::{
    BackfillChunk, LedgerKey, NaturalKey, NewRawRecord, NormalizedRecord, RawRecord,
    UpsertDecision,
};

use crate::error::Result;

/// 원장 추가 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    pub record: RawRecord,
    /// 이미 버전이 있던 키를 다시 가져온 경우
    pub duplicate_fetch: bool,
}

/// 원천 레코드 원장.
///
/// 버전 부여는 키별 단일 직렬화 지점이며, 같은 키에 대한 두 추가가
/// 같은 버전을 받는 일은 없습니다.
#[async_trait]
pub trait RawLedger: Send + Sync {
    /// 다음에 부여될 버전 (조회 전용, 예약하지 않음).
    async fn next_version(&self, key: &LedgerKey) -> Result<i32> {
        Ok(self.latest_version(key).await?.unwrap_or(0) + 1)
    }

    /// 최신 버전.
    async fn latest_version(&self, key: &LedgerKey) -> Result<Option<i32>>;

    /// 새 원천 레코드를 추가하고 버전을 부여합니다.
    async fn append(&self, record: NewRawRecord) -> Result<AppendOutcome>;

    /// 윈도우 안에서 이미 버전이 있는 날짜.
    async fn versioned_dates(
        &self,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>>;

    /// 윈도우 안의 키별 최신 원천 레코드.
    async fn latest_records(
        &self,
        expressions: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>>;

    /// 키의 모든 버전 (버전 오름차순).
    async fn history(&self, key: &LedgerKey) -> Result<Vec<RawRecord>>;
}

/// 정규화 레코드 저장소.
#[async_trait]
pub trait CleanStore: Send + Sync {
    /// 후보 레코드를 자연키 단위로 원자적으로 반영합니다.
    ///
    /// 반영 방법은 [`UpsertDecision::decide`]로 결정되며, 같은 자연키에 대한
    /// 두 반영은 직렬화됩니다.
    async fn apply(&self, candidate: &NormalizedRecord) -> Result<UpsertDecision>;

    async fn get(&self, key: &NaturalKey) -> Result<Option<NormalizedRecord>>;

    /// 저장된 모든 레코드 (자연키 순).
    async fn records(&self) -> Result<Vec<NormalizedRecord>>;

    /// 두 건 이상 존재하는 자연키 수 (정상이면 0).
    async fn duplicate_keys(&self) -> Result<u64>;
}

/// 백필 청크 상태 저장소.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// 계획의 모든 청크 (순번 순).
    async fn load(&self, run_key: &str) -> Result<Vec<BackfillChunk>>;

    /// 계획을 저장합니다. 이미 있는 청크는 건드리지 않습니다.
    async fn insert_plan(&self, chunks: &[BackfillChunk]) -> Result<()>;

    /// 청크 상태를 저장합니다.
    async fn save(&self, chunk: &BackfillChunk) -> Result<()>;
}

/// 직렬화 구간 안에서 새 레코드의 버전과 시각을 정합니다.
///
/// 버전 순서와 fetch 시각 순서가 어긋나지 않도록, 최신 버전보다 이른 시각으로
/// 늦게 커밋된 레코드는 최신 시각 직후로 당겨집니다. 시각은 PostgreSQL
/// 정밀도(마이크로초)로 잘립니다.
pub(crate) fn assign_version(
    latest: Option<(i32, DateTime<Utc>)>,
    fetch_timestamp: DateTime<Utc>,
) -> (i32, DateTime<Utc>) {
    let fetched = fetch_timestamp.trunc_subsecs(6);
    match latest {
        None => (1, fetched),
        Some((version, latest_ts)) if fetched <= latest_ts => {
            tracing::warn!(
                version = version + 1,
                fetched = %fetched,
                latest = %latest_ts,
                "fetch 시각이 최신 버전보다 이릅니다, 시각을 보정합니다"
            );
            (version + 1, latest_ts + Duration::microseconds(1))
        }
        Some((version, _)) => (version + 1, fetched),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_assign_first_version() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let (v, stamped) = assign_version(None, ts);
        assert_eq!(v, 1);
        assert_eq!(stamped.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_assign_increments() {
        let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_010, 0).unwrap();
        assert_eq!(assign_version(Some((4, t1)), t2), (5, t2));
    }

    #[test]
    fn test_assign_out_of_order_commit_is_pushed_forward() {
        let late = Utc.timestamp_opt(1_700_000_010, 0).unwrap();
        let early = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let (v, stamped) = assign_version(Some((2, late)), early);
        assert_eq!(v, 3);
        assert!(stamped > late);
    }
}
