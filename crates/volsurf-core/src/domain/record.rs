//! 원천(raw) 레코드와 정규화(clean) 레코드.
//!
//! 원천 레코드는 추가 전용(append-only)이며, 정규화 레코드는 자연키마다
//! 최대 한 건만 존재합니다. 두 레코드는 [`Provenance`]로 연결되고,
//! 갱신 여부는 [`UpsertDecision::decide`]가 결정합니다.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::types::{Currency, IngestionMode, OptionTenor, ReferenceRate, SwapTenor};

/// 원천 레코드 식별자 (expression, date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub expression: String,
    pub date: NaiveDate,
}

impl LedgerKey {
    pub fn new(expression: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            expression: expression.into(),
            date,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.expression, self.date)
    }
}

/// 시세 소스가 돌려준 한 행.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FetchedRow {
    pub date: NaiveDate,
    /// 숫자가 아닌 값은 None
    pub value: Option<f64>,
}

/// 원장에 추가하기 전의 원천 레코드.
///
/// 버전은 원장이 직렬화된 쓰기 경로 안에서 부여합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRawRecord {
    pub expression: String,
    pub date: NaiveDate,
    /// API가 돌려준 값 (숫자가 아니면 None)
    pub value: Option<f64>,
    pub fetch_timestamp: DateTime<Utc>,
    pub ingestion_mode: IngestionMode,
    /// 원본 응답이 저장된 blob URI
    pub source_file_uri: String,
}

impl NewRawRecord {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.expression.clone(), self.date)
    }
}

/// 원장에 기록된 원천 레코드 (불변).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// 저장소가 부여한 ID (raw_data_id)
    pub id: i64,
    pub expression: String,
    pub date: NaiveDate,
    pub value: Option<f64>,
    pub fetch_timestamp: DateTime<Utc>,
    /// (expression, date)별 1부터 시작하는 버전
    pub version: i32,
    pub ingestion_mode: IngestionMode,
    pub source_file_uri: String,
}

impl RawRecord {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.expression.clone(), self.date)
    }

    /// 이 레코드의 계보 정보.
    pub fn provenance(&self) -> Provenance {
        Provenance {
            raw_data_id: self.id,
            version: self.version,
            fetch_timestamp: self.fetch_timestamp,
        }
    }
}

/// 정규화 레코드의 자연키.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub date: NaiveDate,
    pub currency: Currency,
    /// 옵션 만기 (x)
    pub option_tenor: OptionTenor,
    /// 스왑 테너 (y)
    pub swap_tenor: SwapTenor,
    pub reference_rate: ReferenceRate,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}x{}/{}",
            self.date, self.currency, self.option_tenor, self.swap_tenor, self.reference_rate
        )
    }
}

/// 정규화 레코드를 만든 원천 레코드 정보.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub raw_data_id: i64,
    pub version: i32,
    pub fetch_timestamp: DateTime<Utc>,
}

impl Provenance {
    /// (version, fetch_timestamp) 기준 비교.
    ///
    /// 같은 버전이면 더 늦게 가져온 쪽이 더 최신입니다.
    pub fn freshness_cmp(&self, other: &Provenance) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.fetch_timestamp.cmp(&other.fetch_timestamp))
    }
}

/// 정규화 레코드 (자연키당 최대 1건).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub key: NaturalKey,
    /// 변환된 값
    pub value: f64,
    /// 원천 표현식 (감사용, 키에 포함되지 않음)
    pub expression: String,
    pub provenance: Provenance,
}

/// 후보 레코드를 저장소에 반영하는 방법.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertDecision {
    /// 기존 레코드 없음
    Insert,
    /// 후보가 더 최신
    Update,
    /// 동일 버전 + 동일 시각: 같은 레코드를 다시 적용한 경우
    Duplicate,
    /// 후보가 더 오래됨 (순서가 뒤바뀐 적용)
    Conflict,
}

impl UpsertDecision {
    /// 기존 레코드의 계보와 후보의 계보로 반영 방법을 결정합니다.
    pub fn decide(existing: Option<&Provenance>, candidate: &Provenance) -> Self {
        let Some(existing) = existing else {
            return UpsertDecision::Insert;
        };
        match candidate.freshness_cmp(existing) {
            Ordering::Greater => UpsertDecision::Update,
            Ordering::Equal => UpsertDecision::Duplicate,
            Ordering::Less => UpsertDecision::Conflict,
        }
    }

    /// 저장소에 쓰기가 발생하는지 여부.
    pub fn writes(&self) -> bool {
        matches!(self, UpsertDecision::Insert | UpsertDecision::Update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn prov(version: i32, secs: i64) -> Provenance {
        Provenance {
            raw_data_id: version as i64,
            version,
            fetch_timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_decide_insert_when_missing() {
        assert_eq!(UpsertDecision::decide(None, &prov(1, 0)), UpsertDecision::Insert);
    }

    #[test]
    fn test_decide_newer_version_updates() {
        assert_eq!(
            UpsertDecision::decide(Some(&prov(1, 10)), &prov(2, 0)),
            UpsertDecision::Update
        );
    }

    #[test]
    fn test_decide_same_version_later_timestamp_updates() {
        assert_eq!(
            UpsertDecision::decide(Some(&prov(2, 0)), &prov(2, 5)),
            UpsertDecision::Update
        );
    }

    #[test]
    fn test_decide_exact_match_is_duplicate() {
        let p = prov(3, 7);
        assert_eq!(UpsertDecision::decide(Some(&p), &p), UpsertDecision::Duplicate);
        assert!(!UpsertDecision::Duplicate.writes());
    }

    #[test]
    fn test_decide_older_is_conflict() {
        assert_eq!(
            UpsertDecision::decide(Some(&prov(3, 0)), &prov(2, 100)),
            UpsertDecision::Conflict
        );
        assert_eq!(
            UpsertDecision::decide(Some(&prov(3, 10)), &prov(3, 5)),
            UpsertDecision::Conflict
        );
    }
}
