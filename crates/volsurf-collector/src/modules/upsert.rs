//! 정규화 후보 upsert 모듈.

use serde::Serialize;
use tracing::{debug, instrument, warn};
use volsurf_core::{NormalizedRecord, UpsertDecision};
use volsurf_data::CleanStore;

use crate::metrics::RunMetrics;
use crate::Result;

/// upsert 결과 요약.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: u64,
    pub updated: u64,
    /// 같은 버전/시각을 다시 적용한 경우 (충돌 아님)
    pub duplicates: u64,
    /// 저장된 레코드보다 오래된 후보
    pub conflicts: u64,
}

impl UpsertSummary {
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn record_metrics(&self, metrics: &mut RunMetrics) {
        metrics.records_inserted += self.inserted;
        metrics.records_updated += self.updated;
        metrics.duplicates_discarded += self.duplicates;
        metrics.conflicts += self.conflicts;
    }

    fn count(&mut self, decision: UpsertDecision) {
        match decision {
            UpsertDecision::Insert => self.inserted += 1,
            UpsertDecision::Update => self.updated += 1,
            UpsertDecision::Duplicate => self.duplicates += 1,
            UpsertDecision::Conflict => self.conflicts += 1,
        }
    }
}

/// 후보를 정규화 저장소에 반영합니다.
///
/// 각 후보는 자연키 단위로 원자적으로 반영됩니다.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub async fn resolve(store: &dyn CleanStore, candidates: &[NormalizedRecord]) -> Result<UpsertSummary> {
    let mut summary = UpsertSummary::default();
    for candidate in candidates {
        let decision = store.apply(candidate).await?;
        if decision == UpsertDecision::Conflict {
            warn!(
                key = %candidate.key,
                raw_data_id = candidate.provenance.raw_data_id,
                version = candidate.provenance.version,
                "ConflictDetected: 저장된 레코드보다 오래된 후보, 버립니다"
            );
        }
        summary.count(decision);
    }
    debug!(
        inserted = summary.inserted,
        updated = summary.updated,
        duplicates = summary.duplicates,
        conflicts = summary.conflicts,
        "upsert 완료"
    );
    Ok(summary)
}
