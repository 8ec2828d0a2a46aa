//! 정규화 저장소 무결성 점검.

use serde::Serialize;
use tracing::{info, instrument, warn};
use volsurf_core::{LedgerKey, NaturalKey};

use super::{CleanStore, RawLedger};
use crate::error::Result;

/// 무결성 점검 결과.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    /// 정규화 레코드 수
    pub clean_rows: u64,
    /// 2건 이상 존재하는 자연키 수
    pub duplicate_keys: u64,
    /// 원장의 최신 버전이 아닌 원천 레코드를 가리키는 행
    pub stale_keys: Vec<NaturalKey>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_keys == 0 && self.stale_keys.is_empty()
    }
}

/// 원장과 정규화 저장소를 비교해 무결성을 점검합니다.
///
/// 자연키 중복은 항상 0이어야 합니다. 오래된 행은 변환 이후 새 버전이
/// 추가되었음을 뜻하며 다음 실행에서 갱신됩니다.
#[instrument(skip_all)]
pub async fn integrity_report(
    ledger: &dyn RawLedger,
    clean: &dyn CleanStore,
) -> Result<IntegrityReport> {
    let records = clean.records().await?;
    let duplicate_keys = clean.duplicate_keys().await?;

    let mut stale_keys = Vec::new();
    for record in &records {
        let latest = ledger
            .latest_version(&LedgerKey::new(record.expression.clone(), record.key.date))
            .await?;
        if latest.is_some_and(|v| v > record.provenance.version) {
            stale_keys.push(record.key);
        }
    }

    let report = IntegrityReport {
        clean_rows: records.len() as u64,
        duplicate_keys,
        stale_keys,
    };

    if report.is_clean() {
        info!(clean_rows = report.clean_rows, "Integrity check passed");
    } else {
        warn!(
            clean_rows = report.clean_rows,
            duplicate_keys = report.duplicate_keys,
            stale_rows = report.stale_keys.len(),
            "Integrity check found issues"
        );
    }
    Ok(report)
}
