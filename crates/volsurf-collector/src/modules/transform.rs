//! 원천 레코드 → 정규화 후보 변환 모듈.
//!
//! 1. 표현식 매핑 (실패 시 `invalid_placeholder`)
//! 2. 값 검증 (없거나 유한하지 않으면 `non_numeric_value`, 0 이하면 `non_positive_value`)
//! 3. 기준금리별 변환 (SOFR는 √252 배, 결과가 유한하지 않으면 `non_finite_value`)
//! 4. 원천 레코드의 ID/버전/fetch 시각을 계보로 부착

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use volsurf_core::{ExpressionMapper, NormalizedRecord, RawRecord};

use crate::metrics::RunMetrics;

/// 거부 사유 코드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidPlaceholder,
    NonNumericValue,
    NonPositiveValue,
    NonFiniteValue,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPlaceholder => "invalid_placeholder",
            Self::NonNumericValue => "non_numeric_value",
            Self::NonPositiveValue => "non_positive_value",
            Self::NonFiniteValue => "non_finite_value",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 거부된 원천 레코드.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub record: RawRecord,
    pub reason: RejectReason,
    pub detail: String,
}

/// 변환 결과.
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub accepted: Vec<NormalizedRecord>,
    pub rejected: Vec<Rejection>,
}

impl TransformOutcome {
    /// 변환 통계를 기록합니다.
    pub fn record_metrics(&self, metrics: &mut RunMetrics) {
        metrics.rows_transformed += self.accepted.len() as u64;
        for rejection in &self.rejected {
            metrics.record_rejection(rejection.reason.as_str());
        }
    }
}

/// 원천 레코드 하나를 변환합니다.
pub fn transform_record(
    mapper: &ExpressionMapper,
    record: &RawRecord,
) -> Result<NormalizedRecord, Rejection> {
    let reject = |reason: RejectReason, detail: String| Rejection {
        record: record.clone(),
        reason,
        detail,
    };

    let mapping = mapper
        .map(&record.expression)
        .map_err(|e| reject(RejectReason::InvalidPlaceholder, e.to_string()))?;

    let value = match record.value {
        Some(v) if v.is_finite() => v,
        other => {
            return Err(reject(
                RejectReason::NonNumericValue,
                format!("value {:?} is not numeric", other),
            ))
        }
    };
    if value <= 0.0 {
        return Err(reject(
            RejectReason::NonPositiveValue,
            format!("value {} must be positive", value),
        ));
    }

    let scaled = value * mapping.reference_rate.value_multiplier();
    if !scaled.is_finite() || scaled <= 0.0 {
        return Err(reject(
            RejectReason::NonFiniteValue,
            format!(
                "value {} scaled for {} is out of range: {}",
                value, mapping.reference_rate, scaled
            ),
        ));
    }

    Ok(NormalizedRecord {
        key: mapping.natural_key(record.date),
        value: scaled,
        expression: record.expression.clone(),
        provenance: record.provenance(),
    })
}

/// 원천 레코드 목록을 변환합니다.
///
/// 거부된 레코드는 원천 레코드와 사유 코드로 추적할 수 있습니다.
pub fn transform(mapper: &ExpressionMapper, records: &[RawRecord]) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();
    for record in records {
        match transform_record(mapper, record) {
            Ok(candidate) => outcome.accepted.push(candidate),
            Err(rejection) => {
                warn!(
                    raw_data_id = record.id,
                    expression = %record.expression,
                    date = %record.date,
                    version = record.version,
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "레코드 거부"
                );
                outcome.rejected.push(rejection);
            }
        }
    }
    debug!(
        accepted = outcome.accepted.len(),
        rejected = outcome.rejected.len(),
        "변환 완료"
    );
    outcome
}
