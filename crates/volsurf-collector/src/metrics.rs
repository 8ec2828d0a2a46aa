//! 실행 통계.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

/// 실행 단위 통계.
///
/// 동시에 실행되는 작업은 각자 부분 통계를 만들고 [`RunMetrics::merge`]로 합칩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    /// fetch를 시도한 표현식 수
    pub expressions_processed: u64,
    /// 가져올 키가 없어 건너뛴 표현식 수
    pub expressions_skipped: u64,
    /// 소스가 돌려준 행 수
    pub rows_fetched: u64,
    /// 원장에 추가된 원천 레코드 수
    pub raw_appended: u64,
    /// 이미 버전이 있던 키를 다시 가져온 수
    pub duplicate_fetches: u64,
    /// 빈 응답 수
    pub empty_responses: u64,
    /// 재시도 후에도 실패한 fetch 수
    pub fetch_errors: u64,
    /// 일시적 에러로 인한 재시도 수
    pub fetch_retries: u64,
    /// 요청 범위 밖이라 버린 행 수
    pub rows_out_of_window: u64,
    pub rows_transformed: u64,
    pub rows_rejected: u64,
    /// 거부 사유 코드별 건수
    pub rejections: BTreeMap<String, u64>,
    pub records_inserted: u64,
    pub records_updated: u64,
    pub duplicates_discarded: u64,
    pub conflicts: u64,
    pub chunks_total: u64,
    pub chunks_completed: u64,
    pub chunks_failed: u64,
    pub backfill_progress_percent: Option<f64>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 거부 사유를 기록합니다.
    pub fn record_rejection(&mut self, reason: &str) {
        self.rows_rejected += 1;
        *self.rejections.entry(reason.to_string()).or_default() += 1;
    }

    /// 정규화 저장소에 쓰인 레코드 수.
    pub fn records_written(&self) -> u64 {
        self.records_inserted + self.records_updated
    }

    /// 부분 통계를 합칩니다.
    ///
    /// 청크 통계와 진행률은 백필 추적기가 직접 설정하므로 더하지 않습니다.
    pub fn merge(&mut self, other: &RunMetrics) {
        self.expressions_processed += other.expressions_processed;
        self.expressions_skipped += other.expressions_skipped;
        self.rows_fetched += other.rows_fetched;
        self.raw_appended += other.raw_appended;
        self.duplicate_fetches += other.duplicate_fetches;
        self.empty_responses += other.empty_responses;
        self.fetch_errors += other.fetch_errors;
        self.fetch_retries += other.fetch_retries;
        self.rows_out_of_window += other.rows_out_of_window;
        self.rows_transformed += other.rows_transformed;
        self.rows_rejected += other.rows_rejected;
        for (reason, count) in &other.rejections {
            *self.rejections.entry(reason.clone()).or_default() += count;
        }
        self.records_inserted += other.records_inserted;
        self.records_updated += other.records_updated;
        self.duplicates_discarded += other.duplicates_discarded;
        self.conflicts += other.conflicts;
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, run_id: &str) {
        tracing::info!(
            run_id,
            expressions_processed = self.expressions_processed,
            expressions_skipped = self.expressions_skipped,
            rows_fetched = self.rows_fetched,
            raw_appended = self.raw_appended,
            duplicate_fetches = self.duplicate_fetches,
            empty_responses = self.empty_responses,
            fetch_errors = self.fetch_errors,
            rows_transformed = self.rows_transformed,
            rows_rejected = self.rows_rejected,
            records_inserted = self.records_inserted,
            records_updated = self.records_updated,
            duplicates_discarded = self.duplicates_discarded,
            conflicts = self.conflicts,
            chunks = format!("{}/{}", self.chunks_completed, self.chunks_total),
            chunks_failed = self.chunks_failed,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "실행 완료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counts_and_rejections() {
        let mut total = RunMetrics::new();
        total.chunks_total = 3;

        let mut a = RunMetrics::new();
        a.rows_fetched = 10;
        a.record_rejection("non_numeric_value");
        a.records_inserted = 4;

        let mut b = RunMetrics::new();
        b.rows_fetched = 5;
        b.record_rejection("non_numeric_value");
        b.record_rejection("invalid_placeholder");
        b.records_updated = 2;
        b.conflicts = 1;

        total.merge(&a);
        total.merge(&b);

        assert_eq!(total.rows_fetched, 15);
        assert_eq!(total.rows_rejected, 3);
        assert_eq!(total.rejections["non_numeric_value"], 2);
        assert_eq!(total.rejections["invalid_placeholder"], 1);
        assert_eq!(total.records_written(), 6);
        assert_eq!(total.conflicts, 1);
        assert_eq!(total.chunks_total, 3);
    }

    #[test]
    fn test_serializes_elapsed_as_seconds() {
        let metrics = RunMetrics {
            elapsed: Duration::from_millis(1_500),
            ..Default::default()
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["elapsed"], 1.5);
        assert!(json["backfill_progress_percent"].is_null());
    }
}
