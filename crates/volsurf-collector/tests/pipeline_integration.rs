//! 인메모리 저장소와 mock 소스로 전체 파이프라인을 검증합니다.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use volsurf_collector::{
    CollectorConfig, MockFault, MockMarketData, Pipeline, RunReport, RunRequest, Stores,
};
use volsurf_core::{map_expression, IngestionMode, LedgerKey};

const USDD_5Y: &str = "DB(COV,VOLSWAPTION,USDD,5y,1y,PAYER,VOLBPVOL)";
const EUR_2Y: &str = "DB(COV,VOLSWAPTION,EUR,2y,1y,PAYER,VOLBPVOL)";
const GBP_SONIA: &str = "DB(COV,VOLSWAPTION,GBP,SONIA,2y,1y,PAYER,VOLBPVOL)";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config() -> CollectorConfig {
    let mut config = CollectorConfig::default();
    config.extract.base_delay_ms = 1;
    config.extract.max_delay_ms = 2;
    config
}

struct Harness {
    source: Arc<MockMarketData>,
    pipeline: Pipeline,
}

impl Harness {
    fn new(config: CollectorConfig) -> Self {
        let source = Arc::new(MockMarketData::new(config.mock_seed));
        let pipeline = Pipeline::new(Stores::in_memory(), source.clone(), &config);
        Self { source, pipeline }
    }

    async fn run(&self, mode: IngestionMode, start: NaiveDate, end: NaiveDate, expressions: &[&str]) -> RunReport {
        let request = RunRequest::new(mode, start, end)
            .with_expressions(expressions.iter().map(|e| e.to_string()).collect());
        self.pipeline.run(request, &CancellationToken::new()).await
    }
}

#[tokio::test]
async fn test_sofr_row_lands_scaled_in_clean_store() {
    let h = Harness::new(config());
    let day = date(2025, 9, 1);
    h.source.set_value(USDD_5Y, day, Some(100.0)).await;

    let report = h.run(IngestionMode::Default, day, day, &[USDD_5Y]).await;
    assert!(report.success(), "{:?}", report);
    assert_eq!(report.metrics.raw_appended, 1);
    assert_eq!(report.metrics.records_inserted, 1);

    let key = map_expression(USDD_5Y).unwrap().natural_key(day);
    let stored = h.pipeline.stores().clean.get(&key).await.unwrap().unwrap();
    assert!((stored.value - 1587.45).abs() < 0.01);
    assert_eq!(stored.provenance.version, 1);
    assert_eq!(stored.expression, USDD_5Y);

    let ledger = h.pipeline.stores().ledger.history(&LedgerKey::new(USDD_5Y, day)).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].value, Some(100.0));
    assert!(ledger[0].source_file_uri.starts_with("blob://market-data/"));
}

#[tokio::test]
async fn test_default_rerun_fetches_nothing() {
    let h = Harness::new(config());
    let (start, end) = (date(2025, 9, 1), date(2025, 9, 5));

    let first = h.run(IngestionMode::Default, start, end, &[EUR_2Y, GBP_SONIA]).await;
    assert_eq!(first.metrics.records_inserted, 10);
    let calls = h.source.call_count();

    let second = h.run(IngestionMode::Default, start, end, &[EUR_2Y, GBP_SONIA]).await;
    assert!(second.success());
    assert_eq!(h.source.call_count(), calls);
    assert_eq!(second.metrics.expressions_skipped, 2);
    assert_eq!(second.metrics.raw_appended, 0);
    assert_eq!(second.metrics.records_written(), 0);
    assert_eq!(second.metrics.duplicates_discarded, 10);
    assert_eq!(h.pipeline.stores().clean.records().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_refetch_versions_and_updates_single_row() {
    let h = Harness::new(config());
    let day = date(2025, 9, 2);
    h.source.set_value(EUR_2Y, day, Some(81.0)).await;
    h.run(IngestionMode::Default, day, day, &[EUR_2Y]).await;

    h.source.set_value(EUR_2Y, day, Some(83.5)).await;
    let report = h.run(IngestionMode::OldCodes, day, day, &[EUR_2Y]).await;
    assert!(report.success());
    assert_eq!(report.metrics.duplicate_fetches, 1);
    assert_eq!(report.metrics.records_updated, 1);

    let history = h.pipeline.stores().ledger.history(&LedgerKey::new(EUR_2Y, day)).await.unwrap();
    let versions: Vec<i32> = history.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2]);

    let rows = h.pipeline.stores().clean.records().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, 83.5);
    assert_eq!(rows[0].provenance.version, 2);
    assert_eq!(rows[0].provenance.raw_data_id, history[1].id);

    let integrity = h.pipeline.verify().await.unwrap();
    assert!(integrity.is_clean());
    assert_eq!(integrity.clean_rows, 1);
}

#[tokio::test]
async fn test_bad_values_are_rejected_and_counted() {
    let h = Harness::new(config());
    let (start, end) = (date(2025, 9, 1), date(2025, 9, 3));
    h.source.set_value(EUR_2Y, date(2025, 9, 1), None).await;
    h.source.set_value(EUR_2Y, date(2025, 9, 2), Some(0.0)).await;

    let report = h.run(IngestionMode::Default, start, end, &[EUR_2Y]).await;
    assert!(report.success());
    assert_eq!(report.metrics.raw_appended, 3);
    assert_eq!(report.metrics.rows_rejected, 2);
    assert_eq!(report.metrics.rejections["non_numeric_value"], 1);
    assert_eq!(report.metrics.rejections["non_positive_value"], 1);
    assert_eq!(report.metrics.records_inserted, 1);
}

#[tokio::test]
async fn test_scaled_overflow_is_rejected_without_aborting_window() {
    let h = Harness::new(config());
    h.source.set_value(USDD_5Y, date(2025, 9, 1), Some(1e308)).await;
    h.source.set_value(USDD_5Y, date(2025, 9, 2), Some(100.0)).await;

    let report = h.run(IngestionMode::Default, date(2025, 9, 1), date(2025, 9, 2), &[USDD_5Y]).await;
    assert!(report.success(), "{:?}", report);
    assert!(report.error.is_none());
    assert_eq!(report.metrics.rejections["non_finite_value"], 1);
    assert_eq!(report.metrics.records_inserted, 1);

    let key = map_expression(USDD_5Y).unwrap().natural_key(date(2025, 9, 2));
    let stored = h.pipeline.stores().clean.get(&key).await.unwrap().unwrap();
    assert!((stored.value - 1587.45).abs() < 0.01);
}

#[tokio::test]
async fn test_unknown_code_is_rejected_after_ledger_append() {
    let h = Harness::new(config());
    let day = date(2025, 9, 1);
    let bogus = "DB(COV,VOLSWAPTION,JPY,2y,1y,PAYER,VOLBPVOL)";

    let report = h.run(IngestionMode::Default, day, day, &[bogus, EUR_2Y]).await;
    assert_eq!(report.metrics.raw_appended, 2);
    assert_eq!(report.metrics.rejections["invalid_placeholder"], 1);
    assert_eq!(report.metrics.records_inserted, 1);
}

#[tokio::test]
async fn test_persistent_failure_is_isolated() {
    let h = Harness::new(config());
    let (start, end) = (date(2025, 9, 1), date(2025, 9, 5));
    h.source.inject(GBP_SONIA, MockFault::Persistent).await;

    let report = h.run(IngestionMode::Default, start, end, &[GBP_SONIA, EUR_2Y]).await;
    assert!(!report.success());
    assert!(report.error.is_none());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].expression, GBP_SONIA);
    assert_eq!(report.metrics.fetch_errors, 1);
    assert_eq!(report.metrics.records_inserted, 5);
}

#[tokio::test]
async fn test_transient_failure_recovers_with_retries() {
    let h = Harness::new(config());
    let day = date(2025, 9, 3);
    h.source.inject(EUR_2Y, MockFault::Transient(2)).await;

    let report = h.run(IngestionMode::Default, day, day, &[EUR_2Y]).await;
    assert!(report.success());
    assert_eq!(report.metrics.fetch_retries, 2);
    assert_eq!(h.source.calls_for(EUR_2Y).await, 3);
    assert_eq!(report.metrics.records_inserted, 1);
}

#[tokio::test]
async fn test_empty_response_writes_nothing() {
    let h = Harness::new(config());
    let day = date(2025, 9, 3);
    h.source.inject(EUR_2Y, MockFault::Empty).await;

    let report = h.run(IngestionMode::Default, day, day, &[EUR_2Y]).await;
    assert!(report.success());
    assert_eq!(report.metrics.empty_responses, 1);
    assert_eq!(report.metrics.raw_appended, 0);
    assert!(h.pipeline.stores().clean.records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_historical_backfill_resumes_failed_chunks() {
    let mut config = config();
    config.backfill.chunk_days = 30;
    let h = Harness::new(config);
    let (start, end) = (date(2024, 1, 1), date(2024, 3, 29));
    h.source.inject(EUR_2Y, MockFault::Persistent).await;

    let first = h.run(IngestionMode::Historical, start, end, &[EUR_2Y]).await;
    assert!(!first.success());
    assert_eq!(first.metrics.chunks_total, 3);
    assert_eq!(first.metrics.chunks_failed, 3);
    assert_eq!(first.metrics.backfill_progress_percent, Some(0.0));
    assert_eq!(first.run_key.as_deref(), Some("historical:2024-01-01:2024-03-29:30"));

    h.source.heal(EUR_2Y).await;
    let second = h.run(IngestionMode::Historical, start, end, &[EUR_2Y]).await;
    assert!(second.success(), "{:?}", second);
    assert_eq!(second.metrics.chunks_completed, 3);
    assert_eq!(second.metrics.backfill_progress_percent, Some(100.0));
    // 2024년 1~3월 영업일 65일
    assert_eq!(second.metrics.records_inserted, 65);

    let calls = h.source.call_count();
    let third = h.run(IngestionMode::Historical, start, end, &[EUR_2Y]).await;
    assert!(third.success());
    assert_eq!(h.source.call_count(), calls);
    assert_eq!(third.metrics.chunks_completed, 3);

    let request = RunRequest::new(IngestionMode::Historical, start, end);
    let chunks = h.pipeline.backfill_status(&request).await.unwrap();
    assert!(chunks.iter().all(|c| c.attempts == 2));
}

#[tokio::test]
async fn test_cancelled_run_reports_cancelled() {
    let h = Harness::new(config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = RunRequest::new(IngestionMode::Default, date(2025, 9, 1), date(2025, 9, 5))
        .with_expressions(vec![EUR_2Y.to_string()]);
    let report = h.pipeline.run(request, &cancel).await;
    assert!(report.cancelled);
    assert!(!report.success());
}

#[tokio::test]
async fn test_report_serializes_for_cli() {
    let h = Harness::new(config());
    let day = date(2025, 9, 1);
    let report = h.run(IngestionMode::Default, day, day, &[EUR_2Y]).await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["mode"], "default");
    assert_eq!(json["metrics"]["records_inserted"], 1);
    assert!(json["error"].is_null());
}
