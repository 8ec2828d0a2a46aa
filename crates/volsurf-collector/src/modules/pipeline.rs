//! 추출 → 변환 → upsert 오케스트레이션.
//!
//! - default / old_codes: 요청 윈도우 전체를 한 번에 처리
//! - historical: [`BackfillTracker`]로 청크 단위 처리 (재개 가능)
//!
//! 변환 입력은 이번 실행에서 추가된 레코드가 아니라 윈도우 안의 모든 키에
//! 대한 원장의 최신 버전입니다. 이전 실행에서 원장에만 남고 반영되지 못한
//! 레코드도 다음 실행에서 정규화 저장소에 반영됩니다.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use volsurf_core::{BackfillChunk, CoreError, ExpressionMapper, IngestionMode};
use volsurf_data::{
    integrity_report, BlobStore, ChunkStore, CleanStore, Database, IntegrityReport,
    MemoryBlobStore, MemoryChunkStore, MemoryCleanStore, MemoryRawLedger, PgChunkStore,
    PgCleanStore, PgRawLedger, RawLedger,
};

use crate::config::CollectorConfig;
use crate::metrics::RunMetrics;
use crate::modules::backfill::BackfillTracker;
use crate::modules::extract::{Extractor, FetchFailure};
use crate::modules::transform::transform;
use crate::modules::upsert;
use crate::source::MarketDataSource;
use crate::Result;

/// 파이프라인이 사용하는 저장소 묶음.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn RawLedger>,
    pub clean: Arc<dyn CleanStore>,
    pub chunks: Arc<dyn ChunkStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Stores {
    /// 인메모리 저장소 (테스트, DB 없는 로컬 실행용)
    pub fn in_memory() -> Self {
        Self {
            ledger: Arc::new(MemoryRawLedger::new()),
            clean: Arc::new(MemoryCleanStore::new()),
            chunks: Arc::new(MemoryChunkStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
        }
    }

    /// PostgreSQL 저장소
    pub fn postgres(db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            ledger: Arc::new(PgRawLedger::new(db.clone())),
            clean: Arc::new(PgCleanStore::new(db.clone())),
            chunks: Arc::new(PgChunkStore::new(db)),
            blobs,
        }
    }
}

/// 실행 요청.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: IngestionMode,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// 지정하지 않으면 모드의 기본 표현식 집합
    pub expressions: Option<Vec<String>>,
}

impl RunRequest {
    pub fn new(mode: IngestionMode, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            mode,
            start,
            end,
            expressions: None,
        }
    }

    pub fn with_expressions(mut self, expressions: Vec<String>) -> Self {
        self.expressions = Some(expressions);
        self
    }
}

/// 윈도우 하나의 처리 결과.
#[derive(Debug, Default)]
pub struct WindowReport {
    pub metrics: RunMetrics,
    pub failures: Vec<FetchFailure>,
}

/// 실행 결과.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub mode: IngestionMode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: RunMetrics,
    pub failures: Vec<FetchFailure>,
    /// historical 모드의 백필 계획 식별자
    pub run_key: Option<String>,
    pub cancelled: bool,
    /// 실행을 중단시킨 에러
    pub error: Option<String>,
}

impl RunReport {
    fn new(request: &RunRequest) -> Self {
        Self {
            run_id: format!(
                "{}_{}_{}_{}",
                request.mode,
                request.start,
                request.end,
                Utc::now().timestamp()
            ),
            mode: request.mode,
            start_date: request.start,
            end_date: request.end,
            metrics: RunMetrics::new(),
            failures: Vec::new(),
            run_key: None,
            cancelled: false,
            error: None,
        }
    }

    /// 에러/취소/fetch 실패 없이 끝났는지 여부.
    pub fn success(&self) -> bool {
        self.error.is_none() && !self.cancelled && self.failures.is_empty()
    }
}

/// ETL 파이프라인.
pub struct Pipeline {
    stores: Stores,
    extractor: Extractor,
    tracker: BackfillTracker,
    mapper: &'static ExpressionMapper,
    chunk_days: u32,
}

impl Pipeline {
    pub fn new(stores: Stores, source: Arc<dyn MarketDataSource>, config: &CollectorConfig) -> Self {
        let extractor = Extractor::new(
            source,
            stores.ledger.clone(),
            stores.blobs.clone(),
            config.extract.retry_policy(),
            config.extract.max_concurrency,
        );
        let tracker = BackfillTracker::new(stores.chunks.clone());
        Self {
            stores,
            extractor,
            tracker,
            mapper: ExpressionMapper::standard(),
            chunk_days: config.backfill.chunk_days,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// 요청을 실행합니다.
    ///
    /// 실행을 중단시킨 에러도 보고서에 담아 반환하므로, 그때까지의 통계는
    /// 항상 남습니다.
    #[instrument(skip(self, cancel), fields(mode = %request.mode, start = %request.start, end = %request.end))]
    pub async fn run(&self, request: RunRequest, cancel: &CancellationToken) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(&request);
        info!(run_id = %report.run_id, "실행 시작");

        if let Err(e) = self.execute(&request, cancel, &mut report).await {
            error!(run_id = %report.run_id, error = %e, "실행 중단");
            report.error = Some(e.to_string());
        }
        if report.cancelled {
            warn!(run_id = %report.run_id, "실행 취소됨");
        }

        report.metrics.elapsed = started.elapsed();
        report.metrics.log_summary(&report.run_id);
        report
    }

    async fn execute(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<()> {
        if request.start > request.end {
            return Err(CoreError::InvalidDateRange {
                start: request.start,
                end: request.end,
            }
            .into());
        }
        let expressions = self.resolve_expressions(request);
        info!(expressions = expressions.len(), "대상 표현식 확정");

        match request.mode {
            IngestionMode::Historical => self.run_backfill(request, &expressions, cancel, report).await,
            _ if cancel.is_cancelled() => {
                report.cancelled = true;
                Ok(())
            }
            mode => {
                let window = tokio::select! {
                    biased;
                    window = self.run_window(&expressions, request.start, request.end, mode) => window?,
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        return Ok(());
                    }
                };
                report.metrics.merge(&window.metrics);
                report.failures.extend(window.failures);
                Ok(())
            }
        }
    }

    async fn run_backfill(
        &self,
        request: &RunRequest,
        expressions: &[String],
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<()> {
        let mode = request.mode;
        let summary = self
            .tracker
            .run(mode, request.start, request.end, self.chunk_days, cancel, |chunk| async move {
                self.run_window(expressions, chunk.start_date, chunk.end_date, mode).await
            })
            .await?;

        report.run_key = Some(summary.run_key);
        report.metrics.merge(&summary.metrics);
        report.metrics.chunks_total = summary.chunks_total;
        report.metrics.chunks_completed = summary.chunks_completed;
        report.metrics.chunks_failed = summary.chunks_failed;
        report.metrics.backfill_progress_percent = Some(summary.progress_percent);
        report.failures.extend(summary.failures);
        report.cancelled = summary.cancelled;

        match summary.fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 윈도우 하나를 추출 → 변환 → upsert 합니다.
    pub async fn run_window(
        &self,
        expressions: &[String],
        start: NaiveDate,
        end: NaiveDate,
        mode: IngestionMode,
    ) -> Result<WindowReport> {
        let extracted = self.extractor.extract(expressions, start, end, mode).await?;
        let mut window = WindowReport {
            metrics: extracted.metrics,
            failures: extracted.failures,
        };

        let latest = self.stores.ledger.latest_records(expressions, start, end).await?;
        let transformed = transform(self.mapper, &latest);
        transformed.record_metrics(&mut window.metrics);

        let summary = upsert::resolve(self.stores.clean.as_ref(), &transformed.accepted).await?;
        summary.record_metrics(&mut window.metrics);

        info!(
            %start,
            %end,
            appended = window.metrics.raw_appended,
            candidates = transformed.accepted.len(),
            rejected = transformed.rejected.len(),
            written = summary.written(),
            "윈도우 처리 완료"
        );
        Ok(window)
    }

    /// 백필 청크 상태를 조회합니다.
    pub async fn backfill_status(&self, request: &RunRequest) -> Result<Vec<BackfillChunk>> {
        let key = volsurf_core::run_key(request.mode, request.start, request.end, self.chunk_days);
        self.tracker.status(&key).await
    }

    /// 원장과 정규화 저장소의 정합성을 검사합니다.
    pub async fn verify(&self) -> Result<IntegrityReport> {
        Ok(integrity_report(self.stores.ledger.as_ref(), self.stores.clean.as_ref()).await?)
    }

    /// 요청 표현식 (중복 제거, 순서 유지)
    fn resolve_expressions(&self, request: &RunRequest) -> Vec<String> {
        let requested = match &request.expressions {
            Some(list) => list.clone(),
            None => self.mapper.expressions_for_mode(request.mode),
        };
        let mut seen = HashSet::new();
        requested
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty() && seen.insert(e.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockMarketData;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn pipeline() -> Pipeline {
        let config = CollectorConfig::default();
        Pipeline::new(Stores::in_memory(), Arc::new(MockMarketData::new(7)), &config)
    }

    #[test]
    fn test_resolve_expressions_dedupes_in_order() {
        let pipeline = pipeline();
        let request = RunRequest::new(IngestionMode::Default, d(9, 1), d(9, 1)).with_expressions(vec![
            "B".to_string(),
            " A ".to_string(),
            "B".to_string(),
            String::new(),
        ]);
        assert_eq!(pipeline.resolve_expressions(&request), vec!["B", "A"]);
    }

    #[test]
    fn test_default_expressions_follow_mode() {
        let pipeline = pipeline();
        let request = RunRequest::new(IngestionMode::OldCodes, d(9, 1), d(9, 1));
        let mapper = ExpressionMapper::standard();
        assert_eq!(
            pipeline.resolve_expressions(&request),
            mapper.expressions_for_mode(IngestionMode::OldCodes)
        );
    }

    #[tokio::test]
    async fn test_inverted_range_reports_error() {
        let pipeline = pipeline();
        let report = pipeline
            .run(RunRequest::new(IngestionMode::Default, d(9, 2), d(9, 1)), &CancellationToken::new())
            .await;
        assert!(!report.success());
        assert!(report.error.unwrap().contains("Invalid request"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let pipeline = pipeline();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = RunRequest::new(IngestionMode::Historical, d(1, 1), d(3, 31))
            .with_expressions(vec!["DB(COV,VOLSWAPTION,EUR,2y,1y,PAYER,VOLBPVOL)".to_string()]);
        let report = pipeline.run(request, &cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.metrics.chunks_completed, 0);
        assert!(pipeline.stores().clean.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_id_and_success() {
        let pipeline = pipeline();
        let request = RunRequest::new(IngestionMode::Default, d(9, 1), d(9, 1))
            .with_expressions(vec!["DB(COV,VOLSWAPTION,EUR,2y,1y,PAYER,VOLBPVOL)".to_string()]);
        let report = pipeline.run(request, &CancellationToken::new()).await;

        assert!(report.run_id.starts_with("default_2025-09-01_2025-09-01_"));
        assert!(report.success());
        assert_eq!(report.metrics.records_inserted, 1);
        assert!(pipeline.verify().await.unwrap().is_clean());
    }
}
