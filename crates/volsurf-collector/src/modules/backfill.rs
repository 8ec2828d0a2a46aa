//! 재개 가능한 과거 데이터 백필 모듈.
//!
//! 과거 범위를 고정 크기 청크로 나누고 청크마다 추출 → 변환 → upsert를
//! 실행합니다. 청크 상태는 저장소에 남으므로 프로세스가 중단되어도 같은
//! 실행 키로 다시 호출하면 완료된 청크를 건너뛰고 이어서 진행합니다.
//!
//! # 사용 예
//!
//! ```rust,ignore
//! let summary = tracker
//!     .run(IngestionMode::Historical, start, end, 30, &cancel, |chunk| async move {
//!         pipeline.run_window(&expressions, chunk.start_date, chunk.end_date, mode).await
//!     })
//!     .await?;
//! ```

use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use volsurf_core::{
    plan_chunks, progress_percent, run_key, BackfillChunk, ChunkStatus, CoreError, IngestionMode,
};
use volsurf_data::ChunkStore;

use crate::error::CollectorError;
use crate::metrics::RunMetrics;
use crate::modules::extract::FetchFailure;
use crate::modules::pipeline::WindowReport;
use crate::Result;

/// 실패 상세에 포함할 최대 표현식 수
const MAX_FAILURES_IN_DETAIL: usize = 3;

/// 백필 실행 결과.
#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub run_key: String,
    pub chunks_total: u64,
    pub chunks_completed: u64,
    pub chunks_failed: u64,
    /// 이전 실행에서 이미 완료되어 건너뛴 청크 수
    pub chunks_skipped: u64,
    pub progress_percent: f64,
    /// 취소로 중단됨
    pub cancelled: bool,
    pub metrics: RunMetrics,
    pub failures: Vec<FetchFailure>,
    /// 청크 실행을 중단시킨 에러
    pub fatal: Option<CollectorError>,
}

impl BackfillSummary {
    fn finish(&mut self, chunks: &[BackfillChunk]) {
        let count = |status: ChunkStatus| chunks.iter().filter(|c| c.status == status).count() as u64;
        self.chunks_total = chunks.len() as u64;
        self.chunks_completed = count(ChunkStatus::Completed);
        self.chunks_failed = count(ChunkStatus::Failed);
        self.progress_percent = progress_percent(chunks);
    }
}

fn failure_detail(failures: &[FetchFailure]) -> String {
    let listed: Vec<String> = failures
        .iter()
        .take(MAX_FAILURES_IN_DETAIL)
        .map(|f| format!("{}: {}", f.expression, f.error))
        .collect();
    let more = failures.len().saturating_sub(MAX_FAILURES_IN_DETAIL);
    if more > 0 {
        format!("{} fetch failure(s): {} (+{} more)", failures.len(), listed.join("; "), more)
    } else {
        format!("{} fetch failure(s): {}", failures.len(), listed.join("; "))
    }
}

/// 백필 청크 추적기.
#[derive(Clone)]
pub struct BackfillTracker {
    store: Arc<dyn ChunkStore>,
}

impl BackfillTracker {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// 실행 키의 계획을 불러오거나, 없으면 새로 만들어 저장합니다.
    #[instrument(skip(self))]
    pub async fn plan(
        &self,
        run_key: &str,
        start: NaiveDate,
        end: NaiveDate,
        chunk_days: u32,
    ) -> Result<Vec<BackfillChunk>> {
        let existing = self.store.load(run_key).await?;
        if !existing.is_empty() {
            info!(chunks = existing.len(), "기존 백필 계획을 이어받습니다");
            return Ok(existing);
        }

        let plan = plan_chunks(run_key, start, end, chunk_days)?;
        self.store.insert_plan(&plan).await?;
        info!(chunks = plan.len(), "백필 계획 생성");

        // 동시에 계획한 다른 프로세스가 있으면 먼저 저장된 계획을 따름
        Ok(self.store.load(run_key).await?)
    }

    /// 실행 키의 모든 청크 상태.
    pub async fn status(&self, run_key: &str) -> Result<Vec<BackfillChunk>> {
        Ok(self.store.load(run_key).await?)
    }

    /// 백필을 실행합니다.
    ///
    /// 청크는 순서대로 하나씩 실행되며, 상태는 `run_chunk`가 반환된 뒤에만
    /// 바뀝니다. fetch 실패가 남은 청크는 `failed`로 기록되어 다음 호출에서
    /// 다시 시도됩니다. 취소되면 실행 중이던 청크는 `in_progress`로 남습니다.
    #[instrument(skip(self, cancel, run_chunk))]
    pub async fn run<F, Fut>(
        &self,
        mode: IngestionMode,
        start: NaiveDate,
        end: NaiveDate,
        chunk_days: u32,
        cancel: &CancellationToken,
        mut run_chunk: F,
    ) -> Result<BackfillSummary>
    where
        F: FnMut(BackfillChunk) -> Fut,
        Fut: Future<Output = Result<WindowReport>>,
    {
        if start > end {
            return Err(CoreError::InvalidDateRange { start, end }.into());
        }
        let key = run_key(mode, start, end, chunk_days);
        let mut chunks = self.plan(&key, start, end, chunk_days).await?;

        let mut summary = BackfillSummary {
            run_key: key.clone(),
            chunks_skipped: chunks.iter().filter(|c| !c.status.is_runnable()).count() as u64,
            ..Default::default()
        };
        if summary.chunks_skipped > 0 {
            info!(skipped = summary.chunks_skipped, "완료된 청크를 건너뜁니다");
        }

        for i in 0..chunks.len() {
            if !chunks[i].status.is_runnable() {
                continue;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let chunk = &mut chunks[i];
            chunk.begin_attempt(Utc::now())?;
            self.store.save(chunk).await?;
            info!(
                chunk = chunk.chunk_index,
                start = %chunk.start_date,
                end = %chunk.end_date,
                attempt = chunk.attempts,
                "청크 시작"
            );

            let result = tokio::select! {
                biased;
                result = run_chunk(chunk.clone()) => Some(result),
                _ = cancel.cancelled() => None,
            };

            match result {
                None => {
                    warn!(chunk = chunk.chunk_index, "청크 실행 중 취소됨, in_progress로 남깁니다");
                    summary.cancelled = true;
                    break;
                }
                Some(Ok(report)) => {
                    if report.failures.is_empty() {
                        chunk.complete()?;
                    } else {
                        chunk.fail(failure_detail(&report.failures))?;
                    }
                    self.store.save(chunk).await?;
                    summary.metrics.merge(&report.metrics);
                    summary.failures.extend(report.failures);
                }
                Some(Err(err)) => {
                    chunk.fail(err.to_string())?;
                    if let Err(save_err) = self.store.save(chunk).await {
                        warn!(chunk = chunk.chunk_index, error = %save_err, "청크 실패 상태 저장 실패");
                    }
                    summary.fatal = Some(err);
                    break;
                }
            }

            let status = chunks[i].status;
            info!(
                run_key = %key,
                chunk = i,
                %status,
                progress = format!("{:.1}%", progress_percent(&chunks)),
                "청크 종료"
            );
        }

        summary.finish(&chunks);
        info!(
            run_key = %key,
            completed = summary.chunks_completed,
            failed = summary.chunks_failed,
            total = summary.chunks_total,
            progress = format!("{:.1}%", summary.progress_percent),
            cancelled = summary.cancelled,
            "백필 종료"
        );
        Ok(summary)
    }
}
