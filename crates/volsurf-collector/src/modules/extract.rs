//! 원천 데이터 추출 모듈.
//!
//! 표현식 × 영업일 윈도우에 대해:
//! 1. 가져올 날짜 결정 (default 모드는 이미 버전이 있는 키를 건너뜀)
//! 2. 재시도 정책에 따라 fetch
//! 3. 원본 응답을 blob으로 저장
//! 4. 행마다 원장에 원천 레코드 추가 (버전은 원장이 부여)
//!
//! 표현식은 `max_concurrency`개씩 동시에 처리합니다.

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn, Instrument};
use volsurf_core::{calendar, ingest_span, IngestionMode, NewRawRecord, RawRecord};
use volsurf_data::{BlobPayload, BlobStore, RawLedger};

use crate::metrics::RunMetrics;
use crate::retry::{RetryPolicy, RetryStep};
use crate::source::{FetchError, MarketDataSource};
use crate::Result;

/// 재시도 후에도 실패한 fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub expression: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub error: String,
}

/// 추출 결과.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    /// 이번 실행에서 원장에 추가된 레코드
    pub records: Vec<RawRecord>,
    pub failures: Vec<FetchFailure>,
    pub metrics: RunMetrics,
}

impl ExtractOutcome {
    fn absorb(&mut self, other: ExtractOutcome) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
        self.metrics.merge(&other.metrics);
    }
}

/// 추출 코디네이터.
#[derive(Clone)]
pub struct Extractor {
    source: Arc<dyn MarketDataSource>,
    ledger: Arc<dyn RawLedger>,
    blobs: Arc<dyn BlobStore>,
    retry: RetryPolicy,
    max_concurrency: usize,
}

impl Extractor {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        ledger: Arc<dyn RawLedger>,
        blobs: Arc<dyn BlobStore>,
        retry: RetryPolicy,
        max_concurrency: usize,
    ) -> Self {
        Self {
            source,
            ledger,
            blobs,
            retry,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 표현식 목록을 [start, end] 윈도우에 대해 추출합니다.
    ///
    /// 개별 표현식의 fetch 실패는 `failures`에 기록되고 다른 표현식은 계속
    /// 처리됩니다. 원장/blob 저장소 에러는 즉시 반환됩니다.
    #[instrument(skip(self, expressions), fields(expressions = expressions.len(), %start, %end, %mode))]
    pub async fn extract(
        &self,
        expressions: &[String],
        start: NaiveDate,
        end: NaiveDate,
        mode: IngestionMode,
    ) -> Result<ExtractOutcome> {
        let started = Instant::now();

        let partials: Vec<ExtractOutcome> = stream::iter(expressions)
            .map(|expression| {
                self.extract_expression(expression, start, end, mode)
                    .instrument(ingest_span!("extract_expression", expression))
            })
            .buffer_unordered(self.max_concurrency)
            .try_collect()
            .await?;

        let mut outcome = ExtractOutcome::default();
        for partial in partials {
            outcome.absorb(partial);
        }
        outcome.metrics.elapsed = started.elapsed();

        info!(
            processed = outcome.metrics.expressions_processed,
            skipped = outcome.metrics.expressions_skipped,
            appended = outcome.metrics.raw_appended,
            failures = outcome.failures.len(),
            "추출 완료"
        );
        Ok(outcome)
    }

    /// 아직 가져오지 않은 영업일.
    ///
    /// `committed`는 이번 실행에서 이미 원장에 추가된 날짜입니다.
    async fn pending_dates(
        &self,
        expression: &str,
        business_days: &[NaiveDate],
        mode: IngestionMode,
        committed: &BTreeSet<NaiveDate>,
    ) -> Result<BTreeSet<NaiveDate>> {
        let (Some(&first), Some(&last)) = (business_days.first(), business_days.last()) else {
            return Ok(BTreeSet::new());
        };
        let versioned = if mode.skips_versioned_keys() {
            self.ledger.versioned_dates(expression, first, last).await?
        } else {
            BTreeSet::new()
        };
        Ok(business_days
            .iter()
            .copied()
            .filter(|d| !versioned.contains(d) && !committed.contains(d))
            .collect())
    }

    async fn extract_expression(
        &self,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
        mode: IngestionMode,
    ) -> Result<ExtractOutcome> {
        let mut outcome = ExtractOutcome::default();
        let business_days = calendar::business_days(start, end);
        let mut committed = BTreeSet::new();
        let mut attempt = 0;
        let mut fetched_any = false;

        loop {
            // 시도마다 원장을 다시 확인해 같은 키를 두 번 버전하지 않음
            let pending = self
                .pending_dates(expression, &business_days, mode, &committed)
                .await?;
            let (Some(&fetch_start), Some(&fetch_end)) = (pending.first(), pending.last()) else {
                if !fetched_any {
                    debug!("가져올 날짜 없음, 건너뜀");
                    outcome.metrics.expressions_skipped += 1;
                }
                break;
            };
            if !fetched_any {
                outcome.metrics.expressions_processed += 1;
                fetched_any = true;
            }

            let fetch_timestamp = Utc::now();
            match self.source.fetch(expression, fetch_start, fetch_end).await {
                Ok(rows) => {
                    outcome.metrics.rows_fetched += rows.len() as u64;
                    if rows.is_empty() {
                        debug!(%fetch_start, %fetch_end, "빈 응답");
                        outcome.metrics.empty_responses += 1;
                        break;
                    }

                    let payload = BlobPayload {
                        expression: expression.to_string(),
                        start_date: fetch_start,
                        end_date: fetch_end,
                        fetch_timestamp,
                        data: rows,
                    };
                    let uri = self.blobs.put(&payload).await?;

                    for row in &payload.data {
                        if row.date < start || row.date > end {
                            warn!(date = %row.date, "요청 범위 밖의 행, 무시합니다");
                            outcome.metrics.rows_out_of_window += 1;
                            continue;
                        }
                        if !pending.contains(&row.date) || committed.contains(&row.date) {
                            debug!(date = %row.date, "이미 버전이 있는 날짜, 무시합니다");
                            continue;
                        }

                        let appended = self
                            .ledger
                            .append(NewRawRecord {
                                expression: expression.to_string(),
                                date: row.date,
                                value: row.value,
                                fetch_timestamp,
                                ingestion_mode: mode,
                                source_file_uri: uri.clone(),
                            })
                            .await?;
                        if appended.duplicate_fetch {
                            outcome.metrics.duplicate_fetches += 1;
                        }
                        outcome.metrics.raw_appended += 1;
                        committed.insert(row.date);
                        outcome.records.push(appended.record);
                    }
                    break;
                }
                Err(err) => {
                    let transient = err.is_transient();
                    match self.retry.on_failure(attempt, err) {
                        RetryStep::Retry(delay) => {
                            warn!(attempt = attempt + 1, transient, ?delay, "fetch 실패, 재시도합니다");
                            outcome.metrics.fetch_retries += 1;
                            attempt += 1;
                            tokio::time::sleep(delay).await;
                        }
                        RetryStep::GiveUp(err) => {
                            self.record_failure(&mut outcome, expression, fetch_start, fetch_end, err);
                            break;
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    fn record_failure(
        &self,
        outcome: &mut ExtractOutcome,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
        err: FetchError,
    ) {
        warn!(source = self.source.name(), error = %err, "fetch 최종 실패, 표현식을 건너뜁니다");
        outcome.metrics.fetch_errors += 1;
        outcome.failures.push(FetchFailure {
            expression: expression.to_string(),
            start_date: start,
            end_date: end,
            error: err.to_string(),
        });
    }
}
