//! 백필 청크와 상태 머신.
//!
//! # 상태 전이
//!
//! ```text
//! Pending ──> InProgress ──> Completed (종료)
//!                 │  ↑
//!                 ↓  │ (재시도)
//!               Failed
//! ```
//!
//! 취소된 청크는 InProgress로 남으며 다음 실행에서 다시 시도됩니다.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::types::IngestionMode;

/// 청크 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// 다음 실행에서 시도 대상인지 여부.
    pub fn is_runnable(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// 상태 전이 허용 여부.
    pub fn can_transition_to(&self, next: ChunkStatus) -> bool {
        use ChunkStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Failed, InProgress)
                // 중단된 청크 재시도
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown chunk status: {}", s)),
        }
    }
}

/// 백필 청크.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillChunk {
    /// 백필 계획 식별자
    pub run_key: String,
    /// 0부터 시작하는 청크 순번
    pub chunk_index: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ChunkStatus,
    /// 시도 횟수
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// 실패 시 에러 내용
    pub error_detail: Option<String>,
}

impl BackfillChunk {
    fn pending(run_key: &str, chunk_index: i32, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            run_key: run_key.to_string(),
            chunk_index,
            start_date,
            end_date,
            status: ChunkStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            error_detail: None,
        }
    }

    /// 시도 시작 (→ InProgress).
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition(ChunkStatus::InProgress)?;
        self.attempts += 1;
        self.last_attempt_at = Some(now);
        self.error_detail = None;
        Ok(())
    }

    /// 완료 처리 (→ Completed).
    pub fn complete(&mut self) -> CoreResult<()> {
        self.transition(ChunkStatus::Completed)
    }

    /// 실패 처리 (→ Failed).
    pub fn fail(&mut self, detail: impl Into<String>) -> CoreResult<()> {
        self.transition(ChunkStatus::Failed)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    fn transition(&mut self, next: ChunkStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// 청크에 포함된 달력일 수.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// 백필 계획 식별자.
///
/// 같은 모드/범위/청크 크기의 재실행은 같은 계획을 이어받습니다.
pub fn run_key(mode: IngestionMode, start: NaiveDate, end: NaiveDate, chunk_days: u32) -> String {
    format!("{}:{}:{}:{}", mode, start, end, chunk_days)
}

/// [start, end] 범위를 `chunk_days`일 크기의 연속 청크로 분할합니다.
///
/// 청크끼리 겹치지 않고 빈틈 없이 전체 범위를 덮으며, 마지막 청크만 더 짧을 수 있습니다.
pub fn plan_chunks(
    run_key: &str,
    start: NaiveDate,
    end: NaiveDate,
    chunk_days: u32,
) -> CoreResult<Vec<BackfillChunk>> {
    if start > end {
        return Err(CoreError::InvalidDateRange { start, end });
    }
    if chunk_days == 0 {
        return Err(CoreError::InvalidChunkSize(chunk_days));
    }

    let step = Duration::days(chunk_days as i64);
    let mut chunks = Vec::new();
    let mut cursor = start;
    let mut index = 0;

    while cursor <= end {
        let chunk_end = (cursor + step - Duration::days(1)).min(end);
        chunks.push(BackfillChunk::pending(run_key, index, cursor, chunk_end));
        index += 1;
        cursor = chunk_end + Duration::days(1);
    }

    Ok(chunks)
}

/// 완료 청크 비율 (%).
pub fn progress_percent(chunks: &[BackfillChunk]) -> f64 {
    if chunks.is_empty() {
        return 100.0;
    }
    let completed = chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Completed)
        .count();
    completed as f64 / chunks.len() as f64 * 100.0
}
