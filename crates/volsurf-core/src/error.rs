//! 핵심 도메인 에러 타입.

use chrono::NaiveDate;
use thiserror::Error;

/// 도메인 에러.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// 표현식이 허용된 코드 레이아웃/자리표시자 집합에 맞지 않음
    #[error("잘못된 표현식 '{expression}': {detail}")]
    InvalidPlaceholder { expression: String, detail: String },

    /// 시작일이 종료일보다 늦음
    #[error("잘못된 날짜 범위: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// 청크 크기가 0
    #[error("잘못된 청크 크기: {0}일")]
    InvalidChunkSize(u32),

    /// 허용되지 않는 상태 전이
    #[error("잘못된 청크 상태 전이: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl CoreError {
    pub(crate) fn placeholder(expression: &str, detail: impl Into<String>) -> Self {
        CoreError::InvalidPlaceholder {
            expression: expression.to_string(),
            detail: detail.into(),
        }
    }
}

/// 도메인 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;
