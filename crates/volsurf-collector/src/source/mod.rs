//! 시세 데이터 소스.

pub mod mock;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use volsurf_core::FetchedRow;

pub use mock::{MockFault, MockMarketData};

/// fetch 에러.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// 타임아웃, rate limit 등 재시도로 회복 가능한 에러
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// 재시도해도 회복되지 않는 에러
    #[error("persistent fetch error: {0}")]
    Persistent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// 시세 데이터 소스.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 소스 이름 (로그용)
    fn name(&self) -> &str;

    /// [start, end] 범위(양 끝 포함)의 행을 가져옵니다.
    async fn fetch(
        &self,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FetchedRow>, FetchError>;
}
