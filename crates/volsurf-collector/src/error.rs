//! 에러 타입 정의.

use thiserror::Error;
use volsurf_core::CoreError;
use volsurf_data::DataError;

/// Collector 에러 타입.
///
/// 여기에 해당하는 에러는 실행 전체를 중단시킵니다. 개별 fetch 실패는
/// [`FetchError`](crate::source::FetchError)로 기록되고 실행은 계속됩니다.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 원장/저장소/blob 저장소 에러
    #[error("Storage error: {0}")]
    Storage(#[from] DataError),

    /// 날짜 범위, 청크 크기 등 도메인 검증 에러
    #[error("Invalid request: {0}")]
    Invalid(#[from] CoreError),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
