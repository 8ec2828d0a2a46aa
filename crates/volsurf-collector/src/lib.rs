//! 스왑션 변동성 ETL collector.
//!
//! 이 crate는 다음을 제공합니다:
//! - 시세 소스 추출 (동시 실행, 재시도, 버전 원장 기록)
//! - 표현식 코드 → 자연키 변환과 값 검증
//! - 버전/시각 기준 정규화 저장소 upsert
//! - 재개 가능한 청크 단위 과거 데이터 백필

pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod modules;
pub mod retry;
pub mod source;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use metrics::RunMetrics;
pub use modules::{Pipeline, RunReport, RunRequest, Stores};
pub use retry::{RetryPolicy, RetryStep};
pub use source::{FetchError, MarketDataSource, MockFault, MockMarketData};
