//! # Volsurf Core
//!
//! 스왑션 변동성 ETL 파이프라인의 핵심 도메인 모델을 제공합니다:
//! - 통화/기준금리/테너/실행 모드 타입
//! - 표현식 코드 매핑 테이블
//! - 원천/정규화 레코드와 갱신 결정 규칙
//! - 백필 청크 상태 머신
//! - 영업일 달력
//! - 로깅 초기화

pub mod calendar;
pub mod domain;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod types;

pub use domain::*;
pub use error::*;
pub use mapping::{
    map_expression, CodeFamily, CodeLayout, ExpressionMapper, ExpressionMapping,
};
pub use types::*;
