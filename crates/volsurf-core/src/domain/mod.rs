//! 파이프라인 도메인 모델.
//!
//! - 원천/정규화 레코드와 갱신 결정 규칙
//! - 백필 청크 상태 머신

mod chunk;
mod record;

pub use chunk::*;
pub use record::*;
