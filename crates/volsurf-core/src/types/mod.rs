//! 파이프라인 전반에서 사용되는 공통 타입.

mod currency;
mod mode;
mod tenor;

pub use currency::*;
pub use mode::*;
pub use tenor::*;
