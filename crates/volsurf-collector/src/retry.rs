//! fetch 재시도 정책.
//!
//! 일시적 에러만 지수 백오프(지터 포함)로 재시도하고, 최대 시도 횟수를
//! 넘기면 영구 에러로 승격합니다. 재시도 루프 자체는 호출자가 돌리며,
//! 호출자는 시도마다 원장을 다시 확인할 수 있습니다.

use rand::Rng;
use std::time::Duration;

use crate::source::FetchError;

/// 실패 후 다음 동작.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStep {
    /// 지연 후 다시 시도
    Retry(Duration),
    /// 포기 (영구 에러)
    GiveUp(FetchError),
}

/// 지터가 포함된 지수 백오프 정책.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_base = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: clamped_base,
            max_delay_ms: max_delay_ms.max(clamped_base),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// `attempt`번째(0부터) 실패 이후의 지연.
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        if self.jitter_pct == 0.0 {
            return Duration::from_millis(delay);
        }
        let spread = (delay as f64 * self.jitter_pct) as i64;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(delay.saturating_add_signed(delta))
    }

    /// `attempt`번째(0부터) 시도가 `err`로 실패했을 때의 다음 동작.
    pub fn on_failure(&self, attempt: usize, err: FetchError) -> RetryStep {
        match err {
            FetchError::Transient(detail) if attempt + 1 >= self.max_attempts => {
                RetryStep::GiveUp(FetchError::Persistent(format!(
                    "gave up after {} attempts: {}",
                    attempt + 1,
                    detail
                )))
            }
            FetchError::Transient(_) => RetryStep::Retry(self.next_delay(attempt)),
            persistent @ FetchError::Persistent(_) => RetryStep::GiveUp(persistent),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 250, 5_000, 0.2)
    }
}
