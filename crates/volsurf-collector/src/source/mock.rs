//! 결정적 mock 시세 소스.
//!
//! 영업일마다 80 ± 10 범위의 값을 돌려줍니다. 값은 (시드, 표현식, 날짜)로
//! 결정되므로 같은 요청은 항상 같은 값을 받습니다. 테스트용 장애 주입과
//! 값 덮어쓰기를 지원합니다.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;
use volsurf_core::{calendar, FetchedRow};

use super::{FetchError, MarketDataSource};

/// 표현식별 주입 장애.
#[derive(Debug, Clone, PartialEq)]
pub enum MockFault {
    /// 다음 n번의 호출이 일시적 에러로 실패
    Transient(usize),
    /// 모든 호출이 영구 에러로 실패
    Persistent,
    /// 빈 응답
    Empty,
}

#[derive(Default)]
struct MockState {
    faults: HashMap<String, MockFault>,
    /// (표현식, 날짜) → 고정 값 (None은 숫자가 아닌 값)
    overrides: HashMap<(String, NaiveDate), Option<f64>>,
    /// 요청 범위와 무관하게 응답에 섞이는 행
    stray_rows: HashMap<String, Vec<FetchedRow>>,
    calls: HashMap<String, usize>,
}

/// mock 시세 소스.
pub struct MockMarketData {
    seed: u64,
    state: Mutex<MockState>,
    total_calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            state: Mutex::new(MockState::default()),
            total_calls: AtomicUsize::new(0),
        }
    }

    /// 표현식에 장애를 주입합니다.
    pub async fn inject(&self, expression: &str, fault: MockFault) {
        self.state
            .lock()
            .await
            .faults
            .insert(expression.to_string(), fault);
    }

    /// 주입된 장애를 제거합니다.
    pub async fn heal(&self, expression: &str) {
        self.state.lock().await.faults.remove(expression);
    }

    /// 특정 날짜의 값을 고정합니다.
    pub async fn set_value(&self, expression: &str, date: NaiveDate, value: Option<f64>) {
        self.state
            .lock()
            .await
            .overrides
            .insert((expression.to_string(), date), value);
    }

    /// 요청 범위 밖의 행을 응답에 섞습니다.
    pub async fn add_stray_row(&self, expression: &str, row: FetchedRow) {
        self.state
            .lock()
            .await
            .stray_rows
            .entry(expression.to_string())
            .or_default()
            .push(row);
    }

    /// 전체 fetch 호출 수.
    pub fn call_count(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// 표현식별 fetch 호출 수.
    pub async fn calls_for(&self, expression: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(expression)
            .copied()
            .unwrap_or(0)
    }

    fn generated_value(&self, expression: &str, date: NaiveDate) -> f64 {
        let mut rng = StdRng::seed_from_u64(self.seed ^ fnv1a(expression) ^ date.num_days_from_ce() as u64);
        let value: f64 = 80.0 + rng.gen_range(-10.0..=10.0);
        (value * 10_000.0).round() / 10_000.0
    }
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self::new(42)
    }
}

/// 플랫폼과 무관하게 고정된 문자열 해시.
fn fnv1a(input: &str) -> u64 {
    input.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl MarketDataSource for MockMarketData {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        expression: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FetchedRow>, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        *state.calls.entry(expression.to_string()).or_default() += 1;

        match state.faults.get_mut(expression) {
            Some(MockFault::Persistent) => {
                return Err(FetchError::Persistent(format!("unknown expression {}", expression)));
            }
            Some(MockFault::Empty) => return Ok(Vec::new()),
            Some(MockFault::Transient(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                return Err(FetchError::Transient("upstream timeout".to_string()));
            }
            _ => {}
        }

        let mut rows: Vec<FetchedRow> = calendar::business_days(start, end)
            .into_iter()
            .map(|date| {
                let value = match state.overrides.get(&(expression.to_string(), date)) {
                    Some(fixed) => *fixed,
                    None => Some(self.generated_value(expression, date)),
                };
                FetchedRow { date, value }
            })
            .collect();
        if let Some(stray) = state.stray_rows.get(expression) {
            rows.extend(stray.iter().copied());
        }

        debug!(expression, %start, %end, rows = rows.len(), "Mock fetch");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPR: &str = "DB(COV,VOLSWAPTION,USDD,2y,1y,PAYER,VOLBPVOL)";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_business_days_only_and_value_range() {
        let source = MockMarketData::new(42);
        // 2024-01-01(월) ~ 2024-01-10(수): 영업일 8일
        let rows = source.fetch(EXPR, d(2024, 1, 1), d(2024, 1, 10)).await.unwrap();
        assert_eq!(rows.len(), 8);
        for row in &rows {
            assert!(calendar::is_business_day(row.date));
            let v = row.value.unwrap();
            assert!((70.0..=90.0).contains(&v), "value out of range: {}", v);
        }
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_deterministic_per_seed() {
        let a = MockMarketData::new(7);
        let b = MockMarketData::new(7);
        let c = MockMarketData::new(8);
        let range = (d(2024, 3, 1), d(2024, 3, 29));

        let ra = a.fetch(EXPR, range.0, range.1).await.unwrap();
        let rb = b.fetch(EXPR, range.0, range.1).await.unwrap();
        let rc = c.fetch(EXPR, range.0, range.1).await.unwrap();
        assert_eq!(ra, rb);
        assert_ne!(ra, rc);

        // 부분 범위 요청도 같은 값
        let sub = a.fetch(EXPR, d(2024, 3, 4), d(2024, 3, 4)).await.unwrap();
        assert_eq!(Some(&sub[0]), ra.iter().find(|r| r.date == d(2024, 3, 4)));
    }

    #[tokio::test]
    async fn test_transient_fault_heals_after_n_calls() {
        let source = MockMarketData::default();
        source.inject(EXPR, MockFault::Transient(2)).await;

        for _ in 0..2 {
            let err = source.fetch(EXPR, d(2024, 1, 2), d(2024, 1, 2)).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert_eq!(source.fetch(EXPR, d(2024, 1, 2), d(2024, 1, 2)).await.unwrap().len(), 1);
        assert_eq!(source.calls_for(EXPR).await, 3);
    }

    #[tokio::test]
    async fn test_persistent_fault_and_heal() {
        let source = MockMarketData::default();
        source.inject(EXPR, MockFault::Persistent).await;
        assert!(matches!(
            source.fetch(EXPR, d(2024, 1, 2), d(2024, 1, 2)).await,
            Err(FetchError::Persistent(_))
        ));
        source.heal(EXPR).await;
        assert!(source.fetch(EXPR, d(2024, 1, 2), d(2024, 1, 2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_overrides_and_stray_rows() {
        let source = MockMarketData::default();
        source.set_value(EXPR, d(2025, 9, 1), Some(100.0)).await;
        source.set_value(EXPR, d(2025, 9, 2), None).await;
        source
            .add_stray_row(EXPR, FetchedRow { date: d(2025, 8, 1), value: Some(1.0) })
            .await;

        let rows = source.fetch(EXPR, d(2025, 9, 1), d(2025, 9, 2)).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].value, Some(100.0));
        assert_eq!(rows[1].value, None);
        assert_eq!(rows[2].date, d(2025, 8, 1));
    }

    #[tokio::test]
    async fn test_weekend_only_range_is_empty() {
        let source = MockMarketData::default();
        // 2024-01-06(토) ~ 2024-01-07(일)
        assert!(source.fetch(EXPR, d(2024, 1, 6), d(2024, 1, 7)).await.unwrap().is_empty());
    }
}
