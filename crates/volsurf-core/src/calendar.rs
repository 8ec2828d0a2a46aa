//! 영업일 달력.
//!
//! 시세 소스는 주말을 제외한 영업일(월~금)에만 값을 제공합니다.
//! 공휴일은 구분하지 않으며, 값이 없는 날은 다음 실행에서 다시 조회됩니다.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// 영업일 여부.
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// [start, end] 범위의 영업일 목록 (오름차순).
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        if is_business_day(cursor) {
            days.push(cursor);
        }
        cursor += Duration::days(1);
    }
    days
}
