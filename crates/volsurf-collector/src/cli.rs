//! 명령줄 인자와 실행 요청 구성.
//!
//! 표현식 코드 자체에 쉼표가 들어가므로 `--expression`은 반복해서 지정하거나
//! `;`로 구분합니다.
//!
//! ```text
//! volsurf-collector --mode old_codes \
//!     --expression 'DB(COV,VOLSWAPTION,USDD,5y,1y,PAYER,VOLBPVOL)' \
//!     --expression 'DB(COV,VOLSWAPTION,EUR,2y,1y,PAYER,VOLBPVOL)'
//! ```

use chrono::NaiveDate;
use clap::Parser;
use volsurf_core::IngestionMode;
use volsurf_data::IntegrityReport;

use crate::modules::{RunReport, RunRequest};

/// 표현식 목록 구분자
pub const EXPRESSION_DELIMITER: char = ';';

#[derive(Debug, Parser)]
#[command(name = "volsurf-collector")]
#[command(about = "Swaption volatility ETL collector", long_about = None)]
#[command(version)]
pub struct Cli {
    /// 실행 모드 (default, old_codes, historical)
    #[arg(long, default_value = "default")]
    pub mode: IngestionMode,

    /// 시작일 (YYYY-MM-DD, 기본값: 종료일)
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// 종료일 (YYYY-MM-DD, 기본값: 오늘)
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// 스키마 마이그레이션 적용 후 실행
    #[arg(long)]
    pub setup_db: bool,

    /// 스키마 마이그레이션만 적용하고 종료
    #[arg(long)]
    pub setup_only: bool,

    /// 특정 표현식만 수집 (반복 지정 또는 ';'로 구분)
    #[arg(
        long = "expression",
        visible_alias = "expressions",
        value_delimiter = EXPRESSION_DELIMITER
    )]
    pub expressions: Vec<String>,

    /// default → old_codes 순서로 두 번 실행
    #[arg(long, conflicts_with = "mode")]
    pub demo: bool,

    /// 실행 후 정합성 검사
    #[arg(long)]
    pub verify: bool,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// 실행 윈도우. 종료일 기본값은 오늘, 시작일 기본값은 종료일입니다.
    pub fn window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.end_date.unwrap_or(today);
        (self.start_date.unwrap_or(end), end)
    }

    /// 순서대로 실행할 요청 목록.
    pub fn requests(&self, today: NaiveDate) -> Vec<RunRequest> {
        let (start, end) = self.window(today);
        let modes: &[IngestionMode] = if self.demo {
            &[IngestionMode::Default, IngestionMode::OldCodes]
        } else {
            std::slice::from_ref(&self.mode)
        };
        modes
            .iter()
            .map(|&mode| {
                let request = RunRequest::new(mode, start, end);
                if self.expressions.is_empty() {
                    request
                } else {
                    request.with_expressions(self.expressions.clone())
                }
            })
            .collect()
    }

    /// 로그 필터
    pub fn log_filter(&self) -> String {
        format!(
            "volsurf_collector={0},volsurf_data={0},volsurf_core={0}",
            self.log_level
        )
    }
}

/// 프로세스 종료 코드.
///
/// 실행 하나라도 실패했거나 정합성 검사가 문제를 찾으면 1입니다.
pub fn exit_code(reports: &[RunReport], integrity: Option<&IntegrityReport>) -> i32 {
    let runs_ok = reports.iter().all(RunReport::success);
    let integrity_ok = integrity.map_or(true, IntegrityReport::is_clean);
    if runs_ok && integrity_ok {
        0
    } else {
        1
    }
}
