//! 표현식 코드 → (통화, 만기, 테너, 기준금리) 매핑.
//!
//! 표현식 형식:
//!
//! ```text
//! DB(COV,VOLSWAPTION,<layout tokens...>,<y>,<x>,PAYER,VOLBPVOL)
//! ```
//!
//! `<layout tokens>`는 [`CodeLayout`]이 정의하는 닫힌 집합이며, 문자열을
//! 임의로 가공하지 않고 토큰 시퀀스 전체를 테이블과 비교합니다.
//!
//! | 레이아웃 | 통화 | 기준금리 | 계열 |
//! |---|---|---|---|
//! | `USDD` | USD | SOFR | 신규 |
//! | `USD` | USD | Libor | 구 |
//! | `EUR` | EUR | Euribor | 신규 |
//! | `GBP,SONIA` | GBP | SONIA | 신규 |
//! | `GBP` | GBP | Libor | 구 |
//! | `CHF,SARON` | CHF | SARON | 신규 |
//! | `CHF` | CHF | Libor | 구 |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::domain::NaturalKey;
use crate::error::{CoreError, CoreResult};
use crate::types::{Currency, IngestionMode, OptionTenor, ReferenceRate, SwapTenor};

const PREFIX: &str = "DB(";
const SUFFIX: &str = ")";
const HEAD: [&str; 2] = ["COV", "VOLSWAPTION"];
const TAIL: [&str; 2] = ["PAYER", "VOLBPVOL"];

/// 코드 계열.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeFamily {
    /// 신규 코드 (대체 기준금리 체계)
    New,
    /// 구 코드 (Libor 체계)
    Old,
}

/// 통화 토큰 레이아웃.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeLayout {
    UsdSofr,
    UsdLibor,
    EurEuribor,
    GbpSonia,
    GbpLibor,
    ChfSaron,
    ChfLibor,
}

impl CodeLayout {
    pub const ALL: [CodeLayout; 7] = [
        CodeLayout::UsdSofr,
        CodeLayout::EurEuribor,
        CodeLayout::GbpSonia,
        CodeLayout::ChfSaron,
        CodeLayout::UsdLibor,
        CodeLayout::GbpLibor,
        CodeLayout::ChfLibor,
    ];

    /// 테너 앞에 오는 토큰 시퀀스.
    pub fn tokens(&self) -> &'static [&'static str] {
        match self {
            CodeLayout::UsdSofr => &["USDD"],
            CodeLayout::UsdLibor => &["USD"],
            CodeLayout::EurEuribor => &["EUR"],
            CodeLayout::GbpSonia => &["GBP", "SONIA"],
            CodeLayout::GbpLibor => &["GBP"],
            CodeLayout::ChfSaron => &["CHF", "SARON"],
            CodeLayout::ChfLibor => &["CHF"],
        }
    }

    pub fn currency(&self) -> Currency {
        match self {
            CodeLayout::UsdSofr | CodeLayout::UsdLibor => Currency::Usd,
            CodeLayout::EurEuribor => Currency::Eur,
            CodeLayout::GbpSonia | CodeLayout::GbpLibor => Currency::Gbp,
            CodeLayout::ChfSaron | CodeLayout::ChfLibor => Currency::Chf,
        }
    }

    pub fn reference_rate(&self) -> ReferenceRate {
        match self {
            CodeLayout::UsdSofr => ReferenceRate::Sofr,
            CodeLayout::EurEuribor => ReferenceRate::Euribor,
            CodeLayout::GbpSonia => ReferenceRate::Sonia,
            CodeLayout::ChfSaron => ReferenceRate::Saron,
            CodeLayout::UsdLibor | CodeLayout::GbpLibor | CodeLayout::ChfLibor => {
                ReferenceRate::Libor
            }
        }
    }

    pub fn family(&self) -> CodeFamily {
        match self {
            CodeLayout::UsdLibor | CodeLayout::GbpLibor | CodeLayout::ChfLibor => CodeFamily::Old,
            _ => CodeFamily::New,
        }
    }

    /// 신규 코드 여부.
    pub fn is_new_code(&self) -> bool {
        self.family() == CodeFamily::New
    }

    /// 이 레이아웃과 테너로 표현식 문자열을 만듭니다.
    pub fn render(&self, option_tenor: OptionTenor, swap_tenor: SwapTenor) -> String {
        let mut parts: Vec<&str> = HEAD.to_vec();
        parts.extend_from_slice(self.tokens());
        parts.push(swap_tenor.as_str());
        parts.push(option_tenor.as_str());
        parts.extend_from_slice(&TAIL);
        format!("{}{}{}", PREFIX, parts.join(","), SUFFIX)
    }
}

/// 표현식 매핑 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionMapping {
    pub currency: Currency,
    pub option_tenor: OptionTenor,
    pub swap_tenor: SwapTenor,
    pub reference_rate: ReferenceRate,
    pub layout: CodeLayout,
}

impl ExpressionMapping {
    /// 주어진 날짜의 정규화 자연키.
    pub fn natural_key(&self, date: NaiveDate) -> NaturalKey {
        NaturalKey {
            date,
            currency: self.currency,
            option_tenor: self.option_tenor,
            swap_tenor: self.swap_tenor,
            reference_rate: self.reference_rate,
        }
    }
}

/// 레이아웃 테이블 기반 표현식 매퍼.
#[derive(Debug, Clone)]
pub struct ExpressionMapper {
    layouts: Vec<CodeLayout>,
}

impl ExpressionMapper {
    /// 레이아웃 테이블을 검증하고 매퍼를 만듭니다.
    ///
    /// 토큰 시퀀스가 겹치거나 비어 있으면 거부합니다.
    pub fn new(layouts: &[CodeLayout]) -> CoreResult<Self> {
        let mut seen: HashSet<&'static [&'static str]> = HashSet::new();
        for layout in layouts {
            let tokens = layout.tokens();
            if tokens.is_empty() || !seen.insert(tokens) {
                return Err(CoreError::placeholder(
                    &tokens.join(","),
                    format!("ambiguous code layout {:?}", layout),
                ));
            }
        }
        Ok(Self {
            layouts: layouts.to_vec(),
        })
    }

    /// 표준 레이아웃 테이블 매퍼 (프로세스당 1회 생성).
    pub fn standard() -> &'static ExpressionMapper {
        static STANDARD: OnceLock<ExpressionMapper> = OnceLock::new();
        STANDARD.get_or_init(|| ExpressionMapper {
            layouts: CodeLayout::ALL.to_vec(),
        })
    }

    /// 표현식을 매핑합니다.
    pub fn map(&self, expression: &str) -> CoreResult<ExpressionMapping> {
        let body = expression
            .strip_prefix(PREFIX)
            .and_then(|s| s.strip_suffix(SUFFIX))
            .ok_or_else(|| {
                CoreError::placeholder(expression, "expected DB(...) wrapper")
            })?;

        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() < HEAD.len() + TAIL.len() + 3 {
            return Err(CoreError::placeholder(
                expression,
                format!("too few tokens ({})", parts.len()),
            ));
        }
        if parts[..HEAD.len()] != HEAD || parts[parts.len() - TAIL.len()..] != TAIL {
            return Err(CoreError::placeholder(
                expression,
                "expected DB(COV,VOLSWAPTION,...,PAYER,VOLBPVOL)",
            ));
        }

        let middle = &parts[HEAD.len()..parts.len() - TAIL.len()];
        let (layout_tokens, tenors) = middle.split_at(middle.len() - 2);

        let layout = self
            .layouts
            .iter()
            .copied()
            .find(|l| l.tokens() == layout_tokens)
            .ok_or_else(|| {
                CoreError::placeholder(
                    expression,
                    format!("unknown code layout '{}'", layout_tokens.join(",")),
                )
            })?;

        let swap_tenor = SwapTenor::from_token(tenors[0]).ok_or_else(|| {
            CoreError::placeholder(expression, format!("swap tenor '{}' not permitted", tenors[0]))
        })?;
        let option_tenor = OptionTenor::from_token(tenors[1]).ok_or_else(|| {
            CoreError::placeholder(
                expression,
                format!("option tenor '{}' not permitted", tenors[1]),
            )
        })?;

        Ok(ExpressionMapping {
            currency: layout.currency(),
            option_tenor,
            swap_tenor,
            reference_rate: layout.reference_rate(),
            layout,
        })
    }

    /// 주어진 계열의 모든 유효 표현식.
    pub fn expressions(&self, family: CodeFamily) -> Vec<String> {
        self.layouts
            .iter()
            .filter(|l| l.family() == family)
            .flat_map(|layout| {
                SwapTenor::ALL.iter().flat_map(move |y| {
                    OptionTenor::ALL.iter().map(move |x| layout.render(*x, *y))
                })
            })
            .collect()
    }

    /// 실행 모드의 기본 표현식 집합.
    ///
    /// - default: 신규 코드
    /// - old_codes: 신규 + 구 코드
    /// - historical: 구 코드
    pub fn expressions_for_mode(&self, mode: IngestionMode) -> Vec<String> {
        match mode {
            IngestionMode::Default => self.expressions(CodeFamily::New),
            IngestionMode::OldCodes => {
                let mut all = self.expressions(CodeFamily::New);
                all.extend(self.expressions(CodeFamily::Old));
                all
            }
            IngestionMode::Historical => self.expressions(CodeFamily::Old),
        }
    }
}

/// 표준 매퍼로 표현식을 매핑합니다.
pub fn map_expression(expression: &str) -> CoreResult<ExpressionMapping> {
    ExpressionMapper::standard().map(expression)
}
