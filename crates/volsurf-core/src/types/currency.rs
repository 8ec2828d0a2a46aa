//! 통화 및 기준금리 정의.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 지원 통화.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Chf,
}

impl Currency {
    /// ISO 통화 코드.
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "CHF" => Ok(Currency::Chf),
            _ => Err(format!("Unknown currency: {}", s)),
        }
    }
}

/// 기준금리 (reference rate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceRate {
    Libor,
    #[serde(rename = "SOFR")]
    Sofr,
    #[serde(rename = "SONIA")]
    Sonia,
    #[serde(rename = "SARON")]
    Saron,
    Euribor,
}

impl ReferenceRate {
    /// 저장소에 기록되는 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceRate::Libor => "Libor",
            ReferenceRate::Sofr => "SOFR",
            ReferenceRate::Sonia => "SONIA",
            ReferenceRate::Saron => "SARON",
            ReferenceRate::Euribor => "Euribor",
        }
    }

    /// 정규화 시 값에 곱할 배수.
    ///
    /// SOFR 호가는 일간 bp 단위로 들어오므로 연율화(√252)가 필요합니다.
    pub fn value_multiplier(&self) -> f64 {
        match self {
            ReferenceRate::Sofr => 252f64.sqrt(),
            _ => 1.0,
        }
    }
}

impl fmt::Display for ReferenceRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LIBOR" => Ok(ReferenceRate::Libor),
            "SOFR" => Ok(ReferenceRate::Sofr),
            "SONIA" => Ok(ReferenceRate::Sonia),
            "SARON" => Ok(ReferenceRate::Saron),
            "EURIBOR" => Ok(ReferenceRate::Euribor),
            _ => Err(format!("Unknown reference rate: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_roundtrip_str() {
        for c in [Currency::Usd, Currency::Eur, Currency::Gbp, Currency::Chf] {
            assert_eq!(c.as_str().parse::<Currency>().unwrap(), c);
        }
        assert!("JPY".parse::<Currency>().is_err());
    }

    #[test]
    fn test_reference_rate_parse_is_case_insensitive() {
        assert_eq!("sofr".parse::<ReferenceRate>().unwrap(), ReferenceRate::Sofr);
        assert_eq!("Libor".parse::<ReferenceRate>().unwrap(), ReferenceRate::Libor);
        assert_eq!("EURIBOR".parse::<ReferenceRate>().unwrap(), ReferenceRate::Euribor);
    }

    #[test]
    fn test_only_sofr_is_scaled() {
        assert!((ReferenceRate::Sofr.value_multiplier() - 15.874507866387544).abs() < 1e-12);
        assert_eq!(ReferenceRate::Sonia.value_multiplier(), 1.0);
        assert_eq!(ReferenceRate::Libor.value_multiplier(), 1.0);
    }
}
