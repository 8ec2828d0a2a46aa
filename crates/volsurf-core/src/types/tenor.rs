//! 스왑션 만기/테너 정의.
//!
//! 표현식 코드의 `<x>`(옵션 만기), `<y>`(스왑 테너) 자리에 허용되는 값만
//! 닫힌 열거형으로 표현합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 옵션 만기 (x 테너).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionTenor {
    /// 1년
    #[serde(rename = "1y")]
    OneYear,
    /// 5년
    #[serde(rename = "5y")]
    FiveYear,
}

impl OptionTenor {
    /// 허용되는 모든 옵션 만기.
    pub const ALL: [OptionTenor; 2] = [OptionTenor::OneYear, OptionTenor::FiveYear];

    /// 표현식 토큰 문자열로 변환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionTenor::OneYear => "1y",
            OptionTenor::FiveYear => "5y",
        }
    }

    /// 표현식 토큰에서 파싱합니다.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1y" => Some(OptionTenor::OneYear),
            "5y" => Some(OptionTenor::FiveYear),
            _ => None,
        }
    }
}

impl fmt::Display for OptionTenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionTenor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| format!("Invalid option tenor: {}", s))
    }
}

/// 스왑 테너 (y 테너).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SwapTenor {
    /// 2년
    #[serde(rename = "2y")]
    TwoYear,
    /// 5년
    #[serde(rename = "5y")]
    FiveYear,
    /// 10년
    #[serde(rename = "10y")]
    TenYear,
}

impl SwapTenor {
    /// 허용되는 모든 스왑 테너.
    pub const ALL: [SwapTenor; 3] = [SwapTenor::TwoYear, SwapTenor::FiveYear, SwapTenor::TenYear];

    /// 표현식 토큰 문자열로 변환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapTenor::TwoYear => "2y",
            SwapTenor::FiveYear => "5y",
            SwapTenor::TenYear => "10y",
        }
    }

    /// 표현식 토큰에서 파싱합니다.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "2y" => Some(SwapTenor::TwoYear),
            "5y" => Some(SwapTenor::FiveYear),
            "10y" => Some(SwapTenor::TenYear),
            _ => None,
        }
    }
}

impl fmt::Display for SwapTenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapTenor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| format!("Invalid swap tenor: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_tenor_tokens() {
        assert_eq!(OptionTenor::from_token("1y"), Some(OptionTenor::OneYear));
        assert_eq!(OptionTenor::from_token("5y"), Some(OptionTenor::FiveYear));
        assert_eq!(OptionTenor::from_token("2y"), None);
        assert_eq!(OptionTenor::FiveYear.to_string(), "5y");
    }

    #[test]
    fn test_swap_tenor_tokens() {
        assert_eq!("10y".parse::<SwapTenor>().unwrap(), SwapTenor::TenYear);
        assert!("1y".parse::<SwapTenor>().is_err());
        assert_eq!(SwapTenor::TwoYear.as_str(), "2y");
    }

    #[test]
    fn test_tenor_serde_uses_tokens() {
        let json = serde_json::to_string(&SwapTenor::TenYear).unwrap();
        assert_eq!(json, "\"10y\"");
        let parsed: OptionTenor = serde_json::from_str("\"1y\"").unwrap();
        assert_eq!(parsed, OptionTenor::OneYear);
    }
}
