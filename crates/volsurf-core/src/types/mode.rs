//! 수집 실행 모드.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 파이프라인 실행 모드.
///
/// 원천 레코드의 `ingestion_mode` 태그로도 기록됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMode {
    /// 일일 증분 수집 (신규 코드, 이미 있는 키는 건너뜀)
    #[default]
    Default,
    /// 구 코드 포함 수집 (전체 윈도우 재수집)
    OldCodes,
    /// 과거 데이터 백필 (청크 단위, 재개 가능)
    Historical,
}

impl IngestionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionMode::Default => "default",
            IngestionMode::OldCodes => "old_codes",
            IngestionMode::Historical => "historical",
        }
    }

    /// 이미 버전이 있는 키를 건너뛰는지 여부.
    pub fn skips_versioned_keys(&self) -> bool {
        matches!(self, IngestionMode::Default)
    }
}

impl fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(IngestionMode::Default),
            "old_codes" => Ok(IngestionMode::OldCodes),
            "historical" => Ok(IngestionMode::Historical),
            _ => Err(format!("Unknown ingestion mode: {}", s)),
        }
    }
}
