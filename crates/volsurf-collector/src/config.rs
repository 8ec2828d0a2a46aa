//! 환경변수 기반 설정 모듈.

use std::path::PathBuf;

use crate::retry::RetryPolicy;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL (없으면 인메모리 저장소 사용)
    pub database_url: Option<String>,
    /// 풀의 최대 연결 수
    pub db_max_connections: u32,
    /// blob 저장 디렉터리
    pub blob_storage_dir: PathBuf,
    /// 추출 설정
    pub extract: ExtractConfig,
    /// 백필 설정
    pub backfill: BackfillConfig,
    /// mock 시세 소스 시드
    pub mock_seed: u64,
}

/// 추출 설정
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// 동시에 처리할 표현식 수
    pub max_concurrency: usize,
    /// fetch 최대 시도 횟수
    pub max_attempts: usize,
    /// 재시도 기본 지연 (밀리초)
    pub base_delay_ms: u64,
    /// 재시도 최대 지연 (밀리초)
    pub max_delay_ms: u64,
}

/// 백필 설정
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// 청크 크기 (달력일)
    pub chunk_days: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 10,
            blob_storage_dir: PathBuf::from("blob_storage"),
            extract: ExtractConfig::default(),
            backfill: BackfillConfig::default(),
            mock_seed: 42,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self { chunk_days: 30 }
    }
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: env_var_parse("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            blob_storage_dir: std::env::var("BLOB_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.blob_storage_dir),
            extract: ExtractConfig {
                max_concurrency: env_var_parse(
                    "EXTRACT_MAX_CONCURRENCY",
                    defaults.extract.max_concurrency,
                ),
                max_attempts: env_var_parse("FETCH_MAX_ATTEMPTS", defaults.extract.max_attempts),
                base_delay_ms: env_var_parse("FETCH_BASE_DELAY_MS", defaults.extract.base_delay_ms),
                max_delay_ms: env_var_parse("FETCH_MAX_DELAY_MS", defaults.extract.max_delay_ms),
            },
            backfill: BackfillConfig {
                chunk_days: env_var_parse("BACKFILL_CHUNK_DAYS", defaults.backfill.chunk_days),
            },
            mock_seed: env_var_parse("MOCK_SEED", defaults.mock_seed),
        }
    }
}

impl ExtractConfig {
    /// fetch 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay_ms, self.max_delay_ms, 0.2)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.blob_storage_dir, PathBuf::from("blob_storage"));
        assert_eq!(config.extract.max_concurrency, 4);
        assert_eq!(config.extract.max_attempts, 3);
        assert_eq!(config.backfill.chunk_days, 30);
        assert_eq!(config.mock_seed, 42);
    }

    #[test]
    fn test_env_var_parse_falls_back() {
        std::env::set_var("VOLSURF_TEST_PARSE_BAD", "not-a-number");
        assert_eq!(env_var_parse("VOLSURF_TEST_PARSE_BAD", 7u32), 7);
        std::env::set_var("VOLSURF_TEST_PARSE_OK", " 12 ");
        assert_eq!(env_var_parse("VOLSURF_TEST_PARSE_OK", 7u32), 12);
        assert_eq!(env_var_parse("VOLSURF_TEST_PARSE_MISSING", 3u64), 3);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = ExtractConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 250);
    }
}
