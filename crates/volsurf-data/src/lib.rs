//! 스왑션 변동성 데이터 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - 원천 레코드 원장 (키별 버전 부여)
//! - 정규화 레코드 저장소 (자연키 단위 upsert)
//! - 백필 청크 상태 저장소
//! - 원본 응답 blob 저장소
//!
//! 각 저장소는 PostgreSQL 구현과 인메모리 구현을 가집니다.

pub mod blob;
pub mod error;
pub mod storage;

pub use blob::{BlobPayload, BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{DataError, Result};
pub use storage::database::{Database, DatabaseConfig};
pub use storage::integrity::{integrity_report, IntegrityReport};
pub use storage::memory::{MemoryChunkStore, MemoryCleanStore, MemoryRawLedger};
pub use storage::postgres::{PgChunkStore, PgCleanStore, PgRawLedger};
pub use storage::{AppendOutcome, ChunkStore, CleanStore, RawLedger};
