//! 원본 응답 blob 저장소.
//!
//! 가져온 응답은 원천 레코드를 추가하기 전에 먼저 blob으로 저장되며,
//! 모든 원천 레코드는 `source_file_uri`로 이 파일을 가리킵니다.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;
use volsurf_core::FetchedRow;

use crate::error::{DataError, Result};

/// blob URI 접두어.
pub const URI_PREFIX: &str = "blob://market-data/";

/// 저장되는 응답 내용.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobPayload {
    pub expression: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fetch_timestamp: DateTime<Utc>,
    pub data: Vec<FetchedRow>,
}

impl BlobPayload {
    /// 파일 이름 (`<expression>_<start>_<end>_<yyyymmddHHMMSS>_<id>.json`).
    ///
    /// 표현식의 구분 문자는 `_`로 바꿉니다.
    fn file_name(&self) -> String {
        let expression: String = self
            .expression
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let id = Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}_{}_{}_{}.json",
            expression.trim_matches('_'),
            self.start_date.format("%Y%m%d"),
            self.end_date.format("%Y%m%d"),
            self.fetch_timestamp.format("%Y%m%d%H%M%S"),
            &id[..8]
        )
    }
}

/// blob 저장소.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 응답을 저장하고 URI를 반환합니다.
    async fn put(&self, payload: &BlobPayload) -> Result<String>;

    /// URI의 원본 바이트를 읽습니다.
    async fn get(&self, uri: &str) -> Result<Vec<u8>>;

    /// URI의 응답을 역직렬화합니다.
    async fn get_payload(&self, uri: &str) -> Result<BlobPayload> {
        let bytes = self.get(uri).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn file_name_from_uri(uri: &str) -> Result<&str> {
    uri.strip_prefix(URI_PREFIX)
        .filter(|name| !name.is_empty() && !name.contains('/') && !name.contains(".."))
        .ok_or_else(|| DataError::BlobError(format!("invalid blob uri: {}", uri)))
}

/// 로컬 디렉터리에 JSON 파일로 저장하는 blob 저장소.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// 디렉터리를 만들고 저장소를 엽니다.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[instrument(skip(self, payload), fields(expression = %payload.expression, rows = payload.data.len()))]
    async fn put(&self, payload: &BlobPayload) -> Result<String> {
        let name = payload.file_name();
        let body = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(self.root.join(&name), body).await?;

        let uri = format!("{}{}", URI_PREFIX, name);
        debug!(uri = %uri, "Blob stored");
        Ok(uri)
    }

    async fn get(&self, uri: &str) -> Result<Vec<u8>> {
        let name = file_name_from_uri(uri)?;
        Ok(tokio::fs::read(self.root.join(name)).await?)
    }
}

/// 인메모리 blob 저장소.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, payload: &BlobPayload) -> Result<String> {
        let uri = format!("{}{}", URI_PREFIX, payload.file_name());
        let body = serde_json::to_vec(payload)?;
        self.objects.write().await.insert(uri.clone(), body);
        Ok(uri)
    }

    async fn get(&self, uri: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(uri)
            .cloned()
            .ok_or_else(|| DataError::NotFound(uri.to_string()))
    }
}
