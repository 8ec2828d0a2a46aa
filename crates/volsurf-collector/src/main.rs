//! Swaption volatility ETL collector CLI.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use volsurf_collector::cli::{exit_code, Cli};
use volsurf_collector::{CollectorConfig, MockMarketData, Pipeline, Stores};
use volsurf_core::logging::{init_logging, LogConfig};
use volsurf_data::{BlobStore, Database, DatabaseConfig, FsBlobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(LogConfig::new(cli.log_filter()).with_env_format())
        .map_err(|e| anyhow::anyhow!("logging init failed: {}", e))?;

    let config = CollectorConfig::from_env();
    tracing::info!("Volsurf Collector 시작");

    let blobs: Arc<dyn BlobStore> = Arc::new(
        FsBlobStore::open(&config.blob_storage_dir)
            .await
            .with_context(|| format!("blob storage {:?}", config.blob_storage_dir))?,
    );

    let database = match &config.database_url {
        Some(url) => {
            let db_config = DatabaseConfig::new(url.clone()).with_max_connections(config.db_max_connections);
            let db = Database::connect(&db_config).await.context("database connection")?;
            tracing::info!("데이터베이스 연결 성공");
            Some(db)
        }
        None => None,
    };

    if cli.setup_db || cli.setup_only {
        let db = database.as_ref().context("--setup-db requires DATABASE_URL")?;
        db.migrate().await.context("migration")?;
        tracing::info!("스키마 마이그레이션 완료");
        if cli.setup_only {
            return Ok(());
        }
    }

    let stores = match database {
        Some(db) => Stores::postgres(db, blobs),
        None => {
            tracing::warn!("DATABASE_URL 미설정, 인메모리 저장소를 사용합니다 (실행 종료 시 데이터 유실)");
            Stores {
                blobs,
                ..Stores::in_memory()
            }
        }
    };

    let source = Arc::new(MockMarketData::new(config.mock_seed));
    let pipeline = Pipeline::new(stores, source, &config);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("종료 신호 수신, 진행 중인 작업을 취소합니다");
            ctrl_c.cancel();
        }
    });

    let requests = cli.requests(Utc::now().date_naive());
    let total = requests.len();
    let mut reports = Vec::with_capacity(total);
    for (step, request) in requests.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        if total > 1 {
            tracing::info!("Step {}/{}: {} 모드", step + 1, total, request.mode);
        }
        let report = pipeline.run(request, &cancel).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        reports.push(report);
    }

    let integrity = if cli.verify {
        let integrity = pipeline.verify().await?;
        println!("{}", serde_json::to_string_pretty(&integrity)?);
        Some(integrity)
    } else {
        None
    };

    tracing::info!("Volsurf Collector 종료");
    let code = exit_code(&reports, integrity.as_ref());
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
