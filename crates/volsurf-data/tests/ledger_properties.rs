//! 원장 버전 부여와 정규화 저장소 갱신 규칙의 성질 테스트.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;
use volsurf_core::{map_expression, IngestionMode, LedgerKey, NewRawRecord, NormalizedRecord, UpsertDecision};
use volsurf_data::{integrity_report, CleanStore, MemoryCleanStore, MemoryRawLedger, RawLedger};

const EXPRESSIONS: [&str; 3] = [
    "DB(COV,VOLSWAPTION,EUR,2y,1y,PAYER,VOLBPVOL)",
    "DB(COV,VOLSWAPTION,USDD,5y,1y,PAYER,VOLBPVOL)",
    "DB(COV,VOLSWAPTION,CHF,SARON,5y,5y,PAYER,VOLBPVOL)",
];

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn new_raw(expression: &str, date: NaiveDate, offset_secs: i64) -> NewRawRecord {
    NewRawRecord {
        expression: expression.to_string(),
        date,
        value: Some(80.0),
        fetch_timestamp: Utc.timestamp_opt(1_757_000_000, 0).unwrap() + Duration::seconds(offset_secs),
        ingestion_mode: IngestionMode::OldCodes,
        source_file_uri: "blob://market-data/prop.json".to_string(),
    }
}

proptest! {
    /// 추가 순서와 관계없이 키마다 버전은 1부터 빈틈없이 증가합니다.
    #[test]
    fn versions_are_dense_per_key(
        appends in prop::collection::vec((0usize..3, 0i64..4, -3600i64..3600), 1..40)
    ) {
        let ledger = MemoryRawLedger::new();
        let rt = runtime();
        let mut expected: HashMap<LedgerKey, i32> = HashMap::new();

        rt.block_on(async {
            for (expr_idx, day, offset) in &appends {
                let date = base_date() + Duration::days(*day);
                let record = new_raw(EXPRESSIONS[*expr_idx], date, *offset);
                let key = record.key();
                let outcome = ledger.append(record).await.unwrap();

                let version = expected.entry(key).or_insert(0);
                *version += 1;
                prop_assert_eq!(outcome.record.version, *version);
                prop_assert_eq!(outcome.duplicate_fetch, *version > 1);
            }

            for (key, latest) in &expected {
                let history = ledger.history(key).await.unwrap();
                let versions: Vec<i32> = history.iter().map(|r| r.version).collect();
                prop_assert_eq!(versions, (1..=*latest).collect::<Vec<_>>());
                // fetch 시각도 버전 순서를 따름
                prop_assert!(history.windows(2).all(|w| w[0].fetch_timestamp < w[1].fetch_timestamp));
            }
            Ok(())
        })?;
    }

    /// 어떤 순서로 후보를 적용해도 최종 행은 가장 최신 버전입니다.
    #[test]
    fn clean_store_converges_to_latest_version(
        order in Just((1..=6).collect::<Vec<i32>>()).prop_shuffle()
    ) {
        let store = MemoryCleanStore::new();
        let rt = runtime();
        let key = map_expression(EXPRESSIONS[0]).unwrap().natural_key(base_date());

        rt.block_on(async {
            let mut newest = 0;
            for version in &order {
                let candidate = NormalizedRecord {
                    key,
                    value: 70.0 + *version as f64,
                    expression: EXPRESSIONS[0].to_string(),
                    provenance: volsurf_core::Provenance {
                        raw_data_id: *version as i64,
                        version: *version,
                        fetch_timestamp: Utc.timestamp_opt(1_757_000_000 + *version as i64, 0).unwrap(),
                    },
                };
                let decision = store.apply(&candidate).await.unwrap();
                if *version > newest {
                    prop_assert!(decision.writes());
                    newest = *version;
                } else {
                    prop_assert_eq!(decision, UpsertDecision::Conflict);
                }
            }

            let stored = store.get(&key).await.unwrap().unwrap();
            prop_assert_eq!(stored.provenance.version, 6);
            prop_assert_eq!(store.records().await.unwrap().len(), 1);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_integrity_flags_rows_behind_ledger() {
    let ledger = MemoryRawLedger::new();
    let clean = MemoryCleanStore::new();
    let date = base_date();

    let first = ledger.append(new_raw(EXPRESSIONS[1], date, 0)).await.unwrap();
    let mapping = map_expression(EXPRESSIONS[1]).unwrap();
    let candidate = NormalizedRecord {
        key: mapping.natural_key(date),
        value: 1000.0,
        expression: EXPRESSIONS[1].to_string(),
        provenance: first.record.provenance(),
    };
    assert_eq!(clean.apply(&candidate).await.unwrap(), UpsertDecision::Insert);
    assert!(integrity_report(&ledger, &clean).await.unwrap().is_clean());

    ledger.append(new_raw(EXPRESSIONS[1], date, 60)).await.unwrap();
    let report = integrity_report(&ledger, &clean).await.unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.stale_keys, vec![candidate.key]);
    assert_eq!(report.duplicate_keys, 0);
}
