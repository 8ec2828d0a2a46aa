//! ETL 파이프라인 모듈.

pub mod backfill;
pub mod extract;
pub mod pipeline;
pub mod transform;
pub mod upsert;

pub use backfill::{BackfillSummary, BackfillTracker};
pub use extract::{ExtractOutcome, Extractor, FetchFailure};
pub use pipeline::{Pipeline, RunReport, RunRequest, Stores, WindowReport};
pub use transform::{transform, transform_record, RejectReason, Rejection, TransformOutcome};
pub use upsert::{resolve, UpsertSummary};
