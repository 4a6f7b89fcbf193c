//! sift-storage: the relational store behind sift.
//!
//! - [`Store`] -- read-write handle used by ingestion and the report catalog
//! - [`QueryHandle`] -- read-only handle given to scripts
//! - [`hasher::fingerprint`] -- order-independent row digest for dedup
//! - [`schema::evolve`] -- additive schema widening
//! - [`IngestConfig`] / [`Store::ingest`] -- drop location to archive

mod catalog;
pub mod cell;
mod error;
pub mod hasher;
pub mod ingest;
pub mod normalize;
mod query;
mod record;
pub mod schema;
pub mod source;
mod store;

pub use cell::{Cell, ColumnType};
pub use error::StoreError;
pub use ingest::IngestConfig;
pub use query::{QueryHandle, TableData};
pub use record::{
    DataFile, ExecutionOutcome, ExecutionRecord, FileStatus, IngestFailure, IngestSummary,
    NewExecution, ReportDefinition,
};
pub use schema::{ColumnDef, SchemaDescriptor};
pub use store::{timestamp, Store};
