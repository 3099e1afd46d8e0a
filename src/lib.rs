//! Merchant catalog ingestion pipeline.
//!
//! Takes raw merchant files (product photos, spreadsheets, PDFs) and
//! turns them into committed catalog records through a reviewed,
//! resumable state machine: upload, AI extraction, quality gating,
//! multi-product splitting, duplicate resolution, enhancement and
//! finally commit.

pub mod ai;
pub mod batch;
pub mod bulk;
pub mod catalog;
pub mod classify;
pub mod commit;
pub mod config;
pub mod dedup;
pub mod enhance;
pub mod model;
pub mod pipeline;
pub mod storage;
