//! Billing export ingestion and cost aggregation pipeline.
//!
//! The pipeline discovers Cost and Usage Report exports in per-project S3
//! buckets, tracks each object in a ledger, and aggregates the eligible
//! files into per-service and per-month cost summaries with a simple
//! run-rate forecast.

pub mod batch;
pub mod config;
pub mod cur;
pub mod db;
pub mod models;
pub mod observability;
pub mod queue;
pub mod secrets;
pub mod storage;
