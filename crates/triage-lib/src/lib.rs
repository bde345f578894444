//! Triage library for Azure and Kubernetes/Istio resources
//!
//! This crate provides the core functionality for:
//! - Running vendor CLIs (`az`, `kubectl`, `istioctl`) and collecting output
//! - Normalizing that output into resource samples
//! - Classifying samples against static threshold and log-pattern rules
//! - Writing the issue feed, human report and run metrics

pub mod bundles;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod observability;
pub mod pipeline;
pub mod reporter;

pub use bundles::{Bundle, BundleKind};
pub use collector::{CliRunner, Collector};
pub use config::Settings;
pub use error::{CollectError, TriageError};
pub use models::*;
pub use observability::{RunMetrics, StructuredLogger};
pub use pipeline::{run_bundle, BundleRun, RunOptions};
pub use reporter::{ReportFiles, Reporter, ResourceStatus, RunReport, RunSummary};
