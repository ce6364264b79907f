//! Game catalog reconciliation library - shared modules for all binaries.

pub mod aliases;
pub mod consolidate;
pub mod enrich;
pub mod error;
pub mod index;
pub mod logging;
pub mod mapper;
pub mod matcher;
pub mod models;
pub mod momentum;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod safety;
pub mod sink;
pub mod sources;

pub use error::{ReconcileError, Result};
