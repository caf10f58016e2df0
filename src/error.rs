//! Error types for the coverage pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

type Source = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    /// A required column is absent from the active table.
    #[error("missing column '{column}' (available columns: {available:?})")]
    MissingColumns {
        column: String,
        available: Vec<String>,
    },

    /// The credential file could not be read or parsed.
    #[error("failed to load credentials from {path:?}")]
    Authentication {
        path: PathBuf,
        #[source]
        source: Source,
    },

    /// The query-execution collaborator failed. Surfaced unmodified,
    /// never retried.
    #[error("query execution failed")]
    QueryExecution(#[source] Source),

    /// An unsupported aggregation-mode name was requested.
    #[error("invalid operation '{0}' (accepted: point_count, count, aggregate)")]
    InvalidOperation(String),

    /// The region-polygon layer could not be loaded.
    #[error("failed to load region layer from {path:?}")]
    LayerLoad {
        path: PathBuf,
        #[source]
        source: Source,
    },

    /// A coverage table could not be loaded from disk.
    #[error("failed to load coverage table from {path:?}")]
    TableLoad {
        path: PathBuf,
        #[source]
        source: Source,
    },

    /// The rendered image could not be written.
    #[error("failed to write rendered map to {path:?}")]
    Render {
        path: PathBuf,
        #[source]
        source: Source,
    },

    /// A render or aggregation was requested before any table was retrieved.
    #[error("no active coverage table (retrieve or set a table first)")]
    NoActiveTable,

    /// A render was requested before a region layer was loaded.
    #[error("no region layer loaded (load a map first)")]
    NoRegionLayer,

    /// A remote query was requested on a session with no query service.
    #[error("no query service attached to this session")]
    NoQueryService,
}
