//! Credential loading and the query-execution seam.
//!
//! The query engine itself is an external collaborator. This crate only
//! consumes it through [`QueryService`]: hand it a query string, get a
//! [`CoverageTable`] back. Calls block, are never retried, and results are
//! never cached.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::CoverageTable;

/// Service-account credentials, loaded from a JSON key file.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub project_id: String,
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

impl Credentials {
    /// Loads a credential file. Any read or parse failure surfaces as an
    /// authentication error carrying the offending path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Authentication {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let creds: Credentials =
            serde_json::from_str(&content).map_err(|e| Error::Authentication {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;
        Ok(creds)
    }
}

/// Opaque handle onto the remote query-execution collaborator.
pub trait QueryService {
    /// Executes a query string synchronously. Collaborator failures are
    /// propagated unchanged as [`Error::QueryExecution`].
    fn execute(&self, query: &str) -> Result<CoverageTable>;

    /// The identity executing queries, e.g. a service-account email.
    fn identity(&self) -> &str;
}
