//! Dependency record codec.
//!
//! The front-end's parse-imports mode writes one of these per unit; the
//! graph builder reads them back to assemble the dependency graph. Same
//! JSON-on-disk approach as `meta.rs`, following the `SolFilesCache`
//! pattern of one small serde struct per on-disk record kind.

use crate::error::{CpplError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Per-unit parsed-imports record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedImports {
    pub unit_id: String,
    /// Ordinary import targets (unit identifiers).
    pub decl_imports: Vec<String>,
    /// Body-only (`bodydep`) import targets.
    pub body_imports: Vec<String>,
    pub is_public: bool,
    pub is_external: bool,
}

impl ParsedImports {
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CpplError::MetaAbsent(path.to_path_buf()));
        }
        let data = fs::read(path)?;
        serde_json::from_slice(&data).map_err(|_| CpplError::MetaCorrupt(path.to_path_buf()))
    }
}
