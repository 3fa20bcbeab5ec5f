//! Metadata codec.
//!
//! Each non-trivial artifact is accompanied by a small `Meta` record: the
//! source hash used to produce it, the artifact's own hash (used for cascade
//! decisions), and the fragment-skip list the header/surrogate generator
//! consumes. The on-disk codec is a contract, not an implementation handed
//! down from an external bitstream component — we encode it the way the
//! teacher encodes its own `SolFilesCache`: plain JSON with an explicit
//! format version, read with `serde_json` and a dedicated "missing vs
//! corrupt" distinction.

use crate::error::{CpplError, Result};
use crate::hash::Digest16;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const META_FORMAT_VERSION: u32 = 1;

/// A source byte-range directive the header/declaration-surrogate generator
/// applies when transforming a public unit's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentAction {
    Skip,
    SkipInHeaderOnly,
    ReplaceWithSemicolon,
    PutExtern,
    StartUnit,
    StartUnitFirstDecl,
    EndUnit,
    EndUnitEOF,
}

/// A single non-overlapping, `start`-sorted source byte range with its
/// action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub start: u32,
    pub end: u32,
    pub action: FragmentAction,
}

/// The per-artifact companion record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "_format")]
    format: u32,
    #[serde(with = "hex_digest")]
    pub source_hash: Digest16,
    #[serde(with = "hex_digest")]
    pub artifact_hash: Digest16,
    pub fragments: Vec<Fragment>,
}

impl Meta {
    pub fn new(source_hash: Digest16, artifact_hash: Digest16, fragments: Vec<Fragment>) -> Self {
        Self { format: META_FORMAT_VERSION, source_hash, artifact_hash, fragments }
    }

    /// Validates that fragments are sorted by `start` and non-overlapping.
    pub fn fragments_well_formed(&self) -> bool {
        self.fragments.windows(2).all(|w| w[0].end <= w[1].start)
    }

    /// Writes the record to `path`, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Reads the record at `path`.
    ///
    /// A missing file is not an error in the exit sense, it is the
    /// `MetaAbsent` signal that forces a rebuild; a present-but-unparsable
    /// file is `MetaCorrupt`. Both are returned as `Err` here — callers are
    /// expected to match on `CpplError::is_recoverable_as_stale` and treat
    /// the node as stale rather than abort the build.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CpplError::MetaAbsent(path.to_path_buf()));
        }
        let data = fs::read(path).map_err(CpplError::from)?;
        serde_json::from_slice(&data).map_err(|_| CpplError::MetaCorrupt(path.to_path_buf()))
    }
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 16], ser: S) -> Result<S::Ok, S::Error> {
        let s: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        ser.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 16], D::Error> {
        let s = String::deserialize(de)?;
        if s.len() != 32 {
            return Err(serde::de::Error::custom("expected 32 hex characters"));
        }
        let mut out = [0u8; 16];
        for (i, chunk) in out.iter_mut().enumerate() {
            *chunk = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| serde::de::Error::custom(e.to_string()))?;
        }
        Ok(out)
    }
}
