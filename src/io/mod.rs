//! Storage backends and source-side I/O helpers.
//!
//! A [`StorageBackend`] turns one [`Table`] into the bytes of one partition
//! file and back. Which backend a dataset uses is recorded in its manifest as a
//! [`Format`].

use crate::error::{Error, Result};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod glob;
pub mod jsonl;

#[cfg_attr(docsrs, doc(cfg(feature = "io-parquet")))]
#[cfg(feature = "io-parquet")]
pub mod parquet;

#[cfg_attr(docsrs, doc(cfg(feature = "io-ipc")))]
#[cfg(feature = "io-ipc")]
pub mod ipc;

/// Encodes tables into self-describing partition files.
///
/// Implementations must embed enough schema information that
/// [`decode`](Self::decode) reproduces the column names and types.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Short format name stored in the manifest.
    fn name(&self) -> &'static str;

    /// File extension of partitions, without the dot.
    fn extension(&self) -> &'static str;

    /// Serialize `table` into one partition payload.
    ///
    /// # Errors
    /// Backend specific.
    fn encode(&self, table: &Table) -> anyhow::Result<Vec<u8>>;

    /// Parse one partition payload.
    ///
    /// # Errors
    /// Backend specific.
    fn decode(&self, bytes: Vec<u8>) -> anyhow::Result<Table>;
}

/// On-disk partition format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Parquet,
    Ipc,
}

impl Format {
    /// Instantiate the backend for this format.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the backend's feature is disabled.
    pub fn backend(self) -> Result<Arc<dyn StorageBackend>> {
        match self {
            #[cfg(feature = "io-parquet")]
            Self::Parquet => Ok(Arc::new(parquet::ParquetBackend::default())),
            #[cfg(feature = "io-ipc")]
            Self::Ipc => Ok(Arc::new(ipc::IpcBackend)),
            #[allow(unreachable_patterns)]
            other => Err(Error::InvalidConfig(format!(
                "format `{other}` is not enabled in this build"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Ipc => "ipc",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "ipc" | "arrow" => Ok(Self::Ipc),
            other => Err(Error::InvalidConfig(format!("unknown format `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip_through_serde() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Format::Ipc)?, "\"ipc\"");
        assert_eq!(serde_json::from_str::<Format>("\"parquet\"")?, Format::Parquet);
        assert_eq!("Arrow".parse::<Format>()?, Format::Ipc);
        assert!("csv".parse::<Format>().is_err());
        Ok(())
    }

    #[cfg(all(feature = "io-parquet", feature = "io-ipc"))]
    #[test]
    fn backends_match_their_format() -> anyhow::Result<()> {
        for format in [Format::Parquet, Format::Ipc] {
            let backend = format.backend()?;
            assert_eq!(backend.name(), format.as_str());
        }
        assert_eq!(Format::Ipc.backend()?.extension(), "arrow");
        Ok(())
    }
}
