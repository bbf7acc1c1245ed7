//! Source enumeration: turning a selection pattern into an ordered list of
//! [`SourceItem`]s.
//!
//! Each item is a snapshot taken at enumeration time: its identity, where it
//! links to (if it is a symlink), and a [`ModSignal`] used by the manifest to
//! decide whether the item changed since it was last ingested. Enumeration is
//! deterministic (lexicographic by identity) so chunk assignment in parallel
//! builds is reproducible, and can be repeated at any time to re-read the
//! filesystem.

use crate::error::Result;
use crate::io::glob::expand_glob;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// How to compute an item's [`ModSignal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeDetection {
    /// Modification time only.
    #[default]
    ModifiedTime,
    /// Modification time plus a SHA-256 digest of the content.
    ContentHash,
}

/// Modification signal recorded per item in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModSignal {
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified_ns: i64,
    /// Hex SHA-256 of the content, when content hashing is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ModSignal {
    /// Whether this signal marks the item as changed relative to `recorded`.
    ///
    /// When both sides carry a digest the content decides; otherwise the
    /// modification time must be strictly newer.
    #[must_use]
    pub fn supersedes(&self, recorded: &Self) -> bool {
        match (&self.digest, &recorded.digest) {
            (Some(now), Some(then)) => now != then,
            _ => self.modified_ns > recorded.modified_ns,
        }
    }

    /// Modification time in fractional seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn modified_secs(&self) -> f64 {
        self.modified_ns as f64 / 1e9
    }
}

/// One enumerable unit to be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Absolute, lexically normalized path as a string; the manifest key.
    pub identity: String,
    pub path: PathBuf,
    /// Target of the matched path if it is a symbolic link.
    pub link_target: Option<PathBuf>,
    pub signal: ModSignal,
}

impl SourceItem {
    /// Snapshot the file at `path`.
    ///
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be inspected or read.
    pub fn from_path(path: impl AsRef<Path>, detection: ChangeDetection) -> Result<Self> {
        let path = normalize(&std::path::absolute(path.as_ref())?);
        let link_target = if fs::symlink_metadata(&path)?.file_type().is_symlink() {
            Some(fs::read_link(&path)?)
        } else {
            None
        };
        let modified = fs::metadata(&path)?.modified()?;
        let modified_ns = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_nanos()).map_or(i64::MIN, |n| -n),
        };
        let digest = match detection {
            ChangeDetection::ModifiedTime => None,
            ChangeDetection::ContentHash => Some(content_digest(&path)?),
        };
        Ok(Self {
            identity: path.display().to_string(),
            path,
            link_target,
            signal: ModSignal {
                modified_ns,
                digest,
            },
        })
    }

    /// Open the raw payload for reading.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be opened.
    pub fn open(&self) -> std::io::Result<File> {
        File::open(&self.path)
    }
}

/// Anything that can produce an ordered, finite list of source items on demand.
pub trait Source: Send + Sync {
    /// Enumerate items; each call re-reads the underlying storage.
    ///
    /// # Errors
    /// Implementation specific.
    fn enumerate(&self) -> Result<Vec<SourceItem>>;
}

/// Files matched by a glob pattern.
#[derive(Debug, Clone)]
pub struct GlobSource {
    pub pattern: String,
    pub detection: ChangeDetection,
}

impl GlobSource {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            detection: ChangeDetection::default(),
        }
    }

    #[must_use]
    pub const fn with_detection(mut self, detection: ChangeDetection) -> Self {
        self.detection = detection;
        self
    }
}

impl Source for GlobSource {
    fn enumerate(&self) -> Result<Vec<SourceItem>> {
        enumerate(&self.pattern, self.detection)
    }
}

/// A fixed list of items. Duplicate identities collapse to their first
/// occurrence, so an item is never extracted twice in one run.
impl Source for Vec<SourceItem> {
    fn enumerate(&self) -> Result<Vec<SourceItem>> {
        let mut items = self.clone();
        items.sort_by(|a, b| a.identity.cmp(&b.identity));
        items.dedup_by(|later, first| later.identity == first.identity);
        Ok(items)
    }
}

/// Resolve `pattern` into source items sorted by identity.
///
/// # Errors
/// Returns [`Error::Pattern`](crate::Error::Pattern) for an invalid pattern or
/// [`Error::Io`](crate::Error::Io) if a matched file cannot be inspected.
pub fn enumerate(pattern: &str, detection: ChangeDetection) -> Result<Vec<SourceItem>> {
    let mut items = expand_glob(pattern)?
        .into_iter()
        .map(|p| SourceItem::from_path(p, detection))
        .collect::<Result<Vec<_>>>()?;
    items.sort_by(|a, b| a.identity.cmp(&b.identity));
    Ok(items)
}

/// Drop `.` and resolve `..` against the preceding component without touching
/// the filesystem, so symlinks along the path are kept as spelled.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn content_digest(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn newer_mtime_supersedes() {
        let old = ModSignal { modified_ns: 10, digest: None };
        let same = ModSignal { modified_ns: 10, digest: None };
        let newer = ModSignal { modified_ns: 11, digest: None };
        assert!(newer.supersedes(&old));
        assert!(!same.supersedes(&old));
        assert!(!old.supersedes(&newer));
    }

    #[test]
    fn digest_decides_when_both_present() {
        let a = ModSignal { modified_ns: 10, digest: Some("aa".into()) };
        let touched = ModSignal { modified_ns: 20, digest: Some("aa".into()) };
        let edited = ModSignal { modified_ns: 5, digest: Some("bb".into()) };
        assert!(!touched.supersedes(&a));
        assert!(edited.supersedes(&a));
    }

    #[test]
    fn enumerate_snapshots_items_in_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("b.json"), "{}")?;
        fs::write(dir.path().join("a.json"), "{}")?;
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        File::options()
            .write(true)
            .open(dir.path().join("a.json"))?
            .set_modified(when)?;

        let pattern = format!("{}/*.json", dir.path().display());
        let items = enumerate(&pattern, ChangeDetection::ContentHash)?;
        assert_eq!(items.len(), 2);
        assert!(items[0].identity.ends_with("a.json"));
        assert!(items[1].identity.ends_with("b.json"));
        assert_eq!(items[0].signal.modified_ns, 1_000_000_000_000);
        assert_eq!(items[0].signal.digest, items[1].signal.digest);
        assert!(items[0].link_target.is_none());
        Ok(())
    }

    #[test]
    fn identity_is_the_same_however_the_path_is_spelled() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("sub"))?;
        let file = dir.path().join("a.jsonl");
        fs::write(&file, "{}")?;

        let plain = SourceItem::from_path(&file, ChangeDetection::ModifiedTime)?;
        let dotted = dir.path().join("sub").join("..").join(".").join("a.jsonl");
        let detour = SourceItem::from_path(&dotted, ChangeDetection::ModifiedTime)?;
        assert_eq!(detour.identity, plain.identity);
        assert_eq!(detour.path, plain.path);
        assert!(!detour.identity.contains(".."));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn normalize_is_lexical() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn item_lists_are_sorted_and_deduplicated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.json", "a.json"] {
            fs::write(dir.path().join(name), "{}")?;
        }
        let item = |name: &str| SourceItem::from_path(dir.path().join(name), ChangeDetection::ModifiedTime);
        let list = vec![item("b.json")?, item("a.json")?, item("b.json")?];
        let items = list.enumerate()?;
        let names: Vec<_> = items
            .iter()
            .filter_map(|i| i.path.file_name()?.to_str())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_record_their_target() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("real.dat");
        fs::write(&target, "x")?;
        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&target, &link)?;

        let item = SourceItem::from_path(&link, ChangeDetection::ModifiedTime)?;
        assert_eq!(item.link_target.as_deref(), Some(target.as_path()));
        Ok(())
    }
}
