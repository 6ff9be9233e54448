// src/model/package.rs

//! Package entity and raw-record normalization
//!
//! Converts raw metadata records (as parsed from a `Packages` property-list
//! map) into canonical `Package` values: path normalization, sentinel and
//! version checks, and the derived already-installed predicate.

use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::size::Size;
use crate::model::version::PackageVersion;
use crate::platform::PackageReceipts;

/// Legacy (2013) content directory on the origin server.
pub const CONTENT_PATH_2013: &str = "lp10_ms3_content_2013";

/// Current (2016) content directory on the origin server.
pub const CONTENT_PATH_2016: &str = "lp10_ms3_content_2016";

/// Sentinel file value as it appears in source metadata; the upstream
/// format flops between a single string and a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileCheck {
    One(String),
    Many(Vec<String>),
}

impl FileCheck {
    fn into_vec(self) -> Vec<String> {
        match self {
            FileCheck::One(path) => vec![path],
            FileCheck::Many(paths) => paths,
        }
    }
}

/// One raw record from a metadata source's `Packages` map. Field names are
/// bit-exact with Apple's published property-list schema.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPackage {
    #[serde(rename = "DownloadName")]
    pub download_name: String,

    #[serde(rename = "PackageID")]
    pub package_id: String,

    #[serde(rename = "DownloadSize", default)]
    pub download_size: Option<u64>,

    #[serde(rename = "InstalledSize", default)]
    pub installed_size: Option<u64>,

    #[serde(rename = "IsMandatory", default)]
    pub is_mandatory: Option<bool>,

    #[serde(rename = "FileCheck", default)]
    pub file_check: Option<FileCheck>,

    #[serde(rename = "PackageVersion", default)]
    pub package_version: Option<String>,
}

/// One purchasable/installable content unit, canonicalized from a raw
/// record. Immutable after normalization; never persisted between runs.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    /// Display name (basename of the raw download name)
    pub name: String,

    /// Raw remote-relative name; may contain legacy path segments
    pub download_name: String,

    /// Stable identity key, trimmed of whitespace; sole dedup key
    pub package_id: String,

    /// Canonical `<content-era>/<basename>` remote-relative path
    pub download_path: String,

    pub download_size: Size,
    pub installed_size: Size,
    pub mandatory: bool,

    /// Absolute local paths used as the installed-presence heuristic
    pub file_check: Vec<PathBuf>,

    /// Required version; absence means sentinel-file presence alone
    /// determines installed state
    pub version: Option<PackageVersion>,
}

impl Package {
    /// Normalize a raw metadata record into a canonical package. Missing
    /// sizes become zero, a missing mandatory flag defaults to false, and
    /// the sentinel value collapses to a list.
    pub fn from_raw(raw: RawPackage) -> Package {
        let name = basename(&raw.download_name).to_string();
        let download_path = normalize_download_path(&raw.download_name);
        let version = raw.package_version.as_deref().map(PackageVersion::parse);

        Package {
            name,
            download_path,
            package_id: raw.package_id.trim().to_string(),
            download_name: raw.download_name,
            download_size: Size::new(raw.download_size.unwrap_or(0)),
            installed_size: Size::new(raw.installed_size.unwrap_or(0)),
            mandatory: raw.is_mandatory.unwrap_or(false),
            file_check: raw
                .file_check
                .map(FileCheck::into_vec)
                .unwrap_or_default()
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            version,
        }
    }

    /// Any sentinel file exists on the local filesystem. Receipts alone only
    /// confirm the package WAS installed, not that its content still exists.
    pub fn has_sentinel_files(&self) -> bool {
        self.file_check.iter().any(|path| path.exists())
    }

    /// Installed-state predicate. With no declared version, sentinel
    /// presence decides. With a declared version, the installed version
    /// (queried from the platform receipt database, gated on sentinel
    /// presence) must satisfy the required version under prefix-floor
    /// semantics.
    pub fn is_installed(&self, receipts: &dyn PackageReceipts) -> bool {
        let Some(required) = &self.version else {
            return self.has_sentinel_files();
        };

        if !self.has_sentinel_files() {
            return false;
        }

        let installed = receipts
            .installed_version(&self.package_id)
            .unwrap_or_else(PackageVersion::zero);

        required.satisfied_by(&installed)
    }
}

// `package_id` is the sole identity key: two records with the same id are
// the same package regardless of other field differences.
impl PartialEq for Package {
    fn eq(&self, other: &Package) -> bool {
        self.package_id == other.package_id
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.package_id.hash(state);
    }
}

/// Rewrite a raw download name to its canonical remote-relative path.
/// Legacy-era content (any name carrying the 2013 marker, including
/// relative-parent-escaping fragments like `../lp10_ms3_content_2013/x.pkg`)
/// collapses to `lp10_ms3_content_2013/<basename>`; everything else maps to
/// `lp10_ms3_content_2016/<basename>`. Idempotent.
pub fn normalize_download_path(download_name: &str) -> String {
    let base = basename(download_name);

    if download_name.contains(CONTENT_PATH_2013) {
        format!("{CONTENT_PATH_2013}/{base}")
    } else {
        format!("{CONTENT_PATH_2016}/{base}")
    }
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
