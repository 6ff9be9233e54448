// src/model/application.rs

//! Installed audio application discovery
//!
//! Models GarageBand, Logic Pro, and MainStage installs. Each application
//! owns one property-list resource file inside its bundle that carries the
//! package metadata map; when several version-numbered metadata files are
//! present, the lexicographically-highest filename wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::model::package::RawPackage;
use crate::source;

/// Known products and their short-codes used for command-line selection.
pub const KNOWN_APPLICATIONS: [(&str, &str, &str); 3] = [
    ("GarageBand", "garageband", "/Applications/GarageBand.app"),
    ("Logic Pro", "logicpro", "/Applications/Logic Pro X.app"),
    ("MainStage", "mainstage", "/Applications/MainStage 3.app"),
];

const RESOURCE_FILE_PATH: &str = "Contents/Resources";
const INFO_PLIST_PATH: &str = "Contents/Info.plist";

#[derive(Debug, Deserialize)]
struct BundleInfo {
    #[serde(rename = "CFBundleShortVersionString", default)]
    short_version: Option<String>,
}

/// A detected installed application. Read-only after discovery.
#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub short_name: String,
    pub version: Option<String>,
    pub path: PathBuf,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Application {
    /// Probe the known install paths and return every application present
    /// on this host, in the fixed product order.
    pub fn discover_installed() -> Vec<Application> {
        KNOWN_APPLICATIONS
            .iter()
            .filter(|(_, _, path)| Path::new(path).is_dir())
            .map(|(name, short_name, path)| Application::from_bundle(name, short_name, path))
            .collect()
    }

    fn from_bundle(name: &str, short_name: &str, path: &str) -> Application {
        let bundle = PathBuf::from(path);

        let version = plist::from_file::<_, BundleInfo>(bundle.join(INFO_PLIST_PATH))
            .ok()
            .and_then(|info| info.short_version);

        let last_modified = std::fs::metadata(&bundle)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Application {
            name: name.to_string(),
            short_name: short_name.to_string(),
            version,
            path: bundle,
            last_modified,
        }
    }

    /// The metadata resource file for this application: a file under
    /// `Contents/Resources` named `<short-code><digits>.plist`, highest
    /// lexical filename preferred.
    pub fn resource_file(&self) -> Option<PathBuf> {
        let resources = self.path.join(RESOURCE_FILE_PATH);
        let mut best: Option<PathBuf> = None;

        for entry in WalkDir::new(&resources)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let file_name = entry.file_name().to_string_lossy();

            if !matches_metadata_pattern(&file_name, &self.short_name) {
                continue;
            }

            let replace = match &best {
                None => true,
                Some(current) => {
                    let current_name = current
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    file_name.as_ref() > current_name.as_str()
                }
            };

            if replace {
                best = Some(entry.into_path());
            }
        }

        debug!(
            "Resource file for {}: {:?}",
            self.name,
            best.as_ref().map(|p| p.display().to_string())
        );
        best
    }

    /// Raw package records from this application's resource file. A missing
    /// resource file yields `None`; a present-but-unreadable file is a
    /// source error and propagates.
    pub fn raw_packages(&self) -> Result<Option<BTreeMap<String, RawPackage>>> {
        let Some(resource_file) = self.resource_file() else {
            warn!("No metadata resource file found for {}", self.name);
            return Ok(None);
        };

        source::read_source(&resource_file).map(Some)
    }
}

/// `<short-code><digits>.plist`, e.g. `garageband1047.plist`.
fn matches_metadata_pattern(file_name: &str, short_name: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(short_name) else {
        return false;
    };
    let Some(digits) = rest.strip_suffix(".plist") else {
        return false;
    };

    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
