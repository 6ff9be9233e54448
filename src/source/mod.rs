// src/source/mod.rs

//! Metadata source reading
//!
//! Reads package metadata from property-list sources: either a local file
//! (an application resource file or an explicitly named plist) or, when the
//! local path does not exist, a remote fallback fetched from the content
//! feed into a scoped temporary file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::package::RawPackage;
use crate::server::CONTENT_ORIGIN;

/// Default timeout for metadata fetches (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed metadata fetches
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Feed directory the versioned metadata plists are published under.
const FEED_DIRECTORY: &str = "lp10_ms3_content_2016";

/// Top-level shape of a metadata source document.
#[derive(Debug, Deserialize)]
struct MetadataDocument {
    #[serde(rename = "Packages", default)]
    packages: Option<BTreeMap<String, RawPackage>>,
}

/// Parse a property-list source file into its raw package map.
///
/// The map is keyed by package name and ordered, so downstream dedup
/// tie-breaks ("earlier-seen wins") are deterministic. A document without
/// the top-level `Packages` key is not an audio-content source.
pub fn read_source(path: &Path) -> Result<BTreeMap<String, RawPackage>> {
    if !path.exists() {
        return Err(Error::SourceNotFound(path.display().to_string()));
    }

    let document: MetadataDocument = plist::from_file(path).map_err(|e| Error::InvalidSource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    document.packages.ok_or_else(|| Error::InvalidSource {
        path: path.to_path_buf(),
        reason: "missing top-level 'Packages' key".to_string(),
    })
}

/// Reads metadata sources with a remote feed fallback.
pub struct SourceReader {
    client: Client,
    feed_base_url: String,
}

impl SourceReader {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(SourceReader {
            client,
            feed_base_url: format!("{CONTENT_ORIGIN}/{FEED_DIRECTORY}"),
        })
    }

    /// Read a metadata source named on the command line. A value naming an
    /// existing local file is read directly; anything else is treated as a
    /// feed plist name (`garageband1047` or `garageband1047.plist`) and
    /// fetched from the remote feed.
    pub fn read(&self, name_or_path: &str) -> Result<BTreeMap<String, RawPackage>> {
        let local = Path::new(name_or_path);

        if local.exists() {
            return read_source(local);
        }

        // path-shaped values never fall back to the feed
        if name_or_path.contains(std::path::MAIN_SEPARATOR) {
            return Err(Error::SourceNotFound(name_or_path.to_string()));
        }

        let file_name = if name_or_path.ends_with(".plist") {
            name_or_path.to_string()
        } else {
            format!("{name_or_path}.plist")
        };

        self.fetch_remote(&file_name)
    }

    /// Fetch a feed plist into a temporary file and parse it. The temporary
    /// file is removed when it drops, whether or not parsing succeeds.
    fn fetch_remote(&self, file_name: &str) -> Result<BTreeMap<String, RawPackage>> {
        let url = format!("{}/{}", self.feed_base_url, file_name);
        info!("Fetching metadata source from {}", url);

        let mut attempt = 0;
        let body = loop {
            attempt += 1;
            match self.client.get(&url).send() {
                Ok(response) => {
                    if response.status() == reqwest::StatusCode::NOT_FOUND {
                        return Err(Error::SourceNotFound(url));
                    }

                    if !response.status().is_success() {
                        return Err(Error::Download {
                            name: file_name.to_string(),
                            reason: format!("HTTP {} from {}", response.status(), url),
                        });
                    }

                    break response.bytes()?;
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(Error::Download {
                            name: file_name.to_string(),
                            reason: format!("failed after {attempt} attempts: {e}"),
                        });
                    }
                    warn!("Metadata fetch attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)));
                }
            }
        };

        let mut temp = NamedTempFile::new()?;
        temp.write_all(&body)?;
        temp.flush()?;

        debug!(
            "Fetched {} ({} bytes) to {}",
            file_name,
            body.len(),
            temp.path().display()
        );

        read_source(temp.path())
    }
}
