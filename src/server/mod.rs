// src/server/mod.rs

//! Content-server selection and download URL construction
//!
//! Resolves, once per run, where package content is fetched from. Priority:
//! an explicit mirror, then an explicit or auto-discovered caching proxy,
//! then the authoritative Apple origin. Caching proxies never terminate TLS,
//! so URLs routed through one are plain `http://` with the true origin host
//! declared in the query string.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::platform::CacheLocator;

/// Authoritative content origin.
pub const CONTENT_ORIGIN: &str = "https://audiocontentdownload.apple.com";

/// Host component of [`CONTENT_ORIGIN`], declared to caching proxies.
const ORIGIN_HOST: &str = "audiocontentdownload.apple.com";

/// Saved-server rank considered primary by the locator utility.
pub const DEFAULT_PREFERRED_RANK: i64 = 1;

/// The locator may return nothing on the first query after boot; a repeat
/// scan usually finds the server.
const LOCATOR_ATTEMPTS: u32 = 3;
const LOCATOR_RETRY_DELAY_MS: u64 = 2000;

/// Which caching-proxy configuration scope to read from locator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorScope {
    System,
    CurrentUser,
}

impl LocatorScope {
    fn key(self) -> &'static str {
        match self {
            LocatorScope::System => "system",
            LocatorScope::CurrentUser => "current user",
        }
    }
}

/// Auto-discovery tuning. Defaults mirror the locator utility's own notion
/// of a primary server.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub scope: LocatorScope,
    pub preferred_rank: i64,
    pub require_favored: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            scope: LocatorScope::System,
            preferred_rank: DEFAULT_PREFERRED_RANK,
            require_favored: true,
        }
    }
}

/// Caching-proxy selection from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOption {
    /// Discover via the platform locator utility.
    Auto,
    /// Explicit `http://host:port` value.
    Explicit(String),
}

/// The resolved content endpoint for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageServer {
    /// Authoritative Apple origin.
    Origin,
    /// Full mirror of the origin's path layout.
    Mirror(Url),
    /// Apple content caching proxy; requires URL rewriting.
    CachingProxy(Url),
}

impl PackageServer {
    /// Build the full download URL for a normalized package path.
    pub fn package_url(&self, download_path: &str) -> String {
        let path = download_path.trim_start_matches('/');

        match self {
            PackageServer::Origin => format!("{CONTENT_ORIGIN}/{path}"),
            PackageServer::Mirror(base) => {
                format!("{}/{}", base.as_str().trim_end_matches('/'), path)
            }
            PackageServer::CachingProxy(proxy) => format!(
                "{}/{path}?source={ORIGIN_HOST}&sourceScheme=https",
                proxy.as_str().trim_end_matches('/'),
            ),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PackageServer::Origin => format!("origin {CONTENT_ORIGIN}"),
            PackageServer::Mirror(base) => format!("mirror {base}"),
            PackageServer::CachingProxy(proxy) => format!("caching server {proxy}"),
        }
    }
}

/// Resolve the content server for this run.
///
/// Mirror wins over caching proxy; the origin is the fallback when neither
/// is configured.
pub fn resolve_server(
    mirror: Option<&str>,
    cache: Option<&CacheOption>,
    locator: &dyn CacheLocator,
    discovery: DiscoveryOptions,
) -> Result<PackageServer> {
    if let Some(raw) = mirror {
        return Ok(PackageServer::Mirror(validate_mirror_url(raw)?));
    }

    match cache {
        Some(CacheOption::Explicit(raw)) => {
            Ok(PackageServer::CachingProxy(validate_caching_url(raw)?))
        }
        Some(CacheOption::Auto) => {
            let discovered = discover_caching_server(locator, discovery)?;
            Ok(PackageServer::CachingProxy(validate_caching_url(
                &discovered,
            )?))
        }
        None => Ok(PackageServer::Origin),
    }
}

/// Validate a mirror base URL: https, no credentials, no query or fragment,
/// no path beyond `/`.
pub fn validate_mirror_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("invalid mirror server URL {raw:?}: {e}")))?;

    if url.scheme() != "https" {
        return Err(Error::Config(format!(
            "mirror server URL {raw:?} must use the https:// scheme"
        )));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::Config(format!(
            "mirror server URL {raw:?} must not embed credentials"
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(Error::Config(format!(
            "mirror server URL {raw:?} must not carry a query string or fragment"
        )));
    }

    if !matches!(url.path(), "" | "/") {
        return Err(Error::Config(format!(
            "mirror server URL {raw:?} must be a base URL with no path"
        )));
    }

    Ok(url)
}

/// Validate a caching-proxy URL: http with an explicit port, no credentials,
/// no query or fragment, no path beyond `/`.
pub fn validate_caching_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("invalid caching server URL {raw:?}: {e}")))?;

    if url.scheme() != "http" {
        return Err(Error::Config(format!(
            "caching server URL {raw:?} must use the http:// scheme, caching servers do not terminate TLS"
        )));
    }

    match url.port() {
        Some(0) => {
            return Err(Error::Config(format!(
                "caching server URL {raw:?} has an invalid port"
            )));
        }
        Some(_) => {}
        None => {
            return Err(Error::Config(format!(
                "caching server URL {raw:?} must include a port number"
            )));
        }
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::Config(format!(
            "caching server URL {raw:?} must not embed credentials"
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(Error::Config(format!(
            "caching server URL {raw:?} must not carry a query string or fragment"
        )));
    }

    if !matches!(url.path(), "" | "/") {
        return Err(Error::Config(format!(
            "caching server URL {raw:?} must be a base URL with no path"
        )));
    }

    Ok(url)
}

// Locator utility JSON shapes. Fields the utility omits default to the
// non-selectable value.

#[derive(Debug, Deserialize)]
struct LocatorReport {
    #[serde(default)]
    results: HashMap<String, LocatorScopeResults>,
}

#[derive(Debug, Deserialize)]
struct LocatorScopeResults {
    #[serde(rename = "saved servers")]
    saved_servers: Option<SavedServers>,
}

#[derive(Debug, Deserialize)]
struct SavedServers {
    #[serde(rename = "all servers", default)]
    all_servers: Vec<SavedServer>,
}

#[derive(Debug, Deserialize)]
struct SavedServer {
    #[serde(default)]
    rank: i64,
    #[serde(default)]
    healthy: bool,
    #[serde(default)]
    favored: bool,
    hostport: Option<String>,
}

/// Pick the caching server host:port from one locator report, or None if no
/// saved server qualifies.
fn select_caching_server(report: &str, discovery: DiscoveryOptions) -> Result<Option<String>> {
    let report: LocatorReport = serde_json::from_str(report.trim())?;

    let Some(saved) = report
        .results
        .get(discovery.scope.key())
        .and_then(|scope| scope.saved_servers.as_ref())
    else {
        return Ok(None);
    };

    // scan in rank order so equal-rank entries resolve deterministically
    let mut candidates: Vec<&SavedServer> = saved.all_servers.iter().collect();
    candidates.sort_by_key(|server| server.rank);

    for server in candidates {
        let qualifies = server.healthy
            && (server.favored || !discovery.require_favored)
            && server.rank == discovery.preferred_rank;

        if !qualifies {
            continue;
        }

        if let Some(hostport) = &server.hostport {
            return Ok(Some(hostport.clone()));
        }
    }

    Ok(None)
}

/// Query the platform locator until a caching server turns up, retrying a
/// bounded number of times.
pub fn discover_caching_server(
    locator: &dyn CacheLocator,
    discovery: DiscoveryOptions,
) -> Result<String> {
    for attempt in 1..=LOCATOR_ATTEMPTS {
        if attempt > 1 {
            thread::sleep(Duration::from_millis(LOCATOR_RETRY_DELAY_MS));
        }

        let Some(report) = locator.locate() else {
            debug!("Caching server locator produced no output (attempt {attempt}/{LOCATOR_ATTEMPTS})");
            continue;
        };

        match select_caching_server(&report, discovery) {
            Ok(Some(hostport)) => {
                debug!("Discovered caching server at {hostport}");
                return Ok(format!("http://{hostport}"));
            }
            Ok(None) => {
                debug!("No qualifying caching server yet (attempt {attempt}/{LOCATOR_ATTEMPTS})");
            }
            Err(e) => {
                warn!("Unable to parse caching server locator output: {e}");
            }
        }
    }

    Err(Error::Config(
        "a caching server could not be discovered on this network".to_string(),
    ))
}
