// src/platform/mod.rs

//! Platform collaborator boundary
//!
//! Thin wrappers around the macOS helper binaries the core depends on:
//! `pkgutil` for receipt queries and signature checks, `installer` for
//! package installation, and `AssetCacheLocatorUtil` for caching-proxy
//! discovery. Each concern sits behind a trait so resolution and
//! acquisition are testable without the host tools.

use std::path::Path;
use std::process::{Command, Output};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::version::PackageVersion;

pub const PKGUTIL: &str = "/usr/sbin/pkgutil";
pub const INSTALLER: &str = "/usr/sbin/installer";
pub const ASSET_CACHE_LOCATOR: &str = "/usr/bin/AssetCacheLocatorUtil";

/// Query the platform package database for installed receipt versions.
pub trait PackageReceipts: Sync {
    /// Installed version for a package id, or `None` when no receipt exists.
    fn installed_version(&self, pkg_id: &str) -> Option<PackageVersion>;
}

/// Post-transfer code-signature verification.
pub trait SignatureVerifier {
    /// `Some(true)` for a valid publisher signature, `Some(false)` for an
    /// invalid or incomplete artifact, `None` when verification is not
    /// possible on this host.
    fn is_signed(&self, path: &Path) -> Option<bool>;
}

/// Install a verified artifact onto the local system.
pub trait PkgInstaller {
    fn install(&self, pkg: &Path) -> Result<bool>;
}

/// Caching-proxy locator output, raw JSON to be parsed by server resolution.
pub trait CacheLocator {
    fn locate(&self) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct ReceiptInfo {
    #[serde(rename = "pkg-version")]
    version: Option<String>,
}

/// Production implementation backed by the macOS helper binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacosPlatform;

impl MacosPlatform {
    fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let output = Command::new(program).args(args).output()?;

        if !output.status.success() {
            debug!(
                "{} {} exited with {}; stderr: {}",
                program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output)
    }
}

impl PackageReceipts for MacosPlatform {
    fn installed_version(&self, pkg_id: &str) -> Option<PackageVersion> {
        let output = self.run(PKGUTIL, &["--pkg-info-plist", pkg_id]).ok()?;

        if !output.status.success() {
            // no receipt for this id
            return None;
        }

        let info: ReceiptInfo = plist::from_bytes(&output.stdout)
            .map_err(|e| debug!("unreadable receipt for '{pkg_id}': {e}"))
            .ok()?;

        info.version.as_deref().map(PackageVersion::parse)
    }
}

impl SignatureVerifier for MacosPlatform {
    fn is_signed(&self, path: &Path) -> Option<bool> {
        let path_str = path.to_str()?;
        let output = match self.run(PKGUTIL, &["--check-signature", path_str]) {
            Ok(output) => output,
            // helper missing entirely; signature state is unknowable here
            Err(_) => return None,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let status = stdout
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix("Status: "));

        let signed = output.status.success() && status == Some("signed Apple Software");
        debug!(
            "signature status of '{}': {:?} -> signed={}",
            path.display(),
            status,
            signed
        );

        Some(signed)
    }
}

impl PkgInstaller for MacosPlatform {
    /// Invoke `installer` against a verified artifact. The install target is
    /// deliberately fixed to `/`; no other value is supported.
    fn install(&self, pkg: &Path) -> Result<bool> {
        let path_str = pkg.to_str().ok_or_else(|| Error::CommandFailed {
            program: INSTALLER.to_string(),
            reason: format!("non-UTF-8 package path: {}", pkg.display()),
        })?;

        let output = self.run(INSTALLER, &["-pkg", path_str, "-target", "/"])?;
        Ok(output.status.success())
    }
}

impl CacheLocator for MacosPlatform {
    fn locate(&self) -> Option<String> {
        let output = self.run(ASSET_CACHE_LOCATOR, &["--json"]).ok()?;

        if !output.status.success() {
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Free space on the volume containing `target`, in bytes.
pub fn disk_space_available(target: &Path) -> Result<u64> {
    Ok(fs2::available_space(target)?)
}
