// src/acquire/mod.rs

//! Package acquisition engine
//!
//! Downloads resolved packages sequentially through the selected content
//! server, verifies each artifact, and optionally hands it to the platform
//! installer. Transfers are resumable: a partial artifact left behind by a
//! failed or interrupted run is continued with a ranged request rather than
//! restarted, so partial files are deliberately kept on transfer failure.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::error::{Error, Result};
use crate::model::package::Package;
use crate::model::size::Size;
use crate::platform::{self, PkgInstaller, SignatureVerifier};
use crate::server::PackageServer;

/// Maximum retry attempts for failed transfers
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 2000;

/// Connection timeout in seconds; no overall timeout since content packages
/// run to tens of gigabytes
const CONNECT_TIMEOUT_SECS: u64 = 20;

/// A transfer averaging below this rate over a full measurement window is
/// considered stalled and aborted
const STALL_MIN_BYTES_PER_SEC: u64 = 300;

/// Stall measurement window in seconds
const STALL_WINDOW_SECS: u64 = 30;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// HTTP client wrapper with resume and retry support.
pub struct DownloadClient {
    client: Client,
    max_retries: u32,
}

impl DownloadClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Download `url` to `dest_path`, resuming any existing partial file,
    /// with bounded retries. The partial file is kept on failure so a later
    /// attempt can resume from where this one stopped.
    pub fn download(&self, url: &str, dest_path: &Path) -> Result<()> {
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transfer(url, dest_path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    warn!(
                        "Transfer attempt {}/{} for {} failed: {}, retrying in {}ms",
                        attempt, self.max_retries, url, e, RETRY_DELAY_MS
                    );
                    thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                }
            }
        }
    }

    /// One transfer attempt, ranged when a partial artifact exists.
    fn transfer(&self, url: &str, dest_path: &Path) -> Result<()> {
        let resume_from = fs::metadata(dest_path).map(|m| m.len()).unwrap_or(0);

        let mut request = self.client.get(url);
        if resume_from > 0 {
            debug!("Resuming {} from byte {}", url, resume_from);
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }

        let mut response = request.send()?;

        let mut file = match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                OpenOptions::new().append(true).open(dest_path)?
            }
            StatusCode::OK => File::create(dest_path)?,
            // the ranged offset is already at or past EOF
            StatusCode::RANGE_NOT_SATISFIABLE if resume_from > 0 => {
                debug!("{} already fully transferred", dest_path.display());
                return Ok(());
            }
            status => {
                return Err(Error::Download {
                    name: artifact_name(dest_path),
                    reason: format!("HTTP {status} from {url}"),
                });
            }
        };

        let mut guard = StallGuard::new();
        let mut buf = [0u8; COPY_BUFFER_SIZE];

        loop {
            let n = response.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;

            if let Some(rate) = guard.record(n as u64) {
                return Err(Error::Download {
                    name: artifact_name(dest_path),
                    reason: format!(
                        "transfer stalled at {rate} B/s (minimum {STALL_MIN_BYTES_PER_SEC} B/s over {STALL_WINDOW_SECS}s)"
                    ),
                });
            }
        }

        file.flush()?;
        Ok(())
    }
}

/// Tracks throughput over fixed windows; reports the offending rate once a
/// full window averages below the stall floor.
struct StallGuard {
    window_start: Instant,
    window_bytes: u64,
}

impl StallGuard {
    fn new() -> Self {
        StallGuard {
            window_start: Instant::now(),
            window_bytes: 0,
        }
    }

    fn record(&mut self, bytes: u64) -> Option<u64> {
        self.window_bytes += bytes;

        let elapsed = self.window_start.elapsed().as_secs();
        if elapsed < STALL_WINDOW_SECS {
            return None;
        }

        let rate = self.window_bytes / elapsed.max(1);
        if rate < STALL_MIN_BYTES_PER_SEC {
            return Some(rate);
        }

        self.window_start = Instant::now();
        self.window_bytes = 0;
        None
    }
}

fn artifact_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Per-run acquisition behavior.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Install each verified artifact and delete it afterwards.
    pub install: bool,
    pub dry_run: bool,
    /// Root directory artifacts are written under, mirroring the remote
    /// path layout.
    pub destination: PathBuf,
    pub quiet: bool,
    /// Skip re-verification of artifacts already present from a prior run.
    pub skip_signature_precheck: bool,
}

/// Outcome of one acquisition pass.
#[derive(Debug, Default)]
pub struct AcquireReport {
    pub attempted: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl AcquireReport {
    /// More failures than successes warrants a distinguished warning.
    pub fn many_failures(&self) -> bool {
        self.failed.len() > self.attempted / 2
    }
}

/// Sequential package acquisition over a resolved server.
pub struct Acquirer<'a> {
    client: DownloadClient,
    server: PackageServer,
    verifier: &'a dyn SignatureVerifier,
    installer: &'a dyn PkgInstaller,
    audit: &'a AuditLog,
    options: AcquireOptions,
}

impl<'a> Acquirer<'a> {
    pub fn new(
        server: PackageServer,
        verifier: &'a dyn SignatureVerifier,
        installer: &'a dyn PkgInstaller,
        audit: &'a AuditLog,
        options: AcquireOptions,
    ) -> Result<Self> {
        Ok(Acquirer {
            client: DownloadClient::new()?,
            server,
            verifier,
            installer,
            audit,
            options,
        })
    }

    /// Check free space at the destination against the run's total before
    /// any transfer starts. Fatal for real runs, informational for dry runs.
    pub fn preflight_space(&self, packages: &[Package]) -> Result<()> {
        // a dry run touches nothing; probe the nearest existing ancestor
        let probe = if self.options.dry_run {
            nearest_existing_ancestor(&self.options.destination)
        } else {
            fs::create_dir_all(&self.options.destination)?;
            self.options.destination.clone()
        };

        let mut required: Size = packages.iter().map(|p| p.download_size).sum();
        if self.options.install {
            required = required + packages.iter().map(|p| p.installed_size).sum::<Size>();
        }

        let available = Size::new(platform::disk_space_available(&probe)?);

        if required > available {
            if self.options.dry_run {
                eprintln!(
                    "Insufficient free space for this selection: {required} required, {available} available"
                );
                return Ok(());
            }
            return Err(Error::InsufficientSpace {
                required,
                available,
            });
        }

        debug!("Space preflight passed: {required} required, {available} available");
        Ok(())
    }

    /// Process every package in order. Per-package failures are recorded and
    /// the run continues; only I/O failures outside the transfer path abort.
    pub fn process(&self, packages: &[Package]) -> Result<AcquireReport> {
        let mut report = AcquireReport {
            attempted: packages.len(),
            ..AcquireReport::default()
        };

        let total = packages.len();
        let width = total.to_string().len();

        for (idx, pkg) in packages.iter().enumerate() {
            self.progress_line(idx + 1, total, width, pkg);

            if self.options.dry_run {
                continue;
            }

            match self.acquire_one(pkg) {
                Ok(()) => report.succeeded.push(pkg.name.clone()),
                Err(e) => {
                    let reason = e.to_string();
                    eprintln!("Failed to process {}: {}", pkg.name, reason);
                    self.audit.package_event("failure", &pkg.name, &reason);
                    report.failed.push((pkg.name.clone(), reason));
                }
            }
        }

        Ok(report)
    }

    fn progress_line(&self, idx: usize, total: usize, width: usize, pkg: &Package) {
        if self.options.quiet {
            return;
        }

        if self.options.install {
            println!(
                "{:>width$} of {} - {} ({} download, {} installed)",
                idx, total, pkg.name, pkg.download_size, pkg.installed_size,
            );
        } else {
            println!(
                "{:>width$} of {} - {} ({} download)",
                idx, total, pkg.name, pkg.download_size,
            );
        }
    }

    fn acquire_one(&self, pkg: &Package) -> Result<()> {
        let dest = self.options.destination.join(&pkg.download_path);

        // an already-verified artifact from a prior run needs no transfer;
        // a leftover partial is not a failure, just a transfer to resume
        if !self.options.skip_signature_precheck
            && dest.is_file()
            && self.check_artifact(pkg, &dest).is_ok()
        {
            info!("Reusing verified artifact {}", dest.display());
            self.finish(pkg, &dest)?;
            return Ok(());
        }

        let url = self.server.package_url(&pkg.download_path);
        self.client.download(&url, &dest)?;
        self.audit
            .package_event("download", &pkg.name, &dest.display().to_string());

        self.verify(pkg, &dest)?;
        self.finish(pkg, &dest)
    }

    /// Install the verified artifact if this run installs, deleting it
    /// afterwards either way: a verified-but-uninstallable artifact will
    /// never install on retry, so keeping it only wastes space.
    fn finish(&self, pkg: &Package, dest: &Path) -> Result<()> {
        if !self.options.install {
            return Ok(());
        }

        let installed = self.installer.install(dest);
        fs::remove_file(dest)?;

        match installed {
            Ok(true) => {
                self.audit
                    .package_event("install", &pkg.name, &dest.display().to_string());
                Ok(())
            }
            Ok(false) => Err(Error::CommandFailed {
                program: crate::platform::INSTALLER.to_string(),
                reason: format!("installer rejected {}", pkg.name),
            }),
            Err(e) => Err(e),
        }
    }

    /// Post-transfer verification; failures are written to the audit log.
    fn verify(&self, pkg: &Package, dest: &Path) -> Result<()> {
        let outcome = self.check_artifact(pkg, dest);
        if let Err(Error::Verification { reason, .. }) = &outcome {
            self.audit.package_event("verify-failed", &pkg.name, reason);
        }
        outcome
    }

    /// Artifact must exist, be non-empty, and not be positively unsigned.
    /// An unverifiable signature (platform tool unavailable) is logged and
    /// tolerated; a failing one is not. Failed artifacts are kept so a
    /// resumed transfer can repair a truncated file.
    fn check_artifact(&self, pkg: &Package, dest: &Path) -> Result<()> {
        let size = fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(Error::Verification {
                name: pkg.name.clone(),
                reason: "artifact is empty".to_string(),
            });
        }

        match self.verifier.is_signed(dest) {
            Some(true) => Ok(()),
            Some(false) => Err(Error::Verification {
                name: pkg.name.clone(),
                reason: "package signature check failed".to_string(),
            }),
            None => {
                warn!("Unable to verify signature of {}", dest.display());
                Ok(())
            }
        }
    }
}

fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    let mut current = path;
    while !current.exists() {
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return PathBuf::from("."),
        }
    }
    current.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::package::RawPackage;
    use crate::server::PackageServer;
    use std::cell::RefCell;
    use url::Url;

    fn test_client() -> DownloadClient {
        DownloadClient {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            max_retries: 1,
        }
    }

    fn pkg(name: &str, download: u64, installed: u64) -> Package {
        Package::from_raw(RawPackage {
            download_name: name.to_string(),
            package_id: format!("id.{name}"),
            download_size: Some(download),
            installed_size: Some(installed),
            is_mandatory: Some(true),
            file_check: None,
            package_version: None,
        })
    }

    struct StubVerifier(Option<bool>);

    impl SignatureVerifier for StubVerifier {
        fn is_signed(&self, _path: &Path) -> Option<bool> {
            self.0
        }
    }

    struct RecordingInstaller {
        result: bool,
        installed: RefCell<Vec<PathBuf>>,
    }

    impl RecordingInstaller {
        fn new(result: bool) -> Self {
            RecordingInstaller {
                result,
                installed: RefCell::new(Vec::new()),
            }
        }
    }

    impl PkgInstaller for RecordingInstaller {
        fn install(&self, pkg: &Path) -> Result<bool> {
            self.installed.borrow_mut().push(pkg.to_path_buf());
            Ok(self.result)
        }
    }

    fn acquirer<'a>(
        server: PackageServer,
        verifier: &'a StubVerifier,
        installer: &'a RecordingInstaller,
        audit: &'a AuditLog,
        options: AcquireOptions,
    ) -> Acquirer<'a> {
        Acquirer {
            client: test_client(),
            server,
            verifier,
            installer,
            audit,
            options,
        }
    }

    fn options(dest: &Path, install: bool) -> AcquireOptions {
        AcquireOptions {
            install,
            dry_run: false,
            destination: dest.to_path_buf(),
            quiet: true,
            skip_signature_precheck: false,
        }
    }

    #[test]
    fn test_download_writes_file() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/lp10_ms3_content_2016/a.pkg")
            .with_status(200)
            .with_body(b"package-bytes")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pkg");

        let url = format!("{}/lp10_ms3_content_2016/a.pkg", server.url());
        test_client().download(&url, &dest).unwrap();

        mock.assert();
        assert_eq!(fs::read(&dest).unwrap(), b"package-bytes");
    }

    #[test]
    fn test_download_resumes_partial_file() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/a.pkg")
            .match_header("range", "bytes=7-")
            .with_status(206)
            .with_body(b"-bytes")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pkg");
        fs::write(&dest, b"package").unwrap();

        let url = format!("{}/a.pkg", server.url());
        test_client().download(&url, &dest).unwrap();

        mock.assert();
        assert_eq!(fs::read(&dest).unwrap(), b"package-bytes");
    }

    #[test]
    fn test_download_range_not_satisfiable_means_complete() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/a.pkg")
            .with_status(416)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pkg");
        fs::write(&dest, b"already-complete").unwrap();

        let url = format!("{}/a.pkg", server.url());
        test_client().download(&url, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"already-complete");
    }

    #[test]
    fn test_download_http_error_keeps_partial_file() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/a.pkg").with_status(404).create();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pkg");
        fs::write(&dest, b"partial").unwrap();

        let url = format!("{}/a.pkg", server.url());
        let err = test_client().download(&url, &dest).unwrap_err();
        assert!(matches!(err, Error::Download { .. }));
        assert_eq!(fs::read(&dest).unwrap(), b"partial");
    }

    #[test]
    fn test_process_download_only() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/lp10_ms3_content_2016/A.pkg")
            .with_status(200)
            .with_body(b"content-a")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let mirror = PackageServer::Mirror(Url::parse(&server.url()).unwrap());
        let acq = acquirer(mirror, &verifier, &installer, &audit, options(dir.path(), false));

        let report = acq.process(&[pkg("A.pkg", 9, 18)]).unwrap();
        assert_eq!(report.succeeded, vec!["A.pkg"]);
        assert!(report.failed.is_empty());
        assert!(!report.many_failures());

        // download mode keeps the artifact, mirroring the remote layout
        let artifact = dir.path().join("lp10_ms3_content_2016/A.pkg");
        assert_eq!(fs::read(&artifact).unwrap(), b"content-a");
        assert!(installer.installed.borrow().is_empty());
    }

    #[test]
    fn test_process_install_removes_artifact() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/lp10_ms3_content_2016/A.pkg")
            .with_status(200)
            .with_body(b"content-a")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let mirror = PackageServer::Mirror(Url::parse(&server.url()).unwrap());
        let acq = acquirer(mirror, &verifier, &installer, &audit, options(dir.path(), true));

        let report = acq.process(&[pkg("A.pkg", 9, 18)]).unwrap();
        assert_eq!(report.succeeded, vec!["A.pkg"]);
        assert_eq!(installer.installed.borrow().len(), 1);
        assert!(!dir.path().join("lp10_ms3_content_2016/A.pkg").exists());
    }

    #[test]
    fn test_failed_signature_keeps_artifact_and_records_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/lp10_ms3_content_2016/A.pkg")
            .with_status(200)
            .with_body(b"tampered")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let verifier = StubVerifier(Some(false));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let mirror = PackageServer::Mirror(Url::parse(&server.url()).unwrap());
        let acq = acquirer(mirror, &verifier, &installer, &audit, options(dir.path(), true));

        let report = acq.process(&[pkg("A.pkg", 8, 16)]).unwrap();
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(report.many_failures());
        assert!(installer.installed.borrow().is_empty());

        // kept for a future resume attempt
        assert!(dir.path().join("lp10_ms3_content_2016/A.pkg").exists());
    }

    #[test]
    fn test_uninstallable_artifact_is_deleted() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/lp10_ms3_content_2016/A.pkg")
            .with_status(200)
            .with_body(b"content-a")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(false);
        let audit = AuditLog::disabled();

        let mirror = PackageServer::Mirror(Url::parse(&server.url()).unwrap());
        let acq = acquirer(mirror, &verifier, &installer, &audit, options(dir.path(), true));

        let report = acq.process(&[pkg("A.pkg", 9, 18)]).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(!dir.path().join("lp10_ms3_content_2016/A.pkg").exists());
    }

    #[test]
    fn test_existing_verified_artifact_skips_download() {
        // no mock configured: any request would fail, so success proves the
        // transfer was skipped
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("lp10_ms3_content_2016/A.pkg");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, b"already-here").unwrap();

        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let acq = acquirer(
            PackageServer::Origin,
            &verifier,
            &installer,
            &audit,
            options(dir.path(), false),
        );

        let report = acq.process(&[pkg("A.pkg", 12, 24)]).unwrap();
        assert_eq!(report.succeeded, vec!["A.pkg"]);
    }

    #[test]
    fn test_dry_run_transfers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let mut opts = options(dir.path(), true);
        opts.dry_run = true;
        let acq = acquirer(PackageServer::Origin, &verifier, &installer, &audit, opts);

        let report = acq.process(&[pkg("A.pkg", 9, 18), pkg("B.pkg", 5, 10)]).unwrap();
        assert_eq!(report.attempted, 2);
        assert!(report.succeeded.is_empty());
        assert!(report.failed.is_empty());
        assert!(installer.installed.borrow().is_empty());
    }

    #[test]
    fn test_preflight_space_dry_run_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let mut opts = options(dir.path(), false);
        opts.dry_run = true;
        let acq = acquirer(PackageServer::Origin, &verifier, &installer, &audit, opts);

        // an absurd requirement still passes preflight in a dry run
        let huge = pkg("A.pkg", u64::MAX / 2, 0);
        acq.preflight_space(&[huge]).unwrap();
    }

    #[test]
    fn test_preflight_space_dry_run_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("work/packages");
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let mut opts = options(&dest, false);
        opts.dry_run = true;
        let acq = acquirer(PackageServer::Origin, &verifier, &installer, &audit, opts);

        acq.preflight_space(&[pkg("A.pkg", 10, 0)]).unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn test_resumed_partial_leaves_no_failure_audit_trail() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/lp10_ms3_content_2016/A.pkg")
            .with_status(200)
            .with_body(b"content-a")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("lp10_ms3_content_2016/A.pkg");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, b"").unwrap();

        let audit_path = dir.path().join("audit.log");
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::new(Some(audit_path.clone()));

        let mirror = PackageServer::Mirror(Url::parse(&server.url()).unwrap());
        let acq = acquirer(mirror, &verifier, &installer, &audit, options(dir.path(), false));

        let report = acq.process(&[pkg("A.pkg", 9, 18)]).unwrap();
        assert_eq!(report.succeeded, vec!["A.pkg"]);

        // the leftover zero-byte file is resumed, not reported as a failure
        let trail = fs::read_to_string(&audit_path).unwrap();
        assert!(trail.contains("\"download\""));
        assert!(!trail.contains("verify-failed"));
    }

    #[test]
    fn test_preflight_space_fails_real_run() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = StubVerifier(Some(true));
        let installer = RecordingInstaller::new(true);
        let audit = AuditLog::disabled();

        let acq = acquirer(
            PackageServer::Origin,
            &verifier,
            &installer,
            &audit,
            options(dir.path(), false),
        );

        let huge = pkg("A.pkg", u64::MAX / 2, 0);
        let err = acq.preflight_space(&[huge]).unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace { .. }));
    }

    #[test]
    fn test_many_failures_threshold() {
        let mut report = AcquireReport {
            attempted: 4,
            ..AcquireReport::default()
        };
        report.failed.push(("a".into(), "x".into()));
        report.failed.push(("b".into(), "x".into()));
        assert!(!report.many_failures());

        report.failed.push(("c".into(), "x".into()));
        assert!(report.many_failures());
    }
}
