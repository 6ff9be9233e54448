// src/context.rs

//! Run configuration and orchestration
//!
//! Ties the discovery, resolution, server-selection, and acquisition stages
//! together for one run. Expensive lookups (content server, application
//! discovery) are resolved once and memoized on the context.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use once_cell::sync::OnceCell;
use serde_json::json;
use tracing::{info, warn};

use crate::acquire::{AcquireOptions, Acquirer};
use crate::audit::AuditLog;
use crate::error::{Error, Result};
use crate::model::application::{Application, KNOWN_APPLICATIONS};
use crate::platform::MacosPlatform;
use crate::resolver::{self, PackageSet, ResolveOptions, Resolver, Selection};
use crate::server::{self, CacheOption, DiscoveryOptions, PackageServer};
use crate::source::SourceReader;

/// Default working/destination directory.
pub const DEFAULT_DESTINATION: &str = "/tmp/loopdown";

/// Schema version tag on scan output.
const SCAN_SCHEMA_VERSION: &str = "1";

/// What this run does with the resolved package set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Download and install.
    Deploy,
    /// Download into a local mirror of the origin's path layout.
    Download,
    /// Report resolved packages as JSON, touching nothing.
    Scan,
}

impl Action {
    pub fn installs(self) -> bool {
        self == Action::Deploy
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Deploy => "deploy",
            Action::Download => "download",
            Action::Scan => "scan",
        }
    }
}

/// Fully parsed run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub action: Action,
    /// Application short codes, or `all`.
    pub apps: Vec<String>,
    /// Explicit metadata sources: local paths or remote source names.
    pub plists: Vec<String>,
    pub selection: Selection,
    pub force: bool,
    pub dry_run: bool,
    pub quiet: bool,
    pub destination: PathBuf,
    pub mirror: Option<String>,
    pub cache: Option<CacheOption>,
    pub skip_signature_precheck: bool,
    pub audit_path: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.apps.is_empty() && self.plists.is_empty() {
            return Err(Error::Config(
                "nothing to process: select applications or metadata sources".to_string(),
            ));
        }

        if !self.selection.mandatory && !self.selection.optional {
            return Err(Error::Config(
                "nothing to process: select mandatory and/or optional packages".to_string(),
            ));
        }

        if self.mirror.is_some() && self.cache.is_some() {
            return Err(Error::Config(
                "a mirror server and a caching server cannot both be used".to_string(),
            ));
        }

        for app in &self.apps {
            let known = app.eq_ignore_ascii_case("all")
                || KNOWN_APPLICATIONS
                    .iter()
                    .any(|(_, short, _)| app.eq_ignore_ascii_case(short));
            if !known {
                let codes: Vec<&str> =
                    KNOWN_APPLICATIONS.iter().map(|(_, short, _)| *short).collect();
                return Err(Error::Config(format!(
                    "unknown application {app:?}, expected one of {} or 'all'",
                    codes.join(", ")
                )));
            }
        }

        Ok(())
    }
}

/// One run's worth of state.
pub struct Context {
    config: Config,
    platform: MacosPlatform,
    audit: AuditLog,
    server: OnceCell<PackageServer>,
    applications: OnceCell<Vec<Application>>,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let audit = AuditLog::new(config.audit_path.clone());

        Ok(Context {
            config,
            platform: MacosPlatform,
            audit,
            server: OnceCell::new(),
            applications: OnceCell::new(),
        })
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn run(&self) -> Result<()> {
        match self.config.action {
            Action::Scan => self.scan(),
            Action::Deploy | Action::Download => self.process_content(),
        }
    }

    /// Content server for this run, resolved once. Download-only runs always
    /// fetch from the origin; mirror and caching options belong to deploys.
    fn server(&self) -> Result<&PackageServer> {
        self.server.get_or_try_init(|| {
            if self.config.action == Action::Download {
                return Ok(PackageServer::Origin);
            }
            let server = server::resolve_server(
                self.config.mirror.as_deref(),
                self.config.cache.as_ref(),
                &self.platform,
                DiscoveryOptions::default(),
            )?;
            info!("Using {}", server.describe());
            Ok(server)
        })
    }

    /// Installed applications matching the configured short codes.
    fn applications(&self) -> &Vec<Application> {
        self.applications.get_or_init(|| {
            if self.config.apps.is_empty() {
                return Vec::new();
            }

            let all = self.config.apps.iter().any(|a| a.eq_ignore_ascii_case("all"));
            let installed = Application::discover_installed();

            let selected: Vec<Application> = installed
                .into_iter()
                .filter(|app| {
                    all || self
                        .config
                        .apps
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(&app.short_name))
                })
                .collect();

            if selected.is_empty() {
                warn!("None of the selected applications are installed");
            }

            selected
        })
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(
            ResolveOptions {
                selection: self.config.selection,
                force: self.config.force,
                download_only: self.config.action == Action::Download,
            },
            &self.platform,
        )
    }

    /// Resolve every configured source into the final merged package set.
    ///
    /// A bad explicit source is reported and skipped unless it is the only
    /// one; an empty final set ends the run with nothing-to-do.
    fn gather(&self) -> Result<Vec<crate::model::Package>> {
        let resolver = self.resolver();
        let mut merged = PackageSet::new();

        for (app, set) in resolver.gather_by_app(self.applications())? {
            info!("{} contributed {} package(s)", app.name, set.len());
            merged.merge(set);
        }

        if !self.config.plists.is_empty() {
            let reader = SourceReader::new()?;
            let sole_source = self.applications().is_empty() && self.config.plists.len() == 1;

            for name in &self.config.plists {
                match reader.read(name) {
                    Ok(raw) => merged.merge(resolver.resolve_source(&raw)),
                    Err(e) if sole_source => return Err(e),
                    Err(e) => eprintln!("Skipping metadata source {name}: {e}"),
                }
            }
        }

        if merged.is_empty() {
            return Err(Error::NothingToDo);
        }

        Ok(merged.into_sorted())
    }

    fn process_content(&self) -> Result<()> {
        let packages = self.gather()?;
        self.print_statement(&packages);

        let server = self.server()?.clone();
        let acquirer = Acquirer::new(
            server,
            &self.platform,
            &self.platform,
            &self.audit,
            AcquireOptions {
                install: self.config.action.installs(),
                dry_run: self.config.dry_run,
                destination: self.config.destination.clone(),
                quiet: self.config.quiet,
                skip_signature_precheck: self.config.skip_signature_precheck,
            },
        )?;

        acquirer.preflight_space(&packages)?;
        let report = acquirer.process(&packages)?;

        if self.config.action == Action::Deploy && !self.config.dry_run {
            cleanup_working_directory(&self.config.destination);
        }

        if !self.config.quiet && !self.config.dry_run {
            println!(
                "Processed {} of {} package(s)",
                report.succeeded.len(),
                report.attempted
            );
        }

        if report.many_failures() && !report.failed.is_empty() {
            eprintln!(
                "Warning: {} of {} package(s) failed to process; check the network and server configuration",
                report.failed.len(),
                report.attempted
            );
        }

        if !report.failed.is_empty() {
            return Err(Error::Download {
                name: format!("{} package(s)", report.failed.len()),
                reason: "see errors above".to_string(),
            });
        }

        Ok(())
    }

    /// Pre-run statement of what the selection amounts to.
    fn print_statement(&self, packages: &[crate::model::Package]) {
        if self.config.quiet {
            return;
        }

        let (required, optional) = resolver::bucket_stats(packages, self.config.selection);
        let verb = match (self.config.dry_run, self.config.action.installs()) {
            (true, true) => "would be downloaded and installed",
            (true, false) => "would be downloaded",
            (false, true) => "will be downloaded and installed",
            (false, false) => "will be downloaded",
        };

        println!(
            "{} package(s) {verb}: {} required ({} download, {} installed), {} optional ({} download, {} installed)",
            packages.len(),
            required.count,
            required.download,
            required.installed,
            optional.count,
            optional.download,
            optional.installed,
        );
    }

    /// Emit the scan report: one JSON document on stdout describing each
    /// application's resolved packages.
    fn scan(&self) -> Result<()> {
        let resolver = self.resolver();
        let per_app = resolver.gather_by_app(self.applications())?;

        let mut apps = Vec::new();
        for (app, set) in per_app {
            apps.push(json!({
                "name": app.name.clone(),
                "short_name": app.short_name.clone(),
                "version": app.version.clone(),
                "packages": set.into_sorted(),
            }));
        }

        if !self.config.plists.is_empty() {
            let reader = SourceReader::new()?;
            let sole_source = self.applications().is_empty() && self.config.plists.len() == 1;

            for name in &self.config.plists {
                let raw = match reader.read(name) {
                    Ok(raw) => raw,
                    Err(e) if sole_source => return Err(e),
                    Err(e) => {
                        eprintln!("Skipping metadata source {name}: {e}");
                        continue;
                    }
                };
                apps.push(json!({
                    "name": name,
                    "short_name": serde_json::Value::Null,
                    "version": serde_json::Value::Null,
                    "packages": resolver.resolve_source(&raw).into_sorted(),
                }));
            }
        }

        let report = json!({
            "_version": SCAN_SCHEMA_VERSION,
            "mode": "scan",
            "generated_at": Utc::now().to_rfc3339(),
            "run_id": self.audit.run_id().to_string(),
            "apps": apps,
        });

        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

/// Remove the working directory, best-effort. Used on normal deploy exits
/// and from the interrupt handler.
pub fn cleanup_working_directory(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(path) {
        warn!(
            "Unable to remove working directory {}: {}",
            path.display(),
            e
        );
    }
}
