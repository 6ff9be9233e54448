// src/resolver/mod.rs

//! Package resolution and reconciliation engine
//!
//! Turns raw package-record collections (one per metadata source or per
//! installed application) into a single deduplicated, precedence-resolved,
//! deterministically ordered package set plus aggregate statistics.
//!
//! Identity is `package_id` alone. Within a source and across sources the
//! same precedence rule applies: a mandatory record always beats an
//! optional one for the same id; same-flag ties keep the earlier-seen
//! record. The rule is idempotent and associative, and sources are merged
//! in input order, so the final set does not depend on worker scheduling.

use std::collections::BTreeMap;
use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::application::Application;
use crate::model::package::{Package, RawPackage};
use crate::model::size::BucketStats;
use crate::platform::PackageReceipts;

/// Hard cap on gather workers
const MAX_WORKER_CAP: usize = 16;

/// Workers per logical CPU; the gather workload is I/O-bound (filesystem
/// reads + plist parsing), not CPU-bound
const WORKERS_PER_CPU: usize = 4;

/// Which package classes the caller asked for.
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    pub mandatory: bool,
    pub optional: bool,
}

/// Per-run resolution behavior.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub selection: Selection,

    /// Re-process packages even when already installed
    pub force: bool,

    /// Download-only runs ignore local install state entirely
    pub download_only: bool,
}

/// An id-keyed package set preserving first-seen order, with mandatory
/// precedence applied on insert.
#[derive(Debug, Default)]
pub struct PackageSet {
    packages: Vec<Package>,
    index: HashMap<String, usize>,
}

impl PackageSet {
    pub fn new() -> Self {
        PackageSet::default()
    }

    /// Insert with precedence: mandatory always beats optional for the same
    /// id; same-flag ties keep the existing (earlier-seen) record. The
    /// record's first-seen position is retained either way.
    pub fn insert(&mut self, pkg: Package) {
        match self.index.get(&pkg.package_id) {
            None => {
                self.index.insert(pkg.package_id.clone(), self.packages.len());
                self.packages.push(pkg);
            }
            Some(&pos) => {
                let existing = &self.packages[pos];
                if pkg.mandatory && !existing.mandatory {
                    self.packages[pos] = pkg;
                }
            }
        }
    }

    pub fn merge(&mut self, other: PackageSet) {
        for pkg in other.packages {
            self.insert(pkg);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Consume into the final ordered sequence: mandatory first, then by
    /// download size, then by name. Stable, so equal keys keep their
    /// first-seen order.
    pub fn into_sorted(self) -> Vec<Package> {
        let mut packages = self.packages;
        packages.sort_by(|a, b| {
            (!a.mandatory, a.download_size, &a.name).cmp(&(!b.mandatory, b.download_size, &b.name))
        });
        packages
    }
}

/// Resolution engine over one or more raw package-record collections.
pub struct Resolver<'a> {
    options: ResolveOptions,
    receipts: &'a dyn PackageReceipts,
}

impl<'a> Resolver<'a> {
    pub fn new(options: ResolveOptions, receipts: &'a dyn PackageReceipts) -> Self {
        Resolver { options, receipts }
    }

    /// Normalize, filter, and dedup one source's raw records.
    pub fn resolve_source(&self, raw: &BTreeMap<String, RawPackage>) -> PackageSet {
        let mut set = PackageSet::new();

        for record in raw.values() {
            let pkg = Package::from_raw(record.clone());

            if !self.options.download_only
                && !self.options.force
                && pkg.is_installed(self.receipts)
            {
                debug!("Skipping already-installed package {}", pkg.name);
                continue;
            }

            if !self.selected(&pkg) {
                continue;
            }

            set.insert(pkg);
        }

        set
    }

    /// Mandatory/optional selection filter.
    fn selected(&self, pkg: &Package) -> bool {
        (pkg.mandatory && self.options.selection.mandatory)
            || (!pkg.mandatory && self.options.selection.optional)
    }

    /// Resolve every application concurrently, keeping per-application sets
    /// so callers can merge in input order or report per application.
    /// Results come back in input order regardless of worker scheduling.
    ///
    /// Worker failures propagate and abort the whole gather; a silently
    /// incomplete result is worse than a hard failure here.
    pub fn gather_by_app<'b>(
        &self,
        apps: &'b [Application],
    ) -> Result<Vec<(&'b Application, PackageSet)>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(gather_workers(num_cpus::get()))
            .build()
            .map_err(|e| Error::Config(format!("failed to build worker pool: {e}")))?;

        pool.install(|| {
            apps.par_iter()
                .map(|app| {
                    let set = match app.raw_packages()? {
                        Some(raw) => self.resolve_source(&raw),
                        None => PackageSet::new(),
                    };
                    info!("Processed content for {}", app.name);
                    Ok((app, set))
                })
                .collect()
        })
    }

}

/// Conservative worker limit: scales with logical CPUs, capped.
pub fn gather_workers(cpus: usize) -> usize {
    (cpus.max(1) * WORKERS_PER_CPU).min(MAX_WORKER_CAP)
}

/// Classify the final merged set into required/optional buckets. Classes
/// the caller never asked for stay empty even if stray packages of that
/// class reached the set.
pub fn bucket_stats(packages: &[Package], selection: Selection) -> (BucketStats, BucketStats) {
    let mut required = BucketStats::default();
    let mut optional = BucketStats::default();

    for pkg in packages {
        if selection.mandatory && pkg.mandatory {
            required.add(pkg);
        } else if selection.optional && !pkg.mandatory {
            optional.add(pkg);
        }
    }

    (required, optional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::package::FileCheck;
    use crate::model::size::Size;
    use crate::model::version::PackageVersion;

    struct NoReceipts;

    impl PackageReceipts for NoReceipts {
        fn installed_version(&self, _pkg_id: &str) -> Option<PackageVersion> {
            None
        }
    }

    const BOTH: Selection = Selection {
        mandatory: true,
        optional: true,
    };

    fn options(selection: Selection) -> ResolveOptions {
        ResolveOptions {
            selection,
            force: false,
            download_only: false,
        }
    }

    fn raw(name: &str, id: &str, mandatory: Option<bool>, size: u64) -> RawPackage {
        RawPackage {
            download_name: name.to_string(),
            package_id: id.to_string(),
            download_size: Some(size),
            installed_size: Some(size * 2),
            is_mandatory: mandatory,
            file_check: None,
            package_version: None,
        }
    }

    fn source(records: Vec<(&str, RawPackage)>) -> BTreeMap<String, RawPackage> {
        records
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn pkg(id: &str, mandatory: bool, size: u64) -> Package {
        let mut p = Package::from_raw(raw(&format!("{id}.pkg"), id, Some(mandatory), size));
        p.mandatory = mandatory;
        p
    }

    #[test]
    fn test_selection_filter_mandatory_only() {
        let resolver = Resolver::new(
            options(Selection {
                mandatory: true,
                optional: false,
            }),
            &NoReceipts,
        );

        let src = source(vec![
            ("a", raw("A.pkg", "id.a", Some(true), 10)),
            ("b", raw("B.pkg", "id.b", Some(false), 20)),
            ("c", raw("C.pkg", "id.c", Some(true), 30)),
        ]);

        let resolved = resolver.resolve_source(&src).into_sorted();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().all(|p| p.mandatory));
    }

    #[test]
    fn test_mandatory_precedence_within_source() {
        let resolver = Resolver::new(options(BOTH), &NoReceipts);

        // same id, optional seen first (BTreeMap orders by key)
        let src = source(vec![
            ("a_first", raw("A.pkg", "dup.id", Some(false), 50)),
            ("b_second", raw("B.pkg", "dup.id", Some(true), 100)),
        ]);

        let resolved = resolver.resolve_source(&src).into_sorted();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].mandatory);
        assert_eq!(resolved[0].download_size, Size::new(100));
    }

    #[test]
    fn test_same_flag_tie_keeps_earlier_seen() {
        let resolver = Resolver::new(options(BOTH), &NoReceipts);

        let src = source(vec![
            ("a_first", raw("First.pkg", "dup.id", Some(true), 10)),
            ("b_second", raw("Second.pkg", "dup.id", Some(true), 20)),
        ]);

        let resolved = resolver.resolve_source(&src).into_sorted();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "First.pkg");
    }

    #[test]
    fn test_merge_idempotence() {
        let mut a = PackageSet::new();
        a.insert(pkg("x", true, 100));
        a.insert(pkg("y", false, 50));

        let mut again = PackageSet::new();
        again.insert(pkg("x", true, 100));
        again.insert(pkg("y", false, 50));

        let mut merged = PackageSet::new();
        merged.merge(a);
        merged.merge(again);

        let out = merged.into_sorted();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out.iter().map(|p| p.download_size).sum::<Size>(),
            Size::new(150)
        );
    }

    #[test]
    fn test_merge_order_independence() {
        let build = |ids: &[(&str, bool)]| {
            let mut set = PackageSet::new();
            for (id, mandatory) in ids {
                set.insert(pkg(id, *mandatory, 10));
            }
            set
        };

        // partition {a,b+,c} into groups and merge in both orders
        let mut left = PackageSet::new();
        left.merge(build(&[("a", false), ("b", true)]));
        left.merge(build(&[("b", false), ("c", false)]));

        let mut right = PackageSet::new();
        right.merge(build(&[("b", false), ("c", false)]));
        right.merge(build(&[("a", false), ("b", true)]));

        let left_out = left.into_sorted();
        let right_out = right.into_sorted();

        let flags = |pkgs: &[Package]| {
            let mut v: Vec<(String, bool)> = pkgs
                .iter()
                .map(|p| (p.package_id.clone(), p.mandatory))
                .collect();
            v.sort();
            v
        };

        assert_eq!(flags(&left_out), flags(&right_out));
        assert!(left_out.iter().any(|p| p.package_id == "b" && p.mandatory));
    }

    #[test]
    fn test_mandatory_precedence_across_sources() {
        // two sources, same id "X": mandatory size 100 and optional size 50
        let resolver = Resolver::new(options(BOTH), &NoReceipts);

        let src_a = source(vec![("x", raw("X.pkg", "X", Some(true), 100))]);
        let src_b = source(vec![("x", raw("X.pkg", "X", Some(false), 50))]);

        // both merge orders retain the mandatory record
        for sources in [[&src_a, &src_b], [&src_b, &src_a]] {
            let mut merged = PackageSet::new();
            for src in sources {
                merged.merge(resolver.resolve_source(src));
            }

            let out = merged.into_sorted();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].package_id, "X");
            assert!(out[0].mandatory);
            assert_eq!(out[0].download_size, Size::new(100));
        }
    }

    #[test]
    fn test_final_ordering_mandatory_first_then_size_then_name() {
        let mut set = PackageSet::new();
        set.insert(pkg("opt.big", false, 500));
        set.insert(pkg("man.small", true, 10));
        set.insert(pkg("man.big", true, 500));
        set.insert(pkg("opt.small", false, 10));

        let out = set.into_sorted();
        let ids: Vec<&str> = out.iter().map(|p| p.package_id.as_str()).collect();
        assert_eq!(ids, vec!["man.small", "man.big", "opt.small", "opt.big"]);
    }

    #[test]
    fn test_installed_packages_are_skipped_unless_forced_or_download_only() {
        let sentinel = tempfile::NamedTempFile::new().unwrap();
        let sentinel_path = sentinel.path().to_str().unwrap().to_string();

        let installed = |name: &str| {
            let mut record = raw(name, "installed.id", Some(true), 10);
            record.file_check = Some(FileCheck::One(sentinel_path.clone()));
            record
        };

        let src = source(vec![("a", installed("A.pkg"))]);

        // default: skipped
        let resolver = Resolver::new(options(BOTH), &NoReceipts);
        assert!(resolver.resolve_source(&src).is_empty());

        // force: included
        let mut forced = options(BOTH);
        forced.force = true;
        let resolver = Resolver::new(forced, &NoReceipts);
        assert_eq!(resolver.resolve_source(&src).len(), 1);

        // download-only: included regardless of local state
        let mut download_only = options(BOTH);
        download_only.download_only = true;
        let resolver = Resolver::new(download_only, &NoReceipts);
        assert_eq!(resolver.resolve_source(&src).len(), 1);
    }

    #[test]
    fn test_bucket_stats_classification() {
        let packages = vec![pkg("a", true, 100), pkg("b", true, 200), pkg("c", false, 50)];

        let (required, optional) = bucket_stats(&packages, BOTH);
        assert_eq!(required.count, 2);
        assert_eq!(required.download, Size::new(300));
        assert_eq!(required.installed, Size::new(600));
        assert_eq!(optional.count, 1);
        assert_eq!(optional.download, Size::new(50));

        // class never requested stays empty
        let (required, optional) = bucket_stats(
            &packages,
            Selection {
                mandatory: true,
                optional: false,
            },
        );
        assert_eq!(required.count, 2);
        assert_eq!(optional.count, 0);
    }

    #[test]
    fn test_gather_workers_cap() {
        assert_eq!(gather_workers(1), 4);
        assert_eq!(gather_workers(2), 8);
        assert_eq!(gather_workers(8), 16);
        assert_eq!(gather_workers(64), 16);
        assert_eq!(gather_workers(0), 4);
    }
}
