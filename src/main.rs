// src/main.rs

use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::debug;

use loopdown::audit;
use loopdown::context::{self, Action, Config, Context};
use loopdown::lock::{DEFAULT_LOCK_PATH, InstanceLock};
use loopdown::resolver::Selection;
use loopdown::server::CacheOption;

#[derive(Parser)]
#[command(name = "loopdown")]
#[command(author, version, about = "Download, install, or report on Apple audio content packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SharedArgs {
    /// Applications to process: garageband, logicpro, mainstage, or all
    #[arg(short = 'a', long = "apps", value_name = "APP", num_args = 1..)]
    apps: Vec<String>,

    /// Metadata property list files (or remote feed names) to process
    #[arg(long = "plist", value_name = "PATH|NAME")]
    plists: Vec<String>,

    /// Include mandatory packages
    #[arg(short = 'r', long = "req", visible_alias = "mandatory")]
    mandatory: bool,

    /// Include optional packages
    #[arg(short = 'o', long = "opt", visible_alias = "optional")]
    optional: bool,

    /// Re-process packages even when already installed
    #[arg(short = 'f', long)]
    force: bool,

    /// Resolve and report without transferring anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Suppress progress output; errors still go to stderr
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Log level filter, e.g. info, debug, or loopdown=trace
    #[arg(long, value_name = "FILTER", default_value = "info")]
    log_level: String,

    /// Audit log file
    #[arg(long, value_name = "PATH", default_value = audit::DEFAULT_AUDIT_PATH)]
    audit_file: PathBuf,

    /// Disable the audit log
    #[arg(long)]
    no_audit: bool,

    /// Skip re-verification of artifacts left behind by earlier runs
    #[arg(long)]
    skip_signature_precheck: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and install packages for installed applications
    Deploy {
        #[command(flatten)]
        shared: SharedArgs,

        /// Caching server URL (http://host:port); bare flag discovers one
        #[arg(
            short = 'c',
            long = "cache-server",
            value_name = "URL|auto",
            num_args = 0..=1,
            default_missing_value = "auto"
        )]
        cache_server: Option<String>,

        /// Mirror server base URL (https, same path layout as the origin)
        #[arg(short = 'm', long = "mirror-server", value_name = "URL")]
        mirror_server: Option<String>,
    },
    /// Download packages into a local mirror of the content paths
    Download {
        #[command(flatten)]
        shared: SharedArgs,

        /// Destination directory
        #[arg(
            short = 'd',
            long = "dest",
            value_name = "DIR",
            default_value = context::DEFAULT_DESTINATION
        )]
        destination: PathBuf,
    },
    /// Report resolved packages as a JSON document on stdout
    Scan {
        #[command(flatten)]
        shared: SharedArgs,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn build_config(command: Commands) -> Config {
    let (action, shared, destination, mirror, cache) = match command {
        Commands::Deploy {
            shared,
            cache_server,
            mirror_server,
        } => {
            let cache = cache_server.map(|value| {
                if value.eq_ignore_ascii_case("auto") {
                    CacheOption::Auto
                } else {
                    CacheOption::Explicit(value)
                }
            });
            (
                Action::Deploy,
                shared,
                PathBuf::from(context::DEFAULT_DESTINATION),
                mirror_server,
                cache,
            )
        }
        Commands::Download {
            shared,
            destination,
        } => (Action::Download, shared, destination, None, None),
        Commands::Scan { shared } => (
            Action::Scan,
            shared,
            PathBuf::from(context::DEFAULT_DESTINATION),
            None,
            None,
        ),
        Commands::Completions { .. } => unreachable!("handled before config building"),
    };

    // scan defaults to the full selection; transfers require an explicit one
    let selection = if action == Action::Scan && !shared.mandatory && !shared.optional {
        Selection {
            mandatory: true,
            optional: true,
        }
    } else {
        Selection {
            mandatory: shared.mandatory,
            optional: shared.optional,
        }
    };

    Config {
        action,
        apps: shared.apps,
        plists: shared.plists,
        selection,
        force: shared.force,
        dry_run: shared.dry_run,
        quiet: shared.quiet,
        destination,
        mirror,
        cache,
        skip_signature_precheck: shared.skip_signature_precheck,
        audit_path: if shared.no_audit {
            None
        } else {
            Some(shared.audit_file)
        },
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();
}

/// POSIX convention for termination by SIGINT.
const INTERRUPT_EXIT_CODE: i32 = 130;

fn install_interrupt_handler(action: Action, working_dir: &Path) {
    let working_dir = working_dir.to_path_buf();

    let result = ctrlc::set_handler(move || {
        eprintln!("Interrupted, cleaning up");
        if action == Action::Deploy {
            context::cleanup_working_directory(&working_dir);
        }
        // the lock guard's Drop never runs on this path
        let _ = std::fs::remove_file(DEFAULT_LOCK_PATH);
        process::exit(INTERRUPT_EXIT_CODE);
    });

    if let Err(e) = result {
        debug!("Unable to install interrupt handler: {}", e);
    }
}

fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "loopdown", &mut io::stdout());
        return;
    }

    let log_level = match &cli.command {
        Commands::Deploy { shared, .. }
        | Commands::Download { shared, .. }
        | Commands::Scan { shared } => shared.log_level.clone(),
        Commands::Completions { .. } => unreachable!(),
    };
    init_tracing(&log_level);

    let config = build_config(cli.command);

    let lock = match InstanceLock::acquire(Path::new(DEFAULT_LOCK_PATH)) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(e.exit_code());
        }
    };

    install_interrupt_handler(config.action, &config.destination);

    let action_name = config.action.name().to_string();
    let argv: Vec<String> = std::env::args().collect();

    let code = match Context::new(config) {
        Ok(ctx) => {
            ctx.audit().run_start(&action_name, &argv);
            let code = match ctx.run() {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("Error: {e}");
                    e.exit_code()
                }
            };
            ctx.audit().run_stop(code);
            code
        }
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    };

    drop(lock);
    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_cache_flag_means_auto_discovery() {
        let cli = Cli::try_parse_from(["loopdown", "deploy", "-a", "all", "-c"]).unwrap();
        let config = build_config(cli.command);
        assert_eq!(config.cache, Some(CacheOption::Auto));
    }

    #[test]
    fn test_explicit_cache_url_is_kept() {
        let cli = Cli::try_parse_from([
            "loopdown",
            "deploy",
            "-a",
            "all",
            "-c",
            "http://cache.local:49152",
        ])
        .unwrap();
        let config = build_config(cli.command);
        assert_eq!(
            config.cache,
            Some(CacheOption::Explicit("http://cache.local:49152".to_string()))
        );
    }
}
