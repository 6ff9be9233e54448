// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn shared_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("apps")
            .short('a')
            .long("apps")
            .value_name("APP")
            .num_args(1..)
            .help("Applications to process: garageband, logicpro, mainstage, or all"),
    )
    .arg(
        Arg::new("plists")
            .long("plist")
            .value_name("PATH|NAME")
            .action(ArgAction::Append)
            .help("Metadata property list files (or remote feed names) to process"),
    )
    .arg(
        Arg::new("mandatory")
            .short('r')
            .long("req")
            .action(ArgAction::SetTrue)
            .help("Include mandatory packages"),
    )
    .arg(
        Arg::new("optional")
            .short('o')
            .long("opt")
            .action(ArgAction::SetTrue)
            .help("Include optional packages"),
    )
    .arg(
        Arg::new("force")
            .short('f')
            .long("force")
            .action(ArgAction::SetTrue)
            .help("Re-process packages even when already installed"),
    )
    .arg(
        Arg::new("dry_run")
            .short('n')
            .long("dry-run")
            .action(ArgAction::SetTrue)
            .help("Resolve and report without transferring anything"),
    )
    .arg(
        Arg::new("quiet")
            .short('q')
            .long("quiet")
            .action(ArgAction::SetTrue)
            .help("Suppress progress output; errors still go to stderr"),
    )
    .arg(
        Arg::new("log_level")
            .long("log-level")
            .value_name("FILTER")
            .default_value("info")
            .help("Log level filter"),
    )
    .arg(
        Arg::new("audit_file")
            .long("audit-file")
            .value_name("PATH")
            .default_value("/var/log/loopdown-audit.log")
            .help("Audit log file"),
    )
    .arg(
        Arg::new("no_audit")
            .long("no-audit")
            .action(ArgAction::SetTrue)
            .help("Disable the audit log"),
    )
    .arg(
        Arg::new("skip_signature_precheck")
            .long("skip-signature-precheck")
            .action(ArgAction::SetTrue)
            .help("Skip re-verification of artifacts left behind by earlier runs"),
    )
}

fn build_cli() -> Command {
    Command::new("loopdown")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Download, install, or report on Apple audio content packages")
        .subcommand_required(true)
        .subcommand(
            shared_args(
                Command::new("deploy")
                    .about("Download and install packages for installed applications"),
            )
            .arg(
                Arg::new("cache_server")
                    .short('c')
                    .long("cache-server")
                    .value_name("URL|auto")
                    .num_args(0..=1)
                    .default_missing_value("auto")
                    .help("Caching server URL (http://host:port); bare flag discovers one"),
            )
            .arg(
                Arg::new("mirror_server")
                    .short('m')
                    .long("mirror-server")
                    .value_name("URL")
                    .help("Mirror server base URL (https, same path layout as the origin)"),
            ),
        )
        .subcommand(
            shared_args(
                Command::new("download")
                    .about("Download packages into a local mirror of the content paths"),
            )
            .arg(
                Arg::new("destination")
                    .short('d')
                    .long("dest")
                    .value_name("DIR")
                    .default_value("/tmp/loopdown")
                    .help("Destination directory"),
            ),
        )
        .subcommand(shared_args(
            Command::new("scan").about("Report resolved packages as a JSON document on stdout"),
        ))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("loopdown.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
