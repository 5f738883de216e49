// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: staged build directory
fn stage_dir_arg() -> Arg {
    Arg::new("stage_dir")
        .required(true)
        .value_name("DIR")
        .help("Staged build directory")
}

/// Common argument: devkit name or address
fn target_arg() -> Arg {
    Arg::new("target")
        .required(true)
        .help("Devkit name or IP address")
}

fn build_cli() -> Command {
    Command::new("orbis-deploy")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Orbis Deploy Contributors")
        .about("PS4 staging, GP4 packaging and devkit management")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .default_value("deploy.toml")
                .global(true)
                .help("Path to the deploy configuration"),
        )
        .subcommand(
            Command::new("stage")
                .about("Map a stage directory into a GP4 project")
                .arg(stage_dir_arg())
                .arg(Arg::new("title").short('t').long("title").help("Title id to stage for"))
                .arg(
                    Arg::new("output_dir")
                        .short('o')
                        .long("output-dir")
                        .help("Output directory for the GP4 project"),
                )
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print every file with its chunk and layer"),
                ),
        )
        .subcommand(
            Command::new("package")
                .about("Stage and package title ids in parallel")
                .arg(stage_dir_arg())
                .arg(
                    Arg::new("title")
                        .short('t')
                        .long("title")
                        .action(clap::ArgAction::Append)
                        .help("Title id to package (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("extract")
                .about("Unpack a package")
                .arg(Arg::new("package").required(true).help("Package file"))
                .arg(Arg::new("output").required(true).help("Output directory")),
        )
        .subcommand(
            Command::new("shorten")
                .about("Show the shortened form of directory paths")
                .arg(
                    Arg::new("paths")
                        .required(true)
                        .num_args(1..)
                        .help("Directory paths to shorten"),
                ),
        )
        .subcommand(
            Command::new("devices")
                .about("List the target manager's default devices")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(clap::ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("device")
                .about("Operate on a devkit")
                .arg(target_arg())
                .subcommand(Command::new("status").about("Show power and connection state"))
                .subcommand(Command::new("power-on").about("Power the devkit on"))
                .subcommand(Command::new("power-off").about("Power the devkit off"))
                .subcommand(Command::new("reboot").about("Reboot the devkit"))
                .subcommand(Command::new("connect").about("Connect to the devkit"))
                .subcommand(Command::new("disconnect").about("Disconnect from the devkit"))
                .subcommand(
                    Command::new("install")
                        .about("Install a staged build")
                        .arg(stage_dir_arg())
                        .arg(
                            Arg::new("deploy")
                                .long("deploy")
                                .action(clap::ArgAction::SetTrue)
                                .help("Copy to device storage instead of running from the host"),
                        ),
                )
                .subcommand(
                    Command::new("run")
                        .about("Launch a title")
                        .arg(Arg::new("working_dir").required(true).help("Working directory on the device")),
                )
                .subcommand(Command::new("screenshot").about("Save a screenshot"))
                .subcommand(Command::new("export-settings").about("Export device settings"))
                .subcommand(Command::new("import-settings").about("Import device settings"))
                .subcommand(Command::new("processes").about("List running processes"))
                .subcommand(Command::new("kill").about("Kill a process")),
        )
        .subcommand(
            Command::new("pgo")
                .about("Run an instrumented build and merge its profiles")
                .arg(target_arg()),
        )
        .subcommand(
            Command::new("postmortem")
                .about("Collect and analyze crash dumps")
                .arg(Arg::new("target").short('t').long("target").help("Devkit to pull dumps from"))
                .arg(
                    Arg::new("latest")
                        .long("latest")
                        .action(clap::ArgAction::SetTrue)
                        .help("Analyze only the newest dump"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("orbis-deploy.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
