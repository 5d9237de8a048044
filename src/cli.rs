//! Command-line surface.
//!
//! Built with `clap`'s builder API (`Command`/`Arg`) rather than the derive
//! macros — matches the only two pack examples that touch `clap` at all.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Cli {
    pub corefile: PathBuf,
    pub hostname: String,
    pub port: u16,
    pub process_json: Option<PathBuf>,
    pub kernel_json: Option<PathBuf>,
    pub vmlinux: Option<String>,
    pub debug: bool,
}

pub fn parse() -> Cli {
    let matches = Command::new("vmcore-gdbstub")
        .about("Read-only GDB remote-serial-protocol stub over a Linux kernel crash dump")
        .arg(
            Arg::new("corefile")
                .short('f')
                .long("corefile")
                .help("Path to the vmcore (ELF-format kernel crash dump)")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("hostname")
                .short('a')
                .long("hostname")
                .help("Address to bind the RSP server to")
                .default_value("localhost"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("TCP port to bind the RSP server to")
                .default_value("1234")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("process_json")
                .short('j')
                .long("process-json")
                .help("Sidecar JSON describing a single user process (process mode)")
                .conflicts_with("kernel_json")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("kernel_json")
                .short('k')
                .long("kernel-json")
                .help("Sidecar JSON describing the kernel's task table (kernel-with-tasks mode)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("vmlinux")
                .short('v')
                .long("vmlinux")
                .help("Path to vmlinux, used only to print GDB setup hints"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Trace every RSP packet to stdout")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    Cli {
        corefile: matches.get_one::<PathBuf>("corefile").cloned().expect("required"),
        hostname: matches.get_one::<String>("hostname").cloned().expect("has default"),
        port: *matches.get_one::<u16>("port").expect("has default"),
        process_json: matches.get_one::<PathBuf>("process_json").cloned(),
        kernel_json: matches.get_one::<PathBuf>("kernel_json").cloned(),
        vmlinux: matches.get_one::<String>("vmlinux").cloned(),
        debug: matches.get_flag("debug"),
    }
}
