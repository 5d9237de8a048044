//! vmcore-gdbstub: a read-only GDB remote-serial-protocol stub over a Linux
//! kernel crash dump.

use anyhow::{Context, Result};
use std::net::ToSocketAddrs;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vmcore_gdbstub::dump::DumpSession;
use vmcore_gdbstub::error::AppError;
use vmcore_gdbstub::hints::{print_hints, HintMode};
use vmcore_gdbstub::rsp::RspState;
use vmcore_gdbstub::sidecar;
use vmcore_gdbstub::threads::ThreadTable;
use vmcore_gdbstub::{cli, server};

fn main() -> Result<()> {
    let args = cli::parse();

    let filter_directive = if args.debug {
        "info,vmcore_gdbstub=trace"
    } else {
        "info,vmcore_gdbstub=debug"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive)))
        .init();

    info!("starting vmcore-gdbstub");

    let mut dump = DumpSession::open(&args.corefile)
        .with_context(|| format!("opening {}", args.corefile.display()))?;
    info!(arch = %dump.arch(), cpus = dump.cpu_count(), "dump opened");

    let (threads, hint_mode) = if let Some(path) = &args.process_json {
        let sidecar = sidecar::load(path)?;
        if let Some(rootpgt) = sidecar.rootpgt {
            dump.install_user_rootpgt(rootpgt)
                .context("root page table address does not resolve in this dump")?;
        }
        let table = ThreadTable::build_process(&dump, &sidecar);
        let mode = HintMode::Process {
            executable: args.vmlinux.as_deref().unwrap_or(""),
            loadaddr: sidecar.loadaddr.unwrap_or(0),
        };
        (table, mode)
    } else if let Some(path) = &args.kernel_json {
        let sidecar = sidecar::load(path)?;
        let table = ThreadTable::build_kernel_with_tasks(&dump, &sidecar);
        let mode = HintMode::Kernel {
            vmlinux: args.vmlinux.as_deref(),
            kernel_offset: Some(dump.kernel_offset()).filter(|&o| o != 0),
        };
        (table, mode)
    } else {
        let table = ThreadTable::build_kernel_only(&dump);
        let mode = HintMode::Kernel {
            vmlinux: args.vmlinux.as_deref(),
            kernel_offset: Some(dump.kernel_offset()).filter(|&o| o != 0),
        };
        (table, mode)
    };

    let bind_target = format!("{}:{}", args.hostname, args.port);
    let addr = bind_target
        .to_socket_addrs()
        .map_err(|source| AppError::BindFailed {
            addr: bind_target.clone(),
            source,
        })?
        .next()
        .with_context(|| format!("could not resolve {}", bind_target))?;

    let state = RspState::new(dump, threads);

    print_hints(&hint_mode, &args.hostname, args.port);

    server::run(addr, state).map_err(|source| AppError::BindFailed {
        addr: bind_target,
        source,
    })?;

    info!("shutting down");
    Ok(())
}
