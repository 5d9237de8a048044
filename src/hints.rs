//! GDB setup-hint printing: plain stdout lines telling the user
//! what to paste into their `.gdbinit` once the listener is up. An external
//! collaborator by design — nothing here affects the wire protocol.

pub enum HintMode<'a> {
    Kernel {
        vmlinux: Option<&'a str>,
        kernel_offset: Option<u64>,
    },
    Process {
        executable: &'a str,
        loadaddr: u64,
    },
}

pub fn print_hints(mode: &HintMode, host: &str, port: u16) {
    println!("Waiting for incoming connection...");
    match mode {
        HintMode::Kernel {
            vmlinux,
            kernel_offset,
        } => {
            if let (Some(vmlinux), Some(offset)) = (vmlinux, kernel_offset) {
                println!("file {} -o 0x{:x}", vmlinux, offset);
            } else if let Some(vmlinux) = vmlinux {
                println!("file {}", vmlinux);
            }
        }
        HintMode::Process {
            executable,
            loadaddr,
        } => {
            println!("# if the executable is position-independent, tell gdb");
            println!("# where it was actually loaded before setting breakpoints");
            println!("file {} -o 0x{:x}", executable, loadaddr);
        }
    }
    println!("target remote {}:{}", host, port);
}
