//! Per-architecture register layout and fixups.
//!
//! The layout order IS the wire order for the `g` packet reply — it must
//! never be reordered. Widths are in bytes. Mirrors the per-arch register
//! union/fixup split in `examples/isgasho-rd/src/registers.rs`, but as a
//! static ordered table instead of a runtime union read, since nothing here
//! ever writes a register back.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Aarch64,
    Riscv64,
    X86_64,
}

impl Arch {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "aarch64" => Some(Arch::Aarch64),
            "riscv64" => Some(Arch::Riscv64),
            "x86_64" => Some(Arch::X86_64),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Arch::Aarch64 => "aarch64",
            Arch::Riscv64 => "riscv64",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Ordered `(wire name, width in bytes)` for the `g` packet. Order is load-bearing.
    pub fn layout(self) -> &'static [(&'static str, usize)] {
        match self {
            Arch::X86_64 => &X86_64_LAYOUT,
            Arch::Aarch64 => &AARCH64_LAYOUT,
            Arch::Riscv64 => &RISCV64_LAYOUT,
        }
    }

    /// Total byte width of one `g` reply for this architecture.
    pub fn reg_block_bytes(self) -> usize {
        self.layout().iter().map(|(_, w)| w).sum()
    }

    /// Derive aliased register names a raw prstatus decode doesn't carry
    /// natively. Applied once, at snapshot construction, to dump-derived
    /// records only — sidecar records are used verbatim.
    pub fn fixup(self, regs: &mut HashMap<String, u64>) {
        match self {
            Arch::Aarch64 => {
                if let Some(&lr) = regs.get("lr") {
                    regs.insert("x30".to_string(), lr);
                }
                if let Some(&pstate) = regs.get("pstate") {
                    regs.insert("cpsr".to_string(), pstate);
                }
            }
            Arch::Riscv64 => {
                regs.insert("zero".to_string(), 0);
                if let Some(&s0) = regs.get("s0") {
                    regs.insert("fp".to_string(), s0);
                }
            }
            Arch::X86_64 => {
                if let Some(&rflags) = regs.get("rflags") {
                    regs.insert("eflags".to_string(), rflags);
                }
            }
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

static X86_64_LAYOUT: [(&str, usize); 24] = [
    ("rax", 8),
    ("rbx", 8),
    ("rcx", 8),
    ("rdx", 8),
    ("rsi", 8),
    ("rdi", 8),
    ("rbp", 8),
    ("rsp", 8),
    ("r8", 8),
    ("r9", 8),
    ("r10", 8),
    ("r11", 8),
    ("r12", 8),
    ("r13", 8),
    ("r14", 8),
    ("r15", 8),
    ("rip", 8),
    ("eflags", 4),
    ("cs", 4),
    ("ss", 4),
    ("ds", 4),
    ("es", 4),
    ("fs", 4),
    ("gs", 4),
];

static AARCH64_LAYOUT: [(&str, usize); 34] = [
    ("x0", 8),
    ("x1", 8),
    ("x2", 8),
    ("x3", 8),
    ("x4", 8),
    ("x5", 8),
    ("x6", 8),
    ("x7", 8),
    ("x8", 8),
    ("x9", 8),
    ("x10", 8),
    ("x11", 8),
    ("x12", 8),
    ("x13", 8),
    ("x14", 8),
    ("x15", 8),
    ("x16", 8),
    ("x17", 8),
    ("x18", 8),
    ("x19", 8),
    ("x20", 8),
    ("x21", 8),
    ("x22", 8),
    ("x23", 8),
    ("x24", 8),
    ("x25", 8),
    ("x26", 8),
    ("x27", 8),
    ("x28", 8),
    ("x29", 8),
    ("x30", 8),
    ("sp", 8),
    ("pc", 8),
    ("cpsr", 4),
];

static RISCV64_LAYOUT: [(&str, usize); 33] = [
    ("zero", 8),
    ("ra", 8),
    ("sp", 8),
    ("gp", 8),
    ("tp", 8),
    ("t0", 8),
    ("t1", 8),
    ("t2", 8),
    ("fp", 8),
    ("s1", 8),
    ("a0", 8),
    ("a1", 8),
    ("a2", 8),
    ("a3", 8),
    ("a4", 8),
    ("a5", 8),
    ("a6", 8),
    ("a7", 8),
    ("s2", 8),
    ("s3", 8),
    ("s4", 8),
    ("s5", 8),
    ("s6", 8),
    ("s7", 8),
    ("s8", 8),
    ("s9", 8),
    ("s10", 8),
    ("s11", 8),
    ("t3", 8),
    ("t4", 8),
    ("t5", 8),
    ("t6", 8),
    ("pc", 8),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_64_block_width_matches_layout_sum() {
        assert_eq!(Arch::X86_64.reg_block_bytes(), 164);
        assert_eq!(2 * Arch::X86_64.reg_block_bytes(), 328);
    }

    #[test]
    fn aarch64_fixup_derives_aliases() {
        let mut regs = HashMap::new();
        regs.insert("lr".to_string(), 0x1234);
        regs.insert("pstate".to_string(), 0x60000000);
        Arch::Aarch64.fixup(&mut regs);
        assert_eq!(regs.get("x30"), Some(&0x1234));
        assert_eq!(regs.get("cpsr"), Some(&0x60000000));
    }

    #[test]
    fn riscv64_fixup_derives_zero_and_fp() {
        let mut regs = HashMap::new();
        regs.insert("s0".to_string(), 0xdead);
        Arch::Riscv64.fixup(&mut regs);
        assert_eq!(regs.get("zero"), Some(&0));
        assert_eq!(regs.get("fp"), Some(&0xdead));
    }

    #[test]
    fn x86_64_fixup_derives_eflags() {
        let mut regs = HashMap::new();
        regs.insert("rflags".to_string(), 0x246);
        Arch::X86_64.fixup(&mut regs);
        assert_eq!(regs.get("eflags"), Some(&0x246));
    }

    #[test]
    fn parse_rejects_unknown_arch() {
        assert!(Arch::parse("mips").is_none());
    }
}
