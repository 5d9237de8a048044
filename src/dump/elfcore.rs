//! Loads a Linux ELF-format kdump vmcore with `goblin` and exposes the
//! pieces the rest of the crate needs: `PT_LOAD` segments (physical memory
//! backing), `NT_PRSTATUS` notes (one per CPU), and the `VMCOREINFO` note.

use crate::arch::Arch;
use crate::error::AppError;
use goblin::elf::program_header::{PT_LOAD, PT_NOTE};
use goblin::elf::Elf;
use std::collections::HashMap;
use std::path::Path;

const PR_PID_OFFSET: usize = 32;
const PR_REG_OFFSET: usize = 112;

pub struct LoadSegment {
    pub vaddr: u64,
    pub paddr: u64,
    pub offset: u64,
    pub filesz: u64,
    pub memsz: u64,
}

pub struct RawPrStatus {
    pub pid: u64,
    pub regs: HashMap<String, u64>,
}

pub struct ElfCore {
    data: Vec<u8>,
    pub arch: Arch,
    pub segments: Vec<LoadSegment>,
    pub prstatuses: Vec<RawPrStatus>,
    pub kernel_offset: u64,
}

impl ElfCore {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let data = std::fs::read(path).map_err(|source| AppError::DumpOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let elf = Elf::parse(&data).map_err(|source| AppError::DumpParse {
            path: path.to_path_buf(),
            source,
        })?;

        let arch = machine_to_arch(elf.header.e_machine)
            .ok_or_else(|| AppError::UnsupportedArch(format!("e_machine={}", elf.header.e_machine)))?;

        let segments = elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == PT_LOAD)
            .map(|ph| LoadSegment {
                vaddr: ph.p_vaddr,
                paddr: ph.p_paddr,
                offset: ph.p_offset,
                filesz: ph.p_filesz,
                memsz: ph.p_memsz,
            })
            .collect();

        let mut prstatuses = Vec::new();
        let mut vmcoreinfo = None;
        for ph in elf.program_headers.iter().filter(|ph| ph.p_type == PT_NOTE) {
            let start = ph.p_offset as usize;
            let end = start + ph.p_filesz as usize;
            let Some(note_bytes) = data.get(start..end) else {
                continue;
            };
            for note in iter_notes(note_bytes) {
                match (note.name, note.n_type) {
                    ("CORE", 1) => {
                        if let Some(pr) = decode_prstatus(arch, note.desc) {
                            prstatuses.push(pr);
                        }
                    }
                    ("VMCOREINFO", _) => {
                        vmcoreinfo = Some(String::from_utf8_lossy(note.desc).into_owned());
                    }
                    _ => {}
                }
            }
        }

        if prstatuses.is_empty() {
            return Err(AppError::NoCpus);
        }

        let kernel_offset = vmcoreinfo
            .as_deref()
            .and_then(parse_kernel_offset)
            .unwrap_or(0);

        Ok(ElfCore {
            data,
            arch,
            segments,
            prstatuses,
            kernel_offset,
        })
    }

    pub fn cpu_count(&self) -> usize {
        self.prstatuses.len()
    }

    /// Reads `size` bytes starting at physical address `paddr`, satisfying
    /// them from whichever `PT_LOAD` segment covers the range. Bytes past
    /// `filesz` but within `memsz` (the BSS-like zero-fill tail) read as
    /// zero. A range with no covering segment is a fault.
    pub fn read_phys(&self, paddr: u64, size: usize) -> Option<Vec<u8>> {
        let seg = self
            .segments
            .iter()
            .find(|s| paddr >= s.paddr && paddr + size as u64 <= s.paddr + s.memsz)?;
        let mut out = vec![0u8; size];
        let rel = paddr - seg.paddr;
        if rel < seg.filesz {
            let file_avail = (seg.filesz - rel).min(size as u64) as usize;
            let file_off = (seg.offset + rel) as usize;
            let src = self.data.get(file_off..file_off + file_avail)?;
            out[..file_avail].copy_from_slice(src);
        }
        Some(out)
    }

    /// Reads a single 8-byte little-endian word at a physical address —
    /// the page-table-entry access shape the translators need.
    pub fn read_phys_u64(&self, paddr: u64) -> Option<u64> {
        let bytes = self.read_phys(paddr, 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }
}

fn machine_to_arch(e_machine: u16) -> Option<Arch> {
    const EM_X86_64: u16 = 62;
    const EM_AARCH64: u16 = 183;
    const EM_RISCV: u16 = 243;
    match e_machine {
        EM_X86_64 => Some(Arch::X86_64),
        EM_AARCH64 => Some(Arch::Aarch64),
        EM_RISCV => Some(Arch::Riscv64),
        _ => None,
    }
}

struct RawNote<'a> {
    name: &'a str,
    n_type: u32,
    desc: &'a [u8],
}

/// Hand-rolled ELF note-segment walk (namesz/descsz/type header, name and
/// desc each padded to 4-byte alignment) — the format is fixed by the ELF
/// spec, not by whichever vmcore-reading library happens to expose it.
fn iter_notes(mut bytes: &[u8]) -> Vec<RawNote<'_>> {
    let mut notes = Vec::new();
    while bytes.len() >= 12 {
        let namesz = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let descsz = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let n_type = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let mut off = 12;
        let Some(name_bytes) = bytes.get(off..off + namesz) else {
            break;
        };
        let name = std::str::from_utf8(name_bytes)
            .unwrap_or("")
            .trim_end_matches('\0');
        off += align4(namesz);
        let Some(desc) = bytes.get(off..off + descsz) else {
            break;
        };
        notes.push(RawNote { name, n_type, desc });
        off += align4(descsz);
        if off > bytes.len() {
            break;
        }
        bytes = &bytes[off..];
    }
    notes
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn word(desc: &[u8], offset: usize) -> Option<u64> {
    desc.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
}

fn decode_prstatus(arch: Arch, desc: &[u8]) -> Option<RawPrStatus> {
    let pid = desc
        .get(PR_PID_OFFSET..PR_PID_OFFSET + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()) as u64)?;

    let names: &[&str] = match arch {
        Arch::X86_64 => &[
            "r15", "r14", "r13", "r12", "rbp", "rbx", "r11", "r10", "r9", "r8", "rax", "rcx",
            "rdx", "rsi", "rdi", "orig_rax", "rip", "cs", "rflags", "rsp", "ss", "fs_base",
            "gs_base", "ds", "es", "fs", "gs",
        ],
        Arch::Aarch64 => &[
            "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12",
            "x13", "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24",
            "x25", "x26", "x27", "x28", "x29", "lr", "sp", "pc", "pstate",
        ],
        Arch::Riscv64 => &[
            "pc", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3",
            "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
            "t3", "t4", "t5", "t6",
        ],
    };

    let mut regs = HashMap::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let v = word(desc, PR_REG_OFFSET + i * 8)?;
        regs.insert((*name).to_string(), v);
    }
    arch.fixup(&mut regs);
    Some(RawPrStatus { pid, regs })
}

fn parse_kernel_offset(vmcoreinfo: &str) -> Option<u64> {
    for line in vmcoreinfo.lines() {
        if let Some(value) = line.strip_prefix("KERNELOFFSET=") {
            return u64::from_str_radix(value.trim(), 16).ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kernel_offset_from_vmcoreinfo_text() {
        let info = "OSRELEASE=6.1.0\nKERNELOFFSET=3e800000\nPAGESIZE=4096\n";
        assert_eq!(parse_kernel_offset(info), Some(0x3e800000));
    }

    #[test]
    fn missing_kernel_offset_is_none() {
        let info = "OSRELEASE=6.1.0\n";
        assert_eq!(parse_kernel_offset(info), None);
    }

    #[test]
    fn decodes_x86_64_prstatus_pid_and_rip() {
        let mut desc = vec![0u8; PR_REG_OFFSET + 27 * 8];
        desc[PR_PID_OFFSET..PR_PID_OFFSET + 4].copy_from_slice(&1234u32.to_le_bytes());
        // rip is the 17th word (index 16) in the x86_64 order above.
        let rip_off = PR_REG_OFFSET + 16 * 8;
        desc[rip_off..rip_off + 8].copy_from_slice(&0x0123_4567_89ab_cdefu64.to_le_bytes());
        let pr = decode_prstatus(Arch::X86_64, &desc).unwrap();
        assert_eq!(pr.pid, 1234);
        assert_eq!(pr.regs.get("rip"), Some(&0x0123_4567_89ab_cdef));
    }

    #[test]
    fn aarch64_fixup_applied_during_decode() {
        let mut desc = vec![0u8; PR_REG_OFFSET + 34 * 8];
        let lr_off = PR_REG_OFFSET + 30 * 8;
        desc[lr_off..lr_off + 8].copy_from_slice(&0xbeefu64.to_le_bytes());
        let pr = decode_prstatus(Arch::Aarch64, &desc).unwrap();
        assert_eq!(pr.regs.get("x30"), Some(&0xbeef));
    }

    #[test]
    fn note_iteration_finds_vmcoreinfo_and_prstatus() {
        let mut buf = Vec::new();
        // CORE / NT_PRSTATUS note with a minimal, zeroed payload.
        let desc = vec![0u8; PR_REG_OFFSET + 27 * 8];
        push_note(&mut buf, "CORE", 1, &desc);
        push_note(&mut buf, "VMCOREINFO", 0, b"KERNELOFFSET=1000\n");
        let notes = iter_notes(&buf);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].name, "CORE");
        assert_eq!(notes[1].name, "VMCOREINFO");
    }

    fn push_note(buf: &mut Vec<u8>, name: &str, n_type: u32, desc: &[u8]) {
        let namesz = name.len() + 1;
        buf.extend_from_slice(&(namesz as u32).to_le_bytes());
        buf.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        buf.extend_from_slice(&n_type.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
        buf.extend_from_slice(desc);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }
}
