//! The dump adapter: the only component that knows the vmcore
//! is an ELF file. Everything else sees memory as a flat virtual space.
//!
//! Kernel-virtual reads resolve directly against the ELF core's `PT_LOAD`
//! segment table (which carries both the virtual and physical address a
//! segment was mapped at — the kernel's own direct/linear map, already
//! baked into the dump). Once `install_user_rootpgt` is called, reads
//! switch to walking the target's page tables instead, since no single
//! `PT_LOAD` segment covers arbitrary user-space virtual addresses.

use crate::arch::Arch;
use crate::dump::elfcore::{ElfCore, RawPrStatus};
use crate::dump::translate;
use crate::error::AppError;
use std::path::Path;

const PAGE_SIZE: u64 = 4096;

enum TranslateMode {
    Linear,
    PageTable { root_phys: u64 },
}

pub struct CpuPrstatus {
    pub regs: std::collections::HashMap<String, u64>,
    pub pid: u64,
}

pub struct DumpSession {
    core: ElfCore,
    mode: TranslateMode,
}

impl DumpSession {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let core = ElfCore::load(path)?;
        Ok(DumpSession {
            core,
            mode: TranslateMode::Linear,
        })
    }

    pub fn arch(&self) -> Arch {
        self.core.arch
    }

    pub fn cpu_count(&self) -> usize {
        self.core.cpu_count()
    }

    pub fn cpu_prstatus(&self, c: usize) -> Option<CpuPrstatus> {
        let RawPrStatus { pid, regs } = self.core.prstatuses.get(c)?;
        Some(CpuPrstatus {
            regs: regs.clone(),
            pid: *pid,
        })
    }

    pub fn kernel_offset(&self) -> u64 {
        self.core.kernel_offset
    }

    /// Reads `size` bytes at virtual address `vaddr`. `None` on any fault.
    pub fn read(&self, vaddr: u64, size: usize) -> Option<Vec<u8>> {
        if size == 0 {
            return Some(Vec::new());
        }
        let mut out = Vec::with_capacity(size);
        let mut remaining = size;
        let mut cursor = vaddr;
        while remaining > 0 {
            let page_base = cursor & !(PAGE_SIZE - 1);
            let page_off = (cursor - page_base) as usize;
            let chunk = (PAGE_SIZE as usize - page_off).min(remaining);
            let phys_page = self.translate(page_base)?;
            let phys = phys_page + page_off as u64;
            let bytes = self.core.read_phys(phys, chunk)?;
            out.extend_from_slice(&bytes);
            remaining -= chunk;
            cursor += chunk as u64;
        }
        Some(out)
    }

    fn translate(&self, page_base: u64) -> Option<u64> {
        match &self.mode {
            TranslateMode::Linear => self.translate_linear(page_base),
            TranslateMode::PageTable { root_phys } => self.translate_walk(page_base, *root_phys),
        }
    }

    fn translate_linear(&self, vaddr: u64) -> Option<u64> {
        let seg = self
            .core
            .segments
            .iter()
            .find(|s| vaddr >= s.vaddr && vaddr < s.vaddr + s.memsz)?;
        Some(seg.paddr + (vaddr - seg.vaddr))
    }

    fn translate_walk(&self, vaddr: u64, root_phys: u64) -> Option<u64> {
        let read_pte = |addr: u64| self.core.read_phys_u64(addr);
        match self.core.arch {
            Arch::X86_64 => translate::translate_x86_64(vaddr, root_phys, &read_pte),
            Arch::Aarch64 => translate::translate_aarch64(vaddr, root_phys, &read_pte),
            Arch::Riscv64 => translate::translate_riscv64(vaddr, root_phys, &read_pte),
        }
    }

    /// Reconfigures the translator to resolve reads against a user
    /// process's page tables. `virt` is a kernel-virtual
    /// pointer to that process's root page table (e.g. `mm_struct.pgd`).
    pub fn install_user_rootpgt(&mut self, virt: u64) -> Option<()> {
        let root_phys = self.translate_linear(virt & !(PAGE_SIZE - 1))? + (virt % PAGE_SIZE);
        self.mode = TranslateMode::PageTable { root_phys };
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_constant_matches_4k_granule() {
        assert_eq!(PAGE_SIZE, 4096);
    }
}
