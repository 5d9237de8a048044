//! Kernel/process virtual-to-physical translation for the three supported
//! architectures. Walks page tables in the dump's physical address space,
//! reading page-table entries through a caller-supplied physical-memory
//! accessor.
//!
//! Each walker returns the *physical* address corresponding to `virt`, or
//! `None` on any translation fault (not-present entry, or a read that falls
//! outside every `PT_LOAD` segment).

use bitflags::bitflags;

pub type PhysReader<'a> = dyn Fn(u64) -> Option<u64> + 'a;

bitflags! {
    struct X86Entry: u64 {
        const PRESENT = 1 << 0;
        const HUGE    = 1 << 7;
    }
}

const X86_ADDR_MASK_4K: u64 = 0x000f_ffff_ffff_f000;
const X86_ADDR_MASK_2M: u64 = 0x000f_ffff_ffe0_0000;
const X86_ADDR_MASK_1G: u64 = 0x000f_ffff_c000_0000;

pub fn translate_x86_64(virt: u64, root_phys: u64, read_pte: &PhysReader) -> Option<u64> {
    let pml4_idx = (virt >> 39) & 0x1ff;
    let pdpt_idx = (virt >> 30) & 0x1ff;
    let pd_idx = (virt >> 21) & 0x1ff;
    let pt_idx = (virt >> 12) & 0x1ff;

    let pml4e = read_pte(root_phys + pml4_idx * 8)?;
    let pml4e = X86Entry::from_bits_truncate(pml4e);
    if !pml4e.contains(X86Entry::PRESENT) {
        return None;
    }
    let pdpt_base = pml4e.bits() & X86_ADDR_MASK_4K;

    let pdpte = read_pte(pdpt_base + pdpt_idx * 8)?;
    let pdpte_flags = X86Entry::from_bits_truncate(pdpte);
    if !pdpte_flags.contains(X86Entry::PRESENT) {
        return None;
    }
    if pdpte_flags.contains(X86Entry::HUGE) {
        return Some((pdpte & X86_ADDR_MASK_1G) | (virt & 0x3fff_ffff));
    }
    let pd_base = pdpte & X86_ADDR_MASK_4K;

    let pde = read_pte(pd_base + pd_idx * 8)?;
    let pde_flags = X86Entry::from_bits_truncate(pde);
    if !pde_flags.contains(X86Entry::PRESENT) {
        return None;
    }
    if pde_flags.contains(X86Entry::HUGE) {
        return Some((pde & X86_ADDR_MASK_2M) | (virt & 0x1f_ffff));
    }
    let pt_base = pde & X86_ADDR_MASK_4K;

    let pte = read_pte(pt_base + pt_idx * 8)?;
    let pte_flags = X86Entry::from_bits_truncate(pte);
    if !pte_flags.contains(X86Entry::PRESENT) {
        return None;
    }
    Some((pte & X86_ADDR_MASK_4K) | (virt & 0xfff))
}

const AARCH64_ADDR_MASK: u64 = 0x0000_ffff_ffff_f000;
const AARCH64_ADDR_MASK_2M: u64 = 0x0000_ffff_ffe0_0000;
const AARCH64_ADDR_MASK_1G: u64 = 0x0000_ffff_c000_0000;

pub fn translate_aarch64(virt: u64, root_phys: u64, read_pte: &PhysReader) -> Option<u64> {
    let l0_idx = (virt >> 39) & 0x1ff;
    let l1_idx = (virt >> 30) & 0x1ff;
    let l2_idx = (virt >> 21) & 0x1ff;
    let l3_idx = (virt >> 12) & 0x1ff;

    let l0e = read_pte(root_phys + l0_idx * 8)?;
    if l0e & 0b11 != 0b11 {
        return None; // must be a table descriptor
    }
    let l1_base = l0e & AARCH64_ADDR_MASK;

    let l1e = read_pte(l1_base + l1_idx * 8)?;
    match l1e & 0b11 {
        0b01 => return Some((l1e & AARCH64_ADDR_MASK_1G) | (virt & 0x3fff_ffff)), // 1GiB block
        0b11 => {}
        _ => return None,
    }
    let l2_base = l1e & AARCH64_ADDR_MASK;

    let l2e = read_pte(l2_base + l2_idx * 8)?;
    match l2e & 0b11 {
        0b01 => return Some((l2e & AARCH64_ADDR_MASK_2M) | (virt & 0x1f_ffff)), // 2MiB block
        0b11 => {}
        _ => return None,
    }
    let l3_base = l2e & AARCH64_ADDR_MASK;

    let l3e = read_pte(l3_base + l3_idx * 8)?;
    if l3e & 0b11 != 0b11 {
        return None; // must be a page descriptor
    }
    Some((l3e & AARCH64_ADDR_MASK) | (virt & 0xfff))
}

const RISCV_PPN_SHIFT: u32 = 10;
const RISCV_V: u64 = 1 << 0;
const RISCV_R: u64 = 1 << 1;
const RISCV_W: u64 = 1 << 2;
const RISCV_X: u64 = 1 << 3;

pub fn translate_riscv64(virt: u64, root_phys: u64, read_pte: &PhysReader) -> Option<u64> {
    let vpn2 = (virt >> 30) & 0x1ff;
    let vpn1 = (virt >> 21) & 0x1ff;
    let vpn0 = (virt >> 12) & 0x1ff;

    let pte2 = read_pte(root_phys + vpn2 * 8)?;
    if pte2 & RISCV_V == 0 {
        return None;
    }
    if pte2 & (RISCV_R | RISCV_W | RISCV_X) != 0 {
        // 1GiB superpage leaf.
        let base = (pte2 >> RISCV_PPN_SHIFT) << 12;
        return Some((base & !0x3fff_ffff) | (virt & 0x3fff_ffff));
    }
    let table1 = (pte2 >> RISCV_PPN_SHIFT) << 12;

    let pte1 = read_pte(table1 + vpn1 * 8)?;
    if pte1 & RISCV_V == 0 {
        return None;
    }
    if pte1 & (RISCV_R | RISCV_W | RISCV_X) != 0 {
        // 2MiB superpage leaf.
        let base = (pte1 >> RISCV_PPN_SHIFT) << 12;
        return Some((base & !0x1f_ffff) | (virt & 0x1f_ffff));
    }
    let table0 = (pte1 >> RISCV_PPN_SHIFT) << 12;

    let pte0 = read_pte(table0 + vpn0 * 8)?;
    if pte0 & RISCV_V == 0 || pte0 & (RISCV_R | RISCV_W | RISCV_X) == 0 {
        return None;
    }
    let base = (pte0 >> RISCV_PPN_SHIFT) << 12;
    Some(base | (virt & 0xfff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn mem(entries: &[(u64, u64)]) -> HashMap<u64, u64> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn x86_64_single_4k_page() {
        let root = 0x1000;
        let pt_base = 0x3000;
        let pml4_entry_addr = root; // index 0
        let pdpt_base = 0x2000;
        let pd_base = 0x2800;
        let table = mem(&[
            (pml4_entry_addr, pdpt_base | 1),
            (pdpt_base, pd_base | 1),
            (pd_base, pt_base | 1),
            (pt_base, 0x9000 | 1),
        ]);
        let phys = translate_x86_64(0, root, &|a| table.get(&a).copied());
        assert_eq!(phys, Some(0x9000));
    }

    #[test]
    fn x86_64_not_present_is_fault() {
        let table = mem(&[(0x1000, 0)]);
        assert_eq!(translate_x86_64(0, 0x1000, &|a| table.get(&a).copied()), None);
    }

    #[test]
    fn riscv64_missing_table_faults() {
        assert_eq!(translate_riscv64(0x1000, 0x2000, &|_| None), None);
    }
}
