use std::collections::BTreeMap;

use crate::bus::MemoryBus;

/// Sparse [`MemoryBus`] covering the whole 64-bit address space.
///
/// Pages are allocated on first write; unallocated bytes read back as zero. Bytes whose address
/// would wrap past `u64::MAX` read as `0xFF` and ignore writes, so an access near the top of the
/// address space never aliases low memory.
#[derive(Debug, Default, Clone)]
pub struct SparseMemory {
    pages: BTreeMap<u64, Box<[u8; PAGE_SIZE]>>,
}

const PAGE_SIZE: usize = 4096;

impl SparseMemory {
    pub const PAGE_SIZE: usize = PAGE_SIZE;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages that have been touched by a write.
    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }

    fn page_index(addr: u64) -> u64 {
        addr / PAGE_SIZE as u64
    }

    fn page_offset(addr: u64) -> usize {
        (addr % PAGE_SIZE as u64) as usize
    }

    fn ensure_page(&mut self, page: u64) -> &mut [u8; PAGE_SIZE] {
        self.pages
            .entry(page)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE]))
    }
}

impl MemoryBus for SparseMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        let mut done = 0usize;
        while done < buf.len() {
            let Some(addr) = paddr.checked_add(done as u64) else {
                buf[done..].fill(0xFF);
                return;
            };
            let off = Self::page_offset(addr);
            let chunk = (PAGE_SIZE - off).min(buf.len() - done);
            let dst = &mut buf[done..done + chunk];
            match self.pages.get(&Self::page_index(addr)) {
                Some(page) => dst.copy_from_slice(&page[off..off + chunk]),
                None => dst.fill(0),
            }
            done += chunk;
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        let mut done = 0usize;
        while done < buf.len() {
            let Some(addr) = paddr.checked_add(done as u64) else {
                return;
            };
            let off = Self::page_offset(addr);
            let chunk = (PAGE_SIZE - off).min(buf.len() - done);
            let page = self.ensure_page(Self::page_index(addr));
            page[off..off + chunk].copy_from_slice(&buf[done..done + chunk]);
            done += chunk;
        }
    }
}
