//! Producer/consumer ring shared with the command producer.
//!
//! The ring buffer and both cursors live in the shared memory image. Cursors are monotonically
//! increasing 64-bit counters; they are only reduced modulo the ring size when indexing the
//! physical buffer. The producer owns the write cursor and the executor owns the read cursor.

use mockgpu_memory::MemoryBus;

use crate::error::QueueError;

/// Unit the ring's cursors count in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorUnit {
    /// PM4 rings: cursors count 32-bit words.
    Dword,
    /// SDMA rings: cursors count bytes.
    Byte,
}

impl CursorUnit {
    pub const fn bytes(self) -> u64 {
        match self {
            CursorUnit::Dword => 4,
            CursorUnit::Byte => 1,
        }
    }
}

/// Caller-supplied ring placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingDesc {
    /// Address of the ring buffer.
    pub base: u64,
    /// Ring buffer size in bytes.
    pub size: u64,
    /// Address of the 64-bit read cursor.
    pub rptr_addr: u64,
    /// Address of the 64-bit write cursor.
    pub wptr_addr: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingQueue {
    desc: RingDesc,
    unit: CursorUnit,
}

impl RingQueue {
    pub fn new(desc: RingDesc, unit: CursorUnit) -> Result<Self, QueueError> {
        if desc.size == 0 {
            return Err(QueueError::EmptyRing);
        }
        let granularity = unit.bytes();
        if desc.size % granularity != 0 {
            return Err(QueueError::MisalignedSize {
                size: desc.size,
                granularity,
            });
        }
        if desc.base.checked_add(desc.size).is_none() {
            return Err(QueueError::RingOverflow {
                base: desc.base,
                size: desc.size,
            });
        }
        Ok(Self { desc, unit })
    }

    pub fn desc(&self) -> &RingDesc {
        &self.desc
    }

    pub fn unit(&self) -> CursorUnit {
        self.unit
    }

    /// Ring size in cursor units.
    pub fn capacity(&self) -> u64 {
        self.desc.size / self.unit.bytes()
    }

    pub fn read_ptr(&self, mem: &mut dyn MemoryBus) -> u64 {
        mem.read_u64(self.desc.rptr_addr)
    }

    pub fn write_ptr(&self, mem: &mut dyn MemoryBus) -> u64 {
        mem.read_u64(self.desc.wptr_addr)
    }

    pub fn has_work(&self, mem: &mut dyn MemoryBus) -> bool {
        self.read_ptr(mem) < self.write_ptr(mem)
    }

    /// Units queued between the read and write cursors.
    pub fn pending(&self, mem: &mut dyn MemoryBus) -> u64 {
        self.write_ptr(mem).saturating_sub(self.read_ptr(mem))
    }

    /// Moves the read cursor forward by `n` units. This is the only writer of the read cursor.
    pub fn advance(&self, mem: &mut dyn MemoryBus, n: u64) {
        let rptr = self.read_ptr(mem);
        mem.write_u64(self.desc.rptr_addr, rptr.wrapping_add(n));
    }

    /// Byte offset within the ring buffer of logical cursor position `cursor`.
    pub fn byte_offset(&self, cursor: u64) -> u64 {
        (cursor % self.capacity()) * self.unit.bytes()
    }

    /// Copies `buf.len()` bytes starting at logical cursor position `cursor`, wrapping at the end
    /// of the physical buffer. Does not move any cursor.
    pub fn peek_bytes(&self, mem: &mut dyn MemoryBus, cursor: u64, buf: &mut [u8]) {
        let size = self.desc.size;
        let mut pos = self.byte_offset(cursor);
        let mut done = 0usize;
        while done < buf.len() {
            let chunk = ((size - pos) as usize).min(buf.len() - done);
            mem.read_physical(self.desc.base + pos, &mut buf[done..done + chunk]);
            done += chunk;
            pos = 0;
        }
    }

    /// Producer-side counterpart of [`RingQueue::peek_bytes`].
    pub fn poke_bytes(&self, mem: &mut dyn MemoryBus, cursor: u64, buf: &[u8]) {
        let size = self.desc.size;
        let mut pos = self.byte_offset(cursor);
        let mut done = 0usize;
        while done < buf.len() {
            let chunk = ((size - pos) as usize).min(buf.len() - done);
            mem.write_physical(self.desc.base + pos, &buf[done..done + chunk]);
            done += chunk;
            pos = 0;
        }
    }

    /// Reads the dword at logical cursor position `cursor` without moving any cursor.
    pub fn peek_u32(&self, mem: &mut dyn MemoryBus, cursor: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.peek_bytes(mem, cursor, &mut buf);
        u32::from_le_bytes(buf)
    }

    /// Reads `count` consecutive dwords starting at logical cursor position `cursor`.
    pub fn peek_dwords(&self, mem: &mut dyn MemoryBus, cursor: u64, count: usize) -> Vec<u32> {
        let mut bytes = vec![0u8; count * 4];
        self.peek_bytes(mem, cursor, &mut bytes);
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}
