//! Host-side command producer.
//!
//! Lets tests and harnesses drive a queue through the same shared-memory path a real driver would:
//! packets are written into the ring buffer at the write cursor, then the cursor is published.

use mockgpu_memory::MemoryBus;

use crate::error::QueueError;
use crate::ring::{CursorUnit, RingDesc, RingQueue};

#[derive(Debug, Clone)]
pub struct RingProducer {
    ring: RingQueue,
    /// Next cursor position to write; ahead of the published write cursor until `publish`.
    tail: u64,
}

impl RingProducer {
    /// Producer for a PM4 ring (dword cursors). Resets both cursors to zero.
    pub fn pm4(mem: &mut dyn MemoryBus, desc: RingDesc) -> Result<Self, QueueError> {
        Self::init(mem, desc, CursorUnit::Dword)
    }

    /// Producer for an SDMA ring (byte cursors). Resets both cursors to zero.
    pub fn sdma(mem: &mut dyn MemoryBus, desc: RingDesc) -> Result<Self, QueueError> {
        Self::init(mem, desc, CursorUnit::Byte)
    }

    pub fn init(
        mem: &mut dyn MemoryBus,
        desc: RingDesc,
        unit: CursorUnit,
    ) -> Result<Self, QueueError> {
        let ring = RingQueue::new(desc, unit)?;
        mem.write_u64(desc.rptr_addr, 0);
        mem.write_u64(desc.wptr_addr, 0);
        Ok(Self { ring, tail: 0 })
    }

    /// Attaches to a ring whose cursors are already live, continuing at the published write
    /// cursor.
    pub fn open(
        mem: &mut dyn MemoryBus,
        desc: RingDesc,
        unit: CursorUnit,
    ) -> Result<Self, QueueError> {
        let ring = RingQueue::new(desc, unit)?;
        let tail = ring.write_ptr(mem);
        Ok(Self { ring, tail })
    }

    pub fn ring(&self) -> &RingQueue {
        &self.ring
    }

    /// Cursor position the next write lands at.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Units that can be written without overtaking the consumer's read cursor.
    pub fn free(&self, mem: &mut dyn MemoryBus) -> u64 {
        let in_flight = self.tail.saturating_sub(self.ring.read_ptr(mem));
        self.ring.capacity().saturating_sub(in_flight)
    }

    /// Writes `bytes` at the tail without publishing them. `bytes.len()` must be a multiple of
    /// the ring's cursor unit.
    pub fn write_bytes(&mut self, mem: &mut dyn MemoryBus, bytes: &[u8]) -> Result<(), QueueError> {
        let granularity = self.ring.unit().bytes();
        let len = bytes.len() as u64;
        if len % granularity != 0 {
            return Err(QueueError::MisalignedSize {
                size: len,
                granularity,
            });
        }
        let needed = len / granularity;
        let free = self.free(mem);
        if needed > free {
            return Err(QueueError::RingFull { needed, free });
        }
        self.ring.poke_bytes(mem, self.tail, bytes);
        self.tail += needed;
        Ok(())
    }

    /// Writes little-endian dwords at the tail without publishing them.
    pub fn write_dwords(
        &mut self,
        mem: &mut dyn MemoryBus,
        dwords: &[u32],
    ) -> Result<(), QueueError> {
        let bytes: Vec<u8> = dwords.iter().flat_map(|d| d.to_le_bytes()).collect();
        self.write_bytes(mem, &bytes)
    }

    /// Makes everything written so far visible to the consumer.
    pub fn publish(&self, mem: &mut dyn MemoryBus) {
        mem.write_u64(self.ring.desc().wptr_addr, self.tail);
    }

    /// Writes one packet and publishes it.
    pub fn submit(&mut self, mem: &mut dyn MemoryBus, packet: &[u32]) -> Result<u64, QueueError> {
        self.write_dwords(mem, packet)?;
        self.publish(mem);
        Ok(self.tail)
    }
}
