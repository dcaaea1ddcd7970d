/// Byte-addressed view of the memory the GPU shares with its producer.
///
/// Ring buffers, ring cursors, fence slots and copy buffers are all reached through this trait.
/// `read_physical` takes `&mut self` because a backing store may track or fault on reads. Typed
/// helpers are little-endian, matching the packet and cursor layouts.
pub trait MemoryBus {
    fn read_physical(&mut self, addr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, addr: u64, buf: &[u8]);

    fn read_u8(&mut self, addr: u64) -> u8 {
        let [byte] = read_array(self, addr);
        byte
    }

    fn read_u16(&mut self, addr: u64) -> u16 {
        u16::from_le_bytes(read_array(self, addr))
    }

    fn read_u32(&mut self, addr: u64) -> u32 {
        u32::from_le_bytes(read_array(self, addr))
    }

    /// Ring cursors and 64-bit fences.
    fn read_u64(&mut self, addr: u64) -> u64 {
        u64::from_le_bytes(read_array(self, addr))
    }

    fn write_u8(&mut self, addr: u64, val: u8) {
        self.write_physical(addr, &[val]);
    }

    fn write_u16(&mut self, addr: u64, val: u16) {
        self.write_physical(addr, &val.to_le_bytes());
    }

    fn write_u32(&mut self, addr: u64, val: u32) {
        self.write_physical(addr, &val.to_le_bytes());
    }

    fn write_u64(&mut self, addr: u64, val: u64) {
        self.write_physical(addr, &val.to_le_bytes());
    }
}

fn read_array<B: MemoryBus + ?Sized, const N: usize>(bus: &mut B, addr: u64) -> [u8; N] {
    let mut out = [0u8; N];
    bus.read_physical(addr, &mut out);
    out
}

impl<T: MemoryBus + ?Sized> MemoryBus for &mut T {
    fn read_physical(&mut self, addr: u64, buf: &mut [u8]) {
        (**self).read_physical(addr, buf);
    }

    fn write_physical(&mut self, addr: u64, buf: &[u8]) {
        (**self).write_physical(addr, buf);
    }
}
