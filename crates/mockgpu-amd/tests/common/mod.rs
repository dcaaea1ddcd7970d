#![allow(dead_code)]

use mockgpu_amd::{AmdGpu, DrainOutcome, ExecError, MockGpuConfig, QueueId, RingDesc, RingProducer};
use mockgpu_memory::{MemoryBus, SparseMemory};

pub const RING_BASE: u64 = 0x10_000;
pub const RING_SIZE: u64 = 0x1000;
pub const RPTR_ADDR: u64 = 0x20_000;
pub const WPTR_ADDR: u64 = 0x20_008;
pub const SCRATCH: u64 = 0x40_000;

/// Routes executor logs to the test harness; set `RUST_LOG=mockgpu_amd=trace` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ring_desc() -> RingDesc {
    RingDesc {
        base: RING_BASE,
        size: RING_SIZE,
        rptr_addr: RPTR_ADDR,
        wptr_addr: WPTR_ADDR,
    }
}

/// A device with one queue, its producer, and the memory image they share.
pub struct Harness {
    pub gpu: AmdGpu,
    pub mem: SparseMemory,
    pub producer: RingProducer,
    pub queue: QueueId,
}

impl Harness {
    pub fn pm4(gpu: AmdGpu) -> Self {
        init_tracing();
        let mut gpu = gpu;
        let mut mem = SparseMemory::new();
        let producer = RingProducer::pm4(&mut mem, ring_desc()).unwrap();
        let queue = gpu.add_pm4_queue(ring_desc()).unwrap();
        Self {
            gpu,
            mem,
            producer,
            queue,
        }
    }

    pub fn sdma(gpu: AmdGpu) -> Self {
        init_tracing();
        let mut gpu = gpu;
        let mut mem = SparseMemory::new();
        let producer = RingProducer::sdma(&mut mem, ring_desc()).unwrap();
        let queue = gpu.add_sdma_queue(ring_desc()).unwrap();
        Self {
            gpu,
            mem,
            producer,
            queue,
        }
    }

    pub fn default_pm4() -> Self {
        Self::pm4(AmdGpu::new(MockGpuConfig::default()))
    }

    pub fn default_sdma() -> Self {
        Self::sdma(AmdGpu::new(MockGpuConfig::default()))
    }

    pub fn submit(&mut self, packet: &[u32]) {
        self.producer.submit(&mut self.mem, packet).unwrap();
    }

    /// Writes a packet without publishing the write cursor.
    pub fn stage(&mut self, packet: &[u32]) {
        self.producer.write_dwords(&mut self.mem, packet).unwrap();
    }

    pub fn publish(&mut self) {
        self.producer.publish(&mut self.mem);
    }

    pub fn drain(&mut self) -> Result<DrainOutcome, ExecError> {
        self.gpu.execute(self.queue, &mut self.mem)
    }

    pub fn rptr(&mut self) -> u64 {
        self.mem.read_u64(RPTR_ADDR)
    }

    pub fn wptr(&mut self) -> u64 {
        self.mem.read_u64(WPTR_ADDR)
    }
}
