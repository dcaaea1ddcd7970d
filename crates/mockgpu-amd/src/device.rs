//! Device-level state shared by every queue: the register file, mapped ranges, the kernel
//! emulator and configuration.

use std::time::Instant;

use mockgpu_memory::MemoryBus;
use tracing::debug;

use crate::config::MockGpuConfig;
use crate::emulator::{KernelEmulator, NullKernelEmulator};
use crate::error::{ExecError, QueueError, RangeError};
use crate::pm4::Pm4Executor;
use crate::ranges::MappedRanges;
use crate::regs::RegisterFile;
use crate::ring::{CursorUnit, RingDesc, RingQueue};
use crate::sdma::SdmaExecutor;
use crate::sync::DrainOutcome;

/// Handle returned when a queue is registered with [`AmdGpu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(usize);

impl QueueId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Pm4,
    Sdma,
}

/// Everything an executor may touch while draining its ring.
pub struct ExecContext<'a> {
    pub regs: &'a mut RegisterFile,
    pub ranges: &'a MappedRanges,
    pub mem: &'a mut dyn MemoryBus,
    pub emulator: &'a mut dyn KernelEmulator,
    pub config: &'a MockGpuConfig,
    /// Device creation time; the origin of host timestamps.
    pub epoch: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Queue {
    Pm4(Pm4Executor),
    Sdma(SdmaExecutor),
}

impl Queue {
    pub fn kind(&self) -> QueueKind {
        match self {
            Queue::Pm4(_) => QueueKind::Pm4,
            Queue::Sdma(_) => QueueKind::Sdma,
        }
    }

    pub fn ring(&self) -> &RingQueue {
        match self {
            Queue::Pm4(exec) => exec.ring(),
            Queue::Sdma(exec) => exec.ring(),
        }
    }
}

/// Mock AMD GPU: a set of PM4 and SDMA queues over one register file and memory image.
///
/// The memory image is owned by the caller and passed to [`AmdGpu::execute`], so producers can
/// write packets and cursors between drains.
pub struct AmdGpu {
    config: MockGpuConfig,
    regs: RegisterFile,
    ranges: MappedRanges,
    queues: Vec<Queue>,
    emulator: Box<dyn KernelEmulator>,
    epoch: Instant,
}

impl AmdGpu {
    pub fn new(config: MockGpuConfig) -> Self {
        Self::with_emulator(config, Box::new(NullKernelEmulator))
    }

    pub fn with_emulator(config: MockGpuConfig, emulator: Box<dyn KernelEmulator>) -> Self {
        Self {
            config,
            regs: RegisterFile::new(),
            ranges: MappedRanges::new(),
            queues: Vec::new(),
            emulator,
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &MockGpuConfig {
        &self.config
    }

    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn mapped_ranges(&self) -> &MappedRanges {
        &self.ranges
    }

    /// Records `[base, base + size)` as device-visible memory. Mapping the same range twice is a
    /// no-op.
    pub fn map_range(&mut self, base: u64, size: u64) {
        debug!(base, size, "map range");
        self.ranges.map(base, size);
    }

    pub fn unmap_range(&mut self, base: u64, size: u64) -> Result<(), RangeError> {
        debug!(base, size, "unmap range");
        self.ranges.unmap(base, size)
    }

    pub fn add_pm4_queue(&mut self, desc: RingDesc) -> Result<QueueId, QueueError> {
        let ring = RingQueue::new(desc, CursorUnit::Dword)?;
        Ok(self.push_queue(Queue::Pm4(Pm4Executor::new(ring))))
    }

    pub fn add_sdma_queue(&mut self, desc: RingDesc) -> Result<QueueId, QueueError> {
        let ring = RingQueue::new(desc, CursorUnit::Byte)?;
        Ok(self.push_queue(Queue::Sdma(SdmaExecutor::new(ring))))
    }

    fn push_queue(&mut self, queue: Queue) -> QueueId {
        let id = QueueId(self.queues.len());
        debug!(
            queue = id.index(),
            kind = ?queue.kind(),
            base = queue.ring().desc().base,
            size = queue.ring().desc().size,
            "queue added"
        );
        self.queues.push(queue);
        id
    }

    pub fn queue(&self, id: QueueId) -> Option<&Queue> {
        self.queues.get(id.0)
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Drains queue `id` until its ring is empty or a wait packet blocks it.
    ///
    /// Calling this again after [`DrainOutcome::Blocked`] re-evaluates the blocking packet.
    pub fn execute(
        &mut self,
        id: QueueId,
        mem: &mut dyn MemoryBus,
    ) -> Result<DrainOutcome, ExecError> {
        let queue = self
            .queues
            .get_mut(id.0)
            .ok_or(ExecError::UnknownQueue(id))?;
        let mut ctx = ExecContext {
            regs: &mut self.regs,
            ranges: &self.ranges,
            mem,
            emulator: self.emulator.as_mut(),
            config: &self.config,
            epoch: self.epoch,
        };
        let outcome = match queue {
            Queue::Pm4(exec) => exec.execute(&mut ctx)?,
            Queue::Sdma(exec) => exec.execute(&mut ctx)?,
        };
        if self.config.verbose {
            debug!(queue = id.index(), ?outcome, "queue drained");
        }
        Ok(outcome)
    }
}

impl Default for AmdGpu {
    fn default() -> Self {
        Self::new(MockGpuConfig::default())
    }
}
