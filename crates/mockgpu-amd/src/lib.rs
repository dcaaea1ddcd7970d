//! Mock AMD GPU command processor.
//!
//! Consumes PM4 (graphics/compute) and SDMA (copy engine) packet streams from ring buffers in a
//! shared memory image, the way a real command processor would:
//! - [`pm4`] programs compute shader registers, signals and waits on fences, and launches kernels
//!   through the [`emulator::KernelEmulator`] boundary,
//! - [`sdma`] copies memory, writes fences and polls memory,
//! - [`device::AmdGpu`] owns the register file, the mapped ranges and the queues.
//!
//! Draining is cooperative: [`AmdGpu::execute`] returns [`DrainOutcome::Blocked`] when a wait
//! packet is unsatisfied, and the caller retries after the memory it waits on changes.
#![forbid(unsafe_code)]

pub mod config;
pub mod device;
pub mod emulator;
pub mod error;
pub mod pm4;
pub mod producer;
pub mod ranges;
pub mod regs;
pub mod ring;
pub mod sdma;
pub mod sync;

pub use config::{MockGpuConfig, TimestampMode, SDMA_MAX_COPY_SIZE};
pub use device::{AmdGpu, ExecContext, Queue, QueueId, QueueKind};
pub use emulator::{KernelEmulator, KernelLaunch, NullKernelEmulator, RecordingKernelEmulator};
pub use error::{ExecError, Pm4Error, QueueError, RangeError, SdmaError};
pub use mockgpu_memory::{MemoryBus, SparseMemory};
pub use pm4::{Pm4Executor, Pm4Header, Pm4Opcode, Pm4Packet};
pub use producer::RingProducer;
pub use ranges::{MappedRange, MappedRanges};
pub use regs::RegisterFile;
pub use ring::{CursorUnit, RingDesc, RingQueue};
pub use sdma::{SdmaExecutor, SdmaOpcode, SdmaPacket};
pub use sync::{CompareFunction, DrainOutcome};
