//! Boundary to the external instruction-set emulator that runs compute kernels.

use std::cell::RefCell;
use std::rc::Rc;

use mockgpu_memory::MemoryBus;

/// Parameters of one `DISPATCH_DIRECT` launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLaunch {
    /// Address of the first kernel instruction.
    pub program_addr: u64,
    /// Bytes available from `program_addr` to the end of its mapped range.
    pub program_len: u64,
    pub grid: [u32; 3],
    pub local: [u32; 3],
    /// Address of the kernel argument buffer.
    pub args_addr: u64,
}

/// Executes a kernel's machine code against the shared memory image.
///
/// The command processor treats the call as an opaque side effect: the implementation may read
/// and write any memory it likes. The returned status is logged, never interpreted.
pub trait KernelEmulator {
    fn run(&mut self, mem: &mut dyn MemoryBus, launch: &KernelLaunch) -> u32;
}

/// Emulator that does nothing and reports success.
#[derive(Debug, Default)]
pub struct NullKernelEmulator;

impl KernelEmulator for NullKernelEmulator {
    fn run(&mut self, _mem: &mut dyn MemoryBus, _launch: &KernelLaunch) -> u32 {
        0
    }
}

/// Emulator that records every launch and returns a fixed status.
///
/// Clones share one launch log, so a clone can be handed to [`crate::AmdGpu`] while the original
/// is kept for inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingKernelEmulator {
    launches: Rc<RefCell<Vec<KernelLaunch>>>,
    status: u32,
}

impl RecordingKernelEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: u32) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> Vec<KernelLaunch> {
        self.launches.borrow().clone()
    }
}

impl KernelEmulator for RecordingKernelEmulator {
    fn run(&mut self, _mem: &mut dyn MemoryBus, launch: &KernelLaunch) -> u32 {
        self.launches.borrow_mut().push(*launch);
        self.status
    }
}

impl<F> KernelEmulator for F
where
    F: FnMut(&mut dyn MemoryBus, &KernelLaunch) -> u32,
{
    fn run(&mut self, mem: &mut dyn MemoryBus, launch: &KernelLaunch) -> u32 {
        self(mem, launch)
    }
}
