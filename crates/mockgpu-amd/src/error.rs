use thiserror::Error;

use crate::device::QueueId;
use crate::pm4::Pm4Opcode;

/// Fatal PM4 decode/execution failures.
///
/// `rptr` is the read cursor (in dwords) of the packet header that failed; the queue's read cursor
/// is left there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Pm4Error {
    #[error("PM4: only type-3 packets are supported (found type {packet_type} at rptr={rptr})")]
    UnsupportedPacketType { packet_type: u32, rptr: u64 },

    #[error("PM4: unknown opcode 0x{opcode:02X} at rptr={rptr}")]
    UnknownOpcode { opcode: u8, rptr: u64 },

    #[error("PM4: {opcode:?} expects count={expected} (found {found}) at rptr={rptr}")]
    BadCount {
        opcode: Pm4Opcode,
        expected: u32,
        found: u32,
        rptr: u64,
    },

    #[error("PM4: packet needs {needed} dwords but only {available} are queued at rptr={rptr}")]
    TruncatedPacket {
        needed: u64,
        available: u64,
        rptr: u64,
    },

    #[error("PM4: unsupported RELEASE_MEM combination data_sel={data_sel} event_type=0x{event_type:02X}")]
    UnsupportedReleaseMem { data_sel: u32, event_type: u32 },

    #[error("PM4: unsupported WAIT_REG_MEM function {function}")]
    UnsupportedWaitFunction { function: u32 },

    #[error("PM4: invalid program pointer 0x{addr:x} (not found in mapped ranges)")]
    InvalidProgramPointer { addr: u64 },
}

/// Fatal SDMA decode/execution failures.
///
/// `rptr` is the read cursor (in bytes) of the packet that failed; the queue's read cursor is left
/// there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdmaError {
    #[error("SDMA: unknown opcode {opcode} at rptr={rptr}")]
    UnknownOpcode { opcode: u8, rptr: u64 },

    #[error("SDMA: unsupported sub-op {sub_op} for opcode {opcode} at rptr={rptr}")]
    UnsupportedSubOp { opcode: u8, sub_op: u8, rptr: u64 },

    #[error("SDMA: packet needs {needed} bytes but only {available} are queued at rptr={rptr}")]
    TruncatedPacket {
        needed: u64,
        available: u64,
        rptr: u64,
    },

    #[error("SDMA: unsupported POLL_REGMEM function {function}")]
    UnsupportedPollFunction { function: u32 },

    #[error("SDMA: linear copy of {len} bytes exceeds the {max} byte limit")]
    CopyTooLarge { len: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range base=0x{base:x} size=0x{size:x} is not mapped")]
    NotMapped { base: u64, size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("ring size must be non-zero")]
    EmptyRing,

    #[error("ring size {size} is not a multiple of {granularity} bytes")]
    MisalignedSize { size: u64, granularity: u64 },

    #[error("ring base=0x{base:x} size=0x{size:x} overflows the address space")]
    RingOverflow { base: u64, size: u64 },

    #[error("ring full: need {needed} units but only {free} are free")]
    RingFull { needed: u64, free: u64 },
}

/// Error returned by [`crate::device::AmdGpu::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("unknown queue {0:?}")]
    UnknownQueue(QueueId),

    #[error(transparent)]
    Pm4(#[from] Pm4Error),

    #[error(transparent)]
    Sdma(#[from] SdmaError),
}
