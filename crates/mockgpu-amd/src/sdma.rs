//! SDMA (system DMA) engine.
//!
//! Every SDMA packet starts with a dword whose low byte is the opcode and whose second byte is
//! the sub-opcode. Packet sizes are fixed per opcode. SDMA ring cursors count bytes.

use mockgpu_memory::MemoryBus;
use tracing::{debug, trace};

use crate::device::ExecContext;
use crate::error::SdmaError;
use crate::regs::u64_from_pair;
use crate::ring::RingQueue;
use crate::sync::{CompareFunction, DrainOutcome};

pub const SDMA_OP_NOP: u8 = 0;
pub const SDMA_OP_COPY: u8 = 1;
pub const SDMA_OP_FENCE: u8 = 5;
pub const SDMA_OP_TRAP: u8 = 6;
pub const SDMA_OP_POLL_REGMEM: u8 = 8;
pub const SDMA_OP_GCR: u8 = 17;

pub const SDMA_SUBOP_COPY_LINEAR: u8 = 0;

/// Builds an SDMA header dword.
pub const fn sdma_header(op: u8, sub_op: u8) -> u32 {
    (op as u32) | ((sub_op as u32) << 8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdmaOpcode {
    Nop,
    Copy,
    Fence,
    Trap,
    PollRegmem,
    Gcr,
}

impl SdmaOpcode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            SDMA_OP_NOP => Some(Self::Nop),
            SDMA_OP_COPY => Some(Self::Copy),
            SDMA_OP_FENCE => Some(Self::Fence),
            SDMA_OP_TRAP => Some(Self::Trap),
            SDMA_OP_POLL_REGMEM => Some(Self::PollRegmem),
            SDMA_OP_GCR => Some(Self::Gcr),
            _ => None,
        }
    }

    pub const fn raw(self) -> u8 {
        match self {
            Self::Nop => SDMA_OP_NOP,
            Self::Copy => SDMA_OP_COPY,
            Self::Fence => SDMA_OP_FENCE,
            Self::Trap => SDMA_OP_TRAP,
            Self::PollRegmem => SDMA_OP_POLL_REGMEM,
            Self::Gcr => SDMA_OP_GCR,
        }
    }

    /// Size of this opcode's packet in bytes.
    pub const fn packet_bytes(self) -> u64 {
        match self {
            Self::Nop => 4,
            Self::Copy => CopyLinear::SIZE_BYTES,
            Self::Fence => Fence::SIZE_BYTES,
            Self::Trap => Trap::SIZE_BYTES,
            Self::PollRegmem => PollRegmem::SIZE_BYTES,
            Self::Gcr => Gcr::SIZE_BYTES,
        }
    }
}

/// `COPY` with the `LINEAR` sub-op: moves `count + 1` bytes from `src` to `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyLinear {
    /// Byte count minus one.
    pub count: u32,
    pub parameter: u32,
    pub src: u64,
    pub dst: u64,
}

impl CopyLinear {
    pub const SIZE_BYTES: u64 = 28;
    pub const COUNT_MASK: u32 = 0x3FFF_FFFF;

    /// Packet copying `len` bytes. `len` must be in `1..=COUNT_MASK + 1`.
    pub fn new(src: u64, dst: u64, len: u32) -> Self {
        Self {
            count: len.wrapping_sub(1) & Self::COUNT_MASK,
            parameter: 0,
            src,
            dst,
        }
    }

    pub fn len(&self) -> u64 {
        u64::from(self.count) + 1
    }

    fn decode(words: &[u32]) -> Self {
        Self {
            count: words[1] & Self::COUNT_MASK,
            parameter: words[2],
            src: u64_from_pair(words[3], words[4]),
            dst: u64_from_pair(words[5], words[6]),
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        vec![
            sdma_header(SDMA_OP_COPY, SDMA_SUBOP_COPY_LINEAR),
            self.count & Self::COUNT_MASK,
            self.parameter,
            self.src as u32,
            (self.src >> 32) as u32,
            self.dst as u32,
            (self.dst >> 32) as u32,
        ]
    }
}

/// `FENCE`: writes `data` (zero-extended to 64 bits) to `addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    pub addr: u64,
    pub data: u32,
}

impl Fence {
    pub const SIZE_BYTES: u64 = 16;

    fn decode(words: &[u32]) -> Self {
        Self {
            addr: u64_from_pair(words[1], words[2]),
            data: words[3],
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        vec![
            sdma_header(SDMA_OP_FENCE, 0),
            self.addr as u32,
            (self.addr >> 32) as u32,
            self.data,
        ]
    }
}

/// `TRAP`: host interrupt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap {
    pub int_context: u32,
}

impl Trap {
    pub const SIZE_BYTES: u64 = 8;
    const INT_CONTEXT_MASK: u32 = 0x0FFF_FFFF;

    fn decode(words: &[u32]) -> Self {
        Self {
            int_context: words[1] & Self::INT_CONTEXT_MASK,
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        vec![
            sdma_header(SDMA_OP_TRAP, 0),
            self.int_context & Self::INT_CONTEXT_MASK,
        ]
    }
}

/// `POLL_REGMEM`: blocks the queue until `(read & mask) <func> value` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRegmem {
    pub func: u32,
    /// 0 = compare the embedded `value`, 1 = read a dword from `addr`.
    pub mem_poll: u32,
    pub hdp_flush: u32,
    pub addr: u64,
    pub value: u32,
    pub mask: u32,
    pub interval: u32,
    pub retry_count: u32,
}

impl PollRegmem {
    pub const SIZE_BYTES: u64 = 24;

    fn decode(words: &[u32]) -> Self {
        let header = words[0];
        Self {
            func: (header >> 28) & 0b111,
            mem_poll: (header >> 31) & 0b1,
            hdp_flush: (header >> 26) & 0b1,
            addr: u64_from_pair(words[1], words[2]),
            value: words[3],
            mask: words[4],
            interval: words[5] & 0xFFFF,
            retry_count: (words[5] >> 16) & 0xFFF,
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        vec![
            sdma_header(SDMA_OP_POLL_REGMEM, 0)
                | ((self.hdp_flush & 0b1) << 26)
                | ((self.func & 0b111) << 28)
                | ((self.mem_poll & 0b1) << 31),
            self.addr as u32,
            (self.addr >> 32) as u32,
            self.value,
            self.mask,
            (self.interval & 0xFFFF) | ((self.retry_count & 0xFFF) << 16),
        ]
    }
}

/// `GCR`: cache/coherency control over a VA range. Carried verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gcr {
    pub payload: [u32; 5],
}

impl Gcr {
    pub const SIZE_BYTES: u64 = 24;

    fn decode(words: &[u32]) -> Self {
        let mut out = Self::default();
        out.payload.copy_from_slice(&words[1..6]);
        out
    }

    pub fn encode(&self) -> Vec<u32> {
        let mut out = vec![sdma_header(SDMA_OP_GCR, 0)];
        out.extend_from_slice(&self.payload);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdmaPacket {
    Nop,
    CopyLinear(CopyLinear),
    Fence(Fence),
    Trap(Trap),
    PollRegmem(PollRegmem),
    Gcr(Gcr),
}

impl SdmaPacket {
    /// Decodes a packet from its dwords (header included). `words` must hold
    /// `opcode.packet_bytes() / 4` entries.
    pub fn decode(opcode: SdmaOpcode, words: &[u32], rptr: u64) -> Result<Self, SdmaError> {
        Ok(match opcode {
            SdmaOpcode::Nop => Self::Nop,
            SdmaOpcode::Copy => {
                let sub_op = ((words[0] >> 8) & 0xFF) as u8;
                if sub_op != SDMA_SUBOP_COPY_LINEAR {
                    return Err(SdmaError::UnsupportedSubOp {
                        opcode: SDMA_OP_COPY,
                        sub_op,
                        rptr,
                    });
                }
                Self::CopyLinear(CopyLinear::decode(words))
            }
            SdmaOpcode::Fence => Self::Fence(Fence::decode(words)),
            SdmaOpcode::Trap => Self::Trap(Trap::decode(words)),
            SdmaOpcode::PollRegmem => Self::PollRegmem(PollRegmem::decode(words)),
            SdmaOpcode::Gcr => Self::Gcr(Gcr::decode(words)),
        })
    }

    pub fn encode(&self) -> Vec<u32> {
        match self {
            Self::Nop => vec![sdma_header(SDMA_OP_NOP, 0)],
            Self::CopyLinear(p) => p.encode(),
            Self::Fence(p) => p.encode(),
            Self::Trap(p) => p.encode(),
            Self::PollRegmem(p) => p.encode(),
            Self::Gcr(p) => p.encode(),
        }
    }
}

/// Executes SDMA packets from a ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdmaExecutor {
    ring: RingQueue,
}

impl SdmaExecutor {
    pub fn new(ring: RingQueue) -> Self {
        Self { ring }
    }

    pub fn ring(&self) -> &RingQueue {
        &self.ring
    }

    /// Runs packets until the ring is empty or a `POLL_REGMEM` is not yet satisfied.
    ///
    /// The read cursor only moves past a packet after it has been applied; a blocked poll or a
    /// failing packet leaves it pointing at that packet.
    pub fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<DrainOutcome, SdmaError> {
        loop {
            let rptr = self.ring.read_ptr(ctx.mem);
            let wptr = self.ring.write_ptr(ctx.mem);
            if rptr >= wptr {
                return Ok(DrainOutcome::Idle);
            }

            let (packet, size) = self.fetch(ctx.mem, rptr, wptr)?;
            if ctx.config.verbose {
                debug!(rptr, ?packet, "sdma packet");
            }

            match apply(ctx, &packet)? {
                DrainOutcome::Idle => self.ring.advance(ctx.mem, size),
                DrainOutcome::Blocked => return Ok(DrainOutcome::Blocked),
            }
        }
    }

    fn fetch(
        &self,
        mem: &mut dyn MemoryBus,
        rptr: u64,
        wptr: u64,
    ) -> Result<(SdmaPacket, u64), SdmaError> {
        let mut op = [0u8; 1];
        self.ring.peek_bytes(mem, rptr, &mut op);
        let opcode =
            SdmaOpcode::from_raw(op[0]).ok_or(SdmaError::UnknownOpcode { opcode: op[0], rptr })?;

        let size = opcode.packet_bytes();
        let available = wptr - rptr;
        if size > available {
            return Err(SdmaError::TruncatedPacket {
                needed: size,
                available,
                rptr,
            });
        }

        let words = self.ring.peek_dwords(mem, rptr, (size / 4) as usize);
        Ok((SdmaPacket::decode(opcode, &words, rptr)?, size))
    }
}

fn apply(ctx: &mut ExecContext<'_>, packet: &SdmaPacket) -> Result<DrainOutcome, SdmaError> {
    match packet {
        SdmaPacket::Nop => {}
        SdmaPacket::CopyLinear(p) => copy_linear(ctx, p)?,
        SdmaPacket::Fence(p) => {
            ctx.mem.write_u64(p.addr, u64::from(p.data));
        }
        SdmaPacket::Trap(p) => {
            trace!(int_context = p.int_context, "sdma TRAP");
        }
        SdmaPacket::PollRegmem(p) => return poll_regmem(ctx, p),
        SdmaPacket::Gcr(_) => {
            // Cache control has no observable effect on the emulated memory image.
            trace!("sdma GCR ignored");
        }
    }
    Ok(DrainOutcome::Idle)
}

fn copy_linear(ctx: &mut ExecContext<'_>, p: &CopyLinear) -> Result<(), SdmaError> {
    let len = p.len();
    if let Some(max) = ctx.config.sdma_max_copy_bytes {
        if len > max {
            return Err(SdmaError::CopyTooLarge { len, max });
        }
    }

    // Staged through a temporary buffer so overlapping ranges behave like memmove.
    let mut buf = vec![0u8; len as usize];
    ctx.mem.read_physical(p.src, &mut buf);
    ctx.mem.write_physical(p.dst, &buf);
    Ok(())
}

fn poll_regmem(ctx: &mut ExecContext<'_>, p: &PollRegmem) -> Result<DrainOutcome, SdmaError> {
    let function = CompareFunction::from_raw(p.func)
        .ok_or(SdmaError::UnsupportedPollFunction { function: p.func })?;

    let read = if p.mem_poll == 0 {
        p.value
    } else {
        ctx.mem.read_u32(p.addr)
    };

    if function.evaluate(read & p.mask, p.value) {
        Ok(DrainOutcome::Idle)
    } else {
        trace!(addr = p.addr, read, value = p.value, "sdma POLL_REGMEM blocked");
        Ok(DrainOutcome::Blocked)
    }
}
