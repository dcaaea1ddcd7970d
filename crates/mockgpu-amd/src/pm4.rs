//! PM4 (type-3) command processor.
//!
//! Header layout: `type[31:30] count[29:16] opcode[15:8]`. A packet is `count + 2` dwords long:
//! the header followed by `count + 1` payload dwords. PM4 ring cursors count dwords.

use mockgpu_memory::MemoryBus;
use tracing::{debug, trace, warn};

use crate::device::ExecContext;
use crate::emulator::KernelLaunch;
use crate::error::Pm4Error;
use crate::regs::u64_from_pair;
use crate::ring::RingQueue;
use crate::sync::{CompareFunction, DrainOutcome};

pub const PM4_TYPE_3: u32 = 3;

pub const PACKET3_DISPATCH_DIRECT: u8 = 0x15;
pub const PACKET3_WAIT_REG_MEM: u8 = 0x3C;
pub const PACKET3_RELEASE_MEM: u8 = 0x49;
pub const PACKET3_ACQUIRE_MEM: u8 = 0x58;
pub const PACKET3_SET_SH_REG: u8 = 0x76;

pub const CACHE_FLUSH_AND_INV_TS_EVENT: u32 = 0x14;

/// Both value selectors write the full 64-bit `data` field.
pub const RELEASE_MEM_DATA_SEL_VALUE: u32 = 1;
pub const RELEASE_MEM_DATA_SEL_VALUE_64: u32 = 2;
pub const RELEASE_MEM_DATA_SEL_TIMESTAMP: u32 = 3;

pub const WAIT_REG_MEM_SPACE_REGISTER: u32 = 0;
pub const WAIT_REG_MEM_SPACE_MEMORY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pm4Opcode {
    SetShReg,
    AcquireMem,
    ReleaseMem,
    WaitRegMem,
    DispatchDirect,
}

impl Pm4Opcode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            PACKET3_SET_SH_REG => Some(Self::SetShReg),
            PACKET3_ACQUIRE_MEM => Some(Self::AcquireMem),
            PACKET3_RELEASE_MEM => Some(Self::ReleaseMem),
            PACKET3_WAIT_REG_MEM => Some(Self::WaitRegMem),
            PACKET3_DISPATCH_DIRECT => Some(Self::DispatchDirect),
            _ => None,
        }
    }

    pub const fn raw(self) -> u8 {
        match self {
            Self::SetShReg => PACKET3_SET_SH_REG,
            Self::AcquireMem => PACKET3_ACQUIRE_MEM,
            Self::ReleaseMem => PACKET3_RELEASE_MEM,
            Self::WaitRegMem => PACKET3_WAIT_REG_MEM,
            Self::DispatchDirect => PACKET3_DISPATCH_DIRECT,
        }
    }

    /// The header count this opcode requires, or `None` if it is variable-length.
    pub const fn fixed_count(self) -> Option<u32> {
        match self {
            Self::SetShReg => None,
            Self::AcquireMem => Some(AcquireMem::COUNT),
            Self::ReleaseMem => Some(ReleaseMem::COUNT),
            Self::WaitRegMem => Some(WaitRegMem::COUNT),
            Self::DispatchDirect => Some(DispatchDirect::COUNT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pm4Header {
    pub packet_type: u32,
    pub count: u32,
    pub opcode: u8,
}

impl Pm4Header {
    pub const fn decode(raw: u32) -> Self {
        Self {
            packet_type: raw >> 30,
            count: (raw >> 16) & 0x3FFF,
            opcode: ((raw >> 8) & 0xFF) as u8,
        }
    }

    pub const fn encode(self) -> u32 {
        ((self.packet_type & 0b11) << 30)
            | ((self.count & 0x3FFF) << 16)
            | ((self.opcode as u32) << 8)
    }

    /// Type-3 header for `opcode` with the given count field.
    pub const fn type3(opcode: Pm4Opcode, count: u32) -> Self {
        Self {
            packet_type: PM4_TYPE_3,
            count,
            opcode: opcode.raw(),
        }
    }

    /// Total packet length in dwords, header included.
    pub const fn packet_dwords(self) -> u64 {
        self.count as u64 + 2
    }
}

fn packet(opcode: Pm4Opcode, payload: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(Pm4Header::type3(opcode, payload.len() as u32 - 1).encode());
    out.extend_from_slice(payload);
    out
}

/// `SET_SH_REG`: writes `values` to consecutive registers starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetShReg {
    pub start: u32,
    pub values: Vec<u32>,
}

impl SetShReg {
    fn decode(payload: &[u32]) -> Self {
        Self {
            start: payload[0],
            values: payload[1..].to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        let mut payload = Vec::with_capacity(self.values.len() + 1);
        payload.push(self.start);
        payload.extend_from_slice(&self.values);
        packet(Pm4Opcode::SetShReg, &payload)
    }
}

/// `ACQUIRE_MEM`: cache invalidation request. The payload is carried verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquireMem {
    pub payload: [u32; 7],
}

impl AcquireMem {
    pub const COUNT: u32 = 6;

    fn decode(payload: &[u32]) -> Self {
        let mut out = Self::default();
        out.payload.copy_from_slice(payload);
        out
    }

    pub fn encode(&self) -> Vec<u32> {
        packet(Pm4Opcode::AcquireMem, &self.payload)
    }
}

/// `RELEASE_MEM`: end-of-pipe memory write used as a completion fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseMem {
    pub event_type: u32,
    pub event_index: u32,
    pub data_sel: u32,
    pub int_sel: u32,
    pub dst_sel: u32,
    pub addr: u64,
    pub data: u64,
    pub event_id: u32,
}

impl ReleaseMem {
    pub const COUNT: u32 = 6;

    fn decode(payload: &[u32]) -> Self {
        let event = payload[0];
        let selectors = payload[1];
        Self {
            event_type: event & 0xFF,
            event_index: (event >> 8) & 0xF,
            data_sel: (selectors >> 29) & 0b111,
            int_sel: (selectors >> 24) & 0b11,
            dst_sel: (selectors >> 16) & 0b1,
            addr: u64_from_pair(payload[2], payload[3]),
            data: u64_from_pair(payload[4], payload[5]),
            event_id: payload[6],
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        packet(
            Pm4Opcode::ReleaseMem,
            &[
                (self.event_type & 0xFF) | ((self.event_index & 0xF) << 8),
                ((self.data_sel & 0b111) << 29)
                    | ((self.int_sel & 0b11) << 24)
                    | ((self.dst_sel & 0b1) << 16),
                self.addr as u32,
                (self.addr >> 32) as u32,
                self.data as u32,
                (self.data >> 32) as u32,
                self.event_id,
            ],
        )
    }
}

/// `WAIT_REG_MEM`: blocks the queue until a compare against memory succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRegMem {
    pub function: u32,
    pub mem_space: u32,
    pub operation: u32,
    pub engine: u32,
    pub addr: u64,
    pub reference: u32,
    pub mask: u32,
    pub poll_interval: u32,
}

impl WaitRegMem {
    pub const COUNT: u32 = 5;

    fn decode(payload: &[u32]) -> Self {
        let info = payload[0];
        Self {
            function: info & 0b111,
            mem_space: (info >> 4) & 0b1,
            operation: (info >> 6) & 0b1,
            engine: (info >> 8) & 0b1,
            addr: u64_from_pair(payload[1], payload[2]),
            reference: payload[3],
            mask: payload[4],
            poll_interval: payload[5],
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        packet(
            Pm4Opcode::WaitRegMem,
            &[
                (self.function & 0b111)
                    | ((self.mem_space & 0b1) << 4)
                    | ((self.operation & 0b1) << 6)
                    | ((self.engine & 0b1) << 8),
                self.addr as u32,
                (self.addr >> 32) as u32,
                self.reference,
                self.mask,
                self.poll_interval,
            ],
        )
    }
}

/// `DISPATCH_DIRECT`: launches the compute program configured in the SH registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDirect {
    pub grid: [u32; 3],
    pub initiator: u32,
}

impl DispatchDirect {
    pub const COUNT: u32 = 3;

    fn decode(payload: &[u32]) -> Self {
        Self {
            grid: [payload[0], payload[1], payload[2]],
            initiator: payload[3],
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        packet(
            Pm4Opcode::DispatchDirect,
            &[self.grid[0], self.grid[1], self.grid[2], self.initiator],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pm4Packet {
    SetShReg(SetShReg),
    AcquireMem(AcquireMem),
    ReleaseMem(ReleaseMem),
    WaitRegMem(WaitRegMem),
    DispatchDirect(DispatchDirect),
}

impl Pm4Packet {
    /// Decodes the payload (everything after the header) of an `opcode` packet.
    ///
    /// `payload` must already be exactly `count + 1` dwords long with `count` validated against
    /// [`Pm4Opcode::fixed_count`].
    pub fn decode(opcode: Pm4Opcode, payload: &[u32]) -> Self {
        match opcode {
            Pm4Opcode::SetShReg => Self::SetShReg(SetShReg::decode(payload)),
            Pm4Opcode::AcquireMem => Self::AcquireMem(AcquireMem::decode(payload)),
            Pm4Opcode::ReleaseMem => Self::ReleaseMem(ReleaseMem::decode(payload)),
            Pm4Opcode::WaitRegMem => Self::WaitRegMem(WaitRegMem::decode(payload)),
            Pm4Opcode::DispatchDirect => Self::DispatchDirect(DispatchDirect::decode(payload)),
        }
    }

    pub fn encode(&self) -> Vec<u32> {
        match self {
            Self::SetShReg(p) => p.encode(),
            Self::AcquireMem(p) => p.encode(),
            Self::ReleaseMem(p) => p.encode(),
            Self::WaitRegMem(p) => p.encode(),
            Self::DispatchDirect(p) => p.encode(),
        }
    }
}

/// Executes PM4 packets from a ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pm4Executor {
    ring: RingQueue,
}

impl Pm4Executor {
    pub fn new(ring: RingQueue) -> Self {
        Self { ring }
    }

    pub fn ring(&self) -> &RingQueue {
        &self.ring
    }

    /// Runs packets until the ring is empty or a `WAIT_REG_MEM` blocks.
    ///
    /// Packets are applied atomically: the read cursor moves past a packet only once it has been
    /// fully applied, so on error or when blocked it still points at that packet's header.
    pub fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<DrainOutcome, Pm4Error> {
        loop {
            let rptr = self.ring.read_ptr(ctx.mem);
            let wptr = self.ring.write_ptr(ctx.mem);
            if rptr >= wptr {
                return Ok(DrainOutcome::Idle);
            }

            let (packet, dwords) = self.fetch(ctx.mem, rptr, wptr)?;
            if ctx.config.verbose {
                debug!(rptr, ?packet, "pm4 packet");
            }

            match apply(ctx, packet)? {
                DrainOutcome::Idle => self.ring.advance(ctx.mem, dwords),
                DrainOutcome::Blocked => return Ok(DrainOutcome::Blocked),
            }
        }
    }

    fn fetch(
        &self,
        mem: &mut dyn MemoryBus,
        rptr: u64,
        wptr: u64,
    ) -> Result<(Pm4Packet, u64), Pm4Error> {
        let header = Pm4Header::decode(self.ring.peek_u32(mem, rptr));
        if header.packet_type != PM4_TYPE_3 {
            return Err(Pm4Error::UnsupportedPacketType {
                packet_type: header.packet_type,
                rptr,
            });
        }

        let opcode = Pm4Opcode::from_raw(header.opcode).ok_or(Pm4Error::UnknownOpcode {
            opcode: header.opcode,
            rptr,
        })?;
        if let Some(expected) = opcode.fixed_count() {
            if header.count != expected {
                return Err(Pm4Error::BadCount {
                    opcode,
                    expected,
                    found: header.count,
                    rptr,
                });
            }
        }

        let dwords = header.packet_dwords();
        let available = wptr - rptr;
        if dwords > available {
            return Err(Pm4Error::TruncatedPacket {
                needed: dwords,
                available,
                rptr,
            });
        }

        let payload = self
            .ring
            .peek_dwords(mem, rptr + 1, header.count as usize + 1);
        Ok((Pm4Packet::decode(opcode, &payload), dwords))
    }
}

fn apply(ctx: &mut ExecContext<'_>, packet: Pm4Packet) -> Result<DrainOutcome, Pm4Error> {
    match packet {
        Pm4Packet::SetShReg(p) => {
            for (i, value) in p.values.into_iter().enumerate() {
                ctx.regs.set(p.start.wrapping_add(i as u32), value);
            }
        }
        Pm4Packet::AcquireMem(_) => {
            // Cache invalidation has no observable effect on the emulated memory image.
            trace!("pm4 ACQUIRE_MEM ignored");
        }
        Pm4Packet::ReleaseMem(p) => release_mem(ctx, &p)?,
        Pm4Packet::WaitRegMem(p) => return wait_reg_mem(ctx, &p),
        Pm4Packet::DispatchDirect(p) => dispatch_direct(ctx, &p)?,
    }
    Ok(DrainOutcome::Idle)
}

fn release_mem(ctx: &mut ExecContext<'_>, p: &ReleaseMem) -> Result<(), Pm4Error> {
    match p.data_sel {
        RELEASE_MEM_DATA_SEL_VALUE | RELEASE_MEM_DATA_SEL_VALUE_64 => {
            ctx.mem.write_u64(p.addr, p.data);
        }
        RELEASE_MEM_DATA_SEL_TIMESTAMP if p.event_type == CACHE_FLUSH_AND_INV_TS_EVENT => {
            let ts = ctx.config.timestamp.sample(ctx.epoch);
            ctx.mem.write_u32(p.addr, ts);
        }
        _ => {
            return Err(Pm4Error::UnsupportedReleaseMem {
                data_sel: p.data_sel,
                event_type: p.event_type,
            })
        }
    }
    trace!(
        addr = p.addr,
        int_sel = p.int_sel,
        dst_sel = p.dst_sel,
        "pm4 RELEASE_MEM signaled"
    );
    Ok(())
}

fn wait_reg_mem(ctx: &mut ExecContext<'_>, p: &WaitRegMem) -> Result<DrainOutcome, Pm4Error> {
    let function = CompareFunction::from_raw(p.function).ok_or(
        Pm4Error::UnsupportedWaitFunction {
            function: p.function,
        },
    )?;

    // The mask is not applied here, unlike SDMA POLL_REGMEM.
    let value = if p.mem_space == WAIT_REG_MEM_SPACE_REGISTER {
        p.reference
    } else {
        ctx.mem.read_u32(p.addr)
    };

    if function.evaluate(value, p.reference) {
        Ok(DrainOutcome::Idle)
    } else {
        trace!(addr = p.addr, value, reference = p.reference, "pm4 WAIT_REG_MEM blocked");
        Ok(DrainOutcome::Blocked)
    }
}

fn dispatch_direct(ctx: &mut ExecContext<'_>, p: &DispatchDirect) -> Result<(), Pm4Error> {
    let program_addr = ctx.regs.program_address();
    let program_len = ctx
        .ranges
        .available_from(program_addr)
        .ok_or(Pm4Error::InvalidProgramPointer { addr: program_addr })?;

    let launch = KernelLaunch {
        program_addr,
        program_len,
        grid: p.grid,
        local: ctx.regs.local_size(),
        args_addr: ctx.regs.kernel_args_address(),
    };
    let status = ctx.emulator.run(ctx.mem, &launch);
    if status != 0 {
        warn!(status, program_addr, "kernel emulator returned non-zero status");
    }
    Ok(())
}
