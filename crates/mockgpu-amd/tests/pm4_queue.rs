mod common;

use std::collections::HashMap;

use common::{Harness, SCRATCH};
use mockgpu_amd::pm4::{
    AcquireMem, DispatchDirect, Pm4Header, ReleaseMem, SetShReg, WaitRegMem,
    CACHE_FLUSH_AND_INV_TS_EVENT, PM4_TYPE_3, RELEASE_MEM_DATA_SEL_TIMESTAMP,
    RELEASE_MEM_DATA_SEL_VALUE, RELEASE_MEM_DATA_SEL_VALUE_64, WAIT_REG_MEM_SPACE_MEMORY,
    WAIT_REG_MEM_SPACE_REGISTER,
};
use mockgpu_amd::regs::{COMPUTE_NUM_THREAD_X, COMPUTE_PGM_LO, COMPUTE_USER_DATA_0};
use mockgpu_amd::sync::{
    WAIT_REG_MEM_FUNCTION_ALWAYS, WAIT_REG_MEM_FUNCTION_EQ, WAIT_REG_MEM_FUNCTION_GEQ,
};
use mockgpu_amd::{
    AmdGpu, DrainOutcome, ExecError, KernelLaunch, MemoryBus, MockGpuConfig, Pm4Error, Pm4Opcode,
    RecordingKernelEmulator, TimestampMode,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn set_reg(index: u32, value: u32) -> Vec<u32> {
    SetShReg {
        start: index,
        values: vec![value],
    }
    .encode()
}

fn release_value(addr: u64, data: u64) -> Vec<u32> {
    ReleaseMem {
        event_type: 0,
        event_index: 0,
        data_sel: RELEASE_MEM_DATA_SEL_VALUE,
        int_sel: 0,
        dst_sel: 0,
        addr,
        data,
        event_id: 0,
    }
    .encode()
}

fn wait_mem(function: u32, addr: u64, reference: u32, mask: u32) -> Vec<u32> {
    WaitRegMem {
        function,
        mem_space: WAIT_REG_MEM_SPACE_MEMORY,
        operation: 0,
        engine: 0,
        addr,
        reference,
        mask,
        poll_interval: 4,
    }
    .encode()
}

#[test]
fn empty_ring_is_idle_without_side_effects() {
    let mut h = Harness::default_pm4();
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.rptr(), 0);
    assert!(h.gpu.regs().is_empty());
}

#[test]
fn set_sh_reg_writes_consecutive_registers() {
    let mut h = Harness::default_pm4();
    h.submit(
        &SetShReg {
            start: 0x40,
            values: vec![1, 2, 3],
        }
        .encode(),
    );
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(
        h.gpu.regs().iter().collect::<Vec<_>>(),
        vec![(0x40, 1), (0x41, 2), (0x42, 3)]
    );
    assert_eq!(h.rptr(), 5);
}

#[test]
fn release_mem_value_writes_exactly_eight_bytes() {
    let mut h = Harness::default_pm4();
    h.mem.write_physical(SCRATCH, &[0xEE; 24]);
    h.submit(&release_value(SCRATCH + 8, 0x1122_3344_5566_7788));
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));

    assert_eq!(h.mem.read_u64(SCRATCH + 8), 0x1122_3344_5566_7788);
    assert_eq!(h.mem.read_u64(SCRATCH), 0xEEEE_EEEE_EEEE_EEEE);
    assert_eq!(h.mem.read_u64(SCRATCH + 16), 0xEEEE_EEEE_EEEE_EEEE);
}

#[test]
fn release_mem_value_64_selector_writes_the_same_way() {
    let mut h = Harness::default_pm4();
    let mut packet = ReleaseMem {
        event_type: 0,
        event_index: 0,
        data_sel: RELEASE_MEM_DATA_SEL_VALUE_64,
        int_sel: 0,
        dst_sel: 0,
        addr: SCRATCH,
        data: u64::MAX,
        event_id: 0,
    };
    h.submit(&packet.encode());
    packet.addr = SCRATCH + 8;
    packet.data = 2;
    h.submit(&packet.encode());
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.mem.read_u64(SCRATCH), u64::MAX);
    assert_eq!(h.mem.read_u64(SCRATCH + 8), 2);
}

#[test]
fn release_mem_timestamp_writes_32_bits() {
    let config = MockGpuConfig {
        timestamp: TimestampMode::Fixed(0x1234),
        ..MockGpuConfig::default()
    };
    let mut h = Harness::pm4(AmdGpu::new(config));
    h.mem.write_u64(SCRATCH, u64::MAX);
    h.submit(
        &ReleaseMem {
            event_type: CACHE_FLUSH_AND_INV_TS_EVENT,
            event_index: 5,
            data_sel: RELEASE_MEM_DATA_SEL_TIMESTAMP,
            int_sel: 0,
            dst_sel: 0,
            addr: SCRATCH,
            data: 0,
            event_id: 0,
        }
        .encode(),
    );
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.mem.read_u32(SCRATCH), 0x1234);
    assert_eq!(h.mem.read_u32(SCRATCH + 4), u32::MAX);
}

#[test]
fn release_mem_timestamp_requires_cache_flush_event() {
    let mut h = Harness::default_pm4();
    h.submit(
        &ReleaseMem {
            event_type: 0x04,
            event_index: 0,
            data_sel: RELEASE_MEM_DATA_SEL_TIMESTAMP,
            int_sel: 0,
            dst_sel: 0,
            addr: SCRATCH,
            data: 0,
            event_id: 0,
        }
        .encode(),
    );
    assert_eq!(
        h.drain(),
        Err(ExecError::Pm4(Pm4Error::UnsupportedReleaseMem {
            data_sel: RELEASE_MEM_DATA_SEL_TIMESTAMP,
            event_type: 0x04,
        }))
    );
    assert_eq!(h.rptr(), 0);
}

#[test]
fn release_mem_rejects_unknown_data_selectors() {
    for data_sel in [0, 4, 5, 7] {
        let mut h = Harness::default_pm4();
        h.submit(
            &ReleaseMem {
                event_type: CACHE_FLUSH_AND_INV_TS_EVENT,
                event_index: 0,
                data_sel,
                int_sel: 0,
                dst_sel: 0,
                addr: SCRATCH,
                data: 0x55,
                event_id: 0,
            }
            .encode(),
        );
        assert_eq!(
            h.drain(),
            Err(ExecError::Pm4(Pm4Error::UnsupportedReleaseMem {
                data_sel,
                event_type: CACHE_FLUSH_AND_INV_TS_EVENT,
            }))
        );
        assert_eq!(h.rptr(), 0);
        assert_eq!(h.mem.read_u64(SCRATCH), 0);
    }
}

#[test]
fn acquire_mem_is_consumed_without_effect() {
    let mut h = Harness::default_pm4();
    h.submit(&AcquireMem { payload: [7; 7] }.encode());
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.rptr(), 8);
    assert!(h.gpu.regs().is_empty());
}

#[test]
fn wait_reg_mem_blocks_until_memory_matches() {
    let mut h = Harness::default_pm4();
    h.submit(&set_reg(1, 0xAA));
    h.submit(&wait_mem(WAIT_REG_MEM_FUNCTION_EQ, SCRATCH, 5, u32::MAX));
    h.submit(&set_reg(2, 0xBB));

    assert_eq!(h.drain(), Ok(DrainOutcome::Blocked));
    assert_eq!(h.rptr(), 3);
    assert_eq!(h.gpu.regs().get(1), 0xAA);
    assert_eq!(h.gpu.regs().get(2), 0);

    // Re-draining without a memory change stays put.
    assert_eq!(h.drain(), Ok(DrainOutcome::Blocked));
    assert_eq!(h.rptr(), 3);

    h.mem.write_u32(SCRATCH, 5);
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.rptr(), h.wptr());
    assert_eq!(h.gpu.regs().get(2), 0xBB);
}

#[test]
fn wait_reg_mem_greater_equal() {
    let mut h = Harness::default_pm4();
    h.mem.write_u32(SCRATCH, 9);
    h.submit(&wait_mem(WAIT_REG_MEM_FUNCTION_GEQ, SCRATCH, 10, u32::MAX));
    assert_eq!(h.drain(), Ok(DrainOutcome::Blocked));
    h.mem.write_u32(SCRATCH, 11);
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
}

#[test]
fn wait_reg_mem_ignores_its_mask() {
    let mut h = Harness::default_pm4();
    h.mem.write_u32(SCRATCH, 0x105);
    h.submit(&wait_mem(WAIT_REG_MEM_FUNCTION_EQ, SCRATCH, 5, 0xFF));
    assert_eq!(h.drain(), Ok(DrainOutcome::Blocked));
    assert_eq!(h.rptr(), 0);
}

#[test]
fn wait_reg_mem_always_and_register_space_pass_immediately() {
    let mut h = Harness::default_pm4();
    h.submit(&wait_mem(WAIT_REG_MEM_FUNCTION_ALWAYS, SCRATCH, 1, 0));
    h.submit(
        &WaitRegMem {
            function: WAIT_REG_MEM_FUNCTION_EQ,
            mem_space: WAIT_REG_MEM_SPACE_REGISTER,
            operation: 0,
            engine: 0,
            addr: 0,
            reference: 42,
            mask: u32::MAX,
            poll_interval: 0,
        }
        .encode(),
    );
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.rptr(), 14);
}

#[test]
fn wait_reg_mem_rejects_unsupported_functions() {
    let mut h = Harness::default_pm4();
    h.submit(&wait_mem(1, SCRATCH, 0, 0));
    assert_eq!(
        h.drain(),
        Err(ExecError::Pm4(Pm4Error::UnsupportedWaitFunction { function: 1 }))
    );
    assert_eq!(h.rptr(), 0);
}

#[test]
fn dispatch_direct_launches_configured_program() {
    let recorder = RecordingKernelEmulator::new();
    let mut gpu = AmdGpu::with_emulator(MockGpuConfig::default(), Box::new(recorder.clone()));
    gpu.map_range(0x10_0000, 0x1_0000);
    let mut h = Harness::pm4(gpu);

    h.submit(
        &SetShReg {
            start: COMPUTE_NUM_THREAD_X,
            values: vec![64, 2, 1],
        }
        .encode(),
    );
    h.submit(
        &SetShReg {
            start: COMPUTE_PGM_LO,
            values: vec![0x10_0400 >> 8, 0],
        }
        .encode(),
    );
    h.submit(
        &SetShReg {
            start: COMPUTE_USER_DATA_0,
            values: vec![0x5000_0000, 0x1],
        }
        .encode(),
    );
    h.submit(
        &DispatchDirect {
            grid: [4, 2, 1],
            initiator: 1,
        }
        .encode(),
    );
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));

    assert_eq!(
        recorder.launches(),
        vec![KernelLaunch {
            program_addr: 0x10_0400,
            program_len: 0xFC00,
            grid: [4, 2, 1],
            local: [64, 2, 1],
            args_addr: 0x1_5000_0000,
        }]
    );
}

#[test]
fn dispatch_direct_emulator_side_effects_reach_memory() {
    let emulator = |mem: &mut dyn MemoryBus, launch: &KernelLaunch| {
        mem.write_u32(launch.args_addr, 0xC0FFEE);
        0
    };
    let mut gpu = AmdGpu::with_emulator(MockGpuConfig::default(), Box::new(emulator));
    gpu.map_range(0, 0x1000);
    let mut h = Harness::pm4(gpu);
    h.submit(
        &SetShReg {
            start: COMPUTE_USER_DATA_0,
            values: vec![SCRATCH as u32, 0],
        }
        .encode(),
    );
    h.submit(
        &DispatchDirect {
            grid: [1, 1, 1],
            initiator: 0,
        }
        .encode(),
    );
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.mem.read_u32(SCRATCH), 0xC0FFEE);
}

#[test]
fn dispatch_direct_with_unmapped_program_fails() {
    let mut h = Harness::default_pm4();
    h.submit(&set_reg(COMPUTE_PGM_LO, 0x30));
    h.submit(
        &DispatchDirect {
            grid: [1, 1, 1],
            initiator: 0,
        }
        .encode(),
    );
    assert_eq!(
        h.drain(),
        Err(ExecError::Pm4(Pm4Error::InvalidProgramPointer { addr: 0x3000 }))
    );
    assert_eq!(h.rptr(), 3);
}

#[test]
fn malformed_headers_are_fatal_and_leave_the_cursor() {
    let mut h = Harness::default_pm4();
    h.submit(&[0x8000_0000]);
    assert_eq!(
        h.drain(),
        Err(ExecError::Pm4(Pm4Error::UnsupportedPacketType {
            packet_type: 2,
            rptr: 0
        }))
    );
    assert_eq!(h.rptr(), 0);

    let mut h = Harness::default_pm4();
    h.submit(&set_reg(0, 1));
    let unknown = Pm4Header {
        packet_type: PM4_TYPE_3,
        count: 0,
        opcode: 0x10,
    };
    h.submit(&[unknown.encode(), 0]);
    assert_eq!(
        h.drain(),
        Err(ExecError::Pm4(Pm4Error::UnknownOpcode {
            opcode: 0x10,
            rptr: 3
        }))
    );
    assert_eq!(h.rptr(), 3);
    assert_eq!(h.gpu.regs().get(0), 1);
}

#[test]
fn wrong_count_is_rejected() {
    let mut h = Harness::default_pm4();
    let mut packet = release_value(SCRATCH, 1);
    packet[0] = Pm4Header::type3(Pm4Opcode::ReleaseMem, 5).encode();
    packet.pop();
    h.submit(&packet);
    assert_eq!(
        h.drain(),
        Err(ExecError::Pm4(Pm4Error::BadCount {
            opcode: Pm4Opcode::ReleaseMem,
            expected: 6,
            found: 5,
            rptr: 0
        }))
    );
    assert_eq!(h.mem.read_u64(SCRATCH), 0);
}

#[test]
fn partially_published_packet_is_not_applied() {
    let mut h = Harness::default_pm4();
    h.stage(&release_value(SCRATCH, 0x77));
    h.mem.write_u64(common::WPTR_ADDR, 4);
    assert_eq!(
        h.drain(),
        Err(ExecError::Pm4(Pm4Error::TruncatedPacket {
            needed: 8,
            available: 4,
            rptr: 0
        }))
    );
    assert_eq!(h.mem.read_u64(SCRATCH), 0);

    h.publish();
    assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    assert_eq!(h.mem.read_u64(SCRATCH), 0x77);
}

#[test]
fn packets_straddling_the_ring_end_are_decoded() {
    let mut h = Harness::pm4(AmdGpu::new(MockGpuConfig {
        verbose: true,
        ..MockGpuConfig::default()
    }));
    // 3-dword packets do not divide the 1024-dword ring, so some straddle the wrap point.
    for i in 0..704u32 {
        h.submit(&set_reg(i % 8, i));
        assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
    }
    assert_eq!(h.rptr(), 2112);
    for r in 0..8u32 {
        assert_eq!(h.gpu.regs().get(r), 696 + r);
    }
}

proptest! {
    #[test]
    fn set_sh_reg_last_write_wins(
        writes in prop::collection::vec((0u32..16, any::<u32>()), 1..100)
    ) {
        let mut h = Harness::default_pm4();
        let mut model = HashMap::new();
        for &(index, value) in &writes {
            h.submit(&set_reg(index, value));
            model.insert(index, value);
        }
        prop_assert_eq!(h.drain(), Ok(DrainOutcome::Idle));
        for index in 0..16u32 {
            prop_assert_eq!(h.gpu.regs().get(index), model.get(&index).copied().unwrap_or(0));
        }
    }
}
