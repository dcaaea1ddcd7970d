//! Shader (SH) register file.
//!
//! Register indices are the SH-relative offsets that `SET_SH_REG` packets carry, not absolute MMIO
//! dword offsets.

use std::collections::HashMap;

/// Absolute dword offset of the first register addressable by `SET_SH_REG`.
pub const PACKET3_SET_SH_REG_START: u32 = 0x2c00;
/// Absolute dword offset of the SH register block the compute registers below are defined in.
pub const SH_REG_BASE: u32 = 0x1260;

const fn sh_reg(absolute: u32) -> u32 {
    absolute - (PACKET3_SET_SH_REG_START - SH_REG_BASE)
}

pub const COMPUTE_START_X: u32 = sh_reg(0x1ba4);
pub const COMPUTE_NUM_THREAD_X: u32 = COMPUTE_START_X + 3;
pub const COMPUTE_NUM_THREAD_Y: u32 = COMPUTE_START_X + 4;
pub const COMPUTE_NUM_THREAD_Z: u32 = COMPUTE_START_X + 5;
pub const COMPUTE_PGM_LO: u32 = sh_reg(0x1bac);
pub const COMPUTE_PGM_HI: u32 = COMPUTE_PGM_LO + 1;
pub const COMPUTE_USER_DATA_0: u32 = sh_reg(0x1be0);
pub const COMPUTE_USER_DATA_1: u32 = COMPUTE_USER_DATA_0 + 1;

/// `COMPUTE_PGM_LO/HI` hold the program address shifted right by this many bits.
pub const COMPUTE_PGM_ADDR_SHIFT: u32 = 8;

/// Reassembles a 64-bit value split across a (low, high) dword pair.
#[inline]
pub const fn u64_from_pair(lo: u32, hi: u32) -> u64 {
    (lo as u64) | ((hi as u64) << 32)
}

/// Sparse register file: unwritten registers read as zero, last write wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    values: HashMap<u32, u32>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: u32) -> u32 {
        self.values.get(&index).copied().unwrap_or(0)
    }

    pub fn set(&mut self, index: u32, value: u32) {
        self.values.insert(index, value);
    }

    /// Reads `index` and `index + 1` as a (low, high) 64-bit value.
    pub fn get_u64(&self, index: u32) -> u64 {
        u64_from_pair(self.get(index), self.get(index.wrapping_add(1)))
    }

    /// Address of the compute program, decoded from `COMPUTE_PGM_LO/HI`.
    pub fn program_address(&self) -> u64 {
        self.get_u64(COMPUTE_PGM_LO) << COMPUTE_PGM_ADDR_SHIFT
    }

    /// Kernel argument buffer pointer held in `COMPUTE_USER_DATA_0/1`.
    pub fn kernel_args_address(&self) -> u64 {
        self.get_u64(COMPUTE_USER_DATA_0)
    }

    /// Workgroup dimensions from `COMPUTE_NUM_THREAD_X/Y/Z`.
    pub fn local_size(&self) -> [u32; 3] {
        [
            self.get(COMPUTE_NUM_THREAD_X),
            self.get(COMPUTE_NUM_THREAD_Y),
            self.get(COMPUTE_NUM_THREAD_Z),
        ]
    }

    /// Number of registers that have been written at least once.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Written registers in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let mut entries: Vec<(u32, u32)> = self.values.iter().map(|(&k, &v)| (k, v)).collect();
        entries.sort_unstable_by_key(|&(k, _)| k);
        entries.into_iter()
    }
}
