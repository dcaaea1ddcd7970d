//! Compare functions shared by PM4 `WAIT_REG_MEM` and SDMA `POLL_REGMEM`.

pub const WAIT_REG_MEM_FUNCTION_ALWAYS: u32 = 0;
pub const WAIT_REG_MEM_FUNCTION_EQ: u32 = 3;
pub const WAIT_REG_MEM_FUNCTION_GEQ: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Always,
    Equal,
    GreaterEqual,
}

impl CompareFunction {
    /// Decodes the 3-bit function field. Codes other than ALWAYS/EQ/GEQ are unsupported.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            WAIT_REG_MEM_FUNCTION_ALWAYS => Some(Self::Always),
            WAIT_REG_MEM_FUNCTION_EQ => Some(Self::Equal),
            WAIT_REG_MEM_FUNCTION_GEQ => Some(Self::GreaterEqual),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            Self::Always => WAIT_REG_MEM_FUNCTION_ALWAYS,
            Self::Equal => WAIT_REG_MEM_FUNCTION_EQ,
            Self::GreaterEqual => WAIT_REG_MEM_FUNCTION_GEQ,
        }
    }

    pub fn evaluate(self, value: u32, reference: u32) -> bool {
        match self {
            Self::Always => true,
            Self::Equal => value == reference,
            Self::GreaterEqual => value >= reference,
        }
    }
}

/// Result of a single drain call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The read cursor caught up with the write cursor.
    Idle,
    /// A wait/poll packet is not satisfied yet; its read cursor still points at it.
    Blocked,
}
