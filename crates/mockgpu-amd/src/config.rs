use std::time::Instant;

/// Chunk size producers split large copies into. The executor only enforces it when it is set as
/// [`MockGpuConfig::sdma_max_copy_bytes`].
pub const SDMA_MAX_COPY_SIZE: u64 = 0x40_0000;

/// Source of the 32-bit value RELEASE_MEM writes for timestamp events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Whole seconds elapsed since the device was created.
    #[default]
    HostSeconds,
    /// Always write the given value.
    Fixed(u32),
}

impl TimestampMode {
    pub fn sample(self, epoch: Instant) -> u32 {
        match self {
            TimestampMode::HostSeconds => epoch.elapsed().as_secs() as u32,
            TimestampMode::Fixed(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockGpuConfig {
    /// Log every executed packet at debug level.
    pub verbose: bool,
    pub timestamp: TimestampMode,
    /// Largest byte count a single SDMA linear copy may move. `None` (the default) accepts the
    /// full 30-bit count range.
    pub sdma_max_copy_bytes: Option<u64>,
}

impl Default for MockGpuConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            timestamp: TimestampMode::default(),
            sdma_max_copy_bytes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MockGpuConfig::default();
        assert!(!config.verbose);
        assert_eq!(config.timestamp, TimestampMode::HostSeconds);
        assert_eq!(config.sdma_max_copy_bytes, None);
    }

    #[test]
    fn fixed_timestamp_ignores_the_clock() {
        assert_eq!(TimestampMode::Fixed(9).sample(Instant::now()), 9);
        assert_eq!(TimestampMode::HostSeconds.sample(Instant::now()), 0);
    }
}
