//! Tracer configuration.

/// Initial depth-stack capacity. The stack grows past this as needed.
pub const DEFAULT_STACK_CAPACITY: usize = 100;

/// Unit marker of the XML parser extension that reports exceptions without
/// the matching return (CPython issue 6359).
pub const PYEXPAT_MARKER: &str = "pyexpat.c";

/// Tracer configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracerConfig {
    /// Depth-stack slots reserved up front.
    pub stack_capacity: usize,
    /// Unit-id substrings whose Exception events are followed by a synthesized
    /// Return.
    pub missing_return_markers: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            missing_return_markers: vec![PYEXPAT_MARKER.to_string()],
        }
    }
}

impl TracerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    /// Add another unit marker whose frames never report their return after
    /// an exception.
    #[must_use]
    pub fn with_missing_return_marker(mut self, marker: impl Into<String>) -> Self {
        self.missing_return_markers.push(marker.into());
        self
    }

    /// Disable missing-return correction entirely.
    #[must_use]
    pub fn without_missing_return_markers(mut self) -> Self {
        self.missing_return_markers.clear();
        self
    }
}
