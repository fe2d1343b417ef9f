use std::ops::AddAssign;

/// Event and bookkeeping counters kept by a tracer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TracerStats {
    pub calls: u64,
    pub lines: u64,
    pub returns: u64,
    pub exceptions: u64,
    /// Units first seen by this tracer (per-tracer cache misses). With
    /// shared decisions the decision function may have run fewer times.
    pub new_units: u64,
    /// Returns synthesized for frames that never reported one.
    pub missed_returns: u64,
    /// Depth-stack capacity growths.
    pub stack_reallocs: u64,
    pub errors: u64,
}

impl TracerStats {
    /// `(name, value)` pairs in a stable order, for reporting.
    #[must_use]
    pub const fn entries(&self) -> [(&'static str, u64); 8] {
        [
            ("calls", self.calls),
            ("lines", self.lines),
            ("returns", self.returns),
            ("exceptions", self.exceptions),
            ("new_units", self.new_units),
            ("missed_returns", self.missed_returns),
            ("stack_reallocs", self.stack_reallocs),
            ("errors", self.errors),
        ]
    }
}

impl AddAssign for TracerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.calls += rhs.calls;
        self.lines += rhs.lines;
        self.returns += rhs.returns;
        self.exceptions += rhs.exceptions;
        self.new_units += rhs.new_units;
        self.missed_returns += rhs.missed_returns;
        self.stack_reallocs += rhs.stack_reallocs;
        self.errors += rhs.errors;
    }
}
