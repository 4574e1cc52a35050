//! Per-file stage timing.
//!
//! # Usage
//!
//! ```ignore
//! use step2stl::geom::{StageMetrics, TimingBucket};
//!
//! let mut metrics = StageMetrics::default();
//! metrics.begin();
//! let shapes = metrics.time(TimingBucket::Load, || loader.load(path));
//! let report = metrics.end();
//! log::debug!("load took {} ms", report.load_ms());
//! ```

use std::time::Instant;

/// Pipeline phases a conversion is broken into for timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Reading and parsing the STEP file into shapes.
    Load,
    /// Kernel tessellation, including bound computation for relative tolerances.
    Tessellation,
    /// Diagnostics computation (open edges, degenerate triangles).
    Diagnostics,
    /// STL encoding and the final file write.
    Write,
    /// Moving the source file into `_processed/`.
    Relocation,
}

/// Timing report with nanosecond precision for each stage.
///
/// All fields are cumulative: multiple calls to the same bucket add to the total.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageTimings {
    pub load_ns: u64,
    pub tessellation_ns: u64,
    pub diagnostics_ns: u64,
    pub write_ns: u64,
    pub relocation_ns: u64,
}

impl StageTimings {
    /// Returns the total time across all buckets in nanoseconds.
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.load_ns
            .saturating_add(self.tessellation_ns)
            .saturating_add(self.diagnostics_ns)
            .saturating_add(self.write_ns)
            .saturating_add(self.relocation_ns)
    }

    /// Returns the total time in milliseconds (for display purposes).
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        ns_to_ms(self.total_ns())
    }

    #[must_use]
    pub fn load_ms(&self) -> f64 {
        ns_to_ms(self.load_ns)
    }

    #[must_use]
    pub fn tessellation_ms(&self) -> f64 {
        ns_to_ms(self.tessellation_ns)
    }

    /// Adds another report bucket by bucket.
    pub fn accumulate(&mut self, other: &StageTimings) {
        self.load_ns = self.load_ns.saturating_add(other.load_ns);
        self.tessellation_ns = self.tessellation_ns.saturating_add(other.tessellation_ns);
        self.diagnostics_ns = self.diagnostics_ns.saturating_add(other.diagnostics_ns);
        self.write_ns = self.write_ns.saturating_add(other.write_ns);
        self.relocation_ns = self.relocation_ns.saturating_add(other.relocation_ns);
    }

    fn bucket_mut(&mut self, bucket: TimingBucket) -> &mut u64 {
        match bucket {
            TimingBucket::Load => &mut self.load_ns,
            TimingBucket::Tessellation => &mut self.tessellation_ns,
            TimingBucket::Diagnostics => &mut self.diagnostics_ns,
            TimingBucket::Write => &mut self.write_ns,
            TimingBucket::Relocation => &mut self.relocation_ns,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}

/// Accumulator for timing pipeline stages.
///
/// Create an instance, call [`begin`](Self::begin) to reset, wrap operations
/// with [`time`](Self::time), and call [`end`](Self::end) to retrieve the report.
#[derive(Debug, Default)]
pub struct StageMetrics {
    report: StageTimings,
}

impl StageMetrics {
    /// Resets all timing counters to zero.
    pub fn begin(&mut self) {
        self.report = StageTimings::default();
    }

    #[must_use]
    pub fn end(&self) -> StageTimings {
        self.report
    }

    /// Times the execution of `f` and accumulates the elapsed time in `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        // Cap at u64::MAX to prevent overflow
        let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let slot = self.report.bucket_mut(bucket);
        *slot = slot.saturating_add(nanos);
        result
    }
}
