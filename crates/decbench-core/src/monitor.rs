//! Capability interfaces for platform probes.
//!
//! Each platform supplies one implementation of each, resolved at process
//! start; the engine only sees these traits.  Implementations must not
//! spawn threads of their own.

/// System-wide CPU usage sampler aligned to a measurement window.
pub trait CpuSampler: Send {
    /// Snapshot the CPU time counters at the start of a window.
    fn begin(&mut self);

    /// Average CPU usage in percent (0–100) over `[begin, now]`.
    fn usage_percent(&mut self) -> f64;
}

/// Process and system memory gauge.
pub trait MemoryGauge: Send {
    /// Current process resident set size in MB.
    fn resident_mb(&mut self) -> u64;

    /// Total physical system memory in MB.
    fn total_system_mb(&mut self) -> u64;
}

/// Static facts about the host, gathered once before the sweep.
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// CPU model name as reported by the platform.
    pub cpu_name: String,
    /// Number of logical CPUs.
    pub thread_count: u32,
    /// Total physical memory in MB.
    pub total_memory_mb: u64,
}
