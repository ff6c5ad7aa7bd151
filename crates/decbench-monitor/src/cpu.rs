//! System-wide CPU usage sampling.
//!
//! Linux: delta of the aggregate `cpu` line in `/proc/stat` between the
//! start and end of a measurement window — active ticks versus total
//! ticks, with idle and iowait both counted as idle.

use decbench_core::CpuSampler;

/// Platform CPU sampler.
pub fn create_cpu_sampler() -> Box<dyn CpuSampler> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::ProcStatSampler::default())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(fallback::SysinfoSampler::new())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct CpuTicks {
        pub idle: u64,
        pub total: u64,
    }

    /// Parse the aggregate `cpu` line of `/proc/stat`.
    ///
    /// Fields: user nice system idle iowait irq softirq steal ...
    /// idle + iowait count as idle time.
    pub(crate) fn parse_proc_stat(content: &str) -> Option<CpuTicks> {
        let line = content.lines().next()?;
        if !line.starts_with("cpu ") {
            return None;
        }
        let values: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|v| v.parse().ok())
            .collect();
        if values.len() < 4 {
            return None;
        }
        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        let total: u64 = values.iter().take(8).sum();
        Some(CpuTicks { idle, total })
    }

    fn read_ticks() -> CpuTicks {
        std::fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|content| parse_proc_stat(&content))
            .unwrap_or_default()
    }

    pub(crate) fn usage_between(start: CpuTicks, end: CpuTicks) -> f64 {
        let total_diff = end.total.saturating_sub(start.total);
        if total_diff == 0 {
            return 0.0;
        }
        let idle_diff = end.idle.saturating_sub(start.idle);
        100.0 * (1.0 - idle_diff as f64 / total_diff as f64)
    }

    #[derive(Default)]
    pub(crate) struct ProcStatSampler {
        start: CpuTicks,
    }

    impl CpuSampler for ProcStatSampler {
        fn begin(&mut self) {
            self.start = read_ticks();
        }

        fn usage_percent(&mut self) -> f64 {
            usage_between(self.start, read_ticks())
        }
    }

}

#[cfg(not(target_os = "linux"))]
mod fallback {
    use super::*;
    use sysinfo::System;

    /// Window-average CPU usage via `sysinfo` refresh deltas.
    pub(crate) struct SysinfoSampler {
        system: System,
    }

    impl SysinfoSampler {
        pub(crate) fn new() -> Self {
            Self {
                system: System::new(),
            }
        }
    }

    impl CpuSampler for SysinfoSampler {
        fn begin(&mut self) {
            self.system.refresh_cpu_usage();
        }

        fn usage_percent(&mut self) -> f64 {
            self.system.refresh_cpu_usage();
            f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0)
        }
    }
}
