//! Process and system memory gauges.
//!
//! Linux: `VmRSS` from `/proc/self/status` and `MemTotal` from
//! `/proc/meminfo`, both reported in MB.

use decbench_core::MemoryGauge;

/// Platform memory gauge.
pub fn create_memory_gauge() -> Box<dyn MemoryGauge> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::ProcMemoryGauge)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(fallback::SysinfoGauge::new())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;

    /// Extract a `kB` value for a `Name:`-prefixed line.
    pub(crate) fn parse_kb_field(content: &str, field: &str) -> Option<u64> {
        content
            .lines()
            .find(|line| line.starts_with(field))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    }

    pub(crate) struct ProcMemoryGauge;

    impl MemoryGauge for ProcMemoryGauge {
        fn resident_mb(&mut self) -> u64 {
            std::fs::read_to_string("/proc/self/status")
                .ok()
                .and_then(|content| parse_kb_field(&content, "VmRSS:"))
                .map_or(0, |kb| kb / 1024)
        }

        fn total_system_mb(&mut self) -> u64 {
            std::fs::read_to_string("/proc/meminfo")
                .ok()
                .and_then(|content| parse_kb_field(&content, "MemTotal:"))
                .map_or(0, |kb| kb / 1024)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_kb_fields() {
            let status = "Name:\tdecbench\nVmPeak:\t  20480 kB\nVmRSS:\t  10240 kB\n";
            assert_eq!(parse_kb_field(status, "VmRSS:"), Some(10240));
            assert_eq!(parse_kb_field(status, "VmPeak:"), Some(20480));
            assert_eq!(parse_kb_field(status, "MemTotal:"), None);
        }

        #[test]
        fn live_gauge_reports_plausible_values() {
            let mut gauge = ProcMemoryGauge;
            // Any running process has a nonzero RSS and the host has RAM.
            assert!(gauge.resident_mb() > 0);
            assert!(gauge.total_system_mb() > 0);
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod fallback {
    use super::*;
    use sysinfo::{ProcessesToUpdate, System};

    pub(crate) struct SysinfoGauge {
        system: System,
    }

    impl SysinfoGauge {
        pub(crate) fn new() -> Self {
            Self {
                system: System::new(),
            }
        }
    }

    impl MemoryGauge for SysinfoGauge {
        fn resident_mb(&mut self) -> u64 {
            let Ok(pid) = sysinfo::get_current_pid() else {
                return 0;
            };
            self.system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            self.system
                .process(pid)
                .map_or(0, |process| process.memory() / (1024 * 1024))
        }

        fn total_system_mb(&mut self) -> u64 {
            self.system.refresh_memory();
            self.system.total_memory() / (1024 * 1024)
        }
    }
}
