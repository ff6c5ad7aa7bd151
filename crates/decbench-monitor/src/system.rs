//! Host identification: CPU model name and logical CPU count.

use decbench_core::HostInfo;

use crate::memory::create_memory_gauge;

/// Logical CPU count; never zero.
pub fn logical_cpus() -> u32 {
    num_cpus::get().max(1) as u32
}

/// Gather the static host facts reported in the benchmark header.
pub fn host_info() -> HostInfo {
    HostInfo {
        cpu_name: cpu_model_name(),
        thread_count: logical_cpus(),
        total_memory_mb: create_memory_gauge().total_system_mb(),
    }
}

/// CPU model name as reported by the platform.
pub fn cpu_model_name() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| linux::parse_model_name(&content))
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }
    #[cfg(not(target_os = "linux"))]
    {
        use sysinfo::System;
        let mut system = System::new();
        system.refresh_cpu_all();
        system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    /// First `model name` entry of `/proc/cpuinfo`.
    pub(crate) fn parse_model_name(content: &str) -> Option<String> {
        content
            .lines()
            .find(|line| line.starts_with("model name"))
            .and_then(|line| line.split_once(':'))
            .map(|(_, name)| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_info_is_populated() {
        let host = host_info();
        assert!(host.thread_count >= 1);
        assert!(!host.cpu_name.is_empty());
    }
}
