//! Tracing setup and process memory sampling.

use serde::{Deserialize, Serialize};

/// Initialize the tracing subscriber once at entry-point startup.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// whole binary.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Memory usage of the gateway process, as reported on the status surface.
///
/// Fields are `None` on platforms where the numbers cannot be read, and the
/// status surface reports them as unavailable rather than failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessMemory {
    /// Resident set size in MiB.
    pub rss_mb: Option<f64>,
    /// Virtual size in MiB.
    pub vms_mb: Option<f64>,
    /// Resident share of total system memory, in percent.
    pub percent: Option<f64>,
}

/// Sample this process's memory usage.
pub fn process_memory() -> ProcessMemory {
    #[cfg(target_os = "linux")]
    {
        linux_process_memory().unwrap_or_default()
    }
    #[cfg(not(target_os = "linux"))]
    {
        ProcessMemory::default()
    }
}

#[cfg(target_os = "linux")]
fn linux_process_memory() -> Option<ProcessMemory> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let rss_kb = read_kb_field(&status, "VmRSS:");
    let vms_kb = read_kb_field(&status, "VmSize:");

    let total_kb = std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|meminfo| read_kb_field(&meminfo, "MemTotal:"));

    let to_mb = |kb: u64| (kb as f64 / 1024.0 * 10.0).round() / 10.0;
    let percent = match (rss_kb, total_kb) {
        (Some(rss), Some(total)) if total > 0 => {
            Some((rss as f64 / total as f64 * 100.0 * 10.0).round() / 10.0)
        }
        _ => None,
    };

    Some(ProcessMemory {
        rss_mb: rss_kb.map(to_mb),
        vms_mb: vms_kb.map(to_mb),
        percent,
    })
}

#[cfg(target_os = "linux")]
fn read_kb_field(content: &str, field: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(field))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_memory_never_panics() {
        let mem = process_memory();
        if let Some(rss) = mem.rss_mb {
            assert!(rss >= 0.0);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn kb_fields_parse() {
        let sample = "VmPeak:\t  123 kB\nVmRSS:\t  2048 kB\n";
        assert_eq!(read_kb_field(sample, "VmRSS:"), Some(2048));
        assert_eq!(read_kb_field(sample, "VmSwap:"), None);
    }
}
