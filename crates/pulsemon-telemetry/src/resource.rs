use pulsemon_common::types::ResourceUsage;
use sysinfo::{Pid, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Captures process and system resource snapshots via sysinfo.
///
/// The recorder takes one snapshot when an operation starts and one when it
/// ends, then stores the delta on the sample. A probe holds its own
/// `System` so refreshes stay cheap (memory and one process only).
pub struct ResourceProbe {
    system: System,
    pid: Option<Pid>,
}

impl ResourceProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Takes an absolute snapshot of current usage.
    pub fn snapshot(&mut self) -> ResourceUsage {
        self.system.refresh_memory();
        let (cpu_usage_percent, rss_mb, virtual_mb) = match self.pid {
            Some(pid) => {
                self.system.refresh_process(pid);
                match self.system.process(pid) {
                    Some(process) => (
                        process.cpu_usage() as f64,
                        process.memory() as f64 / BYTES_PER_MB,
                        process.virtual_memory() as f64 / BYTES_PER_MB,
                    ),
                    None => (0.0, 0.0, 0.0),
                }
            }
            None => (0.0, 0.0, 0.0),
        };

        ResourceUsage {
            cpu_usage_percent,
            rss_mb,
            virtual_mb,
            system_used_mb: self.system.used_memory() as f64 / BYTES_PER_MB,
        }
    }
}

impl Default for ResourceProbe {
    fn default() -> Self {
        Self::new()
    }
}
