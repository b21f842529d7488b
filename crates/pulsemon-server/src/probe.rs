use sysinfo::{Disks, System};

/// Machine-level gauge readings for the monitored components.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Samples machine-wide CPU, memory, and disk usage each monitoring tick.
pub struct SystemProbe {
    system: System,
    disks: Disks,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
        }
    }

    pub fn read(&mut self) -> SystemReading {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();

        let cpu_percent = self.system.global_cpu_info().cpu_usage() as f64;

        let total = self.system.total_memory();
        let memory_percent = if total > 0 {
            self.system.used_memory() as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        // Report the fullest mounted disk; one full volume is the one that
        // takes the system down.
        let disk_percent = self
            .disks
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| {
                let used = d.total_space() - d.available_space();
                used as f64 / d.total_space() as f64 * 100.0
            })
            .fold(0.0_f64, f64::max);

        SystemReading {
            cpu_percent,
            memory_percent,
            disk_percent,
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}
