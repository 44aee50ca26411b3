//! Process memory summary for the metrics and env endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Serialize)]
pub struct MemStatSummary {
    #[serde(rename = "Measured")]
    pub measured: DateTime<Utc>,
    /// Resident set size, MB.
    #[serde(rename = "ResidentMB")]
    pub resident_mb: u64,
    /// Virtual memory size, MB.
    #[serde(rename = "VirtualMB")]
    pub virtual_mb: u64,
}

fn b_to_mb(b: u64) -> u64 {
    b / 1024 / 1024
}

pub fn get_mem_stats() -> MemStatSummary {
    let mut resident = 0;
    let mut virt = 0;
    if let Ok(pid) = sysinfo::get_current_pid() {
        let mut sys = System::new();
        if sys.refresh_process(pid) {
            if let Some(proc) = sys.process(pid) {
                resident = proc.memory();
                virt = proc.virtual_memory();
            }
        }
    }

    MemStatSummary {
        measured: Utc::now(),
        resident_mb: b_to_mb(resident),
        virtual_mb: b_to_mb(virt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_this_process() {
        let stats = get_mem_stats();
        assert!(stats.resident_mb > 0, "resident memory should be nonzero");
        assert!(stats.virtual_mb >= stats.resident_mb);
    }
}
