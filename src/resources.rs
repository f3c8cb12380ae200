//! Host resource allocation for the simulator and controller containers.
//!
//! CPU pinning follows a fixed lookup table keyed by the host core count,
//! isolating controller processes from the simulator's cores whenever the
//! host is large enough. GPU passthrough is a plain on/off capability switch
//! and deliberately not part of the match state machine.

use tracing::info;

/// Cpuset strings (as accepted by `--cpuset-cpus`) for each container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuAllocation {
    /// Cores reserved for the simulator container.
    pub simulator: String,
    /// Cores handed to the participant's controller.
    pub participant: String,
    /// Cores handed to the opponent's controller.
    pub opponent: String,
}

/// Splits `host_cores` between the simulator and the two controller slots.
///
/// The buckets are 1, 2, 4 and ≥8 cores; in-between counts fall back to the
/// next smaller bucket. `controller_budget` is the optional `cpus` hint from
/// the world config and can only shrink a controller's share.
pub fn allocate_cpus(host_cores: usize, controller_budget: Option<usize>) -> CpuAllocation {
    let (simulator, participant, opponent): (Vec<usize>, Vec<usize>, Vec<usize>) =
        match host_cores {
            0 | 1 => (vec![0], vec![0], vec![0]),
            2 | 3 => (vec![0], vec![1], vec![1]),
            4..=7 => (vec![0, 1], vec![2], vec![3]),
            _ => (vec![0, 1, 2, 3], vec![4, 5], vec![6, 7]),
        };

    let cap = |mut cores: Vec<usize>| {
        if let Some(budget) = controller_budget {
            cores.truncate(budget.max(1));
        }
        cpuset(&cores)
    };

    let allocation = CpuAllocation {
        simulator: cpuset(&simulator),
        participant: cap(participant),
        opponent: cap(opponent),
    };
    info!(host_cores, ?allocation);
    allocation
}

fn cpuset(cores: &[usize]) -> String {
    cores
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Number of logical cores on this host.
pub fn detect_host_cores() -> usize {
    num_cpus::get()
}

/// Memory ceiling (in MB) for one controller container.
///
/// Leaves 2 GB of headroom for the simulator and the host, then splits the
/// rest between the two controller slots, with a 1 GB floor so tiny runners
/// still work.
pub fn controller_memory_limit_mb() -> usize {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let available_mb = (sys.available_memory() / 1_000_000) as usize;
    (available_mb.saturating_sub(2_000) / 2).max(1_000)
}

/// Whether GPU passthrough can be offered to the containers.
///
/// True when a DRI render node exists or `nvidia-smi` answers.
pub fn gpu_available() -> bool {
    if std::path::Path::new("/dev/dri").is_dir() {
        return true;
    }
    std::process::Command::new("nvidia-smi")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn distinct_cores(allocation: &CpuAllocation) -> usize {
        let mut set = HashSet::new();
        for group in [
            &allocation.simulator,
            &allocation.participant,
            &allocation.opponent,
        ] {
            set.extend(group.split(',').map(str::to_string));
        }
        set.len()
    }

    #[test]
    fn small_hosts_share_cores() {
        let a = allocate_cpus(1, None);
        assert_eq!(a.simulator, "0");
        assert_eq!(a.participant, "0");

        let a = allocate_cpus(2, None);
        assert_eq!(a.simulator, "0");
        assert_eq!(a.participant, "1");
        assert_eq!(a.opponent, "1");
    }

    #[test]
    fn big_hosts_isolate_controllers() {
        let a = allocate_cpus(16, None);
        assert_eq!(a.simulator, "0,1,2,3");
        assert_eq!(a.participant, "4,5");
        assert_eq!(a.opponent, "6,7");
        assert_eq!(distinct_cores(&a), 8);
    }

    #[test]
    fn budget_hint_shrinks_controller_share() {
        let a = allocate_cpus(8, Some(1));
        assert_eq!(a.participant, "4");
        assert_eq!(a.opponent, "6");
        // the hint never touches the simulator
        assert_eq!(a.simulator, "0,1,2,3");
    }
}
