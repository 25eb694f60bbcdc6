use std::collections::{HashMap, HashSet};

use sysinfo::{Pid, System};

/// Kill every live descendant of `root` (not `root` itself).
///
/// Interpreters frequently shell out (pandoc, latex); killing only the direct
/// child would leave those running after a termination request.
pub(crate) fn kill_descendants(root: u32) -> usize {
    let mut sys = System::new();
    sys.refresh_processes();
    let descendants = collect_descendants(Pid::from_u32(root), &parent_map(&sys));
    kill_all(&sys, root, &descendants)
}

/// Live descendants of `root`, deepest last.
pub(crate) fn descendants_of(root: u32) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes();
    collect_descendants(Pid::from_u32(root), &parent_map(&sys))
        .into_iter()
        .map(|pid| pid.as_u32())
        .collect()
}

/// Kill processes previously seen below `root`. Once `root` has exited its
/// children are reparented, so they can only be found from an earlier snapshot.
pub(crate) fn kill_recorded(root: u32, pids: &[u32]) -> usize {
    if pids.is_empty() {
        return 0;
    }
    let mut sys = System::new();
    sys.refresh_processes();
    let pids: Vec<Pid> = pids.iter().copied().map(Pid::from_u32).collect();
    kill_all(&sys, root, &pids)
}

fn parent_map(sys: &System) -> HashMap<Pid, Vec<Pid>> {
    let mut children_of: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children_of.entry(parent).or_default().push(*pid);
        }
    }
    children_of
}

fn kill_all(sys: &System, root: u32, pids: &[Pid]) -> usize {
    let mut killed = 0;
    // Deepest first so parents cannot respawn work while we sweep.
    for pid in pids.iter().rev() {
        if let Some(process) = sys.process(*pid) {
            if process.kill() {
                killed += 1;
            }
        }
    }
    if killed > 0 {
        tracing::debug!(target: "rmdrender.process", root, killed, "killed descendant processes");
    }
    killed
}

fn collect_descendants(root: Pid, children_of: &HashMap<Pid, Vec<Pid>>) -> Vec<Pid> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut frontier = vec![root];
    while let Some(pid) = frontier.pop() {
        for child in children_of.get(&pid).into_iter().flatten() {
            if seen.insert(*child) {
                order.push(*child);
                frontier.push(*child);
            }
        }
    }
    order
}
