//! Resource usage of the supervised process, sampled from `/proc`

use log::trace;
use serde::Serialize;
use std::fs;
use std::sync::OnceLock;

/// `AT_CLKTCK` in the auxiliary vector, the kernel's `sysconf(_SC_CLK_TCK)`
const AT_CLKTCK: u64 = 17;

/// Used when the auxiliary vector cannot be read, the value on all common Linux ABIs
const DEFAULT_CLOCK_TICKS: u64 = 100;

/// Find `AT_CLKTCK` in the raw bytes of `/proc/self/auxv`
fn parse_clock_ticks(auxv: &[u8]) -> Option<u64> {
    const WORD: usize = std::mem::size_of::<usize>();
    let word = |chunk: &[u8]| -> Option<u64> {
        let bytes: [u8; WORD] = chunk.try_into().ok()?;
        Some(usize::from_ne_bytes(bytes) as u64)
    };
    auxv.chunks_exact(2 * WORD)
        .filter_map(|pair| Some((word(&pair[..WORD])?, word(&pair[WORD..])?)))
        .take_while(|(key, _)| *key != 0)
        .find(|(key, _)| *key == AT_CLKTCK)
        .map(|(_, value)| value)
        .filter(|ticks| *ticks > 0)
}

/// Clock ticks per second used by `/proc/<pid>/stat`
fn clock_ticks() -> f64 {
    static TICKS: OnceLock<u64> = OnceLock::new();
    *TICKS.get_or_init(|| {
        fs::read("/proc/self/auxv")
            .ok()
            .as_deref()
            .and_then(parse_clock_ticks)
            .unwrap_or(DEFAULT_CLOCK_TICKS)
    }) as f64
}

/// CPU and memory consumption of a process tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// User CPU seconds
    pub user_time: f64,
    /// System CPU seconds
    pub system_time: f64,
    /// Wall clock seconds from start to exit
    pub wall_time: f64,
    /// Peak resident memory in kB
    pub peak_memory_kb: u64,
}

impl ResourceUsage {
    pub fn cpu_time(&self) -> f64 {
        self.user_time + self.system_time
    }

    /// Peak memory in MB
    pub fn used_memory(&self) -> f64 {
        self.peak_memory_kb as f64 / 1024.0
    }

    /// Fold in a new sample: memory keeps its maximum, CPU times the latest
    ///
    /// CPU time of a tree only grows while its members live, so a smaller
    /// sample means processes have exited and their time is kept.
    pub fn update(&mut self, sample: &ResourceUsage) {
        self.peak_memory_kb = self.peak_memory_kb.max(sample.peak_memory_kb);
        self.user_time = self.user_time.max(sample.user_time);
        self.system_time = self.system_time.max(sample.system_time);
    }
}

/// Fields of `/proc/<pid>/stat` after the command name
struct Stat {
    ppid: u32,
    user_ticks: u64,
    system_ticks: u64,
}

fn parse_stat(content: &str) -> Option<Stat> {
    // The command name may contain spaces and parentheses
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let num = |i: usize| fields.get(i).and_then(|f| f.parse::<u64>().ok());

    Some(Stat {
        ppid: fields.get(1)?.parse().ok()?,
        // utime + cutime, stime + cstime
        user_ticks: num(11)? + num(13)?,
        system_ticks: num(12)? + num(14)?,
    })
}

fn parse_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// The process and all its descendants
fn process_tree(root: u32) -> Vec<u32> {
    let mut parents: Vec<(u32, u32)> = Vec::new();
    if let Ok(entries) = fs::read_dir("/proc") {
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            if let Some(stat) = fs::read_to_string(entry.path().join("stat"))
                .ok()
                .as_deref()
                .and_then(parse_stat)
            {
                parents.push((pid, stat.ppid));
            }
        }
    }

    let mut tree = vec![root];
    let mut i = 0;
    while i < tree.len() {
        let parent = tree[i];
        tree.extend(parents.iter().filter(|(_, p)| *p == parent).map(|(pid, _)| *pid));
        i += 1;
    }
    tree
}

/// Sample the current usage of `pid` and its descendants
///
/// Returns `None` when the process is gone or `/proc` is not available.
pub fn sample(pid: u32) -> Option<ResourceUsage> {
    let root = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    parse_stat(&root)?;

    let ticks = clock_ticks();
    let mut usage = ResourceUsage::default();
    for member in process_tree(pid) {
        let Some(stat) = fs::read_to_string(format!("/proc/{}/stat", member))
            .ok()
            .as_deref()
            .and_then(parse_stat)
        else {
            continue;
        };
        usage.user_time += stat.user_ticks as f64 / ticks;
        usage.system_time += stat.system_ticks as f64 / ticks;
        usage.peak_memory_kb += fs::read_to_string(format!("/proc/{}/status", member))
            .ok()
            .as_deref()
            .and_then(parse_rss_kb)
            .unwrap_or(0);
    }

    trace!("Resource sample for {}: {:?}", pid, usage);
    Some(usage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auxv(entries: &[(usize, usize)]) -> Vec<u8> {
        entries
            .iter()
            .flat_map(|(k, v)| k.to_ne_bytes().into_iter().chain(v.to_ne_bytes()))
            .collect()
    }

    #[test]
    fn test_clock_ticks_from_auxv() {
        assert_eq!(parse_clock_ticks(&auxv(&[(6, 4096), (17, 250), (0, 0)])), Some(250));
        // nothing after the terminating entry counts
        assert_eq!(parse_clock_ticks(&auxv(&[(6, 4096), (0, 0), (17, 250)])), None);
        assert_eq!(parse_clock_ticks(&auxv(&[(17, 0), (0, 0)])), None);
        assert_eq!(parse_clock_ticks(&[1, 2, 3]), None);
        assert!(clock_ticks() > 0.0);
    }

    #[test]
    fn test_parse_stat_with_odd_name() {
        let line = "1234 (my (odd) solver) S 1 1234 1234 0 -1 4194560 100 0 0 0 250 50 10 5 20 0 1 0 100 1000 200";
        let stat = parse_stat(line).unwrap();
        assert_eq!(stat.ppid, 1);
        assert_eq!(stat.user_ticks, 260);
        assert_eq!(stat.system_ticks, 55);
    }

    #[test]
    fn test_parse_rss() {
        let status = "Name:\tsimpleFoam\nVmPeak:\t  9000 kB\nVmRSS:\t  4096 kB\n";
        assert_eq!(parse_rss_kb(status), Some(4096));
        assert_eq!(parse_rss_kb("Name:\tkthreadd\n"), None);
    }

    #[test]
    fn test_update_keeps_maximum() {
        let mut usage = ResourceUsage::default();
        usage.update(&ResourceUsage {
            user_time: 2.0,
            system_time: 0.5,
            wall_time: 0.0,
            peak_memory_kb: 2048,
        });
        usage.update(&ResourceUsage {
            user_time: 1.0,
            system_time: 0.75,
            wall_time: 0.0,
            peak_memory_kb: 1024,
        });
        assert_eq!(usage.user_time, 2.0);
        assert_eq!(usage.system_time, 0.75);
        assert_eq!(usage.peak_memory_kb, 2048);
        assert_eq!(usage.used_memory(), 2.0);
        assert_eq!(usage.cpu_time(), 2.75);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sample_own_process() {
        let usage = sample(std::process::id()).unwrap();
        assert!(usage.peak_memory_kb > 0);
    }
}
