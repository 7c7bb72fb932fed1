//! CPU admission gate: delays new runner launches until the host's mean CPU
//! utilisation drops below a threshold.

use std::time::Duration;

use tokio::time;
use tracing::debug;

use crate::error::{Error, Result};

const PROC_STAT: &str = "/proc/stat";

/// Interval between consecutive utilisation samples.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Cumulative tick counters for one CPU, as reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn idle_ticks(&self) -> u64 {
        self.idle + self.iowait
    }

    fn busy_ticks(&self) -> u64 {
        self.user + self.nice + self.system + self.irq + self.softirq + self.steal
    }

    fn total_ticks(&self) -> u64 {
        self.idle_ticks() + self.busy_ticks()
    }
}

fn parse_stat(contents: &str) -> Result<Vec<CpuTimes>> {
    let mut cpus = Vec::new();
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };
        // Per-CPU rows are labelled "cpuN"; the aggregate "cpu" row is skipped.
        if !label.starts_with("cpu") || label == "cpu" {
            continue;
        }

        let mut ticks = [0u64; 8];
        for slot in &mut ticks {
            *slot = fields
                .next()
                .and_then(|field| field.parse().ok())
                .ok_or_else(|| Error::CpuStats(format!("malformed row `{label}`")))?;
        }
        let [user, nice, system, idle, iowait, irq, softirq, steal] = ticks;
        cpus.push(CpuTimes {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
        });
    }

    if cpus.is_empty() {
        return Err(Error::CpuStats("no per-cpu rows found".to_owned()));
    }
    Ok(cpus)
}

fn sample() -> Result<Vec<CpuTimes>> {
    let contents = std::fs::read_to_string(PROC_STAT)
        .map_err(|err| Error::CpuStats(format!("cannot read {PROC_STAT}: {err}")))?;
    parse_stat(&contents)
}

/// Percent of the sample interval this CPU spent busy.
fn usage_between(prev: CpuTimes, curr: CpuTimes) -> f64 {
    let total_delta = curr.total_ticks().saturating_sub(prev.total_ticks());
    let idle_delta = curr.idle_ticks().saturating_sub(prev.idle_ticks());
    if total_delta == 0 {
        return 0.0;
    }
    total_delta.saturating_sub(idle_delta) as f64 * 100.0 / total_delta as f64
}

fn average_usage(prev: &[CpuTimes], curr: &[CpuTimes]) -> f64 {
    let cpus = prev.len().min(curr.len());
    if cpus == 0 {
        return 0.0;
    }
    let sum: f64 = prev
        .iter()
        .zip(curr)
        .map(|(p, c)| usage_between(*p, *c))
        .sum();
    sum / cpus as f64
}

/// Returns once the mean utilisation across all CPUs over one sample
/// interval is strictly below `threshold` percent. The first sample only
/// establishes a baseline.
pub async fn wait_until_average_below(threshold: f64) -> Result<()> {
    let mut prev = sample()?;
    loop {
        time::sleep(SAMPLE_INTERVAL).await;
        let curr = sample()?;
        let average = average_usage(&prev, &curr);
        debug!(average, threshold, "sampled cpu utilisation");
        if average < threshold {
            return Ok(());
        }
        prev = curr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(user: u64, idle: u64) -> CpuTimes {
        CpuTimes {
            user,
            idle,
            ..CpuTimes::default()
        }
    }

    #[test]
    fn parses_per_cpu_rows_and_skips_aggregate() {
        let stat = "\
cpu  100 0 50 800 20 0 5 0 0 0
cpu0 60 0 30 400 10 0 3 0 0 0
cpu1 40 0 20 400 10 0 2 0 0 0
intr 12345
ctxt 67890
";
        let cpus = parse_stat(stat).unwrap();
        assert_eq!(cpus.len(), 2);
        assert_eq!(cpus[0].user, 60);
        assert_eq!(cpus[1].idle, 400);
        assert_eq!(cpus[1].total_ticks(), 40 + 20 + 400 + 10 + 2);
    }

    #[test]
    fn rejects_truncated_rows() {
        assert!(parse_stat("cpu0 1 2 3\n").is_err());
    }

    #[test]
    fn rejects_stat_without_cpu_rows() {
        assert!(parse_stat("intr 5\nctxt 9\n").is_err());
    }

    #[test]
    fn fully_busy_interval_is_100_percent() {
        let prev = times(0, 0);
        let curr = times(200, 0);
        assert_eq!(usage_between(prev, curr), 100.0);
    }

    #[test]
    fn fully_idle_interval_is_0_percent() {
        let prev = times(0, 0);
        let curr = times(0, 200);
        assert_eq!(usage_between(prev, curr), 0.0);
    }

    #[test]
    fn zero_delta_counts_as_idle() {
        let prev = times(10, 10);
        assert_eq!(usage_between(prev, prev), 0.0);
    }

    #[test]
    fn iowait_counts_as_idle() {
        let prev = CpuTimes::default();
        let curr = CpuTimes {
            user: 50,
            iowait: 50,
            ..CpuTimes::default()
        };
        assert_eq!(usage_between(prev, curr), 50.0);
    }

    #[test]
    fn average_is_mean_across_cpus() {
        let prev = vec![times(0, 0), times(0, 0)];
        let curr = vec![times(100, 0), times(0, 100)];
        assert_eq!(average_usage(&prev, &curr), 50.0);
    }
}
