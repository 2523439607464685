//! Terminal output

use colored::*;
use kbench_driver::{CleanupReport, RunSummary};
use kbench_types::ExperimentRecord;
use tabled::{Table, Tabled};

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "")]
    key: &'static str,
    #[tabled(rename = "")]
    value: String,
}

fn row(key: &'static str, value: impl ToString) -> Row {
    Row {
        key,
        value: value.to_string(),
    }
}

pub fn summary_table(summary: &RunSummary) -> String {
    Table::new(vec![
        row("Run", &summary.run_id),
        row("Ticks", summary.ticks),
        row("Cycles started", summary.spawned),
        row("Skipped (active)", summary.skipped),
        row("Succeeded", summary.succeeded),
        row("Failed", summary.failed),
        row("Panicked", summary.panicked),
        row("Cancelled", summary.cancelled),
        row("Records", summary.records),
    ])
    .to_string()
}

pub fn record_table(record: &ExperimentRecord) -> String {
    let sla = if record.sla_violated {
        "violated".red().to_string()
    } else {
        "met".green().to_string()
    };
    Table::new(vec![
        row("Deployment", &record.benchmark_id),
        row("Replicas", record.replicas),
        row(
            "RPS (real / target)",
            format!("{:.2} / {:.2}", record.rps.real_rps, record.rps.target_rps),
        ),
        row(
            "Requests (issued / completed)",
            format!("{} / {}", record.rps.issued, record.rps.completed),
        ),
        row("Drop rate", format!("{:.2}%", record.rps.drop_rate * 100.0)),
        row("p50 (us)", format!("{:.0}", record.latencies.p50)),
        row("p90 (us)", format!("{:.0}", record.latencies.p90)),
        row("p99 (us)", format!("{:.0}", record.latencies.p99)),
        row("p99.9 (us)", format!("{:.0}", record.latencies.p999)),
        row("CPU (millicores)", record.resources.cpu_millicores),
        row("Memory (MiB)", record.resources.memory_bytes >> 20),
        row("SLA", sla),
    ])
    .to_string()
}

pub fn cleanup_table(report: &CleanupReport) -> String {
    Table::new(vec![
        row("Support manifests re-applied", report.support_reapplied),
        row("Rendered manifests removed", report.manifests_removed),
        row("Output files removed", report.outputs_removed),
    ])
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_table_lists_counters() {
        let summary = RunSummary {
            run_id: "run-1".into(),
            ticks: 5,
            succeeded: 4,
            cancelled: 1,
            records: 4,
            ..RunSummary::default()
        };
        let table = summary_table(&summary);
        assert!(table.contains("run-1"));
        assert!(table.contains("Cancelled"));
        assert!(table.lines().any(|l| l.contains("Ticks") && l.contains('5')));
    }

    #[test]
    fn test_cleanup_table() {
        let table = cleanup_table(&CleanupReport {
            support_reapplied: 2,
            manifests_removed: 6,
            outputs_removed: 1,
        });
        assert!(table.lines().any(|l| l.contains("re-applied") && l.contains('2')));
    }
}
