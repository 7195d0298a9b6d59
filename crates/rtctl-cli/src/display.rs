//! Display utilities for CLI output

use console::style;
use rtctl_core::{Severity, SummaryEntry};
use rtctl_platform::Runtime;

const NOT_AVAILABLE: &str = "N/A";

const RUNTIME_COLUMNS: [&str; 10] = [
    "NAME",
    "NAMESPACE",
    "CLUSTER",
    "VERSION",
    "SYNC_STATUS",
    "HEALTH_STATUS",
    "HEALTH_MESSAGE",
    "INSTALLATION_STATUS",
    "INGRESS_HOST",
    "INGRESS_CLASS",
];

/// Print the operation summary
pub fn print_summary(entries: &[SummaryEntry]) {
    if entries.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Summary").bold());
    for entry in entries {
        match entry.severity {
            Severity::Info => println!("  {} {}", style("→").blue(), entry.message),
            Severity::Error => println!("  {} {}", style("✗").red(), style(&entry.message).red()),
        }
    }
    println!();
}

fn or_na(value: Option<&String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// One table row per runtime, in column order
pub fn runtime_rows(runtimes: &[Runtime]) -> Vec<[String; 10]> {
    runtimes
        .iter()
        .map(|rt| {
            let name = if rt.managed {
                format!("{} (hosted)", rt.name)
            } else {
                rt.name.clone()
            };
            [
                name,
                or_na(rt.namespace.as_ref()),
                or_na(rt.cluster.as_ref()),
                or_na(rt.runtime_version.as_ref()),
                or_na(rt.sync_status.as_ref()),
                or_na(rt.health_status.as_ref()),
                or_na(rt.health_message.as_ref()),
                rt.installation_status.to_string(),
                or_na(rt.ingress_host.as_ref()),
                or_na(rt.ingress_class.as_ref()),
            ]
        })
        .collect()
}

/// Print runtimes as an aligned table
pub fn print_runtimes(runtimes: &[Runtime]) {
    let rows = runtime_rows(runtimes);

    let mut widths = RUNTIME_COLUMNS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header: Vec<String> = RUNTIME_COLUMNS
        .iter()
        .zip(widths)
        .map(|(h, w)| style(format!("{:<w$}", h)).bold().to_string())
        .collect();
    println!("{}", header.join("    ").trim_end());

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{:<w$}", cell))
            .collect();
        println!("{}", cells.join("    ").trim_end());
    }
}

/// Pluralize a word based on count
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}
