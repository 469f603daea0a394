//! Terminal rendering for the CLI.

use chrono::{DateTime, Utc};
use diskstrata_core::{Scan, Settings};
use diskstrata_query::{FolderTree, ScanComparison, SizeDelta};
use diskstrata_scan::ScanProgress;

const NAME_WIDTH: usize = 40;
const BAR_WIDTH: usize = 10;

/// Format size in human-readable form.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Format a signed byte change, e.g. `+1.5 MiB`.
pub fn format_delta(delta: i128) -> String {
    let magnitude = u64::try_from(delta.unsigned_abs()).unwrap_or(u64::MAX);
    let sign = match delta.signum() {
        1 => "+",
        -1 => "-",
        _ => "±",
    };
    format!("{sign}{}", format_size(magnitude))
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Truncate a string to `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let mut short: String = s.chars().take(max_len.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}

/// One-line progress summary, redrawn in place on stderr.
pub fn progress_line(progress: &ScanProgress) -> String {
    format!(
        "{} folders, {} files, {} ({}) {}",
        progress.folders_scanned,
        progress.files_scanned,
        format_size(progress.total_bytes),
        format_duration(
            chrono::Duration::from_std(progress.elapsed).unwrap_or_else(|_| chrono::Duration::zero())
        ),
        truncate(&progress.current_path.display().to_string(), NAME_WIDTH),
    )
}

pub fn print_scan_summary(scan: &Scan, warnings: usize) {
    println!("{}", "─".repeat(60));
    println!(" Scan {} - {}", scan.id, scan.status);
    println!(
        " {} folders, {} files, {}",
        scan.folders_scanned,
        scan.files_scanned,
        format_size(scan.total_bytes)
    );
    if let Some(duration) = scan.duration() {
        println!(" Took {}", format_duration(duration));
    }
    if let Some(error) = &scan.error_message {
        println!(" Error: {error}");
    }
    println!("{}", "─".repeat(60));
    if warnings > 0 {
        println!("{warnings} warning(s) during scan");
    }
}

pub fn print_history(scans: &[Scan]) {
    if scans.is_empty() {
        println!("No scans recorded yet.");
        return;
    }
    println!(
        "{:>6}  {:<19}  {:<10}  {:>9}  {:>9}  {:>10}  {:>10}",
        "ID", "STARTED (UTC)", "STATUS", "FOLDERS", "FILES", "SIZE", "DURATION"
    );
    for scan in scans {
        println!(
            "{:>6}  {:<19}  {:<10}  {:>9}  {:>9}  {:>10}  {:>10}",
            scan.id.to_string(),
            format_time(&scan.start_time),
            scan.status.to_string(),
            scan.folders_scanned,
            scan.files_scanned,
            format_size(scan.total_bytes),
            scan.duration().map(format_duration).unwrap_or_else(|| "-".to_string()),
        );
        if let Some(error) = &scan.error_message {
            println!("        {error}");
        }
    }
}

/// Print a folder tree, `top_n` children per level.
pub fn print_tree(tree: &FolderTree, top_n: usize) {
    print_folder(tree, 0, top_n, tree.node.size_bytes);
}

fn print_folder(tree: &FolderTree, depth: usize, top_n: usize, root_size: u64) {
    let indent = "  ".repeat(depth);
    let ratio = if root_size > 0 {
        tree.node.size_bytes as f64 / root_size as f64
    } else {
        0.0
    };
    let name = if depth == 0 {
        tree.node.path.display().to_string()
    } else {
        tree.node.name.to_string()
    };

    println!(
        "{}{:<width$} {:>10} {:>5.1}% {}",
        indent,
        truncate(&format!("{name}/"), NAME_WIDTH),
        format_size(tree.node.size_bytes),
        ratio * 100.0,
        make_bar(ratio, BAR_WIDTH),
        width = NAME_WIDTH,
    );

    for child in tree.children.iter().take(top_n) {
        print_folder(child, depth + 1, top_n, root_size);
    }
    let remaining = tree.children.len().saturating_sub(top_n);
    if remaining > 0 {
        println!("{}  ... and {} more", indent, remaining);
    }
}

pub fn print_comparison(comparison: &ScanComparison) {
    println!("Scan {} -> scan {}", comparison.older, comparison.newer);
    match &comparison.root {
        Some(root) => print_delta(root, ""),
        None => println!("Neither scan has a root folder."),
    }
    for child in &comparison.children {
        print_delta(child, "  ");
    }
}

fn print_delta(delta: &SizeDelta, indent: &str) {
    let side = |bytes: Option<u64>| bytes.map(format_size).unwrap_or_else(|| "-".to_string());
    let note = if delta.is_new() {
        " (new)"
    } else if delta.is_removed() {
        " (removed)"
    } else {
        ""
    };
    println!(
        "{}{:<width$} {:>10} -> {:<10} {:>11}{}",
        indent,
        truncate(&delta.name, NAME_WIDTH),
        side(delta.older_bytes),
        side(delta.newer_bytes),
        format_delta(delta.delta_bytes()),
        note,
        width = NAME_WIDTH,
    );
}

pub fn print_settings(settings: &Settings) {
    let time = |t: &Option<DateTime<Utc>>| {
        t.as_ref().map(format_time).unwrap_or_else(|| "never".to_string())
    };
    println!("Scan root:      {}", settings.scan_root_path.display());
    println!("Interval:       {}h", settings.scan_interval_hours);
    println!(
        "Auto scan:      {}",
        if settings.auto_scan_enabled { "on" } else { "off" }
    );
    println!("Last scan:      {}", time(&settings.last_scan_time));
    println!("Next scan:      {}", time(&settings.next_scan_time));
}
