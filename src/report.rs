//! Console rendering of comparison results and history
//!
//! Everything writes to an [`std::io::Write`] so the binary prints to stdout
//! and tests capture into a buffer. Colors follow `colored`'s global switch.

use crate::compare::{CompareResult, Difference};
use crate::types::{LogEntry, Modification, ModificationCounts};
use chrono::Local;
use colored::*;
use std::io::{self, Write};

/// Write a comparison: one line per difference when `verbose`, then a summary
pub fn write_compare_result<W: Write>(out: &mut W, result: &CompareResult, verbose: bool) -> io::Result<()> {
    if verbose {
        for difference in &result.differences {
            write_difference(out, difference)?;
        }
        if !result.differences.is_empty() {
            writeln!(out)?;
        }
    }
    write_summary(out, &result.counts)
}

fn write_difference<W: Write>(out: &mut W, difference: &Difference) -> io::Result<()> {
    let Some(modification) = difference.modification() else {
        return Ok(());
    };
    let label = format!("{}:", modification.label());
    let label = match modification {
        Modification::Added | Modification::Copied | Modification::Duplicated => label.green(),
        Modification::Deleted => label.red(),
        Modification::Renamed => label.cyan(),
        _ => label.yellow(),
    };
    let path = difference.file.path.display();

    match (modification, &difference.previous) {
        (Modification::Renamed, Some(previous)) => {
            writeln!(out, "{} {} -> {}", label, previous.path.display(), path)
        }
        (Modification::Copied | Modification::Duplicated, Some(source)) => {
            writeln!(out, "{} {} (from {})", label, path, source.path.display())
        }
        _ => writeln!(out, "{} {}", label, path),
    }
}

/// Write the one-line count summary, or `Nothing modified`
pub fn write_summary<W: Write>(out: &mut W, counts: &ModificationCounts) -> io::Result<()> {
    if counts.is_clean() {
        return writeln!(out, "{}", "Nothing modified".green());
    }
    let modified = counts.modified_count();
    writeln!(
        out,
        "{} modified {}: {}",
        modified.to_string().bold(),
        if modified == 1 { "file" } else { "files" },
        breakdown(counts)
    )
}

/// Non-zero counters in category order, like `2 added, 1 renamed`
pub fn breakdown(counts: &ModificationCounts) -> String {
    Modification::ALL
        .iter()
        .filter(|m| counts.get(**m) > 0)
        .map(|m| format!("{} {}", counts.get(*m), m.label().to_lowercase()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write one block per stored state
pub fn write_log<W: Write>(out: &mut W, entries: &[LogEntry]) -> io::Result<()> {
    for entry in entries {
        writeln!(
            out,
            "{} {} {}",
            format!("State #{}", entry.state_number).yellow().bold(),
            entry
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed(),
            format!("({})", entry.hash_mode).dimmed()
        )?;
        if !entry.comment.is_empty() {
            writeln!(out, "  Comment: {}", entry.comment.cyan())?;
        }
        write!(out, "  Files: {}", entry.file_count)?;
        if entry.modification_counts.is_clean() {
            writeln!(out)?;
        } else {
            writeln!(
                out,
                ", {} modified ({})",
                entry.modification_counts.modified_count(),
                breakdown(&entry.modification_counts)
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}
