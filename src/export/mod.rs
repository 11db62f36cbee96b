//! Show listings as a terminal table, JSON or CSV.

use crate::models::Show;
use anyhow::{Context, Result};
use std::io::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

pub fn write_shows<W: Write>(out: W, shows: &[Show], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => write_table(out, shows),
        OutputFormat::Json => write_json(out, shows),
        OutputFormat::Csv => write_csv(out, shows),
    }
}

pub fn write_json<W: Write>(mut out: W, shows: &[Show]) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, shows).context("Failed to write JSON")?;
    writeln!(out)?;
    Ok(())
}

/// One row per show, headed by the `Show` field names.
pub fn write_csv<W: Write>(out: W, shows: &[Show]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(out);
    for show in shows {
        writer
            .serialize(show)
            .with_context(|| format!("Failed to write CSV row for {}", show.name))?;
    }
    writer.flush()?;
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn write_table<W: Write>(mut out: W, shows: &[Show]) -> Result<()> {
    if shows.is_empty() {
        writeln!(out, "No shows.")?;
        return Ok(());
    }

    let venue_width = shows
        .iter()
        .map(|s| s.theatre.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(5, 24)
        + 2;

    writeln!(out, "{:<12}{:<12}{:<venue_width$}NAME", "START", "END", "VENUE")?;
    for show in shows {
        writeln!(
            out,
            "{:<12}{:<12}{:<venue_width$}{}",
            show.start_date.to_string(),
            show.end_date.to_string(),
            truncate(&show.theatre, venue_width - 2),
            show.name
        )?;
    }
    writeln!(out, "{} shows", crate::utils::fmt_number(shows.len() as i64))?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
