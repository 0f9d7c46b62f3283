use std::fmt::Write;
use std::io::Write as _;

use serde_json::{Map, Value};
use timer_core::{format_hms, progress, remaining, CountdownAnchor};

use crate::alerts::Note;
use crate::backend::{RowRecord, TriageCategory};
use crate::session::CountdownSource;
use crate::ViewMode;

const BAR_WIDTH: usize = 30;

pub struct Screen<'a> {
    pub row: u32,
    pub mode: ViewMode,
    pub locked: bool,
    pub record: Option<&'a RowRecord>,
    pub countdown: &'a CountdownSource,
    pub link: Option<&'a str>,
    pub notes: &'a [Note],
}

pub fn clear_screen(out: &mut String) {
    out.push_str("\x1b[2J\x1b[H");
}

pub fn present(frame: &str) {
    let mut stdout = std::io::stdout();
    stdout.write_all(frame.as_bytes()).ok();
    stdout.flush().ok();
}

pub fn draw_dashboard(screen: &Screen, now: i64) -> String {
    let mut out = String::new();

    let heading = if screen.locked { "LOCKED" } else { "PATIENT" };
    writeln!(out, "{} DASHBOARD - ROW {}", heading, screen.row).ok();
    writeln!(out).ok();

    if let Some(record) = screen.record {
        // Locked and view mode show the full row including the category
        let columns = if screen.locked || screen.mode == ViewMode::View {
            &record.a_l
        } else {
            &record.a_k
        };
        draw_table(&mut out, columns);
        if !screen.locked && screen.mode == ViewMode::Edit {
            draw_category_picker(&mut out, record.category());
        }
        writeln!(out).ok();
    }

    draw_countdown(&mut out, screen.countdown, now);

    if let Some(link) = screen.link {
        writeln!(out).ok();
        writeln!(out, "Handoff link:").ok();
        writeln!(out, "  {}", link).ok();
    }

    if !screen.notes.is_empty() {
        writeln!(out).ok();
        for note in screen.notes {
            writeln!(out, "note: {}", note.message()).ok();
        }
    }

    writeln!(out).ok();
    if screen.locked {
        writeln!(out, "q=quit").ok();
    } else {
        let max_rows = screen.record.map(|r| r.max_rows).unwrap_or(1);
        writeln!(
            out,
            "row {} of {}  r=refresh  q=quit  (--row N to switch, --mode view|edit)",
            screen.row, max_rows
        )
        .ok();
    }
    out
}

pub fn draw_table(out: &mut String, columns: &Map<String, Value>) {
    if columns.is_empty() {
        writeln!(out, "(no data)").ok();
        return;
    }
    let width = columns.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    for (key, value) in columns {
        writeln!(out, "{:<width$}  {}", key, cell_text(value), width = width).ok();
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn draw_category_picker(out: &mut String, current: TriageCategory) {
    writeln!(out).ok();
    writeln!(out, "Treatment category (column L):").ok();
    for category in TriageCategory::ALL {
        let marker = if category == current { "> " } else { "  " };
        writeln!(out, "{}{}", marker, category.as_str()).ok();
    }
    writeln!(out, "(--set <category> to submit)").ok();
}

pub fn draw_countdown(out: &mut String, source: &CountdownSource, now: i64) {
    match source {
        CountdownSource::Rejected(reason) => {
            writeln!(out, "COUNTDOWN UNAVAILABLE").ok();
            writeln!(out, "  {}", reason).ok();
        }
        CountdownSource::Local { anchor, .. } | CountdownSource::Handoff { anchor, .. } => {
            let left = remaining(*anchor, now);
            let label = if left == 0 { "TIME UP" } else { "COUNTDOWN" };
            writeln!(out, "{}  {}", label, format_hms(left)).ok();
            writeln!(out, "{}", progress_bar(*anchor, now)).ok();
        }
    }
}

pub fn progress_bar(anchor: CountdownAnchor, now: i64) -> String {
    let fill = (BAR_WIDTH as f32 * progress(anchor, now)) as usize;
    let fill = fill.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(fill), ".".repeat(BAR_WIDTH - fill))
}
