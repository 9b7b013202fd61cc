use crate::history::SessionHistory;
use crate::session::SessionSummary;
use serde::Serialize;
use std::io;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    session_id: &'a str,
    content_id: &'a str,
    difficulty: Option<String>,
    started_at: String,
    duration_ms: i64,
    wpm: f64,
    accuracy_pct: f64,
    total_chars: usize,
    errors: usize,
    consistency: f64,
    improvement_from_prev: Option<f64>,
    milestones: String,
    partial: bool,
}

impl<'a> From<&'a SessionSummary> for ExportRow<'a> {
    fn from(s: &'a SessionSummary) -> Self {
        Self {
            session_id: &s.session_id,
            content_id: &s.content_id,
            difficulty: s.difficulty.map(|d| d.to_string()),
            started_at: s.started_at.to_rfc3339(),
            duration_ms: s.duration_ms,
            wpm: s.wpm,
            accuracy_pct: s.accuracy_pct,
            total_chars: s.total_chars,
            errors: s.errors,
            consistency: s.consistency,
            improvement_from_prev: s.improvement_from_prev,
            milestones: s.milestones_achieved.join(";"),
            partial: s.partial,
        }
    }
}

/// Write every session in `history` as a CSV row, oldest first. Returns the rows written.
pub fn write_history_csv<W: io::Write>(
    history: &SessionHistory,
    out: W,
) -> Result<usize, csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    let mut rows = 0;
    for summary in history.iter() {
        writer.serialize(ExportRow::from(summary))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}
