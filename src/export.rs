//! Session export: CSV, JSON document, and a standalone HTML report.
//!
//! All renderers are pure functions over a slice of sessions; writing the
//! result somewhere is the caller's business.  Dates and times are rendered
//! in UTC.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Session, SessionStatus};

/// Version tag written into JSON exports.
pub const EXPORT_VERSION: &str = "1.0";

pub const CSV_HEADER: &str =
    "ID,Date,Time,Heart Rate (bpm),Avg ECG (mV),Min ECG (mV),Max ECG (mV),Status,Duration,Notes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Html,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            other => Err(format!("unknown export format '{other}' (csv, json, html)")),
        }
    }
}

/// Aggregate figures over a set of sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatistics {
    pub total_sessions: usize,
    pub total_duration_secs: u64,
    pub avg_heart_rate: f64,
    pub min_heart_rate: u16,
    pub max_heart_rate: u16,
    #[serde(rename = "avgECG")]
    pub avg_ecg: f64,
    pub low_sessions: usize,
    pub normal_sessions: usize,
    pub elevated_sessions: usize,
}

impl ExportStatistics {
    /// All-zero for an empty slice.
    pub fn from_sessions(sessions: &[Session]) -> Self {
        if sessions.is_empty() {
            return Self::default();
        }
        let n = sessions.len() as f64;
        let count = |status| sessions.iter().filter(|s| s.status == status).count();
        Self {
            total_sessions: sessions.len(),
            total_duration_secs: sessions.iter().map(|s| s.duration_secs).sum(),
            avg_heart_rate: round1(sessions.iter().map(|s| f64::from(s.avg_heart_rate)).sum::<f64>() / n),
            min_heart_rate: sessions.iter().map(|s| s.avg_heart_rate).min().unwrap_or(0),
            max_heart_rate: sessions.iter().map(|s| s.avg_heart_rate).max().unwrap_or(0),
            avg_ecg: round3(sessions.iter().map(|s| s.avg_ecg).sum::<f64>() / n),
            low_sessions: count(SessionStatus::Low),
            normal_sessions: count(SessionStatus::Normal),
            elevated_sessions: count(SessionStatus::Elevated),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Render `sessions` in `format`, stamping documents with the current time.
pub fn export(format: ExportFormat, sessions: &[Session]) -> serde_json::Result<String> {
    let now = Utc::now();
    match format {
        ExportFormat::Csv => Ok(to_csv(sessions)),
        ExportFormat::Json => to_json(sessions, now),
        ExportFormat::Html => Ok(to_html(sessions, now)),
    }
}

// ── CSV ───────────────────────────────────────────────────────────────────────

/// Commas become semicolons and line breaks become spaces so a field never
/// splits a row.
fn csv_field(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ',' => ';',
            '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}

pub fn to_csv(sessions: &[Session]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for s in sessions {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            s.id,
            s.start_time.format("%Y-%m-%d"),
            s.start_time.format("%H:%M:%S"),
            s.avg_heart_rate,
            s.avg_ecg,
            s.min_ecg,
            s.max_ecg,
            s.status,
            csv_field(&s.duration),
            csv_field(s.notes.as_deref().unwrap_or("")),
        );
    }
    out
}

// ── JSON ──────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    version: &'static str,
    export_date: DateTime<Utc>,
    total_sessions: usize,
    sessions: &'a [Session],
    statistics: ExportStatistics,
}

/// Pretty-printed `{version, exportDate, totalSessions, sessions, statistics}`.
pub fn to_json(sessions: &[Session], export_date: DateTime<Utc>) -> serde_json::Result<String> {
    let doc = ExportDocument {
        version: EXPORT_VERSION,
        export_date,
        total_sessions: sessions.len(),
        sessions,
        statistics: ExportStatistics::from_sessions(sessions),
    };
    serde_json::to_string_pretty(&doc)
}

// ── HTML ──────────────────────────────────────────────────────────────────────

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn to_html(sessions: &[Session], export_date: DateTime<Utc>) -> String {
    let stats = ExportStatistics::from_sessions(sessions);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>ECG Session Report</title>\n<style>\n");
    out.push_str("body { font-family: sans-serif; margin: 2em; }\n");
    out.push_str("table { border-collapse: collapse; width: 100%; }\n");
    out.push_str("th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; }\n");
    out.push_str(".low { color: #1565c0; } .normal { color: #2e7d32; } .elevated { color: #c62828; }\n");
    out.push_str("</style>\n</head>\n<body>\n<h1>ECG Session Report</h1>\n");
    let _ = writeln!(out, "<p>Exported {}</p>", export_date.format("%Y-%m-%d %H:%M:%S UTC"));

    out.push_str("<h2>Summary</h2>\n<ul>\n");
    let _ = writeln!(out, "<li>Sessions: {}</li>", stats.total_sessions);
    let _ = writeln!(out, "<li>Average heart rate: {} bpm</li>", stats.avg_heart_rate);
    let _ = writeln!(
        out,
        "<li>Heart rate range: {} to {} bpm</li>",
        stats.min_heart_rate, stats.max_heart_rate
    );
    let _ = writeln!(out, "<li>Average ECG: {} mV</li>", stats.avg_ecg);
    let _ = writeln!(
        out,
        "<li>Low / normal / elevated: {} / {} / {}</li>",
        stats.low_sessions, stats.normal_sessions, stats.elevated_sessions
    );
    out.push_str("</ul>\n");

    out.push_str("<h2>Sessions</h2>\n<table>\n<tr>");
    for h in CSV_HEADER.split(',').skip(1) {
        let _ = write!(out, "<th>{}</th>", escape_html(h));
    }
    out.push_str("</tr>\n");
    for s in sessions {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td class=\"{status}\">{status}</td><td>{}</td><td>{}</td></tr>",
            s.start_time.format("%Y-%m-%d"),
            s.start_time.format("%H:%M:%S"),
            s.avg_heart_rate,
            s.avg_ecg,
            s.min_ecg,
            s.max_ecg,
            escape_html(&s.duration),
            escape_html(s.notes.as_deref().unwrap_or("")),
            status = s.status,
        );
    }
    out.push_str("</table>\n</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::session_at;

    fn sessions() -> Vec<Session> {
        vec![
            session_at("2026-03-02T09:30:05Z", 92, Some("walk, then\nstairs")),
            session_at("2026-03-01T22:10:00Z", 60, None),
        ]
    }

    #[test]
    fn format_names_parse_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert_eq!("html".parse::<ExportFormat>(), Ok(ExportFormat::Html));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn csv_has_header_and_one_row_per_session() {
        let all = sessions();
        let csv = to_csv(&all);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            format!("{},2026-03-02,09:30:05,92,0.35,-0.2,1.2,elevated,1m 30s,walk; then stairs", all[0].id)
        );
        assert!(lines[2].ends_with(",low,1m 30s,"));
        for line in &lines {
            assert_eq!(line.split(',').count(), 10);
        }
    }

    #[test]
    fn statistics_summarize_sessions() {
        let stats = ExportStatistics::from_sessions(&sessions());
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_duration_secs, 180);
        assert_eq!(stats.avg_heart_rate, 76.0);
        assert_eq!((stats.min_heart_rate, stats.max_heart_rate), (60, 92));
        assert_eq!((stats.low_sessions, stats.normal_sessions, stats.elevated_sessions), (1, 0, 1));
        assert_eq!(ExportStatistics::from_sessions(&[]), ExportStatistics::default());
    }

    #[test]
    fn json_document_shape() {
        let at = DateTime::parse_from_rfc3339("2026-03-03T00:00:00Z").unwrap().with_timezone(&Utc);
        let json = to_json(&sessions(), at).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(v["version"], EXPORT_VERSION);
        assert_eq!(v["totalSessions"], 2);
        assert!(v["exportDate"].as_str().unwrap().starts_with("2026-03-03T00:00:00"));
        assert_eq!(v["sessions"][0]["avgHeartRate"], 92);
        assert_eq!(v["sessions"][0]["rawSamples"].as_array().unwrap().len(), 3);
        assert_eq!(v["statistics"]["elevatedSessions"], 1);
    }

    #[test]
    fn html_escapes_notes() {
        let mut all = sessions();
        all[1].notes = Some("<b>fine</b> & calm".into());
        let html = to_html(&all, Utc::now());
        assert!(html.contains("&lt;b&gt;fine&lt;/b&gt; &amp; calm"));
        assert!(!html.contains("<b>fine</b>"));
        assert!(html.contains("<td class=\"elevated\">elevated</td>"));
        assert_eq!(html.matches("<tr><td>").count(), 2);
    }
}
