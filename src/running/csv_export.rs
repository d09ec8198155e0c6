use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::info;

use crate::{
    fs::operations::write_atomically,
    utils::time::{file_stamp, format_day},
};

use super::session::RunningSession;

const HEADER: [&str; 10] = [
    "Date",
    "Feeling",
    "Description",
    "Distance(km)",
    "Duration(min)",
    "Pace(min/km)",
    "Calories",
    "Elevation(m)",
    "AvgHR(bpm)",
    "MaxHR(bpm)",
];

/// Serializes sessions with dates in the local time zone. See [export_csv_in].
pub fn export_csv(sessions: &[RunningSession]) -> Result<Option<String>> {
    export_csv_in(sessions, &Local)
}

/// Produces the `;` separated export, one line per session in the given order. Returns `None`
/// when there is nothing to export so callers can report that instead of writing a header-only
/// file.
///
/// Only the description is quoted. The pace uses a decimal comma, other numbers are written as
/// is, and missing metrics leave their column empty.
pub fn export_csv_in<Tz: TimeZone>(sessions: &[RunningSession], tz: &Tz) -> Result<Option<String>>
where
    Tz::Offset: std::fmt::Display,
{
    if sessions.is_empty() {
        return Ok(None);
    }

    // Quoting is done by hand since only one column is ever quoted.
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(vec![]);

    writer.write_record(HEADER)?;
    for session in sessions {
        let metrics = &session.metrics;
        writer.write_record([
            format_day(&session.date.with_timezone(tz)),
            session.feeling.to_string(),
            quote(&session.description),
            number(metrics.distance),
            number(metrics.duration),
            number(metrics.pace).replace('.', ","),
            number(metrics.calories),
            number(metrics.elevation_gain),
            number(metrics.avg_heart_rate),
            number(metrics.max_heart_rate),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let mut text = String::from_utf8(bytes)?;
    // Lines are separated, not terminated.
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(Some(text))
}

/// Writes an export next to previous ones, named after the moment it was made.
pub async fn write_export_file(dir: &Path, csv: &str, at: DateTime<Utc>) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "running_sessions_{}.csv",
        file_stamp(&at.with_timezone(&Local))
    ));
    write_atomically(&path, csv.as_bytes()).await?;
    info!("Exported sessions to {path:?}");
    Ok(path)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use crate::running::session::{Feeling, RunningSession, SessionMetrics};

    use super::{export_csv, export_csv_in, write_export_file};

    fn recovery_run() -> RunningSession {
        RunningSession::new_run(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            Feeling::Excellent,
            "Easy run \"recovery\"",
            SessionMetrics {
                distance: Some(5.2),
                duration: Some(30.),
                pace: Some(5.77),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_export_row_format() -> Result<()> {
        let csv = export_csv_in(&[recovery_run()], &Utc)?.unwrap();
        let lines = csv.lines().collect::<Vec<_>>();

        assert_eq!(
            lines[0],
            "Date;Feeling;Description;Distance(km);Duration(min);Pace(min/km);Calories;Elevation(m);AvgHR(bpm);MaxHR(bpm)"
        );
        assert_eq!(
            lines[1],
            r#"15/01/2024;Excellent;"Easy run ""recovery""";5.2;30;5,77;;;;"#
        );
        assert_eq!(lines.len(), 2);
        assert!(!csv.ends_with('\n'));
        Ok(())
    }

    #[test]
    fn test_export_full_metrics_and_rest_day() -> Result<()> {
        let full = RunningSession::new_run(
            Utc.with_ymd_and_hms(2024, 3, 2, 6, 0, 0).unwrap(),
            Feeling::Difficult,
            "Hills; windy",
            SessionMetrics {
                distance: Some(12.),
                duration: Some(70.5),
                pace: Some(5.875),
                calories: Some(910.),
                elevation_gain: Some(350.),
                avg_heart_rate: Some(158.),
                max_heart_rate: Some(181.),
            },
        );
        let rest = RunningSession::new_rest(
            Utc.with_ymd_and_hms(2024, 3, 3, 6, 0, 0).unwrap(),
            Feeling::Good,
            "",
        );

        let csv = export_csv_in(&[full, rest], &Utc)?.unwrap();
        let lines = csv.split('\n').collect::<Vec<_>>();
        assert_eq!(
            lines[1],
            r#"02/03/2024;Difficult;"Hills; windy";12;70.5;5,875;910;350;158;181"#
        );
        assert_eq!(lines[2], r#"03/03/2024;Good;"";;;;;;;"#);
        Ok(())
    }

    #[test]
    fn test_empty_export_is_no_data() -> Result<()> {
        assert_eq!(export_csv(&[])?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_export_file() -> Result<()> {
        let dir = tempdir()?;
        let csv = export_csv_in(&[recovery_run()], &Utc)?.unwrap();

        let path = write_export_file(dir.path(), &csv, Utc::now()).await?;

        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("running_sessions_"));
        assert!(file_name.ends_with(".csv"));
        assert_eq!(tokio::fs::read_to_string(&path).await?, csv);
        Ok(())
    }
}
