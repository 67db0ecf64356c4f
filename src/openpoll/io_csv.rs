// Exporting polls as CSV, and reading plain response files.

use std::fs;
use std::io::Write;

use log::{debug, info};
use snafu::prelude::*;

use crate::openpoll::*;

pub const EXPORT_HEADER: [&str; 5] = ["kind", "id", "createdAt", "text", "count"];

/// Writes one row for the question, one per response (oldest first), one per ranked
/// term and one for the summary. A poll that was never closed has no term or summary rows.
pub fn write_export<W: Write>(writer: W, detail: &PollDetail, path: &str) -> CliResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let poll = &detail.poll;
    let mut rows: Vec<[String; 5]> = vec![[
        "question".to_string(),
        poll.id.to_string(),
        poll.created_at.to_rfc3339(),
        poll.question.clone(),
        String::new(),
    ]];
    for r in detail.responses.iter().rev() {
        rows.push([
            "response".to_string(),
            r.id.to_string(),
            r.created_at.to_rfc3339(),
            r.text.clone(),
            String::new(),
        ]);
    }
    for tc in poll.word_frequencies.iter().flatten() {
        rows.push([
            "term".to_string(),
            String::new(),
            String::new(),
            tc.term.clone(),
            tc.count.to_string(),
        ]);
    }
    if let Some(summary) = &poll.summary_text {
        rows.push([
            "summary".to_string(),
            String::new(),
            poll.closed_at().map(|d| d.to_rfc3339()).unwrap_or_default(),
            summary.clone(),
            String::new(),
        ]);
    }
    debug!("write_export: {} rows for poll {}", rows.len(), poll.id);

    wtr.write_record(EXPORT_HEADER)
        .context(WritingCsvSnafu { path })?;
    for row in rows.iter() {
        wtr.write_record(row).context(WritingCsvSnafu { path })?;
    }
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

/// Exports to a file, or to the standard output when no file (or 'stdout') is given.
pub fn export_poll(detail: &PollDetail, out: Option<&str>) -> CliResult<()> {
    match out {
        None | Some("") | Some("stdout") => {
            let stdout = std::io::stdout();
            write_export(stdout.lock(), detail, "stdout")
        }
        Some(path) => {
            let file = fs::File::create(path).context(WritingOutputSnafu { path })?;
            write_export(file, detail, path)?;
            info!("Exported poll {} to {}", detail.poll.id, path);
            Ok(())
        }
    }
}

/// One response per line. Blank lines are skipped.
pub fn read_text_responses(path: &str) -> CliResult<Vec<String>> {
    let contents = fs::read_to_string(path).context(ReadingInputSnafu { path })?;
    Ok(contents
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_detail() -> PollDetail {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut poll = Poll::new("Favorite color, and why?", "ABC234", t0);
        let older = Response::new(poll.id, "Blue, like the sea", t0 + Duration::minutes(1));
        let newer = Response::new(poll.id, "blue \"obviously\"", t0 + Duration::minutes(2));
        poll.state = PollState::Closed {
            closed_at: t0 + Duration::minutes(3),
        };
        poll.word_frequencies = Some(vec![TermCount::new("blue", 2)]);
        poll.summary_text = Some("Mostly blue.".to_string());
        PollDetail {
            poll,
            responses: vec![newer, older],
        }
    }

    fn export_rows(detail: &PollDetail) -> Vec<Vec<String>> {
        let mut buf: Vec<u8> = Vec::new();
        write_export(&mut buf, detail, "memory").unwrap();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(buf.as_slice());
        rdr.records()
            .map(|r| r.unwrap().iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn export_closed_poll() {
        let detail = sample_detail();
        let rows = export_rows(&detail);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], EXPORT_HEADER.to_vec());
        assert_eq!(rows[1][0], "question");
        assert_eq!(rows[1][3], "Favorite color, and why?");
        // Oldest response first, quotes preserved.
        assert_eq!(rows[2][3], "Blue, like the sea");
        assert_eq!(rows[3][3], "blue \"obviously\"");
        assert_eq!(rows[4], vec!["term", "", "", "blue", "2"]);
        assert_eq!(rows[5][0], "summary");
        assert_eq!(rows[5][3], "Mostly blue.");
    }

    #[test]
    fn export_active_poll() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let detail = PollDetail {
            poll: Poll::new("Why?", "ABC234", t0),
            responses: vec![],
        };
        let rows = export_rows(&detail);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "question");
    }

    #[test]
    fn export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poll.csv").display().to_string();
        export_poll(&sample_detail(), Some(&path)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("kind,id,createdAt,text,count"));
        assert!(contents.contains("term,,,blue,2"));
    }

    #[test]
    fn read_responses_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.txt");
        std::fs::write(&path, "  blue sky \n\n\t\nBlue sea\r\n").unwrap();
        let texts = read_text_responses(&path.display().to_string()).unwrap();
        assert_eq!(texts, vec!["blue sky", "Blue sea"]);
        assert!(matches!(
            read_text_responses("/nonexistent/answers.txt"),
            Err(CliError::ReadingInput { .. })
        ));
    }
}
