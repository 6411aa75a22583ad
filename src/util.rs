use crate::error::ArchiveError;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Parses whitespace-delimited numeric text into rows.
///
/// Blank lines and `#` comments are skipped. Every row must have the same
/// column count as the first one.
pub fn parse_numeric_rows(text: &str) -> Result<Vec<Vec<f64>>, ArchiveError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut width = None;

    for (line_idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_idx + 1;

        let mut row = Vec::new();
        for (column, token) in line.split_whitespace().enumerate() {
            let value = token
                .parse::<f64>()
                .map_err(|_| ArchiveError::InvalidNumber {
                    line: line_no,
                    column: column + 1,
                    token: token.to_string(),
                })?;
            if !value.is_finite() {
                return Err(ArchiveError::NonFinite {
                    line: line_no,
                    column: column + 1,
                    token: token.to_string(),
                });
            }
            row.push(value);
        }

        match width {
            None => width = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err(ArchiveError::RaggedRow {
                    line: line_no,
                    expected,
                    found: row.len(),
                });
            }
            Some(_) => {}
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Formats one row the way the loaders read it back: space separated,
/// shortest round-trip representation.
pub fn format_row(values: impl IntoIterator<Item = f64>) -> String {
    let mut out = String::new();
    for (idx, value) in values.into_iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{value:?}"));
    }
    out
}

/// Log filter from `RUST_LOG`-style directives, `info` when unset or invalid.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

pub fn timestamp_suffix() -> String {
    format!("{}", now_unix_s())
}

pub fn now_unix_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let rows = parse_numeric_rows("# header\n1 2 3\n\n  4 5 6 # trailing\n").unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn accepts_scientific_notation() {
        let rows = parse_numeric_rows("1e-3 -2.5E2\n").unwrap();
        assert_eq!(rows, vec![vec![0.001, -250.0]]);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = parse_numeric_rows("1 2 3\n4 5\n").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::RaggedRow {
                line: 2,
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn reports_bad_token_position() {
        let err = parse_numeric_rows("1 2\n3 x\n").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::InvalidNumber { line: 2, column: 2, .. }
        ));
    }

    #[test]
    fn rejects_non_finite_tokens() {
        for (text, column) in [("1 NaN\n", 2), ("inf 2\n", 1), ("1 -inf\n", 2)] {
            let err = parse_numeric_rows(text).unwrap_err();
            assert!(
                matches!(err, ArchiveError::NonFinite { line: 1, column: c, .. } if c == column),
                "{text:?}: {err}"
            );
        }
    }

    #[test]
    fn log_filter_honours_env_directives() {
        assert_eq!(log_filter(Some("debug")).to_string(), "debug");
        assert!(log_filter(Some("map_adapt=trace"))
            .to_string()
            .contains("map_adapt=trace"));
        assert_eq!(log_filter(None).to_string(), "info");
        assert_eq!(log_filter(Some("  ")).to_string(), "info");
    }

    #[test]
    fn formatted_rows_parse_back_exactly() {
        let values = [0.1, -3.0, 1.0 / 3.0, 2.5e-12];
        let line = format_row(values);
        let rows = parse_numeric_rows(&line).unwrap();
        assert_eq!(rows[0], values);
    }
}
