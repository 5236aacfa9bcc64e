//! Generic table parsing helpers shared by the Linux and QNX parsers.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParsingError;

/// Finds the first line whose whitespace-split columns are all
/// members of `known_columns`, skipping line-by-line until one is
/// found (§4.4 "A header row whose columns do not all appear in the
/// expected category dictionary is skipped"). Parses every
/// subsequent non-empty line against that header, joining any
/// trailing overflow columns (e.g. a mount point containing spaces)
/// into the final column. Fails if no header is found, if no data row
/// follows it, or if `required_columns` are missing from the first
/// parsed row.
pub fn parse_header_table(
    text: &str,
    known_columns: &HashSet<&str>,
    required_columns: &[&str],
) -> Result<Vec<HashMap<String, String>>, ParsingError> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    let mut header: Option<Vec<String>> = None;
    let mut data_start = 0;
    for (i, line) in lines.iter().enumerate() {
        let cols: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if !cols.is_empty() && cols.iter().all(|c| known_columns.contains(c.as_str())) {
            header = Some(cols);
            data_start = i + 1;
            break;
        }
    }
    let header = header.ok_or_else(|| ParsingError::new("no recognisable table header", text))?;

    let mut rows = Vec::new();
    for line in &lines[data_start..] {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < header.len() {
            continue;
        }
        let mut row = HashMap::new();
        for (h, v) in header.iter().zip(cols.iter()) {
            row.insert(h.clone(), v.to_string());
        }
        if cols.len() > header.len() {
            if let Some(last) = header.last() {
                row.insert(last.clone(), cols[header.len() - 1..].join(" "));
            }
        }
        rows.push(row);
    }

    let first = rows
        .first()
        .ok_or_else(|| ParsingError::new("table header found but no data rows followed", text))?;
    for col in required_columns {
        if !first.contains_key(*col) {
            return Err(ParsingError::new(
                format!("required column {col:?} missing from first row"),
                text,
            ));
        }
    }
    Ok(rows)
}

static NUMERIC_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"0[xX][0-9a-fA-F]+|-?\d+").unwrap());

/// Extracts the leading numeric token from `value`, supporting `0x`
/// hex and decimal, and ignoring any trailing human-readable
/// annotation such as `" (1.0GB)"`. Iterates the argument it is
/// given, not a hard-coded literal.
pub fn convert_to_int(value: &str) -> Result<i64, ParsingError> {
    let token = NUMERIC_TOKEN
        .find(value)
        .ok_or_else(|| ParsingError::new("convert_to_int: no numeric token", value))?
        .as_str();
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
            .map_err(|e| ParsingError::new(format!("convert_to_int: {e}"), value))
    } else {
        token
            .parse::<i64>()
            .map_err(|e| ParsingError::new(format!("convert_to_int: {e}"), value))
    }
}

/// Splits `text` on `separator_pattern`, used to break the combined
/// per-process output apart at the reserved-token error boundary.
pub fn split_on_separator<'a>(text: &'a str, separator_pattern: &Regex) -> Vec<&'a str> {
    separator_pattern.split(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_to_int_parses_hex_ignoring_unit_annotation() {
        assert_eq!(convert_to_int("0x40000 (1.0GB)").unwrap(), 0x40000);
    }

    #[test]
    fn convert_to_int_parses_decimal() {
        assert_eq!(convert_to_int("1234").unwrap(), 1234);
    }

    #[test]
    fn header_table_skips_non_matching_lines() {
        let known: HashSet<&str> = ["Filesystem", "Size", "Used", "Avail", "Use%", "Mounted"]
            .into_iter()
            .collect();
        let text = "junk line here\nFilesystem Size Used Avail Use% Mounted\n/dev/sda1 100 50 50 50% /\n";
        let rows = parse_header_table(text, &known, &["Filesystem", "Mounted"]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Filesystem"], "/dev/sda1");
    }

    #[test]
    fn header_table_fails_without_required_column() {
        let known: HashSet<&str> = ["A", "B"].into_iter().collect();
        let text = "A B\n1 2\n";
        assert!(parse_header_table(text, &known, &["C"]).is_err());
    }
}
