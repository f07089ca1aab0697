//! Mount table tokenizer (`/proc/self/mounts` format).
//!
//! Each line is `source target fstype options dump pass`, separated by
//! single spaces, with whitespace and backslashes inside fields escaped
//! as three-digit octal (`\040` for space). A line that does not split
//! into the six fields, or carries a bad escape, is an error rather
//! than something to skip.

use std::path::{Path, PathBuf};

use crate::error::{TargetError, TargetResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    pub options: String,
}

/// Parse a whole mount table.
pub fn parse_mounts(text: &str) -> TargetResult<Vec<MountEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_line(line).map_err(|reason| TargetError::MountTable { line: idx + 1, reason }))
        .collect()
}

/// Read and parse the mount table at `path`.
pub fn read_mounts(path: &Path) -> TargetResult<Vec<MountEntry>> {
    let text = std::fs::read_to_string(path)?;
    parse_mounts(&text)
}

fn parse_line(line: &str) -> Result<MountEntry, String> {
    let fields: Vec<&str> = line.split_ascii_whitespace().collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, found {}", fields.len()));
    }
    for (name, field) in [("dump", fields[4]), ("pass", fields[5])] {
        field
            .parse::<u32>()
            .map_err(|_| format!("{} field {:?} is not a number", name, field))?;
    }
    Ok(MountEntry {
        source: unescape(fields[0])?,
        target: PathBuf::from(unescape(fields[1])?),
        fstype: unescape(fields[2])?,
        options: unescape(fields[3])?,
    })
}

/// Decode `\ooo` octal escapes.
fn unescape(field: &str) -> Result<String, String> {
    if !field.contains('\\') {
        return Ok(field.to_string());
    }
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let digits = bytes
                .get(i + 1..i + 4)
                .filter(|d| d.iter().all(|b| (b'0'..=b'7').contains(b)))
                .ok_or_else(|| format!("bad escape in {:?}", field))?;
            let value = digits.iter().fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
            if value > 0xff {
                return Err(format!("escape out of range in {:?}", field));
            }
            out.push(value as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| format!("non-UTF-8 field {:?}", field))
}
