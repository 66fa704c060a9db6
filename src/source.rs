//! External object table: one `(size, intensity)` row per object.

use crate::error::{Result, SimulationError};
use log::info;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One object read from an external statistics table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceObject {
    /// Voxel count, rounded to a whole voxel (at least 1).
    pub size: u32,
    /// Mean intensity reported by the table.
    pub intensity: f64,
}

#[derive(Deserialize)]
struct Row {
    #[serde(alias = "volume", alias = "Volume", alias = "Volume (px)")]
    size: f64,
    #[serde(alias = "avgint", alias = "mean_intensity", alias = "Avg. intensity")]
    intensity: f64,
}

/// Reads a `,` or `;` delimited table with a header row.
pub fn read_object_source<P: AsRef<Path>>(path: P) -> Result<Vec<SourceObject>> {
    let path = path.as_ref();
    let fail = |reason: String| SimulationError::ObjectSource { path: path.to_path_buf(), reason };

    let mut header = String::new();
    File::open(path)
        .and_then(|f| BufReader::new(f).read_line(&mut header))
        .map_err(|e| fail(e.to_string()))?;

    let reader = table_reader(&header)
        .from_path(path)
        .map_err(|e| fail(e.to_string()))?;
    let objects = parse_object_table(reader).map_err(fail)?;
    info!("Read {} objects from {}", objects.len(), path.display());
    Ok(objects)
}

// Delimiter is sniffed from the header line.
fn table_reader(header: &str) -> csv::ReaderBuilder {
    let delimiter = if header.contains(';') { b';' } else { b',' };
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(delimiter).trim(csv::Trim::All);
    builder
}

fn parse_object_table<R: Read>(mut reader: csv::Reader<R>) -> std::result::Result<Vec<SourceObject>, String> {
    let mut objects = Vec::new();
    for (line, row) in reader.deserialize::<Row>().enumerate() {
        let row = row.map_err(|e| format!("row {}: {}", line + 1, e))?;
        if !(row.size.is_finite() && row.size >= 0.0) {
            return Err(format!("row {}: invalid size {}", line + 1, row.size));
        }
        objects.push(SourceObject { size: (row.size.round() as u32).max(1), intensity: row.intensity });
    }
    if objects.is_empty() {
        return Err("table contains no objects".to_string());
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> std::result::Result<Vec<SourceObject>, String> {
        let header = text.lines().next().unwrap_or_default();
        parse_object_table(table_reader(header).from_reader(text.as_bytes()))
    }

    #[test]
    fn parses_comma_table() {
        let objects = parse("size,intensity\n12.4,200\n7,180.5\n").unwrap();
        assert_eq!(
            objects,
            vec![
                SourceObject { size: 12, intensity: 200.0 },
                SourceObject { size: 7, intensity: 180.5 },
            ]
        );
    }

    #[test]
    fn parses_semicolon_table_with_aliases() {
        let objects = parse("volume;avgint\n30;99\n").unwrap();
        assert_eq!(objects, vec![SourceObject { size: 30, intensity: 99.0 }]);
    }

    #[test]
    fn empty_table_is_an_error() {
        assert!(parse("size,intensity\n").is_err());
    }

    #[test]
    fn reads_semicolon_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.csv");
        std::fs::write(&path, "Volume (px); Avg. intensity\n4.6; 120\n").unwrap();
        let objects = read_object_source(&path).unwrap();
        assert_eq!(objects, vec![SourceObject { size: 5, intensity: 120.0 }]);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_object_source("/nonexistent/objects.csv");
        assert!(matches!(err, Err(SimulationError::ObjectSource { .. })));
    }
}
