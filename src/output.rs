use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ExportError;
use crate::extract::Row;

/// Write `fields` as the header and one line per row.
///
/// Data goes to `<path>.tmp` first and is renamed into place, so a failed
/// write never leaves a half-written CSV behind. Returns the row count.
pub fn write_csv(path: &Path, fields: &[String], rows: &[Row]) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = write_rows(&tmp, fields, rows) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        ExportError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;

    info!(path = %path.display(), rows = rows.len(), "Wrote CSV");
    Ok(rows.len())
}

fn write_rows(tmp: &Path, fields: &[String], rows: &[Row]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: tmp.to_path_buf(),
        source,
    };

    let file = fs::File::create(tmp).map_err(io_err)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(fields)?;
    for row in rows {
        writer.write_record(row.values())?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_row, Record};
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(v: serde_json::Value, fields: &[String]) -> Row {
        let record: Record = v.as_object().cloned().unwrap();
        extract_row(&record, fields)
    }

    #[test]
    fn header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let f = fields(&["title", "date"]);
        let rows = vec![
            row(json!({ "title": { "rendered": "One" }, "date": "2024-01-01" }), &f),
            row(json!({ "title": { "rendered": "Two" } }), &f),
        ];

        assert_eq!(write_csv(&path, &f, &rows).unwrap(), 2);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "title,date\nOne,2024-01-01\nTwo,\n");
        assert!(!dir.path().join("out.csv.tmp").exists());
    }

    #[test]
    fn header_only_when_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&path, &fields(&["title", "date"]), &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "title,date\n");
    }

    #[test]
    fn quoting_survives_reading_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quoted.csv");
        let f = fields(&["title", "content"]);
        let rows = vec![row(
            json!({
                "title": "He said \"hello\", then left",
                "content": "Line one\nLine two",
            }),
            &f,
        )];
        write_csv(&path, &f, &rows).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<&str> = reader.headers().unwrap().iter().collect();
        assert_eq!(header, vec!["title", "content"]);
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][0], "He said \"hello\", then left");
        assert_eq!(&records[0][1], "Line one\nLine two");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports/2024/posts.csv");
        write_csv(&path, &fields(&["id"]), &[]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();
        let path = blocker.join("out.csv");

        let err = write_csv(&path, &fields(&["id"]), &[]).unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale\n").unwrap();
        write_csv(&path, &fields(&["id"]), &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "id\n");
    }
}
