//! CSV output recorder

use super::{OutputRow, RecorderError, RowSink, OUTPUT_HEADER};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Appends rows to a CSV file
///
/// An existing file with a different header is renamed to
/// `<stem>_backup_<UTC stamp>.<ext>` and a fresh file is started.
pub struct CsvRecorder {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: u64,
}

impl CsvRecorder {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let needs_header = match existing_header(&path)? {
            None => true,
            Some(header) if header == OUTPUT_HEADER.join(",") => false,
            Some(_) => {
                let backup = backup_path(&path);
                tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    "Output header changed, moving old file aside"
                );
                fs::rename(&path, &backup)?;
                true
            }
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(OUTPUT_HEADER)?;
            writer.flush()?;
        }

        tracing::info!(path = %path.display(), "Recording output rows");
        Ok(Self {
            path,
            writer,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl RowSink for CsvRecorder {
    fn record(&mut self, row: &OutputRow) -> Result<(), RecorderError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }
}

/// First line of a non-empty file
fn existing_header(path: &Path) -> Result<Option<String>, RecorderError> {
    if !path.exists() || fs::metadata(path)?.len() == 0 {
        return Ok(None);
    }
    let mut line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut line)?;
    Ok(Some(line.trim().to_string()))
}

fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let name = match path.extension() {
        Some(ext) => format!("{stem}_backup_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_backup_{stamp}"),
    };
    path.with_file_name(name)
}
