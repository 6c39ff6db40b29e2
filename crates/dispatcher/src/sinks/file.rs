//! FileSink - row-oriented CSV output

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use contracts::{ContractError, Sample, SampleSink};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

/// Column header written once per file
pub const CSV_HEADER: [&str; 6] = [
    "device_time_stamp",
    "system_time_stamp",
    "left_gaze_point_x",
    "left_gaze_point_y",
    "right_gaze_point_x",
    "right_gaze_point_y",
];

/// One CSV record; `None` serializes as an empty cell
#[derive(Debug, Serialize)]
struct CsvRow {
    device_time_stamp: i64,
    system_time_stamp: i64,
    left_gaze_point_x: Option<f32>,
    left_gaze_point_y: Option<f32>,
    right_gaze_point_x: Option<f32>,
    right_gaze_point_y: Option<f32>,
}

impl From<&Sample> for CsvRow {
    fn from(sample: &Sample) -> Self {
        Self {
            device_time_stamp: sample.device_timestamp_us,
            system_time_stamp: sample.system_timestamp_us,
            left_gaze_point_x: sample.left.gaze_x,
            left_gaze_point_y: sample.left.gaze_y,
            right_gaze_point_x: sample.right.gaze_x,
            right_gaze_point_y: sample.right.gaze_y,
        }
    }
}

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output directory (created on start)
    pub directory: PathBuf,
    /// File name prefix; the UTC start time is appended
    pub file_prefix: String,
}

impl FileSinkConfig {
    pub fn new(directory: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: file_prefix.into(),
        }
    }
}

/// Sink that appends one CSV row per sample
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<csv::Writer<File>>,
    path: Option<PathBuf>,
    rows: u64,
}

impl FileSink {
    /// Create a new FileSink; nothing touches the disk before `start`
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            writer: None,
            path: None,
            rows: 0,
        }
    }

    /// Path of the file being written, once started
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    fn open(&self) -> Result<(PathBuf, csv::Writer<File>), csv::Error> {
        fs::create_dir_all(&self.config.directory)?;
        let file_name = format!(
            "{}_{}.csv",
            self.config.file_prefix,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.config.directory.join(file_name);

        // header is written explicitly so empty sessions still get one
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(CSV_HEADER)?;
        Ok((path, writer))
    }
}

impl SampleSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_sink_start", skip(self), fields(sink = %self.name))]
    async fn start(&mut self) -> Result<(), ContractError> {
        let (path, writer) = self.open().map_err(|e| {
            error!(sink = %self.name, error = %e, "Failed to open CSV file");
            ContractError::sink_open(&self.name, e.to_string())
        })?;

        info!(sink = %self.name, path = %path.display(), "CSV file opened");
        self.path = Some(path);
        self.writer = Some(writer);
        Ok(())
    }

    async fn send(&mut self, sample: Arc<Sample>) -> Result<(), ContractError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "file not open"))?;

        writer
            .serialize(CsvRow::from(sample.as_ref()))
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        self.rows += 1;
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self), fields(sink = %self.name))]
    async fn close(&mut self) -> Result<(), ContractError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(sink = %self.name, rows = self.rows, "CSV file closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::EyeSample;
    use tempfile::tempdir;

    #[test]
    fn test_row_leaves_absent_fields_empty() {
        let sample = Sample::new(0, 8333, 123_456)
            .with_eyes(EyeSample::with_gaze(0.25, 0.5), EyeSample::default());

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(CsvRow::from(&sample)).unwrap();
        let row = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(row, "8333,123456,0.25,0.5,,\n");
    }

    #[tokio::test]
    async fn test_header_and_rows_written() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new("csv", FileSinkConfig::new(dir.path().join("p01"), "gaze"));
        sink.start().await.unwrap();

        for ts in [0, 8333, 16667] {
            let sample = Sample::new(0, ts, ts + 1)
                .with_eyes(EyeSample::with_gaze(0.1, 0.2), EyeSample::with_gaze(0.3, 0.4));
            sink.send(Arc::new(sample)).await.unwrap();
        }
        sink.close().await.unwrap();

        let path = sink.path().unwrap().to_path_buf();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("gaze_") && name.ends_with(".csv"), "{name}");

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(lines[2], "8333,8334,0.1,0.2,0.3,0.4");
        assert_eq!(sink.rows_written(), 3);
    }

    #[tokio::test]
    async fn test_unwritable_directory_fails_start() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let mut sink = FileSink::new("csv", FileSinkConfig::new(blocker.join("sub"), "gaze"));
        let err = sink.start().await.unwrap_err();
        assert!(matches!(err, ContractError::SinkOpen { .. }));
    }

    #[tokio::test]
    async fn test_send_before_start_is_an_error() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new("csv", FileSinkConfig::new(dir.path(), "gaze"));
        let err = sink.send(Arc::new(Sample::new(0, 0, 0))).await.unwrap_err();
        assert!(matches!(err, ContractError::SinkWrite { .. }));
    }
}
