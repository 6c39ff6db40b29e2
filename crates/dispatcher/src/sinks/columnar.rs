//! ColumnarFileSink - buffered Parquet output
//!
//! `send` only enqueues. A background worker drains the queue greedily into a
//! buffer of at most `max_buffer_size` samples and writes each full buffer as
//! one row group. `EndOfStream` flushes whatever is buffered, so close never
//! loses queued samples.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow_array::types::Float32Type;
use arrow_array::{
    ArrayRef, Float32Array, Int32Array, Int64Array, ListArray, RecordBatch,
    TimestampMillisecondArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::Utc;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{ContractError, Sample, SampleItem, SampleSink, StreamItem};
use observability::{DropLogger, RunningStats, StatsSummary};

use crate::error::DispatcherError;

/// Configuration for ColumnarFileSink
#[derive(Debug, Clone)]
pub struct ColumnarSinkConfig {
    /// Output directory (created on start)
    pub directory: PathBuf,
    pub file_prefix: String,
    /// Internal queue capacity
    pub queue_size: usize,
    /// Rows per flush (row group)
    pub max_buffer_size: usize,
    /// Drop on a full queue instead of waiting
    pub drop_when_full: bool,
}

impl ColumnarSinkConfig {
    fn validate(&self) -> Result<(), DispatcherError> {
        if self.max_buffer_size == 0 {
            return Err(DispatcherError::invalid_config(
                "parquet sink",
                "max_buffer_size must be > 0",
            ));
        }
        if self.queue_size <= self.max_buffer_size {
            return Err(DispatcherError::invalid_config(
                "parquet sink",
                format!(
                    "queue_size ({}) must be > max_buffer_size ({})",
                    self.queue_size, self.max_buffer_size
                ),
            ));
        }
        Ok(())
    }
}

/// Totals of a finished writer
#[derive(Debug, Clone, Default)]
pub struct ColumnarStats {
    pub rows_written: u64,
    pub row_groups: u64,
    pub flush_latency_ms: StatsSummary,
}

/// Sink writing samples to a zstd-compressed Parquet file
pub struct ColumnarFileSink {
    name: String,
    config: ColumnarSinkConfig,
    tx: Option<mpsc::Sender<SampleItem>>,
    worker: Option<JoinHandle<ColumnarStats>>,
    path: Option<PathBuf>,
    /// Queue-full drops plus rows lost to failed flushes
    dropped: Arc<AtomicU64>,
    drop_logger: DropLogger,
    stats: Option<ColumnarStats>,
}

impl ColumnarFileSink {
    /// # Errors
    /// `queue_size <= max_buffer_size` or a zero buffer
    pub fn new(name: impl Into<String>, config: ColumnarSinkConfig) -> Result<Self, DispatcherError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            tx: None,
            worker: None,
            path: None,
            dropped: Arc::new(AtomicU64::new(0)),
            drop_logger: DropLogger::new(
                "Parquet queue full, dropping samples",
                Duration::from_secs(1),
            ),
            stats: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writer totals, available after `close`
    pub fn stats(&self) -> Option<&ColumnarStats> {
        self.stats.as_ref()
    }

    fn open(&self) -> Result<(PathBuf, ArrowWriter<File>), ContractError> {
        let open_err = |e: &dyn std::fmt::Display| ContractError::sink_open(&self.name, e.to_string());

        fs::create_dir_all(&self.config.directory).map_err(|e| open_err(&e))?;
        let file_name = format!(
            "{}_{}.parquet",
            self.config.file_prefix,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.config.directory.join(file_name);
        let file = File::create(&path).map_err(|e| open_err(&e))?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build();
        let writer = ArrowWriter::try_new(file, gaze_schema(), Some(props)).map_err(|e| open_err(&e))?;
        Ok((path, writer))
    }
}

impl SampleSink for ColumnarFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "columnar_sink_start", skip(self), fields(sink = %self.name))]
    async fn start(&mut self) -> Result<(), ContractError> {
        let (path, writer) = self.open()?;
        let (tx, rx) = mpsc::channel(self.config.queue_size);

        let worker = FlushWorker {
            name: self.name.clone(),
            writer: Some(writer),
            buffer: Vec::with_capacity(self.config.max_buffer_size),
            max_buffer_size: self.config.max_buffer_size,
            dropped: Arc::clone(&self.dropped),
            stats: ColumnarStats::default(),
            latency: RunningStats::default(),
        };
        self.worker = Some(tokio::spawn(worker.run(rx)));
        self.tx = Some(tx);

        info!(
            sink = %self.name,
            path = %path.display(),
            queue_size = self.config.queue_size,
            max_buffer_size = self.config.max_buffer_size,
            drop_when_full = self.config.drop_when_full,
            "Parquet file opened"
        );
        self.path = Some(path);
        Ok(())
    }

    async fn send(&mut self, sample: Arc<Sample>) -> Result<(), ContractError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "writer not started"))?;

        if !self.config.drop_when_full {
            return tx
                .send(StreamItem::Data(sample))
                .await
                .map_err(|_| ContractError::sink_write(&self.name, "writer stopped"));
        }

        match tx.try_send(StreamItem::Data(sample)) {
            Ok(()) => {
                observability::record_queue_depth(&self.name, self.config.queue_size - tx.capacity());
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                self.drop_logger.record(&self.name, total);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => {
                Err(ContractError::sink_write(&self.name, "writer stopped"))
            }
        }
    }

    #[instrument(name = "columnar_sink_close", skip(self), fields(sink = %self.name))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(tx) = self.tx.take() {
            // The end marker is never dropped, even under drop_when_full
            if tx.send(StreamItem::EndOfStream).await.is_err() {
                warn!(sink = %self.name, "Writer already gone at close");
            }
        }

        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let stats = worker
            .await
            .map_err(|e| ContractError::sink_write(&self.name, format!("writer task failed: {e}")))?;

        info!(
            sink = %self.name,
            rows = stats.rows_written,
            row_groups = stats.row_groups,
            dropped = self.dropped.load(Ordering::Relaxed),
            flush_latency_ms = %stats.flush_latency_ms,
            "Parquet file closed"
        );
        self.stats = Some(stats);
        Ok(())
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Background writer state
struct FlushWorker {
    name: String,
    /// `None` once a flush task was lost; later rows are counted as dropped
    writer: Option<ArrowWriter<File>>,
    buffer: Vec<Arc<Sample>>,
    max_buffer_size: usize,
    dropped: Arc<AtomicU64>,
    stats: ColumnarStats,
    latency: RunningStats,
}

impl FlushWorker {
    #[instrument(name = "columnar_flush_loop", skip(self, rx), fields(sink = %self.name))]
    async fn run(mut self, mut rx: mpsc::Receiver<SampleItem>) -> ColumnarStats {
        'outer: loop {
            match rx.recv().await {
                Some(StreamItem::Data(sample)) => self.buffer.push(sample),
                Some(StreamItem::EndOfStream) | None => break,
            }

            // Greedy drain without suspending
            while self.buffer.len() < self.max_buffer_size {
                match rx.try_recv() {
                    Ok(StreamItem::Data(sample)) => self.buffer.push(sample),
                    Ok(StreamItem::EndOfStream) => break 'outer,
                    Err(_) => break,
                }
            }

            if self.buffer.len() >= self.max_buffer_size {
                self.flush().await;
            }
        }

        self.flush().await;
        self.finish().await;
        self.stats.flush_latency_ms = StatsSummary::from(&self.latency);
        self.stats
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.max_buffer_size));
        let rows = samples.len();

        let Some(mut writer) = self.writer.take() else {
            self.dropped.fetch_add(rows as u64, Ordering::Relaxed);
            return;
        };

        let begin = Instant::now();
        let name = self.name.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = write_row_group(&mut writer, &samples, &name);
            (writer, result)
        })
        .await;

        match joined {
            Ok((writer, Ok(()))) => {
                let latency_ms = begin.elapsed().as_secs_f64() * 1000.0;
                self.writer = Some(writer);
                self.stats.rows_written += rows as u64;
                self.stats.row_groups += 1;
                self.latency.push(latency_ms);
                observability::record_flush(rows, latency_ms);
                debug!(sink = %self.name, rows, latency_ms, "Row group flushed");
            }
            Ok((writer, Err(e))) => {
                self.writer = Some(writer);
                self.dropped.fetch_add(rows as u64, Ordering::Relaxed);
                error!(sink = %self.name, rows, error = %e, "Flush failed, rows dropped");
            }
            Err(e) => {
                self.dropped.fetch_add(rows as u64, Ordering::Relaxed);
                error!(sink = %self.name, rows, error = %e, "Flush task failed, writer lost");
            }
        }
    }

    async fn finish(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || writer.close()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(sink = %self.name, error = %e, "Failed to finalize Parquet file"),
            Err(e) => error!(sink = %self.name, error = %e, "Finalize task failed"),
        }
    }
}

fn write_row_group(
    writer: &mut ArrowWriter<File>,
    samples: &[Arc<Sample>],
    name: &str,
) -> Result<(), ContractError> {
    let batch = build_batch(samples).map_err(|e| ContractError::sink_write(name, e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| ContractError::sink_write(name, e.to_string()))?;
    // one row group per flush
    writer
        .flush()
        .map_err(|e| ContractError::sink_write(name, e.to_string()))
}

fn list_of_f32() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Float32, true)))
}

/// Fixed file schema; only the timestamps are non-nullable
pub fn gaze_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("mid_x_px", DataType::Int32, true),
        Field::new("mid_y_px", DataType::Int32, true),
        Field::new("mid_x", DataType::Float32, true),
        Field::new("mid_y", DataType::Float32, true),
        Field::new("device_time_stamp", DataType::Int64, false),
        Field::new("system_time_stamp", DataType::Int64, false),
        Field::new("left_gaze_point_x", DataType::Float32, true),
        Field::new("left_gaze_point_y", DataType::Float32, true),
        Field::new("right_gaze_point_x", DataType::Float32, true),
        Field::new("right_gaze_point_y", DataType::Float32, true),
        Field::new("left_pupil_diameter", DataType::Float32, true),
        Field::new("right_pupil_diameter", DataType::Float32, true),
        Field::new("left_gaze_point_3d", list_of_f32(), true),
        Field::new("right_gaze_point_3d", list_of_f32(), true),
        Field::new("left_gaze_origin_3d", list_of_f32(), true),
        Field::new("right_gaze_origin_3d", list_of_f32(), true),
    ]))
}

fn build_batch(samples: &[Arc<Sample>]) -> Result<RecordBatch, arrow_schema::ArrowError> {
    let f32_column = |get: fn(&Sample) -> Option<f32>| -> ArrayRef {
        Arc::new(samples.iter().map(|s| get(s)).collect::<Float32Array>())
    };
    let i32_column = |get: fn(&Sample) -> Option<i32>| -> ArrayRef {
        Arc::new(samples.iter().map(|s| get(s)).collect::<Int32Array>())
    };
    let triple_column = |get: fn(&Sample) -> Option<[f32; 3]>| -> ArrayRef {
        Arc::new(ListArray::from_iter_primitive::<Float32Type, _, _>(
            samples.iter().map(|s| get(s).map(|triple| triple.map(Some))),
        ))
    };

    let timestamps = TimestampMillisecondArray::from_iter_values(
        samples.iter().map(|s| s.epoch_timestamp_ms),
    )
    .with_timezone("UTC");

    let columns: Vec<ArrayRef> = vec![
        Arc::new(timestamps),
        i32_column(|s| s.mid_x_px),
        i32_column(|s| s.mid_y_px),
        f32_column(|s| s.mid_x),
        f32_column(|s| s.mid_y),
        Arc::new(Int64Array::from_iter_values(samples.iter().map(|s| s.device_timestamp_us))),
        Arc::new(Int64Array::from_iter_values(samples.iter().map(|s| s.system_timestamp_us))),
        f32_column(|s| s.left.gaze_x),
        f32_column(|s| s.left.gaze_y),
        f32_column(|s| s.right.gaze_x),
        f32_column(|s| s.right.gaze_y),
        f32_column(|s| s.left.pupil_mm),
        f32_column(|s| s.right.pupil_mm),
        triple_column(|s| s.left.gaze_point_3d),
        triple_column(|s| s.right.gaze_point_3d),
        triple_column(|s| s.left.origin_3d),
        triple_column(|s| s.right.origin_3d),
    ];

    RecordBatch::try_new(gaze_schema(), columns)
}
