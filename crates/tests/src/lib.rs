//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置文件 → 会话 → 文件输出
//! - 模拟数据源 → Distributor → 全部 sink (含 HTTP 端点)
//! - 故障隔离：远端失败不影响本地文件

#[cfg(test)]
mod e2e_tests {
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Bundle, SessionBlueprint};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use session::{Runner, SessionManager, SimulatedSourceFactory, SourceFactory};
    use tempfile::tempdir;

    /// Device timestamps of every bundle the endpoint accepted
    type Received = Arc<Mutex<Vec<i64>>>;

    async fn accept(State(received): State<Received>, body: Bytes) -> StatusCode {
        match Bundle::decode(&body) {
            Ok(message) => {
                let mut received = received.lock().unwrap();
                received.extend(message.samples.iter().map(|s| s.device_timestamp_us));
                StatusCode::OK
            }
            Err(_) => StatusCode::BAD_REQUEST,
        }
    }

    async fn reject() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/gaze")
    }

    fn blueprint(data_dir: &Path, server_url: &str) -> SessionBlueprint {
        let mut blueprint = SessionBlueprint::default();
        blueprint.data_dir = data_dir.to_path_buf();
        blueprint.source.frequency_hz = 1000.0;
        blueprint.source.seed = Some(7);
        blueprint.source.invalid_probability = 0.1;

        let sinks = &mut blueprint.sinks;
        sinks.csv.enabled = true;
        sinks.parquet.max_buffer_size = 32;
        sinks.parquet.queue_size = 1024;
        sinks.parquet.drop_when_full = false;
        sinks.broadcast.endpoint = "tcp://127.0.0.1:0".to_string();
        sinks.remote.enabled = true;
        sinks.remote.server_url = server_url.to_string();
        sinks.remote.bundle_size = 25;
        sinks.remote.max_bundle_interval_s = 0.2;
        sinks.remote.max_concurrent_sends = 4;
        sinks.remote.retry_attempts = 2;
        sinks.remote.backoff_factor_s = 0.01;
        sinks.remote.request_timeout_s = 2.0;
        blueprint
    }

    async fn wait_for_source<F: SourceFactory>(runner: &Runner<F>) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !runner.source_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("source did not finish");
    }

    fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == extension))
            .collect()
    }

    fn csv_device_timestamps(path: &Path) -> Vec<i64> {
        let content = fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("device_time_stamp,"));
        lines
            .map(|line| line.split(',').next().unwrap().parse().unwrap())
            .collect()
    }

    fn parquet_rows(path: &Path) -> usize {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        reader.map(|batch| batch.unwrap().num_rows()).sum()
    }

    /// SimulatedSource -> Distributor -> csv, parquet, broadcast, remote
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_all_sinks_receive_every_sample() {
        let dir = tempdir().unwrap();
        let received: Received = Arc::default();
        let url = serve(
            Router::new()
                .route("/api/gaze", post(accept))
                .with_state(Arc::clone(&received)),
        )
        .await;

        let factory = SimulatedSourceFactory::new().with_max_samples(200);
        let mut runner = Runner::new(blueprint(dir.path(), &url), dir.path(), factory);
        runner.start().await.unwrap();
        wait_for_source(&runner).await;
        let report = runner.stop().await.unwrap().unwrap();

        assert_eq!(report.source.produced, 200);
        assert_eq!(report.distributed, 200);
        assert!(report.failed_sinks().is_empty());
        for name in ["csv", "parquet", "broadcast", "remote"] {
            let sink = report.sink(name).unwrap();
            assert_eq!(sink.metrics.write_count, 200, "{name}");
        }
        assert_eq!(report.sink("remote").unwrap().extra("bundles_dropped"), Some(0));

        // CSV keeps acquisition order
        let csv = files_with_extension(dir.path(), "csv");
        assert_eq!(csv.len(), 1);
        let timestamps = csv_device_timestamps(&csv[0]);
        assert_eq!(timestamps.len(), 200);
        assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]));

        let parquet = files_with_extension(dir.path(), "parquet");
        assert_eq!(parquet.len(), 1);
        assert_eq!(parquet_rows(&parquet[0]), 200);

        // bundles may land out of order, but none is lost or duplicated
        let mut remote = received.lock().unwrap().clone();
        remote.sort_unstable();
        assert_eq!(remote, timestamps);
    }

    /// A failing endpoint drops bundles without touching local files
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_remote_failure_is_isolated() {
        let dir = tempdir().unwrap();
        let url = serve(Router::new().route("/api/gaze", post(reject))).await;

        let mut blueprint = blueprint(dir.path(), &url);
        blueprint.sinks.broadcast.enabled = false;

        let factory = SimulatedSourceFactory::new().with_max_samples(100);
        let mut runner = Runner::new(blueprint, dir.path(), factory);
        runner.start().await.unwrap();
        wait_for_source(&runner).await;
        let report = runner.stop().await.unwrap().unwrap();

        let remote = report.sink("remote").unwrap();
        assert_eq!(remote.extra("bundles_sent"), Some(0));
        assert!(remote.extra("bundles_dropped").unwrap() > 0);
        // two attempts per bundle
        assert_eq!(
            remote.extra("attempts"),
            remote.extra("bundles_dropped").map(|dropped| dropped * 2)
        );

        assert_eq!(report.sink("csv").unwrap().metrics.write_count, 100);
        assert_eq!(report.sink("parquet").unwrap().metrics.write_count, 100);
        let csv = files_with_extension(dir.path(), "csv");
        assert_eq!(csv_device_timestamps(&csv[0]).len(), 100);
    }

    /// Config file -> SessionManager -> participant directory
    #[tokio::test]
    async fn test_config_file_to_participant_recording() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("recordings");
        let content = format!(
            r#"
data_dir = "{}"

[source]
frequency_hz = 500.0
seed = 1

[sinks.csv]
enabled = true
file_prefix = "session"

[sinks.parquet]
max_buffer_size = 10
queue_size = 100

[sinks.broadcast]
enabled = false
"#,
            data_dir.display()
        );
        let blueprint = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.enabled_sinks(), vec!["csv", "parquet"]);

        let mut manager =
            SessionManager::new(blueprint, SimulatedSourceFactory::new().with_max_samples(25));
        let participant_dir = manager.set_participant("P07").unwrap();
        assert_eq!(participant_dir, data_dir.join("P07"));

        manager.start_recording().await.unwrap();
        wait_for_source(manager.runner().unwrap()).await;
        let report = manager.stop_recording().await.unwrap().unwrap();
        assert!(report.is_clean());

        let csv = files_with_extension(&participant_dir, "csv");
        assert_eq!(csv.len(), 1);
        let name = csv[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("session_"), "{name}");
        assert_eq!(csv_device_timestamps(&csv[0]).len(), 25);

        let parquet = files_with_extension(&participant_dir, "parquet");
        assert_eq!(parquet_rows(&parquet[0]), 25);
    }
}
