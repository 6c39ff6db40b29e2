//! SourceHandle - runs one source as a tokio task
//!
//! Guarantees exactly one `EndOfStream` after the source's last sample,
//! whether the source returns, fails or panics.

use contracts::ContractError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, Instrument};

use crate::{SampleSender, SampleSource, SourceStats};

/// Outcome of a finished source task
#[derive(Debug)]
pub struct SourceReport {
    pub name: String,
    pub stats: SourceStats,
    pub error: Option<ContractError>,
}

/// Handle to a running source
pub struct SourceHandle {
    name: String,
    stop: CancellationToken,
    out: SampleSender,
    task: Option<JoinHandle<Option<ContractError>>>,
}

impl SourceHandle {
    /// Spawn `source` writing into `out`
    #[instrument(name = "source_spawn", skip(source, out), fields(source = %source.name()))]
    pub fn spawn<S>(mut source: S, out: SampleSender) -> Self
    where
        S: SampleSource + 'static,
    {
        let name = source.name().to_string();
        let stop = CancellationToken::new();
        let token = stop.clone();
        let task_out = out.clone();
        let task_name = name.clone();

        let task = tokio::spawn(
            async move {
                info!("source started");
                let producer = task_out.clone();
                // Inner task isolates panics inside the source
                let joined = tokio::spawn(async move { source.run(producer, token).await }).await;

                let failure = match joined {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        error!(error = %e, "source failed");
                        Some(e)
                    }
                    Err(join_error) => {
                        error!(error = %join_error, "source task aborted");
                        Some(ContractError::source_failure(
                            task_name,
                            format!("source task aborted: {join_error}"),
                        ))
                    }
                };

                task_out.finish().await;
                info!(produced = task_out.stats().produced, "source finished");
                failure
            }
            .in_current_span(),
        );

        Self {
            name,
            stop,
            out,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the source to stop; it terminates the stream after its own cleanup
    pub fn stop(&self) {
        debug!(source = %self.name, "stop requested");
        self.stop.cancel();
    }

    /// Whether the source task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Await the source task; later calls return an empty report
    pub async fn join(&mut self) -> SourceReport {
        let error = match self.task.take() {
            Some(task) => match task.await {
                Ok(failure) => failure,
                Err(e) => Some(ContractError::source_failure(
                    self.name.clone(),
                    format!("source supervisor aborted: {e}"),
                )),
            },
            None => None,
        };

        SourceReport {
            name: self.name.clone(),
            stats: self.out.stats(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_channel;
    use contracts::Sample;

    /// Emits `count` samples, then optionally fails or panics
    struct ScriptedSource {
        count: i64,
        ending: Ending,
    }

    enum Ending {
        Clean,
        Fail,
        Panic,
        WaitForStop,
    }

    impl SampleSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(
            &mut self,
            out: SampleSender,
            stop: CancellationToken,
        ) -> Result<(), ContractError> {
            for i in 0..self.count {
                out.send(Sample::new(0, i, i)).await?;
            }
            match self.ending {
                Ending::Clean => Ok(()),
                Ending::Fail => Err(ContractError::source_failure("scripted", "device lost")),
                Ending::Panic => panic!("driver crashed"),
                Ending::WaitForStop => {
                    stop.cancelled().await;
                    Ok(())
                }
            }
        }
    }

    async fn drain(rx: crate::SampleReceiver) -> (Vec<i64>, usize) {
        let mut data = Vec::new();
        let mut ends = 0;
        while let Ok(item) = rx.recv().await {
            match item {
                contracts::StreamItem::Data(sample) => data.push(sample.device_timestamp_us),
                contracts::StreamItem::EndOfStream => ends += 1,
            }
        }
        (data, ends)
    }

    #[tokio::test]
    async fn test_clean_exit_terminates_once() {
        let (tx, rx) = source_channel("scripted", 16);
        let mut handle = SourceHandle::spawn(
            ScriptedSource {
                count: 5,
                ending: Ending::Clean,
            },
            tx,
        );

        let report = handle.join().await;
        assert!(report.error.is_none());
        assert_eq!(report.stats.produced, 5);
        assert_eq!(drain(rx).await, (vec![0, 1, 2, 3, 4], 1));
    }

    #[tokio::test]
    async fn test_failure_still_terminates_once() {
        let (tx, rx) = source_channel("scripted", 16);
        let mut handle = SourceHandle::spawn(
            ScriptedSource {
                count: 2,
                ending: Ending::Fail,
            },
            tx,
        );

        let report = handle.join().await;
        assert!(report.error.is_some());
        assert_eq!(drain(rx).await, (vec![0, 1], 1));
    }

    #[tokio::test]
    async fn test_panic_still_terminates_once() {
        let (tx, rx) = source_channel("scripted", 16);
        let mut handle = SourceHandle::spawn(
            ScriptedSource {
                count: 3,
                ending: Ending::Panic,
            },
            tx,
        );

        let report = handle.join().await;
        assert!(matches!(report.error, Some(ContractError::Source { .. })));
        assert_eq!(drain(rx).await, (vec![0, 1, 2], 1));
    }

    #[tokio::test]
    async fn test_stop_then_join_is_idempotent() {
        let (tx, rx) = source_channel("scripted", 16);
        let mut handle = SourceHandle::spawn(
            ScriptedSource {
                count: 1,
                ending: Ending::WaitForStop,
            },
            tx,
        );

        handle.stop();
        assert!(handle.join().await.error.is_none());
        assert!(handle.is_finished());
        // second join has nothing left to await
        assert!(handle.join().await.error.is_none());
        assert_eq!(drain(rx).await, (vec![0], 1));
    }
}
