//! Sink fan-out.
//!
//! Each sink runs on its own worker task behind a bounded queue. Dispatch
//! awaits every queue, so the scheduler blocks on the slowest enabled sink
//! while faster sinks keep draining. A sink that keeps failing is marked
//! unhealthy and its queue is drained without further delivery attempts;
//! the run continues on the remaining sinks.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use resinker_core::Event;

use crate::Sink;

const QUEUE_CAPACITY: usize = 1024;
const UNHEALTHY_AFTER: u32 = 10;

struct SinkWorker {
    name: &'static str,
    queue: mpsc::Sender<Event>,
    handle: JoinHandle<()>,
}

/// Fan-out over a set of running sink workers.
pub struct SinkSet {
    workers: Vec<SinkWorker>,
}

impl SinkSet {
    /// Spawns one worker per sink.
    pub fn start(sinks: Vec<Box<dyn Sink>>) -> Self {
        let workers = sinks
            .into_iter()
            .map(|sink| {
                let name = sink.name();
                let (queue, receiver) = mpsc::channel(QUEUE_CAPACITY);
                let handle = tokio::spawn(run_worker(sink, receiver));
                SinkWorker {
                    name,
                    queue,
                    handle,
                }
            })
            .collect();
        Self { workers }
    }

    /// Number of running workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Delivers one event to every sink queue, awaiting capacity on each.
    pub async fn dispatch(&self, event: &Event) {
        for worker in &self.workers {
            if worker.queue.send(event.clone()).await.is_err() {
                // Worker exited early; its sink was already reported.
                warn!(sink = worker.name, "sink worker is gone, dropping event");
            }
        }
    }

    /// Closes all queues and waits for every worker to drain and flush.
    pub async fn shutdown(self) {
        let mut handles = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            drop(worker.queue);
            handles.push((worker.name, worker.handle));
        }
        for (name, handle) in handles {
            if handle.await.is_err() {
                error!(sink = name, "sink worker panicked during shutdown");
            }
        }
    }
}

async fn run_worker(mut sink: Box<dyn Sink>, mut receiver: mpsc::Receiver<Event>) {
    let mut consecutive_failures: u32 = 0;
    let mut unhealthy = false;

    while let Some(event) = receiver.recv().await {
        if unhealthy {
            continue;
        }
        match sink.emit(&event).await {
            Ok(()) => consecutive_failures = 0,
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    sink = sink.name(),
                    event_type = %event.event_type,
                    error = %e,
                    "failed to deliver record"
                );
                if consecutive_failures >= UNHEALTHY_AFTER {
                    error!(
                        sink = sink.name(),
                        failures = consecutive_failures,
                        "marking sink unhealthy, further records will be dropped"
                    );
                    unhealthy = true;
                }
            }
        }
    }

    if let Err(e) = sink.flush().await {
        warn!(sink = sink.name(), error = %e, "flush on shutdown failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileSink;
    use chrono::{TimeZone, Utc};
    use resinker_core::spec::OutputFormat;
    use serde_json::json;

    fn event(n: i64) -> Event {
        Event {
            event_type: "Tick".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            payload: json!({ "n": n }),
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.ndjson");
        let path_b = dir.path().join("b.ndjson");

        let sinks: Vec<Box<dyn Sink>> = vec![
            Box::new(FileSink::create(&path_a, OutputFormat::Json).unwrap()),
            Box::new(FileSink::create(&path_b, OutputFormat::Json).unwrap()),
        ];
        let set = SinkSet::start(sinks);
        assert_eq!(set.len(), 2);

        for n in 0..5 {
            set.dispatch(&event(n)).await;
        }
        set.shutdown().await;

        for path in [&path_a, &path_b] {
            let content = std::fs::read_to_string(path).unwrap();
            assert_eq!(content.lines().count(), 5);
        }
    }

    #[tokio::test]
    async fn test_shutdown_flushes_buffered_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flush.ndjson");

        let sinks: Vec<Box<dyn Sink>> =
            vec![Box::new(FileSink::create(&path, OutputFormat::Json).unwrap())];
        let set = SinkSet::start(sinks);
        set.dispatch(&event(1)).await;
        set.shutdown().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
