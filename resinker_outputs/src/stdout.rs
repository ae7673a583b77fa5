//! Standard-output sink.

use async_trait::async_trait;
use std::io::Write;

use resinker_core::spec::OutputFormat;
use resinker_core::Event;

use crate::{Sink, SinkError};

/// Writes each record to stdout, one per line for `json`.
pub struct StdoutSink {
    format: OutputFormat,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn emit(&mut self, event: &Event) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", event.render(self.format))?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        std::io::stdout().lock().flush()?;
        Ok(())
    }
}
