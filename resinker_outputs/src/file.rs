//! File sink.
//!
//! Records are appended as NDJSON: one JSON document per line, streamable
//! and truncation-tolerant. The stream stays line-delimited even when the
//! sink is configured with `json_pretty`; pretty framing would let a
//! single record span several physical lines.

use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use resinker_core::spec::OutputFormat;
use resinker_core::Event;

use crate::{Sink, SinkError};

pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Creates the output file, along with any missing parent directories.
    pub fn create(path: impl AsRef<Path>, format: OutputFormat) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if format == OutputFormat::JsonPretty {
            warn!(
                path = %path.display(),
                "file sink writes one record per line; json_pretty framing is ignored"
            );
        }
        let file = File::create(&path)?;
        info!(path = %path.display(), "opened output file");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Path this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn emit(&mut self, event: &Event) -> Result<(), SinkError> {
        writeln!(self.writer, "{}", event.render(OutputFormat::Json))?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
