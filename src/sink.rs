use eyre::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::fetcher::BalanceRecord;

/// Line-delimited JSON sink for raw balance records.
///
/// Created only when an output path was requested; one record per line,
/// buffered, flushed at the end of the run and on drop.
pub struct RecordSink {
    writer: BufWriter<File>,
}

impl RecordSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| eyre::eyre!("failed to open output file {}: {}", path.display(), e))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, record: &BalanceRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for RecordSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
