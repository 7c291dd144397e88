//! JSON Lines dataset sink

use crate::crawler::Item;
use crate::output::traits::{ItemSink, OutputResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends one JSON object per item to a dataset file
///
/// The file is opened in append mode, so items from resumed and later runs
/// accumulate in the same dataset.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl JsonLinesSink {
    /// Opens (or creates) the dataset file at `path`
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!("Writing dataset to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Items written through this handle
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl ItemSink for JsonLinesSink {
    fn push(&mut self, items: &[Item]) -> OutputResult<()> {
        for item in items {
            serde_json::to_writer(&mut self.writer, item)?;
            self.writer.write_all(b"\n")?;
            self.written += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}
