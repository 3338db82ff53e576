use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;

/// One scalar sample in `scalars.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub step: usize,
    pub value: f64,
}

/// Appends scalar series (losses, learning rate) to the experiment's metrics
/// directory as JSON lines, for an external viewer to plot.
pub struct ScalarWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl ScalarWriter {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    /// Create the metrics directory and open its scalar file for appending.
    pub fn create(dir: &Path) -> Result<Self, ExperimentError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(ScalarWriter {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<(), ExperimentError> {
        let event = ScalarEvent {
            tag: tag.to_string(),
            step,
            value,
        };
        serde_json::to_writer(&mut self.out, &event)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ExperimentError> {
        self.out.flush()?;
        Ok(())
    }

    /// Read back every event of a scalar file.
    pub fn read_events(path: &Path) -> Result<Vec<ScalarEvent>, ExperimentError> {
        let content = fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).map_err(ExperimentError::from))
            .collect()
    }
}

impl Drop for ScalarWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}
