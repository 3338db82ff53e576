use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ExperimentError;
use crate::experiment::ExperimentPaths;

/// Delimiter written after every record block.
pub const SEPARATOR: &str = "\n----------------------------------------------\n\n";

/// Number of leading characters used to locate the line a [`ExperimentLog::replace`]
/// call overwrites.
///
/// Two different records sharing their first 15 characters collide: the first
/// one in the file is overwritten. Prefer [`ExperimentLog::replace_tagged`].
pub const PREFIX_LEN: usize = 15;

const SEPARATOR_LINE: &str = "----------------------------------------------";

/// Plain-text report of one experiment (`Exp_data/Test Report_<id>.txt`).
#[derive(Debug, Clone)]
pub struct ExperimentLog {
    path: PathBuf,
}

impl ExperimentLog {
    pub fn new(paths: &ExperimentPaths) -> Self {
        ExperimentLog {
            path: paths.log_file(),
        }
    }

    /// Log backed by an arbitrary file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        ExperimentLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Append `lines` to the report.
    ///
    /// Without `continuing` every line is followed by [`SEPARATOR`]; with it
    /// the lines form one block and a single separator closes the block.
    pub fn append<S: AsRef<str>>(&self, lines: &[S], continuing: bool) -> Result<(), ExperimentError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buf = String::new();
        for line in lines {
            buf.push_str(line.as_ref());
            buf.push('\n');
            if !continuing {
                buf.push_str(SEPARATOR);
            }
        }
        if continuing {
            buf.push_str(SEPARATOR);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        Ok(())
    }

    /// Append one line followed by a separator.
    pub fn append_line(&self, line: &str) -> Result<(), ExperimentError> {
        self.append(&[line], false)
    }

    /// Overwrite the first line sharing the leading [`PREFIX_LEN`] characters
    /// of `new_line`.
    pub fn replace(&self, new_line: &str) -> Result<(), ExperimentError> {
        let prefix: String = new_line.chars().take(PREFIX_LEN).collect();
        self.replace_matching(&prefix, new_line)
    }

    /// Append a `<tag>: <value>` record.
    pub fn append_tagged(
        &self,
        tag: &str,
        value: impl std::fmt::Display,
        continuing: bool,
    ) -> Result<(), ExperimentError> {
        self.append(&[tagged(tag, value)], continuing)
    }

    /// Overwrite the `<tag>: ...` record, matching the tag exactly.
    pub fn replace_tagged(
        &self,
        tag: &str,
        value: impl std::fmt::Display,
    ) -> Result<(), ExperimentError> {
        self.replace_matching(&format!("{tag}: "), &tagged(tag, value))
    }

    /// Value of the `<tag>: ...` record, if present.
    pub fn tagged_value(&self, tag: &str) -> Result<Option<String>, ExperimentError> {
        let key = format!("{tag}: ");
        let content = self.read()?;
        Ok(content
            .lines()
            .find_map(|line| line.strip_prefix(key.as_str()))
            .map(str::to_string))
    }

    /// Full report content.
    pub fn read(&self) -> Result<String, ExperimentError> {
        if !self.exists() {
            return Err(ExperimentError::LogNotFound(self.path.clone()));
        }
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Record lines of the report, skipping separators and blank lines.
    pub fn records(&self) -> Result<Vec<String>, ExperimentError> {
        let content = self.read()?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty() && *line != SEPARATOR_LINE)
            .map(str::to_string)
            .collect())
    }

    fn replace_matching(&self, prefix: &str, new_line: &str) -> Result<(), ExperimentError> {
        let content = self.read()?;

        let mut replaced = false;
        let mut out = String::with_capacity(content.len() + new_line.len());
        for line in content.split_inclusive('\n') {
            let body = line.strip_suffix('\n').unwrap_or(line);
            if !replaced && body.starts_with(prefix) {
                out.push_str(new_line);
                if line.ends_with('\n') {
                    out.push('\n');
                }
                replaced = true;
            } else {
                out.push_str(line);
            }
        }

        if !replaced {
            return Err(ExperimentError::RecordNotFound {
                path: self.path.clone(),
                prefix: prefix.to_string(),
            });
        }

        fs::write(&self.path, out)?;
        Ok(())
    }
}

fn tagged(tag: &str, value: impl std::fmt::Display) -> String {
    format!("{tag}: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log() -> (tempfile::TempDir, ExperimentLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = ExperimentLog::at(dir.path().join("Exp_data").join("Test Report_1.txt"));
        (dir, log)
    }

    #[test]
    fn test_append_creates_parent_dirs() {
        let (_dir, log) = temp_log();
        assert!(!log.exists());
        log.append_line("Trained From beginning").unwrap();
        assert!(log.exists());
    }

    #[test]
    fn test_append_separates_each_line() {
        let (_dir, log) = temp_log();
        log.append(&["a", "b"], false).unwrap();
        assert_eq!(log.read().unwrap(), format!("a\n{SEPARATOR}b\n{SEPARATOR}"));
    }

    #[test]
    fn test_append_continuing_block() {
        let (_dir, log) = temp_log();
        log.append(&["a", "b"], true).unwrap();
        assert_eq!(log.read().unwrap(), format!("a\nb\n{SEPARATOR}"));
    }

    #[test]
    fn test_replace_by_prefix() {
        let (_dir, log) = temp_log();
        log.append_line("Minimum Valid loss: 0.8").unwrap();
        log.append_line("Testing loss: 0.3").unwrap();
        log.replace("Minimum Valid loss: 0.5").unwrap();

        let records = log.records().unwrap();
        assert_eq!(records, vec!["Minimum Valid loss: 0.5", "Testing loss: 0.3"]);
    }

    #[test]
    fn test_replace_only_first_match() {
        let (_dir, log) = temp_log();
        log.append(&["Minimum Valid loss: 0.8", "Minimum Valid loss: 0.9"], true)
            .unwrap();
        log.replace("Minimum Valid loss: 0.1").unwrap();
        let records = log.records().unwrap();
        assert_eq!(records, vec!["Minimum Valid loss: 0.1", "Minimum Valid loss: 0.9"]);
    }

    #[test]
    fn test_replace_missing_prefix() {
        let (_dir, log) = temp_log();
        log.append_line("Trained From beginning").unwrap();
        let err = log.replace("Minimum Valid loss: 0.5").unwrap_err();
        assert!(matches!(err, ExperimentError::RecordNotFound { .. }));
    }

    #[test]
    fn test_replace_missing_file() {
        let (_dir, log) = temp_log();
        let err = log.replace("Minimum Valid loss: 0.5").unwrap_err();
        assert!(matches!(err, ExperimentError::LogNotFound(_)));
    }

    #[test]
    fn test_prefix_collision_hits_first_record() {
        // Both lines share "Top-1 Accuracy " so the prefix replace cannot tell
        // them apart.
        let (_dir, log) = temp_log();
        log.append(&["Top-1 Accuracy of class cat : 50", "Top-1 Accuracy of class dog : 40"], true)
            .unwrap();
        log.replace("Top-1 Accuracy of class dog : 90").unwrap();
        let records = log.records().unwrap();
        assert_eq!(records[0], "Top-1 Accuracy of class dog : 90");
        assert_eq!(records[1], "Top-1 Accuracy of class dog : 40");
    }

    #[test]
    fn test_tagged_records() {
        let (_dir, log) = temp_log();
        log.append_tagged("Minimum Valid loss", 0.8, false).unwrap();
        log.append_tagged("Minimum Valid loss (smoothed)", 0.9, false).unwrap();
        log.replace_tagged("Minimum Valid loss", 0.5).unwrap();

        assert_eq!(
            log.tagged_value("Minimum Valid loss").unwrap().as_deref(),
            Some("0.5")
        );
        assert_eq!(
            log.tagged_value("Minimum Valid loss (smoothed)").unwrap().as_deref(),
            Some("0.9")
        );
    }

    #[test]
    fn test_replace_tagged_missing() {
        let (_dir, log) = temp_log();
        log.append_line("header").unwrap();
        assert!(matches!(
            log.replace_tagged("Minimum Valid loss", 0.5),
            Err(ExperimentError::RecordNotFound { .. })
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_replace_keeps_record_count(
                values in proptest::collection::vec(0.0f64..10.0, 1..8),
                target in 0usize..8,
            ) {
                let (_dir, log) = temp_log();
                for (i, v) in values.iter().enumerate() {
                    log.append_tagged(&format!("metric {i:02}"), v, i % 2 == 0).unwrap();
                }
                let before = log.records().unwrap().len();

                let target = target % values.len();
                log.replace_tagged(&format!("metric {target:02}"), 42).unwrap();

                let records = log.records().unwrap();
                prop_assert_eq!(records.len(), before);
                let expected = format!("metric {target:02}: 42");
                prop_assert!(records.contains(&expected));
            }
        }
    }
}
