use std::fs;
use std::path::Path;
use tracing::warn;

/// Every numeric stat field the exporter knows how to collect, for both the
/// server-wide `stats` command and per-tube `stats-tube` replies. Fields a
/// beanstalkd reply carries beyond this set are dropped.
pub const ALL_FIELDS: &[&str] = &[
    "current-jobs-urgent",
    "current-jobs-ready",
    "current-jobs-reserved",
    "current-jobs-delayed",
    "current-jobs-buried",
    "total-jobs",
    "current-using",
    "current-waiting",
    "current-watching",
    "pause",
    "cmd-delete",
    "cmd-pause-tube",
    "pause-time-left",
];

/// The set of stat fields retained during a collection pass. Fixed at
/// startup; never reloaded.
#[derive(Debug, Clone)]
pub struct StatFilter {
    fields: Vec<String>,
}

impl StatFilter {
    /// Filter retaining the full field catalog.
    pub fn all() -> Self {
        Self {
            fields: ALL_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Build a filter from an optional newline-separated field list. A
    /// missing path or unreadable file falls back to the full catalog;
    /// the process never fails over the field config.
    pub fn from_file(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::all();
        };

        match fs::read_to_string(path) {
            Ok(content) => {
                let mut fields: Vec<String> = content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                // A duplicated line would double-register its metric.
                let mut seen = std::collections::HashSet::new();
                fields.retain(|f| seen.insert(f.clone()));
                if fields.is_empty() {
                    warn!(
                        "Field config {} lists no fields, defaulting to all fields",
                        path.display()
                    );
                    Self::all()
                } else {
                    Self { fields }
                }
            }
            Err(e) => {
                warn!(
                    "Error loading field config {}, defaulting to all fields: {}",
                    path.display(),
                    e
                );
                Self::all()
            }
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Retained field names, in catalog (or file) order.
    pub fn retained(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_no_config_retains_all_fields() {
        let filter = StatFilter::from_file(None);
        assert_eq!(filter.len(), ALL_FIELDS.len());
        assert!(filter.contains("current-jobs-ready"));
        assert!(filter.contains("pause-time-left"));
    }

    #[test]
    fn test_file_narrows_fields() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"total-jobs\ncurrent-jobs-ready\n").unwrap();

        let filter = StatFilter::from_file(Some(temp_file.path()));
        assert_eq!(filter.len(), 2);
        assert!(filter.contains("total-jobs"));
        assert!(filter.contains("current-jobs-ready"));
        assert!(!filter.contains("current-jobs-buried"));
    }

    #[test]
    fn test_blank_lines_and_whitespace_ignored() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"\n  total-jobs  \n\n current-using\n\n")
            .unwrap();

        let filter = StatFilter::from_file(Some(temp_file.path()));
        assert_eq!(filter.len(), 2);
        assert!(filter.contains("total-jobs"));
        assert!(filter.contains("current-using"));
    }

    #[test]
    fn test_duplicate_lines_collapse() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"total-jobs\ncurrent-using\ntotal-jobs\n")
            .unwrap();

        let filter = StatFilter::from_file(Some(temp_file.path()));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_unreadable_file_falls_back_to_all() {
        let filter = StatFilter::from_file(Some(Path::new("/nonexistent/fields.cfg")));
        assert_eq!(filter.len(), ALL_FIELDS.len());
    }

    #[test]
    fn test_empty_file_falls_back_to_all() {
        let temp_file = NamedTempFile::new().unwrap();
        let filter = StatFilter::from_file(Some(temp_file.path()));
        assert_eq!(filter.len(), ALL_FIELDS.len());
    }
}
