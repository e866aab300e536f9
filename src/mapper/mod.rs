pub mod parser;

use parking_lot::RwLock;
use prometheus::{IntCounterVec, Opts};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("failed to read mapping config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mapping config line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// One `pattern -> label` mapping rule.
#[derive(Debug, Clone)]
pub struct MappingRule {
    pub pattern: String,
    pub regex: Regex,
    pub label: String,
}

/// The active, immutable rule list. Replaced wholesale on reload; readers
/// hold an `Arc` so an in-flight classification keeps a consistent state
/// even while a new one is being published.
#[derive(Debug, Default)]
pub struct MapperState {
    rules: Vec<MappingRule>,
}

impl MapperState {
    pub fn load(path: &Path) -> Result<Self, MapperError> {
        let content = fs::read_to_string(path).map_err(|source| MapperError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = parser::parse_rules(&content)?;
        Ok(Self { rules })
    }

    /// First matching rule's label; tubes matching no rule keep their raw
    /// name as the label.
    pub fn classify(&self, tube: &str) -> String {
        for rule in &self.rules {
            if rule.regex.is_match(tube) {
                return rule.label.clone();
            }
        }
        tube.to_string()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Hot-reloadable tube name mapper. Classification reads the current state;
/// `reload` swaps in a freshly parsed state or, on any error, leaves the
/// active one untouched. Reload attempts are counted per result.
pub struct TubeMapper {
    state: RwLock<Arc<MapperState>>,
    reloads: IntCounterVec,
}

impl TubeMapper {
    /// Mapper with no rules: every tube classifies to its raw name.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(MapperState::default())),
            reloads: IntCounterVec::new(
                Opts::new(
                    "beanstalkd_mapping_reloads_total",
                    "Mapping config reload attempts by result.",
                ),
                &["result"],
            )
            .expect("static counter opts"),
        }
    }

    /// Mapper initialized from a mapping config file. Startup-only: a file
    /// that fails to load here is an error for the caller, unlike reload.
    pub fn from_file(path: &Path) -> Result<Self, MapperError> {
        let mapper = Self::new();
        let state = MapperState::load(path)?;
        *mapper.state.write() = Arc::new(state);
        Ok(mapper)
    }

    /// Register the reload counters with a registry.
    pub fn register(&self, registry: &prometheus::Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.reloads.clone()))
    }

    /// Classify a raw tube name into its metric label.
    pub fn classify(&self, tube: &str) -> String {
        let state = Arc::clone(&self.state.read());
        state.classify(tube)
    }

    /// Attempt to reload the mapping config. On success the active state is
    /// swapped atomically; on failure it is left unchanged. Never fails the
    /// process.
    pub fn reload(&self, path: &Path) {
        match MapperState::load(path) {
            Ok(new_state) => {
                let rules = new_state.rule_count();
                *self.state.write() = Arc::new(new_state);
                self.reloads.with_label_values(&["success"]).inc();
                info!("Mapping config reloaded successfully ({} rules)", rules);
            }
            Err(e) => {
                self.reloads.with_label_values(&["failure"]).inc();
                error!("Error reloading mapping config: {}", e);
            }
        }
    }

    pub fn rule_count(&self) -> usize {
        self.state.read().rule_count()
    }

    #[cfg(test)]
    fn reload_count(&self, result: &str) -> u64 {
        self.reloads.with_label_values(&[result]).get()
    }
}

impl Default for TubeMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_mapping(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_classify_first_match_wins() {
        let file = write_mapping("web-prod-* -> web-prod\nweb-* -> web\n");
        let mapper = TubeMapper::from_file(file.path()).unwrap();

        assert_eq!(mapper.classify("web-prod-1"), "web-prod");
        assert_eq!(mapper.classify("web-staging-1"), "web");
    }

    #[test]
    fn test_classify_unmatched_falls_back_to_raw_name() {
        let file = write_mapping("web-* -> web\n");
        let mapper = TubeMapper::from_file(file.path()).unwrap();

        assert_eq!(mapper.classify("batch-1"), "batch-1");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let file = write_mapping("web-* -> web\n");
        let mapper = TubeMapper::from_file(file.path()).unwrap();

        for _ in 0..100 {
            assert_eq!(mapper.classify("web-7"), "web");
            assert_eq!(mapper.classify("other"), "other");
        }
    }

    #[test]
    fn test_empty_mapper_classifies_to_raw_name() {
        let mapper = TubeMapper::new();
        assert_eq!(mapper.classify("anything"), "anything");
        assert_eq!(mapper.rule_count(), 0);
    }

    #[test]
    fn test_reload_swaps_state_and_counts_success() {
        let file = write_mapping("web-* -> web\n");
        let mapper = TubeMapper::from_file(file.path()).unwrap();
        assert_eq!(mapper.classify("web-1"), "web");

        let file = write_mapping("web-* -> frontend\n");
        mapper.reload(file.path());

        assert_eq!(mapper.classify("web-1"), "frontend");
        assert_eq!(mapper.reload_count("success"), 1);
        assert_eq!(mapper.reload_count("failure"), 0);
    }

    #[test]
    fn test_failed_reload_keeps_old_state_and_counts_failure() {
        let file = write_mapping("web-* -> web\n");
        let mapper = TubeMapper::from_file(file.path()).unwrap();

        let bad = write_mapping("this is not a rule\n");
        mapper.reload(bad.path());

        assert_eq!(mapper.classify("web-1"), "web");
        assert_eq!(mapper.rule_count(), 1);
        assert_eq!(mapper.reload_count("success"), 0);
        assert_eq!(mapper.reload_count("failure"), 1);
    }

    #[test]
    fn test_reload_missing_file_counts_failure() {
        let file = write_mapping("web-* -> web\n");
        let mapper = TubeMapper::from_file(file.path()).unwrap();

        mapper.reload(Path::new("/nonexistent/mapping.cfg"));

        assert_eq!(mapper.classify("web-1"), "web");
        assert_eq!(mapper.reload_count("failure"), 1);
    }

    #[test]
    fn test_reload_is_idempotent_for_identical_input() {
        let file = write_mapping("web-* -> web\n");
        let mapper = TubeMapper::from_file(file.path()).unwrap();

        mapper.reload(file.path());
        mapper.reload(file.path());

        assert_eq!(mapper.classify("web-1"), "web");
        assert_eq!(mapper.reload_count("success"), 2);
    }

    #[test]
    fn test_from_file_propagates_errors() {
        assert!(TubeMapper::from_file(Path::new("/nonexistent/mapping.cfg")).is_err());

        let bad = write_mapping("no arrow here\n");
        assert!(TubeMapper::from_file(bad.path()).is_err());
    }

    #[test]
    fn test_concurrent_classify_during_reload_sees_whole_states() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let file = write_mapping("web-* -> old\n");
        let mapper = StdArc::new(TubeMapper::from_file(file.path()).unwrap());
        let new_file = write_mapping("web-* -> new\n");

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let mapper = StdArc::clone(&mapper);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let label = mapper.classify("web-1");
                        assert!(label == "old" || label == "new", "torn state: {}", label);
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            mapper.reload(new_file.path());
        }

        for handle in readers {
            handle.join().unwrap();
        }
        assert_eq!(mapper.classify("web-1"), "new");
    }
}
