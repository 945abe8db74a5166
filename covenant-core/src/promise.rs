//! Promise model and loading.
//!
//! A promise is an addressable policy obligation, loaded once per run from
//! `governance/promises/<id>.yaml` and immutable thereafter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decision::Severity;
use crate::{CovenantError, CovenantResult, PROMISE_DIR};

/// An addressable policy obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Promise {
    pub id: String,
    pub statement: String,
    pub version: String,
    pub domain: Option<String>,
    pub severity: Option<Severity>,
    pub credence_threshold: Option<f64>,
    /// Applicability hint; the engine derives applicability itself and flags
    /// disagreement as an anomaly rather than honoring the hint.
    pub applicable: Option<bool>,
    /// Opaque control-mapping labels for compliance overlays.
    pub controls: Vec<String>,
}

impl Default for Promise {
    fn default() -> Self {
        Promise {
            id: String::new(),
            statement: String::new(),
            version: "1".to_string(),
            domain: None,
            severity: None,
            credence_threshold: None,
            applicable: None,
            controls: Vec::new(),
        }
    }
}

pub trait PromiseLoader {
    fn load(&self, promise_id: &str) -> CovenantResult<Promise>;
}

/// Loads promises from YAML files under a base directory.
#[derive(Debug)]
pub struct YamlPromiseLoader {
    base_path: PathBuf,
}

impl YamlPromiseLoader {
    pub fn new(base_path: PathBuf) -> Self {
        YamlPromiseLoader { base_path }
    }

    /// Conventional location under an evaluated repository.
    pub fn for_repo(repo_root: &Path) -> Self {
        YamlPromiseLoader {
            base_path: repo_root.join(PROMISE_DIR),
        }
    }
}

impl PromiseLoader for YamlPromiseLoader {
    fn load(&self, promise_id: &str) -> CovenantResult<Promise> {
        let path = self.base_path.join(format!("{promise_id}.yaml"));
        let text = std::fs::read_to_string(&path)
            .map_err(|e| CovenantError::Promise(format!("{}: {e}", path.display())))?;
        let mut promise: Promise = serde_yaml::from_str(&text)
            .map_err(|e| CovenantError::Promise(format!("{}: {e}", path.display())))?;
        if promise.id.is_empty() {
            promise.id = promise_id.to_string();
        } else if promise.id != promise_id {
            return Err(CovenantError::Promise(format!(
                "promise file {} declares id {:?}, expected {:?}",
                path.display(),
                promise.id,
                promise_id
            )));
        }
        Ok(promise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_promise(dir: &Path, id: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("{id}.yaml")), body).unwrap();
    }

    #[test]
    fn test_load_promise_file() {
        let dir = TempDir::new().unwrap();
        write_promise(
            dir.path(),
            "llm-input-logging",
            r#"
id: llm-input-logging
statement: All LLM inputs are logged before the call.
version: "2"
domain: observability
severity: high
credence_threshold: 0.9
controls:
  - SOC2-CC7.2
"#,
        );
        let loader = YamlPromiseLoader::new(dir.path().to_path_buf());
        let promise = loader.load("llm-input-logging").unwrap();
        assert_eq!(promise.severity, Some(Severity::High));
        assert_eq!(promise.credence_threshold, Some(0.9));
        assert_eq!(promise.controls, vec!["SOC2-CC7.2".to_string()]);
    }

    #[test]
    fn test_missing_promise_is_promise_error() {
        let dir = TempDir::new().unwrap();
        let loader = YamlPromiseLoader::new(dir.path().to_path_buf());
        let err = loader.load("nope").unwrap_err();
        assert!(matches!(err, CovenantError::Promise(_)));
    }

    #[test]
    fn test_mismatched_id_rejected() {
        let dir = TempDir::new().unwrap();
        write_promise(dir.path(), "alpha", "id: beta\nstatement: s\n");
        let loader = YamlPromiseLoader::new(dir.path().to_path_buf());
        assert!(loader.load("alpha").is_err());
    }
}
