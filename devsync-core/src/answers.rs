//! Recorded copier answers (`.copier-answers.yml`).
//!
//! The file is a flat `key: value` document written by copier. Two keys
//! matter here: `_commit` (template version the repo was last synced to) and
//! `_src_path` (where the template lives).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::error::{io_err, CoreError};

/// Parsed answers, every scalar rendered as a string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CopierAnswers {
    pub path: PathBuf,
    pub entries: BTreeMap<String, String>,
}

impl CopierAnswers {
    /// Parse answers text. Non-scalar values (lists, maps) are skipped.
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Result<Self, CoreError> {
        let path = path.into();
        let raw: BTreeMap<String, Value> = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_yaml::from_str(contents).map_err(|e| CoreError::Parse {
                path: path.clone(),
                source: e,
            })?
        };

        let entries = raw
            .into_iter()
            .filter_map(|(key, value)| scalar_to_string(&value).map(|v| (key, v)))
            .collect();
        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Raw `_commit` value.
    pub fn commit(&self) -> Result<&str, CoreError> {
        self.get("_commit").ok_or_else(|| CoreError::MissingAnswer {
            path: self.path.clone(),
            key: "_commit".to_string(),
        })
    }

    /// Commit hash embedded in `_commit`.
    ///
    /// `git describe` output (`v1.2.0-4-gabc1234`) yields `abc1234`; any other
    /// value (a tag, a bare hash) is returned unchanged.
    pub fn commit_hash(&self) -> Result<String, CoreError> {
        let commit = self.commit()?;
        Ok(describe_hash(commit).unwrap_or(commit).to_string())
    }
}

/// Load answers from `<root>/<relative>`.
pub fn load_at(root: &Path, relative: &Path) -> Result<CopierAnswers, CoreError> {
    let path = root.join(relative);
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    CopierAnswers::parse(path, &contents)
}

fn describe_hash(value: &str) -> Option<&str> {
    let (_, tail) = value.rsplit_once("-g")?;
    let is_hash = tail.len() >= 4 && tail.chars().all(|c| c.is_ascii_hexdigit());
    is_hash.then_some(tail)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWERS: &str = "\
# Changes here will be overwritten by Copier; NEVER EDIT MANUALLY
_commit: 2024.05.01-12-g1a2b3c4d
_src_path: gh:softboiler/copier-pipeline
project_name: boilerdaq
python_version: '3.11'
use_docs: true
";

    #[test]
    fn parses_quoted_and_bare_scalars() {
        let answers = CopierAnswers::parse(".copier-answers.yml", ANSWERS).expect("parse");
        assert_eq!(answers.get("project_name"), Some("boilerdaq"));
        assert_eq!(answers.get("python_version"), Some("3.11"));
        assert_eq!(answers.get("use_docs"), Some("true"));
        assert_eq!(
            answers.get("_src_path"),
            Some("gh:softboiler/copier-pipeline")
        );
    }

    #[test]
    fn commit_hash_from_describe_string() {
        let answers = CopierAnswers::parse(".copier-answers.yml", ANSWERS).expect("parse");
        assert_eq!(answers.commit_hash().expect("hash"), "1a2b3c4d");
    }

    #[test]
    fn commit_hash_passes_plain_refs_through() {
        let answers =
            CopierAnswers::parse("a.yml", "_commit: 9f8e7d6c5b4a\n").expect("parse");
        assert_eq!(answers.commit_hash().expect("hash"), "9f8e7d6c5b4a");

        let tagged = CopierAnswers::parse("a.yml", "_commit: v1.0.0\n").expect("parse");
        assert_eq!(tagged.commit_hash().expect("hash"), "v1.0.0");
    }

    #[test]
    fn missing_commit_is_an_error() {
        let answers = CopierAnswers::parse("a.yml", "project_name: x\n").expect("parse");
        let err = answers.commit_hash().unwrap_err();
        assert!(matches!(err, CoreError::MissingAnswer { .. }));
        assert!(err.to_string().contains("_commit"));
    }
}
