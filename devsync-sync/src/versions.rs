//! Version registry sync.
//!
//! Pinned tool versions are duplicated across textual config files (workflow
//! YAML, `pyproject.toml`, install scripts). The update bot's regex rules in
//! `renovate.json` already describe where every copy lives, so they double as
//! the locator here:
//!
//! ```text
//! renovate.json ─ load_rules ─▶ [RegexRule] ─ find_occurrences ─▶ [Occurrence]
//!                                                  │
//!                          plan_bump(tool, target) ▼
//!                                            BumpPlan ─ apply ─▶ files / diffs
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diff::{unified_diff, FileDiff};
use crate::error::{io_err, json_err, SyncError};
use crate::writer::{write_file, WriteResult};

/// Directories never searched for occurrences.
const SKIP_DIRS: &[&str] = &[".git", ".venv", "target", "node_modules"];

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One regex manager from the update-bot config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegexRule {
    /// Path patterns (regexes against the `/`-separated repo-relative path).
    pub file_match: Vec<String>,
    /// Content patterns with `currentValue` and optionally `depName` groups.
    pub match_strings: Vec<String>,
    pub dep_name_template: Option<String>,
}

impl RegexRule {
    /// The tool this rule always names, when its template has no placeholders.
    pub fn static_dep_name(&self) -> Option<&str> {
        self.dep_name_template
            .as_deref()
            .filter(|t| !t.contains("{{"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenovateConfig {
    #[serde(default)]
    custom_managers: Vec<RawManager>,
    #[serde(default)]
    regex_managers: Vec<RawManager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManager {
    #[serde(default)]
    custom_type: Option<String>,
    #[serde(default)]
    file_match: Vec<String>,
    #[serde(default)]
    manager_file_patterns: Vec<String>,
    #[serde(default)]
    match_strings: Vec<String>,
    #[serde(default)]
    dep_name_template: Option<String>,
}

/// Parse the regex managers out of `<root>/<renovate>`.
///
/// A missing file yields no rules. Both `customManagers` and the legacy
/// `regexManagers` key are read; non-regex custom managers are ignored.
pub fn load_rules(root: &Path, renovate: &Path) -> Result<Vec<RegexRule>, SyncError> {
    let path = root.join(renovate);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("no update-bot config at {}", path.display());
            return Ok(Vec::new());
        }
        Err(err) => return Err(io_err(&path, err)),
    };
    let config: RenovateConfig = serde_json::from_str(&text).map_err(|e| json_err(&path, e))?;

    let rules = config
        .custom_managers
        .into_iter()
        .chain(config.regex_managers)
        .filter(|m| m.custom_type.as_deref().map_or(true, |t| t == "regex"))
        .map(|m| {
            let mut file_match = m.file_match;
            file_match.extend(m.manager_file_patterns.iter().map(|p| file_pattern_to_regex(p)));
            RegexRule {
                file_match,
                match_strings: m.match_strings,
                dep_name_template: m.dep_name_template,
            }
        })
        .collect();
    Ok(rules)
}

/// `/regex/` patterns lose their slashes; anything else is a glob.
fn file_pattern_to_regex(pattern: &str) -> String {
    if let Some(inner) = pattern
        .strip_prefix('/')
        .and_then(|p| p.strip_suffix('/'))
        .filter(|p| !p.is_empty())
    {
        return inner.to_string();
    }
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

struct CompiledRule<'a> {
    rule: &'a RegexRule,
    files: Vec<Regex>,
    patterns: Vec<Regex>,
}

fn compile(pattern: &str) -> Result<Regex, SyncError> {
    Regex::new(pattern).map_err(|source| SyncError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_rules(rules: &[RegexRule]) -> Result<Vec<CompiledRule<'_>>, SyncError> {
    rules
        .iter()
        .map(|rule| {
            Ok(CompiledRule {
                rule,
                files: rule.file_match.iter().map(|p| compile(p)).collect::<Result<_, _>>()?,
                patterns: rule
                    .match_strings
                    .iter()
                    .map(|p| compile(p))
                    .collect::<Result<_, _>>()?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Occurrences
// ---------------------------------------------------------------------------

/// One located copy of a pinned version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Occurrence {
    pub tool: String,
    /// Repo-relative path.
    pub path: PathBuf,
    /// 1-based line of the version value.
    pub line: usize,
    pub value: String,
    pub start: usize,
    pub end: usize,
    /// Index of the rule that found it.
    #[serde(skip)]
    pub rule: usize,
    /// Index of the rule's match string that found it.
    #[serde(skip)]
    pub pattern: usize,
}

/// Apply every rule to every matching file under `root`.
///
/// Overlapping matches from several rules are reported once, the longest
/// match at a position winning. Results are ordered by path, then position.
pub fn find_occurrences(root: &Path, rules: &[RegexRule]) -> Result<Vec<Occurrence>, SyncError> {
    Ok(scan(root, rules)?.occurrences)
}

/// Occurrences plus every `(rule, match string)` pair that hit at least once.
struct Scan {
    occurrences: Vec<Occurrence>,
    hits: BTreeSet<(usize, usize)>,
}

fn scan(root: &Path, rules: &[RegexRule]) -> Result<Scan, SyncError> {
    let compiled = compile_rules(rules)?;
    let mut found: Vec<Occurrence> = Vec::new();
    let mut hits = BTreeSet::new();

    for relative in walk_files(root)? {
        let shown = relative.to_string_lossy().replace('\\', "/");
        let applicable: Vec<(usize, &CompiledRule<'_>)> = compiled
            .iter()
            .enumerate()
            .filter(|(_, c)| c.files.iter().any(|re| re.is_match(&shown)))
            .collect();
        if applicable.is_empty() {
            continue;
        }

        let path = root.join(&relative);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                tracing::debug!("skipping non-UTF-8 file {}", path.display());
                continue;
            }
            Err(err) => return Err(io_err(&path, err)),
        };

        for (index, compiled_rule) in applicable {
            for (pattern_index, pattern) in compiled_rule.patterns.iter().enumerate() {
                for caps in pattern.captures_iter(&content) {
                    let Some(value) = caps.name("currentValue") else {
                        continue;
                    };
                    let Some(tool) = dep_name(compiled_rule.rule, &caps) else {
                        continue;
                    };
                    hits.insert((index, pattern_index));
                    found.push(Occurrence {
                        tool,
                        path: relative.clone(),
                        line: content[..value.start()].matches('\n').count() + 1,
                        value: value.as_str().to_string(),
                        start: value.start(),
                        end: value.end(),
                        rule: index,
                        pattern: pattern_index,
                    });
                }
            }
        }
    }

    Ok(Scan {
        occurrences: without_overlaps(found),
        hits,
    })
}

/// Keep one occurrence per byte range; a range overlapping a kept one is dropped.
fn without_overlaps(mut found: Vec<Occurrence>) -> Vec<Occurrence> {
    found.sort_by(|a, b| {
        (&a.path, a.start, std::cmp::Reverse(a.end), a.rule, a.pattern).cmp(&(
            &b.path,
            b.start,
            std::cmp::Reverse(b.end),
            b.rule,
            b.pattern,
        ))
    });
    let mut kept: Vec<Occurrence> = Vec::with_capacity(found.len());
    for occ in found {
        if let Some(last) = kept.last() {
            if last.path == occ.path && occ.start < last.end {
                tracing::debug!(
                    "{}:{} overlaps an earlier match; ignoring",
                    occ.path.display(),
                    occ.line
                );
                continue;
            }
        }
        kept.push(occ);
    }
    kept
}

/// Resolve the dependency name: template (with `{{group}}` placeholders
/// filled from captures) or the `depName` group.
fn dep_name(rule: &RegexRule, caps: &regex::Captures<'_>) -> Option<String> {
    match &rule.dep_name_template {
        Some(template) => {
            let mut name = template.clone();
            while let Some(open) = name.find("{{") {
                let Some(close) = name[open..].find("}}") else {
                    break;
                };
                let close = open + close;
                let mut end = close + 2;
                if name[end..].starts_with('}') {
                    end += 1;
                }
                let group = name[open..close].trim_start_matches('{').trim();
                let value = caps.name(group).map_or("", |m| m.as_str()).to_string();
                name.replace_range(open..end, &value);
            }
            (!name.is_empty()).then_some(name)
        }
        None => caps.name("depName").map(|m| m.as_str().to_string()),
    }
}

/// Every regular file under `root`, repo-relative, sorted.
fn walk_files(root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(dir) = pending.pop() {
        let abs = root.join(&dir);
        let entries = std::fs::read_dir(&abs).map_err(|e| io_err(&abs, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&abs, e))?;
            let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            let name = entry.file_name();
            let relative = dir.join(&name);
            if file_type.is_dir() {
                if !SKIP_DIRS.iter().any(|skip| name == *skip) {
                    pending.push(relative);
                }
            } else if file_type.is_file() {
                files.push(relative);
            }
        }
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Bump
// ---------------------------------------------------------------------------

/// New contents for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Repo-relative path.
    pub path: PathBuf,
    pub before: String,
    pub after: String,
    pub replaced: usize,
}

/// Every edit needed to move `tool` to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpPlan {
    pub tool: String,
    pub target: String,
    /// Occurrences found, including those already at the target.
    pub occurrences: usize,
    pub changes: Vec<FileChange>,
}

impl BumpPlan {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compute patched contents for every occurrence of `tool`.
///
/// Halts with [`SyncError::ConfigDrift`] when a rule that always names
/// `tool` matches nothing, and [`SyncError::UnknownTool`] when no rule
/// names it at all.
pub fn plan_bump(
    root: &Path,
    rules: &[RegexRule],
    tool: &str,
    target: &str,
) -> Result<BumpPlan, SyncError> {
    let Scan { occurrences, hits } = scan(root, rules)?;
    let mine: Vec<&Occurrence> = occurrences.iter().filter(|o| o.tool == tool).collect();

    for (index, rule) in rules.iter().enumerate() {
        if rule.static_dep_name() != Some(tool) {
            continue;
        }
        for (pattern_index, pattern) in rule.match_strings.iter().enumerate() {
            if !hits.contains(&(index, pattern_index)) {
                return Err(SyncError::ConfigDrift {
                    tool: tool.to_string(),
                    pattern: pattern.clone(),
                });
            }
        }
    }
    if mine.is_empty() {
        return Err(SyncError::UnknownTool {
            tool: tool.to_string(),
        });
    }

    let mut by_file: BTreeMap<&Path, Vec<&Occurrence>> = BTreeMap::new();
    for occ in &mine {
        if occ.value != target {
            by_file.entry(occ.path.as_path()).or_default().push(*occ);
        }
    }

    let mut changes = Vec::new();
    for (relative, mut occs) in by_file {
        let path = root.join(relative);
        let before = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let mut after = before.clone();
        occs.sort_by_key(|o| std::cmp::Reverse(o.start));
        for occ in &occs {
            after.replace_range(occ.start..occ.end, target);
        }
        changes.push(FileChange {
            path: relative.to_path_buf(),
            before,
            after,
            replaced: occs.len(),
        });
    }

    tracing::debug!(
        "bump {tool} -> {target}: {} occurrence(s), {} file(s) to change",
        mine.len(),
        changes.len()
    );
    Ok(BumpPlan {
        tool: tool.to_string(),
        target: target.to_string(),
        occurrences: mine.len(),
        changes,
    })
}

/// What [`apply`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub writes: Vec<WriteResult>,
    /// Filled in dry-run mode only.
    pub diffs: Vec<FileDiff>,
}

/// Write the plan's files atomically, or diff them in dry-run mode.
pub fn apply(root: &Path, plan: &BumpPlan, dry_run: bool) -> Result<ApplyOutcome, SyncError> {
    let mut outcome = ApplyOutcome::default();
    for change in &plan.changes {
        let path = root.join(&change.path);
        if dry_run {
            outcome
                .diffs
                .extend(unified_diff(root, &path, &change.before, &change.after));
        }
        outcome.writes.push(write_file(&path, &change.after, dry_run)?);
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

/// Every value seen for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolVersions {
    pub tool: String,
    /// Value from `devsync.yaml`, if pinned there.
    pub pinned: Option<String>,
    pub values: BTreeSet<String>,
    pub locations: Vec<String>,
}

impl ToolVersions {
    /// All copies agree with each other and with the pin.
    pub fn consistent(&self) -> bool {
        match &self.pinned {
            Some(pin) => self.values.iter().all(|v| v == pin),
            None => self.values.len() <= 1,
        }
    }
}

/// Group occurrences by tool, alongside the `devsync.yaml` pins.
pub fn summarize(occurrences: &[Occurrence], pinned: &BTreeMap<String, String>) -> Vec<ToolVersions> {
    let mut tools: BTreeMap<&str, ToolVersions> = BTreeMap::new();
    for (tool, version) in pinned {
        tools.insert(
            tool,
            ToolVersions {
                tool: tool.clone(),
                pinned: Some(version.clone()),
                values: BTreeSet::new(),
                locations: Vec::new(),
            },
        );
    }
    for occ in occurrences {
        let entry = tools.entry(&occ.tool).or_insert_with(|| ToolVersions {
            tool: occ.tool.clone(),
            pinned: None,
            values: BTreeSet::new(),
            locations: Vec::new(),
        });
        entry.values.insert(occ.value.clone());
        entry.locations.push(format!(
            "{}:{}",
            occ.path.to_string_lossy().replace('\\', "/"),
            occ.line
        ));
    }
    tools.into_values().collect()
}

/// Tools whose copies disagree with each other or with the pin.
pub fn check(occurrences: &[Occurrence], pinned: &BTreeMap<String, String>) -> Vec<ToolVersions> {
    summarize(occurrences, pinned)
        .into_iter()
        .filter(|t| !t.consistent())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
