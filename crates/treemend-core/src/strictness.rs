//! Tool strictness ladders and config synthesis.
//!
//! Each external tool gets a ladder of relaxations keyed by level. Level 0
//! is the project's own configuration; level N applies every relaxation
//! with `level <= N` on top of the existing on-disk document, so a higher
//! level is always at least as lenient as a lower one.
//!
//! Existing documents are read as JSONC (comments and trailing commas, as
//! `tsconfig.json` allows). A document that still cannot be read is left
//! alone: its ladder is skipped and reported as a diagnostic.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

use crate::domain::diagnostic::{Diagnostic, Severity};
use crate::domain::error::{Result, TreemendError};
use crate::fs_atomic::write_atomic;

/// Set `pointer` to `value` once the level is in force.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relaxation {
    pub level: u32,

    /// RFC 6901 JSON pointer, e.g. `/compilerOptions/strict`.
    pub pointer: String,

    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrictnessLadder {
    pub tool: String,

    /// Target file, relative to the root.
    pub path: PathBuf,

    /// Document used when the target does not exist yet.
    #[serde(default = "empty_object")]
    pub base: Value,

    pub relaxations: Vec<Relaxation>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl StrictnessLadder {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| TreemendError::InvalidLadder {
            tool: self.tool.clone(),
            reason,
        };

        if self.tool.trim().is_empty() {
            return Err(invalid("tool must not be empty".to_string()));
        }
        let relative = !self.path.as_os_str().is_empty()
            && self
                .path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !relative {
            return Err(invalid(format!(
                "path {} must be relative and stay under the root",
                self.path.display()
            )));
        }
        if !self.base.is_object() {
            return Err(invalid("base must be a JSON object".to_string()));
        }

        let mut pointers = HashSet::new();
        for relaxation in &self.relaxations {
            if relaxation.level == 0 {
                return Err(invalid(format!(
                    "relaxation {} has level 0",
                    relaxation.pointer
                )));
            }
            if !relaxation.pointer.starts_with('/') || relaxation.pointer.len() < 2 {
                return Err(invalid(format!(
                    "pointer {:?} must start with '/' and name a key",
                    relaxation.pointer
                )));
            }
            if !pointers.insert(relaxation.pointer.as_str()) {
                return Err(invalid(format!(
                    "pointer {} is relaxed more than once",
                    relaxation.pointer
                )));
            }
        }
        Ok(())
    }

    pub fn max_level(&self) -> u32 {
        self.relaxations.iter().map(|r| r.level).max().unwrap_or(0)
    }

    /// Relaxations in force at `level`, ordered by level then pointer.
    pub fn applied(&self, level: u32) -> Vec<&Relaxation> {
        let mut applied: Vec<_> = self
            .relaxations
            .iter()
            .filter(|r| r.level <= level)
            .collect();
        applied.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.pointer.cmp(&b.pointer)));
        applied
    }
}

/// A generated tool config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfigArtifact {
    pub tool: String,
    pub path: PathBuf,
    pub level: u32,
    pub content: Value,
}

/// Diagnostic code for a ladder skipped because its target is unusable.
pub const CODE_CONFIG_UNPARSABLE: &str = "config-unparsable";

/// Result of synthesizing one strictness level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesis {
    pub artifacts: Vec<ToolConfigArtifact>,

    /// One warning per ladder whose on-disk config could not be merged.
    pub skipped: Vec<Diagnostic>,
}

pub fn builtin_ladders() -> Vec<StrictnessLadder> {
    let relax = |level: u32, pointer: &str, value: Value| Relaxation {
        level,
        pointer: pointer.to_string(),
        value,
    };

    vec![
        StrictnessLadder {
            tool: "tsc".to_string(),
            path: PathBuf::from("tsconfig.json"),
            base: json!({
                "compilerOptions": {
                    "strict": true,
                    "noImplicitAny": true,
                    "strictNullChecks": true,
                    "noUnusedLocals": true,
                    "noUnusedParameters": true,
                    "skipLibCheck": false,
                    "noEmit": true
                }
            }),
            relaxations: vec![
                relax(1, "/compilerOptions/noUnusedLocals", json!(false)),
                relax(1, "/compilerOptions/noUnusedParameters", json!(false)),
                relax(1, "/compilerOptions/skipLibCheck", json!(true)),
                relax(2, "/compilerOptions/noImplicitAny", json!(false)),
                relax(2, "/compilerOptions/strictNullChecks", json!(false)),
                relax(3, "/compilerOptions/strict", json!(false)),
                relax(3, "/compilerOptions/checkJs", json!(false)),
            ],
        },
        StrictnessLadder {
            tool: "eslint".to_string(),
            path: PathBuf::from(".eslintrc.json"),
            base: json!({
                "root": true,
                "extends": ["next/core-web-vitals"],
                "rules": {}
            }),
            relaxations: vec![
                relax(1, "/rules/no-unused-vars", json!("warn")),
                relax(1, "/rules/@typescript-eslint~1no-unused-vars", json!("warn")),
                relax(2, "/rules/@typescript-eslint~1no-explicit-any", json!("off")),
                relax(2, "/rules/react-hooks~1exhaustive-deps", json!("off")),
                relax(3, "/rules/@typescript-eslint~1ban-ts-comment", json!("off")),
                relax(3, "/rules/prefer-const", json!("off")),
            ],
        },
    ]
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConfigSynthesizer {
    ladders: Vec<StrictnessLadder>,
}

impl ConfigSynthesizer {
    pub fn new(ladders: Vec<StrictnessLadder>) -> Result<Self> {
        let mut tools = HashSet::new();
        for ladder in &ladders {
            ladder.validate()?;
            if !tools.insert(ladder.tool.as_str()) {
                return Err(TreemendError::InvalidLadder {
                    tool: ladder.tool.clone(),
                    reason: "duplicate tool".to_string(),
                });
            }
        }
        Ok(Self { ladders })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(builtin_ladders())
    }

    pub fn ladders(&self) -> &[StrictnessLadder] {
        &self.ladders
    }

    /// Highest level any ladder defines; 0 when there is nothing to relax.
    pub fn max_level(&self) -> u32 {
        self.ladders.iter().map(|l| l.max_level()).max().unwrap_or(0)
    }

    /// `(tool, pointer)` pairs relaxed at `level`.
    pub fn relaxations_at(&self, level: u32) -> BTreeSet<(String, String)> {
        self.ladders
            .iter()
            .flat_map(|l| {
                l.applied(level)
                    .into_iter()
                    .map(move |r| (l.tool.clone(), r.pointer.clone()))
            })
            .collect()
    }

    /// Build artifacts for `level` without touching disk.
    pub fn synthesize(&self, root: &Path, level: u32) -> Result<Synthesis> {
        let mut synthesis = Synthesis::default();
        if level == 0 {
            return Ok(synthesis);
        }

        for ladder in &self.ladders {
            let applied = ladder.applied(level);
            if applied.is_empty() {
                continue;
            }
            let mut content = match load_document(&root.join(&ladder.path), &ladder.base)? {
                Existing::Document(doc) => doc,
                Existing::Unusable(reason) => {
                    warn!(
                        event = "config.skipped",
                        tool = %ladder.tool,
                        path = %ladder.path.display(),
                        reason = %reason,
                        "existing config left untouched"
                    );
                    synthesis.skipped.push(Diagnostic {
                        severity: Severity::Warning,
                        ..Diagnostic::synthetic(
                            ladder.tool.clone(),
                            CODE_CONFIG_UNPARSABLE,
                            format!("not relaxed to level {level}: {reason}"),
                        )
                        .with_file(ladder.path.display().to_string())
                    });
                    continue;
                }
            };
            for relaxation in applied {
                set_pointer(&mut content, &relaxation.pointer, relaxation.value.clone());
            }
            synthesis.artifacts.push(ToolConfigArtifact {
                tool: ladder.tool.clone(),
                path: ladder.path.clone(),
                level,
                content,
            });
        }
        Ok(synthesis)
    }

    /// Synthesize and write artifacts for `level` under `root`.
    pub fn write(&self, root: &Path, level: u32) -> Result<Synthesis> {
        let synthesis = self.synthesize(root, level)?;
        for artifact in &synthesis.artifacts {
            let mut bytes = serde_json::to_vec_pretty(&artifact.content)?;
            bytes.push(b'\n');
            write_atomic(&root.join(&artifact.path), &bytes)?;
            info!(
                event = "config.synthesized",
                tool = %artifact.tool,
                path = %artifact.path.display(),
                level,
                "wrote relaxed tool config"
            );
        }
        Ok(synthesis)
    }
}

enum Existing {
    Document(Value),
    Unusable(String),
}

fn load_document(path: &Path, base: &Value) -> Result<Existing> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Existing::Document(base.clone()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(match parse_jsonc(&raw) {
        Ok(doc) if doc.is_object() => Existing::Document(doc),
        Ok(_) => Existing::Unusable("top level is not an object".to_string()),
        Err(e) => Existing::Unusable(format!("cannot parse: {e}")),
    })
}

/// Parse JSON that may carry `//` and `/* */` comments and trailing commas.
pub fn parse_jsonc(raw: &str) -> serde_json::Result<Value> {
    serde_json::from_str(&strip_jsonc(raw))
}

/// Blank out comments and trailing commas, leaving strings intact.
fn strip_jsonc(raw: &str) -> String {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut trailing_comma: Option<usize> = None;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                trailing_comma = None;
                out.push(c);
                while let Some(s) = chars.next() {
                    out.push(s);
                    match s {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            ',' => {
                trailing_comma = Some(out.len());
                out.push(c);
            }
            '}' | ']' => {
                if let Some(idx) = trailing_comma.take() {
                    out.replace_range(idx..idx + 1, " ");
                }
                out.push(c);
            }
            _ if c.is_whitespace() => out.push(c),
            _ => {
                trailing_comma = None;
                out.push(c);
            }
        }
    }
    out
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Set `pointer` in `doc`, creating intermediate objects as needed.
pub fn set_pointer(doc: &mut Value, pointer: &str, value: Value) {
    let tokens: Vec<String> = pointer.split('/').skip(1).map(unescape).collect();
    let Some((last, parents)) = tokens.split_last() else {
        *doc = value;
        return;
    };

    let mut current = doc;
    for token in parents {
        current = child_mut(current, token);
    }

    match current {
        Value::Array(items) => match last.parse::<usize>() {
            Ok(idx) if idx < items.len() => items[idx] = value,
            _ => items.push(value),
        },
        other => {
            if !other.is_object() {
                *other = empty_object();
            }
            if let Value::Object(map) = other {
                map.insert(last.clone(), value);
            }
        }
    }
}

fn child_mut<'v>(current: &'v mut Value, token: &str) -> &'v mut Value {
    let index = match current {
        Value::Array(items) => token.parse::<usize>().ok().filter(|idx| *idx < items.len()),
        _ => None,
    };
    if index.is_none() && !current.is_object() {
        *current = empty_object();
    }
    match (current, index) {
        (Value::Array(items), Some(idx)) => &mut items[idx],
        (Value::Object(map), _) => map.entry(token.to_string()).or_insert_with(empty_object),
        (other, _) => other,
    }
}
