// Language registry: toolchain profile per supported language
use crate::error::{ExecuteError, RegistryError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// How the source file is named inside the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FilenameRule {
    /// Always `<stem>.<extension>`
    Fixed { stem: String },
    /// Named after the first declared public type, e.g. `public class Solution`
    /// becomes `Solution.java`. Falls back to `default_stem` when none is declared.
    PublicType { default_stem: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Canonical key; also selects the sandbox entrypoint `execute-<name>.sh`
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub extension: String,
    pub filename: FilenameRule,
    /// Compile command template, `{file}` and `{stem}` are substituted
    #[serde(default)]
    pub compile: Option<String>,
    pub run: String,
    pub timeout_secs: u64,
    /// Stderr substrings that identify compiler diagnostics
    #[serde(default)]
    pub compile_markers: Vec<String>,
}

/// Top-level public type declaration. Only applied to `top_level_text`, so
/// nested types never match.
fn public_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\bpublic\s+(?:(?:final|abstract|sealed|non-sealed|strictfp)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("public type pattern is valid")
    })
}

/// Source text at brace depth 0 with comments and string/char literals removed
fn top_level_text(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                out.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            '"' | '\'' => {
                let mut escaped = false;
                for next in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c {
                        break;
                    }
                }
                out.push(' ');
            }
            '{' => {
                depth += 1;
                out.push(' ');
            }
            '}' => {
                depth = depth.saturating_sub(1);
                out.push(' ');
            }
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

impl LanguageProfile {
    /// File stem the source must be saved under
    pub fn source_stem(&self, source_code: &str) -> String {
        match &self.filename {
            FilenameRule::Fixed { stem } => stem.clone(),
            FilenameRule::PublicType { default_stem } => public_type_pattern()
                .captures(&top_level_text(source_code))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| default_stem.clone()),
        }
    }

    pub fn source_filename(&self, source_code: &str) -> String {
        format!("{}.{}", self.source_stem(source_code), self.extension)
    }

    pub fn compile_command(&self, filename: &str) -> Option<String> {
        self.compile
            .as_ref()
            .map(|cmd| render_template(cmd, filename))
    }

    pub fn run_command(&self, filename: &str) -> String {
        render_template(&self.run, filename)
    }

    pub fn requires_compilation(&self) -> bool {
        self.compile.is_some()
    }

    /// Script name the sandbox image must expose for this language
    pub fn entrypoint(&self) -> String {
        format!("execute-{}.sh", self.name)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn keys(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|k| normalize_key(k))
    }
}

fn render_template(template: &str, filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    template.replace("{file}", filename).replace("{stem}", stem)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageProfile>,
}

/// Immutable lookup table from language key (name or alias, case-insensitive)
/// to profile. Built once and handed to the executor.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: Vec<LanguageProfile>,
    index: HashMap<String, usize>,
}

impl LanguageRegistry {
    pub fn new(profiles: Vec<LanguageProfile>) -> Result<Self, RegistryError> {
        if profiles.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut index = HashMap::new();
        for (idx, profile) in profiles.iter().enumerate() {
            for key in profile.keys() {
                if index.insert(key.clone(), idx).is_some() {
                    return Err(RegistryError::DuplicateKey(key));
                }
            }
        }

        Ok(Self { profiles, index })
    }

    /// Load a `{ "languages": [...] }` table, replacing the built-in one
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, RegistryError> {
        let table: LanguagesJson = serde_json::from_str(content)?;
        Self::new(table.languages)
    }

    pub fn builtin() -> Self {
        let profiles = builtin_profiles();
        let index = profiles
            .iter()
            .enumerate()
            .flat_map(|(idx, p)| p.keys().map(move |k| (k, idx)))
            .collect();
        Self { profiles, index }
    }

    pub fn profile_for(&self, language: &str) -> Result<&LanguageProfile, ExecuteError> {
        self.index
            .get(&normalize_key(language))
            .map(|&idx| &self.profiles[idx])
            .ok_or_else(|| ExecuteError::UnsupportedLanguage(language.to_string()))
    }

    /// Canonical names, sorted
    pub fn languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn markers(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn fixed(stem: &str) -> FilenameRule {
    FilenameRule::Fixed {
        stem: stem.to_string(),
    }
}

fn builtin_profiles() -> Vec<LanguageProfile> {
    let c_markers = markers(&["error:", "undefined reference to"]);
    vec![
        LanguageProfile {
            name: "python".to_string(),
            aliases: markers(&["py", "python3"]),
            extension: "py".to_string(),
            filename: fixed("main"),
            compile: None,
            run: "python3 -u {file}".to_string(),
            timeout_secs: 5,
            compile_markers: markers(&["SyntaxError", "IndentationError", "TabError"]),
        },
        LanguageProfile {
            name: "javascript".to_string(),
            aliases: markers(&["js", "node", "nodejs"]),
            extension: "js".to_string(),
            filename: fixed("main"),
            compile: None,
            run: "node {file}".to_string(),
            timeout_secs: 5,
            compile_markers: markers(&["SyntaxError"]),
        },
        LanguageProfile {
            name: "java".to_string(),
            aliases: Vec::new(),
            extension: "java".to_string(),
            filename: FilenameRule::PublicType {
                default_stem: "Main".to_string(),
            },
            compile: Some("javac -encoding UTF-8 {file}".to_string()),
            run: "java -Xss64m {stem}".to_string(),
            timeout_secs: 10,
            compile_markers: markers(&["error:", "cannot find symbol", "expected"]),
        },
        LanguageProfile {
            name: "c".to_string(),
            aliases: Vec::new(),
            extension: "c".to_string(),
            filename: fixed("main"),
            compile: Some("gcc -O2 -std=c17 -o main {file} -lm".to_string()),
            run: "./main".to_string(),
            timeout_secs: 5,
            compile_markers: c_markers.clone(),
        },
        LanguageProfile {
            name: "cpp".to_string(),
            aliases: markers(&["c++", "g++", "cxx"]),
            extension: "cpp".to_string(),
            filename: fixed("main"),
            compile: Some("g++ -O2 -std=c++17 -o main {file}".to_string()),
            run: "./main".to_string(),
            timeout_secs: 5,
            compile_markers: c_markers,
        },
        LanguageProfile {
            name: "rust".to_string(),
            aliases: markers(&["rs"]),
            extension: "rs".to_string(),
            filename: fixed("main"),
            compile: Some("rustc -O -o main {file}".to_string()),
            run: "./main".to_string(),
            timeout_secs: 10,
            compile_markers: markers(&["error[E", "error:", "aborting due to"]),
        },
    ]
}
