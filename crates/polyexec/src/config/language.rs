use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::Timeouts;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Default entry name used for source and binary files
pub const DEFAULT_ENTRY_NAME: &str = "main";

static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b((?:(?:public|final|abstract|strictfp)\s+)*)class\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .expect("class declaration pattern is valid")
});

static MAIN_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bstatic\s+(?:(?:final|synchronized)\s+)*void\s+main\s*\(")
        .expect("main method pattern is valid")
});

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name used in messages (e.g., "C++")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Whether the source is executed or only analyzed
    #[serde(default)]
    pub mode: LanguageMode,

    /// How the entry name (source file stem) is chosen
    #[serde(default)]
    pub entry: EntryPoint,

    /// Entry name used when none is derived from the source
    #[serde(default = "default_entry_name")]
    pub entry_name: String,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    #[serde(default)]
    pub run: RunConfig,

    /// Command used to check that the toolchain is installed.
    /// Defaults to `<program> --version` for the first step's program.
    #[serde(default)]
    pub probe: Option<Vec<String>>,

    /// Files written next to the source before compiling or running
    #[serde(default)]
    pub support_files: Vec<SupportFile>,

    /// Timeouts for this language (override the global defaults)
    #[serde(default)]
    pub timeouts: Option<Timeouts>,

    /// Starter code shown to users
    #[serde(default)]
    pub template: String,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Check if running this language spawns external tools
    pub fn needs_toolchain(&self) -> bool {
        self.mode == LanguageMode::Process
    }

    /// Resolve the entry name for the given source
    pub fn resolve_entry(&self, source: &str) -> String {
        self.entry.resolve(source, &self.entry_name)
    }

    /// Get the source file name for an entry name
    pub fn source_name(&self, entry: &str) -> String {
        format!("{entry}.{}", self.extension)
    }

    /// Get the compiled artifact name for an entry name
    pub fn binary_name(&self, entry: &str) -> String {
        match self.compile {
            Some(ref compile) => compile.output_name.replace("{entry}", entry),
            None => self.source_name(entry),
        }
    }

    /// Label prefixed to compiler diagnostics
    pub fn compile_error_label(&self) -> String {
        self.compile
            .as_ref()
            .and_then(|compile| compile.error_label.clone())
            .unwrap_or_else(|| format!("{} Compilation Error", self.name))
    }

    /// Label prefixed to runtime diagnostics
    pub fn run_error_label(&self) -> String {
        self.run
            .error_label
            .clone()
            .unwrap_or_else(|| format!("{} Runtime Error", self.name))
    }

    /// Command used to probe for the toolchain
    pub fn probe_command(&self) -> Option<Vec<String>> {
        if !self.needs_toolchain() {
            return None;
        }
        if let Some(ref probe) = self.probe {
            return Some(probe.clone());
        }

        let first_step = match self.compile {
            Some(ref compile) => &compile.command,
            None => &self.run.command,
        };
        let program = first_step.first()?;
        // Artifacts produced inside the workspace can't be probed up front
        if program.contains('{') {
            return None;
        }
        Some(vec![program.clone(), "--version".to_owned()])
    }

    /// Expand placeholders in the given command
    ///
    /// Placeholders: `{source}`, `{binary}` (alias `{output}`), `{entry}`.
    pub fn expand_command(
        command: &[String],
        source: &str,
        binary: &str,
        entry: &str,
    ) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
                    .replace("{entry}", entry)
            })
            .collect()
    }
}

/// Whether a language is executed or only analyzed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageMode {
    /// Compile and/or run external processes
    #[default]
    Process,

    /// Static text analysis of markup, no process is spawned
    Markup,
}

/// How the source file stem is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryPoint {
    /// Always use the configured entry name
    #[default]
    Fixed,

    /// Use the declared class name (`public class Foo` -> `Foo`)
    ClassName,
}

impl EntryPoint {
    /// Resolve the entry name for `source`, falling back to `default`
    pub fn resolve(&self, source: &str, default: &str) -> String {
        match self {
            EntryPoint::Fixed => default.to_owned(),
            EntryPoint::ClassName => {
                detect_class_name(source).unwrap_or_else(|| default.to_owned())
            }
        }
    }
}

/// Find the class name declared in Java-like source
///
/// Only top-level declarations outside comments and literals count. Prefers
/// a `public class`, then the class holding `static void main`, then the
/// first class declared.
pub fn detect_class_name(source: &str) -> Option<String> {
    let code = mask_comments_and_literals(source);
    let classes = top_level_classes(&code);
    let main_at = MAIN_METHOD.find(&code).map(|m| m.start());

    let holds_main = |index: usize| {
        main_at.is_some_and(|at| {
            classes[index].start <= at
                && classes
                    .get(index + 1)
                    .is_none_or(|next| at < next.start)
        })
    };

    classes
        .iter()
        .position(|class| class.public)
        .or_else(|| (0..classes.len()).find(|&index| holds_main(index)))
        .or_else(|| (!classes.is_empty()).then_some(0))
        .map(|index| classes[index].name.clone())
}

#[derive(Debug)]
struct ClassDecl {
    name: String,
    start: usize,
    public: bool,
}

/// Class declarations at brace depth zero, in source order
fn top_level_classes(code: &str) -> Vec<ClassDecl> {
    let mut classes = Vec::new();
    let mut depth = 0usize;
    let mut scanned = 0;

    for caps in CLASS_DECL.captures_iter(code) {
        let (Some(decl), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        for c in code[scanned..decl.start()].chars() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        scanned = decl.start();

        if depth == 0 {
            classes.push(ClassDecl {
                name: name.as_str().to_owned(),
                start: decl.start(),
                public: caps
                    .get(1)
                    .is_some_and(|modifiers| modifiers.as_str().contains("public")),
            });
        }
    }
    classes
}

/// Blank out comments and string or char literals, keeping line breaks
fn mask_comments_and_literals(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            '"' | '\'' => {
                let quote = c;
                let mut escaped = false;
                for c in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '\n' {
                        out.push('\n');
                        break;
                    } else if c == quote {
                        break;
                    }
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}, {entry}
    pub command: Vec<String>,

    /// Output artifact name, may reference `{entry}`
    #[serde(default = "default_entry_name")]
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Prefix for compiler diagnostics (default: "<name> Compilation Error")
    #[serde(default)]
    pub error_label: Option<String>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}, {entry}
    #[serde(default)]
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Prefix for runtime diagnostics (default: "<name> Runtime Error")
    #[serde(default)]
    pub error_label: Option<String>,
}

/// Auxiliary file written into the workspace (project files, init scripts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportFile {
    /// File name relative to the workspace
    pub name: String,

    /// File contents
    pub content: String,
}

fn default_entry_name() -> String {
    DEFAULT_ENTRY_NAME.to_owned()
}
