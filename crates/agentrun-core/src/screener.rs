//! Safety Screener — lexical, pattern-based, host-side conservative filter
//! (spec.md §4.2). Runs before any side-effect. Allowed to reject benign
//! code; must not let a listed pattern through.
//!
//! The blocklist is intentionally a design parameter exposed as constants
//! (spec.md §9: "tests must cover each listed pattern, not prove
//! completeness").

use std::sync::LazyLock;

use regex::Regex;

/// Verdict of a screening pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Unsafe(String),
}

/// Literal substrings that are never allowed to appear in a snippet.
/// Covers dangerous builtins/escape hatches and the write-capable `os.*`
/// members the module is *not* allowed to use (spec.md: "`os` is allowed
/// only for read-only members").
pub const BLOCKED_SUBSTRINGS: &[&str] = &[
    "os.system",
    "os.popen",
    "os.remove",
    "os.unlink",
    "os.rmdir",
    "os.chmod",
    "os.chown",
    "os.execv",
    "os.execve",
    "os.fork",
    "os.kill",
    "subprocess.",
    "eval(",
    "exec(",
    "open(",
    "__import__",
    "importlib",
    "sys.modules",
    "globals()",
    "locals()",
    "delattr",
    "setattr",
    "compile(",
    "rm -rf",
    "fork(",
    "kill(",
];

/// Top-level modules that are never permitted to be imported, regardless
/// of the dependency whitelist (spec.md §4.2).
pub const FORBIDDEN_MODULES: &[&str] = &[
    "subprocess", "socket", "ctypes", "multiprocessing", "threading", "_thread",
    "pty", "resource", "signal",
];

static IMPORT_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:import\s+([A-Za-z_][\w.]*)|from\s+([A-Za-z_][\w.]*)\s+import\b)").unwrap()
});

static QUOTED_ABS_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(['"])(/[^'"\n]*)\1"#).unwrap()
});

/// Screen `source` for the listed unsafe constructs. Purely lexical — never
/// touches the filesystem or network.
pub fn screen(source: &str) -> Verdict {
    for pattern in BLOCKED_SUBSTRINGS {
        if source.contains(pattern) {
            return Verdict::Unsafe(format!("source contains forbidden construct: {pattern:?}"));
        }
    }

    if let Some(reason) = check_dunder_attribute_access(source) {
        return Verdict::Unsafe(reason);
    }

    if let Some(reason) = check_forbidden_imports(source) {
        return Verdict::Unsafe(reason);
    }

    if let Some(reason) = check_absolute_path_literals(source) {
        return Verdict::Unsafe(reason);
    }

    Verdict::Ok
}

/// Reject `x.__something__`-style dunder attribute access (`globals`/`locals`
/// escape hatches like `().__class__.__bases__`). Dunder *method
/// definitions* (`def __init__(self):`) are unaffected since they are not
/// preceded by a `.`.
fn check_dunder_attribute_access(source: &str) -> Option<String> {
    if source.contains(".__") {
        Some("source accesses a dunder attribute (`.__...`)".to_string())
    } else {
        None
    }
}

fn check_forbidden_imports(source: &str) -> Option<String> {
    for caps in IMPORT_TOKEN_RE.captures_iter(source) {
        let module = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let root = module.split('.').next().unwrap_or(module);
        if FORBIDDEN_MODULES.contains(&root) {
            return Some(format!("import of forbidden module: {root:?}"));
        }
    }
    None
}

/// Reject any quoted literal absolute path outside `/tmp/...` — a heuristic
/// against writes escaping the sandboxed working directory.
fn check_absolute_path_literals(source: &str) -> Option<String> {
    for caps in QUOTED_ABS_PATH_RE.captures_iter(source) {
        let path = caps.get(2)?.as_str();
        if !path.starts_with("/tmp/") && path != "/tmp" {
            return Some(format!("source references a path outside /tmp: {path:?}"));
        }
    }
    None
}
