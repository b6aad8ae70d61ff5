//! Import Extractor — statically enumerates third-party top-level module
//! names imported by a snippet (spec.md §4.3).
//!
//! Pure w.r.t. the source text: no filesystem or network access. A parse
//! failure yields an empty set; the Executor surfaces the resulting
//! `SyntaxError` itself when the snippet actually runs.

use std::collections::HashSet;

use rustpython_parser::{ast, Mode};

use crate::stdlib::{is_stdlib_module, BUILTIN_NAMES};

/// Extract the set of third-party top-level module names imported by
/// `source`. Deduplicated; order is not meaningful.
pub fn extract_imports(source: &str) -> HashSet<String> {
    let module = match rustpython_parser::parse(source, Mode::Module, "<snippet>") {
        Ok(ast::Mod::Module(module)) => module,
        _ => return HashSet::new(),
    };

    let mut found = HashSet::new();
    walk_stmts(&module.body, &mut found);

    found
        .into_iter()
        .filter(|name| !is_stdlib_module(name) && !BUILTIN_NAMES.contains(&name.as_str()))
        .collect()
}

fn first_segment(dotted: &str) -> String {
    dotted.split('.').next().unwrap_or(dotted).to_string()
}

fn walk_stmts(stmts: &[ast::Stmt], found: &mut HashSet<String>) {
    for stmt in stmts {
        walk_stmt(stmt, found);
    }
}

fn walk_stmt(stmt: &ast::Stmt, found: &mut HashSet<String>) {
    match stmt {
        ast::Stmt::Import(import) => {
            for alias in &import.names {
                found.insert(first_segment(alias.name.as_str()));
            }
        }
        ast::Stmt::ImportFrom(import_from) => {
            // Relative imports (`from . import x`, level > 0) always refer
            // to a sibling/parent of the snippet itself, never a
            // third-party package.
            if import_from.level.map(|l| l.to_u32()).unwrap_or(0) == 0 {
                if let Some(module) = &import_from.module {
                    found.insert(first_segment(module.as_str()));
                }
            }
        }
        ast::Stmt::FunctionDef(def) => walk_stmts(&def.body, found),
        ast::Stmt::AsyncFunctionDef(def) => walk_stmts(&def.body, found),
        ast::Stmt::ClassDef(def) => walk_stmts(&def.body, found),
        ast::Stmt::If(if_stmt) => {
            walk_stmts(&if_stmt.body, found);
            walk_stmts(&if_stmt.orelse, found);
        }
        ast::Stmt::For(for_stmt) => {
            walk_stmts(&for_stmt.body, found);
            walk_stmts(&for_stmt.orelse, found);
        }
        ast::Stmt::AsyncFor(for_stmt) => {
            walk_stmts(&for_stmt.body, found);
            walk_stmts(&for_stmt.orelse, found);
        }
        ast::Stmt::While(while_stmt) => {
            walk_stmts(&while_stmt.body, found);
            walk_stmts(&while_stmt.orelse, found);
        }
        ast::Stmt::With(with_stmt) => walk_stmts(&with_stmt.body, found),
        ast::Stmt::AsyncWith(with_stmt) => walk_stmts(&with_stmt.body, found),
        ast::Stmt::Try(try_stmt) => {
            walk_stmts(&try_stmt.body, found);
            for handler in &try_stmt.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                walk_stmts(&h.body, found);
            }
            walk_stmts(&try_stmt.orelse, found);
            walk_stmts(&try_stmt.finalbody, found);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(src: &str) -> HashSet<String> {
        extract_imports(src)
    }

    #[test]
    fn test_plain_import() {
        let found = extract("import requests\n");
        assert_eq!(found, HashSet::from(["requests".to_string()]));
    }

    #[test]
    fn test_dotted_import_takes_first_segment() {
        let found = extract("import numpy.linalg\n");
        assert_eq!(found, HashSet::from(["numpy".to_string()]));
    }

    #[test]
    fn test_from_import() {
        let found = extract("from pandas import DataFrame\n");
        assert_eq!(found, HashSet::from(["pandas".to_string()]));
    }

    #[test]
    fn test_relative_import_ignored() {
        let found = extract("from . import helper\n");
        assert!(found.is_empty());
    }

    #[test]
    fn test_stdlib_import_excluded() {
        let found = extract("import os\nimport json\nimport requests\n");
        assert_eq!(found, HashSet::from(["requests".to_string()]));
    }

    #[test]
    fn test_nested_import_inside_function() {
        let found = extract("def f():\n    import requests\n    return requests\n");
        assert_eq!(found, HashSet::from(["requests".to_string()]));
    }

    #[test]
    fn test_nested_import_inside_try() {
        let found = extract("try:\n    import ujson as json\nexcept ImportError:\n    import json\n");
        assert_eq!(found, HashSet::from(["ujson".to_string()]));
    }

    #[test]
    fn test_no_imports_returns_empty() {
        assert!(extract("print('hello, world!')\n").is_empty());
    }

    #[test]
    fn test_syntax_error_returns_empty() {
        assert!(extract("def f(:\n").is_empty());
    }

    #[test]
    fn test_multiple_aliases_in_one_import() {
        let found = extract("import os, requests, numpy\n");
        assert_eq!(found, HashSet::from(["requests".to_string(), "numpy".to_string()]));
    }
}
