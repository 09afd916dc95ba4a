//! Python entity extraction via the full syntax tree
//!
//! Parses each file with rustpython-parser and walks the typed statement tree
//! depth-first, tracking the stack of enclosing class names. Every function or
//! method definition (including async variants) becomes one entity. A syntax
//! error skips the whole file; partially-written files must not abort a scan.

use crate::models::{deterministic_entity_id, Entity};
use crate::scanner::slice_lines;
use line_numbers::LinePositions;
use rustpython_parser::ast::{Arguments, Mod, Stmt, StmtAsyncFunctionDef, StmtFunctionDef};
use rustpython_parser::{parse, Mode};

/// Derive the dotted module path from a repo-relative file path.
///
/// Directory separators become dots and a trailing `__init__` segment is
/// dropped, so `pkg/sub/__init__.py` maps to `pkg.sub`.
fn module_name_from_path(rel_path: &str) -> String {
    let normalized = rel_path.strip_suffix(".py").unwrap_or(rel_path);
    let mut parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
    if parts.last() == Some(&"__init__") {
        parts.pop();
    }
    parts.join(".")
}

struct Collector<'a> {
    file_path: &'a str,
    module_name: String,
    source: &'a str,
    positions: LinePositions,
    class_stack: Vec<String>,
    entities: Vec<Entity>,
}

impl Collector<'_> {
    fn line_of(&self, offset: usize) -> u32 {
        self.positions.from_offset(offset).as_usize() as u32 + 1
    }

    fn record(&mut self, name: &str, start_offset: usize, end_offset: usize) {
        let mut qualified_parts: Vec<&str> = Vec::new();
        if !self.module_name.is_empty() {
            qualified_parts.push(&self.module_name);
        }
        qualified_parts.extend(self.class_stack.iter().map(String::as_str));
        qualified_parts.push(name);
        let qualified_name = qualified_parts.join(".");

        let line_start = self.line_of(start_offset);
        let line_end = self.line_of(end_offset.saturating_sub(1).max(start_offset));

        self.entities.push(Entity {
            id: deterministic_entity_id(self.file_path, &qualified_name, line_start),
            file_path: self.file_path.to_string(),
            name: name.to_string(),
            qualified_name,
            line_start,
            line_end,
            source: slice_lines(self.source, line_start, line_end),
        });
    }

    fn visit_suite(&mut self, suite: &[Stmt]) {
        for stmt in suite {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(func) => {
                self.record(
                    func.name.as_str(),
                    func.range.start().into(),
                    func.range.end().into(),
                );
                // Nested defs are entities too; enclosing function names do
                // not contribute to the qualified name.
                self.visit_suite(&func.body);
            }
            Stmt::AsyncFunctionDef(func) => {
                self.record(
                    func.name.as_str(),
                    func.range.start().into(),
                    func.range.end().into(),
                );
                self.visit_suite(&func.body);
            }
            Stmt::ClassDef(class) => {
                self.class_stack.push(class.name.to_string());
                self.visit_suite(&class.body);
                self.class_stack.pop();
            }
            Stmt::If(inner) => {
                self.visit_suite(&inner.body);
                self.visit_suite(&inner.orelse);
            }
            Stmt::For(inner) => {
                self.visit_suite(&inner.body);
                self.visit_suite(&inner.orelse);
            }
            Stmt::AsyncFor(inner) => {
                self.visit_suite(&inner.body);
                self.visit_suite(&inner.orelse);
            }
            Stmt::While(inner) => {
                self.visit_suite(&inner.body);
                self.visit_suite(&inner.orelse);
            }
            Stmt::With(inner) => self.visit_suite(&inner.body),
            Stmt::AsyncWith(inner) => self.visit_suite(&inner.body),
            Stmt::Try(inner) => {
                self.visit_suite(&inner.body);
                for handler in &inner.handlers {
                    let rustpython_parser::ast::ExceptHandler::ExceptHandler(handler) = handler;
                    self.visit_suite(&handler.body);
                }
                self.visit_suite(&inner.orelse);
                self.visit_suite(&inner.finalbody);
            }
            Stmt::Match(inner) => {
                for case in &inner.cases {
                    self.visit_suite(&case.body);
                }
            }
            _ => {}
        }
    }
}

/// Extract all function/method entities from one Python file.
///
/// Returns `None` on a syntax error (the caller logs and skips the file).
pub fn extract(source: &str, rel_path: &str) -> Option<Vec<Entity>> {
    let module = match parse(source, Mode::Module, rel_path) {
        Ok(Mod::Module(module)) => module,
        _ => return None,
    };

    let mut collector = Collector {
        file_path: rel_path,
        module_name: module_name_from_path(rel_path),
        source,
        positions: LinePositions::from(source),
        class_stack: Vec::new(),
        entities: Vec::new(),
    };
    collector.visit_suite(&module.body);
    Some(collector.entities)
}

/// The first top-level function definition re-parsed from an entity's
/// source slice. Each entity slice corresponds to one definition, so this is
/// effectively always that definition; the lookup stays defensive anyway.
pub enum PyFunction {
    Sync(StmtFunctionDef),
    Async(StmtAsyncFunctionDef),
}

impl PyFunction {
    pub fn body(&self) -> &[Stmt] {
        match self {
            PyFunction::Sync(func) => &func.body,
            PyFunction::Async(func) => &func.body,
        }
    }

    pub fn args(&self) -> &Arguments {
        match self {
            PyFunction::Sync(func) => &func.args,
            PyFunction::Async(func) => &func.args,
        }
    }
}

/// Strip the common leading whitespace from every non-blank line.
///
/// Entity slices cover whole lines, so a method's slice keeps its class-body
/// indentation; it must be dedented before it can re-parse as a module.
pub fn dedent(source: &str) -> String {
    let margin = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    if margin == 0 {
        return source.to_string();
    }
    source
        .lines()
        .map(|line| if line.len() >= margin { &line[margin..] } else { line.trim_start() })
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Re-parse an entity source slice and return its first top-level function
/// definition, or `None` when the slice does not parse or holds no function.
pub fn first_function(source: &str) -> Option<PyFunction> {
    let dedented = dedent(source);
    let module = match parse(&dedented, Mode::Module, "<entity>") {
        Ok(Mod::Module(module)) => module,
        _ => return None,
    };
    for stmt in module.body {
        match stmt {
            Stmt::FunctionDef(func) => return Some(PyFunction::Sync(func)),
            Stmt::AsyncFunctionDef(func) => return Some(PyFunction::Async(func)),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name_from_path() {
        assert_eq!(module_name_from_path("pkg/sub/mod.py"), "pkg.sub.mod");
        assert_eq!(module_name_from_path("pkg/__init__.py"), "pkg");
        assert_eq!(module_name_from_path("top.py"), "top");
    }

    #[test]
    fn test_extracts_plain_and_async_functions() {
        let source = "def alpha():\n    return 1\n\n\nasync def beta():\n    return 2\n";
        let entities = extract(source, "svc/api.py").expect("parse");
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].qualified_name, "svc.api.alpha");
        assert_eq!(entities[0].line_start, 1);
        assert_eq!(entities[1].qualified_name, "svc.api.beta");
        assert_eq!(entities[1].line_start, 5);
    }

    #[test]
    fn test_method_qualified_with_class_stack() {
        let source = "class Outer:\n    class Inner:\n        def handler(self):\n            return None\n";
        let entities = extract(source, "app.py").expect("parse");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].qualified_name, "app.Outer.Inner.handler");
        assert_eq!(entities[0].name, "handler");
    }

    #[test]
    fn test_source_slice_spans_definition() {
        let source = "x = 1\n\ndef span():\n    a = 1\n    return a\n";
        let entities = extract(source, "m.py").expect("parse");
        assert_eq!(entities.len(), 1);
        let entity = &entities[0];
        assert_eq!(entity.line_start, 3);
        assert_eq!(entity.line_end, 5);
        assert_eq!(entity.source, "def span():\n    a = 1\n    return a");
    }

    #[test]
    fn test_nested_function_recorded_without_outer_name() {
        let source = "def outer():\n    def inner():\n        return 1\n    return inner\n";
        let entities = extract(source, "m.py").expect("parse");
        let names: Vec<&str> = entities.iter().map(|e| e.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["m.outer", "m.inner"]);
    }

    #[test]
    fn test_syntax_error_returns_none() {
        assert!(extract("def broken(:\n", "bad.py").is_none());
    }

    #[test]
    fn test_rescan_reproduces_identifiers() {
        let source = "def stable():\n    return 1\n";
        let first = extract(source, "m.py").expect("parse");
        let second = extract(source, "m.py").expect("parse");
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_dedent_indented_method_slice() {
        let slice = "    def handler(self):\n        return None";
        assert_eq!(dedent(slice), "def handler(self):\n    return None");
    }

    #[test]
    fn test_first_function_reparses_method_slice() {
        let slice = "    def handler(self, value):\n        if value is None:\n            return None\n        return value";
        let func = first_function(slice).expect("reparse");
        assert_eq!(func.body().len(), 2);
    }

    #[test]
    fn test_first_function_none_for_non_function() {
        assert!(first_function("x = 1\n").is_none());
        assert!(first_function("def broken(:\n").is_none());
    }
}
