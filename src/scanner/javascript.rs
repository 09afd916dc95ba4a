//! Lexical JavaScript/TypeScript entity extraction
//!
//! No grammar is built for these files. A small set of ordered regular
//! expressions recognizes common function-defining idioms, and a hand-written
//! scanner finds each function's matching closing brace while tracking nesting
//! depth. The scanner must skip single-quoted, double-quoted, and
//! template-quoted strings as well as line and block comments; a naive brace
//! counter would mis-parse any source containing `"{"` in a literal.
//!
//! This is a documented best-effort heuristic, not a parser. Candidates whose
//! closing brace cannot be resolved are discarded.

use crate::models::{deterministic_entity_id, Entity};
use crate::scanner::slice_lines;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    /// Function-defining idioms, in match-priority order: named declarations,
    /// variable-assigned function expressions, parenthesized-parameter
    /// arrows, single-bare-parameter arrows.
    static ref FUNCTION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?m)^[ \t]*(?:async\s+)?function\s+([A-Za-z_$][\w$]*)\s*\(").unwrap(),
        Regex::new(
            r"(?m)^[ \t]*(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?function\b[^(\n]*\("
        )
        .unwrap(),
        Regex::new(
            r"(?m)^[ \t]*(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?\([^)\n]*\)\s*=>"
        )
        .unwrap(),
        Regex::new(
            r"(?m)^[ \t]*(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?[A-Za-z_$][\w$]*\s*=>"
        )
        .unwrap(),
    ];
    static ref CONTROL_KEYWORD_RE: Regex = Regex::new(r"\b(?:if|for|while|switch)\b").unwrap();
}

/// Reserved words kept verbatim during lexical canonicalization.
pub const JS_KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "default", "delete",
    "do", "else", "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "null", "of", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
];

pub fn is_js_keyword(word: &str) -> bool {
    JS_KEYWORDS.contains(&word)
}

#[derive(Clone, Copy, PartialEq)]
enum ScanState {
    Code,
    Single,
    Double,
    Template,
    LineComment,
    BlockComment,
}

/// Find the index of the delimiter matching `bytes[open_idx]`, skipping the
/// contents of string literals and comments. Returns `None` when the input
/// ends before the delimiter balances.
fn find_matching(bytes: &[u8], open_idx: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut state = ScanState::Code;
    let mut i = open_idx;

    while i < bytes.len() {
        let b = bytes[i];
        match state {
            ScanState::Code => {
                if b == b'\'' {
                    state = ScanState::Single;
                } else if b == b'"' {
                    state = ScanState::Double;
                } else if b == b'`' {
                    state = ScanState::Template;
                } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
                    state = ScanState::LineComment;
                    i += 1;
                } else if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
                    state = ScanState::BlockComment;
                    i += 1;
                } else if b == open {
                    depth += 1;
                } else if b == close {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
            }
            ScanState::Single => {
                if b == b'\\' {
                    i += 1;
                } else if b == b'\'' || b == b'\n' {
                    state = ScanState::Code;
                }
            }
            ScanState::Double => {
                if b == b'\\' {
                    i += 1;
                } else if b == b'"' || b == b'\n' {
                    state = ScanState::Code;
                }
            }
            ScanState::Template => {
                // Interpolations are skipped along with the literal.
                if b == b'\\' {
                    i += 1;
                } else if b == b'`' {
                    state = ScanState::Code;
                }
            }
            ScanState::LineComment => {
                if b == b'\n' {
                    state = ScanState::Code;
                }
            }
            ScanState::BlockComment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    state = ScanState::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }
    None
}

/// Remove line and block comments, preserving string literal contents and
/// the original line structure.
pub fn strip_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut state = ScanState::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match state {
            ScanState::Code => {
                if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
                    state = ScanState::LineComment;
                    i += 2;
                    continue;
                }
                if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
                    state = ScanState::BlockComment;
                    i += 2;
                    continue;
                }
                match b {
                    b'\'' => state = ScanState::Single,
                    b'"' => state = ScanState::Double,
                    b'`' => state = ScanState::Template,
                    _ => {}
                }
                out.push(b);
            }
            ScanState::Single | ScanState::Double | ScanState::Template => {
                out.push(b);
                if b == b'\\' {
                    if let Some(&next) = bytes.get(i + 1) {
                        out.push(next);
                        i += 2;
                        continue;
                    }
                } else if (state == ScanState::Single && (b == b'\'' || b == b'\n'))
                    || (state == ScanState::Double && (b == b'"' || b == b'\n'))
                    || (state == ScanState::Template && b == b'`')
                {
                    state = ScanState::Code;
                }
            }
            ScanState::LineComment => {
                if b == b'\n' {
                    out.push(b);
                    state = ScanState::Code;
                }
            }
            ScanState::BlockComment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    state = ScanState::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Replace every quoted/template string literal with `placeholder`.
/// Operates on comment-free text.
pub fn replace_string_literals(source: &str, placeholder: &str) -> String {
    let bytes = source.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut state = ScanState::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match state {
            ScanState::Code => match b {
                b'\'' => {
                    state = ScanState::Single;
                    out.extend_from_slice(placeholder.as_bytes());
                }
                b'"' => {
                    state = ScanState::Double;
                    out.extend_from_slice(placeholder.as_bytes());
                }
                b'`' => {
                    state = ScanState::Template;
                    out.extend_from_slice(placeholder.as_bytes());
                }
                _ => out.push(b),
            },
            ScanState::Single => {
                if b == b'\\' {
                    i += 1;
                } else if b == b'\'' || b == b'\n' {
                    state = ScanState::Code;
                }
            }
            ScanState::Double => {
                if b == b'\\' {
                    i += 1;
                } else if b == b'"' || b == b'\n' {
                    state = ScanState::Code;
                }
            }
            ScanState::Template => {
                if b == b'\\' {
                    i += 1;
                } else if b == b'`' {
                    state = ScanState::Code;
                }
            }
            ScanState::LineComment | ScanState::BlockComment => unreachable!(),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Collect the contents of all string literals in comment-free text.
pub fn string_literal_contents(source: &str) -> Vec<String> {
    let bytes = source.as_bytes();
    let mut literals = Vec::new();
    let mut current = Vec::new();
    let mut state = ScanState::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match state {
            ScanState::Code => match b {
                b'\'' => state = ScanState::Single,
                b'"' => state = ScanState::Double,
                b'`' => state = ScanState::Template,
                _ => {}
            },
            ScanState::Single | ScanState::Double | ScanState::Template => {
                let terminator = match state {
                    ScanState::Single => b'\'',
                    ScanState::Double => b'"',
                    _ => b'`',
                };
                if b == b'\\' {
                    if let Some(&next) = bytes.get(i + 1) {
                        current.push(next);
                        i += 2;
                        continue;
                    }
                } else if b == terminator || (terminator != b'`' && b == b'\n') {
                    literals.push(String::from_utf8_lossy(&current).into_owned());
                    current.clear();
                    state = ScanState::Code;
                } else {
                    current.push(b);
                }
            }
            ScanState::LineComment | ScanState::BlockComment => unreachable!(),
        }
        i += 1;
    }
    literals
}

/// Approximate statement count: statement-terminating semicolons plus
/// control-keyword occurrences, on comment-free text.
pub fn estimate_statements(body: &str) -> usize {
    let stripped = strip_comments(body);
    let semicolons = stripped.bytes().filter(|b| *b == b';').count();
    semicolons + CONTROL_KEYWORD_RE.find_iter(&stripped).count()
}

/// Module path: directory separators become dots; a trailing `index` segment
/// is dropped, so `lib/util/index.js` maps to `lib.util`.
fn module_name_from_path(rel_path: &str) -> String {
    let without_ext = match rel_path.rfind('.') {
        Some(dot) => &rel_path[..dot],
        None => rel_path,
    };
    let mut parts: Vec<&str> = without_ext.split('/').filter(|p| !p.is_empty()).collect();
    if parts.last() == Some(&"index") {
        parts.pop();
    }
    parts.join(".")
}

fn line_at(source: &str, offset: usize) -> u32 {
    source.as_bytes()[..offset.min(source.len())]
        .iter()
        .filter(|b| **b == b'\n')
        .count() as u32
        + 1
}

struct Candidate {
    name: String,
    decl_offset: usize,
    body_close: usize,
}

/// Locate the body's opening brace for a candidate whose pattern ended at
/// `after`. For patterns ending at the parameter `(`, the matching `)` is
/// resolved first (parameters may contain braces via destructuring); a TS
/// return annotation between `)` and `{` is tolerated.
fn locate_body_open(bytes: &[u8], after: usize, ends_at_paren: bool) -> Option<usize> {
    let mut i = after;
    if ends_at_paren {
        let paren_open = after.checked_sub(1)?;
        if bytes.get(paren_open) != Some(&b'(') {
            return None;
        }
        i = find_matching(bytes, paren_open, b'(', b')')? + 1;
    }
    while i < bytes.len() {
        match bytes[i] {
            b'{' => return Some(i),
            b';' | b'=' => return None,
            _ => i += 1,
        }
    }
    None
}

/// Extract entities from one JavaScript/TypeScript file.
///
/// Matches are deduplicated by start offset across pattern alternatives
/// (first pattern wins) and the result is sorted by line number. Candidates
/// with no matching closing brace are dropped silently.
pub fn extract(source: &str, rel_path: &str) -> Vec<Entity> {
    let bytes = source.as_bytes();
    let mut by_offset: HashMap<usize, Candidate> = HashMap::new();

    for (pattern_index, pattern) in FUNCTION_PATTERNS.iter().enumerate() {
        let ends_at_paren = pattern_index < 2;
        for caps in pattern.captures_iter(source) {
            let whole = caps.get(0).expect("match");
            if by_offset.contains_key(&whole.start()) {
                continue;
            }
            let Some(body_open) = locate_body_open(bytes, whole.end(), ends_at_paren) else {
                continue;
            };
            let Some(body_close) = find_matching(bytes, body_open, b'{', b'}') else {
                continue;
            };
            by_offset.insert(
                whole.start(),
                Candidate {
                    name: caps.get(1).expect("name group").as_str().to_string(),
                    decl_offset: whole.start(),
                    body_close,
                },
            );
        }
    }

    let module_name = module_name_from_path(rel_path);
    let mut entities: Vec<Entity> = by_offset
        .into_values()
        .map(|candidate| {
            let line_start = line_at(source, candidate.decl_offset);
            let line_end = line_at(source, candidate.body_close);
            let qualified_name = if module_name.is_empty() {
                candidate.name.clone()
            } else {
                format!("{}.{}", module_name, candidate.name)
            };
            Entity {
                id: deterministic_entity_id(rel_path, &qualified_name, line_start),
                file_path: rel_path.to_string(),
                name: candidate.name,
                qualified_name,
                line_start,
                line_end,
                source: slice_lines(source, line_start, line_end),
            }
        })
        .collect();

    entities.sort_by_key(|e| e.line_start);
    entities
}
