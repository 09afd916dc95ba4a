//! AI-provenance scoring
//!
//! Each entity gets a heuristic probability that it was machine-generated,
//! assembled from an additive rule table over its structure: uniform guard
//! clause prefixes, generic placeholder naming, high defensive branch density,
//! repeated error-message phrasing, bare generic returns, and flat boilerplate
//! bodies. Python entities are scored against the re-parsed syntax tree;
//! lexical entities get text-level approximations of the same rules. Version
//! control evidence, when available, nudges the score in either direction
//! before it is clamped and thresholded.

use crate::config::AnalysisConfig;
use crate::models::{Confidence, Entity, GitEvidence, ProvenanceSignal};
use crate::scanner::javascript::{estimate_statements, string_literal_contents, strip_comments};
use crate::scanner::python::{first_function, PyFunction};
use crate::scanner::Language;
use lazy_static::lazy_static;
use regex::Regex;
use rustpython_parser::ast::{Constant, ExceptHandler, Expr, ExprContext, Stmt};
use std::collections::BTreeMap;
use std::collections::HashSet;

/// Placeholder-style identifiers characteristic of generated code.
const GENERIC_NAMES: &[&str] = &[
    "data", "input", "output", "result", "value", "item", "obj", "response", "request", "temp",
    "payload",
];

lazy_static! {
    static ref GUARD_BLOCK_RE: Regex =
        Regex::new(r"if\s*\([^)]*\)\s*\{[^{}]*\b(?:return|throw)\b[^{}]*\}").unwrap();
    static ref GUARD_INLINE_RE: Regex =
        Regex::new(r"if\s*\([^)]*\)\s*(?:return|throw)\b").unwrap();
    static ref DECL_NAME_RE: Regex =
        Regex::new(r"\b(?:let|const|var)\s+([A-Za-z_$][\w$]*)").unwrap();
    static ref IF_OPEN_RE: Regex = Regex::new(r"\bif\s*\(").unwrap();
    static ref RETURN_IDENT_RE: Regex =
        Regex::new(r"\breturn\s+([A-Za-z_$][\w$]*)\s*;").unwrap();
    static ref LOOP_KEYWORD_RE: Regex = Regex::new(r"\b(?:for|while)\b").unwrap();
}

fn is_generic_name(name: &str) -> bool {
    GENERIC_NAMES.contains(&name.to_ascii_lowercase().as_str())
}

/// Structural facts gathered from one function body, shared by several rules.
#[derive(Default)]
struct BodyStats {
    store_names: Vec<String>,
    if_count: usize,
    has_loop_or_try: bool,
    string_literals: Vec<String>,
}

impl BodyStats {
    fn collect(body: &[Stmt]) -> BodyStats {
        let mut stats = BodyStats::default();
        for stmt in body {
            stats.visit_stmt(stmt);
        }
        stats
    }

    fn visit_suite(&mut self, suite: &[Stmt]) {
        for stmt in suite {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(func) => self.visit_suite(&func.body),
            Stmt::AsyncFunctionDef(func) => self.visit_suite(&func.body),
            Stmt::ClassDef(class) => self.visit_suite(&class.body),
            Stmt::Return(ret) => {
                if let Some(value) = &ret.value {
                    self.visit_expr(value);
                }
            }
            Stmt::Delete(del) => {
                for target in &del.targets {
                    self.visit_expr(target);
                }
            }
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    self.visit_expr(target);
                }
                self.visit_expr(&assign.value);
            }
            Stmt::AugAssign(assign) => {
                self.visit_expr(&assign.target);
                self.visit_expr(&assign.value);
            }
            Stmt::AnnAssign(assign) => {
                self.visit_expr(&assign.target);
                if let Some(value) = &assign.value {
                    self.visit_expr(value);
                }
            }
            Stmt::For(stmt) => {
                self.has_loop_or_try = true;
                self.visit_expr(&stmt.target);
                self.visit_expr(&stmt.iter);
                self.visit_suite(&stmt.body);
                self.visit_suite(&stmt.orelse);
            }
            Stmt::AsyncFor(stmt) => {
                self.has_loop_or_try = true;
                self.visit_expr(&stmt.target);
                self.visit_expr(&stmt.iter);
                self.visit_suite(&stmt.body);
                self.visit_suite(&stmt.orelse);
            }
            Stmt::While(stmt) => {
                self.has_loop_or_try = true;
                self.visit_expr(&stmt.test);
                self.visit_suite(&stmt.body);
                self.visit_suite(&stmt.orelse);
            }
            Stmt::If(stmt) => {
                self.if_count += 1;
                self.visit_expr(&stmt.test);
                self.visit_suite(&stmt.body);
                self.visit_suite(&stmt.orelse);
            }
            Stmt::With(stmt) => {
                for item in &stmt.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_suite(&stmt.body);
            }
            Stmt::AsyncWith(stmt) => {
                for item in &stmt.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_suite(&stmt.body);
            }
            Stmt::Match(stmt) => {
                self.visit_expr(&stmt.subject);
                for case in &stmt.cases {
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_suite(&case.body);
                }
            }
            Stmt::Raise(stmt) => {
                if let Some(exc) = &stmt.exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = &stmt.cause {
                    self.visit_expr(cause);
                }
            }
            Stmt::Try(stmt) => {
                self.has_loop_or_try = true;
                self.visit_suite(&stmt.body);
                for handler in &stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(type_) = &handler.type_ {
                        self.visit_expr(type_);
                    }
                    self.visit_suite(&handler.body);
                }
                self.visit_suite(&stmt.orelse);
                self.visit_suite(&stmt.finalbody);
            }
            Stmt::Assert(stmt) => {
                self.visit_expr(&stmt.test);
                if let Some(msg) = &stmt.msg {
                    self.visit_expr(msg);
                }
            }
            Stmt::Expr(stmt) => self.visit_expr(&stmt.value),
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(name) => {
                if matches!(name.ctx, ExprContext::Store) {
                    self.store_names.push(name.id.to_string());
                }
            }
            Expr::Constant(constant) => {
                if let Constant::Str(value) = &constant.value {
                    self.string_literals.push(value.to_string());
                }
            }
            Expr::BoolOp(op) => {
                for value in &op.values {
                    self.visit_expr(value);
                }
            }
            Expr::NamedExpr(named) => {
                self.visit_expr(&named.target);
                self.visit_expr(&named.value);
            }
            Expr::BinOp(op) => {
                self.visit_expr(&op.left);
                self.visit_expr(&op.right);
            }
            Expr::UnaryOp(op) => self.visit_expr(&op.operand),
            Expr::IfExp(ifexp) => {
                self.visit_expr(&ifexp.test);
                self.visit_expr(&ifexp.body);
                self.visit_expr(&ifexp.orelse);
            }
            Expr::Dict(dict) => {
                for key in dict.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                for value in &dict.values {
                    self.visit_expr(value);
                }
            }
            Expr::Set(set) => {
                for elt in &set.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::Await(inner) => self.visit_expr(&inner.value),
            Expr::Yield(inner) => {
                if let Some(value) = &inner.value {
                    self.visit_expr(value);
                }
            }
            Expr::YieldFrom(inner) => self.visit_expr(&inner.value),
            Expr::Compare(cmp) => {
                self.visit_expr(&cmp.left);
                for comparator in &cmp.comparators {
                    self.visit_expr(comparator);
                }
            }
            Expr::Call(call) => {
                self.visit_expr(&call.func);
                for arg in &call.args {
                    self.visit_expr(arg);
                }
                for keyword in &call.keywords {
                    self.visit_expr(&keyword.value);
                }
            }
            Expr::JoinedStr(joined) => {
                for value in &joined.values {
                    self.visit_expr(value);
                }
            }
            Expr::FormattedValue(fv) => self.visit_expr(&fv.value),
            Expr::Attribute(attr) => self.visit_expr(&attr.value),
            Expr::Subscript(sub) => {
                self.visit_expr(&sub.value);
                self.visit_expr(&sub.slice);
            }
            Expr::Starred(starred) => self.visit_expr(&starred.value),
            Expr::List(list) => {
                for elt in &list.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.visit_expr(elt);
                }
            }
            Expr::Slice(slice) => {
                for part in [&slice.lower, &slice.upper, &slice.step].into_iter().flatten() {
                    self.visit_expr(part);
                }
            }
            Expr::ListComp(comp) => {
                self.visit_expr(&comp.elt);
                self.visit_generators(&comp.generators);
            }
            Expr::SetComp(comp) => {
                self.visit_expr(&comp.elt);
                self.visit_generators(&comp.generators);
            }
            Expr::GeneratorExp(comp) => {
                self.visit_expr(&comp.elt);
                self.visit_generators(&comp.generators);
            }
            Expr::DictComp(comp) => {
                self.visit_expr(&comp.key);
                self.visit_expr(&comp.value);
                self.visit_generators(&comp.generators);
            }
            Expr::Lambda(lambda) => self.visit_expr(&lambda.body),
            _ => {}
        }
    }

    fn visit_generators(&mut self, generators: &[rustpython_parser::ast::Comprehension]) {
        for gen in generators {
            self.visit_expr(&gen.target);
            self.visit_expr(&gen.iter);
            for if_clause in &gen.ifs {
                self.visit_expr(if_clause);
            }
        }
    }
}

/// Whether a run of error-flavored string literals reads as copy-pasted
/// phrasing: at least two of them, with at most half-plus-one distinct texts.
fn repetitive_error_literals(literals: &[String]) -> bool {
    let error_like: Vec<&String> = literals
        .iter()
        .filter(|text| {
            let lowered = text.to_ascii_lowercase();
            lowered.contains("error") || lowered.contains("invalid") || lowered.contains("fail")
        })
        .collect();
    if error_like.len() < 2 {
        return false;
    }
    let distinct: HashSet<&str> = error_like.iter().map(|text| text.as_str()).collect();
    distinct.len() <= error_like.len() / 2 + 1
}

fn score_python(func: &PyFunction) -> (f64, Vec<String>) {
    let body = func.body();
    let stats = BodyStats::collect(body);
    let mut score = 0.0;
    let mut signals = Vec::new();

    // Guard-clause prefix: consecutive single-statement ifs at the top of the
    // body, stopping at the first statement that breaks the run.
    let mut guard_count = 0usize;
    for stmt in body.iter().take(6) {
        let Stmt::If(stmt) = stmt else { break };
        if stmt.body.len() != 1 {
            break;
        }
        if matches!(stmt.body[0], Stmt::Return(_) | Stmt::Raise(_)) {
            guard_count += 1;
        }
    }
    if guard_count >= 3 {
        score += 0.25;
        signals.push("uniform guard clauses".to_string());
    }

    if !stats.store_names.is_empty() {
        let generic = stats
            .store_names
            .iter()
            .filter(|name| is_generic_name(name))
            .count();
        if generic as f64 / stats.store_names.len() as f64 >= 0.6 {
            score += 0.20;
            signals.push("generic variable naming".to_string());
        }
    }

    if body.len() >= 4 && stats.if_count as f64 / body.len() as f64 >= 0.4 {
        score += 0.20;
        signals.push("high defensive branch density".to_string());
    }

    if repetitive_error_literals(&stats.string_literals) {
        score += 0.15;
        signals.push("repetitive error messaging".to_string());
    }

    if let Some(Stmt::Return(ret)) = body.last() {
        if let Some(Expr::Name(name)) = ret.value.as_deref() {
            if is_generic_name(name.id.as_str()) {
                score += 0.15;
                signals.push("generic return pipeline".to_string());
            }
        }
    }

    if body.len() >= 12 && !stats.has_loop_or_try {
        score += 0.10;
        signals.push("long boilerplate flow".to_string());
    }

    (score, signals)
}

fn score_lexical(source: &str) -> (f64, Vec<String>) {
    let stripped = strip_comments(source);
    let statements = estimate_statements(source);
    let mut score = 0.0;
    let mut signals = Vec::new();

    let guard_count =
        GUARD_BLOCK_RE.find_iter(&stripped).count() + GUARD_INLINE_RE.find_iter(&stripped).count();
    if guard_count >= 3 {
        score += 0.25;
        signals.push("uniform guard clauses".to_string());
    }

    let declared: Vec<&str> = DECL_NAME_RE
        .captures_iter(&stripped)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();
    if !declared.is_empty() {
        let generic = declared.iter().filter(|name| is_generic_name(name)).count();
        if generic as f64 / declared.len() as f64 >= 0.6 {
            score += 0.20;
            signals.push("generic variable naming".to_string());
        }
    }

    if statements >= 4 {
        let if_count = IF_OPEN_RE.find_iter(&stripped).count();
        if if_count as f64 / statements as f64 >= 0.4 {
            score += 0.20;
            signals.push("high defensive branch density".to_string());
        }
    }

    let literals = string_literal_contents(&stripped);
    if repetitive_error_literals(&literals) {
        score += 0.15;
        signals.push("repetitive error messaging".to_string());
    }

    if let Some(caps) = RETURN_IDENT_RE.captures_iter(&stripped).last() {
        if caps.get(1).map(|m| is_generic_name(m.as_str())).unwrap_or(false) {
            score += 0.15;
            signals.push("generic return pipeline".to_string());
        }
    }

    if statements >= 12 && !LOOP_KEYWORD_RE.is_match(&stripped) {
        score += 0.10;
        signals.push("long boilerplate flow".to_string());
    }

    (score, signals)
}

/// Shift the structural score by what version control says about the entity.
/// Churny, multi-author, long-lived code argues against generation; a single
/// recent low-diversity introduction argues for it.
fn apply_git_adjustments(score: &mut f64, signals: &mut Vec<String>, evidence: &GitEvidence) {
    if !evidence.available {
        return;
    }
    let commit_count = evidence.commit_count.unwrap_or(0);

    if evidence.concentration.unwrap_or(0.0) >= 0.85 && commit_count <= 2 {
        *score += 0.10;
        signals.push("single-source commit concentration".to_string());
    }
    if let Some(age) = evidence.last_commit_age_days {
        if age <= 45 && commit_count <= 3 {
            *score += 0.05;
            signals.push("recent introduction window".to_string());
        }
    }
    if evidence.file_author_count <= 1 && evidence.file_commit_count <= 3 {
        *score += 0.05;
        signals.push("low-author diversity file".to_string());
    }
    if commit_count >= 6 {
        *score -= 0.10;
        signals.push("established revision history".to_string());
    }
    if evidence.author_count.unwrap_or(0) >= 3 {
        *score -= 0.10;
        signals.push("multi-author history".to_string());
    }
    if evidence.last_commit_age_days.unwrap_or(0) >= 365 {
        *score -= 0.05;
        signals.push("long-lived code".to_string());
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score one entity, returning `None` when it scores below the reporting
/// threshold or (for Python) when its slice cannot be re-parsed.
pub fn score_entity(
    entity: &Entity,
    evidence: Option<&GitEvidence>,
    cfg: &AnalysisConfig,
) -> Option<ProvenanceSignal> {
    let (mut score, mut signals) = match Language::from_path(&entity.file_path)? {
        Language::Python => {
            let func = first_function(&entity.source)?;
            score_python(&func)
        }
        Language::Lexical => score_lexical(&entity.source),
    };

    if let Some(evidence) = evidence {
        apply_git_adjustments(&mut score, &mut signals, evidence);
    }

    let score = round2(score.clamp(0.0, 0.99));
    if score < cfg.ai_threshold {
        return None;
    }
    let confidence = if score >= 0.8 {
        Confidence::High
    } else {
        Confidence::Medium
    };
    Some(ProvenanceSignal {
        entity_id: entity.id.clone(),
        probability: score,
        confidence,
        signals,
    })
}

/// Score every scanned entity, in entity order.
pub fn score_entities(
    entities: &[Entity],
    git_evidence: &BTreeMap<String, GitEvidence>,
    cfg: &AnalysisConfig,
) -> Vec<ProvenanceSignal> {
    entities
        .iter()
        .filter_map(|entity| score_entity(entity, git_evidence.get(&entity.id), cfg))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deterministic_entity_id;

    fn py_entity(name: &str, source: &str) -> Entity {
        Entity {
            id: deterministic_entity_id("svc/handlers.py", name, 1),
            file_path: "svc/handlers.py".to_string(),
            name: name.to_string(),
            qualified_name: format!("svc.handlers.{name}"),
            line_start: 1,
            line_end: source.lines().count() as u32,
            source: source.to_string(),
        }
    }

    fn js_entity(name: &str, source: &str) -> Entity {
        Entity {
            id: deterministic_entity_id("web/handlers.js", name, 1),
            file_path: "web/handlers.js".to_string(),
            name: name.to_string(),
            qualified_name: format!("web.handlers.{name}"),
            line_start: 1,
            line_end: source.lines().count() as u32,
            source: source.to_string(),
        }
    }

    const GENERATED_LOOKING: &str = "def process_request(request):\n    if request is None:\n        raise ValueError(\"invalid request error\")\n    if not request:\n        raise ValueError(\"invalid request error\")\n    if request == {}:\n        return None\n    data = request\n    result = data\n    return result";

    #[test]
    fn test_generated_looking_python_scores_above_threshold() {
        let entity = py_entity("process_request", GENERATED_LOOKING);
        let signal =
            score_entity(&entity, None, &AnalysisConfig::default()).expect("signal emitted");
        // guards 0.25 + generic naming 0.20 + defensive density 0.20 +
        // error messaging 0.15 + generic return 0.15
        assert!(signal.probability >= 0.8);
        assert_eq!(signal.confidence, Confidence::High);
        assert!(signal.signals.contains(&"uniform guard clauses".to_string()));
        assert!(signal
            .signals
            .contains(&"high defensive branch density".to_string()));
        assert!(signal.signals.contains(&"generic return pipeline".to_string()));
    }

    #[test]
    fn test_ordinary_python_below_threshold() {
        let source = "def interleave(left, right):\n    merged = []\n    for pair in zip(left, right):\n        merged.extend(pair)\n    return merged";
        let entity = py_entity("interleave", source);
        assert!(score_entity(&entity, None, &AnalysisConfig::default()).is_none());
    }

    #[test]
    fn test_guard_run_stops_at_first_non_guard() {
        // one guard, then an assignment, then more ifs: the run is length 1
        let source = "def check(value):\n    if value is None:\n        return None\n    data = value\n    if data:\n        return data\n    if not data:\n        return data\n    return data";
        let func = first_function(source).expect("parses");
        let (_, signals) = score_python(&func);
        assert!(!signals.contains(&"uniform guard clauses".to_string()));
    }

    #[test]
    fn test_repetitive_error_literals_rule() {
        let repeated = vec!["invalid input".to_string(), "invalid input".to_string()];
        assert!(repetitive_error_literals(&repeated));
        let varied = vec![
            "error parsing header".to_string(),
            "invalid checksum".to_string(),
            "failed to open socket".to_string(),
            "error code out of range".to_string(),
        ];
        assert!(!repetitive_error_literals(&varied));
        let unrelated = vec!["hello".to_string(), "hello".to_string()];
        assert!(!repetitive_error_literals(&unrelated));
    }

    #[test]
    fn test_lexical_rules_fire_on_generated_looking_js() {
        let source = "function handleRequest(request) {\n  if (request == null) { throw new Error('invalid request error'); }\n  if (!request.body) { throw new Error('invalid request error'); }\n  if (!request.user) { return null; }\n  const data = request.body;\n  const result = data;\n  return result;\n}";
        let entity = js_entity("handleRequest", source);
        let signal =
            score_entity(&entity, None, &AnalysisConfig::default()).expect("signal emitted");
        assert!(signal.signals.contains(&"uniform guard clauses".to_string()));
        assert!(signal.signals.contains(&"generic variable naming".to_string()));
        assert!(signal.probability >= 0.65);
    }

    #[test]
    fn test_git_adjustments_raise_and_lower() {
        let entity = py_entity("process_request", GENERATED_LOOKING);
        let fresh = GitEvidence {
            entity_id: entity.id.clone(),
            available: true,
            commit_count: Some(1),
            author_count: Some(1),
            concentration: Some(1.0),
            last_commit_age_days: Some(5),
            file_commit_count: 1,
            file_author_count: 1,
        };
        let seasoned = GitEvidence {
            commit_count: Some(9),
            author_count: Some(4),
            concentration: Some(0.3),
            last_commit_age_days: Some(700),
            file_commit_count: 40,
            file_author_count: 6,
            ..fresh.clone()
        };
        let cfg = AnalysisConfig::default();
        let boosted = score_entity(&entity, Some(&fresh), &cfg).expect("signal");
        let damped = score_entity(&entity, Some(&seasoned), &cfg).expect("signal");
        assert!(boosted.probability > damped.probability);
        // base 0.95 plus three positive adjustments saturates at the cap
        assert_eq!(boosted.probability, 0.99);
        assert!(boosted
            .signals
            .contains(&"single-source commit concentration".to_string()));
        assert!(damped.signals.contains(&"multi-author history".to_string()));
    }

    #[test]
    fn test_unavailable_evidence_leaves_score_unchanged() {
        let entity = py_entity("process_request", GENERATED_LOOKING);
        let unavailable = GitEvidence {
            entity_id: entity.id.clone(),
            available: false,
            commit_count: None,
            author_count: None,
            concentration: None,
            last_commit_age_days: None,
            file_commit_count: 0,
            file_author_count: 0,
        };
        let cfg = AnalysisConfig::default();
        let plain = score_entity(&entity, None, &cfg).expect("signal");
        let with_evidence = score_entity(&entity, Some(&unavailable), &cfg).expect("signal");
        assert_eq!(plain.probability, with_evidence.probability);
    }

    #[test]
    fn test_score_never_exceeds_cap() {
        let entity = py_entity("process_request", GENERATED_LOOKING);
        let fresh = GitEvidence {
            entity_id: entity.id.clone(),
            available: true,
            commit_count: Some(1),
            author_count: Some(1),
            concentration: Some(1.0),
            last_commit_age_days: Some(1),
            file_commit_count: 1,
            file_author_count: 1,
        };
        let signal =
            score_entity(&entity, Some(&fresh), &AnalysisConfig::default()).expect("signal");
        assert!(signal.probability <= 0.99);
    }
}
