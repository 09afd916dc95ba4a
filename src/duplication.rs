//! Canonicalization-based duplication detection
//!
//! Each entity's first function body is rewritten into a syntax-invariant
//! signature: parameter, variable, and attribute names collapse to single
//! placeholder tokens and literals are bucketed by kind (strings to one
//! placeholder, numbers to another). Python entities are canonicalized by
//! serializing the rewritten syntax tree; lexical entities get the
//! structurally equivalent transform applied directly on text. Retained
//! signatures are then compared pairwise with an LCS-derived similarity
//! ratio. The pairwise pass is quadratic; the minimum-statement and
//! signature-length gates keep the candidate set small.

use crate::config::AnalysisConfig;
use crate::models::{Confidence, DuplicationPair, Entity};
use crate::scanner::javascript::{
    estimate_statements, is_js_keyword, replace_string_literals, strip_comments,
};
use crate::scanner::python::{first_function, PyFunction};
use crate::scanner::Language;
use lazy_static::lazy_static;
use regex::Regex;
use rustpython_parser::ast::{Arguments, Constant, ExceptHandler, Expr, Stmt};

lazy_static! {
    static ref NUMBER_TOKEN_RE: Regex = Regex::new(r"\b\d[\w]*(?:\.\d+)?\b").unwrap();
    static ref IDENT_TOKEN_RE: Regex = Regex::new(r"[A-Za-z_$][\w$]*").unwrap();
}

/// A derived, syntax-invariant representation of one entity's function body.
/// Recomputed per run; never persisted.
struct CanonicalSignature {
    entity_id: String,
    text: String,
    statements: usize,
}

/// Serialize a Python function into canonical form via recursive descent,
/// applying the placeholder rewrites as the tree is written out.
struct Canon {
    out: String,
}

impl Canon {
    fn render(func: &PyFunction) -> String {
        let mut canon = Canon { out: String::new() };
        match func {
            PyFunction::Sync(_) => canon.out.push_str("def"),
            PyFunction::Async(_) => canon.out.push_str("adef"),
        }
        canon.args(func.args());
        canon.suite(func.body());
        canon.out
    }

    fn push(&mut self, token: &str) {
        self.out.push_str(token);
    }

    fn args(&mut self, args: &Arguments) {
        self.push("(");
        for _ in args.posonlyargs.iter().chain(args.args.iter()) {
            self.push("arg,");
        }
        if args.vararg.is_some() {
            self.push("*arg,");
        }
        for _ in &args.kwonlyargs {
            self.push("arg,");
        }
        if args.kwarg.is_some() {
            self.push("**arg,");
        }
        self.push(")");
    }

    fn suite(&mut self, suite: &[Stmt]) {
        self.push("[");
        for stmt in suite {
            self.stmt(stmt);
            self.push(";");
        }
        self.push("]");
    }

    fn opt_expr(&mut self, expr: Option<&Expr>) {
        match expr {
            Some(expr) => self.expr(expr),
            None => self.push("_"),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.expr(expr);
            self.push(",");
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(func) => {
                self.push("def");
                self.args(&func.args);
                self.suite(&func.body);
            }
            Stmt::AsyncFunctionDef(func) => {
                self.push("adef");
                self.args(&func.args);
                self.suite(&func.body);
            }
            Stmt::ClassDef(class) => {
                self.push("class");
                self.suite(&class.body);
            }
            Stmt::Return(ret) => {
                self.push("ret(");
                self.opt_expr(ret.value.as_deref());
                self.push(")");
            }
            Stmt::Delete(del) => {
                self.push("del(");
                self.exprs(&del.targets);
                self.push(")");
            }
            Stmt::Assign(assign) => {
                self.push("=(");
                self.exprs(&assign.targets);
                self.push(";");
                self.expr(&assign.value);
                self.push(")");
            }
            Stmt::AugAssign(assign) => {
                self.push(&format!("aug{:?}(", assign.op));
                self.expr(&assign.target);
                self.push(";");
                self.expr(&assign.value);
                self.push(")");
            }
            Stmt::AnnAssign(assign) => {
                self.push("ann(");
                self.expr(&assign.target);
                self.push(";");
                self.opt_expr(assign.value.as_deref());
                self.push(")");
            }
            Stmt::For(stmt) => {
                self.push("for(");
                self.expr(&stmt.target);
                self.push(";");
                self.expr(&stmt.iter);
                self.push(")");
                self.suite(&stmt.body);
                self.suite(&stmt.orelse);
            }
            Stmt::AsyncFor(stmt) => {
                self.push("afor(");
                self.expr(&stmt.target);
                self.push(";");
                self.expr(&stmt.iter);
                self.push(")");
                self.suite(&stmt.body);
                self.suite(&stmt.orelse);
            }
            Stmt::While(stmt) => {
                self.push("while(");
                self.expr(&stmt.test);
                self.push(")");
                self.suite(&stmt.body);
                self.suite(&stmt.orelse);
            }
            Stmt::If(stmt) => {
                self.push("if(");
                self.expr(&stmt.test);
                self.push(")");
                self.suite(&stmt.body);
                self.suite(&stmt.orelse);
            }
            Stmt::With(stmt) => {
                self.push("with(");
                for item in &stmt.items {
                    self.expr(&item.context_expr);
                    self.push(":");
                    self.opt_expr(item.optional_vars.as_deref());
                    self.push(",");
                }
                self.push(")");
                self.suite(&stmt.body);
            }
            Stmt::AsyncWith(stmt) => {
                self.push("awith(");
                for item in &stmt.items {
                    self.expr(&item.context_expr);
                    self.push(":");
                    self.opt_expr(item.optional_vars.as_deref());
                    self.push(",");
                }
                self.push(")");
                self.suite(&stmt.body);
            }
            Stmt::Match(stmt) => {
                self.push("match(");
                self.expr(&stmt.subject);
                self.push(")");
                for case in &stmt.cases {
                    self.push("case");
                    self.suite(&case.body);
                }
            }
            Stmt::Raise(stmt) => {
                self.push("raise(");
                self.opt_expr(stmt.exc.as_deref());
                self.push(";");
                self.opt_expr(stmt.cause.as_deref());
                self.push(")");
            }
            Stmt::Try(stmt) => {
                self.push("try");
                self.suite(&stmt.body);
                for handler in &stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    self.push("except(");
                    self.opt_expr(handler.type_.as_deref());
                    self.push(")");
                    self.suite(&handler.body);
                }
                self.suite(&stmt.orelse);
                self.suite(&stmt.finalbody);
            }
            Stmt::Assert(stmt) => {
                self.push("assert(");
                self.expr(&stmt.test);
                self.push(";");
                self.opt_expr(stmt.msg.as_deref());
                self.push(")");
            }
            Stmt::Import(_) => self.push("import"),
            Stmt::ImportFrom(_) => self.push("importfrom"),
            Stmt::Global(_) => self.push("global"),
            Stmt::Nonlocal(_) => self.push("nonlocal"),
            Stmt::Expr(stmt) => {
                self.push("expr(");
                self.expr(&stmt.value);
                self.push(")");
            }
            Stmt::Pass(_) => self.push("pass"),
            Stmt::Break(_) => self.push("break"),
            Stmt::Continue(_) => self.push("continue"),
            _ => self.push("stmt"),
        }
    }

    fn constant(&mut self, value: &Constant) {
        match value {
            Constant::Str(_) => self.push("STR"),
            Constant::Int(_) | Constant::Float(_) | Constant::Complex { .. } => self.push("NUM"),
            Constant::Bool(true) => self.push("True"),
            Constant::Bool(false) => self.push("False"),
            Constant::None => self.push("None"),
            Constant::Ellipsis => self.push("..."),
            Constant::Bytes(_) => self.push("BYTES"),
            Constant::Tuple(_) => self.push("CTUPLE"),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            // All variable references collapse to one placeholder token
            Expr::Name(_) => self.push("var"),
            // Attribute names collapse too; only the access shape survives
            Expr::Attribute(attr) => {
                self.push("attr(");
                self.expr(&attr.value);
                self.push(")");
            }
            Expr::Constant(constant) => self.constant(&constant.value),
            Expr::Call(call) => {
                self.push("call(");
                self.expr(&call.func);
                self.push(";");
                self.exprs(&call.args);
                self.push(";");
                for keyword in &call.keywords {
                    match &keyword.arg {
                        Some(name) => self.push(&format!("{}=", name.as_str())),
                        None => self.push("**"),
                    }
                    self.expr(&keyword.value);
                    self.push(",");
                }
                self.push(")");
            }
            Expr::BinOp(op) => {
                self.push(&format!("bin{:?}(", op.op));
                self.expr(&op.left);
                self.push(";");
                self.expr(&op.right);
                self.push(")");
            }
            Expr::BoolOp(op) => {
                self.push(&format!("bool{:?}(", op.op));
                self.exprs(&op.values);
                self.push(")");
            }
            Expr::UnaryOp(op) => {
                self.push(&format!("un{:?}(", op.op));
                self.expr(&op.operand);
                self.push(")");
            }
            Expr::Compare(cmp) => {
                self.push("cmp(");
                self.expr(&cmp.left);
                for (op, comparator) in cmp.ops.iter().zip(cmp.comparators.iter()) {
                    self.push(&format!(";{:?};", op));
                    self.expr(comparator);
                }
                self.push(")");
            }
            Expr::Subscript(sub) => {
                self.push("sub(");
                self.expr(&sub.value);
                self.push(";");
                self.expr(&sub.slice);
                self.push(")");
            }
            Expr::Slice(slice) => {
                self.push("slice(");
                self.opt_expr(slice.lower.as_deref());
                self.push(";");
                self.opt_expr(slice.upper.as_deref());
                self.push(";");
                self.opt_expr(slice.step.as_deref());
                self.push(")");
            }
            Expr::List(list) => {
                self.push("list(");
                self.exprs(&list.elts);
                self.push(")");
            }
            Expr::Tuple(tuple) => {
                self.push("tuple(");
                self.exprs(&tuple.elts);
                self.push(")");
            }
            Expr::Set(set) => {
                self.push("set(");
                self.exprs(&set.elts);
                self.push(")");
            }
            Expr::Dict(dict) => {
                self.push("dict(");
                for (key, value) in dict.keys.iter().zip(dict.values.iter()) {
                    self.opt_expr(key.as_ref());
                    self.push(":");
                    self.expr(value);
                    self.push(",");
                }
                self.push(")");
            }
            Expr::IfExp(ifexp) => {
                self.push("ifexp(");
                self.expr(&ifexp.test);
                self.push(";");
                self.expr(&ifexp.body);
                self.push(";");
                self.expr(&ifexp.orelse);
                self.push(")");
            }
            Expr::Lambda(lambda) => {
                self.push("lambda");
                self.args(&lambda.args);
                self.expr(&lambda.body);
            }
            Expr::Await(inner) => {
                self.push("await(");
                self.expr(&inner.value);
                self.push(")");
            }
            Expr::Yield(inner) => {
                self.push("yield(");
                self.opt_expr(inner.value.as_deref());
                self.push(")");
            }
            Expr::YieldFrom(inner) => {
                self.push("yieldfrom(");
                self.expr(&inner.value);
                self.push(")");
            }
            Expr::NamedExpr(named) => {
                self.push("named(");
                self.expr(&named.target);
                self.push(";");
                self.expr(&named.value);
                self.push(")");
            }
            Expr::Starred(starred) => {
                self.push("star(");
                self.expr(&starred.value);
                self.push(")");
            }
            Expr::JoinedStr(joined) => {
                self.push("fstr(");
                self.exprs(&joined.values);
                self.push(")");
            }
            Expr::FormattedValue(fv) => {
                self.push("fv(");
                self.expr(&fv.value);
                self.push(")");
            }
            Expr::ListComp(comp) => {
                self.push("lcomp(");
                self.expr(&comp.elt);
                self.comprehensions(&comp.generators);
                self.push(")");
            }
            Expr::SetComp(comp) => {
                self.push("scomp(");
                self.expr(&comp.elt);
                self.comprehensions(&comp.generators);
                self.push(")");
            }
            Expr::GeneratorExp(comp) => {
                self.push("gcomp(");
                self.expr(&comp.elt);
                self.comprehensions(&comp.generators);
                self.push(")");
            }
            Expr::DictComp(comp) => {
                self.push("dcomp(");
                self.expr(&comp.key);
                self.push(":");
                self.expr(&comp.value);
                self.comprehensions(&comp.generators);
                self.push(")");
            }
            _ => self.push("e"),
        }
    }

    fn comprehensions(&mut self, generators: &[rustpython_parser::ast::Comprehension]) {
        for gen in generators {
            self.push(";gen(");
            self.expr(&gen.target);
            self.push(";");
            self.expr(&gen.iter);
            self.push(";");
            self.exprs(&gen.ifs);
            self.push(")");
        }
    }
}

/// Text-level canonicalization for lexically-scanned entities: strip
/// comments, bucket string and numeric literals, collapse every
/// non-keyword identifier to one placeholder, normalize whitespace.
fn canonicalize_lexical(source: &str) -> String {
    let no_comments = strip_comments(source);
    let no_strings = replace_string_literals(&no_comments, "STR");
    let no_numbers = NUMBER_TOKEN_RE.replace_all(&no_strings, "NUM");
    let collapsed = IDENT_TOKEN_RE.replace_all(&no_numbers, |caps: &regex::Captures| {
        let word = caps.get(0).expect("token").as_str();
        if is_js_keyword(word) || word == "STR" || word == "NUM" {
            word.to_string()
        } else {
            "id".to_string()
        }
    });
    collapsed.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn signature_for(entity: &Entity) -> Option<CanonicalSignature> {
    match Language::from_path(&entity.file_path) {
        Some(Language::Python) => {
            let func = first_function(&entity.source)?;
            Some(CanonicalSignature {
                entity_id: entity.id.clone(),
                statements: func.body().len(),
                text: Canon::render(&func),
            })
        }
        Some(Language::Lexical) => Some(CanonicalSignature {
            entity_id: entity.id.clone(),
            statements: estimate_statements(&entity.source),
            text: canonicalize_lexical(&entity.source),
        }),
        None => None,
    }
}

/// Compute length of longest common subsequence.
/// Rolling two-row array keeps memory at O(n) instead of O(mn).
fn longest_common_subsequence_length(a: &str, b: &str) -> usize {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let n = b_bytes.len();

    let mut prev = vec![0usize; n + 1];
    let mut curr = vec![0usize; n + 1];

    for i in 1..=a_bytes.len() {
        for j in 1..=n {
            if a_bytes[i - 1] == b_bytes[j - 1] {
                curr[j] = prev[j - 1] + 1;
            } else {
                curr[j] = prev[j].max(curr[j - 1]);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
        curr.fill(0);
    }

    prev[n]
}

/// Similarity ratio in [0, 1], symmetric in its arguments.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let lcs_len = longest_common_subsequence_length(a, b);
    (2.0 * lcs_len as f64) / (a.len() + b.len()) as f64
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Find all near-duplicate pairs at or above the enabled thresholds, sorted
/// by similarity descending (stable, so ties keep discovery order).
pub fn detect_duplication_pairs(entities: &[Entity], cfg: &AnalysisConfig) -> Vec<DuplicationPair> {
    // Short bodies produce false-positive high-similarity matches; both gates
    // run before the quadratic pass.
    let signatures: Vec<CanonicalSignature> = entities
        .iter()
        .filter_map(signature_for)
        .filter(|sig| {
            sig.statements >= cfg.min_dup_body_statements
                && sig.text.len() >= cfg.min_dup_signature_chars
        })
        .collect();

    let mut pairs = Vec::new();
    for (index_a, sig_a) in signatures.iter().enumerate() {
        for sig_b in signatures.iter().skip(index_a + 1) {
            let ratio = similarity_ratio(&sig_a.text, &sig_b.text);

            let confidence = if ratio >= cfg.dup_high_threshold {
                Some(Confidence::High)
            } else if cfg.include_medium_duplication && ratio >= cfg.dup_medium_threshold {
                Some(Confidence::Medium)
            } else {
                None
            };

            if let Some(confidence) = confidence {
                pairs.push(DuplicationPair {
                    entity_a: sig_a.entity_id.clone(),
                    entity_b: sig_b.entity_id.clone(),
                    similarity: round3(ratio),
                    confidence,
                });
            }
        }
    }

    pairs.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deterministic_entity_id;

    fn py_entity(id_seed: &str, source: &str) -> Entity {
        Entity {
            id: deterministic_entity_id("pkg/mod.py", id_seed, 1),
            file_path: "pkg/mod.py".to_string(),
            name: id_seed.to_string(),
            qualified_name: format!("pkg.mod.{id_seed}"),
            line_start: 1,
            line_end: source.lines().count() as u32,
            source: source.to_string(),
        }
    }

    fn relaxed_config() -> AnalysisConfig {
        AnalysisConfig {
            min_dup_signature_chars: 0,
            ..AnalysisConfig::default()
        }
    }

    const VALIDATE_A: &str = "def validate_order_request(payload):\n    if payload is None:\n        raise ValueError(\"invalid payload\")\n    data = payload\n    result = {}\n    result[\"order_id\"] = data[\"order_id\"]\n    return result";

    const VALIDATE_B: &str = "def validate_order_payload(data):\n    if data is None:\n        raise ValueError(\"bad input\")\n    incoming = data\n    response = {}\n    response[\"order_id\"] = incoming[\"order_id\"]\n    return response";

    #[test]
    fn test_renamed_functions_canonicalize_identically() {
        let sig_a = signature_for(&py_entity("a", VALIDATE_A)).expect("signature");
        let sig_b = signature_for(&py_entity("b", VALIDATE_B)).expect("signature");
        assert_eq!(sig_a.text, sig_b.text);
        assert_eq!(sig_a.statements, 6);
    }

    #[test]
    fn test_high_pair_reported_for_near_identical_bodies() {
        let entities = vec![py_entity("a", VALIDATE_A), py_entity("b", VALIDATE_B)];
        let pairs = detect_duplication_pairs(&entities, &relaxed_config());
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].similarity >= 0.9);
        assert_eq!(pairs[0].confidence, Confidence::High);
        assert_eq!(pairs[0].entity_a, entities[0].id);
        assert_eq!(pairs[0].entity_b, entities[1].id);
    }

    #[test]
    fn test_short_bodies_excluded_by_statement_gate() {
        let short = "def passthrough(flag):\n    if flag:\n        return True\n    return False";
        let entities = vec![py_entity("a", short), py_entity("b", short)];
        // bodies have 2 top-level statements; minimum is 3
        let pairs = detect_duplication_pairs(&entities, &relaxed_config());
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_signature_length_gate() {
        let entities = vec![py_entity("a", VALIDATE_A), py_entity("b", VALIDATE_B)];
        let cfg = AnalysisConfig {
            min_dup_signature_chars: 10_000,
            ..AnalysisConfig::default()
        };
        assert!(detect_duplication_pairs(&entities, &cfg).is_empty());
    }

    #[test]
    fn test_medium_tier_only_when_enabled() {
        let variant = "def validate_order_extra(data):\n    if data is None:\n        raise ValueError(\"bad\")\n    checked = data\n    response = {}\n    response[\"order_id\"] = checked[\"order_id\"]\n    response[\"extra\"] = len(checked)\n    while checked:\n        break\n    return response";
        let entities = vec![py_entity("a", VALIDATE_A), py_entity("b", variant)];

        let strict = AnalysisConfig {
            min_dup_signature_chars: 0,
            dup_high_threshold: 0.99,
            ..AnalysisConfig::default()
        };
        assert!(detect_duplication_pairs(&entities, &strict).is_empty());

        let with_medium = AnalysisConfig {
            min_dup_signature_chars: 0,
            dup_high_threshold: 0.99,
            dup_medium_threshold: 0.6,
            include_medium_duplication: true,
            ..AnalysisConfig::default()
        };
        let pairs = detect_duplication_pairs(&entities, &with_medium);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_similarity_ratio_symmetric() {
        let a = "def(arg,)[ret(var);]";
        let b = "def(arg,)[ret(NUM);]";
        assert!((similarity_ratio(a, b) - similarity_ratio(b, a)).abs() < f64::EPSILON);
        assert_eq!(similarity_ratio(a, a), 1.0);
        assert_eq!(similarity_ratio("", "x"), 0.0);
    }

    #[test]
    fn test_lexical_canonicalization_collapses_names() {
        let js_a = "function sum(items) {\n  let total = 0;\n  for (const item of items) {\n    total += item.price;\n  }\n  return total;\n}";
        let js_b = "function tally(rows) {\n  let acc = 0;\n  for (const row of rows) {\n    acc += row.cost;\n  }\n  return acc;\n}";
        assert_eq!(canonicalize_lexical(js_a), canonicalize_lexical(js_b));
    }

    #[test]
    fn test_lexical_literals_bucketed() {
        let canonical = canonicalize_lexical("const msg = 'hello'; const n = 42;");
        assert!(canonical.contains("STR"));
        assert!(canonical.contains("NUM"));
        assert!(!canonical.contains("hello"));
        assert!(!canonical.contains("42"));
    }

    #[test]
    fn test_entities_without_function_body_skipped() {
        let entities = vec![py_entity("a", "x = 1"), py_entity("b", VALIDATE_A)];
        let pairs = detect_duplication_pairs(&entities, &relaxed_config());
        assert!(pairs.is_empty());
    }
}
