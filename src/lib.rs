//! codewaste - static signals of probable AI-generated and duplicated code
//!
//! Scans Python and JavaScript/TypeScript sources, extracts function
//! entities, scores each for AI-generation likelihood, detects structural
//! duplication through canonicalized signatures, and correlates the results
//! with version control and runtime invocation evidence. Everything is
//! read-only and advisory.

pub mod cli;
pub mod config;
pub mod duplication;
pub mod engine;
pub mod gitinfo;
pub mod history;
pub mod models;
pub mod provenance;
pub mod reporters;
pub mod runtime;
pub mod scanner;
