// src/audit/mod.rs
// =============================================================================
// This module contains the per-page analysis pipeline.
//
// Submodules:
// - parser: turns HTML into a fixed PageModel (title, meta, headings, ...)
// - rules: evaluates the SEO rules against a PageModel
//
// The crawl scheduler calls `parse()` then `evaluate()` for every page it
// fetched successfully.
// =============================================================================

mod parser;
mod rules;

pub use parser::{parse, ParseError};
pub use rules::evaluate;
