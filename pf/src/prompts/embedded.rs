//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

/// Market analyst role, produces the research brief as JSON
pub const ANALYST: &str = include_str!("../../prompts/analyst.pmt");

/// Strategist role, plan sections 1 to 5
pub const STRATEGIST_PART1: &str = include_str!("../../prompts/strategist-part1.pmt");

/// Strategist role, plan sections 6 to 10
pub const STRATEGIST_PART2: &str = include_str!("../../prompts/strategist-part2.pmt");

/// Reviewer role, produces the critique as JSON
pub const REVIEWER: &str = include_str!("../../prompts/reviewer.pmt");

/// Finalizer role, folds the critique back into the plan
pub const FINALIZER: &str = include_str!("../../prompts/finalizer.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "analyst" => Some(ANALYST),
        "strategist-part1" => Some(STRATEGIST_PART1),
        "strategist-part2" => Some(STRATEGIST_PART2),
        "reviewer" => Some(REVIEWER),
        "finalizer" => Some(FINALIZER),
        _ => None,
    }
}
