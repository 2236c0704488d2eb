//! Candidate evaluation: weighted-coefficient scoring and ranked selection of
//! the next qualifications to process.

mod scoring;
mod selection;

pub use scoring::{calculate_scoring, matched_coefficients, scoring_required, value_matches};
pub use selection::{pending_for_processing, rank_for_selection};
