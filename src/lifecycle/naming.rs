//! Unique session-name generation (§4.2.1).
//!
//! Workspace names derive from a fixed vocabulary of short identifiers.
//! Three escalating strategies are tried in order: plain picks, then
//! adjective-combined picks, then a timestamp fallback that is unique by
//! construction.

use crate::utils::get_now;

const MAX_PLAIN_ATTEMPTS: usize = 20;
const MAX_ADJECTIVE_ATTEMPTS: usize = 50;

/// Short (≤7 char) identifiers used as bare workspace names.
pub const IDENTIFIERS: &[&str] = &[
    "felix", "milo", "leo", "tom", "oscar", "jasper", "simba", "loki", "ziggy", "gus", "max",
    "rex", "otto", "moss", "finn", "remy", "pip", "coco", "ruby", "nova",
];

/// Adjectives combined with an identifier when plain picks all collide.
pub const ADJECTIVES: &[&str] = &[
    "fuzzy", "swift", "brave", "quiet", "bold", "eager", "tidy", "spry", "keen", "sunny",
];

/// A source of "does this branch already exist" checks, implemented by the
/// Gateway against a repository path in production and by a fixed set in
/// tests.
pub trait NameAvailability {
    fn branch_exists(&self, branch: &str) -> bool;
}

/// Generate a unique workspace name not already used as `<namespace>/<name>`
/// in the repository checked by `availability`.
///
/// Picks are deterministic given `pick_index` (an externally supplied
/// sequence index, e.g. `0, 1, 2, ...`), so callers control retry order
/// without this function reaching for a random source directly.
pub fn generate_session_name(namespace: &str, availability: &impl NameAvailability, mut pick_index: impl FnMut() -> usize) -> String {
    for _ in 0..MAX_PLAIN_ATTEMPTS {
        let candidate = IDENTIFIERS[pick_index() % IDENTIFIERS.len()];
        let branch = format!("{namespace}/{candidate}");
        if !availability.branch_exists(&branch) {
            return candidate.to_string();
        }
    }

    for _ in 0..MAX_ADJECTIVE_ATTEMPTS {
        let adjective = ADJECTIVES[pick_index() % ADJECTIVES.len()];
        let identifier = IDENTIFIERS[pick_index() % IDENTIFIERS.len()];
        let candidate = format!("{adjective}-{identifier}");
        let branch = format!("{namespace}/{candidate}");
        if !availability.branch_exists(&branch) {
            return candidate;
        }
    }

    format!("special-{}", get_now())
}

/// Whether `name` is a member of the identifier vocabulary, an
/// adjective-identifier combination, or a `special-<seconds>` fallback
/// (P4).
pub fn is_generated_name(name: &str) -> bool {
    if IDENTIFIERS.contains(&name) {
        return true;
    }
    if let Some((adjective, identifier)) = name.split_once('-') {
        if ADJECTIVES.contains(&adjective) && IDENTIFIERS.contains(&identifier) {
            return true;
        }
    }
    if let Some(rest) = name.strip_prefix("special-") {
        return rest.parse::<u64>().is_ok();
    }
    false
}
