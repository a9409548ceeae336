//! Source/target type compatibility
//!
//! A source type is compatible with a target when some target candidate is the
//! same type, when both reduce to the same FHIRPath system type, or when a
//! typed group maps one onto the other.

use crate::details::PropertyOrTypeDetails;
use crate::groups::TypedGroupIndex;
use crate::system_types::{canonical_eq, system_substitute};
use std::fmt;

/// A source candidate with no matching target candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedPair {
    pub source: String,
    pub target: String,
}

impl fmt::Display for UnmatchedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` -> `{}`", self.source, self.target)
    }
}

/// Find the source candidates that map to no target candidate
///
/// Returns one pair per unmatched source candidate, naming the target's
/// candidates. Nothing is reported when either side has no candidates.
pub fn check_type_compatibility(
    source: &PropertyOrTypeDetails,
    target: &PropertyOrTypeDetails,
    typed_groups: &TypedGroupIndex,
) -> Vec<UnmatchedPair> {
    let sources = source.candidate_urls();
    let targets = target.candidate_urls();
    if sources.is_empty() || targets.is_empty() {
        return Vec::new();
    }

    sources
        .iter()
        .filter(|src| !targets.iter().any(|tgt| compatible(src, tgt, typed_groups)))
        .map(|src| UnmatchedPair {
            source: src.clone(),
            target: targets.join(" | "),
        })
        .collect()
}

fn compatible(source: &str, target: &str, typed_groups: &TypedGroupIndex) -> bool {
    if canonical_eq(source, target) {
        return true;
    }

    let source_system = system_substitute(source);
    let target_system = system_substitute(target);
    if let (Some(s), Some(t)) = (&source_system, &target_system) {
        if s == t {
            return true;
        }
    }

    typed_groups.contains(source, target)
        || source_system.is_some_and(|s| typed_groups.contains(&s, target))
}

/// Join unmatched pairs for a diagnostic message
pub fn describe_unmatched(pairs: &[UnmatchedPair]) -> String {
    pairs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
