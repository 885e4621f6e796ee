//! Tag selection over the validator registry

use crate::log_debug;
use crate::registry::{Validator, ValidatorRegistry};
use std::collections::BTreeSet;

/// Candidates chosen for one validation call, in discovery order
#[derive(Debug)]
pub struct Selection<'r> {
    pub candidates: Vec<&'r Validator>,
    /// Requested tags no validator carries
    pub unmatched: Vec<String>,
}

impl Selection<'_> {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// An empty request selects every validator. Otherwise the union of the validators
/// carrying any requested tag, each once.
pub fn select<'r>(registry: &'r ValidatorRegistry, tags: &[String]) -> Selection<'r> {
    if tags.is_empty() {
        return Selection {
            candidates: registry.validators().iter().collect(),
            unmatched: Vec::new(),
        };
    }

    let mut positions = BTreeSet::new();
    let mut unmatched = Vec::new();
    for tag in tags {
        let found = registry.positions_for_tag(tag);
        if found.is_empty() {
            log_debug!("Requested tag matches no validator", "tag" => tag);
            if !unmatched.contains(tag) {
                unmatched.push(tag.clone());
            }
        }
        positions.extend(found.iter().copied());
    }

    let validators = registry.validators();
    Selection {
        candidates: positions.into_iter().map(|p| &validators[p]).collect(),
        unmatched,
    }
}
