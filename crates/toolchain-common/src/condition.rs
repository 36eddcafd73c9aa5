//! Condition transitions
//!
//! Conditions are an ordered set keyed by type. [`apply`] is a pure
//! transition: it never mutates its input, so status computation can be
//! tested apart from persistence.

use crate::crd::{Condition, ConditionStatus};

/// Apply `new` to `current`, returning the updated condition set
///
/// A condition of the same type is replaced in place; otherwise `new` is
/// appended. `last_transition_time` moves only when the status flips: if the
/// previous condition of that type had the same status, its timestamp is kept.
pub fn apply(current: &[Condition], new: Condition) -> Vec<Condition> {
    let mut updated = current.to_vec();
    match updated.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) => {
            let last_transition_time = if existing.status == new.status {
                existing.last_transition_time
            } else {
                new.last_transition_time
            };
            *existing = Condition {
                last_transition_time,
                ..new
            };
        }
        None => updated.push(new),
    }
    updated
}

/// True when applying `new` would leave `current` unchanged
pub fn is_unchanged(current: &[Condition], new: &Condition) -> bool {
    find(current, &new.type_).is_some_and(|c| c.same_state(new))
}

/// Find the condition of the given type
pub fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True when a condition of the given type exists with status `True`
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    find(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}
