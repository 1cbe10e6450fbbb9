//! # Entity Predicates
//!
//! Boolean checks over single entities, consumed by generic filter and
//! selection code that knows nothing about relations.

use crate::property::PropertyProvider;
use std::fmt;

/// A boolean check over one (possibly missing) entity.
pub trait EntityPredicate: Send + Sync {
    /// Evaluate the predicate. A missing entity is passed as `None`.
    fn check(&self, entity: Option<&dyn PropertyProvider>) -> bool;

    /// Short human readable description.
    fn description(&self) -> &str;
}

type CheckFn = dyn Fn(Option<&dyn PropertyProvider>) -> bool + Send + Sync;

/// A predicate backed by a closure.
pub struct FnPredicate {
    check: Box<CheckFn>,
    description: String,
}

impl FnPredicate {
    /// Wrap `check` as a predicate.
    pub fn new(
        description: impl Into<String>,
        check: impl Fn(Option<&dyn PropertyProvider>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            check: Box::new(check),
            description: description.into(),
        }
    }
}

impl EntityPredicate for FnPredicate {
    fn check(&self, entity: Option<&dyn PropertyProvider>) -> bool {
        (self.check)(entity)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for FnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate")
            .field("description", &self.description)
            .finish()
    }
}

/// Keep the items whose entity satisfies `predicate`, in input order.
pub fn filter<T>(
    items: impl IntoIterator<Item = T>,
    predicate: &dyn EntityPredicate,
    entity: impl Fn(&T) -> &dyn PropertyProvider,
) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| predicate.check(Some(entity(item))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyMap;
    use crate::{Property, property::PropertyOwner};

    #[test]
    fn fn_predicate_forwards_entity() {
        let has_key = FnPredicate::new("has key", |e| e.is_some_and(|e| e.property("k").is_some()));
        let map = PropertyMap::new();
        assert!(!has_key.check(Some(&map)));
        map.set_property("k", Property::new("v"));
        assert!(has_key.check(Some(&map)));
        assert!(!has_key.check(None));
        assert_eq!(has_key.description(), "has key");
    }

    #[test]
    fn filter_keeps_order() {
        let maps: Vec<(&str, PropertyMap)> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let map = PropertyMap::new();
                if name != "b" {
                    map.set_property("keep", Property::new("1"));
                }
                (name, map)
            })
            .collect();

        let keep = FnPredicate::new("keep", |e| e.is_some_and(|e| e.property("keep").is_some()));
        let kept = filter(&maps, &keep, |(_, m)| m as &dyn PropertyProvider);
        let names: Vec<&str> = kept.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
