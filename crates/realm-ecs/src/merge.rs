//! Deep-merge rules shared by store patches and template inheritance.
//!
//! - Objects merge key-by-key, recursively. Keys only in the base survive.
//! - Arrays are replaced wholesale, never concatenated.
//! - Scalars (and type mismatches) are replaced by the overlay.
//!
//! The overlay is cloned into the base, so the result never aliases the
//! overlay's data.

use serde_json::Value;

use crate::entity::Components;

/// Merge `overlay` into `base` in place.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Merge a component bag into another, component by component.
pub fn merge_components(base: &mut Components, overlay: &Components) {
    for (name, value) in overlay {
        match base.get_mut(name) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(name.clone(), value.clone());
            }
        }
    }
}

/// `base` merged with `overlay`, leaving both inputs untouched.
pub fn merged(base: &Components, overlay: &Components) -> Components {
    let mut out = base.clone();
    merge_components(&mut out, overlay);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_objects_merge() {
        let mut base = json!({"stats": {"hp": 10, "mp": 5}, "name": "x"});
        deep_merge(&mut base, &json!({"stats": {"hp": 20}}));
        assert_eq!(base, json!({"stats": {"hp": 20, "mp": 5}, "name": "x"}));
    }

    #[test]
    fn arrays_replace() {
        let mut base = json!({"tags": [1, 2, 3]});
        deep_merge(&mut base, &json!({"tags": [9]}));
        assert_eq!(base, json!({"tags": [9]}));
    }

    #[test]
    fn type_mismatch_replaces() {
        let mut base = json!({"a": {"b": 1}});
        deep_merge(&mut base, &json!({"a": 7}));
        assert_eq!(base, json!({"a": 7}));

        let mut base = json!(5);
        deep_merge(&mut base, &json!({"x": 1}));
        assert_eq!(base, json!({"x": 1}));
    }

    #[test]
    fn merge_components_adds_and_merges() {
        let mut base = Components::new();
        base.insert("stats".into(), json!({"hp": 1, "mp": 2}));
        let mut overlay = Components::new();
        overlay.insert("stats".into(), json!({"mp": 3}));
        overlay.insert("loot".into(), json!(["coin"]));

        let out = merged(&base, &overlay);
        assert_eq!(out["stats"], json!({"hp": 1, "mp": 3}));
        assert_eq!(out["loot"], json!(["coin"]));
        // Inputs untouched.
        assert_eq!(base["stats"], json!({"hp": 1, "mp": 2}));
    }
}
