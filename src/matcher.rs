//! Trigger matching - resolves recognized text to an action definition
//!
//! Strict first-match: actions are scanned in file order and, within an
//! action, triggers in file order. The first trigger that is a substring of
//! the lowercased text wins, regardless of how specific a later one is.

use crate::registry::{ActionDefinition, Registry};
use std::sync::Arc;

/// A resolved action and the trigger that selected it
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub action: &'a ActionDefinition,
    pub trigger: &'a str,
}

#[derive(Clone)]
pub struct Matcher {
    registry: Arc<Registry>,
}

impl Matcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolve(&self, text: &str) -> Option<&ActionDefinition> {
        self.resolve_with_trigger(text).map(|m| m.action)
    }

    pub fn resolve_with_trigger(&self, text: &str) -> Option<Match<'_>> {
        let text = text.to_lowercase();
        self.registry.actions().iter().find_map(|action| {
            action
                .triggers
                .iter()
                .find(|trigger| text.contains(trigger.as_str()))
                .map(|trigger| Match {
                    action,
                    trigger: trigger.as_str(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Params;

    fn def(name: &str, triggers: &[&str]) -> ActionDefinition {
        ActionDefinition {
            name: name.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            action: "say_text".to_string(),
            params: Params::new(),
        }
    }

    fn matcher(defs: Vec<ActionDefinition>) -> Matcher {
        Matcher::new(Arc::new(Registry::from_actions(defs)))
    }

    #[test]
    fn test_substring_anywhere() {
        let m = matcher(vec![def("say_hello", &["hello camcookie"])]);
        let hit = m.resolve("oh hello camcookie there").unwrap();
        assert_eq!(hit.name, "say_hello");
        assert!(m.resolve("hello camcookie").is_some());
        assert!(m.resolve("hello cam cookie").is_none());
    }

    #[test]
    fn test_case_insensitive() {
        let m = matcher(vec![def("a", &["Open Browser"])]);
        assert!(m.resolve("OPEN BROWSER").is_some());
        assert!(m.resolve("please open browser now").is_some());
    }

    #[test]
    fn test_first_match_wins_over_specific() {
        let m = matcher(vec![def("a", &["open"]), def("b", &["open browser"])]);
        assert_eq!(m.resolve("open browser please").unwrap().name, "a");
    }

    #[test]
    fn test_later_action_when_earlier_misses() {
        let m = matcher(vec![def("a", &["close"]), def("b", &["open browser"])]);
        assert_eq!(m.resolve("open browser please").unwrap().name, "b");
    }

    #[test]
    fn test_trigger_order_within_action() {
        let m = matcher(vec![def("a", &["browser", "open"])]);
        let hit = m.resolve_with_trigger("open browser").unwrap();
        assert_eq!(hit.trigger, "browser");
    }

    #[test]
    fn test_no_match() {
        let m = matcher(vec![def("a", &["hello"])]);
        assert!(m.resolve("turn off the lights").is_none());
        assert!(m.resolve("").is_none());
    }

    #[test]
    fn test_deterministic() {
        let m = matcher(vec![def("a", &["x"]), def("b", &["y"]), def("c", &["x y"])]);
        let first = m.resolve("x y").map(|d| d.name.clone());
        for _ in 0..100 {
            assert_eq!(m.resolve("x y").map(|d| d.name.clone()), first);
        }
    }
}
