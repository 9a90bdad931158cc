//! Formats and classification rules of one sync group.

use crate::error::ProtocolResult;
use crate::format::{FieldListFormat, FormatDelegate, FormatRegistry};
use crate::rules::ClassifierRules;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything the classifier needs to interpret payloads: the registered
/// format delegates and a rule table per format.
///
/// Built once and handed to the coordinator. [`FieldListFormat`] is always
/// registered.
#[derive(Debug, Clone)]
pub struct Environment {
    formats: FormatRegistry,
    rules: BTreeMap<String, ClassifierRules>,
    default_rules: ClassifierRules,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an environment holding the built-in format.
    #[must_use]
    pub fn new() -> Self {
        let mut formats = FormatRegistry::new();
        formats.register(Arc::new(FieldListFormat));
        Self {
            formats,
            rules: BTreeMap::new(),
            default_rules: ClassifierRules::default(),
        }
    }

    /// Registers a format delegate.
    #[must_use]
    pub fn with_format(mut self, delegate: Arc<dyn FormatDelegate>) -> Self {
        self.formats.register(delegate);
        self
    }

    /// Sets the rule table of `format`.
    #[must_use]
    pub fn with_rules(mut self, format: impl Into<String>, rules: ClassifierRules) -> Self {
        self.rules.insert(format.into(), rules);
        self
    }

    /// Sets the rule table used by formats without one.
    #[must_use]
    pub fn with_default_rules(mut self, rules: ClassifierRules) -> Self {
        self.default_rules = rules;
        self
    }

    /// Returns the delegate of `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is not registered.
    pub fn format(&self, format: &str) -> ProtocolResult<&Arc<dyn FormatDelegate>> {
        self.formats.get(format)
    }

    /// Returns the format registry.
    #[must_use]
    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    /// Returns the rules of `format`.
    #[must_use]
    pub fn rules_for(&self, format: &str) -> &ClassifierRules {
        self.rules.get(format).unwrap_or(&self.default_rules)
    }
}
