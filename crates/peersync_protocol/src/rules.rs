//! Field weighting rules.

use serde::{Deserialize, Serialize};

/// How much a field counts toward a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weight {
    /// Added when instances pair, subtracted when they do not.
    Points(i32),
    /// The field never influences the result.
    Ignore,
}

/// Weight and pairing keys for one field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Field the rule applies to.
    pub field_name: String,
    /// Field weight.
    pub weight: Weight,
    /// Keys two differing instances must agree on to pair. Empty means
    /// instances pair on the field name alone.
    #[serde(default)]
    pub key_fields: Vec<String>,
}

impl FieldRule {
    /// Creates a weighted rule with no key fields.
    pub fn points(field_name: impl Into<String>, points: i32) -> Self {
        Self {
            field_name: field_name.into(),
            weight: Weight::Points(points),
            key_fields: Vec::new(),
        }
    }

    /// Creates a rule excluding the field from classification.
    pub fn ignore(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            weight: Weight::Ignore,
            key_fields: Vec::new(),
        }
    }

    /// Sets the pairing keys.
    #[must_use]
    pub fn with_key_fields<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// The rule table of one format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRules")]
pub struct ClassifierRules {
    /// Rules sorted by field name.
    rules: Vec<FieldRule>,
    /// Minimum score for a non-identical pair to count as `Similar`.
    pub threshold: i32,
    /// Weight of fields without a rule.
    #[serde(default)]
    pub default_weight: i32,
}

#[derive(Deserialize)]
struct RawRules {
    #[serde(default)]
    rules: Vec<FieldRule>,
    threshold: i32,
    #[serde(default)]
    default_weight: i32,
}

impl From<RawRules> for ClassifierRules {
    fn from(raw: RawRules) -> Self {
        raw.rules
            .into_iter()
            .fold(Self::new(raw.threshold), Self::with_rule)
            .with_default_weight(raw.default_weight)
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ClassifierRules {
    /// Creates an empty table.
    #[must_use]
    pub fn new(threshold: i32) -> Self {
        Self {
            rules: Vec::new(),
            threshold,
            default_weight: 0,
        }
    }

    /// Adds or replaces the rule for its field.
    #[must_use]
    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        match self
            .rules
            .binary_search_by(|r| r.field_name.cmp(&rule.field_name))
        {
            Ok(at) => self.rules[at] = rule,
            Err(at) => self.rules.insert(at, rule),
        }
        self
    }

    /// Sets the weight of fields without a rule.
    #[must_use]
    pub fn with_default_weight(mut self, weight: i32) -> Self {
        self.default_weight = weight;
        self
    }

    /// Returns the rule for `field_name`.
    #[must_use]
    pub fn rule(&self, field_name: &str) -> Option<&FieldRule> {
        self.rules
            .binary_search_by(|r| r.field_name.as_str().cmp(field_name))
            .ok()
            .map(|at| &self.rules[at])
    }

    /// Returns the weight `field_name` is scored with.
    #[must_use]
    pub fn weight(&self, field_name: &str) -> Weight {
        self.rule(field_name)
            .map_or(Weight::Points(self.default_weight), |r| r.weight)
    }

    /// Returns the pairing keys of `field_name`.
    #[must_use]
    pub fn key_fields(&self, field_name: &str) -> &[String] {
        self.rule(field_name)
            .map_or(&[][..], |r| r.key_fields.as_slice())
    }

    /// Returns the rules in field name order.
    #[must_use]
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_stay_sorted_and_replace() {
        let rules = ClassifierRules::new(10)
            .with_rule(FieldRule::points("Name", 90))
            .with_rule(FieldRule::ignore("Revision"))
            .with_rule(FieldRule::points("EMail", 10))
            .with_rule(FieldRule::points("Name", 80));

        let names: Vec<&str> = rules.rules().iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(names, vec!["EMail", "Name", "Revision"]);
        assert_eq!(rules.weight("Name"), Weight::Points(80));
        assert_eq!(rules.weight("Revision"), Weight::Ignore);
    }

    #[test]
    fn unknown_fields_use_default_weight() {
        let rules = ClassifierRules::new(10).with_default_weight(3);
        assert_eq!(rules.weight("Anything"), Weight::Points(3));
        assert!(rules.key_fields("Anything").is_empty());
    }
}
