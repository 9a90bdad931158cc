//! Field-weighted record classification.

use crate::environment::Environment;
use crate::error::ProtocolResult;
use crate::field::{Field, FieldList};
use crate::record::Record;
use crate::rules::{ClassifierRules, Weight};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Outcome of comparing two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Identical up to ignored fields and field order.
    Same,
    /// The same entity with diverging content; a conflict.
    Similar,
    /// Different entities.
    Mismatch,
}

impl Classification {
    /// Returns the less favourable of two classifications.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Mismatch, _) | (_, Self::Mismatch) => Self::Mismatch,
            (Self::Similar, _) | (_, Self::Similar) => Self::Similar,
            (Self::Same, Self::Same) => Self::Same,
        }
    }
}

/// A classification and the score it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    /// The classification.
    pub classification: Classification,
    /// Collected points. Zero when a format delegate decided on its own.
    pub score: i32,
}

impl Comparison {
    fn decided(classification: Classification) -> Self {
        Self {
            classification,
            score: 0,
        }
    }
}

/// Compares records through the delegates and rules of an [`Environment`].
///
/// The classifier is stateless; it can be shared freely across tasks.
#[derive(Debug, Clone, Copy)]
pub struct ConflictClassifier<'env> {
    env: &'env Environment,
}

impl<'env> ConflictClassifier<'env> {
    /// Creates a classifier over `env`.
    #[must_use]
    pub fn new(env: &'env Environment) -> Self {
        Self { env }
    }

    /// Classifies two records.
    ///
    /// Two deletions are `Same`; a deletion against content, or payloads of
    /// different formats, are `Mismatch`. Otherwise the format delegate
    /// decides, through its own compare when it has one, or through its
    /// extracted fields and the format's rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unknown or a payload cannot be
    /// decoded by its delegate.
    pub fn classify(&self, a: &Record, b: &Record) -> ProtocolResult<Comparison> {
        let (pa, pb) = match (&a.payload, &b.payload) {
            (None, None) => return Ok(Comparison::decided(Classification::Same)),
            (Some(pa), Some(pb)) => (pa, pb),
            _ => return Ok(Comparison::decided(Classification::Mismatch)),
        };
        if pa.format != pb.format {
            return Ok(Comparison::decided(Classification::Mismatch));
        }

        let delegate = self.env.format(&pa.format)?;
        if let Some(decided) = delegate.compare(&pa.data, &pb.data) {
            return decided.map(Comparison::decided);
        }

        let fa = delegate.extract_fields(&pa.data)?;
        let fb = delegate.extract_fields(&pb.data)?;
        Ok(Self::classify_fields(
            &fa,
            &fb,
            self.env.rules_for(&pa.format),
        ))
    }

    /// Classifies two field lists under `rules`.
    ///
    /// Field names are walked as a sorted merge-join. While no difference
    /// has been seen, instances of a name must match exactly as a multiset,
    /// each match earning the field's weight. From the first difference on,
    /// remaining instances are paired on the rule's key fields: a pair earns
    /// the weight, and the larger side's count of unpaired instances costs
    /// it. A name present on one side only costs the weight per instance.
    /// Ignored fields never count, and names absent from both sides are not
    /// visited.
    #[must_use]
    pub fn classify_fields(a: &FieldList, b: &FieldList, rules: &ClassifierRules) -> Comparison {
        let ga = a.groups();
        let gb = b.groups();
        let mut walk = Walk {
            rules,
            same: true,
            score: 0,
        };

        let (mut i, mut j) = (0, 0);
        loop {
            match (ga.get(i), gb.get(j)) {
                (None, None) => break,
                (Some(&(name, fields)), None) => {
                    walk.one_sided(name, fields.len());
                    i += 1;
                }
                (None, Some(&(name, fields))) => {
                    walk.one_sided(name, fields.len());
                    j += 1;
                }
                (Some(&(na, fa)), Some(&(nb, fb))) => match na.cmp(nb) {
                    std::cmp::Ordering::Less => {
                        walk.one_sided(na, fa.len());
                        i += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        walk.one_sided(nb, fb.len());
                        j += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        walk.both(na, fa, fb);
                        i += 1;
                        j += 1;
                    }
                },
            }
        }

        let classification = if walk.same {
            Classification::Same
        } else if walk.score >= rules.threshold {
            Classification::Similar
        } else {
            Classification::Mismatch
        };
        trace!(score = walk.score, threshold = rules.threshold, ?classification, "classified field lists");
        Comparison {
            classification,
            score: walk.score,
        }
    }
}

struct Walk<'r> {
    rules: &'r ClassifierRules,
    same: bool,
    score: i32,
}

impl Walk<'_> {
    fn one_sided(&mut self, name: &str, count: usize) {
        let Weight::Points(points) = self.rules.weight(name) else {
            return;
        };
        trace!(field = name, "field present on one side only");
        self.same = false;
        self.score = self.score.saturating_sub(points.saturating_mul(count_i32(count)));
    }

    fn both(&mut self, name: &str, fa: &[Field], fb: &[Field]) {
        let Weight::Points(points) = self.rules.weight(name) else {
            return;
        };

        let mut rest_a: Vec<&Field> = fa.iter().collect();
        let mut rest_b: Vec<&Field> = fb.iter().collect();

        if self.same {
            if fa.len() == fb.len() {
                let (pairs, ua, ub) = pair_off(rest_a, rest_b, Field::exact_identity);
                self.score = self.score.saturating_add(points.saturating_mul(count_i32(pairs)));
                rest_a = ua;
                rest_b = ub;
                if rest_a.is_empty() {
                    return;
                }
            }
            trace!(field = name, "field instances differ");
            self.same = false;
        }

        if points == 0 {
            return;
        }
        let key_fields = self.rules.key_fields(name);
        let (pairs, ua, ub) = pair_off(rest_a, rest_b, |f| f.key_identity(key_fields));
        let unpaired = ua.len().max(ub.len());
        self.score = self
            .score
            .saturating_add(points.saturating_mul(count_i32(pairs)))
            .saturating_sub(points.saturating_mul(count_i32(unpaired)));
    }
}

/// Pairs instances with equal identities. Returns the pair count and the
/// unpaired instances of each side.
fn pair_off<'f, K, F>(a: Vec<&'f Field>, b: Vec<&'f Field>, identity: F) -> (usize, Vec<&'f Field>, Vec<&'f Field>)
where
    K: Ord,
    F: Fn(&Field) -> K,
{
    let mut pool: BTreeMap<K, Vec<&'f Field>> = BTreeMap::new();
    for field in b {
        pool.entry(identity(field)).or_default().push(field);
    }

    let mut pairs = 0;
    let mut unpaired_a = Vec::new();
    for field in a {
        match pool.get_mut(&identity(field)).and_then(Vec::pop) {
            Some(_) => pairs += 1,
            None => unpaired_a.push(field),
        }
    }
    let unpaired_b = pool.into_values().flatten().collect();
    (pairs, unpaired_a, unpaired_b)
}

fn count_i32(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}
