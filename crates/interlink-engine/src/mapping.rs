//! Mapping: a sparse, scored source → target relation.
//!
//! A `Mapping` stores candidate links between entities of two knowledge
//! bases, each with a confidence (normally in `[0, 1]`). It is the result
//! type of every plan instruction.
//!
//! Invariants:
//! - a `(source, target)` pair is stored at most once; re-adding it keeps
//!   the **maximum** of the stored and the new confidence (union-by-max);
//! - `size` always equals the number of stored pairs and is maintained by
//!   every mutating operation (never recomputed lazily);
//! - derived views (`reversed_index`) are built on demand and never cached,
//!   so they cannot go stale.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Default link predicate: `owl:sameAs`.
pub const OWL_SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";

/// A confidence → source → targets view of a mapping.
pub type ReversedIndex = BTreeMap<ConfidenceKey, BTreeMap<String, BTreeSet<String>>>;

/// Totally ordered confidence, usable as a map key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceKey(pub f64);

impl PartialEq for ConfidenceKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ConfidenceKey {}

impl PartialOrd for ConfidenceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConfidenceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MappingData", into = "MappingData")]
pub struct Mapping {
    map: HashMap<String, HashMap<String, f64>>,
    size: usize,
    predicate: String,
}

/// On-disk shape of a mapping; `size` is recomputed on load.
#[derive(Serialize, Deserialize)]
struct MappingData {
    #[serde(default = "default_predicate")]
    predicate: String,
    #[serde(default)]
    links: BTreeMap<String, BTreeMap<String, f64>>,
}

fn default_predicate() -> String {
    OWL_SAME_AS.to_string()
}

impl From<MappingData> for Mapping {
    fn from(data: MappingData) -> Self {
        let mut m = Mapping::with_predicate(data.predicate);
        for (source, row) in data.links {
            for (target, confidence) in row {
                m.add(&source, &target, confidence);
            }
        }
        m
    }
}

impl From<Mapping> for MappingData {
    fn from(m: Mapping) -> Self {
        MappingData {
            predicate: m.predicate,
            links: m
                .map
                .into_iter()
                .map(|(s, row)| (s, row.into_iter().collect()))
                .collect(),
        }
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapping {
    pub fn new() -> Self {
        Self::with_predicate(OWL_SAME_AS)
    }

    pub fn with_predicate(predicate: impl Into<String>) -> Self {
        Self {
            map: HashMap::new(),
            size: 0,
            predicate: predicate.into(),
        }
    }

    /// An empty mapping that keeps this mapping's predicate.
    fn empty_like(&self) -> Self {
        Self::with_predicate(self.predicate.clone())
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn set_predicate(&mut self, predicate: impl Into<String>) {
        self.predicate = predicate.into();
    }

    /// Number of stored `(source, target)` pairs.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Brute-force pair count; always equal to `size()`.
    pub fn number_of_mappings(&self) -> usize {
        self.map.values().map(HashMap::len).sum()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.size = 0;
        self.predicate = OWL_SAME_AS.to_string();
    }

    /// Upsert a pair, keeping the maximum confidence.
    pub fn add(&mut self, source: &str, target: &str, confidence: f64) {
        match self.map.get_mut(source) {
            Some(row) => match row.get_mut(target) {
                Some(existing) => {
                    if confidence > *existing {
                        *existing = confidence;
                    }
                }
                None => {
                    row.insert(target.to_string(), confidence);
                    self.size += 1;
                }
            },
            None => {
                let mut row = HashMap::new();
                row.insert(target.to_string(), confidence);
                self.map.insert(source.to_string(), row);
                self.size += 1;
            }
        }
    }

    /// Merge a whole target → confidence row into `source`.
    ///
    /// A new source installs the row wholesale; an existing one merges it
    /// target by target with the same max rule as [`Mapping::add`].
    pub fn add_row(&mut self, source: &str, row: HashMap<String, f64>) {
        match self.map.get(source) {
            None => {
                self.size += row.len();
                self.map.insert(source.to_string(), row);
            }
            Some(_) => {
                for (target, confidence) in row {
                    self.add(source, &target, confidence);
                }
            }
        }
    }

    /// Stored confidence, or `0.0` when the pair is absent.
    pub fn confidence(&self, source: &str, target: &str) -> f64 {
        self.map
            .get(source)
            .and_then(|row| row.get(target))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.map
            .get(source)
            .is_some_and(|row| row.contains_key(target))
    }

    pub fn row(&self, source: &str) -> Option<&HashMap<String, f64>> {
        self.map.get(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Every `(source, target, confidence)` triple, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.map.iter().flat_map(|(s, row)| {
            row.iter()
                .map(move |(t, c)| (s.as_str(), t.as_str(), *c))
        })
    }

    /// Triples sorted by source, then target.
    pub fn sorted_triples(&self) -> Vec<(&str, &str, f64)> {
        let mut out: Vec<_> = self.iter().collect();
        out.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));
        out
    }

    /// Freshly built confidence → source → targets view.
    pub fn reversed_index(&self) -> ReversedIndex {
        let mut index = ReversedIndex::new();
        for (s, t, c) in self.iter() {
            index
                .entry(ConfidenceKey(c))
                .or_default()
                .entry(s.to_string())
                .or_default()
                .insert(t.to_string());
        }
        index
    }

    /// All pairs with confidence `>= threshold`.
    pub fn sub_map(&self, threshold: f64) -> Mapping {
        let mut m = self.empty_like();
        for (s, row) in &self.map {
            for (t, c) in row {
                if *c >= threshold {
                    m.add(s, t, *c);
                }
            }
        }
        m
    }

    /// Pairs in `[verification, acceptance)` for review, pairs at or above
    /// `acceptance` accepted: returns `(accepted, review)`.
    pub fn split_by_thresholds(&self, acceptance: f64, verification: f64) -> (Mapping, Mapping) {
        let mut accepted = self.empty_like();
        let mut review = self.empty_like();
        for (s, t, c) in self.iter() {
            if c >= acceptance {
                accepted.add(s, t, c);
            } else if c >= verification {
                review.add(s, t, c);
            }
        }
        (accepted, review)
    }

    /// For every source keep only the target(s) with the highest confidence.
    /// Ties keep all tied targets.
    pub fn best_one_to_n(&self) -> Mapping {
        let mut m = self.empty_like();
        for (s, row) in &self.map {
            let Some(max) = row.values().copied().reduce(f64::max) else {
                continue;
            };
            for (t, c) in row {
                if *c == max {
                    m.add(s, t, *c);
                }
            }
        }
        m
    }

    /// Approximate one-to-one selection: best-per-source, then best-per-target.
    ///
    /// This is a direction-biased greedy heuristic, not an optimal or stable
    /// assignment: ties can still leave a target linked to several sources.
    pub fn best_one_to_one(mapping: &Mapping) -> Mapping {
        mapping
            .best_one_to_n()
            .reverse_source_target()
            .best_one_to_n()
            .reverse_source_target()
    }

    /// Swap every `(s, t, c)` into `(t, s, c)`.
    pub fn reverse_source_target(&self) -> Mapping {
        let mut m = self.empty_like();
        for (s, t, c) in self.iter() {
            m.add(t, s, c);
        }
        m
    }

    /// Divide every confidence by `d`; `d == 0` returns an unchanged copy.
    pub fn scale(&self, d: f64) -> Mapping {
        if d == 0.0 {
            return self.clone();
        }
        let mut m = self.empty_like();
        for (s, t, c) in self.iter() {
            m.add(s, t, c / d);
        }
        m
    }

    /// Clamp confidences above `1.0` down to `1.0`.
    pub fn trim(&self) -> Mapping {
        let mut m = self.empty_like();
        for (s, t, c) in self.iter() {
            m.add(s, t, c.min(1.0));
        }
        m
    }

    // ------------------------------------------------------------------
    // Set algebra
    // ------------------------------------------------------------------

    /// Pairs of either side; shared pairs keep the higher confidence.
    pub fn union(&self, other: &Mapping) -> Mapping {
        let mut m = self.clone();
        for (s, row) in &other.map {
            m.add_row(s, row.clone());
        }
        m
    }

    /// Pairs present on both sides, scored with the lower confidence.
    pub fn intersection(&self, other: &Mapping) -> Mapping {
        let mut m = self.empty_like();
        for (s, row) in &self.map {
            let Some(other_row) = other.map.get(s) else {
                continue;
            };
            for (t, c) in row {
                if let Some(oc) = other_row.get(t) {
                    m.add(s, t, c.min(*oc));
                }
            }
        }
        m
    }

    /// Pairs of `self` that are absent from `other`, with `self`'s confidence.
    pub fn difference(&self, other: &Mapping) -> Mapping {
        let mut m = self.empty_like();
        for (s, t, c) in self.iter() {
            if !other.contains(s, t) {
                m.add(s, t, c);
            }
        }
        m
    }

    /// Pairs present on exactly one side, with that side's confidence.
    pub fn symmetric_difference(&self, other: &Mapping) -> Mapping {
        self.difference(other).union(&other.difference(self))
    }

    /// `source,target` per line, sorted; confidences are omitted.
    pub fn pairs_output(&self) -> String {
        let mut out = String::new();
        for (s, t, _) in self.sorted_triples() {
            out.push_str(s);
            out.push(',');
            out.push_str(t);
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (s, t, c) in self.sorted_triples() {
            writeln!(f, "[{s} -> ({t}|{c})]")?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String, f64)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (String, String, f64)>>(iter: I) -> Self {
        let mut m = Mapping::new();
        for (s, t, c) in iter {
            m.add(&s, &t, c);
        }
        m
    }
}
