//! Tag algebra for deciding whether a selector matches a concrete tag set.
//!
//! A [`Subset`] is a selector over tag sets: a conjunction of possibly
//! negated key/value constraints. An [`Element`] is one concrete instance's
//! tags (an inbound listener, a resource's labels).

use ahash::AHashMap as HashMap;
use std::collections::BTreeMap;

/// A concrete tag set with unique keys.
pub type Element = BTreeMap<String, String>;

/// A single key/value constraint. When `not` is set the constraint means
/// "key present with a different value, or key absent".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
    pub not: bool,
}

/// An ordered list of [`Tag`]s, conventionally sorted by key. Several tags
/// for the same key may coexist before simplification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subset(Vec<Tag>);

// === impl Tag ===

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            not: false,
        }
    }

    pub fn negated(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            not: true,
            ..Self::new(key, value)
        }
    }

    /// Whether every tag set matched by `other` is also matched by `self`,
    /// considering only this single constraint.
    fn is_superset_of(&self, other: &Tag) -> bool {
        if self.key != other.key {
            return false;
        }
        match (self.not, other.not) {
            (false, false) => self.value == other.value,
            (true, false) => self.value != other.value,
            (true, true) => self.value == other.value,
            (false, true) => false,
        }
    }
}

// === impl Subset ===

impl Subset {
    pub fn new() -> Self {
        Self::default()
    }

    /// A selector requiring every key/value pair of `tags`, in key order.
    pub fn from_map(tags: &BTreeMap<String, String>) -> Self {
        tags.iter().map(|(k, v)| Tag::new(k, v)).collect()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn num_positive(&self) -> usize {
        self.0.iter().filter(|t| !t.not).count()
    }

    /// Whether `element` satisfies every constraint: positive tags require
    /// value equality, negated tags require inequality, and a key absent from
    /// the element fails the match unless the tag is negated. The empty
    /// subset matches everything.
    pub fn contains_element(&self, element: &Element) -> bool {
        for tag in &self.0 {
            match element.get(&tag.key) {
                Some(value) => {
                    if tag.not == (*value == tag.value) {
                        return false;
                    }
                }
                None => {
                    if !tag.not {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Whether every element matched by `other` is also matched by `self`.
    /// A partial order: reflexive, with the empty subset as the universal
    /// superset.
    pub fn is_subset(&self, other: &Subset) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let mut by_key: HashMap<&str, Vec<&Tag>> = HashMap::new();
        for tag in &other.0 {
            by_key.entry(tag.key.as_str()).or_default().push(tag);
        }
        for tag in &self.0 {
            match by_key.get(tag.key.as_str()) {
                None => return false,
                Some(others) => {
                    if others.iter().any(|other| !tag.is_superset_of(other)) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Whether some concrete element could satisfy both selectors. Only
    /// positive tags are compared; purely negative overlaps conservatively
    /// report an intersection since no concrete enumeration is attempted.
    /// Callers rely on this never under-reporting a conflict.
    pub fn intersect(&self, other: &Subset) -> bool {
        let mut positive: HashMap<&str, Vec<&str>> = HashMap::new();
        for tag in other.0.iter().filter(|t| !t.not) {
            positive
                .entry(tag.key.as_str())
                .or_default()
                .push(tag.value.as_str());
        }
        for tag in self.0.iter().filter(|t| !t.not) {
            if let Some(values) = positive.get(tag.key.as_str()) {
                if values.iter().any(|v| *v != tag.value) {
                    return false;
                }
            }
        }
        true
    }
}

impl From<Vec<Tag>> for Subset {
    fn from(tags: Vec<Tag>) -> Self {
        Self(tags)
    }
}

impl FromIterator<Tag> for Subset {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Subset {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Removes duplicate subsets, keeping first occurrences in order.
pub fn deduplicate(subsets: Vec<Subset>) -> Vec<Subset> {
    let mut out: Vec<Subset> = Vec::with_capacity(subsets.len());
    for subset in subsets {
        if !out.contains(&subset) {
            out.push(subset);
        }
    }
    out
}

/// Enumerates every syntactically distinct positive/negative combination of
/// a set of tags, simplifying contradictory duplicate keys: two positive
/// values for one key drop the combination, a positive and a negative value
/// keep only the positive. Visits all 2^N combinations and then stops.
#[derive(Clone, Debug)]
pub struct SubsetIter {
    current: Vec<Tag>,
    remaining: usize,
}

// === impl SubsetIter ===

impl SubsetIter {
    pub fn new(mut tags: Vec<Tag>) -> Self {
        // Start from the combination that keeps the last value of every key
        // positive; the cyclic counter below ends back on it.
        let mut seen: HashMap<String, ()> = HashMap::new();
        for tag in tags.iter_mut().rev() {
            tag.not = seen.insert(tag.key.clone(), ()).is_some();
        }
        let remaining = 1usize << tags.len();
        Self {
            current: tags,
            remaining,
        }
    }

    /// Binary increment over the negation flags, least-significant tag
    /// first, wrapping around.
    fn advance(&mut self) {
        for tag in &mut self.current {
            if tag.not {
                tag.not = false;
            } else {
                tag.not = true;
                return;
            }
        }
    }

    fn simplified(&self) -> Option<Subset> {
        let mut keys: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&Tag>> = HashMap::new();
        for tag in &self.current {
            let group = groups.entry(tag.key.as_str()).or_default();
            if group.is_empty() {
                keys.push(tag.key.as_str());
            }
            group.push(tag);
        }

        let mut out = Vec::with_capacity(self.current.len());
        for key in keys {
            let group = &groups[key];
            let mut positive = group.iter().filter(|t| !t.not);
            match (positive.next(), positive.next()) {
                (None, _) => out.extend(group.iter().map(|t| (*t).clone())),
                (Some(tag), None) => out.push((*tag).clone()),
                (Some(_), Some(_)) => return None,
            }
        }
        Some(Subset(out))
    }
}

impl Iterator for SubsetIter {
    type Item = Subset;

    fn next(&mut self) -> Option<Subset> {
        while self.remaining > 0 {
            self.remaining -= 1;
            self.advance();
            if let Some(subset) = self.simplified() {
                return Some(subset);
            }
        }
        None
    }
}
