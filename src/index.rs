//! Ordered indexes over descriptors and their properties.
//!
//! Keys are case-folded `(family, label)` pairs with an explicit rank:
//! synthetic *probe* keys exist purely to bound range queries and carry
//! no identity, while *stored* keys tie-break on a registration serial so
//! several live descriptors may legally share a label. A lower probe
//! sorts before every stored entry with the same strings and an upper
//! probe after, which is what lets a range query say "everything whose
//! string key is between X and Y" without requiring identity equality.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::descriptor::Descriptor;

/// Case-fold used for all index keys.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
}

/// Position of a key among entries sharing the same strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyRank {
    /// Probe bounding the low end of a range.
    LowerProbe,
    /// A live entry, identified by its registration serial.
    Stored(u64),
    /// Probe bounding the high end of a range.
    UpperProbe,
}

/// Key into the descriptor and watch indexes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey {
    pub family: String,
    pub label: String,
    pub rank: KeyRank,
}

impl IndexKey {
    pub fn probe_lower(family: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            label: label.into(),
            rank: KeyRank::LowerProbe,
        }
    }

    pub fn probe_upper(family: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            label: label.into(),
            rank: KeyRank::UpperProbe,
        }
    }

    pub fn stored(family: &str, label: &str, serial: u64) -> Self {
        Self {
            family: fold(family),
            label: fold(label),
            rank: KeyRank::Stored(serial),
        }
    }
}

/// Ordered index of registered descriptors.
#[derive(Debug, Default)]
pub struct DescriptorIndex {
    map: BTreeMap<IndexKey, Arc<Descriptor>>,
}

impl DescriptorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(d: &Descriptor) -> IndexKey {
        IndexKey::stored(d.family(), d.label(), d.serial())
    }

    pub fn insert(&mut self, d: Arc<Descriptor>) {
        self.map.insert(Self::key_of(&d), d);
    }

    pub fn remove(&mut self, d: &Descriptor) -> Option<Arc<Descriptor>> {
        self.map.remove(&Self::key_of(d))
    }

    /// Entries whose key falls inside `[lo, hi]`, in key order.
    pub fn range<'a>(
        &'a self,
        lo: &IndexKey,
        hi: &IndexKey,
    ) -> impl Iterator<Item = &'a Arc<Descriptor>> {
        self.map
            .range((Bound::Included(lo.clone()), Bound::Included(hi.clone())))
            .map(|(_, d)| d)
    }

    /// All entries whose folded strings equal `(family, label)`.
    pub fn exact<'a>(
        &'a self,
        family: &str,
        label: &str,
    ) -> impl Iterator<Item = &'a Arc<Descriptor>> {
        let lo = IndexKey::probe_lower(fold(family), fold(label));
        let hi = IndexKey::probe_upper(fold(family), fold(label));
        self.range(&lo, &hi)
    }

    /// Drain every entry belonging to `family`.
    pub fn remove_family(&mut self, family: &str) -> Vec<Arc<Descriptor>> {
        let folded = fold(family);
        let doomed: Vec<IndexKey> = self
            .map
            .range((
                Bound::Included(IndexKey::probe_lower(folded.clone(), String::new())),
                Bound::Included(IndexKey::probe_upper(
                    format!("{folded}{}", char::MAX),
                    String::new(),
                )),
            ))
            .filter(|(k, _)| k.family == folded)
            .map(|(k, _)| k.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|k| self.map.remove(&k))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Descriptor>> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Invariant check: every entry's key agrees with its descriptor.
    #[cfg(debug_assertions)]
    pub fn debug_validate(&self) {
        for (key, d) in &self.map {
            debug_assert_eq!(key.family, fold(d.family()));
            debug_assert_eq!(key.label, fold(d.label()));
            debug_assert_eq!(key.rank, KeyRank::Stored(d.serial()));
        }
    }
}

/// Key into the property index: descriptor strings plus property name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PropKey {
    pub family: String,
    pub label: String,
    pub name: String,
    pub rank: KeyRank,
}

/// One indexed property: the owning descriptor and the property slot.
#[derive(Debug, Clone)]
pub struct PropEntry {
    pub descriptor: Arc<Descriptor>,
    pub slot: usize,
}

/// Ordered index of descriptor properties, keyed additionally by name.
#[derive(Debug, Default)]
pub struct PropertyIndex {
    map: BTreeMap<PropKey, PropEntry>,
}

impl PropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_descriptor(&mut self, d: &Arc<Descriptor>) {
        for (slot, prop) in d.properties().iter().enumerate() {
            let key = PropKey {
                family: fold(d.family()),
                label: fold(d.label()),
                name: fold(&prop.name),
                rank: KeyRank::Stored(d.serial()),
            };
            self.map.insert(
                key,
                PropEntry {
                    descriptor: Arc::clone(d),
                    slot,
                },
            );
        }
    }

    pub fn remove_descriptor(&mut self, d: &Descriptor) {
        let doomed: Vec<PropKey> = self
            .map
            .iter()
            .filter(|(k, _)| k.rank == KeyRank::Stored(d.serial()))
            .map(|(k, _)| k.clone())
            .collect();
        for k in doomed {
            self.map.remove(&k);
        }
    }

    /// Properties of string-equal descriptors matching `name`.
    pub fn exact<'a>(
        &'a self,
        family: &str,
        label: &str,
        name: &str,
    ) -> impl Iterator<Item = &'a PropEntry> {
        let lo = PropKey {
            family: fold(family),
            label: fold(label),
            name: fold(name),
            rank: KeyRank::LowerProbe,
        };
        let hi = PropKey {
            family: fold(family),
            label: fold(label),
            name: fold(name),
            rank: KeyRank::UpperProbe,
        };
        self.map
            .range((Bound::Included(lo), Bound::Included(hi)))
            .map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueKind};

    fn desc(family: &str, label: &str, serial: u64) -> Arc<Descriptor> {
        let mut d = Descriptor::new(family, label, ValueKind::U64);
        d.assign_serial(serial);
        Arc::new(d)
    }

    #[test]
    fn test_probe_brackets_stored() {
        let lo = IndexKey::probe_lower("cpu", "cpu0");
        let stored = IndexKey::stored("cpu", "cpu0", 42);
        let hi = IndexKey::probe_upper("cpu", "cpu0");
        assert!(lo < stored);
        assert!(stored < hi);
    }

    #[test]
    fn test_stored_ties_break_on_serial() {
        let a = IndexKey::stored("cpu", "cpu0", 1);
        let b = IndexKey::stored("cpu", "cpu0", 2);
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_keys_are_case_folded() {
        let a = IndexKey::stored("CPU", "Cpu0", 1);
        let b = IndexKey::stored("cpu", "cpu0", 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_labels_coexist() {
        let mut idx = DescriptorIndex::new();
        idx.insert(desc("disk", "...", 1));
        idx.insert(desc("disk", "...", 2));
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.exact("disk", "...").count(), 2);
    }

    #[test]
    fn test_ordered_traversal() {
        let mut idx = DescriptorIndex::new();
        idx.insert(desc("net", "eth0 rx", 3));
        idx.insert(desc("cpu", "cpu1 user usage", 2));
        idx.insert(desc("cpu", "cpu0 user usage", 1));
        let paths: Vec<String> = idx.iter().map(|d| d.path()).collect();
        assert_eq!(
            paths,
            vec![
                "cpu/cpu0 user usage".to_string(),
                "cpu/cpu1 user usage".to_string(),
                "net/eth0 rx".to_string(),
            ]
        );
    }

    #[test]
    fn test_remove_family_drains_only_that_family() {
        let mut idx = DescriptorIndex::new();
        idx.insert(desc("cpu", "cpu0 user usage", 1));
        idx.insert(desc("cpu", "cpu0 sys usage", 2));
        idx.insert(desc("mem", "free kb", 3));
        let removed = idx.remove_family("cpu");
        assert_eq!(removed.len(), 2);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.iter().next().unwrap().family(), "mem");
    }

    #[test]
    fn test_range_query_bounds() {
        let mut idx = DescriptorIndex::new();
        idx.insert(desc("cpu", "cpu0 sys usage", 1));
        idx.insert(desc("cpu", "cpu0 user usage", 2));
        idx.insert(desc("cpu", "cpu1 user usage", 3));
        let lo = IndexKey::probe_lower("cpu", "cpu0");
        let hi = IndexKey::probe_upper("cpu", format!("cpu0{}", char::MAX));
        let hits: Vec<&str> = idx.range(&lo, &hi).map(|d| d.label()).collect();
        assert_eq!(hits, vec!["cpu0 sys usage", "cpu0 user usage"]);
    }

    #[test]
    fn test_property_index_exact() {
        let mut d = Descriptor::new("cpu", "cpu0 user usage", ValueKind::F32)
            .with_property("units", Value::Text("percent".into()))
            .with_property("source", Value::Text("/proc/stat".into()));
        d.assign_serial(9);
        let d = Arc::new(d);
        let mut props = PropertyIndex::new();
        props.insert_descriptor(&d);
        assert_eq!(props.len(), 2);

        let hits: Vec<&PropEntry> = props.exact("cpu", "cpu0 user usage", "units").collect();
        assert_eq!(hits.len(), 1);
        let entry = hits[0];
        assert_eq!(
            entry.descriptor.properties()[entry.slot].value.render(),
            "percent"
        );

        props.remove_descriptor(&d);
        assert!(props.is_empty());
    }
}
