//! Sensor descriptors: identity plus metadata for one counter.
//!
//! Descriptors are produced in bulk by a family's `list()` and live until
//! the family is unregistered, reloaded, or the registry is torn down.
//! A transient "loading" descriptor (label `...`) stands in for a family
//! whose real counter list is still being enumerated.

use serde::Serialize;

use crate::pattern::PatternFlags;
use crate::value::{Value, ValueKind};

/// Label used by every loading placeholder descriptor.
pub const LOADING_LABEL: &str = "...";

/// One named metadata record attached to a descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// State carried by loading placeholders.
///
/// An *anchor* is the single placeholder a family returns from `list()`
/// while enumeration is in flight; its stored pattern matches any request
/// for that family. A non-anchor placeholder is created per watch request
/// and remembers the caller's original pattern so the reload protocol can
/// resolve it later.
#[derive(Debug, Clone)]
pub struct LoadingState {
    /// Original request pattern (anchors store `"<family>/*"`).
    pub pattern: String,
    /// Compilation flags of the original request, replayed on reload.
    pub flags: PatternFlags,
    /// Monotonic id ordering placeholder restoration during reload.
    pub seq: u64,
    /// Whether this is the family's enumeration anchor.
    pub anchor: bool,
}

/// Identity and metadata for one sensor counter.
#[derive(Debug)]
pub struct Descriptor {
    family: String,
    label: String,
    kind: ValueKind,
    /// Opaque payload meaningful only to the owning family.
    key: u64,
    properties: Vec<Property>,
    loading: Option<LoadingState>,
    /// Index identity tie-break; assigned once on registration.
    serial: u64,
}

impl Descriptor {
    pub fn new(family: impl Into<String>, label: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            family: family.into(),
            label: label.into(),
            kind,
            key: 0,
            properties: Vec::new(),
            loading: None,
            serial: 0,
        }
    }

    /// Enumeration anchor a family returns from `list()` while its real
    /// descriptors are not yet available.
    pub fn loading_anchor(family: impl Into<String>) -> Self {
        let family = family.into();
        let pattern = format!("{family}/*");
        let mut d = Self::new(family, LOADING_LABEL, ValueKind::None);
        d.loading = Some(LoadingState {
            pattern,
            flags: PatternFlags::folded(),
            seq: 0,
            anchor: true,
        });
        d
    }

    /// Per-request placeholder holding the caller's original pattern and
    /// compilation flags.
    pub fn loading_placeholder(
        family: impl Into<String>,
        pattern: impl Into<String>,
        flags: PatternFlags,
        seq: u64,
    ) -> Self {
        let mut d = Self::new(family, LOADING_LABEL, ValueKind::None);
        d.loading = Some(LoadingState {
            pattern: pattern.into(),
            flags,
            seq,
            anchor: false,
        });
        d
    }

    pub fn with_key(mut self, key: u64) -> Self {
        self.key = key;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn loading(&self) -> Option<&LoadingState> {
        self.loading.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// `"family/label"` path used for pattern matching and display.
    pub fn path(&self) -> String {
        format!("{}/{}", self.family, self.label)
    }

    pub(crate) fn assign_serial(&mut self, serial: u64) {
        self.serial = serial;
    }
}
