//! Record model tracked by the reconciliation engine.
//!
//! A [`Record`] is a named, labeled unit with a comparable spec payload. Its
//! kind is carried by the payload type, so a collection can never mix kinds.
//! [`State`] is the tagged form handed across the [`ResourceUnit`] boundary.
//!
//! [`ResourceUnit`]: crate::controller::unit::ResourceUnit

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::controller::error::{Error, Result};
use crate::resources::{
    certificate::CertConfigSpec, chart::ChartSpec, configmap::ConfigMapSpec,
    encryption::EncryptionKeySpec, namespace::NamespaceSpec,
};

/// Kinds of records managed by the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    EncryptionKey,
    CertConfig,
    Namespace,
    ConfigMap,
    ChartRelease,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::EncryptionKey => write!(f, "EncryptionKey"),
            RecordKind::CertConfig => write!(f, "CertConfig"),
            RecordKind::Namespace => write!(f, "Namespace"),
            RecordKind::ConfigMap => write!(f, "ConfigMap"),
            RecordKind::ChartRelease => write!(f, "ChartRelease"),
        }
    }
}

/// Payload of a record. Ties a spec type to its kind and its [`State`] variant.
pub trait RecordSpec: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Kind of every record carrying this payload.
    const KIND: RecordKind;

    /// Wrap a typed collection into its tagged variant.
    fn into_state(records: RecordCollection<Self>) -> State;

    /// Unwrap a tagged variant, failing with `WrongType` on any other variant.
    fn from_state(state: State) -> Result<RecordCollection<Self>>;
}

/// A named external resource tracked for reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct Record<S> {
    /// Name, unique within (kind, namespace).
    pub name: String,
    /// Namespace, `None` for cluster-scoped records.
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Opaque payload compared for equality.
    pub spec: S,
}

impl<S: RecordSpec> Record<S> {
    /// Create a record without labels.
    pub fn new(name: impl Into<String>, namespace: Option<&str>, spec: S) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            labels: BTreeMap::new(),
            spec,
        }
    }

    /// Replace the labels of this record.
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn kind(&self) -> RecordKind {
        S::KIND
    }

    /// Identity key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            kind: S::KIND,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// True when spec and labels both match `other`.
    pub fn is_equivalent(&self, other: &Record<S>) -> bool {
        self.spec == other.spec && self.labels == other.labels
    }
}

/// Identity of a record: (kind, namespace, name).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Ordered sequence of records with no two sharing a [`RecordKey`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordCollection<S> {
    records: Vec<Record<S>>,
}

impl<S: RecordSpec> Default for RecordCollection<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: RecordSpec> RecordCollection<S> {
    /// Build a collection, rejecting duplicate keys.
    pub fn new(records: Vec<Record<S>>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for record in &records {
            let key = record.key();
            if !seen.insert(key.clone()) {
                return Err(Error::DuplicateRecord(key.to_string()));
            }
        }
        Ok(Self { records })
    }

    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Build from records already known to be unique, e.g. a filtered subset
    /// of another collection.
    pub(crate) fn from_unique(records: Vec<Record<S>>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record<S>> {
        self.records.iter()
    }

    /// Find a record by name.
    pub fn get(&self, name: &str) -> Option<&Record<S>> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names in collection order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn into_vec(self) -> Vec<Record<S>> {
        self.records
    }
}

impl<S> IntoIterator for RecordCollection<S> {
    type Item = Record<S>;
    type IntoIter = std::vec::IntoIter<Record<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a, S> IntoIterator for &'a RecordCollection<S> {
    type Item = &'a Record<S>;
    type IntoIter = std::slice::Iter<'a, Record<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// State exchanged between the steps of a unit, tagged by record kind.
#[derive(Clone, Debug, PartialEq)]
pub enum State {
    EncryptionKeys(RecordCollection<EncryptionKeySpec>),
    CertConfigs(RecordCollection<CertConfigSpec>),
    Namespaces(RecordCollection<NamespaceSpec>),
    ConfigMaps(RecordCollection<ConfigMapSpec>),
    ChartReleases(RecordCollection<ChartSpec>),
}

impl State {
    /// Variant name, used in `WrongType` errors and logs.
    pub fn variant(&self) -> &'static str {
        match self {
            State::EncryptionKeys(_) => "encryption-keys",
            State::CertConfigs(_) => "cert-configs",
            State::Namespaces(_) => "namespaces",
            State::ConfigMaps(_) => "config-maps",
            State::ChartReleases(_) => "chart-releases",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            State::EncryptionKeys(c) => c.len(),
            State::CertConfigs(c) => c.len(),
            State::Namespaces(c) => c.len(),
            State::ConfigMaps(c) => c.len(),
            State::ChartReleases(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty collection of the same variant.
    pub fn empty_like(&self) -> State {
        match self {
            State::EncryptionKeys(_) => State::EncryptionKeys(RecordCollection::empty()),
            State::CertConfigs(_) => State::CertConfigs(RecordCollection::empty()),
            State::Namespaces(_) => State::Namespaces(RecordCollection::empty()),
            State::ConfigMaps(_) => State::ConfigMaps(RecordCollection::empty()),
            State::ChartReleases(_) => State::ChartReleases(RecordCollection::empty()),
        }
    }
}

macro_rules! record_spec {
    ($spec:ty, $kind:expr, $variant:ident, $label:literal) => {
        impl RecordSpec for $spec {
            const KIND: RecordKind = $kind;

            fn into_state(records: RecordCollection<Self>) -> State {
                State::$variant(records)
            }

            fn from_state(state: State) -> Result<RecordCollection<Self>> {
                match state {
                    State::$variant(records) => Ok(records),
                    other => Err(Error::WrongType {
                        expected: $label,
                        actual: other.variant().to_string(),
                    }),
                }
            }
        }
    };
}

record_spec!(
    EncryptionKeySpec,
    RecordKind::EncryptionKey,
    EncryptionKeys,
    "encryption-keys"
);
record_spec!(
    CertConfigSpec,
    RecordKind::CertConfig,
    CertConfigs,
    "cert-configs"
);
record_spec!(NamespaceSpec, RecordKind::Namespace, Namespaces, "namespaces");
record_spec!(ConfigMapSpec, RecordKind::ConfigMap, ConfigMaps, "config-maps");
record_spec!(
    ChartSpec,
    RecordKind::ChartRelease,
    ChartReleases,
    "chart-releases"
);
