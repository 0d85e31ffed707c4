use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happens to a volume's backing storage once its claim is released.
/// Only `Retain` volumes are candidates for orphan cleanup.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReclaimPolicy {
    Retain,
    Delete,
    Recycle,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown reclaim policy {0:?}")]
pub struct UnknownReclaimPolicy(pub String);

impl FromStr for ReclaimPolicy {
    type Err = UnknownReclaimPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Retain" => Ok(ReclaimPolicy::Retain),
            "Delete" => Ok(ReclaimPolicy::Delete),
            "Recycle" => Ok(ReclaimPolicy::Recycle),
            other => Err(UnknownReclaimPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Delete => "Delete",
            ReclaimPolicy::Recycle => "Recycle",
        };
        f.write_str(s)
    }
}

/// A single `key in (values...)` requirement.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MatchExpression {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<MatchExpression>,
}

/// Required node affinity of a volume, as an ordered list of selector terms.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct NodeAffinity {
    #[serde(default)]
    pub terms: Vec<SelectorTerm>,
}

impl NodeAffinity {
    /// Iterate every match expression in term order, then expression order.
    pub fn expressions(&self) -> impl Iterator<Item = &MatchExpression> {
        self.terms.iter().flat_map(|t| t.match_expressions.iter())
    }
}

/// A storage volume as seen by the cleaner.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    #[serde(default)]
    pub storage_class: String,
    pub reclaim_policy: ReclaimPolicy,
    #[serde(default)]
    pub node_affinity: Option<NodeAffinity>,
}

impl Volume {
    /// A `Retain` volume with no storage class and no affinity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_class: String::new(),
            reclaim_policy: ReclaimPolicy::Retain,
            node_affinity: None,
        }
    }

    pub fn with_storage_class(mut self, class: impl Into<String>) -> Self {
        self.storage_class = class.into();
        self
    }

    pub fn with_reclaim_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.reclaim_policy = policy;
        self
    }

    /// Append a selector term requiring `key` to be one of `values`.
    pub fn with_affinity_term<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let term = SelectorTerm {
            match_expressions: vec![MatchExpression {
                key: key.to_string(),
                values: values.into_iter().map(Into::into).collect(),
            }],
        };
        self.node_affinity
            .get_or_insert_with(NodeAffinity::default)
            .terms
            .push(term);
        self
    }

    /// Shorthand for a single-host affinity term.
    pub fn pinned_to(self, key: &str, host: &str) -> Self {
        self.with_affinity_term(key, [host])
    }
}

/// A cluster host. Only its name and labels matter here.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}
