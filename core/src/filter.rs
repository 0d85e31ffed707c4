use std::collections::{BTreeMap, BTreeSet};

use inventory_api::{Host, ReclaimPolicy, Volume};

/// Attributes a [`FilterSpec`] can be evaluated against. Subjects that lack
/// an attribute fail any rule that constrains it.
pub trait Filterable {
    fn reclaim_policy(&self) -> Option<ReclaimPolicy> {
        None
    }
    fn storage_class(&self) -> Option<&str> {
        None
    }
    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        None
    }
}

impl Filterable for Volume {
    fn reclaim_policy(&self) -> Option<ReclaimPolicy> {
        Some(self.reclaim_policy)
    }
    fn storage_class(&self) -> Option<&str> {
        Some(&self.storage_class)
    }
}

impl Filterable for Host {
    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        Some(&self.labels)
    }
}

/// Why a subject was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ReclaimPolicy,
    StorageClass,
    Labels,
}

/// Declarative filter. Empty rules accept everything; all non-empty rules
/// must pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub reclaim_policy: Option<ReclaimPolicy>,
    pub storage_classes: BTreeSet<String>,
    pub labels: BTreeMap<String, String>,
}

impl FilterSpec {
    /// Volumes eligible for orphan cleanup: `Retain` policy, and a storage
    /// class on the allow-list if one is given.
    pub fn orphan_candidates<I, S>(storage_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reclaim_policy: Some(ReclaimPolicy::Retain),
            storage_classes: storage_classes.into_iter().map(Into::into).collect(),
            labels: BTreeMap::new(),
        }
    }

    /// Hosts carrying every given label with the given value.
    pub fn hosts_labelled(labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            ..Self::default()
        }
    }

    pub fn evaluate<T: Filterable + ?Sized>(&self, subject: &T) -> Result<(), Rejection> {
        if let Some(policy) = self.reclaim_policy {
            if subject.reclaim_policy() != Some(policy) {
                return Err(Rejection::ReclaimPolicy);
            }
        }
        if !self.storage_classes.is_empty() {
            match subject.storage_class() {
                Some(class) if self.storage_classes.contains(class) => {}
                _ => return Err(Rejection::StorageClass),
            }
        }
        if !self.labels.is_empty() {
            let Some(labels) = subject.labels() else {
                return Err(Rejection::Labels);
            };
            let all_match = self
                .labels
                .iter()
                .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v));
            if !all_match {
                return Err(Rejection::Labels);
            }
        }
        Ok(())
    }

    pub fn matches<T: Filterable + ?Sized>(&self, subject: &T) -> bool {
        self.evaluate(subject).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_spec_accepts_everything() {
        let spec = FilterSpec::default();
        assert!(spec.matches(&Volume::new("pv").with_reclaim_policy(ReclaimPolicy::Delete)));
        assert!(spec.matches(&Host::new("node-01")));
    }

    #[test]
    fn reclaim_policy_rule() {
        let spec = FilterSpec::orphan_candidates(Vec::<String>::new());
        assert_eq!(spec.evaluate(&Volume::new("pv")), Ok(()));
        for policy in [ReclaimPolicy::Delete, ReclaimPolicy::Recycle] {
            let v = Volume::new("pv").with_reclaim_policy(policy);
            assert_eq!(spec.evaluate(&v), Err(Rejection::ReclaimPolicy));
        }
    }

    #[test]
    fn storage_class_allow_list() {
        let spec = FilterSpec::orphan_candidates(["bar"]);
        assert!(spec.matches(&Volume::new("pv").with_storage_class("bar")));
        assert_eq!(
            spec.evaluate(&Volume::new("pv").with_storage_class("foo")),
            Err(Rejection::StorageClass)
        );
        assert_eq!(
            spec.evaluate(&Volume::new("pv")),
            Err(Rejection::StorageClass)
        );
    }

    #[test]
    fn labels_must_all_match() {
        let spec = FilterSpec::hosts_labelled(BTreeMap::from([
            ("pool".to_string(), "local".to_string()),
            ("zone".to_string(), "a".to_string()),
        ]));
        let full = Host::new("n").with_label("pool", "local").with_label("zone", "a");
        assert!(spec.matches(&full));
        assert!(spec.matches(&full.clone().with_label("extra", "x")));

        let missing = Host::new("n").with_label("pool", "local");
        assert_eq!(spec.evaluate(&missing), Err(Rejection::Labels));

        let mismatched = Host::new("n").with_label("pool", "local").with_label("zone", "b");
        assert_eq!(spec.evaluate(&mismatched), Err(Rejection::Labels));
    }

    #[test]
    fn subjects_without_labels_fail_label_rules() {
        let spec = FilterSpec::hosts_labelled(BTreeMap::from([("a".into(), "b".into())]));
        assert_eq!(spec.evaluate(&Volume::new("pv")), Err(Rejection::Labels));
    }
}
