//! Class label bookkeeping.
//!
//! Training data carries arbitrary class identifiers (speaker names,
//! cluster numbers). Models only ever see dense integer ids `0..num_classes`.

use std::collections::BTreeMap;

/// Dense class ids for a sequence of string labels.
///
/// Ids follow the sorted order of the distinct labels, so the mapping does
/// not depend on the order samples arrive in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassIndex {
    names: Vec<String>,
    ids: Vec<usize>,
}

impl ClassIndex {
    /// Builds the index from one label per sample.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut names: Vec<String> = labels.iter().map(|s| s.as_ref().to_string()).collect();
        names.sort();
        names.dedup();
        let lookup: BTreeMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let ids = labels.iter().map(|s| lookup[s.as_ref()]).collect();
        Self { names, ids }
    }

    /// Dense id of every sample, in input order.
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Distinct labels; `names()[id]` is the label of class `id`.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn num_classes(&self) -> usize {
        self.names.len()
    }
}

/// Maps arbitrary integer labels onto `0..num_classes` keeping their order.
/// Returns the dense ids and the number of classes.
pub fn densify(ids: &[usize]) -> (Vec<usize>, usize) {
    let mut distinct: Vec<usize> = ids.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    let lookup: BTreeMap<usize, usize> = distinct
        .iter()
        .enumerate()
        .map(|(dense, &orig)| (orig, dense))
        .collect();
    (ids.iter().map(|id| lookup[id]).collect(), distinct.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_index_sorted_ids() {
        let idx = ClassIndex::from_labels(&["bob", "alice", "bob", "carol"]);
        assert_eq!(idx.names(), &["alice", "bob", "carol"]);
        assert_eq!(idx.ids(), &[1, 0, 1, 2]);
        assert_eq!(idx.num_classes(), 3);
    }

    #[test]
    fn densify_gaps() {
        let (ids, n) = densify(&[7, 3, 7, 10]);
        assert_eq!(ids, vec![1, 0, 1, 2]);
        assert_eq!(n, 3);
    }

    #[test]
    fn densify_empty() {
        let (ids, n) = densify(&[]);
        assert!(ids.is_empty());
        assert_eq!(n, 0);
    }
}
