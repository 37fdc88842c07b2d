use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ClusterError;

/// How the score between two merged clusters and a third one is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Size-weighted mean of the pairwise scores.
    #[default]
    Average,
    /// Best pairwise score.
    Single,
    /// Worst pairwise score.
    Complete,
    /// Unweighted mean of the two merged clusters' scores.
    Weighted,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Average => write!(f, "average"),
            Self::Single => write!(f, "single"),
            Self::Complete => write!(f, "complete"),
            Self::Weighted => write!(f, "weighted"),
        }
    }
}

impl FromStr for Linkage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(Self::Average),
            "single" => Ok(Self::Single),
            "complete" => Ok(Self::Complete),
            "weighted" => Ok(Self::Weighted),
            other => Err(format!("unknown linkage {other:?}")),
        }
    }
}

/// Orientation of the input scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Log-likelihood ratios: higher means more similar.
    #[default]
    Llr,
    /// Distances: lower means more similar.
    Distance,
}

impl Metric {
    fn to_similarity(self, score: f64) -> f64 {
        match self {
            Self::Llr => score,
            Self::Distance => -score,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llr => write!(f, "llr"),
            Self::Distance => write!(f, "distance"),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llr" => Ok(Self::Llr),
            "distance" => Ok(Self::Distance),
            other => Err(format!("unknown metric {other:?}")),
        }
    }
}

/// Where to cut the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// Exactly this many clusters.
    NumClusters(usize),
    /// Keep merging while the merge score is at least as good as the
    /// threshold (`>=` for LLR, `<=` for distances).
    Threshold(f64),
}

/// One agglomeration step. Items are clusters `0..n`; the cluster created
/// by step `s` gets id `n + s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub a: usize,
    pub b: usize,
    /// Linkage score in the input's orientation.
    pub score: f64,
    /// Items in the merged cluster.
    pub size: usize,
}

/// Most similar active slot above `i`, lowest slot on ties.
fn nearest_above(sim: &DMatrix<f64>, active: &[bool], i: usize) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for j in (i + 1..active.len()).filter(|&j| active[j]) {
        if best.is_none_or(|(_, s)| sim[(i, j)] > s) {
            best = Some((j, sim[(i, j)]));
        }
    }
    best
}

/// Agglomerative hierarchical clustering over a precomputed score matrix.
///
/// Each step merges the active pair with the highest similarity. Ties go to
/// the pair with the lowest `(i, j)` slot indices, and the merged cluster
/// takes the lower slot, so results are reproducible.
#[derive(Debug, Clone)]
pub struct Ahc {
    linkage: Linkage,
    metric: Metric,
    num_items: usize,
    merges: Vec<Merge>,
    fitted: bool,
}

impl Ahc {
    pub fn new(linkage: Linkage, metric: Metric) -> Self {
        Self {
            linkage,
            metric,
            num_items: 0,
            merges: Vec::new(),
            fitted: false,
        }
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// The dendrogram, one record per merge in merge order.
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Builds the dendrogram. The matrix is symmetrized by averaging it with
    /// its transpose; the diagonal is ignored.
    pub fn fit(&mut self, scores: &DMatrix<f64>) -> Result<(), ClusterError> {
        let (rows, cols) = scores.shape();
        if rows != cols {
            return Err(ClusterError::NotSquare { rows, cols });
        }
        if rows == 0 {
            return Err(ClusterError::Empty);
        }
        let n = rows;
        let mut sim = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let s = 0.5 * (scores[(i, j)] + scores[(j, i)]);
                if s.is_nan() {
                    return Err(ClusterError::NotANumber { row: i, col: j });
                }
                sim[(i, j)] = self.metric.to_similarity(s);
            }
        }

        let mut active = vec![true; n];
        let mut size = vec![1usize; n];
        let mut id: Vec<usize> = (0..n).collect();
        let mut nearest: Vec<Option<(usize, f64)>> = (0..n).map(|i| nearest_above(&sim, &active, i)).collect();
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for step in 0..n.saturating_sub(1) {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in (0..n).filter(|&i| active[i]) {
                if let Some((j, s)) = nearest[i] {
                    if best.is_none_or(|(_, _, b)| s > b) {
                        best = Some((i, j, s));
                    }
                }
            }
            let Some((i, j, s)) = best else {
                break;
            };

            let (ni, nj) = (size[i] as f64, size[j] as f64);
            for k in (0..n).filter(|&k| active[k] && k != i && k != j) {
                let (sik, sjk) = (sim[(i, k)], sim[(j, k)]);
                let merged = match self.linkage {
                    Linkage::Average => (ni * sik + nj * sjk) / (ni + nj),
                    Linkage::Single => sik.max(sjk),
                    Linkage::Complete => sik.min(sjk),
                    Linkage::Weighted => 0.5 * (sik + sjk),
                };
                sim[(i, k)] = merged;
                sim[(k, i)] = merged;
            }

            merges.push(Merge {
                a: id[i].min(id[j]),
                b: id[i].max(id[j]),
                score: self.metric.to_similarity(s),
                size: size[i] + size[j],
            });
            active[j] = false;
            nearest[j] = None;
            size[i] += size[j];
            id[i] = n + step;

            // Only rows that pointed at a merged slot, or that now see a
            // better score towards slot i, change their nearest neighbour.
            for k in (0..n).filter(|&k| active[k]) {
                let current = nearest[k];
                match current {
                    _ if k == i => nearest[k] = nearest_above(&sim, &active, k),
                    Some((m, _)) if m == i || m == j => nearest[k] = nearest_above(&sim, &active, k),
                    Some((m, b)) if k < i && (sim[(k, i)] > b || (sim[(k, i)] == b && i < m)) => {
                        nearest[k] = Some((i, sim[(k, i)]));
                    }
                    None if k < i => nearest[k] = Some((i, sim[(k, i)])),
                    _ => {}
                }
            }
        }

        debug!(
            items = n,
            linkage = %self.linkage,
            metric = %self.metric,
            "ahc dendrogram built"
        );
        self.num_items = n;
        self.merges = merges;
        self.fitted = true;
        Ok(())
    }

    /// Flat labels for every item, numbered `0..` in order of first
    /// appearance.
    pub fn get_flat_clusters(&self, criterion: Criterion) -> Result<Vec<usize>, ClusterError> {
        if !self.fitted {
            return Err(ClusterError::NotFitted);
        }
        let n = self.num_items;
        let num_merges = match criterion {
            Criterion::NumClusters(k) => {
                if k == 0 || k > n {
                    return Err(ClusterError::InvalidClusterCount { requested: k, items: n });
                }
                n - k
            }
            Criterion::Threshold(t) => self
                .merges
                .iter()
                .take_while(|m| self.metric.to_similarity(m.score) >= self.metric.to_similarity(t))
                .count(),
        };

        let mut parent: Vec<usize> = (0..n + num_merges).collect();
        for (step, m) in self.merges.iter().take(num_merges).enumerate() {
            parent[m.a] = n + step;
            parent[m.b] = n + step;
        }
        let root = |mut c: usize| {
            while parent[c] != c {
                c = parent[c];
            }
            c
        };

        let mut dense = HashMap::new();
        Ok((0..n)
            .map(|item| {
                let next = dense.len();
                *dense.entry(root(item)).or_insert(next)
            })
            .collect())
    }
}
