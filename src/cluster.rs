use crate::error::{PipelineError, Result, Stage};
use crate::table::ObservationTable;
use rayon::prelude::*;
use std::fmt;

/// Pairwise distance between two observation rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    /// Chebyshev (largest coordinate difference)
    Maximum,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let diffs = a.iter().zip(b).map(|(x, y)| (x - y).abs());
        match self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => diffs.sum(),
            DistanceMetric::Maximum => diffs.fold(0.0, f64::max),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "manhattan" | "cityblock" => Ok(DistanceMetric::Manhattan),
            "maximum" | "chebyshev" => Ok(DistanceMetric::Maximum),
            _ => Err(format!("Unknown distance metric: {}", s)),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Maximum => "maximum",
        })
    }
}

/// Rule for the distance between two clusters during agglomeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Ward's minimum variance criterion (ward.D2: works on squared distances)
    Ward,
    Complete,
    Single,
    /// UPGMA
    Average,
}

impl Linkage {
    /// Lance-Williams update: distance from cluster k to the union of i and j.
    fn update(&self, dki: f64, dkj: f64, dij: f64, ni: usize, nj: usize, nk: usize) -> f64 {
        let (ni, nj, nk) = (ni as f64, nj as f64, nk as f64);
        match self {
            Linkage::Single => dki.min(dkj),
            Linkage::Complete => dki.max(dkj),
            Linkage::Average => (ni * dki + nj * dkj) / (ni + nj),
            Linkage::Ward => ((ni + nk) * dki + (nj + nk) * dkj - nk * dij) / (ni + nj + nk),
        }
    }

    fn squares_distances(&self) -> bool {
        matches!(self, Linkage::Ward)
    }
}

impl std::str::FromStr for Linkage {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ward" | "ward.d2" => Ok(Linkage::Ward),
            "complete" => Ok(Linkage::Complete),
            "single" => Ok(Linkage::Single),
            "average" | "upgma" => Ok(Linkage::Average),
            _ => Err(format!("Unknown linkage method: {}", s)),
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Linkage::Ward => "ward",
            Linkage::Complete => "complete",
            Linkage::Single => "single",
            Linkage::Average => "average",
        })
    }
}

/// Square, symmetric, non-negative distance matrix stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn compute(points: &[Vec<f64>], metric: DistanceMetric) -> Self {
        let n = points.len();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .map(|j| if i == j { 0.0 } else { metric.distance(&points[i], &points[j]) })
                    .collect()
            })
            .collect();
        Self {
            n,
            values: rows.into_iter().flatten().collect(),
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }
}

/// Child of a merge: an original row or an earlier merge (by index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Leaf(usize),
    Merge(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    /// Child holding the smaller original row index
    pub left: Node,
    pub right: Node,
    pub height: f64,
    /// Number of leaves under this merge
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct ClusteringResult {
    merges: Vec<Merge>,
    order: Vec<usize>,
    distances: DistanceMatrix,
}

impl ClusteringResult {
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Leaf order: row indices as they appear along the dendrogram.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }

    pub fn n_leaves(&self) -> usize {
        self.order.len()
    }

    /// Table permuted into leaf order.
    pub fn reorder(&self, table: &ObservationTable) -> Result<ObservationTable> {
        table.reorder(&self.order)
    }

    /// True when every merge's leaves form one contiguous run of the leaf order.
    pub fn has_contiguous_subtrees(&self) -> bool {
        let mut pos = vec![0usize; self.order.len()];
        for (p, &leaf) in self.order.iter().enumerate() {
            pos[leaf] = p;
        }
        // (first position, last position, leaf count) per merge
        let mut spans: Vec<(usize, usize, usize)> = Vec::with_capacity(self.merges.len());
        let span_of = |node: Node, spans: &[(usize, usize, usize)]| match node {
            Node::Leaf(i) => (pos[i], pos[i], 1),
            Node::Merge(m) => spans[m],
        };
        for merge in &self.merges {
            let (l0, l1, lc) = span_of(merge.left, &spans);
            let (r0, r1, rc) = span_of(merge.right, &spans);
            let span = (l0.min(r0), l1.max(r1), lc + rc);
            if span.1 - span.0 + 1 != span.2 {
                return false;
            }
            spans.push(span);
        }
        true
    }
}

/// Cluster the rows of `table` on `numeric_columns`.
pub fn cluster(
    table: &ObservationTable,
    numeric_columns: &[String],
    metric: DistanceMetric,
    linkage: Linkage,
) -> Result<ClusteringResult> {
    if numeric_columns.is_empty() {
        return Err(PipelineError::invalid(
            Stage::Cluster,
            "no numeric columns given",
        ));
    }
    if table.n_rows() < 2 {
        return Err(PipelineError::InsufficientData {
            stage: Stage::Cluster,
            rows: table.n_rows(),
            required: 2,
        });
    }

    let mut points = vec![Vec::with_capacity(numeric_columns.len()); table.n_rows()];
    for name in numeric_columns {
        let values = table.numeric_column(name, Stage::Cluster)?;
        for (row, value) in values.into_iter().enumerate() {
            if !value.is_finite() {
                return Err(PipelineError::invalid(
                    Stage::Cluster,
                    format!("row {}, column '{}': non-finite value {}", row + 1, name, value),
                ));
            }
            points[row].push(value);
        }
    }

    let distances = DistanceMatrix::compute(&points, metric);
    let merges = agglomerate(&distances, linkage)?;
    let order = leaf_order(&merges, table.n_rows());
    Ok(ClusteringResult {
        merges,
        order,
        distances,
    })
}

/// Row minimum over active columns right of `i`: first `j` at the minimum.
fn row_nearest(work: &[f64], active: &[bool], n: usize, i: usize) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for j in (i + 1..n).filter(|&j| active[j]) {
        let d = work[i * n + j];
        if best.map_or(true, |(_, b)| d < b) {
            best = Some((j, d));
        }
    }
    best
}

/// Agglomeration with a cached nearest neighbour per row, so a step costs
/// O(n) unless a row's cached partner was merged away.
/// Each step joins the lowest row holding the global minimum, so ties go
/// to the lowest pair. The merged cluster keeps the lower slot.
fn agglomerate(distances: &DistanceMatrix, linkage: Linkage) -> Result<Vec<Merge>> {
    let n = distances.n();
    let mut work: Vec<f64> = distances.values.clone();
    if linkage.squares_distances() {
        work.iter_mut().for_each(|d| *d *= *d);
    }
    let mut active = vec![true; n];
    let mut size = vec![1usize; n];
    let mut node: Vec<Node> = (0..n).map(Node::Leaf).collect();
    let mut nearest: Vec<Option<(usize, f64)>> =
        (0..n).map(|i| row_nearest(&work, &active, n, i)).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for step in 0..n.saturating_sub(1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in (0..n).filter(|&i| active[i]) {
            if let Some((j, d)) = nearest[i] {
                if best.map_or(true, |(_, _, b)| d < b) {
                    best = Some((i, j, d));
                }
            }
        }
        let (i, j, dij) = best.ok_or_else(|| {
            PipelineError::invalid(Stage::Cluster, "no cluster pair left to merge")
        })?;

        let height = if linkage.squares_distances() {
            dij.max(0.0).sqrt()
        } else {
            dij
        };
        merges.push(Merge {
            left: node[i],
            right: node[j],
            height,
            size: size[i] + size[j],
        });

        for k in (0..n).filter(|&k| active[k] && k != i && k != j) {
            let updated = linkage.update(work[k * n + i], work[k * n + j], dij, size[i], size[j], size[k]);
            work[k * n + i] = updated;
            work[i * n + k] = updated;
        }
        active[j] = false;
        nearest[j] = None;
        size[i] += size[j];
        node[i] = Node::Merge(step);

        for k in (0..n).filter(|&k| active[k]) {
            let stale = k == i || matches!(nearest[k], Some((m, _)) if m == i || m == j);
            if stale {
                nearest[k] = row_nearest(&work, &active, n, k);
            } else if k < i {
                let d = work[k * n + i];
                if nearest[k].map_or(true, |(m, b)| d < b || (d == b && i < m)) {
                    nearest[k] = Some((i, d));
                }
            }
        }
    }
    Ok(merges)
}

/// Depth-first walk from the root, left child first.
fn leaf_order(merges: &[Merge], n: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(n);
    let Some(root) = merges.len().checked_sub(1) else {
        return (0..n).collect();
    };
    let mut stack = vec![Node::Merge(root)];
    while let Some(node) = stack.pop() {
        match node {
            Node::Leaf(i) => order.push(i),
            Node::Merge(m) => {
                stack.push(merges[m].right);
                stack.push(merges[m].left);
            }
        }
    }
    order
}
