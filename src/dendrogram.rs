use crate::cluster::{ClusteringResult, Node};
use crate::error::{PipelineError, Result, Stage};
use serde::Serialize;

/// Placement of the dendrogram beside the heatmap grid.
#[derive(Debug, Clone)]
pub struct DendrogramOptions {
    /// Number of measurement columns drawn in the heatmap
    pub axis_length: usize,
    /// Shift applied to leaf positions (row axis)
    pub offset: f64,
    /// Gap between the last heatmap column and the dendrogram
    pub padding: f64,
    /// Heights are drawn as h / h^e; 0 keeps raw heights
    pub shrink_exponent: f64,
}

impl Default for DendrogramOptions {
    fn default() -> Self {
        Self {
            axis_length: 0,
            offset: 0.0,
            padding: 0.1,
            shrink_exponent: 0.75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub x: f64,
    pub y: f64,
    pub xend: f64,
    pub yend: f64,
}

/// Rectangular dendrogram in heatmap coordinates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentSet {
    /// One segment per merge edge, from the child's height to its parent's
    pub edges: Vec<Segment>,
    /// One cross bar per merge, joining its two children
    pub bars: Vec<Segment>,
}

impl SegmentSet {
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.edges.iter().chain(self.bars.iter())
    }

    pub fn max_x(&self) -> Option<f64> {
        self.iter()
            .flat_map(|s| [s.x, s.xend])
            .reduce(f64::max)
    }
}

/// Compress merge heights: h^(1 - e), with 0 mapped to 0.
pub fn shrink_height(height: f64, exponent: f64) -> f64 {
    if height <= 0.0 {
        0.0
    } else {
        height / height.powf(exponent)
    }
}

struct Transform {
    x_shift: f64,
    y_shift: f64,
    exponent: f64,
}

impl Transform {
    // (leaf position, height) -> swapped, shrunk, shifted segment
    fn segment(&self, pos: f64, h0: f64, pos_end: f64, h1: f64) -> Segment {
        Segment {
            x: shrink_height(h0, self.exponent) + self.x_shift,
            y: pos + self.y_shift,
            xend: shrink_height(h1, self.exponent) + self.x_shift,
            yend: pos_end + self.y_shift,
        }
    }
}

pub fn map_dendrogram(result: &ClusteringResult, options: &DendrogramOptions) -> Result<SegmentSet> {
    if !options.shrink_exponent.is_finite() || options.shrink_exponent >= 1.0 {
        return Err(PipelineError::invalid(
            Stage::Dendrogram,
            format!(
                "shrink exponent must be finite and below 1, got {}",
                options.shrink_exponent
            ),
        ));
    }
    if !options.padding.is_finite() || options.padding < 0.0 {
        return Err(PipelineError::invalid(
            Stage::Dendrogram,
            format!("padding must be finite and non-negative, got {}", options.padding),
        ));
    }
    if !options.offset.is_finite() {
        return Err(PipelineError::invalid(
            Stage::Dendrogram,
            format!("offset must be finite, got {}", options.offset),
        ));
    }

    let transform = Transform {
        x_shift: options.axis_length as f64 + options.padding,
        y_shift: options.offset,
        exponent: options.shrink_exponent,
    };

    let mut leaf_pos = vec![0.0; result.n_leaves()];
    for (p, &leaf) in result.order().iter().enumerate() {
        leaf_pos[leaf] = (p + 1) as f64;
    }

    let merges = result.merges();
    let mut placed: Vec<(f64, f64)> = Vec::with_capacity(merges.len());
    let mut set = SegmentSet {
        edges: Vec::with_capacity(2 * merges.len()),
        bars: Vec::with_capacity(merges.len()),
    };
    for merge in merges {
        let place = |node: Node| match node {
            Node::Leaf(i) => (leaf_pos[i], 0.0),
            Node::Merge(m) => placed[m],
        };
        let (left_pos, left_h) = place(merge.left);
        let (right_pos, right_h) = place(merge.right);
        set.edges
            .push(transform.segment(left_pos, left_h, left_pos, merge.height));
        set.edges
            .push(transform.segment(right_pos, right_h, right_pos, merge.height));
        set.bars
            .push(transform.segment(left_pos, merge.height, right_pos, merge.height));
        placed.push(((left_pos + right_pos) / 2.0, merge.height));
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{cluster, DistanceMetric, Linkage};
    use crate::table::ObservationTable;

    fn clustered(values: &[f64]) -> ClusteringResult {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| vec![format!("r{}", i), v.to_string()])
            .collect();
        let table = ObservationTable::new(vec!["id".into(), "v".into()], rows).unwrap();
        cluster(&table, &["v".to_string()], DistanceMetric::Euclidean, Linkage::Ward).unwrap()
    }

    #[test]
    fn zero_height_maps_to_zero() {
        assert_eq!(shrink_height(0.0, 0.75), 0.0);
        assert!((shrink_height(16.0, 0.75) - 2.0).abs() < 1e-12);
        assert_eq!(shrink_height(3.0, 0.0), 3.0);
    }

    #[test]
    fn segment_count_and_shift() {
        let result = clustered(&[1.0, 2.0, 4.0, 8.0, 16.0]);
        let options = DendrogramOptions {
            axis_length: 6,
            ..DendrogramOptions::default()
        };
        let set = map_dendrogram(&result, &options).unwrap();
        assert_eq!(set.edges.len(), 2 * (5 - 1));
        assert_eq!(set.bars.len(), 4);
        for s in set.iter() {
            assert!(s.x >= 6.0 && s.xend >= 6.0);
            assert!(s.x.is_finite() && s.y.is_finite());
        }
        // leaves start right after the padding
        let min_x = set.iter().map(|s| s.x.min(s.xend)).fold(f64::INFINITY, f64::min);
        assert!((min_x - 6.1).abs() < 1e-12);
    }

    #[test]
    fn identical_rows_produce_finite_coordinates() {
        let result = clustered(&[3.0, 3.0, 3.0]);
        let set = map_dendrogram(&result, &DendrogramOptions::default()).unwrap();
        assert!(set.iter().all(|s| s.x == 0.1 && s.xend == 0.1));
    }

    #[test]
    fn leaves_follow_row_axis_with_offset() {
        let result = clustered(&[0.0, 10.0]);
        let options = DendrogramOptions {
            axis_length: 2,
            offset: 0.5,
            padding: 0.0,
            shrink_exponent: 0.0,
        };
        let set = map_dendrogram(&result, &options).unwrap();
        assert_eq!(
            set.edges[0],
            Segment { x: 2.0, y: 1.5, xend: 12.0, yend: 1.5 }
        );
        assert_eq!(set.bars[0], Segment { x: 12.0, y: 1.5, xend: 12.0, yend: 2.5 });
        assert_eq!(set.max_x(), Some(12.0));
    }

    #[test]
    fn rejects_bad_exponent_and_padding() {
        let result = clustered(&[0.0, 1.0]);
        let bad_exp = DendrogramOptions {
            shrink_exponent: 1.0,
            ..DendrogramOptions::default()
        };
        assert!(map_dendrogram(&result, &bad_exp).is_err());
        let bad_pad = DendrogramOptions {
            padding: -0.5,
            ..DendrogramOptions::default()
        };
        assert!(map_dendrogram(&result, &bad_pad).is_err());
    }
}
