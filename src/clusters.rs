//! Cluster extraction: threshold the image against its smoothed background and
//! group the surviving pixels into connected regions.
//!
//! A pixel is order signal when `image > background + noise`. Raising `noise`
//! can therefore only remove pixels from the mask, never add them.
//!
//! Clusters are stored in an arena ordered by the raster position (row-major)
//! of their first pixel; the index in that arena is the cluster id used in
//! diagnostics and for tie-breaking when traces are sorted.

use ndarray::{Array2, ArrayView2, Zip};
use tracing::debug;

use crate::config::{Connectivity, TraceParams};
use crate::frame::clean;

/// A connected group of signal pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Stable id: rank of the cluster's first pixel in raster order.
    pub id: usize,
    /// `(row, column)` coordinates, in raster order.
    pub pixels: Vec<(usize, usize)>,
    /// Lowest column covered.
    pub min_col: usize,
    /// Highest column covered (inclusive).
    pub max_col: usize,
}

impl Cluster {
    fn new(id: usize) -> Self {
        Self {
            id,
            pixels: Vec::new(),
            min_col: usize::MAX,
            max_col: 0,
        }
    }

    fn push(&mut self, row: usize, col: usize) {
        self.pixels.push((row, col));
        self.min_col = self.min_col.min(col);
        self.max_col = self.max_col.max(col);
    }

    /// Number of pixels.
    pub fn size(&self) -> usize {
        self.pixels.len()
    }

    /// Number of columns between the leftmost and rightmost pixel, inclusive.
    pub fn width(&self) -> usize {
        if self.pixels.is_empty() {
            0
        } else {
            self.max_col - self.min_col + 1
        }
    }
}

/// Output of the cluster extraction stage.
#[derive(Debug, Clone)]
pub struct ClusterExtraction {
    /// Clusters that passed the size filters, in id order.
    pub clusters: Vec<Cluster>,
    /// Number of pixels marked as signal.
    pub num_signal_pixels: usize,
    /// Number of connected components before size filtering.
    pub num_clusters_raw: usize,
}

/// Mark pixels strictly brighter than `background + noise`.
pub fn signal_mask(
    image: ArrayView2<'_, f64>,
    background: ArrayView2<'_, f64>,
    noise: f64,
) -> Array2<bool> {
    Zip::from(&image)
        .and(&background)
        .map_collect(|&v, &b| clean(v) > b + noise)
}

/// Threshold, label and filter clusters.
pub fn extract_clusters(
    image: ArrayView2<'_, f64>,
    background: ArrayView2<'_, f64>,
    params: &TraceParams,
) -> ClusterExtraction {
    let mask = signal_mask(image, background, params.noise);
    let num_signal_pixels = mask.iter().filter(|&&m| m).count();

    let (labels, num_labels) = label_connected_components(mask.view(), params.connectivity);

    let mut arena: Vec<Cluster> = (0..num_labels).map(Cluster::new).collect();
    for ((row, col), &label) in labels.indexed_iter() {
        if label > 0 {
            arena[label as usize - 1].push(row, col);
        }
    }

    let clusters: Vec<Cluster> = arena
        .into_iter()
        .filter(|c| c.size() >= params.min_cluster && c.width() >= params.min_width)
        .collect();

    debug!(
        "Cluster extraction: {} signal pixels, {} raw clusters, {} kept (min_cluster={}, min_width={})",
        num_signal_pixels,
        num_labels,
        clusters.len(),
        params.min_cluster,
        params.min_width
    );

    ClusterExtraction {
        clusters,
        num_signal_pixels,
        num_clusters_raw: num_labels,
    }
}

/// Label connected components in a binary mask using two-pass union-find.
///
/// Returns the label image (0 = background, labels `1..=n` numbered in raster
/// order of each component's first pixel) and the number of components `n`.
pub fn label_connected_components(
    mask: ArrayView2<'_, bool>,
    connectivity: Connectivity,
) -> (Array2<u32>, usize) {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    let mut parent: Vec<u32> = vec![0];
    let mut next_label = 1u32;

    fn find(parent: &mut [u32], mut x: u32) -> u32 {
        while parent[x as usize] != x {
            parent[x as usize] = parent[parent[x as usize] as usize];
            x = parent[x as usize];
        }
        x
    }

    fn union(parent: &mut [u32], a: u32, b: u32) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            // Merge higher into lower to keep labels stable
            if ra < rb {
                parent[rb as usize] = ra;
            } else {
                parent[ra as usize] = rb;
            }
        }
    }

    // First pass: provisional labels from already-visited neighbours
    let mut neighbors: Vec<u32> = Vec::with_capacity(4);
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            neighbors.clear();
            if col > 0 && labels[[row, col - 1]] > 0 {
                neighbors.push(labels[[row, col - 1]]);
            }
            if row > 0 && labels[[row - 1, col]] > 0 {
                neighbors.push(labels[[row - 1, col]]);
            }
            if connectivity == Connectivity::Eight && row > 0 {
                if col > 0 && labels[[row - 1, col - 1]] > 0 {
                    neighbors.push(labels[[row - 1, col - 1]]);
                }
                if col + 1 < w && labels[[row - 1, col + 1]] > 0 {
                    neighbors.push(labels[[row - 1, col + 1]]);
                }
            }

            match neighbors.iter().min().copied() {
                None => {
                    parent.push(next_label);
                    labels[[row, col]] = next_label;
                    next_label += 1;
                }
                Some(min_label) => {
                    labels[[row, col]] = min_label;
                    for &nl in &neighbors {
                        union(&mut parent, min_label, nl);
                    }
                }
            }
        }
    }

    // Second pass: flatten roots to sequential labels in raster order
    let mut root_map = vec![0u32; parent.len()];
    let mut seq = 0u32;
    for label in labels.iter_mut() {
        if *label > 0 {
            let root = find(&mut parent, *label) as usize;
            if root_map[root] == 0 {
                seq += 1;
                root_map[root] = seq;
            }
            *label = root_map[root];
        }
    }

    (labels, seq as usize)
}
