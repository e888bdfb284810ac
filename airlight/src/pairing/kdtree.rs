//! Exact k-nearest-neighbour search over fixed-dimension `f32` vectors.
//!
//! Points live in one flat row-major buffer. Interior nodes split on the
//! dimension with the widest spread at the median; ranges of at most
//! `leaf_size` points are scanned linearly.

/// Points per leaf bucket.
pub const DEFAULT_LEAF_SIZE: usize = 30;

#[derive(Debug)]
pub struct KdTree {
    dim: usize,
    points: Vec<f32>,
    /// Permutation of point indices; every node owns a contiguous range.
    order: Vec<usize>,
    nodes: Vec<KdNode>,
}

#[derive(Debug, Clone)]
enum KdNode {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        dim: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

impl KdTree {
    /// Build a tree over `points.len() / dim` vectors.
    ///
    /// Returns `None` when there are no points.
    pub fn build(points: Vec<f32>, dim: usize) -> Option<Self> {
        Self::build_with_leaf_size(points, dim, DEFAULT_LEAF_SIZE)
    }

    pub fn build_with_leaf_size(points: Vec<f32>, dim: usize, leaf_size: usize) -> Option<Self> {
        debug_assert!(dim > 0 && points.len() % dim == 0);
        let n = points.len() / dim;
        if n == 0 {
            return None;
        }

        let mut tree = Self {
            dim,
            points,
            order: (0..n).collect(),
            nodes: Vec::with_capacity(2 * n.div_ceil(leaf_size.max(1))),
        };
        tree.build_recursive(0, n, leaf_size.max(1));
        Some(tree)
    }

    fn build_recursive(&mut self, start: usize, end: usize, leaf_size: usize) -> usize {
        let node_idx = self.nodes.len();
        self.nodes.push(KdNode::Leaf { start, end });

        if end - start <= leaf_size {
            return node_idx;
        }

        let Some(split_dim) = self.widest_dimension(start, end) else {
            // Every point in the range is identical.
            return node_idx;
        };

        let median = (end - start) / 2;
        let (points, dim) = (&self.points, self.dim);
        self.order[start..end].select_nth_unstable_by(median, |&a, &b| {
            points[a * dim + split_dim].total_cmp(&points[b * dim + split_dim])
        });
        let value = self.coord(self.order[start + median], split_dim);

        let left = self.build_recursive(start, start + median, leaf_size);
        let right = self.build_recursive(start + median, end, leaf_size);

        self.nodes[node_idx] = KdNode::Split {
            dim: split_dim,
            value,
            left,
            right,
        };
        node_idx
    }

    /// Dimension with the largest max-min spread, or `None` if all spreads are zero.
    fn widest_dimension(&self, start: usize, end: usize) -> Option<usize> {
        let mut lo = vec![f32::INFINITY; self.dim];
        let mut hi = vec![f32::NEG_INFINITY; self.dim];
        for &idx in &self.order[start..end] {
            for (d, &v) in self.point(idx).iter().enumerate() {
                lo[d] = lo[d].min(v);
                hi[d] = hi[d].max(v);
            }
        }

        let (dim, spread) = lo
            .iter()
            .zip(&hi)
            .map(|(l, h)| h - l)
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        (spread > 0.0).then_some(dim)
    }

    #[inline]
    fn coord(&self, idx: usize, dim: usize) -> f32 {
        self.points[idx * self.dim + dim]
    }

    /// Vector of point `idx`.
    #[inline]
    pub fn point(&self, idx: usize) -> &[f32] {
        &self.points[idx * self.dim..(idx + 1) * self.dim]
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The `k` points closest to `query` as `(index, distance_squared)`,
    /// nearest first. Returns fewer than `k` when the tree is smaller.
    pub fn k_nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        debug_assert_eq!(query.len(), self.dim);
        if k == 0 {
            return Vec::new();
        }

        let mut heap = BoundedMaxHeap::new(k);
        self.k_nearest_recursive(0, query, &mut heap);

        let mut result = heap.into_vec();
        result.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        result
    }

    fn k_nearest_recursive(&self, node_idx: usize, query: &[f32], heap: &mut BoundedMaxHeap) {
        match self.nodes[node_idx] {
            KdNode::Leaf { start, end } => {
                for &idx in &self.order[start..end] {
                    heap.push(idx, distance_squared(query, self.point(idx)));
                }
            }
            KdNode::Split {
                dim,
                value,
                left,
                right,
            } => {
                let diff = query[dim] - value;
                let (first, second) = if diff <= 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };

                self.k_nearest_recursive(first, query, heap);

                // The far side can only help if the splitting plane is closer
                // than the current k-th neighbour.
                if !heap.is_full() || diff * diff <= heap.max_distance() {
                    self.k_nearest_recursive(second, query, heap);
                }
            }
        }
    }
}

#[inline]
fn distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Keeps the `capacity` smallest distances seen so far.
#[derive(Debug)]
struct BoundedMaxHeap {
    capacity: usize,
    items: Vec<(usize, f32)>, // (index, distance_squared)
}

impl BoundedMaxHeap {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity + 1),
        }
    }

    fn push(&mut self, idx: usize, dist_sq: f32) {
        if self.items.len() < self.capacity {
            self.items.push((idx, dist_sq));
            self.sift_up(self.items.len() - 1);
        } else if dist_sq < self.items[0].1 {
            self.items[0] = (idx, dist_sq);
            self.sift_down(0);
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn max_distance(&self) -> f32 {
        self.items.first().map_or(f32::INFINITY, |item| item.1)
    }

    fn into_vec(self) -> Vec<(usize, f32)> {
        self.items
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[idx].1 > self.items[parent].1 {
                self.items.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut largest = idx;

            if left < self.items.len() && self.items[left].1 > self.items[largest].1 {
                largest = left;
            }
            if right < self.items.len() && self.items[right].1 > self.items[largest].1 {
                largest = right;
            }

            if largest == idx {
                break;
            }
            self.items.swap(idx, largest);
            idx = largest;
        }
    }
}
