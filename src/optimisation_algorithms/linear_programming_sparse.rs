/// Sparse vector with entries stored in insertion order.
///
/// Rows of the sparse tableau keep their indices sorted, which [`SparseVec::get`] and
/// [`SparseVec::merge_scaled`] rely on. Eta factors only iterate.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct SparseVec {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVec {
    pub(crate) fn new() -> SparseVec {
        SparseVec {
            indices: vec![],
            values: vec![],
        }
    }

    pub(crate) fn with_capacity(capacity: usize) -> SparseVec {
        SparseVec {
            indices: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.indices.clear();
        self.values.clear();
    }

    pub(crate) fn push(&mut self, i: usize, val: f64) {
        self.indices.push(i);
        self.values.push(val);
    }

    pub(crate) fn len(&self) -> usize {
        self.indices.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Value at index `i`; requires sorted indices.
    pub(crate) fn get(&self, i: usize) -> f64 {
        match self.indices.binary_search(&i) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub(crate) fn scale(&mut self, factor: f64) {
        for val in &mut self.values {
            *val *= factor;
        }
    }

    /// Sets the value at an index that is already present; requires sorted indices.
    pub(crate) fn set_existing(&mut self, i: usize, val: f64) -> bool {
        match self.indices.binary_search(&i) {
            Ok(pos) => {
                self.values[pos] = val;
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn dot(&self, dense: &[f64]) -> f64 {
        self.iter().map(|(i, val)| val * dense[i]).sum()
    }

    /// Adds `alpha * self` to a dense vector.
    pub(crate) fn scatter_scaled(&self, alpha: f64, dense: &mut [f64]) {
        for (i, val) in self.iter() {
            dense[i] += alpha * val;
        }
    }

    pub(crate) fn to_dense(&self, len: usize) -> Vec<f64> {
        let mut dense = vec![0.0; len];
        self.scatter_scaled(1.0, &mut dense);
        dense
    }

    /// Writes `self - alpha * other` into `out`, dropping entries at or below `drop_tolerance`
    /// and the entry at `cancel` (which the caller knows to vanish). Both inputs must be sorted.
    pub(crate) fn merge_scaled(
        &self,
        alpha: f64,
        other: &SparseVec,
        drop_tolerance: f64,
        cancel: usize,
        out: &mut SparseVec,
    ) {
        out.clear();
        let (mut a, mut b) = (0, 0);
        while a < self.len() || b < other.len() {
            let (i, val) = if b >= other.len()
                || (a < self.len() && self.indices[a] < other.indices[b])
            {
                a += 1;
                (self.indices[a - 1], self.values[a - 1])
            } else if a >= self.len() || other.indices[b] < self.indices[a] {
                b += 1;
                (other.indices[b - 1], -alpha * other.values[b - 1])
            } else {
                a += 1;
                b += 1;
                (
                    self.indices[a - 1],
                    self.values[a - 1] - alpha * other.values[b - 1],
                )
            };
            if i != cancel && val.abs() > drop_tolerance {
                out.push(i, val);
            }
        }
    }
}

/// Free list of sparse vectors of one fixed dimension.
#[derive(Clone, Debug)]
pub(crate) struct SparseVecPool {
    dimension: usize,
    free: Vec<SparseVec>,
    recycled: usize,
}

impl SparseVecPool {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            free: vec![],
            recycled: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn dimension(&self) -> usize {
        self.dimension
    }

    /// Changing the dimension empties the pool.
    pub(crate) fn resize(&mut self, dimension: usize) {
        if dimension != self.dimension {
            self.dimension = dimension;
            self.free.clear();
        }
    }

    pub(crate) fn take(&mut self) -> SparseVec {
        match self.free.pop() {
            Some(vec) => {
                self.recycled += 1;
                vec
            }
            None => SparseVec::with_capacity(self.dimension.min(16)),
        }
    }

    pub(crate) fn give_back(&mut self, mut vec: SparseVec) {
        vec.clear();
        self.free.push(vec);
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.free.len()
    }

    #[cfg(test)]
    /// Number of vectors handed out from the free list rather than freshly allocated.
    pub(crate) fn recycled(&self) -> usize {
        self.recycled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_rows() {
        let mut row = SparseVec::new();
        row.push(0, 1.0);
        row.push(2, 4.0);
        row.push(5, 2.0);
        let mut pivot = SparseVec::new();
        pivot.push(1, 3.0);
        pivot.push(2, 2.0);
        pivot.push(6, 1.0);

        let mut out = SparseVec::new();
        row.merge_scaled(2.0, &pivot, 1e-12, usize::MAX, &mut out);
        assert_eq!(
            out.iter().collect::<Vec<_>>(),
            vec![(0, 1.0), (1, -6.0), (5, 2.0), (6, -2.0)]
        );
        assert_eq!(out.get(1), -6.0);
        assert_eq!(out.get(2), 0.0);

        row.merge_scaled(1.0, &pivot, 1e-12, 0, &mut out);
        assert_eq!(
            out.iter().collect::<Vec<_>>(),
            vec![(1, -3.0), (2, 2.0), (5, 2.0), (6, -1.0)]
        );
    }

    #[test]
    fn dense_products() {
        let mut vec = SparseVec::new();
        vec.push(1, 1.5);
        vec.push(3, -2.0);
        assert_eq!(vec.len(), 2);
        assert_eq!(vec.to_dense(4), vec![0.0, 1.5, 0.0, -2.0]);
        assert_eq!(vec.dot(&[1.0, 2.0, 3.0, 4.0]), -5.0);
        vec.scale(2.0);
        assert!(vec.set_existing(3, 1.0));
        assert!(!vec.set_existing(2, 1.0));
        assert_eq!(vec.to_dense(4), vec![0.0, 3.0, 0.0, 1.0]);
    }

    #[test]
    fn pool_recycles() {
        let mut pool = SparseVecPool::new(4);
        let mut vec = pool.take();
        vec.push(1, 1.0);
        pool.give_back(vec);
        assert_eq!(pool.available(), 1);
        let vec = pool.take();
        assert!(vec.is_empty());
        assert_eq!(pool.recycled(), 1);
        pool.give_back(vec);
        pool.resize(5);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.dimension(), 5);
    }
}
