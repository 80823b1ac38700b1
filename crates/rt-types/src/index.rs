//! Collection indices: 1-D, 2-D, and 3-D tuples of small integers,
//! identifying a collection element. Indices form an ordered, hashable
//! value type. Linearization has column-major and row-major variants;
//! a given collection must use the same one throughout its lifetime.


use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::NodeId;

/// A dense N-dimensional (N in 1..=3) index or range bound, component-major
/// order `[dim0, dim1, dim2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Index {
    dims: [i64; 3],
    ndim: u8,
}

impl Index {
    #[must_use]
    pub fn one(x: i64) -> Self {
        Self { dims: [x, 0, 0], ndim: 1 }
    }

    #[must_use]
    pub fn two(x: i64, y: i64) -> Self {
        Self { dims: [x, y, 0], ndim: 2 }
    }

    #[must_use]
    pub fn three(x: i64, y: i64, z: i64) -> Self {
        Self { dims: [x, y, z], ndim: 3 }
    }

    #[must_use]
    pub fn ndim(self) -> u8 {
        self.ndim
    }

    #[must_use]
    pub fn component(self, dim: usize) -> i64 {
        assert!(dim < self.ndim as usize, "dimension out of range");
        self.dims[dim]
    }

    fn assert_same_rank(self, other: Self) {
        assert_eq!(self.ndim, other.ndim, "index/range dimensionality mismatch");
    }

    /// Linearize `self` (an index within `range`) in column-major order:
    /// dimension 0 varies fastest.
    #[must_use]
    pub fn linearize_colmaj(self, range: Self) -> i64 {
        self.assert_same_rank(range);
        let mut acc = 0i64;
        for d in (0..self.ndim as usize).rev() {
            acc = acc * range.dims[d] + self.dims[d];
        }
        acc
    }

    /// Inverse of [`Self::linearize_colmaj`].
    #[must_use]
    pub fn delinearize_colmaj(flat: i64, range: Self) -> Self {
        let mut dims = [0i64; 3];
        let mut rem = flat;
        for d in 0..range.ndim as usize {
            dims[d] = rem % range.dims[d];
            rem /= range.dims[d];
        }
        Self { dims, ndim: range.ndim }
    }

    /// Linearize `self` (an index within `range`) in row-major order: the
    /// last dimension varies fastest.
    #[must_use]
    pub fn linearize_rowmaj(self, range: Self) -> i64 {
        self.assert_same_rank(range);
        let mut acc = 0i64;
        for d in 0..self.ndim as usize {
            acc = acc * range.dims[d] + self.dims[d];
        }
        acc
    }

    /// Inverse of [`Self::linearize_rowmaj`].
    #[must_use]
    pub fn delinearize_rowmaj(flat: i64, range: Self) -> Self {
        let mut dims = [0i64; 3];
        let mut rem = flat;
        for d in (0..range.ndim as usize).rev() {
            dims[d] = rem % range.dims[d];
            rem /= range.dims[d];
        }
        Self { dims, ndim: range.ndim }
    }

    /// Total number of elements covered when `self` is used as a range.
    #[must_use]
    pub fn size(self) -> i64 {
        self.dims[..self.ndim as usize].iter().product()
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for d in 0..self.ndim as usize {
            if d > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", self.dims[d])?;
        }
        write!(f, ")")
    }
}

/// Which linearization scheme a collection uses. The
/// choice is made once and held for the collection's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linearization {
    ColumnMajor,
    RowMajor,
}

impl Linearization {
    #[must_use]
    pub fn linearize(self, index: Index, range: Index) -> i64 {
        match self {
            Self::ColumnMajor => index.linearize_colmaj(range),
            Self::RowMajor => index.linearize_rowmaj(range),
        }
    }

    #[must_use]
    pub fn delinearize(self, flat: i64, range: Index) -> Index {
        match self {
            Self::ColumnMajor => Index::delinearize_colmaj(flat, range),
            Self::RowMajor => Index::delinearize_rowmaj(flat, range),
        }
    }
}

/// Uniform block mapping of a flat range of size `total` over `num_nodes`
/// nodes: contiguous blocks, sizes differing by at most one element.
#[must_use]
pub fn block_map(flat_index: i64, total: i64, num_nodes: u32) -> NodeId {
    assert!(flat_index >= 0 && flat_index < total, "flat index out of range");
    let n = i64::from(num_nodes);
    let quotient = total / n;
    let remainder = total % n;
    let wide_block_elems = remainder * (quotient + 1);
    if flat_index < wide_block_elems {
        NodeId::new((flat_index / (quotient + 1)) as u32)
    } else {
        let offset = flat_index - wide_block_elems;
        NodeId::new((remainder + offset / quotient) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn colmaj_round_trips_3d() {
        let range = Index::three(3, 9, 23);
        let mut seen = std::collections::HashSet::new();
        for z in 0..3 {
            for y in 0..9 {
                for x in 0..23 {
                    let idx = Index::three(z, y, x);
                    let flat = idx.linearize_colmaj(range);
                    assert_eq!(Index::delinearize_colmaj(flat, range), idx);
                    seen.insert(flat);
                }
            }
        }
        assert_eq!(seen.len(), (3 * 9 * 23) as usize);
        assert_eq!(*seen.iter().min().unwrap(), 0);
        assert_eq!(*seen.iter().max().unwrap(), 3 * 9 * 23 - 1);
    }

    #[test]
    fn rowmaj_round_trips_3d_transposed_loop_order() {
        let range = Index::three(3, 9, 23);
        let mut seen = std::collections::HashSet::new();
        for x in 0..23 {
            for y in 0..9 {
                for z in 0..3 {
                    let idx = Index::three(z, y, x);
                    let flat = idx.linearize_rowmaj(range);
                    assert_eq!(Index::delinearize_rowmaj(flat, range), idx);
                    seen.insert(flat);
                }
            }
        }
        assert_eq!(seen.len(), (3 * 9 * 23) as usize);
    }

    proptest! {
        #[test]
        fn colmaj_round_trip_1d(x in 0i64..1000, range in 1i64..1000) {
            let x = x % range;
            let idx = Index::one(x);
            let r = Index::one(range);
            let flat = idx.linearize_colmaj(r);
            prop_assert_eq!(Index::delinearize_colmaj(flat, r), idx);
        }

        #[test]
        fn block_map_covers_floor_or_ceil(total in 1i64..500, num_nodes in 1u32..32) {
            let mut counts = vec![0i64; num_nodes as usize];
            for i in 0..total {
                let node = block_map(i, total, num_nodes);
                counts[node.as_u32() as usize] += 1;
            }
            let q = total / i64::from(num_nodes);
            let ceil = (total + i64::from(num_nodes) - 1) / i64::from(num_nodes);
            for c in counts {
                prop_assert!(c == q || c == ceil);
            }
        }
    }
}
