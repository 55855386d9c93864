use itertools::Itertools;

use crate::entities::Block;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Neighbors {
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

/// Reading-order neighbors of every block, built once per filtering pass.
///
/// Blocks of a page are ordered top to bottom, then left to right. Indices
/// refer to the slice the index was built from; malformed blocks are left
/// out and have no neighbors.
#[derive(Debug, Clone)]
pub struct NeighborIndex {
    neighbors: Vec<Neighbors>,
}

impl NeighborIndex {
    pub fn build(blocks: &[Block]) -> Self {
        Self::build_masked(blocks, |_| true)
    }

    /// Same as [`NeighborIndex::build`], over the blocks for which `include`
    /// holds. Left-out blocks have no neighbors and are nobody's neighbor.
    pub fn build_masked(blocks: &[Block], include: impl Fn(usize) -> bool) -> Self {
        let mut neighbors = vec![Neighbors::default(); blocks.len()];

        let pages = blocks
            .iter()
            .enumerate()
            .filter(|(idx, _)| include(*idx))
            .filter_map(|(idx, b)| b.geometry().map(|bbox| (b.page_id, idx, bbox)))
            .into_group_map_by(|(page_id, _, _)| *page_id);

        for page_blocks in pages.into_values() {
            let ordered: Vec<usize> = page_blocks
                .into_iter()
                .sorted_by(|(_, a_idx, a), (_, b_idx, b)| {
                    a.y0.total_cmp(&b.y0)
                        .then(a.x0.total_cmp(&b.x0))
                        .then(a_idx.cmp(b_idx))
                })
                .map(|(_, idx, _)| idx)
                .collect();

            for (prev, next) in ordered.iter().tuple_windows() {
                neighbors[*prev].next = Some(*next);
                neighbors[*next].prev = Some(*prev);
            }
        }

        Self { neighbors }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Neighbors {
        self.neighbors.get(idx).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}
