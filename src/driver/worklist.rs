//! Explicit quicksort worklist.
//!
//! A pass is a left-to-right sequence of blocks. The leftmost unsorted block is
//! partitioned around a pivot one comparison at a time and then replaced by
//! `[better, pivot, worse]`. When every block is sorted the pass has produced a
//! single total order.

use crate::state::ItemId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Sorted(ItemId),
    Unsorted(Vec<ItemId>),
}

impl Block {
    fn from_items(mut items: Vec<ItemId>) -> Option<Block> {
        match items.len() {
            0 => None,
            1 => items.pop().map(Block::Sorted),
            _ => Some(Block::Unsorted(items)),
        }
    }
}

/// A partition step in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    block: usize,
    pivot: ItemId,
    pending: Vec<ItemId>,
    better: Vec<ItemId>,
    worse: Vec<ItemId>,
}

impl Partition {
    pub fn pivot(&self) -> &ItemId {
        &self.pivot
    }

    /// Items not yet placed relative to the pivot.
    pub fn pending(&self) -> &[ItemId] {
        &self.pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worklist {
    blocks: Vec<Block>,
    active: Option<Partition>,
}

impl Worklist {
    /// Start a pass over `items` in the given initial order.
    pub fn new(items: Vec<ItemId>) -> Self {
        Self {
            blocks: Block::from_items(items).into_iter().collect(),
            active: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.active.is_none() && self.blocks.iter().all(|b| matches!(b, Block::Sorted(_)))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn active(&self) -> Option<&Partition> {
        self.active.as_ref()
    }

    /// Leftmost unsorted block, when no partition is running.
    pub fn next_unsorted(&self) -> Option<(usize, &[ItemId])> {
        if self.active.is_some() {
            return None;
        }
        self.blocks.iter().enumerate().find_map(|(idx, b)| match b {
            Block::Unsorted(items) => Some((idx, items.as_slice())),
            Block::Sorted(_) => None,
        })
    }

    /// Begin partitioning block `block` around `pivot`. Returns false if the
    /// block is not unsorted or does not contain the pivot.
    pub fn begin_partition(&mut self, block: usize, pivot: &ItemId) -> bool {
        if self.active.is_some() {
            return false;
        }
        let Some(Block::Unsorted(items)) = self.blocks.get(block) else {
            return false;
        };
        if !items.contains(pivot) {
            return false;
        }
        let pending = items.iter().filter(|id| *id != pivot).cloned().collect();
        self.active = Some(Partition {
            block,
            pivot: pivot.clone(),
            pending,
            better: Vec::new(),
            worse: Vec::new(),
        });
        true
    }

    /// Place a pending item on one side of the pivot. Finishing the last
    /// pending item splits the block. Returns false for items not pending.
    pub fn place(&mut self, item: &ItemId, better_than_pivot: bool) -> bool {
        let Some(part) = self.active.as_mut() else {
            return false;
        };
        let Some(pos) = part.pending.iter().position(|id| id == item) else {
            return false;
        };
        let placed = part.pending.remove(pos);
        if better_than_pivot {
            part.better.push(placed);
        } else {
            part.worse.push(placed);
        }

        if part.pending.is_empty() {
            if let Some(done) = self.active.take() {
                let mut replacement = Vec::with_capacity(3);
                replacement.extend(Block::from_items(done.better));
                replacement.push(Block::Sorted(done.pivot));
                replacement.extend(Block::from_items(done.worse));
                self.blocks.splice(done.block..done.block + 1, replacement);
            }
        }
        true
    }

    /// Current best-first order: sorted items in place, unsorted blocks as
    /// they stand, an active partition as `better, pivot, pending, worse`.
    pub fn order(&self) -> Vec<ItemId> {
        let mut out = Vec::new();
        for (idx, block) in self.blocks.iter().enumerate() {
            match (block, &self.active) {
                (_, Some(part)) if part.block == idx => {
                    out.extend(part.better.iter().cloned());
                    out.push(part.pivot.clone());
                    out.extend(part.pending.iter().cloned());
                    out.extend(part.worse.iter().cloned());
                }
                (Block::Sorted(id), _) => out.push(id.clone()),
                (Block::Unsorted(items), _) => out.extend(items.iter().cloned()),
            }
        }
        out
    }
}
