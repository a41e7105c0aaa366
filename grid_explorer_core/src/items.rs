use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Position,
    map::{Grid, GridError},
};

/// Kind of item lying on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Positive,
    Negative,
}

impl ItemKind {
    /// Score change applied when the item is collected.
    pub const fn value(self) -> i64 {
        match self {
            ItemKind::Positive => 15,
            ItemKind::Negative => -200,
        }
    }

    /// Whether the agent should go out of its way to collect this item.
    pub const fn is_reward(self) -> bool {
        matches!(self, ItemKind::Positive)
    }
}

/// Items currently lying on the grid, at most one per cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLedger {
    items: Grid<Option<ItemKind>>,
    count: usize,
}

impl ItemLedger {
    /// An empty ledger for a `width` x `height` grid.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            items: Grid::filled(width, height, None),
            count: 0,
        }
    }

    /// Makes `draws` uniform coordinate draws and drops an item on each one
    /// that is not `forbidden`.
    ///
    /// A cell drawn twice keeps only the later item, so the ledger may end
    /// up with fewer than `draws` entries. Each placed item is `Negative`
    /// with probability `negative_chance`.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`, or if `negative_chance`
    /// lies outside `[0, 1]` while there are cells to draw.
    pub fn place<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        rng: &mut R,
        draws: usize,
        forbidden: Position,
        negative_chance: f64,
    ) -> Self {
        let mut ledger = Self::new(width, height);
        if ledger.items.is_empty() {
            return ledger;
        }
        for _ in 0..draws {
            let position = Position {
                x: rng.random_range(0..width),
                y: rng.random_range(0..height),
            };
            if position == forbidden {
                continue;
            }
            let kind = if rng.random_bool(negative_chance) {
                ItemKind::Negative
            } else {
                ItemKind::Positive
            };
            ledger.put(position, kind);
        }
        ledger
    }

    /// Puts an item on a cell, replacing whatever was there.
    pub fn insert(&mut self, position: Position, kind: ItemKind) -> Result<(), GridError> {
        self.items.try_get(position)?;
        self.put(position, kind);
        Ok(())
    }

    fn put(&mut self, position: Position, kind: ItemKind) {
        if self.items[position].replace(kind).is_none() {
            self.count += 1;
        }
    }

    /// Removes and returns the item at `position`, if any.
    pub fn collect(&mut self, position: Position) -> Option<ItemKind> {
        let taken = self.items.get_mut(position)?.take();
        if taken.is_some() {
            self.count -= 1;
        }
        taken
    }

    pub fn get(&self, position: Position) -> Option<ItemKind> {
        self.items.get(position).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn width(&self) -> usize {
        self.items.width()
    }

    pub fn height(&self) -> usize {
        self.items.height()
    }

    /// All items in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, ItemKind)> + '_ {
        self.items
            .enumerate()
            .filter_map(|(position, item)| item.map(|kind| (position, kind)))
    }
}
