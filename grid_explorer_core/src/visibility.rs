use serde::{Deserialize, Serialize};

use crate::{Position, map::Grid};

/// Every cell an observer has seen during the current episode.
///
/// The visible set only grows until [`VisibilityTracker::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityTracker {
    seen: Grid<bool>,
    count: usize,
}

impl VisibilityTracker {
    /// Nothing seen yet.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            seen: Grid::filled(width, height, false),
            count: 0,
        }
    }

    /// Marks every in-bounds cell within Chebyshev distance `radius` of `center` as seen.
    /// Returns how many cells were newly revealed.
    pub fn reveal(&mut self, center: Position, radius: usize) -> usize {
        let mut revealed = 0;
        for position in self.seen.area(center, radius) {
            let cell = &mut self.seen[position];
            if !*cell {
                *cell = true;
                revealed += 1;
            }
        }
        self.count += revealed;
        revealed
    }

    /// Out-of-bounds cells are never visible.
    pub fn is_visible(&self, position: Position) -> bool {
        self.seen.get(position).copied().unwrap_or(false)
    }

    pub fn coverage_count(&self) -> usize {
        self.count
    }

    /// Whether every cell of the grid has been seen.
    pub fn is_complete(&self) -> bool {
        self.count == self.seen.len()
    }

    /// Cells not yet seen, in row-major order.
    pub fn unseen(&self) -> impl Iterator<Item = Position> + '_ {
        self.seen
            .enumerate()
            .filter(|(_, seen)| !**seen)
            .map(|(position, _)| position)
    }

    pub fn reset(&mut self) {
        self.seen.fill(false);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveal_is_idempotent() {
        let mut visibility = VisibilityTracker::new(5, 5);
        assert_eq!(visibility.reveal(Position::new(2, 2), 1), 9);
        let once = visibility.coverage_count();
        assert_eq!(visibility.reveal(Position::new(2, 2), 1), 0);
        assert_eq!(visibility.coverage_count(), once);
    }

    #[test]
    fn reveal_grows_monotonically_and_clips_at_corners() {
        let mut visibility = VisibilityTracker::new(4, 4);
        visibility.reveal(Position::new(0, 0), 1);
        assert_eq!(visibility.coverage_count(), 4);
        visibility.reveal(Position::new(1, 0), 1);
        assert_eq!(visibility.coverage_count(), 6);
        assert!(visibility.is_visible(Position::new(0, 0)));
        assert!(visibility.is_visible(Position::new(2, 1)));
        assert!(!visibility.is_visible(Position::new(3, 3)));
        assert!(!visibility.is_visible(Position::new(9, 9)));
    }

    #[test]
    fn complete_coverage_and_reset() {
        let mut visibility = VisibilityTracker::new(3, 3);
        visibility.reveal(Position::new(1, 1), 1);
        assert!(visibility.is_complete());
        assert_eq!(visibility.unseen().count(), 0);

        visibility.reset();
        assert_eq!(visibility.coverage_count(), 0);
        assert!(!visibility.is_visible(Position::new(1, 1)));
        assert_eq!(visibility.unseen().count(), 9);
    }
}
