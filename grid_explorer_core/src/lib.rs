use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod episode;
pub mod items;
pub mod map;
pub mod search;
pub mod visibility;
pub mod world;

pub use agent::{Action, AgentController, AgentPhase, Outcome};
pub use config::{ConfigError, EpisodeConfig};
pub use episode::{CellSnapshot, Episode, EpisodeError, EpisodeSnapshot, EpisodeView};
pub use items::{ItemKind, ItemLedger};
pub use map::{Grid, GridError};
pub use search::{Algorithm, SearchError};
pub use visibility::VisibilityTracker;
pub use world::{GridWorld, TerrainKind, TerrainWeights};

/// Represents a 2D cell coordinate.
///
/// Ordering is by `x` first, then `y`; the search frontier relies on it to
/// resolve ties between equally ranked cells.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Returns the cell offset by `(dx, dy)`, or `None` if either coordinate underflows.
    /// Upper bounds are not checked here; that is the grid's job.
    pub fn offset(self, dx: isize, dy: isize) -> Option<Position> {
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }

    /// Manhattan distance between two cells.
    pub fn manhattan(self, other: Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
