use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
};
use serde::{Deserialize, Serialize};

use crate::{
    Position,
    config::ConfigError,
    map::{Grid, GridError},
};

/// Terrain of a single cell.
///
/// `Unknown` is never stored in a [`GridWorld`]; it is what an observer sees
/// for a cell outside its visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainKind {
    #[default]
    Normal,
    Mud,
    Water,
    Unknown,
}

impl TerrainKind {
    /// Score deducted for entering a cell of this kind.
    pub const fn movement_cost(self) -> u32 {
        match self {
            TerrainKind::Normal => 1,
            TerrainKind::Mud => 10,
            TerrainKind::Water => 50,
            TerrainKind::Unknown => 1,
        }
    }
}

/// Relative draw weights used when generating terrain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainWeights {
    pub normal: f64,
    pub mud: f64,
    pub water: f64,
}

impl Default for TerrainWeights {
    fn default() -> Self {
        Self {
            normal: 0.7,
            mud: 0.2,
            water: 0.1,
        }
    }
}

impl TerrainWeights {
    const KINDS: [TerrainKind; 3] = [TerrainKind::Normal, TerrainKind::Mud, TerrainKind::Water];

    /// Builds the sampling distribution, rejecting negative, non-finite or all-zero weights.
    pub fn distribution(&self) -> Result<TerrainDistribution, ConfigError> {
        let weights = [self.normal, self.mud, self.water];
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ConfigError::InvalidTerrainWeights(format!("{weights:?}")));
        }
        WeightedIndex::new(weights)
            .map(|index| TerrainDistribution { index })
            .map_err(|err| ConfigError::InvalidTerrainWeights(err.to_string()))
    }
}

/// Weighted sampler over the storable terrain kinds.
#[derive(Debug, Clone)]
pub struct TerrainDistribution {
    index: WeightedIndex<f64>,
}

impl Distribution<TerrainKind> for TerrainDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TerrainKind {
        TerrainWeights::KINDS[self.index.sample(rng)]
    }
}

/// The true terrain of every cell for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridWorld {
    terrain: Grid<TerrainKind>,
}

impl GridWorld {
    /// Draws one terrain kind per cell from `distribution`.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn generate<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        rng: &mut R,
        distribution: &TerrainDistribution,
    ) -> Self {
        GridWorld {
            terrain: Grid::from_generator(width, height, |_| distribution.sample(&mut *rng)),
        }
    }

    /// Wraps a hand-built terrain grid. `Unknown` cells are stored as `Normal`.
    pub fn from_terrain(mut terrain: Grid<TerrainKind>) -> Self {
        let unknown: Vec<Position> = terrain
            .enumerate()
            .filter(|(_, kind)| **kind == TerrainKind::Unknown)
            .map(|(position, _)| position)
            .collect();
        for position in unknown {
            terrain[position] = TerrainKind::Normal;
        }
        GridWorld { terrain }
    }

    /// Uniform terrain, mostly useful for tests and demos.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn uniform(width: usize, height: usize, kind: TerrainKind) -> Self {
        Self::from_terrain(Grid::filled(width, height, kind))
    }

    pub fn width(&self) -> usize {
        self.terrain.width()
    }

    pub fn height(&self) -> usize {
        self.terrain.height()
    }

    pub fn grid(&self) -> &Grid<TerrainKind> {
        &self.terrain
    }

    pub fn contains(&self, position: Position) -> bool {
        self.terrain.contains(position)
    }

    /// True terrain of a cell.
    pub fn terrain_at(&self, position: Position) -> Result<TerrainKind, GridError> {
        self.terrain.try_get(position).copied()
    }

    /// Cost of entering `position`, or `None` outside the grid.
    pub fn cost_at(&self, position: Position) -> Option<u32> {
        self.terrain.get(position).map(|kind| kind.movement_cost())
    }

    pub fn neighbors(&self, position: Position) -> Vec<Position> {
        self.terrain.neighbors(position)
    }
}
