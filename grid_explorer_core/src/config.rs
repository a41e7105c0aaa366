use serde::{Deserialize, Serialize};

use crate::{Position, search::Algorithm, world::TerrainWeights};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
    #[error("a {width}x{height} grid is too large")]
    GridTooLarge { width: usize, height: usize },
    #[error("start cell {start} lies outside the {width}x{height} grid")]
    StartOutOfBounds {
        start: Position,
        width: usize,
        height: usize,
    },
    #[error("initial score must be positive, got {0}")]
    NonPositiveScore(i64),
    #[error("negative item chance must be within [0, 1], got {0}")]
    InvalidItemChance(f64),
    #[error("invalid terrain weights: {0}")]
    InvalidTerrainWeights(String),
}

/// Tunable parameters of an episode. The defaults are the shipped game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    pub width: usize,
    pub height: usize,
    /// Agent start cell; the grid centre when `None`.
    pub start: Option<Position>,
    pub initial_score: i64,
    /// Coordinate draws made when scattering items. Repeated draws collapse.
    pub item_draws: usize,
    pub negative_item_chance: f64,
    pub reveal_radius: usize,
    pub terrain_weights: TerrainWeights,
    /// Algorithm in force when the episode is created.
    pub algorithm: Algorithm,
    /// Algorithm a reset switches to; `algorithm` again when `None`.
    pub reset_algorithm: Option<Algorithm>,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            start: None,
            initial_score: 100,
            item_draws: 15,
            negative_item_chance: 0.0,
            reveal_radius: 1,
            terrain_weights: TerrainWeights::default(),
            algorithm: Algorithm::BreadthFirst,
            reset_algorithm: None,
        }
    }
}

impl EpisodeConfig {
    pub fn start_position(&self) -> Position {
        self.start
            .unwrap_or(Position::new(self.width / 2, self.height / 2))
    }

    pub fn restart_algorithm(&self) -> Algorithm {
        self.reset_algorithm.unwrap_or(self.algorithm)
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(ConfigError::GridTooLarge {
                width: self.width,
                height: self.height,
            });
        }
        let start = self.start_position();
        if start.x >= self.width || start.y >= self.height {
            return Err(ConfigError::StartOutOfBounds {
                start,
                width: self.width,
                height: self.height,
            });
        }
        if self.initial_score <= 0 {
            return Err(ConfigError::NonPositiveScore(self.initial_score));
        }
        if !(0.0..=1.0).contains(&self.negative_item_chance) {
            return Err(ConfigError::InvalidItemChance(self.negative_item_chance));
        }
        self.terrain_weights.distribution()?;
        Ok(())
    }
}
