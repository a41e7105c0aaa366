use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    Position,
    agent::{Action, AgentController, AgentPhase, Outcome},
    config::{ConfigError, EpisodeConfig},
    items::{ItemKind, ItemLedger},
    map::GridError,
    search::Algorithm,
    visibility::VisibilityTracker,
    world::{GridWorld, TerrainDistribution, TerrainKind},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EpisodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{layer} is {found_width}x{found_height}, expected {width}x{height}")]
    LayoutMismatch {
        layer: &'static str,
        width: usize,
        height: usize,
        found_width: usize,
        found_height: usize,
    },
}

/// Provides a read-only view of the episode as the agent perceives it.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeView<'a> {
    pub world: &'a GridWorld,
    pub visibility: &'a VisibilityTracker,
    pub items: &'a ItemLedger,
}

impl<'a> EpisodeView<'a> {
    /// Terrain as the observer knows it: `Unknown` for unseen or out-of-bounds cells.
    pub fn perceived_terrain(&self, position: Position) -> TerrainKind {
        if self.visibility.is_visible(position) {
            self.world
                .terrain_at(position)
                .unwrap_or(TerrainKind::Unknown)
        } else {
            TerrainKind::Unknown
        }
    }

    /// Cost of entering a cell, judged from what has been seen. Unseen cells are assumed cheap.
    pub fn perceived_cost(&self, position: Position) -> u32 {
        self.perceived_terrain(position).movement_cost()
    }

    /// Visible items worth collecting, in row-major order.
    pub fn visible_rewards(&self) -> impl Iterator<Item = Position> + 'a {
        let visibility = self.visibility;
        self.items
            .iter()
            .filter(move |(position, kind)| kind.is_reward() && visibility.is_visible(*position))
            .map(|(position, _)| position)
    }
}

/// Render-side copy of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub terrain: TerrainKind,
    pub visible: bool,
    pub item: Option<ItemKind>,
}

/// Everything a front end needs to draw one frame, with unseen cells masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSnapshot {
    pub width: usize,
    pub height: usize,
    pub score: i64,
    pub algorithm: Algorithm,
    pub position: Position,
    pub phase: AgentPhase,
    pub ticks: u64,
    /// Row-major.
    pub cells: Vec<CellSnapshot>,
}

/// One game: terrain, items, what has been seen, and the agent.
///
/// Driven by calling [`Episode::step`] once per tick.
#[derive(Debug, Clone)]
pub struct Episode {
    config: EpisodeConfig,
    terrain_distribution: TerrainDistribution,
    /// Seed reused by `reset(None)`.
    pinned_seed: Option<u64>,
    seed: u64,
    rng: StdRng,
    world: GridWorld,
    visibility: VisibilityTracker,
    items: ItemLedger,
    agent: AgentController,
    ticks: u64,
}

impl Episode {
    /// Generates a fresh episode. Without a seed one is drawn from the OS.
    pub fn new(config: EpisodeConfig, seed: Option<u64>) -> Result<Self, EpisodeError> {
        config.validate()?;
        let terrain_distribution = config.terrain_weights.distribution()?;
        let seed_used = seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed_used);
        let (world, items) = generate_layout(&config, &terrain_distribution, &mut rng);

        let episode = Self::assemble(
            config,
            terrain_distribution,
            seed,
            seed_used,
            rng,
            world,
            items,
        );
        info!(
            seed = seed_used,
            items = episode.items.len(),
            "episode generated"
        );
        Ok(episode)
    }

    /// Builds an episode on a hand-made layout. `seed` drives the agent's
    /// random moves and any later [`Episode::reset`].
    pub fn from_layout(
        config: EpisodeConfig,
        world: GridWorld,
        items: ItemLedger,
        seed: u64,
    ) -> Result<Self, EpisodeError> {
        config.validate()?;
        check_layer("terrain", &config, world.width(), world.height())?;
        check_layer("item ledger", &config, items.width(), items.height())?;
        let terrain_distribution = config.terrain_weights.distribution()?;
        let rng = StdRng::seed_from_u64(seed);
        Ok(Self::assemble(
            config,
            terrain_distribution,
            Some(seed),
            seed,
            rng,
            world,
            items,
        ))
    }

    fn assemble(
        config: EpisodeConfig,
        terrain_distribution: TerrainDistribution,
        pinned_seed: Option<u64>,
        seed: u64,
        rng: StdRng,
        world: GridWorld,
        items: ItemLedger,
    ) -> Self {
        let start = config.start_position();
        let mut visibility = VisibilityTracker::new(config.width, config.height);
        visibility.reveal(start, config.reveal_radius);
        let agent = AgentController::new(start, config.initial_score, config.algorithm);
        Self {
            config,
            terrain_distribution,
            pinned_seed,
            seed,
            rng,
            world,
            visibility,
            items,
            agent,
            ticks: 0,
        }
    }

    /// Starts a new episode in place.
    ///
    /// `Some(seed)` regenerates from that seed and keeps it for later resets;
    /// `None` reuses the kept seed, or draws a new one if there is none.
    pub fn reset(&mut self, seed: Option<u64>) {
        if seed.is_some() {
            self.pinned_seed = seed;
        }
        self.seed = self
            .pinned_seed
            .unwrap_or_else(|| rand::rng().random());
        self.rng = StdRng::seed_from_u64(self.seed);

        let (world, items) = generate_layout(&self.config, &self.terrain_distribution, &mut self.rng);
        self.world = world;
        self.items = items;

        let start = self.config.start_position();
        self.visibility.reset();
        self.visibility.reveal(start, self.config.reveal_radius);
        self.agent =
            AgentController::new(start, self.config.initial_score, self.config.restart_algorithm());
        self.ticks = 0;

        info!(seed = self.seed, items = self.items.len(), "episode reset");
    }

    /// Advances the simulation by one decision tick. No-op once the episode has ended.
    pub fn step(&mut self) {
        if self.agent.is_terminal() {
            return;
        }

        let view = EpisodeView {
            world: &self.world,
            visibility: &self.visibility,
            items: &self.items,
        };
        let action = self.agent.decide(&view, &mut self.rng);
        self.ticks += 1;
        self.process_action(action);

        if !self.agent.is_terminal() && self.is_cleared() {
            self.agent.finish(Outcome::Won);
            info!(
                score = self.agent.score(),
                ticks = self.ticks,
                "grid cleared"
            );
        }
    }

    /// Applies a move: pay for the destination, move there, then collect and look around.
    fn process_action(&mut self, action: Action) {
        let Action::Move { dx, dy } = action else {
            return;
        };
        let from = self.agent.position();
        let Some((to, cost)) = from
            .offset(dx, dy)
            .and_then(|to| self.world.cost_at(to).map(|cost| (to, cost)))
        else {
            warn!(%from, dx, dy, "move leaves the grid, ignored");
            return;
        };

        let score = self.agent.adjust_score(-i64::from(cost));
        self.agent.relocate(to);
        trace!(%from, %to, cost, score, "moved");
        if score <= 0 {
            self.game_over();
            return;
        }

        if let Some(item) = self.items.collect(to) {
            let score = self.agent.adjust_score(item.value());
            debug!(?item, at = %to, score, "item collected");
            if score <= 0 {
                self.game_over();
                return;
            }
        }

        self.visibility.reveal(to, self.config.reveal_radius);
    }

    fn game_over(&mut self) {
        self.agent.finish(Outcome::Over);
        info!(
            score = self.agent.score(),
            at = %self.agent.position(),
            ticks = self.ticks,
            "game over"
        );
    }

    /// Every cell seen and nothing left to pick up.
    fn is_cleared(&self) -> bool {
        self.items.is_empty() && self.visibility.is_complete()
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.agent.set_algorithm(algorithm);
    }

    pub fn toggle_algorithm(&mut self) -> Algorithm {
        self.agent.toggle_algorithm()
    }

    pub fn config(&self) -> &EpisodeConfig {
        &self.config
    }

    /// Seed the current layout was generated from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn width(&self) -> usize {
        self.world.width()
    }

    pub fn height(&self) -> usize {
        self.world.height()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn score(&self) -> i64 {
        self.agent.score()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.agent.algorithm()
    }

    pub fn agent_position(&self) -> Position {
        self.agent.position()
    }

    pub fn agent(&self) -> &AgentController {
        &self.agent
    }

    pub fn phase(&self) -> AgentPhase {
        self.agent.phase()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.agent.outcome()
    }

    pub fn is_over(&self) -> bool {
        self.agent.outcome() == Some(Outcome::Over)
    }

    pub fn is_won(&self) -> bool {
        self.agent.outcome() == Some(Outcome::Won)
    }

    pub fn target(&self) -> Option<Position> {
        self.agent.target()
    }

    /// Cells the agent still intends to walk through.
    pub fn planned_path(&self) -> &[Position] {
        self.agent.remaining_path()
    }

    /// Terrain of a cell if it has been seen, `Unknown` otherwise.
    pub fn terrain_view(&self, position: Position) -> Result<TerrainKind, GridError> {
        let terrain = self.world.terrain_at(position)?;
        Ok(if self.visibility.is_visible(position) {
            terrain
        } else {
            TerrainKind::Unknown
        })
    }

    /// True terrain, regardless of visibility.
    pub fn terrain_at(&self, position: Position) -> Result<TerrainKind, GridError> {
        self.world.terrain_at(position)
    }

    pub fn is_visible(&self, position: Position) -> bool {
        self.visibility.is_visible(position)
    }

    pub fn coverage_count(&self) -> usize {
        self.visibility.coverage_count()
    }

    /// Items on cells that have been seen.
    pub fn visible_items(&self) -> impl Iterator<Item = (Position, ItemKind)> + '_ {
        self.items
            .iter()
            .filter(|(position, _)| self.visibility.is_visible(*position))
    }

    pub fn remaining_items(&self) -> usize {
        self.items.len()
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn items(&self) -> &ItemLedger {
        &self.items
    }

    pub fn view(&self) -> EpisodeView<'_> {
        EpisodeView {
            world: &self.world,
            visibility: &self.visibility,
            items: &self.items,
        }
    }

    pub fn snapshot(&self) -> EpisodeSnapshot {
        let view = self.view();
        let cells = self
            .world
            .grid()
            .positions()
            .map(|position| {
                let visible = self.visibility.is_visible(position);
                CellSnapshot {
                    terrain: view.perceived_terrain(position),
                    visible,
                    item: visible.then(|| self.items.get(position)).flatten(),
                }
            })
            .collect();
        EpisodeSnapshot {
            width: self.width(),
            height: self.height(),
            score: self.score(),
            algorithm: self.algorithm(),
            position: self.agent_position(),
            phase: self.phase(),
            ticks: self.ticks,
            cells,
        }
    }
}

/// Items first, then terrain, from the same generator.
fn generate_layout(
    config: &EpisodeConfig,
    distribution: &TerrainDistribution,
    rng: &mut StdRng,
) -> (GridWorld, ItemLedger) {
    let items = ItemLedger::place(
        config.width,
        config.height,
        rng,
        config.item_draws,
        config.start_position(),
        config.negative_item_chance,
    );
    let world = GridWorld::generate(config.width, config.height, rng, distribution);
    (world, items)
}

fn check_layer(
    layer: &'static str,
    config: &EpisodeConfig,
    found_width: usize,
    found_height: usize,
) -> Result<(), EpisodeError> {
    if (found_width, found_height) == (config.width, config.height) {
        Ok(())
    } else {
        Err(EpisodeError::LayoutMismatch {
            layer,
            width: config.width,
            height: config.height,
            found_width,
            found_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_reproduces_layout() {
        let config = EpisodeConfig::default();
        let a = Episode::new(config.clone(), Some(1234)).unwrap();
        let b = Episode::new(config, Some(1234)).unwrap();
        assert_eq!(a.world(), b.world());
        assert_eq!(a.items(), b.items());
    }

    #[test]
    fn reset_without_seed_replays_the_pinned_seed() {
        let mut episode = Episode::new(EpisodeConfig::default(), Some(99)).unwrap();
        let world = episode.world().clone();
        let items = episode.items().clone();
        for _ in 0..20 {
            episode.step();
        }
        episode.toggle_algorithm();

        episode.reset(None);
        assert_eq!(episode.world(), &world);
        assert_eq!(episode.items(), &items);
        assert_eq!(episode.score(), 100);
        assert_eq!(episode.ticks(), 0);
        assert_eq!(episode.agent_position(), Position::new(5, 5));
        assert_eq!(episode.coverage_count(), 9);
        assert_eq!(episode.algorithm(), Algorithm::BreadthFirst);
        assert_eq!(episode.outcome(), None);
    }

    #[test]
    fn reset_can_switch_to_a_restart_algorithm() {
        let config = EpisodeConfig {
            reset_algorithm: Some(Algorithm::BestFirst),
            ..EpisodeConfig::default()
        };
        let mut episode = Episode::new(config, Some(99)).unwrap();
        assert_eq!(episode.algorithm(), Algorithm::BreadthFirst);

        episode.reset(None);
        assert_eq!(episode.algorithm(), Algorithm::BestFirst);
        episode.toggle_algorithm();
        episode.reset(None);
        assert_eq!(episode.algorithm(), Algorithm::BestFirst);
    }

    #[test]
    fn reset_with_new_seed_pins_it() {
        let mut episode = Episode::new(EpisodeConfig::default(), Some(1)).unwrap();
        episode.reset(Some(2));
        assert_eq!(episode.seed(), 2);
        let world = episode.world().clone();
        episode.reset(None);
        assert_eq!(episode.seed(), 2);
        assert_eq!(episode.world(), &world);
    }

    #[test]
    fn start_cell_never_holds_an_item() {
        for seed in 0..16 {
            let episode = Episode::new(EpisodeConfig::default(), Some(seed)).unwrap();
            assert_eq!(episode.items().get(Position::new(5, 5)), None);
            assert!(episode.remaining_items() <= 15);
        }
    }

    #[test]
    fn snapshot_masks_unseen_cells() {
        let episode = Episode::new(EpisodeConfig::default(), Some(5)).unwrap();
        let snapshot = episode.snapshot();
        assert_eq!(snapshot.cells.len(), 100);
        for (position, cell) in episode.world().grid().positions().zip(&snapshot.cells) {
            assert_eq!(cell.visible, episode.is_visible(position));
            if cell.visible {
                assert_eq!(cell.terrain, episode.terrain_at(position).unwrap());
                assert_eq!(cell.item, episode.items().get(position));
            } else {
                assert_eq!(cell.terrain, TerrainKind::Unknown);
                assert_eq!(cell.item, None);
            }
        }
    }

    #[test]
    fn terrain_view_checks_bounds() {
        let episode = Episode::new(EpisodeConfig::default(), Some(5)).unwrap();
        assert!(episode.terrain_view(Position::new(10, 0)).is_err());
        assert_eq!(
            episode.terrain_view(Position::new(0, 0)),
            Ok(TerrainKind::Unknown)
        );
    }

    #[test]
    fn mismatched_layout_is_rejected() {
        let config = EpisodeConfig {
            width: 3,
            height: 3,
            ..EpisodeConfig::default()
        };
        let result = Episode::from_layout(
            config,
            GridWorld::uniform(4, 3, TerrainKind::Normal),
            ItemLedger::new(3, 3),
            0,
        );
        assert!(matches!(
            result,
            Err(EpisodeError::LayoutMismatch { layer: "terrain", .. })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EpisodeConfig {
            initial_score: -1,
            ..EpisodeConfig::default()
        };
        assert_eq!(
            Episode::new(config, Some(0)).err(),
            Some(EpisodeError::Config(ConfigError::NonPositiveScore(-1)))
        );
    }
}
