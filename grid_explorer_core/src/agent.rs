use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Position,
    episode::EpisodeView,
    search::{self, Algorithm},
};

/// Represents actions the agent can decide to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Wait,
    Move { dx: isize, dy: isize },
}

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Score fell to zero or below.
    Over,
    /// Every cell seen and every item collected.
    Won,
}

/// Coarse state of the controller's decision machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentPhase {
    Idle,
    Pursuing,
    Over,
    Won,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanReason {
    Reward,
    Frontier,
}

/// The exploring agent: where it is, what it has left, and what it is heading for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentController {
    position: Position,
    score: i64,
    algorithm: Algorithm,
    target: Option<Position>,
    /// Planned cells, excluding the cell the plan was made from.
    path: Vec<Position>,
    path_index: usize,
    outcome: Option<Outcome>,
}

impl AgentController {
    pub fn new(position: Position, score: i64, algorithm: Algorithm) -> Self {
        Self {
            position,
            score,
            algorithm,
            target: None,
            path: Vec::new(),
            path_index: 0,
            outcome: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn target(&self) -> Option<Position> {
        self.target
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Steps of the current plan not yet taken.
    pub fn remaining_path(&self) -> &[Position] {
        self.path.get(self.path_index..).unwrap_or(&[])
    }

    pub fn phase(&self) -> AgentPhase {
        match self.outcome {
            Some(Outcome::Over) => AgentPhase::Over,
            Some(Outcome::Won) => AgentPhase::Won,
            None if self.target.is_some() && !self.remaining_path().is_empty() => {
                AgentPhase::Pursuing
            }
            None => AgentPhase::Idle,
        }
    }

    /// Switches the planning algorithm. A plan already in flight is kept.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = algorithm;
    }

    pub fn toggle_algorithm(&mut self) -> Algorithm {
        self.algorithm = self.algorithm.toggled();
        self.algorithm
    }

    /// Picks this tick's action.
    ///
    /// An unfinished plan is followed one cell at a time. Otherwise a new plan
    /// is made towards the nearest visible reward, then the nearest unseen
    /// cell; when neither can be planned the agent steps to a random neighbour.
    pub fn decide<R: Rng + ?Sized>(&mut self, view: &EpisodeView<'_>, rng: &mut R) -> Action {
        if self.is_terminal() {
            return Action::Wait;
        }

        if self.remaining_path().is_empty() {
            self.clear_plan();
            self.plan(view);
        }

        if let Some(next) = self.advance() {
            return position_to_action(self.position, next);
        }

        let neighbors = view.world.neighbors(self.position);
        match neighbors.choose(rng) {
            Some(&next) => {
                debug!(from = %self.position, to = %next, "no plan, wandering");
                position_to_action(self.position, next)
            }
            None => Action::Wait,
        }
    }

    /// Pops the next planned cell. Reaching the target ends the plan.
    fn advance(&mut self) -> Option<Position> {
        let next = *self.path.get(self.path_index)?;
        self.path_index += 1;
        if self.target == Some(next) {
            self.clear_plan();
        }
        Some(next)
    }

    fn plan(&mut self, view: &EpisodeView<'_>) -> bool {
        let here = self.position;

        if let Some(reward) = nearest(here, view.visible_rewards()) {
            if self.plan_route(view, reward, PlanReason::Reward) {
                return true;
            }
        }

        match nearest(here, view.visibility.unseen()) {
            Some(frontier) => self.plan_route(view, frontier, PlanReason::Frontier),
            None => false,
        }
    }

    fn plan_route(&mut self, view: &EpisodeView<'_>, goal: Position, reason: PlanReason) -> bool {
        let result = search::find_path(
            self.algorithm,
            self.position,
            goal,
            |p| view.world.neighbors(p),
            |p| view.perceived_cost(p),
        );
        match result {
            Ok(path) if path.len() > 1 => {
                debug!(
                    ?reason,
                    algorithm = %self.algorithm,
                    from = %self.position,
                    target = %goal,
                    steps = path.len() - 1,
                    "planned route"
                );
                self.target = Some(goal);
                self.path = path.into_iter().skip(1).collect();
                self.path_index = 0;
                true
            }
            Ok(_) => false,
            Err(err) => {
                debug!(?reason, %err, "planning failed");
                false
            }
        }
    }

    pub(crate) fn clear_plan(&mut self) {
        self.target = None;
        self.path.clear();
        self.path_index = 0;
    }

    pub(crate) fn adjust_score(&mut self, delta: i64) -> i64 {
        self.score = self.score.saturating_add(delta);
        self.score
    }

    pub(crate) fn relocate(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn finish(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
        self.clear_plan();
    }
}

/// Closest candidate by [`search::heuristic`]; the first one wins ties.
fn nearest(from: Position, candidates: impl IntoIterator<Item = Position>) -> Option<Position> {
    candidates.into_iter().min_by(|a, b| {
        search::heuristic(from, *a).total_cmp(&search::heuristic(from, *b))
    })
}

/// Converts a move between two adjacent positions into an Action
fn position_to_action(src: Position, dst: Position) -> Action {
    let dx = dst.x as isize - src.x as isize;
    let dy = dst.y as isize - src.y as isize;

    match (dx, dy) {
        (0, 0) => Action::Wait,
        (0, 1) | (0, -1) | (1, 0) | (-1, 0) => Action::Move { dx, dy },
        _ => {
            warn!(from = %src, to = %dst, "planned step is not adjacent");
            Action::Wait
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        items::{ItemKind, ItemLedger},
        map::Grid,
        visibility::VisibilityTracker,
        world::{GridWorld, TerrainKind},
    };

    struct Fixture {
        world: GridWorld,
        visibility: VisibilityTracker,
        items: ItemLedger,
    }

    impl Fixture {
        fn open(width: usize, height: usize) -> Self {
            Self {
                world: GridWorld::uniform(width, height, TerrainKind::Normal),
                visibility: VisibilityTracker::new(width, height),
                items: ItemLedger::new(width, height),
            }
        }

        fn view(&self) -> EpisodeView<'_> {
            EpisodeView {
                world: &self.world,
                visibility: &self.visibility,
                items: &self.items,
            }
        }
    }

    #[test]
    fn heads_for_nearest_visible_reward_and_follows_plan() {
        let mut fx = Fixture::open(5, 5);
        let start = Position::new(2, 2);
        fx.visibility.reveal(start, 2);
        fx.items.insert(Position::new(4, 2), ItemKind::Positive).unwrap();
        fx.items.insert(Position::new(0, 0), ItemKind::Positive).unwrap();

        let mut agent = AgentController::new(start, 100, Algorithm::BreadthFirst);
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(agent.decide(&fx.view(), &mut rng), Action::Move { dx: 1, dy: 0 });
        assert_eq!(agent.target(), Some(Position::new(4, 2)));
        assert_eq!(agent.remaining_path(), &[Position::new(4, 2)]);
        assert_eq!(agent.phase(), AgentPhase::Pursuing);

        agent.relocate(Position::new(3, 2));
        assert_eq!(
            agent.decide(&fx.view(), &mut rng),
            Action::Move { dx: 1, dy: 0 }
        );
        assert_eq!(agent.target(), None);
        assert_eq!(agent.phase(), AgentPhase::Idle);
    }

    #[test]
    fn hidden_rewards_are_ignored_in_favour_of_the_frontier() {
        let mut fx = Fixture::open(5, 1);
        let start = Position::new(0, 0);
        fx.visibility.reveal(start, 1);
        fx.items.insert(Position::new(4, 0), ItemKind::Positive).unwrap();

        let mut agent = AgentController::new(start, 100, Algorithm::BestFirst);
        let action = agent.decide(&fx.view(), &mut StdRng::seed_from_u64(0));
        assert_eq!(action, Action::Move { dx: 1, dy: 0 });
        assert_eq!(agent.target(), Some(Position::new(2, 0)));
    }

    #[test]
    fn negative_items_are_never_targeted() {
        let mut fx = Fixture::open(3, 3);
        let start = Position::new(1, 1);
        fx.visibility.reveal(start, 1);
        fx.items.insert(Position::new(1, 0), ItemKind::Negative).unwrap();
        fx.items.insert(Position::new(2, 2), ItemKind::Positive).unwrap();

        let mut agent = AgentController::new(start, 100, Algorithm::BreadthFirst);
        agent.decide(&fx.view(), &mut StdRng::seed_from_u64(0));
        assert_eq!(agent.target(), Some(Position::new(2, 2)));
    }

    #[test]
    fn unseen_terrain_is_planned_as_cheap() {
        // S W R  with the water cell unseen, then seen.
        // . . .
        let mut terrain = Grid::filled(3, 2, TerrainKind::Normal);
        terrain.set(Position::new(1, 0), TerrainKind::Water).unwrap();
        let mut fx = Fixture {
            world: GridWorld::from_terrain(terrain),
            visibility: VisibilityTracker::new(3, 2),
            items: ItemLedger::new(3, 2),
        };
        let start = Position::new(0, 0);
        let reward = Position::new(2, 0);
        fx.items.insert(reward, ItemKind::Positive).unwrap();
        fx.visibility.reveal(start, 0);
        fx.visibility.reveal(reward, 0);

        let mut agent = AgentController::new(start, 100, Algorithm::BestFirst);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(agent.decide(&fx.view(), &mut rng), Action::Move { dx: 1, dy: 0 });
        assert_eq!(agent.remaining_path(), &[reward]);

        fx.visibility.reveal(Position::new(1, 0), 0);
        let mut agent = AgentController::new(start, 100, Algorithm::BestFirst);
        assert_eq!(agent.decide(&fx.view(), &mut rng), Action::Move { dx: 0, dy: 1 });
        assert_eq!(agent.remaining_path().len(), 3);
    }

    #[test]
    fn switching_algorithm_keeps_the_plan_in_flight() {
        let mut fx = Fixture::open(6, 1);
        let start = Position::new(0, 0);
        fx.visibility.reveal(start, 5);
        fx.items.insert(Position::new(5, 0), ItemKind::Positive).unwrap();

        let mut agent = AgentController::new(start, 100, Algorithm::BreadthFirst);
        agent.decide(&fx.view(), &mut StdRng::seed_from_u64(0));
        let before = agent.remaining_path().to_vec();

        assert_eq!(agent.toggle_algorithm(), Algorithm::BestFirst);
        assert_eq!(agent.remaining_path(), before.as_slice());
        assert_eq!(agent.target(), Some(Position::new(5, 0)));
    }

    #[test]
    fn wanders_to_a_neighbour_when_nothing_is_left_to_plan() {
        let mut fx = Fixture::open(3, 3);
        let start = Position::new(0, 0);
        fx.visibility.reveal(Position::new(1, 1), 1);

        let mut agent = AgentController::new(start, 100, Algorithm::BestFirst);
        let action = agent.decide(&fx.view(), &mut StdRng::seed_from_u64(9));
        assert!(matches!(
            action,
            Action::Move { dx: 1, dy: 0 } | Action::Move { dx: 0, dy: 1 }
        ));
        assert_eq!(agent.target(), None);
    }

    #[test]
    fn terminal_agent_waits() {
        let fx = Fixture::open(2, 2);
        let mut agent = AgentController::new(Position::new(0, 0), 100, Algorithm::BestFirst);
        agent.finish(Outcome::Won);
        assert_eq!(
            agent.decide(&fx.view(), &mut StdRng::seed_from_u64(0)),
            Action::Wait
        );
        assert_eq!(agent.phase(), AgentPhase::Won);
    }

    #[test]
    fn score_saturates_instead_of_wrapping() {
        let mut agent = AgentController::new(Position::new(0, 0), i64::MAX, Algorithm::BreadthFirst);
        assert_eq!(agent.adjust_score(ItemKind::Positive.value()), i64::MAX);
        agent.adjust_score(i64::MIN);
        assert_eq!(agent.adjust_score(i64::MIN), i64::MIN);
    }
}
