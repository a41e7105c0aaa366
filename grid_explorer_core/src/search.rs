//! Path search over a 4-connected grid.
//!
//! Both searches are driven by caller-supplied closures, so the same code
//! plans against the true terrain or against what an observer has seen.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Weight applied to the Manhattan distance in [`heuristic`].
pub const HEURISTIC_SCALE: f64 = 0.1;

/// Which search the agent plans with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Cost-aware best-first search; minimises total terrain cost.
    BestFirst,
    /// Unweighted breadth-first search; minimises step count.
    #[default]
    BreadthFirst,
}

impl Algorithm {
    pub fn toggled(self) -> Self {
        match self {
            Algorithm::BestFirst => Algorithm::BreadthFirst,
            Algorithm::BreadthFirst => Algorithm::BestFirst,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Algorithm::BestFirst => "A*",
            Algorithm::BreadthFirst => "BFS",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("no path from {start} to {goal}")]
    NoPath { start: Position, goal: Position },
}

/// Distance estimate used both to rank the frontier and to pick the nearest target.
///
/// Scaled down to a tenth of the Manhattan distance, so the search leans
/// almost entirely on accumulated cost.
pub fn heuristic(a: Position, b: Position) -> f64 {
    HEURISTIC_SCALE * a.manhattan(b) as f64
}

/// Runs `algorithm` from `start` to `goal`.
///
/// `cost` is the price of entering a cell and is ignored by breadth-first search.
pub fn find_path<N, I, C>(
    algorithm: Algorithm,
    start: Position,
    goal: Position,
    neighbors: N,
    cost: C,
) -> Result<Vec<Position>, SearchError>
where
    N: Fn(Position) -> I,
    I: IntoIterator<Item = Position>,
    C: Fn(Position) -> u32,
{
    match algorithm {
        Algorithm::BestFirst => best_first(start, goal, neighbors, cost, heuristic),
        Algorithm::BreadthFirst => breadth_first(start, goal, neighbors),
    }
}

// Min-heap entry: lowest priority first, ties go to the smaller position.
#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    priority: f64,
    cost: u64,
    position: Position,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cost-aware best-first search.
///
/// The frontier is ordered by `g + h`, where `g` sums `cost` over every cell
/// entered. A recorded `g` is only replaced by a strictly smaller one.
/// Returns the cells from `start` to `goal`, both inclusive.
pub fn best_first<N, I, C, H>(
    start: Position,
    goal: Position,
    neighbors: N,
    cost: C,
    heuristic: H,
) -> Result<Vec<Position>, SearchError>
where
    N: Fn(Position) -> I,
    I: IntoIterator<Item = Position>,
    C: Fn(Position) -> u32,
    H: Fn(Position, Position) -> f64,
{
    let mut frontier = BinaryHeap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut cost_so_far: HashMap<Position, u64> = HashMap::new();

    frontier.push(FrontierEntry {
        priority: heuristic(start, goal),
        cost: 0,
        position: start,
    });
    cost_so_far.insert(start, 0);

    while let Some(FrontierEntry {
        cost: current_cost,
        position: current,
        ..
    }) = frontier.pop()
    {
        if current == goal {
            return Ok(reconstruct_path(&came_from, start, goal));
        }
        // Superseded by a cheaper entry pushed later.
        if cost_so_far
            .get(&current)
            .is_some_and(|&best| current_cost > best)
        {
            continue;
        }

        for neighbor in neighbors(current) {
            let new_cost = current_cost + u64::from(cost(neighbor));
            let improved = cost_so_far
                .get(&neighbor)
                .is_none_or(|&known| new_cost < known);
            if improved {
                cost_so_far.insert(neighbor, new_cost);
                came_from.insert(neighbor, current);
                frontier.push(FrontierEntry {
                    priority: new_cost as f64 + heuristic(neighbor, goal),
                    cost: new_cost,
                    position: neighbor,
                });
            }
        }
    }

    Err(SearchError::NoPath { start, goal })
}

/// Unweighted breadth-first search.
///
/// Cells are marked visited when enqueued, so each is expanded at most once
/// and the returned path has the fewest possible steps.
pub fn breadth_first<N, I>(
    start: Position,
    goal: Position,
    neighbors: N,
) -> Result<Vec<Position>, SearchError>
where
    N: Fn(Position) -> I,
    I: IntoIterator<Item = Position>,
{
    let mut queue = VecDeque::from([start]);
    let mut visited = HashSet::from([start]);
    let mut came_from: HashMap<Position, Position> = HashMap::new();

    while let Some(current) = queue.pop_front() {
        if current == goal {
            return Ok(reconstruct_path(&came_from, start, goal));
        }
        for neighbor in neighbors(current) {
            if visited.insert(neighbor) {
                came_from.insert(neighbor, current);
                queue.push_back(neighbor);
            }
        }
    }

    Err(SearchError::NoPath { start, goal })
}

fn reconstruct_path(
    came_from: &HashMap<Position, Position>,
    start: Position,
    goal: Position,
) -> Vec<Position> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&previous) => {
                current = previous;
                path.push(current);
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        map::Grid,
        world::{GridWorld, TerrainKind},
    };

    fn path_cost(world: &GridWorld, path: &[Position]) -> u32 {
        path.iter().skip(1).map(|p| world.cost_at(*p).unwrap()).sum()
    }

    fn assert_valid_path(path: &[Position], start: Position, goal: Position) {
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&goal));
        for pair in path.windows(2) {
            assert_eq!(pair[0].manhattan(pair[1]), 1, "non-adjacent step in {path:?}");
        }
        let unique: HashSet<_> = path.iter().collect();
        assert_eq!(unique.len(), path.len(), "repeated cell in {path:?}");
    }

    /// Water blocks the short way across the top row:
    ///
    /// ```text
    /// S W G
    /// . . .
    /// ```
    fn water_detour() -> GridWorld {
        let mut terrain = Grid::filled(3, 2, TerrainKind::Normal);
        terrain.set(Position::new(1, 0), TerrainKind::Water).unwrap();
        GridWorld::from_terrain(terrain)
    }

    #[test]
    fn both_searches_reach_every_cell_of_open_grid() {
        let world = GridWorld::uniform(5, 4, TerrainKind::Normal);
        let start = Position::new(2, 1);
        for goal in world.grid().positions() {
            for algorithm in [Algorithm::BestFirst, Algorithm::BreadthFirst] {
                let path = find_path(
                    algorithm,
                    start,
                    goal,
                    |p| world.neighbors(p),
                    |p| world.cost_at(p).unwrap_or(1),
                )
                .unwrap();
                assert_valid_path(&path, start, goal);
                assert_eq!(path.len(), start.manhattan(goal) + 1);
            }
        }
    }

    #[test]
    fn breadth_first_minimises_steps_and_best_first_minimises_cost() {
        let world = water_detour();
        let start = Position::new(0, 0);
        let goal = Position::new(2, 0);
        let cost = |p: Position| world.cost_at(p).unwrap_or(1);

        let bfs = breadth_first(start, goal, |p| world.neighbors(p)).unwrap();
        let astar = best_first(start, goal, |p| world.neighbors(p), cost, heuristic).unwrap();
        assert_valid_path(&bfs, start, goal);
        assert_valid_path(&astar, start, goal);

        assert_eq!(
            bfs,
            vec![Position::new(0, 0), Position::new(1, 0), Position::new(2, 0)]
        );
        assert_eq!(
            astar,
            vec![
                Position::new(0, 0),
                Position::new(0, 1),
                Position::new(1, 1),
                Position::new(2, 1),
                Position::new(2, 0),
            ]
        );
        assert!(bfs.len() <= astar.len());
        assert!(path_cost(&world, &astar) <= path_cost(&world, &bfs));
        assert_eq!(path_cost(&world, &astar), 4);
        assert_eq!(path_cost(&world, &bfs), 51);
    }

    #[test]
    fn start_equal_to_goal_is_a_single_cell_path() {
        let world = GridWorld::uniform(2, 2, TerrainKind::Normal);
        let here = Position::new(1, 1);
        assert_eq!(breadth_first(here, here, |p| world.neighbors(p)), Ok(vec![here]));
        assert_eq!(
            best_first(here, here, |p| world.neighbors(p), |_| 1, heuristic),
            Ok(vec![here])
        );
    }

    #[test]
    fn unreachable_goal_reports_no_path() {
        // A wall down column 1 that the neighbour function refuses to cross.
        let world = GridWorld::uniform(3, 3, TerrainKind::Normal);
        let passable = |p: Position| world.neighbors(p).into_iter().filter(|n| n.x != 1);
        let start = Position::new(0, 0);
        let goal = Position::new(2, 2);
        let expected = Err(SearchError::NoPath { start, goal });

        assert_eq!(breadth_first(start, goal, passable), expected);
        assert_eq!(best_first(start, goal, passable, |_| 1, heuristic), expected);
    }

    #[test]
    fn heuristic_is_a_tenth_of_manhattan() {
        let h = heuristic(Position::new(0, 0), Position::new(3, 4));
        assert!((h - 0.7).abs() < 1e-9);
    }

    #[test]
    fn toggle_flips_between_algorithms() {
        assert_eq!(Algorithm::BestFirst.toggled(), Algorithm::BreadthFirst);
        assert_eq!(Algorithm::BreadthFirst.toggled(), Algorithm::BestFirst);
    }
}
