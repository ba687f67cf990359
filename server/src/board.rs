//! Authoritative board: piece occupancy, goal areas and the distance field
//!
//! Every field caches the length of the shortest 4-directional path to the
//! nearest piece on the board. The cache is rebuilt from scratch by a
//! multi-source breadth-first search whenever a piece appears or disappears,
//! so reads between two mutations are always exact.

use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{GameRules, Position, Team};
use std::collections::VecDeque;

/// A collectible piece. Validity is drawn once at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub is_valid: bool,
}

/// A single board field
#[derive(Debug, Clone, Default)]
pub struct Field {
    pub piece: Option<Piece>,
    /// Team owning the goal area this field belongs to
    pub goal_area: Option<Team>,
    /// Hidden goal that has not been realized yet
    pub is_goal: bool,
    /// Set once a valid piece realized the goal here; never reset
    pub is_goal_revealed: bool,
    /// Distance to the nearest piece; None when the board holds no piece
    pub distance: Option<u32>,
}

impl Field {
    pub fn has_piece(&self) -> bool {
        self.piece.is_some()
    }
}

/// Distances in the 3x3 window centred on a field, indexed `[dx + 1][dy + 1]`.
/// Entries off the board or without a distance are None.
pub type Neighborhood = [[Option<u32>; 3]; 3];

pub struct GameMasterBoard {
    width: usize,
    height: usize,
    fields: Vec<Field>,
    /// Pieces in play, on the board or held by an agent
    piece_count: usize,
}

impl GameMasterBoard {
    /// Creates an empty board with the goal-area bands of `rules` marked.
    pub fn new(rules: &GameRules) -> Self {
        let width = rules.board_width;
        let height = rules.board_height;
        let mut fields = vec![Field::default(); width * height];
        for y in 0..height {
            let owner = rules.goal_area_owner(y);
            for x in 0..width {
                fields[y * width + x].goal_area = owner;
            }
        }

        Self {
            width,
            height,
            fields,
            piece_count: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    pub fn field(&self, position: Position) -> &Field {
        &self.fields[self.index(position)]
    }

    fn index(&self, position: Position) -> usize {
        position.y * self.width + position.x
    }

    pub fn is_in_goal_area(&self, position: Position, team: Team) -> bool {
        self.contains(position) && self.field(position).goal_area == Some(team)
    }

    pub fn is_task_area(&self, position: Position) -> bool {
        self.contains(position) && self.field(position).goal_area.is_none()
    }

    pub fn distance_at(&self, position: Position) -> Option<u32> {
        self.field(position).distance
    }

    /// Randomly hides `goal_count` goals in each team's goal area.
    pub fn place_goals<R: Rng>(&mut self, goal_count: u32, rng: &mut R) {
        for team in [Team::Red, Team::Blue] {
            let mut candidates: Vec<usize> = self
                .fields
                .iter()
                .enumerate()
                .filter(|(_, field)| field.goal_area == Some(team))
                .map(|(index, _)| index)
                .collect();
            candidates.shuffle(rng);
            for index in candidates.into_iter().take(goal_count as usize) {
                self.fields[index].is_goal = true;
            }
        }
    }

    /// Marks a goal field (unrevealed hidden goal) for tests and scenarios
    /// with a fixed layout.
    pub fn set_goal(&mut self, position: Position) {
        let index = self.index(position);
        self.fields[index].is_goal = true;
    }

    /// Consumes the hidden goal at `position`. Returns false if there was none.
    pub fn reveal_goal(&mut self, position: Position) -> bool {
        let index = self.index(position);
        let field = &mut self.fields[index];
        if !field.is_goal || field.is_goal_revealed {
            return false;
        }
        field.is_goal = false;
        field.is_goal_revealed = true;
        true
    }

    /// Puts a piece on an empty field and rebuilds the distance field.
    /// Returns false without changes if the field already holds a piece.
    pub fn place_piece(&mut self, position: Position, piece: Piece) -> bool {
        let index = self.index(position);
        if self.fields[index].piece.is_some() {
            return false;
        }
        self.fields[index].piece = Some(piece);
        self.recalculate_distances();
        true
    }

    /// Takes the piece off a field and rebuilds the distance field. The piece
    /// stays in play (it is now held), so the piece count is unchanged.
    pub fn remove_piece(&mut self, position: Position) -> Option<Piece> {
        let index = self.index(position);
        let piece = self.fields[index].piece.take()?;
        self.recalculate_distances();
        Some(piece)
    }

    /// Takes a piece out of play after it was destroyed or consumed.
    pub fn discard_piece(&mut self) {
        self.piece_count = self.piece_count.saturating_sub(1);
    }

    /// Spawns a piece on a random empty task-area field unless `max_pieces`
    /// are already in play. Returns where it landed.
    pub fn generate_piece<R: Rng>(
        &mut self,
        valid_probability: f64,
        max_pieces: usize,
        rng: &mut R,
    ) -> Option<Position> {
        if self.piece_count >= max_pieces {
            debug!("Max pieces on board reached ({})", max_pieces);
            return None;
        }

        let free: Vec<Position> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| Position::new(x, y)))
            .filter(|pos| self.is_task_area(*pos) && !self.field(*pos).has_piece())
            .collect();
        let position = *free.choose(rng)?;
        self.generate_piece_at(position, valid_probability, rng);
        Some(position)
    }

    /// Spawns a piece on a specific field, ignoring the task-area restriction.
    pub fn generate_piece_at<R: Rng>(&mut self, position: Position, valid_probability: f64, rng: &mut R) -> bool {
        let piece = Piece {
            is_valid: rng.gen_bool(valid_probability),
        };
        if !self.place_piece(position, piece) {
            return false;
        }
        self.piece_count += 1;
        trace!("Piece ({}) generated at ({}, {})", if piece.is_valid { "valid" } else { "fake" }, position.x, position.y);
        true
    }

    /// Multi-source BFS seeded at every piece.
    pub fn recalculate_distances(&mut self) {
        let mut queue = VecDeque::new();

        for (index, field) in self.fields.iter_mut().enumerate() {
            if field.has_piece() {
                field.distance = Some(0);
                queue.push_back(index);
            } else {
                field.distance = None;
            }
        }

        while let Some(index) = queue.pop_front() {
            let current = self.fields[index].distance.unwrap_or(0);
            let (x, y) = (index % self.width, index / self.width);

            for direction in shared::MoveDirection::ALL {
                if let Some(next) = Position::new(x, y).step(direction, self.width, self.height) {
                    let next_index = self.index(next);
                    if self.fields[next_index].distance.is_none() {
                        self.fields[next_index].distance = Some(current + 1);
                        queue.push_back(next_index);
                    }
                }
            }
        }
    }

    /// Returns the 3x3 window of distances centred on `position`.
    pub fn neighborhood(&self, position: Position) -> Neighborhood {
        let mut window = [[None; 3]; 3];
        for (i, column) in window.iter_mut().enumerate() {
            for (j, cell) in column.iter_mut().enumerate() {
                let x = (position.x + i).checked_sub(1);
                let y = (position.y + j).checked_sub(1);
                if let (Some(x), Some(y)) = (x, y) {
                    let neighbour = Position::new(x, y);
                    if self.contains(neighbour) {
                        *cell = self.distance_at(neighbour);
                    }
                }
            }
        }
        window
    }
}
