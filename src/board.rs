//! Board representation and win/draw evaluation.
//!
//! The evaluator is pure: it inspects a board snapshot and never touches
//! session state. Callers must check for a win before checking for a draw —
//! a full board whose last move completed a line is a win, never a draw.

use serde::{Deserialize, Serialize};

/// One of the two per-session marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// Mark assigned to the session creator (moves first).
    X,
    /// Mark assigned to the joining player.
    O,
}

impl Mark {
    /// Returns the other mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// A single cell on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Square {
    /// Empty cell.
    Empty,
    /// Cell holding a player's mark.
    Marked(Mark),
}

/// 3x3 board in row-major order (positions 0-8).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    squares: [Square; 9],
}

/// The 8 canonical winning triples: 3 rows, 3 columns, 2 diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8], // Rows
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8], // Columns
    [0, 4, 8],
    [2, 4, 6], // Diagonals
];

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            squares: [Square::Empty; 9],
        }
    }

    /// Gets the square at the given position (0-8), `None` when out of range.
    pub fn get(&self, pos: usize) -> Option<Square> {
        self.squares.get(pos).copied()
    }

    /// Sets the square at the given position.
    ///
    /// # Errors
    ///
    /// Returns an error if the position is outside 0-8.
    pub fn set(&mut self, pos: usize, square: Square) -> Result<(), &'static str> {
        if pos >= 9 {
            return Err("Position out of bounds");
        }
        self.squares[pos] = square;
        Ok(())
    }

    /// Checks if a square is empty. Out-of-range positions are not empty.
    pub fn is_empty(&self, pos: usize) -> bool {
        matches!(self.get(pos), Some(Square::Empty))
    }

    /// Returns all squares as a slice.
    pub fn squares(&self) -> &[Square; 9] {
        &self.squares
    }

    /// Checks if the board is full.
    pub fn is_full(&self) -> bool {
        self.squares.iter().all(|&s| s != Square::Empty)
    }

    /// True iff one of the 8 canonical triples is entirely `mark`.
    pub fn has_win(&self, mark: Mark) -> bool {
        LINES
            .iter()
            .any(|line| line.iter().all(|&pos| self.squares[pos] == Square::Marked(mark)))
    }

    /// Returns the mark that completed a line, if any.
    pub fn winner(&self) -> Option<Mark> {
        [Mark::X, Mark::O].into_iter().find(|&m| self.has_win(m))
    }

    /// True iff the board is full and neither mark has won.
    ///
    /// Win takes precedence: callers decide the outcome by checking
    /// [`Board::has_win`] for the mark just placed before calling this.
    pub fn is_draw(&self) -> bool {
        self.is_full() && self.winner().is_none()
    }

    /// Formats the board as a human-readable string.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let pos = row * 3 + col;
                let symbol = match self.squares[pos] {
                    Square::Empty => (pos + 1).to_string(),
                    Square::Marked(m) => m.to_string(),
                };
                result.push_str(&symbol);
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
