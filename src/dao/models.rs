use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::state::{
    game::{CardColor, TeamColor},
    state_machine::MatchStatus,
};

/// Card as stored, including its true color.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardEntity {
    /// Position on the board, 0 to 24.
    pub position: u8,
    /// Printed word.
    pub word: String,
    /// True color.
    pub color: CardColor,
    /// Whether the card was guessed.
    pub revealed: bool,
}

/// Team score and members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Team color.
    pub color: TeamColor,
    /// Own cards revealed.
    pub score: u32,
    /// Member user ids.
    pub members: Vec<String>,
}

/// Roster entry. Connection handles are process-local and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// User id from the identity provider.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Team assignment.
    pub team: Option<TeamColor>,
    /// Hint-giver flag.
    pub is_hint_giver: bool,
    /// Active-participant flag.
    pub is_active: bool,
}

/// Guess log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuessEntity {
    /// Acting player.
    pub player_id: String,
    /// Acting team.
    pub team: TeamColor,
    /// Guessed position.
    pub position: u8,
    /// Color the guess revealed.
    pub revealed: CardColor,
    /// When the guess was applied.
    pub at: SystemTime,
}

/// Hint log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HintEntity {
    /// Hint-giver.
    pub player_id: String,
    /// Team the hint was for.
    pub team: TeamColor,
    /// Clue word.
    pub word: String,
    /// Announced count.
    pub count: u8,
    /// When the hint was given.
    pub at: SystemTime,
}

/// Full match record written on creation, start and end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Join code, also the primary key.
    pub code: String,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Maximum roster size.
    pub capacity: u32,
    /// Team that acted first.
    pub starting_team: TeamColor,
    /// Team acting when the record was written.
    pub current_team: Option<TeamColor>,
    /// Winning team, if any.
    pub winner: Option<TeamColor>,
    /// Board cards ordered by position.
    pub cards: Vec<CardEntity>,
    /// Red and blue teams.
    pub teams: Vec<TeamEntity>,
    /// Roster in join order.
    pub players: Vec<PlayerEntity>,
    /// Guess log.
    pub guesses: Vec<GuessEntity>,
    /// Hint log.
    pub hints: Vec<HintEntity>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Start time.
    pub started_at: Option<SystemTime>,
    /// End time.
    pub ended_at: Option<SystemTime>,
    /// Last write time.
    pub updated_at: SystemTime,
}
