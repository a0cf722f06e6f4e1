//! Role-based projection of card identities.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::game::{Board, Card, CardColor, Player};

/// Role a viewer holds with respect to card identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// Sees every card's true color.
    HintGiver,
    /// Sees true colors of revealed cards only.
    Operative,
}

impl Viewer {
    /// Role of a roster entry. Unknown viewers are treated as operatives.
    pub fn of(player: Option<&Player>) -> Self {
        match player {
            Some(player) if player.is_hint_giver && player.team.is_some() => Viewer::HintGiver,
            _ => Viewer::Operative,
        }
    }
}

/// A card as one viewer is allowed to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardView {
    /// Position on the board.
    pub position: u8,
    /// Printed word.
    pub word: String,
    /// True color, omitted when hidden from the viewer.
    pub color: Option<CardColor>,
    /// Whether the card was guessed.
    pub revealed: bool,
}

/// Project one card for `viewer`.
pub fn project_card(card: &Card, viewer: Viewer) -> CardView {
    let visible = card.is_revealed() || viewer == Viewer::HintGiver;
    CardView {
        position: card.position,
        word: card.word.clone(),
        color: visible.then_some(card.color),
        revealed: card.is_revealed(),
    }
}

/// Project the whole board for `viewer`, ordered by position.
pub fn project_board(board: &Board, viewer: Viewer) -> Vec<CardView> {
    board
        .cards()
        .iter()
        .map(|card| project_card(card, viewer))
        .collect()
}
