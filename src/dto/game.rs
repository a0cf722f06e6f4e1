use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::MatchEntity,
    dto::format_system_time,
    state::{
        game::{Card, CardColor, Match, TeamColor},
        state_machine::MatchStatus,
        visibility::{CardView, Viewer, project_board, project_card},
    },
};

/// Smallest roster a match can be created with.
pub const MIN_CAPACITY: usize = 2;
/// Largest roster a match can be created with.
pub const MAX_CAPACITY: usize = 16;

/// Payload used to create a new match.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CreateMatchRequest {
    /// Roster size; the configured default when omitted.
    #[serde(default)]
    #[validate(range(min = MIN_CAPACITY, max = MAX_CAPACITY))]
    pub capacity: Option<usize>,
}

/// Public view of a roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PlayerSummary {
    /// Token subject of the player.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Chosen team, if any.
    pub team: Option<TeamColor>,
    /// Whether the player gives hints for their team.
    pub is_hint_giver: bool,
    /// Whether a connection is attached.
    pub is_active: bool,
}

/// Score and members of one team.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TeamSummary {
    /// Team color.
    pub color: TeamColor,
    /// Own cards revealed so far.
    pub score: u32,
    /// Own cards still hidden.
    pub remaining: usize,
    /// User ids on the team.
    pub members: Vec<String>,
}

/// Hint the acting team is playing on.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct HintSummary {
    /// Hint word.
    pub word: String,
    /// Cards the hint refers to.
    pub count: u8,
    /// Team that gave the hint.
    pub team: TeamColor,
}

/// Match state as seen by one caller. Card colors follow the caller's role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MatchSummary {
    /// Join code.
    pub code: String,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Maximum roster size.
    pub capacity: usize,
    /// Team that plays first.
    pub starting_team: TeamColor,
    /// Team whose turn it is while active.
    pub current_team: Option<TeamColor>,
    /// Winning team, once decided.
    pub winner: Option<TeamColor>,
    /// Both teams.
    pub teams: Vec<TeamSummary>,
    /// Roster in join order.
    pub players: Vec<PlayerSummary>,
    /// Board in position order, projected for the caller.
    pub cards: Vec<CardView>,
    /// Hint of the current turn, if given.
    pub active_hint: Option<HintSummary>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl MatchSummary {
    /// Summarize a live match for `user_id`.
    pub fn for_viewer(game: &Match, user_id: &str) -> Self {
        let viewer = Viewer::of(game.player(user_id));
        let teams = [TeamColor::Red, TeamColor::Blue]
            .into_iter()
            .map(|color| {
                let team = game.team(color);
                TeamSummary {
                    color,
                    score: team.score,
                    remaining: game.board().remaining(CardColor::from(color)),
                    members: team.members.clone(),
                }
            })
            .collect();

        Self {
            code: game.code().to_owned(),
            status: game.status(),
            capacity: game.capacity(),
            starting_team: game.board().starting_team(),
            current_team: game.current_team(),
            winner: game.winner(),
            teams,
            players: game
                .players()
                .map(|player| PlayerSummary {
                    user_id: player.user_id.clone(),
                    name: player.name.clone(),
                    team: player.team,
                    is_hint_giver: player.is_hint_giver,
                    is_active: player.is_active,
                })
                .collect(),
            cards: project_board(game.board(), viewer),
            active_hint: game.turn().and_then(|turn| {
                turn.hint.as_ref().map(|hint| HintSummary {
                    word: hint.word.clone(),
                    count: hint.count,
                    team: turn.team,
                })
            }),
            created_at: format_system_time(game.created_at()),
        }
    }

    /// Summarize a stored match no longer live on this instance.
    pub fn from_entity(entity: MatchEntity, user_id: &str) -> Self {
        let viewer = if entity
            .players
            .iter()
            .any(|player| {
                player.user_id == user_id && player.is_hint_giver && player.team.is_some()
            })
        {
            Viewer::HintGiver
        } else {
            Viewer::Operative
        };

        let cards = entity
            .cards
            .iter()
            .map(|card| {
                let stored =
                    Card::restored(card.position, card.word.clone(), card.color, card.revealed);
                project_card(&stored, viewer)
            })
            .collect();

        let teams = entity
            .teams
            .into_iter()
            .map(|team| TeamSummary {
                color: team.color,
                score: team.score,
                remaining: entity
                    .cards
                    .iter()
                    .filter(|card| card.color == CardColor::from(team.color) && !card.revealed)
                    .count(),
                members: team.members,
            })
            .collect();

        Self {
            code: entity.code,
            status: entity.status,
            capacity: entity.capacity as usize,
            starting_team: entity.starting_team,
            current_team: entity.current_team,
            winner: entity.winner,
            teams,
            players: entity
                .players
                .into_iter()
                .map(|player| PlayerSummary {
                    user_id: player.user_id,
                    name: player.name,
                    team: player.team,
                    is_hint_giver: player.is_hint_giver,
                    is_active: player.is_active,
                })
                .collect(),
            cards,
            active_hint: None,
            created_at: format_system_time(entity.created_at),
        }
    }
}

/// Row of the active match listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MatchListItem {
    /// Join code.
    pub code: String,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Players on the roster.
    pub player_count: usize,
    /// Maximum roster size.
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use validator::Validate;

    use super::*;
    use crate::state::game::tests::active_match;

    #[test]
    fn capacity_bounds_are_validated() {
        assert!(CreateMatchRequest { capacity: None }.validate().is_ok());
        assert!(CreateMatchRequest { capacity: Some(MIN_CAPACITY) }.validate().is_ok());
        assert!(CreateMatchRequest { capacity: Some(MAX_CAPACITY + 1) }.validate().is_err());
        assert!(CreateMatchRequest { capacity: Some(1) }.validate().is_err());
    }

    #[test]
    fn live_summary_projects_by_role() {
        let mut game = active_match();
        game.give_hint("red-hint", "fruit", 2, SystemTime::now()).unwrap();

        let operative = MatchSummary::for_viewer(&game, "red-op");
        assert!(operative.cards.iter().all(|card| card.color.is_none()));
        assert_eq!(
            operative.active_hint,
            Some(HintSummary {
                word: "fruit".into(),
                count: 2,
                team: TeamColor::Red,
            })
        );
        assert_eq!(operative.players.len(), 4);

        let hint_giver = MatchSummary::for_viewer(&game, "blue-hint");
        assert!(hint_giver.cards.iter().all(|card| card.color.is_some()));

        let stranger = MatchSummary::for_viewer(&game, "nobody");
        assert!(stranger.cards.iter().all(|card| card.color.is_none()));
    }

    #[test]
    fn stored_summary_keeps_revealed_colors_only() {
        let mut game = active_match();
        game.guess("red-op", &[0], SystemTime::now()).unwrap();

        let summary = MatchSummary::from_entity(game.entity(), "red-op");
        assert_eq!(summary.cards[0].color, Some(CardColor::Red));
        assert!(summary.cards[0].revealed);
        assert!(summary.cards[1..].iter().all(|card| card.color.is_none()));

        let red = summary
            .teams
            .iter()
            .find(|team| team.color == TeamColor::Red)
            .unwrap();
        assert_eq!(red.score, 1);
        assert_eq!(red.remaining, 8);
    }
}
