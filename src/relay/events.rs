use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dto::ws::ServerMessage,
    state::{game::TeamColor, visibility::CardView},
};

/// Routing key of [`RelayPayload::MatchCreated`].
pub const MATCH_CREATED: &str = "match.created";
/// Routing key of [`RelayPayload::MatchStarted`].
pub const MATCH_STARTED: &str = "match.started";
/// Routing key of [`RelayPayload::GuessExecuted`].
pub const GUESS_EXECUTED: &str = "match.guess_executed";
/// Routing key of [`RelayPayload::HintGiven`].
pub const HINT_GIVEN: &str = "match.hint_given";
/// Routing key of [`RelayPayload::MatchEnded`].
pub const MATCH_ENDED: &str = "match.ended";

/// State change carried across instances. Only publicly visible data travels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayPayload {
    /// A match was created and its creator joined.
    MatchCreated {
        /// Team that will play first.
        starting_team: TeamColor,
        /// Roster size after creation.
        total_players: usize,
    },
    /// The match left Waiting.
    MatchStarted {
        /// Team that plays first.
        first_team: TeamColor,
    },
    /// A guess batch was applied.
    GuessExecuted {
        /// Cards revealed by the batch, colors included.
        revealed_cards: Vec<CardView>,
        /// Whether the batch decided the match.
        is_game_over: bool,
        /// Winning team, when decided.
        winner: Option<TeamColor>,
        /// Team to play next, absent once over.
        current_team: Option<TeamColor>,
    },
    /// A hint-giver gave a hint.
    HintGiven {
        /// Hint word.
        word: String,
        /// Cards the hint refers to.
        count: u8,
        /// Team that gave the hint.
        team: TeamColor,
    },
    /// The match was terminated and dropped by its owner.
    MatchEnded {
        /// Winning team, if one was decided before the end.
        winner: Option<TeamColor>,
    },
}

impl RelayPayload {
    /// Topic routing key for this payload.
    pub fn routing_key(&self) -> &'static str {
        match self {
            Self::MatchCreated { .. } => MATCH_CREATED,
            Self::MatchStarted { .. } => MATCH_STARTED,
            Self::GuessExecuted { .. } => GUESS_EXECUTED,
            Self::HintGiven { .. } => HINT_GIVEN,
            Self::MatchEnded { .. } => MATCH_ENDED,
        }
    }

    /// Message fanned out to group members, if the event has one.
    pub fn to_server_message(&self) -> Option<ServerMessage> {
        match self {
            Self::MatchCreated { .. } => None,
            Self::MatchStarted { first_team } => Some(ServerMessage::GameStarted {
                first_team: *first_team,
            }),
            Self::GuessExecuted {
                revealed_cards,
                is_game_over,
                winner,
                current_team,
            } => Some(ServerMessage::GuessExecuted {
                revealed_cards: revealed_cards.clone(),
                is_game_over: *is_game_over,
                winner: *winner,
                current_team: *current_team,
            }),
            Self::HintGiven { word, count, team } => Some(ServerMessage::HintGiven {
                word: word.clone(),
                count: *count,
                team: *team,
            }),
            Self::MatchEnded { winner } => Some(ServerMessage::GameEnded { winner: *winner }),
        }
    }
}

/// Message body published to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    /// Unique id of this event.
    pub event_id: Uuid,
    /// Topic routing key, duplicated from the payload for consumers that only peek.
    pub routing_key: String,
    /// Join code of the match.
    pub code: String,
    /// Per-match monotonically increasing sequence number.
    pub sequence: u64,
    /// Instance that produced the event.
    pub origin: Uuid,
    /// When the change was applied.
    pub occurred_at: SystemTime,
    /// The change itself.
    pub payload: RelayPayload,
}

impl RelayEnvelope {
    /// Wrap a payload produced by `origin` for match `code`.
    pub fn new(code: impl Into<String>, sequence: u64, origin: Uuid, payload: RelayPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            routing_key: payload.routing_key().to_owned(),
            code: code.into(),
            sequence,
            origin,
            occurred_at: SystemTime::now(),
            payload,
        }
    }
}
