use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{
    game::{TeamColor, is_valid_word},
    visibility::CardView,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Commands accepted from player WebSocket clients.
///
/// The acting player is always the authenticated connection owner; commands
/// never carry a player identity.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Attach the connection to a match and enter its roster.
    JoinGame {
        /// Join code, matched case-insensitively.
        code: String,
    },
    /// Pick a team and role while the match is waiting.
    UpdateTeam {
        /// Join code.
        code: String,
        /// Team to join.
        team: TeamColor,
        /// Whether to take the team's hint-giver seat.
        #[serde(default)]
        is_hint_giver: bool,
    },
    /// Start the match.
    StartGame {
        /// Join code.
        code: String,
    },
    /// Guess one or more board positions.
    ExecuteGuess {
        /// Join code.
        code: String,
        /// Board positions, applied in order.
        positions: Vec<u8>,
    },
    /// Give a one-word hint with a count.
    GiveHint {
        /// Join code.
        code: String,
        /// Single hint word.
        word: String,
        /// Cards the hint refers to.
        count: u8,
    },
    /// Force-terminate the match.
    EndGame {
        /// Join code.
        code: String,
    },
}

impl ClientCommand {
    /// Decode a text frame into a command.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Join code the command targets.
    pub fn code(&self) -> &str {
        match self {
            Self::JoinGame { code }
            | Self::UpdateTeam { code, .. }
            | Self::StartGame { code }
            | Self::ExecuteGuess { code, .. }
            | Self::GiveHint { code, .. }
            | Self::EndGame { code } => code,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinGame { .. } => "join_game",
            Self::UpdateTeam { .. } => "update_team",
            Self::StartGame { .. } => "start_game",
            Self::ExecuteGuess { .. } => "execute_guess",
            Self::GiveHint { .. } => "give_hint",
            Self::EndGame { .. } => "end_game",
        }
    }

    /// Cheap shape checks done before any match is locked.
    pub fn check_shape(&self) -> Result<(), String> {
        if self.code().trim().is_empty() {
            return Err("match code is required".into());
        }
        if let Self::GiveHint { word, .. } = self {
            if !is_valid_word(word.trim()) {
                return Err("hint must be a single word".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Events pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A player attached to the match.
    PlayerJoined {
        /// User id of the joining player.
        caller_id: String,
        /// Display name of the joining player.
        player_name: String,
        /// Roster size after the join.
        total_players: usize,
    },
    /// A player changed team or role.
    PlayerTeamChanged {
        /// User id of the player.
        player_id: String,
        /// Display name of the player.
        player_name: String,
        /// Team the player joined.
        new_team: TeamColor,
        /// Whether the player now gives hints.
        is_hint_giver: bool,
    },
    /// The match started.
    GameStarted {
        /// Team that plays first.
        first_team: TeamColor,
    },
    /// The recipient's own projection of the board.
    ReceiveCards {
        /// Every card in position order.
        cards: Vec<CardView>,
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
    /// The acting team's hint-giver gave a hint.
    HintGiven {
        /// Hint word.
        word: String,
        /// Cards the hint refers to.
        count: u8,
        /// Team that gave the hint.
        team: TeamColor,
    },
    /// The match was terminated.
    GameEnded {
        /// Winning team, if one was decided before the end.
        winner: Option<TeamColor>,
    },
    /// A command was rejected. Only the caller receives it.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Build an error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_decode_from_snake_case_tags() {
        let command = ClientCommand::from_json_str(
            r#"{"type":"execute_guess","code":"ABCD1234","positions":[3,7]}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            ClientCommand::ExecuteGuess {
                code: "ABCD1234".into(),
                positions: vec![3, 7],
            }
        );

        let command =
            ClientCommand::from_json_str(r#"{"type":"update_team","code":"X","team":"blue"}"#)
                .unwrap();
        assert!(matches!(
            command,
            ClientCommand::UpdateTeam {
                team: TeamColor::Blue,
                is_hint_giver: false,
                ..
            }
        ));
    }

    #[test]
    fn unknown_or_malformed_commands_fail_to_decode() {
        assert!(ClientCommand::from_json_str(r#"{"type":"cheat","code":"X"}"#).is_err());
        assert!(ClientCommand::from_json_str(r#"{"type":"execute_guess","code":"X","positions":[-1]}"#).is_err());
        assert!(ClientCommand::from_json_str("not json").is_err());
    }

    #[test]
    fn shape_checks_reject_blank_codes_and_multi_word_hints() {
        let blank = ClientCommand::StartGame { code: "  ".into() };
        assert!(blank.check_shape().is_err());

        let hint = ClientCommand::GiveHint {
            code: "X".into(),
            word: "two words".into(),
            count: 1,
        };
        assert!(hint.check_shape().is_err());
    }

    #[test]
    fn server_messages_carry_type_tags() {
        let value = serde_json::to_value(ServerMessage::GameStarted {
            first_team: TeamColor::Red,
        })
        .unwrap();
        assert_eq!(value["type"], "game_started");
        assert_eq!(value["first_team"], "red");

        let value = serde_json::to_value(ServerMessage::error("nope")).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "nope");
    }
}
