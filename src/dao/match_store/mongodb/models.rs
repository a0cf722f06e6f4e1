use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{CardEntity, GuessEntity, HintEntity, MatchEntity, PlayerEntity, TeamEntity},
    state::{
        game::{CardColor, TeamColor},
        state_machine::MatchStatus,
    },
};

/// Stored shape of a match; the join code is the document id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    code: String,
    status: MatchStatus,
    capacity: u32,
    starting_team: TeamColor,
    current_team: Option<TeamColor>,
    winner: Option<TeamColor>,
    cards: Vec<CardEntity>,
    teams: Vec<TeamEntity>,
    players: Vec<PlayerEntity>,
    #[serde(default)]
    guesses: Vec<MongoGuessDocument>,
    #[serde(default)]
    hints: Vec<MongoHintDocument>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoGuessDocument {
    player_id: String,
    team: TeamColor,
    position: u8,
    revealed: CardColor,
    at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoHintDocument {
    player_id: String,
    team: TeamColor,
    word: String,
    count: u8,
    at: DateTime,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            code: value.code,
            status: value.status,
            capacity: value.capacity,
            starting_team: value.starting_team,
            current_team: value.current_team,
            winner: value.winner,
            cards: value.cards,
            teams: value.teams,
            players: value.players,
            guesses: value
                .guesses
                .into_iter()
                .map(|guess| MongoGuessDocument {
                    player_id: guess.player_id,
                    team: guess.team,
                    position: guess.position,
                    revealed: guess.revealed,
                    at: DateTime::from_system_time(guess.at),
                })
                .collect(),
            hints: value
                .hints
                .into_iter()
                .map(|hint| MongoHintDocument {
                    player_id: hint.player_id,
                    team: hint.team,
                    word: hint.word,
                    count: hint.count,
                    at: DateTime::from_system_time(hint.at),
                })
                .collect(),
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoMatchDocument> for MatchEntity {
    fn from(value: MongoMatchDocument) -> Self {
        Self {
            code: value.code,
            status: value.status,
            capacity: value.capacity,
            starting_team: value.starting_team,
            current_team: value.current_team,
            winner: value.winner,
            cards: value.cards,
            teams: value.teams,
            players: value.players,
            guesses: value
                .guesses
                .into_iter()
                .map(|guess| GuessEntity {
                    player_id: guess.player_id,
                    team: guess.team,
                    position: guess.position,
                    revealed: guess.revealed,
                    at: guess.at.to_system_time(),
                })
                .collect(),
            hints: value
                .hints
                .into_iter()
                .map(|hint| HintEntity {
                    player_id: hint.player_id,
                    team: hint.team,
                    word: hint.word,
                    count: hint.count,
                    at: hint.at.to_system_time(),
                })
                .collect(),
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(|at| at.to_system_time()),
            ended_at: value.ended_at.map(|at| at.to_system_time()),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Filter selecting a match document by code.
pub fn doc_code(code: &str) -> Document {
    doc! { "_id": code }
}
