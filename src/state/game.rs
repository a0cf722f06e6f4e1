use std::{collections::HashSet, time::SystemTime};

use indexmap::IndexMap;
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{CardEntity, GuessEntity, HintEntity, MatchEntity, PlayerEntity, TeamEntity},
    error::ServiceError,
    state::state_machine::{LifecycleEvent, MatchLifecycle, MatchStatus},
};

/// Number of cards on a board.
pub const BOARD_SIZE: usize = 25;
/// Cards owned by the team that acts first.
pub const STARTING_TEAM_CARDS: usize = 9;
/// Cards owned by the team that acts second.
pub const OTHER_TEAM_CARDS: usize = 8;
/// Cards owned by nobody.
pub const NEUTRAL_CARDS: usize = 7;
/// Trap cards on a board.
pub const TRAP_CARDS: usize = 1;
/// Longest allowed card word or hint word, in characters.
pub const MAX_WORD_CHARS: usize = 15;
/// Smallest count a hint may announce.
pub const MIN_HINT_COUNT: u8 = 1;
/// Largest count a hint may announce.
pub const MAX_HINT_COUNT: u8 = 3;
/// Default number of players a match accepts.
pub const DEFAULT_CAPACITY: usize = 4;

/// Identifier of a live WebSocket connection.
pub type ConnectionId = Uuid;

/// One of the two competing teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeamColor {
    /// Red team.
    Red,
    /// Blue team.
    Blue,
}

impl TeamColor {
    /// The opposing team.
    pub fn other(self) -> Self {
        match self {
            TeamColor::Red => TeamColor::Blue,
            TeamColor::Blue => TeamColor::Red,
        }
    }
}

/// True identity of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardColor {
    /// Belongs to the red team.
    Red,
    /// Belongs to the blue team.
    Blue,
    /// Belongs to nobody.
    Neutral,
    /// The trap card.
    Trap,
}

impl CardColor {
    /// Team owning a card of this color, if any.
    pub fn team(self) -> Option<TeamColor> {
        match self {
            CardColor::Red => Some(TeamColor::Red),
            CardColor::Blue => Some(TeamColor::Blue),
            CardColor::Neutral | CardColor::Trap => None,
        }
    }
}

impl From<TeamColor> for CardColor {
    fn from(value: TeamColor) -> Self {
        match value {
            TeamColor::Red => CardColor::Red,
            TeamColor::Blue => CardColor::Blue,
        }
    }
}

/// A positioned card on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Position on the board, 0 to 24.
    pub position: u8,
    /// Word printed on the card.
    pub word: String,
    /// True color, hidden from operatives until revealed.
    pub color: CardColor,
    revealed: bool,
}

impl Card {
    /// Build an unrevealed card.
    pub fn new(position: u8, word: impl Into<String>, color: CardColor) -> Self {
        Self {
            position,
            word: word.into(),
            color,
            revealed: false,
        }
    }

    /// Rebuild a card from its stored form.
    pub fn restored(position: u8, word: impl Into<String>, color: CardColor, revealed: bool) -> Self {
        Self {
            revealed,
            ..Self::new(position, word, color)
        }
    }

    /// Whether the card has been guessed.
    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    /// Flip the card face up. Returns `false` when it was already revealed.
    fn reveal(&mut self) -> bool {
        if self.revealed {
            return false;
        }
        self.revealed = true;
        true
    }
}

/// Reasons a board cannot be generated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    /// The word list yields fewer than [`BOARD_SIZE`] usable unique words.
    #[error("word list has {available} usable unique words, {BOARD_SIZE} are required")]
    NotEnoughWords {
        /// Number of usable unique words found.
        available: usize,
    },
}

/// The 25-card grid of a match.
#[derive(Debug, Clone)]
pub struct Board {
    cards: Vec<Card>,
    starting_team: TeamColor,
}

impl Board {
    /// Draw 25 unique words and deal 9/8/7/1 colors across them.
    ///
    /// Words are trimmed and deduplicated case-insensitively; entries that are
    /// empty, longer than [`MAX_WORD_CHARS`] or contain whitespace are skipped.
    pub fn generate<R: Rng + ?Sized>(
        words: &[String],
        starting_team: TeamColor,
        rng: &mut R,
    ) -> Result<Self, BoardError> {
        let mut seen = HashSet::new();
        let mut pool: Vec<&str> = words
            .iter()
            .map(|word| word.trim())
            .filter(|word| is_valid_word(word))
            .filter(|word| seen.insert(word.to_lowercase()))
            .collect();

        if pool.len() < BOARD_SIZE {
            return Err(BoardError::NotEnoughWords {
                available: pool.len(),
            });
        }

        pool.shuffle(rng);
        pool.truncate(BOARD_SIZE);

        let mut colors = Vec::with_capacity(BOARD_SIZE);
        colors.extend(std::iter::repeat_n(
            CardColor::from(starting_team),
            STARTING_TEAM_CARDS,
        ));
        colors.extend(std::iter::repeat_n(
            CardColor::from(starting_team.other()),
            OTHER_TEAM_CARDS,
        ));
        colors.extend(std::iter::repeat_n(CardColor::Neutral, NEUTRAL_CARDS));
        colors.extend(std::iter::repeat_n(CardColor::Trap, TRAP_CARDS));
        colors.shuffle(rng);

        let cards = pool
            .into_iter()
            .zip(colors)
            .enumerate()
            .map(|(position, (word, color))| Card::new(position as u8, word, color))
            .collect();

        Ok(Self {
            cards,
            starting_team,
        })
    }

    /// Assemble a board from already-dealt cards (restoration and tests).
    pub fn from_cards(cards: Vec<Card>, starting_team: TeamColor) -> Self {
        Self {
            cards,
            starting_team,
        }
    }

    /// All cards ordered by position.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Card at `position`, if it exists.
    pub fn card(&self, position: u8) -> Option<&Card> {
        self.cards.get(position as usize)
    }

    /// Team recorded as acting first.
    pub fn starting_team(&self) -> TeamColor {
        self.starting_team
    }

    /// Number of cards of `color` still face down.
    pub fn remaining(&self, color: CardColor) -> usize {
        self.cards
            .iter()
            .filter(|card| card.color == color && !card.revealed)
            .count()
    }

    fn reveal(&mut self, position: u8) -> Option<&Card> {
        let card = self.cards.get_mut(position as usize)?;
        card.reveal();
        Some(&*card)
    }
}

/// A team and its running score.
#[derive(Debug, Clone)]
pub struct Team {
    /// Team color.
    pub color: TeamColor,
    /// Own-color cards revealed so far.
    pub score: u32,
    /// User ids of the members.
    pub members: Vec<String>,
}

impl Team {
    fn new(color: TeamColor) -> Self {
        Self {
            color,
            score: 0,
            members: Vec::new(),
        }
    }
}

/// A roster entry.
#[derive(Debug, Clone)]
pub struct Player {
    /// Stable user id taken from the verified token.
    pub user_id: String,
    /// Display name taken from the verified token.
    pub name: String,
    /// Team assignment, if any.
    pub team: Option<TeamColor>,
    /// Whether the player gives hints for their team.
    pub is_hint_giver: bool,
    /// Whether the player still takes part in the match.
    pub is_active: bool,
    /// Live connection currently attached for this player.
    pub connection: Option<ConnectionId>,
}

/// Immutable guess log entry.
#[derive(Debug, Clone)]
pub struct GuessEntry {
    /// Acting player.
    pub player_id: String,
    /// Team the player guessed for.
    pub team: TeamColor,
    /// Guessed position.
    pub position: u8,
    /// Color revealed by the guess.
    pub revealed: CardColor,
    /// When the guess was applied.
    pub at: SystemTime,
}

/// Immutable hint log entry.
#[derive(Debug, Clone)]
pub struct HintEntry {
    /// Hint-giver who produced the hint.
    pub player_id: String,
    /// Team the hint is for.
    pub team: TeamColor,
    /// Single-word clue.
    pub word: String,
    /// Number of related cards announced.
    pub count: u8,
    /// When the hint was given.
    pub at: SystemTime,
}

/// Hint currently driving a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveHint {
    /// Clue word.
    pub word: String,
    /// Announced count.
    pub count: u8,
}

/// Turn bookkeeping: which team acts, with which hint, and how many guesses it made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Team currently acting.
    pub team: TeamColor,
    /// Hint given during this turn, if any.
    pub hint: Option<ActiveHint>,
    /// Cards revealed since the turn's hint, or since the turn began when no
    /// hint was given yet.
    pub guesses: u8,
}

impl Turn {
    fn new(team: TeamColor) -> Self {
        Self {
            team,
            hint: None,
            guesses: 0,
        }
    }

    /// Guesses left before the turn passes. `None` means unbounded (no hint yet).
    pub fn allowance(&self) -> Option<usize> {
        self.hint.as_ref().map(|hint| {
            (usize::from(hint.count) + 1).saturating_sub(usize::from(self.guesses))
        })
    }
}

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// `false` when the player was already on the roster.
    pub newly_joined: bool,
    /// Roster size after the join.
    pub total_players: usize,
}

/// Result of a guess batch.
#[derive(Debug, Clone)]
pub struct GuessOutcome {
    /// Cards revealed by this batch, in processing order.
    pub revealed: Vec<Card>,
    /// Set when the batch ended the match.
    pub winner: Option<TeamColor>,
    /// Whether the turn moved to the other team.
    pub turn_passed: bool,
    /// Team acting after the batch; `None` once the match is over.
    pub current_team: Option<TeamColor>,
}

/// Authoritative state of one match.
#[derive(Debug, Clone)]
pub struct Match {
    code: String,
    board: Board,
    red: Team,
    blue: Team,
    roster: IndexMap<String, Player>,
    capacity: usize,
    lifecycle: MatchLifecycle,
    turn: Option<Turn>,
    winner: Option<TeamColor>,
    guesses: Vec<GuessEntry>,
    hints: Vec<HintEntry>,
    created_at: SystemTime,
    started_at: Option<SystemTime>,
    ended_at: Option<SystemTime>,
    updated_at: SystemTime,
    sequence: u64,
}

impl Match {
    /// Create a waiting match around a freshly generated board.
    pub fn new(code: impl Into<String>, board: Board, capacity: usize) -> Self {
        let now = SystemTime::now();
        Self {
            code: code.into(),
            board,
            red: Team::new(TeamColor::Red),
            blue: Team::new(TeamColor::Blue),
            roster: IndexMap::new(),
            capacity,
            lifecycle: MatchLifecycle::new(),
            turn: None,
            winner: None,
            guesses: Vec::new(),
            hints: Vec::new(),
            created_at: now,
            started_at: None,
            ended_at: None,
            updated_at: now,
            sequence: 0,
        }
    }

    /// Join code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current lifecycle status.
    pub fn status(&self) -> MatchStatus {
        self.lifecycle.status()
    }

    /// Board of the match.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Team of the given color.
    pub fn team(&self, color: TeamColor) -> &Team {
        match color {
            TeamColor::Red => &self.red,
            TeamColor::Blue => &self.blue,
        }
    }

    fn team_mut(&mut self, color: TeamColor) -> &mut Team {
        match color {
            TeamColor::Red => &mut self.red,
            TeamColor::Blue => &mut self.blue,
        }
    }

    /// Roster in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.roster.values()
    }

    /// Roster entry for `user_id`.
    pub fn player(&self, user_id: &str) -> Option<&Player> {
        self.roster.get(user_id)
    }

    /// Number of players on the roster.
    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    /// Maximum roster size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current turn, only present while active.
    pub fn turn(&self) -> Option<&Turn> {
        self.turn.as_ref()
    }

    /// Team currently acting.
    pub fn current_team(&self) -> Option<TeamColor> {
        self.turn.as_ref().map(|turn| turn.team)
    }

    /// Winning team, set once a team revealed all its cards.
    pub fn winner(&self) -> Option<TeamColor> {
        self.winner
    }

    /// Guess log in application order.
    pub fn guesses(&self) -> &[GuessEntry] {
        &self.guesses
    }

    /// Hint log in application order.
    pub fn hints(&self) -> &[HintEntry] {
        &self.hints
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Start timestamp.
    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    /// End timestamp.
    pub fn ended_at(&self) -> Option<SystemTime> {
        self.ended_at
    }

    /// Allocate the next per-match event sequence number.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub(crate) fn lifecycle_mut(&mut self) -> &mut MatchLifecycle {
        &mut self.lifecycle
    }

    /// Add a player to the roster, or acknowledge a player already on it.
    pub fn join(&mut self, user_id: &str, name: &str) -> Result<JoinOutcome, ServiceError> {
        if self.roster.contains_key(user_id) {
            return Ok(JoinOutcome {
                newly_joined: false,
                total_players: self.roster.len(),
            });
        }

        if self.status() != MatchStatus::Waiting {
            return Err(ServiceError::InvalidState(format!(
                "match `{}` has already started",
                self.code
            )));
        }

        if self.roster.len() >= self.capacity {
            return Err(ServiceError::InvalidState(format!(
                "match `{}` is full",
                self.code
            )));
        }

        self.roster.insert(
            user_id.to_owned(),
            Player {
                user_id: user_id.to_owned(),
                name: name.to_owned(),
                team: None,
                is_hint_giver: false,
                is_active: true,
                connection: None,
            },
        );
        self.updated_at = SystemTime::now();

        Ok(JoinOutcome {
            newly_joined: true,
            total_players: self.roster.len(),
        })
    }

    /// Move a player to `team`, optionally as its hint-giver.
    pub fn assign_team(
        &mut self,
        user_id: &str,
        team: TeamColor,
        hint_giver: bool,
    ) -> Result<&Player, ServiceError> {
        if self.status() != MatchStatus::Waiting {
            return Err(ServiceError::InvalidState(
                "teams can only change before the match starts".into(),
            ));
        }

        if !self.roster.contains_key(user_id) {
            return Err(not_on_roster(user_id));
        }

        if hint_giver
            && self.roster.values().any(|player| {
                player.user_id != user_id && player.team == Some(team) && player.is_hint_giver
            })
        {
            return Err(ServiceError::InvalidState(format!(
                "team {team:?} already has a hint-giver"
            )));
        }

        for color in [TeamColor::Red, TeamColor::Blue] {
            self.team_mut(color).members.retain(|member| member != user_id);
        }
        self.team_mut(team).members.push(user_id.to_owned());

        self.updated_at = SystemTime::now();
        let player = self
            .roster
            .get_mut(user_id)
            .ok_or_else(|| not_on_roster(user_id))?;
        player.team = Some(team);
        player.is_hint_giver = hint_giver;
        Ok(player)
    }

    /// Roster entry of a caller acting on the match (start, end), or `NotFound` for strangers.
    pub fn ensure_member(&self, user_id: &str) -> Result<&Player, ServiceError> {
        self.roster.get(user_id).ok_or_else(|| not_on_roster(user_id))
    }

    /// Record the live connection of a roster member.
    pub fn attach_connection(&mut self, user_id: &str, connection: ConnectionId) {
        if let Some(player) = self.roster.get_mut(user_id) {
            player.connection = Some(connection);
            player.is_active = true;
        }
    }

    /// Clear the connection handle if it still points at `connection`.
    pub fn detach_connection(&mut self, user_id: &str, connection: ConnectionId) {
        if let Some(player) = self.roster.get_mut(user_id) {
            if player.connection == Some(connection) {
                player.connection = None;
            }
        }
    }

    /// Clear every connection handle (the match is being dropped).
    pub fn detach_all(&mut self) {
        for player in self.roster.values_mut() {
            player.connection = None;
        }
    }

    /// Apply a batch of guesses for the acting team.
    pub fn guess(
        &mut self,
        user_id: &str,
        positions: &[u8],
        now: SystemTime,
    ) -> Result<GuessOutcome, ServiceError> {
        let turn = self.acting_turn()?.clone();
        let player = self.roster.get(user_id).ok_or_else(|| not_on_roster(user_id))?;

        if player.is_hint_giver {
            return Err(ServiceError::Unauthorized(
                "hint-givers cannot guess".into(),
            ));
        }
        if player.team != Some(turn.team) {
            return Err(ServiceError::InvalidState(format!(
                "it is team {:?}'s turn",
                turn.team
            )));
        }

        self.validate_positions(positions, &turn)?;

        let team = turn.team;
        let own_color = CardColor::from(team);
        let mut revealed = Vec::with_capacity(positions.len());
        let mut missed = false;
        let mut winner = None;

        for &position in positions {
            let Some(card) = self.board.reveal(position) else {
                continue;
            };
            let card = card.clone();

            self.guesses.push(GuessEntry {
                player_id: user_id.to_owned(),
                team,
                position,
                revealed: card.color,
                at: now,
            });
            if let Some(owner) = card.color.team() {
                self.team_mut(owner).score += 1;
            }
            if let Some(turn) = self.turn.as_mut() {
                turn.guesses = turn.guesses.saturating_add(1);
            }
            if card.color != own_color {
                missed = true;
            }
            revealed.push(card);

            if let Some(team) = self.completed_team() {
                winner = Some(team);
                break;
            }
        }

        self.updated_at = now;

        if let Some(team) = winner {
            self.transition_now(LifecycleEvent::Win(team), now)?;
            return Ok(GuessOutcome {
                revealed,
                winner,
                turn_passed: false,
                current_team: None,
            });
        }

        let exhausted = self
            .turn
            .as_ref()
            .and_then(Turn::allowance)
            .is_some_and(|left| left == 0);
        let turn_passed = missed || exhausted;
        if turn_passed {
            self.turn = Some(Turn::new(team.other()));
        }

        Ok(GuessOutcome {
            revealed,
            winner: None,
            turn_passed,
            current_team: self.current_team(),
        })
    }

    /// Record a hint from the acting team's hint-giver.
    pub fn give_hint(
        &mut self,
        user_id: &str,
        word: &str,
        count: u8,
        now: SystemTime,
    ) -> Result<HintEntry, ServiceError> {
        let turn = self.acting_turn()?.clone();
        let player = self.roster.get(user_id).ok_or_else(|| not_on_roster(user_id))?;

        if !player.is_hint_giver {
            return Err(ServiceError::Unauthorized(
                "only hint-givers can give hints".into(),
            ));
        }
        if player.team != Some(turn.team) {
            return Err(ServiceError::Unauthorized(format!(
                "it is team {:?}'s turn",
                turn.team
            )));
        }
        if turn.hint.is_some() {
            return Err(ServiceError::InvalidState(
                "a hint was already given this turn".into(),
            ));
        }

        let word = word.trim();
        if !is_valid_word(word) {
            return Err(ServiceError::InvalidInput(format!(
                "hint must be a single word of 1 to {MAX_WORD_CHARS} characters"
            )));
        }
        if !(MIN_HINT_COUNT..=MAX_HINT_COUNT).contains(&count) {
            return Err(ServiceError::InvalidInput(format!(
                "hint count must be between {MIN_HINT_COUNT} and {MAX_HINT_COUNT}"
            )));
        }
        if self
            .board
            .cards()
            .iter()
            .any(|card| !card.is_revealed() && card.word.eq_ignore_ascii_case(word))
        {
            return Err(ServiceError::InvalidInput(
                "hint cannot be a word still on the board".into(),
            ));
        }

        let entry = HintEntry {
            player_id: user_id.to_owned(),
            team: turn.team,
            word: word.to_owned(),
            count,
            at: now,
        };
        self.hints.push(entry.clone());
        if let Some(turn) = self.turn.as_mut() {
            turn.hint = Some(ActiveHint {
                word: entry.word.clone(),
                count,
            });
            // The allowance counts from the hint.
            turn.guesses = 0;
        }
        self.updated_at = now;

        Ok(entry)
    }

    /// Side effects bound to a committed lifecycle event.
    pub(crate) fn commit_effects(&mut self, event: &LifecycleEvent, now: SystemTime) {
        match event {
            LifecycleEvent::Start => {
                self.started_at = Some(now);
                self.turn = Some(Turn::new(self.board.starting_team()));
            }
            LifecycleEvent::Win(team) => {
                self.winner = Some(*team);
                self.ended_at = Some(now);
                self.turn = None;
            }
            LifecycleEvent::End => {
                self.ended_at.get_or_insert(now);
                self.turn = None;
            }
        }
        self.updated_at = now;
    }

    /// Persistence view of this match as it will look once `event` commits to `status`.
    pub(crate) fn staged_entity(
        &self,
        event: &LifecycleEvent,
        status: MatchStatus,
        now: SystemTime,
    ) -> MatchEntity {
        let mut staged = self.clone();
        staged.commit_effects(event, now);
        staged.to_entity(status)
    }

    /// Persistence view of the current state.
    pub fn entity(&self) -> MatchEntity {
        self.to_entity(self.status())
    }

    fn transition_now(
        &mut self,
        event: LifecycleEvent,
        now: SystemTime,
    ) -> Result<MatchStatus, ServiceError> {
        let plan = self.lifecycle.plan(event.clone())?;
        let next = self.lifecycle.apply(plan.id)?;
        self.commit_effects(&event, now);
        Ok(next)
    }

    fn acting_turn(&self) -> Result<&Turn, ServiceError> {
        if self.status() != MatchStatus::Active {
            return Err(ServiceError::InvalidState(format!(
                "match `{}` is not active",
                self.code
            )));
        }
        self.turn
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidState("no team is acting".into()))
    }

    fn validate_positions(&self, positions: &[u8], turn: &Turn) -> Result<(), ServiceError> {
        if positions.is_empty() {
            return Err(ServiceError::InvalidInput(
                "at least one position is required".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(positions.len());
        for &position in positions {
            if !seen.insert(position) {
                return Err(ServiceError::InvalidInput(format!(
                    "position {position} is listed twice"
                )));
            }
            let card = self.board.card(position).ok_or_else(|| {
                ServiceError::InvalidInput(format!("position {position} is off the board"))
            })?;
            if card.is_revealed() {
                return Err(ServiceError::InvalidInput(format!(
                    "card at position {position} is already revealed"
                )));
            }
        }

        if let Some(left) = turn.allowance() {
            if positions.len() > left {
                return Err(ServiceError::InvalidInput(format!(
                    "mismatched count: {} positions, {left} guesses left this turn",
                    positions.len()
                )));
            }
        }

        Ok(())
    }

    fn completed_team(&self) -> Option<TeamColor> {
        [TeamColor::Red, TeamColor::Blue]
            .into_iter()
            .find(|team| self.board.remaining(CardColor::from(*team)) == 0)
    }

    fn to_entity(&self, status: MatchStatus) -> MatchEntity {
        MatchEntity {
            code: self.code.clone(),
            status,
            capacity: self.capacity as u32,
            starting_team: self.board.starting_team(),
            current_team: self.current_team(),
            winner: self.winner,
            cards: self
                .board
                .cards()
                .iter()
                .map(|card| CardEntity {
                    position: card.position,
                    word: card.word.clone(),
                    color: card.color,
                    revealed: card.is_revealed(),
                })
                .collect(),
            teams: [&self.red, &self.blue]
                .into_iter()
                .map(|team| TeamEntity {
                    color: team.color,
                    score: team.score,
                    members: team.members.clone(),
                })
                .collect(),
            players: self
                .roster
                .values()
                .map(|player| PlayerEntity {
                    user_id: player.user_id.clone(),
                    name: player.name.clone(),
                    team: player.team,
                    is_hint_giver: player.is_hint_giver,
                    is_active: player.is_active,
                })
                .collect(),
            guesses: self
                .guesses
                .iter()
                .map(|guess| GuessEntity {
                    player_id: guess.player_id.clone(),
                    team: guess.team,
                    position: guess.position,
                    revealed: guess.revealed,
                    at: guess.at,
                })
                .collect(),
            hints: self
                .hints
                .iter()
                .map(|hint| HintEntity {
                    player_id: hint.player_id.clone(),
                    team: hint.team,
                    word: hint.word.clone(),
                    count: hint.count,
                    at: hint.at,
                })
                .collect(),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            updated_at: self.updated_at,
        }
    }
}

/// Card words and hint words: 1 to 15 characters, no whitespace.
pub fn is_valid_word(word: &str) -> bool {
    let chars = word.chars().count();
    (1..=MAX_WORD_CHARS).contains(&chars) && !word.chars().any(char::is_whitespace)
}

fn not_on_roster(user_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("player `{user_id}` is not part of this match"))
}

#[cfg(test)]
pub(crate) mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    pub(crate) fn words() -> Vec<String> {
        (0..40).map(|index| format!("word{index}")).collect()
    }

    /// Board with reds at 0..9, blues at 9..17, neutrals at 17..24 and the trap at 24.
    pub(crate) fn fixed_board() -> Board {
        let cards = (0..BOARD_SIZE as u8)
            .map(|position| {
                let color = match position {
                    0..=8 => CardColor::Red,
                    9..=16 => CardColor::Blue,
                    17..=23 => CardColor::Neutral,
                    _ => CardColor::Trap,
                };
                Card::new(position, format!("card{position}"), color)
            })
            .collect();
        Board::from_cards(cards, TeamColor::Red)
    }

    /// Active match with a red and blue hint-giver plus one operative per team.
    pub(crate) fn active_match() -> Match {
        let mut game = Match::new("ABCD1234", fixed_board(), DEFAULT_CAPACITY);
        for (id, team, hint_giver) in [
            ("red-hint", TeamColor::Red, true),
            ("red-op", TeamColor::Red, false),
            ("blue-hint", TeamColor::Blue, true),
            ("blue-op", TeamColor::Blue, false),
        ] {
            game.join(id, id).unwrap();
            game.assign_team(id, team, hint_giver).unwrap();
        }
        game.transition_now(LifecycleEvent::Start, SystemTime::now())
            .unwrap();
        game
    }

    #[test]
    fn board_generation_deals_expected_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        let board = Board::generate(&words(), TeamColor::Blue, &mut rng).unwrap();

        assert_eq!(board.cards().len(), BOARD_SIZE);
        assert_eq!(board.remaining(CardColor::Blue), STARTING_TEAM_CARDS);
        assert_eq!(board.remaining(CardColor::Red), OTHER_TEAM_CARDS);
        assert_eq!(board.remaining(CardColor::Neutral), NEUTRAL_CARDS);
        assert_eq!(board.remaining(CardColor::Trap), TRAP_CARDS);

        let unique: HashSet<_> = board.cards().iter().map(|card| &card.word).collect();
        assert_eq!(unique.len(), BOARD_SIZE);
        for (index, card) in board.cards().iter().enumerate() {
            assert_eq!(card.position as usize, index);
            assert!(!card.is_revealed());
        }
    }

    #[test]
    fn board_generation_requires_enough_unique_words() {
        let mut list: Vec<String> = (0..24).map(|index| format!("w{index}")).collect();
        list.push("W0".into());
        list.push("has space".into());
        list.push("x".repeat(16));
        let mut rng = StdRng::seed_from_u64(1);

        let err = Board::generate(&list, TeamColor::Red, &mut rng).unwrap_err();
        assert_eq!(err, BoardError::NotEnoughWords { available: 24 });
    }

    #[test]
    fn join_is_idempotent_and_capacity_bound() {
        let mut game = Match::new("CODE", fixed_board(), 2);
        assert!(game.join("a", "Ann").unwrap().newly_joined);
        let again = game.join("a", "Ann").unwrap();
        assert!(!again.newly_joined);
        assert_eq!(again.total_players, 1);

        game.join("b", "Bob").unwrap();
        let err = game.join("c", "Cid").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[test]
    fn only_one_hint_giver_per_team() {
        let mut game = Match::new("CODE", fixed_board(), DEFAULT_CAPACITY);
        game.join("a", "Ann").unwrap();
        game.join("b", "Bob").unwrap();
        game.assign_team("a", TeamColor::Red, true).unwrap();

        let err = game.assign_team("b", TeamColor::Red, true).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        // Re-assigning the current hint-giver is fine.
        game.assign_team("a", TeamColor::Red, true).unwrap();
        game.assign_team("b", TeamColor::Blue, true).unwrap();
        assert_eq!(game.team(TeamColor::Red).members, vec!["a".to_string()]);
    }

    #[test]
    fn changing_team_moves_membership() {
        let mut game = Match::new("CODE", fixed_board(), DEFAULT_CAPACITY);
        game.join("a", "Ann").unwrap();
        game.assign_team("a", TeamColor::Red, false).unwrap();
        game.assign_team("a", TeamColor::Blue, false).unwrap();

        assert!(game.team(TeamColor::Red).members.is_empty());
        assert_eq!(game.team(TeamColor::Blue).members, vec!["a".to_string()]);
        assert_eq!(game.player("a").unwrap().team, Some(TeamColor::Blue));
    }

    #[test]
    fn team_changes_are_rejected_once_active() {
        let mut game = active_match();
        let err = game
            .assign_team("red-op", TeamColor::Blue, false)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[test]
    fn guess_rejects_bad_batches() {
        let mut game = active_match();
        let now = SystemTime::now();

        for positions in [vec![], vec![1, 1], vec![25]] {
            let err = game.guess("red-op", &positions, now).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)), "{positions:?}");
        }
        assert!(game.guesses().is_empty());
    }

    #[test]
    fn re_guessing_a_revealed_card_is_rejected_without_changes() {
        let mut game = active_match();
        let now = SystemTime::now();
        game.guess("red-op", &[0], now).unwrap();
        let score = game.team(TeamColor::Red).score;

        let err = game.guess("red-op", &[0], now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(game.guesses().len(), 1);
        assert_eq!(game.team(TeamColor::Red).score, score);
    }

    #[test]
    fn guess_is_restricted_to_acting_operatives() {
        let mut game = active_match();
        let now = SystemTime::now();

        let err = game.guess("red-hint", &[0], now).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = game.guess("blue-op", &[9], now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let err = game.guess("stranger", &[0], now).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn guess_before_start_is_rejected() {
        let mut game = Match::new("CODE", fixed_board(), DEFAULT_CAPACITY);
        game.join("a", "Ann").unwrap();
        let err = game.guess("a", &[0], SystemTime::now()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[test]
    fn a_miss_passes_the_turn() {
        let mut game = active_match();
        let outcome = game.guess("red-op", &[0, 17], SystemTime::now()).unwrap();

        assert!(outcome.turn_passed);
        assert_eq!(outcome.current_team, Some(TeamColor::Blue));
        assert_eq!(game.team(TeamColor::Red).score, 1);
        assert_eq!(game.turn().unwrap().guesses, 0);
    }

    #[test]
    fn hitting_an_opponent_card_scores_for_them() {
        let mut game = active_match();
        let outcome = game.guess("red-op", &[9], SystemTime::now()).unwrap();
        assert!(outcome.turn_passed);
        assert_eq!(game.team(TeamColor::Blue).score, 1);
        assert_eq!(game.team(TeamColor::Red).score, 0);
    }

    #[test]
    fn trap_passes_the_turn_without_ending_the_match() {
        let mut game = active_match();
        let outcome = game.guess("red-op", &[24], SystemTime::now()).unwrap();

        assert!(outcome.winner.is_none());
        assert!(outcome.turn_passed);
        assert_eq!(game.status(), MatchStatus::Active);
        assert_eq!(game.guesses()[0].revealed, CardColor::Trap);
    }

    #[test]
    fn exhausting_the_hint_allowance_passes_the_turn() {
        let mut game = active_match();
        let now = SystemTime::now();
        game.give_hint("red-hint", "fruit", 1, now).unwrap();

        let err = game.guess("red-op", &[0, 1, 2], now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let outcome = game.guess("red-op", &[0], now).unwrap();
        assert!(!outcome.turn_passed);
        assert_eq!(game.turn().unwrap().allowance(), Some(1));

        let outcome = game.guess("red-op", &[1], now).unwrap();
        assert!(outcome.turn_passed);
        assert_eq!(outcome.current_team, Some(TeamColor::Blue));
    }

    #[test]
    fn allowance_counts_from_a_late_hint() {
        let mut game = active_match();
        let now = SystemTime::now();
        game.guess("red-op", &[0], now).unwrap();
        game.guess("red-op", &[1], now).unwrap();

        game.give_hint("red-hint", "fruit", 1, now).unwrap();
        assert_eq!(game.turn().unwrap().allowance(), Some(2));

        let outcome = game.guess("red-op", &[2], now).unwrap();
        assert!(!outcome.turn_passed);
        let outcome = game.guess("red-op", &[3], now).unwrap();
        assert!(outcome.turn_passed);
        assert_eq!(game.current_team(), Some(TeamColor::Blue));
        assert_eq!(game.guesses().len(), 4);
    }

    #[test]
    fn hint_rules() {
        let mut game = active_match();
        let now = SystemTime::now();

        let err = game.give_hint("red-op", "fruit", 1, now).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        let err = game.give_hint("blue-hint", "fruit", 1, now).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        let err = game.give_hint("red-hint", "two words", 1, now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        let err = game.give_hint("red-hint", "fruit", 4, now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        let err = game.give_hint("red-hint", "CARD3", 1, now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let entry = game.give_hint("red-hint", "fruit", 2, now).unwrap();
        assert_eq!(entry.team, TeamColor::Red);
        let err = game.give_hint("red-hint", "apple", 1, now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(game.hints().len(), 1);
    }

    #[test]
    fn win_is_recorded_exactly_once() {
        let mut game = active_match();
        let now = SystemTime::now();

        // Without a hint the allowance is unbounded, so red keeps the turn.
        for position in 0..8u8 {
            let outcome = game.guess("red-op", &[position], now).unwrap();
            assert!(outcome.winner.is_none());
        }

        let outcome = game.guess("red-op", &[8, 9], now).unwrap();
        assert_eq!(outcome.winner, Some(TeamColor::Red));
        assert_eq!(outcome.revealed.len(), 1);
        assert!(!game.board().card(9).unwrap().is_revealed());
        assert_eq!(game.status(), MatchStatus::Over);
        assert!(game.ended_at().is_some());

        let err = game.guess("red-op", &[10], now).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(game.winner(), Some(TeamColor::Red));
    }
}
