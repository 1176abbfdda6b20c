// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::sync::{LazyLock, Mutex};

use rand::{
    Rng, SeedableRng,
    rngs::StdRng,
    seq::{IndexedRandom, SliceRandom},
};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, de};

pub const DEFAULT_DIFFICULTY: i64 = 1;
pub const DEFAULT_TUTORIAL_VIDEOS: u32 = 5;
/// Number of pieces in a board state; states are permutations of `0..STATE_SIZE`.
pub const STATE_SIZE: u8 = 7;

/// Every response a movement can be answered with, in tag order.
pub const ALL_MOVEMENT_RESPONSES: [ResponseKind; 5] = [
    ResponseKind::Speech,
    ResponseKind::ChangeDiff,
    ResponseKind::Tutorial,
    ResponseKind::Correct,
    ResponseKind::Ask,
];

pub type Movement = Vec<i64>;
pub type BoardState = Vec<u8>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseKind {
    Speech,
    ChangeDiff,
    Tutorial,
    Correct,
    Ask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameResponse {
    pub message: String,
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRequest {
    /// Integer-valued strings and floats are coerced, so `["1", 2.0]` reads as `[1, 2]`.
    #[serde(deserialize_with = "deserialize_movement")]
    pub movement: Movement,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LaxInt {
    Int(i64),
    Float(f64),
    Text(String),
}

impl LaxInt {
    fn into_i64(self) -> Result<i64, String> {
        match self {
            Self::Int(value) => Ok(value),
            Self::Float(value) => {
                if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
                    Ok(value as i64)
                } else {
                    Err(format!("{value} is not a valid integer"))
                }
            }
            Self::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("\"{text}\" is not a valid integer")),
        }
    }
}

fn deserialize_movement<'de, D>(deserializer: D) -> Result<Movement, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<LaxInt>::deserialize(deserializer)?
        .into_iter()
        .map(|value| value.into_i64().map_err(de::Error::custom))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextActions {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDiffActions {
    pub text: String,
    /// Either `-1` or `1`.
    pub level_plus: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorialActions {
    pub text: String,
    pub video: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectActions {
    pub text: String,
    pub last_state: BoardState,
    pub best_next_state: BoardState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestNextActions {
    pub text: String,
    pub best_next: BoardState,
}

/// A tutor reply, serialized as `{"type": "<TAG>", "actions": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "actions", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TutorResponse {
    Speech(TextActions),
    ChangeDiff(ChangeDiffActions),
    Tutorial(TutorialActions),
    Correct(CorrectActions),
    Ask(TextActions),
    BestNext(BestNextActions),
}

impl TutorResponse {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Speech(_) => "SPEECH",
            Self::ChangeDiff(_) => "CHANGE_DIFF",
            Self::Tutorial(_) => "TUTORIAL",
            Self::Correct(_) => "CORRECT",
            Self::Ask(_) => "ASK",
            Self::BestNext(_) => "BEST_NEXT",
        }
    }

    /// Difficulty delta carried by a `CHANGE_DIFF` reply.
    pub fn level_change(&self) -> Option<i64> {
        match self {
            Self::ChangeDiff(actions) => Some(actions.level_plus),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TutorError {
    #[error("tutor RNG lock poisoned")]
    RngPoisoned,
    #[error("invalid response catalog: {0}")]
    InvalidCatalog(String),
}

/// Canned texts a [`Tutor`] picks from.
///
/// Every field has a built-in default, so a partial YAML override only needs
/// the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCatalog {
    pub speech_texts: Vec<String>,
    pub change_diff_text: String,
    pub tutorial_text: String,
    pub tutorial_videos: u32,
    pub correct_text: String,
    pub ask_text: String,
    pub best_next_text: String,
}

impl Default for ResponseCatalog {
    fn default() -> Self {
        Self {
            speech_texts: vec![
                "Buen trabajo.".to_string(),
                "Vamos bien, sigue así.".to_string(),
                "¿Probamos algo diferente?".to_string(),
                "¡Eso fue interesante!".to_string(),
                "Analizando movimiento...".to_string(),
            ],
            change_diff_text: "Ajustando dificultad...".to_string(),
            tutorial_text: "Te recomiendo ver este tutorial.".to_string(),
            tutorial_videos: DEFAULT_TUTORIAL_VIDEOS,
            correct_text: "Este sería un mejor movimiento.".to_string(),
            ask_text: "¿Quieres que te ayude con el siguiente movimiento?".to_string(),
            best_next_text: "Este es el mejor siguiente movimiento.".to_string(),
        }
    }
}

impl ResponseCatalog {
    pub fn validate(&self) -> Result<(), TutorError> {
        if self.speech_texts.iter().all(|text| text.trim().is_empty()) {
            return Err(TutorError::InvalidCatalog(
                "speech_texts must contain at least one non-empty text".to_string(),
            ));
        }
        if self.tutorial_videos == 0 {
            return Err(TutorError::InvalidCatalog(
                "tutorial_videos must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Picks canned replies at random.
///
/// The RNG sits behind a `Mutex` so a shared `Tutor` can answer from any
/// handler. Pass a seed to get a reproducible sequence of replies.
pub struct Tutor {
    catalog: ResponseCatalog,
    rng: Mutex<StdRng>,
}

impl Tutor {
    pub fn new(catalog: ResponseCatalog, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            catalog,
            rng: Mutex::new(rng),
        }
    }

    /// Answer a submitted movement with one of the five movement replies.
    pub fn respond_to_movement(&self) -> Result<TutorResponse, TutorError> {
        let mut rng = self.rng.lock().map_err(|_| TutorError::RngPoisoned)?;
        let kind = ALL_MOVEMENT_RESPONSES[rng.random_range(0..ALL_MOVEMENT_RESPONSES.len())];
        Ok(self.build(kind, &mut *rng))
    }

    pub fn respond_with(&self, kind: ResponseKind) -> Result<TutorResponse, TutorError> {
        let mut rng = self.rng.lock().map_err(|_| TutorError::RngPoisoned)?;
        Ok(self.build(kind, &mut *rng))
    }

    pub fn best_next(&self) -> Result<TutorResponse, TutorError> {
        let mut rng = self.rng.lock().map_err(|_| TutorError::RngPoisoned)?;
        Ok(TutorResponse::BestNext(BestNextActions {
            text: self.catalog.best_next_text.clone(),
            best_next: random_state(&mut *rng),
        }))
    }

    fn build(&self, kind: ResponseKind, rng: &mut StdRng) -> TutorResponse {
        match kind {
            ResponseKind::Speech => TutorResponse::Speech(TextActions {
                text: self.speech_text(rng),
            }),
            ResponseKind::ChangeDiff => TutorResponse::ChangeDiff(ChangeDiffActions {
                text: self.catalog.change_diff_text.clone(),
                level_plus: if rng.random_bool(0.5) { 1 } else { -1 },
            }),
            ResponseKind::Tutorial => TutorResponse::Tutorial(TutorialActions {
                text: self.catalog.tutorial_text.clone(),
                video: random_video(rng, self.catalog.tutorial_videos),
            }),
            ResponseKind::Correct => TutorResponse::Correct(CorrectActions {
                text: self.catalog.correct_text.clone(),
                last_state: random_state(rng),
                best_next_state: random_state(rng),
            }),
            ResponseKind::Ask => TutorResponse::Ask(TextActions {
                text: self.catalog.ask_text.clone(),
            }),
        }
    }

    /// Blank entries in the catalog are never spoken.
    fn speech_text(&self, rng: &mut StdRng) -> String {
        let texts: Vec<&String> = self
            .catalog
            .speech_texts
            .iter()
            .filter(|text| !text.trim().is_empty())
            .collect();
        texts
            .choose(rng)
            .map(|text| text.to_string())
            .unwrap_or_default()
    }

    /// Leave the RNG mutex poisoned, as if a holder had panicked.
    #[cfg(any(test, feature = "test-util"))]
    pub fn poison_rng(&self) {
        fn hold_and_panic(rng: &Mutex<StdRng>) {
            let _guard = rng.lock();
            panic!("tutor RNG holder panicked");
        }

        let _ = std::thread::scope(|scope| scope.spawn(|| hold_and_panic(&self.rng)).join());
    }
}

/// A shuffled board state holding each of `0..STATE_SIZE` exactly once.
pub fn random_state<R: Rng + ?Sized>(rng: &mut R) -> BoardState {
    let mut state: BoardState = (0..STATE_SIZE).collect();
    state.shuffle(rng);
    state
}

/// `VIDEO<n>.MP4` with `n` uniform in `1..=videos`.
pub fn random_video<R: Rng + ?Sized>(rng: &mut R, videos: u32) -> String {
    let n = rng.random_range(1..=videos.max(1));
    format!("VIDEO{n}.MP4")
}

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
});

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .into_owned()
}
