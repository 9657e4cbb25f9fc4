//! # Session Command Surface
//!
//! Commands reach the engine from the voice recognizer and the API alike.
//! Both hand over free text; this module turns it into a `Command` or rejects
//! it, so malformed input never reaches the session state machine.
//!
//! ## Accepted Phrases
//! - `start [exercise]` / `iniciar [ejercicio]`
//! - `pause` / `pausa`
//! - `resume` / `continue` / `reanudar` / `continuar`
//! - `stop` / `detener`
//! - `switch [to] <exercise>` / `cambiar [a] <ejercicio>`
//! - `next` / `siguiente`: switch to the next exercise in table order

use crate::error::CommandParseError;
use crate::exercise::ExerciseKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "exercise", rename_all = "snake_case")]
pub enum Command {
    Start(ExerciseKind),
    Pause,
    Resume,
    Stop,
    SwitchExercise(ExerciseKind),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Start(_) => CommandKind::Start,
            Command::Pause => CommandKind::Pause,
            Command::Resume => CommandKind::Resume,
            Command::Stop => CommandKind::Stop,
            Command::SwitchExercise(_) => CommandKind::SwitchExercise,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start(kind) => write!(f, "start {}", kind),
            Command::SwitchExercise(kind) => write!(f, "switch to {}", kind),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Command without its payload, used when reporting rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Pause,
    Resume,
    Stop,
    SwitchExercise,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::Start => "start",
            CommandKind::Pause => "pause",
            CommandKind::Resume => "resume",
            CommandKind::Stop => "stop",
            CommandKind::SwitchExercise => "switch exercise",
        })
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_command(s, None)
    }
}

const FILLER: &[&str] = &["to", "the", "a", "al", "la", "el", "las", "los", "de"];

/// Parse an utterance.
///
/// `current` is the exercise the mirror is showing; it fills in a bare
/// `start` and anchors `next`.
pub fn parse_command(utterance: &str, current: Option<ExerciseKind>) -> Result<Command, CommandParseError> {
    let normalized = normalize(utterance);
    let mut words = normalized
        .split_whitespace()
        .filter(|w| !FILLER.contains(w));

    let Some(intent) = words.next() else {
        return Err(CommandParseError::Empty);
    };
    let rest: Vec<&str> = words.collect();
    let exercise = || -> Result<Option<ExerciseKind>, CommandParseError> {
        if rest.is_empty() {
            Ok(None)
        } else {
            rest.join(" ").parse().map(Some)
        }
    };

    match intent {
        "start" | "begin" | "iniciar" | "empezar" | "comenzar" => match exercise()?.or(current) {
            Some(kind) => Ok(Command::Start(kind)),
            None => Err(CommandParseError::MissingExercise(intent.to_string())),
        },
        "pause" | "pausa" | "pausar" => Ok(Command::Pause),
        "resume" | "continue" | "reanudar" | "continuar" => Ok(Command::Resume),
        "stop" | "finish" | "detener" | "terminar" | "parar" => Ok(Command::Stop),
        "switch" | "change" | "cambiar" => match exercise()? {
            Some(kind) => Ok(Command::SwitchExercise(kind)),
            None => Err(CommandParseError::MissingExercise(intent.to_string())),
        },
        "next" | "siguiente" => match current {
            Some(kind) => Ok(Command::SwitchExercise(kind.next())),
            None => Err(CommandParseError::MissingExercise(intent.to_string())),
        },
        _ => Err(CommandParseError::UnknownIntent(utterance.trim().to_string())),
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' => 'a',
            'é' | 'è' => 'e',
            'í' | 'ì' => 'i',
            'ó' | 'ò' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            c if c.is_alphanumeric() || c == '-' => c,
            _ => ' ',
        })
        .collect()
}
