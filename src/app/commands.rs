//! Operator commands.
//!
//! Typed out on the console (or sent by a supervisory link) and handled
//! by the control loop between ticks.  Parsing is kept here so every
//! front end agrees on the syntax.

use core::fmt;

/// Commands the operator can issue to the running controller.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// Engage the emergency stop.
    Stop,
    /// Release the emergency stop.
    Resume,
    /// Place a simulated fire in the scene and report it on the feed.
    Fire {
        sector_deg: f32,
        confidence: f32,
        hits: u8,
    },
    /// Reload configuration now instead of waiting for the next poll.
    Reload,
    /// Print a status line.
    Status,
    /// Shut down cleanly.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Unknown(String),
    BadArgument(&'static str),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::Unknown(word) => write!(f, "unknown command '{word}'"),
            Self::BadArgument(what) => write!(f, "bad argument: {what}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Hits needed to put out a console fire when none are given.
const DEFAULT_HITS: u8 = 1;

impl OperatorCommand {
    /// Parse one console line.
    ///
    /// `fire <angle> <confidence> [hits]` places a fire; the other commands
    /// take no arguments.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ParseError::Empty);
        };

        match head.to_ascii_lowercase().as_str() {
            "stop" | "estop" => Ok(Self::Stop),
            "resume" => Ok(Self::Resume),
            "reload" => Ok(Self::Reload),
            "status" => Ok(Self::Status),
            "quit" | "exit" => Ok(Self::Quit),
            "fire" => {
                let sector_deg = words
                    .next()
                    .and_then(|w| w.parse::<f32>().ok())
                    .filter(|v| v.is_finite())
                    .ok_or(ParseError::BadArgument("angle"))?;
                let confidence = words
                    .next()
                    .and_then(|w| w.parse::<f32>().ok())
                    .filter(|v| (0.0..=1.0).contains(v))
                    .ok_or(ParseError::BadArgument("confidence must be 0.0-1.0"))?;
                let hits = match words.next() {
                    Some(w) => w
                        .parse::<u8>()
                        .ok()
                        .filter(|h| *h > 0)
                        .ok_or(ParseError::BadArgument("hits must be 1-255"))?,
                    None => DEFAULT_HITS,
                };
                Ok(Self::Fire {
                    sector_deg,
                    confidence,
                    hits,
                })
            }
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}
