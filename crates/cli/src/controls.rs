//! Text commands typed on stdin while a session is playing.

use anyhow::{anyhow, Result};
use cuesync_core::{Control, Nudge};
use std::path::PathBuf;
use std::str::FromStr;

/// One line of player input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Control(Control),
    /// Read and load another caption file.
    Load(PathBuf),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  p          play / pause
  r          reset elapsed time
  << < > >>  offset -0.5 / -0.1 / +0.1 / +0.5 s
  +N / -N    change offset by N seconds
  l <file>   load another caption file
  c          clear captions
  s          status
  q          quit";

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let command = match word {
            "p" | "play" | "pause" => Command::Control(Control::Toggle),
            "r" | "reset" => Command::Control(Control::Reset),
            "<<" => Command::Control(Control::Nudge(Nudge::DecreaseLarge)),
            "<" => Command::Control(Control::Nudge(Nudge::DecreaseSmall)),
            ">" => Command::Control(Control::Nudge(Nudge::IncreaseSmall)),
            ">>" => Command::Control(Control::Nudge(Nudge::IncreaseLarge)),
            "c" | "clear" => Command::Control(Control::Clear),
            "s" | "status" => Command::Status,
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" => Command::Quit,
            "l" | "load" if !rest.is_empty() => Command::Load(PathBuf::from(rest)),
            w if w.starts_with('+') || w.starts_with('-') => {
                let delta: f64 = w
                    .parse()
                    .map_err(|_| anyhow!("bad offset {w:?}"))?;
                if !delta.is_finite() {
                    return Err(anyhow!("bad offset {w:?}"));
                }
                Command::Control(Control::Offset(delta))
            }
            _ => return Err(anyhow!("unknown command {line:?}, type h for help")),
        };
        Ok(command)
    }
}
