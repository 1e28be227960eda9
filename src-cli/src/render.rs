//! Draws session snapshots as a terminal transcript

use std::io::{self, Write};

use wordmap_core::{SessionState, TurnStatus};

/// Prints the answer of the newest turn as it is revealed.
///
/// Snapshots may be coalesced, so each call prints whatever part of the answer has
/// not been printed yet rather than assuming one character per snapshot.
#[derive(Debug, Default)]
pub struct TranscriptRenderer {
    /// Identifies the turn being drawn: history index plus its timestamp
    turn: Option<(usize, String)>,
    /// Bytes of the answer already written
    printed: usize,
    done: bool,
}

impl TranscriptRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, state: &SessionState, out: &mut impl Write) -> io::Result<()> {
        let Some(turn) = state.last_turn() else {
            *self = Self::default();
            return Ok(());
        };

        let key = (state.chat_history.len() - 1, turn.asked_at.clone());
        if self.turn.as_ref() != Some(&key) {
            self.turn = Some(key);
            self.printed = 0;
            self.done = false;
        }
        if self.done {
            return Ok(());
        }

        let answer = &turn.answer;
        if answer.len() > self.printed && answer.is_char_boundary(self.printed) {
            write!(out, "{}", &answer[self.printed..])?;
            self.printed = answer.len();
        }

        match &turn.status {
            TurnStatus::Complete => {
                writeln!(out)?;
                writeln!(
                    out,
                    "[{} | {} in / {} out]",
                    turn.model_id, turn.input_tokens, turn.output_tokens
                )?;
                self.done = true;
            }
            TurnStatus::Failed { error } => {
                if self.printed > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "error ({}): {}", error.code, error.message)?;
                self.done = true;
            }
            TurnStatus::Pending | TurnStatus::Streaming => {}
        }
        out.flush()
    }
}
