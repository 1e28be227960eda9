//! Paced, character-by-character display of an answer that is already complete.
//!
//! Nothing here touches the network: the controller gets the full answer first and
//! then walks `Reveal` frames, pausing between them.

use std::str::CharIndices;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Iterator over growing prefixes of `text`, one Unicode scalar longer each step
pub struct Reveal<'a> {
    text: &'a str,
    chars: CharIndices<'a>,
}

impl<'a> Reveal<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices(),
        }
    }
}

impl<'a> Iterator for Reveal<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, c) = self.chars.next()?;
        Some(&self.text[..start + c.len_utf8()])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chars.size_hint()
    }
}

/// Wait one reveal step. Returns `false` if cancelled before the delay elapsed.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
