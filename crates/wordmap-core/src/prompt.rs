//! Request assembly: context block, prior turns, new question.

use crate::pdf::ExtractedText;
use crate::provider::{ChatMessage, ChatRequest, Sampling};
use crate::session::ChatTurn;

/// Label the model is told to treat as background material
pub const CONTEXT_LABEL: &str = "PROMPT_CONTEXT";

const INSTRUCTION: &str =
    "Consider all preceding content as PROMPT_CONTEXT. Answer the user's questions on the basis of PROMPT_CONTEXT.";

/// Concatenate every extracted text, in the order given, under one context label
pub fn context_block(extracted: &[ExtractedText]) -> String {
    let mut block = format!("{}:\n", CONTEXT_LABEL);
    for doc in extracted {
        block.push_str(&format!("[document: {}]\n", doc.filename));
        block.push_str(&doc.text);
        if !doc.text.ends_with('\n') {
            block.push('\n');
        }
    }
    block
}

/// Build the chat-completion request for one turn.
///
/// `prior_turns` must not include the turn being asked; failed turns in it are
/// skipped since they carry no answer.
pub fn build_request(
    extracted: &[ExtractedText],
    prior_turns: &[ChatTurn],
    question: &str,
    model: &str,
    sampling: Sampling,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(prior_turns.len() * 2 + 2);

    messages.push(ChatMessage::system(format!(
        "{}\n{}",
        context_block(extracted),
        INSTRUCTION
    )));

    for turn in prior_turns.iter().filter(|t| t.is_complete()) {
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }

    messages.push(ChatMessage::user(question));

    tracing::debug!(
        documents = extracted.len(),
        history_messages = messages.len() - 2,
        "Assembled chat request"
    );

    ChatRequest {
        model: model.to_string(),
        messages,
        temperature: sampling.temperature,
        top_p: sampling.top_p,
    }
}
