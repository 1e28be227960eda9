//! Word Map Core - chat sessions grounded in uploaded PDFs
//!
//! This crate contains everything below the user interface:
//! - Per-session document storage
//! - PDF text extraction (lopdf)
//! - Prompt assembly and the OpenAI-compatible provider (reqwest)
//! - The conversation controller that runs each turn
//! - Session registry and upload cleanup

pub mod config;
pub mod documents;
pub mod error;
pub mod manager;
pub mod models;
pub mod pdf;
pub mod prompt;
pub mod provider;
pub mod reveal;
pub mod session;
pub mod templates;

pub use config::{Config, Settings};
pub use documents::{Document, DocumentStore, UploadFile};
pub use error::{ChatError, ChatResult, ErrorInfo};
pub use manager::SessionManager;
pub use provider::{ChatProvider, OpenAiCompatibleProvider};
pub use session::{ChatTurn, Session, SessionEvent, SessionOptions, SessionState, TurnPhase, TurnStatus};
