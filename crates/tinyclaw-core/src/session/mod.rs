//! Session persistence — one JSON document per conversation.
//!
//! # Disk format
//!
//! Each session is a pretty-printed JSON file under `<workspace>/sessions/`,
//! named after the escaped session key:
//! `{"key": "...", "history": [...], "summary": "...",
//!   "createdAtMs": ..., "updatedAtMs": ...}`

pub mod store;

pub use store::{SessionStore, SessionSummaryInfo};
