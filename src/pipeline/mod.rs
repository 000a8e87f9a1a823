//! Pipeline stages for chunked document translation.
//!
//! Each submodule implements exactly one transformation step. Only
//! [`client`] performs network I/O; every other stage is a pure function,
//! which is what makes a chunk plan reproducible across resumes.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ segment ──▶ plan ──▶ client ──▶ parse ──▶ export
//! (docx/txt)  (§1..§N)   (chunks)  (LLM)     (JSON)    (zip)
//!                          ▲
//!                        tokens
//! ```
//!
//! 1. [`extract`] — DOCX or UTF-8 bytes to plain text; remote links rejected
//! 2. [`segment`] — split on blank lines into 1-based numbered paragraphs
//! 3. [`tokens`]  — rough prompt-size estimate (3 characters per token)
//! 4. [`plan`]    — fixed-size chunks with read-only context on each side
//! 5. [`client`]  — summary and translation calls with error classification
//! 6. [`parse`]   — recover `{number, text}` pairs from imperfect replies
//! 7. [`export`]  — `§N` renderings packed into single-file ZIP archives

pub mod client;
pub mod export;
pub mod extract;
pub mod parse;
pub mod plan;
pub mod segment;
pub mod tokens;
