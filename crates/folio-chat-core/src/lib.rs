//! # Folio Chat Core
//!
//! Pure logic for Folio Chat: the indexed document model, vector utilities,
//! the flat inner-product index, repository ingestion filters, and the
//! routing state machine the chat agents run on.
//!
//! This crate performs no network or filesystem I/O. Providers, persistence,
//! and the agents themselves live in the `folio-chat` app crate.

pub mod embedding;
pub mod filter;
pub mod index;
pub mod models;
pub mod routing;
