//! # Ragline
//!
//! **Workspace-scoped hybrid retrieval and streamed, budgeted generation
//! for document chat.**
//!
//! Documents are split into overlapping chunks, embedded by an
//! OpenAI-compatible provider, paired with a sparse term vector and stored
//! in one Qdrant collection per workspace. A chat turn retrieves from the
//! dense and sparse channels, fuses the two rankings with RRF, assembles a
//! token-budgeted prompt and streams the model's answer back, persisting
//! the finished turn and its audit entry atomically.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ Documents │──▶│ Chunk+Embed  │──▶│  Qdrant   │
//! │ (SQLite)  │   │ +Sparse vec  │   │ dense+sp. │
//! └───────────┘   └──────────────┘   └────┬─────┘
//!                                         │ RRF
//!                 ┌──────────────┐   ┌────▼─────┐
//!   chat turn ───▶│   Pipeline   │◀──│  Search   │
//!                 │ budget+stream│   └──────────┘
//!                 └──────┬───────┘
//!                        ▼
//!                 SQLite messages + chat_logs
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Workspaces, chats, history, documents, audit log |
//! | [`embedding`] | OpenAI-compatible embedder and dimension discovery |
//! | [`qdrant`] | Qdrant REST vector store |
//! | [`llm`] | Streaming chat-completion client |
//! | [`web_search`] | Optional web-search agent |
//! | [`ingest`] | Document embedding service |
//! | [`pipeline`] | Generation pipeline |
//!
//! Pure engine logic (chunking, sparse vectors, fusion, budgeting,
//! prompt rendering, retrieval) lives in `ragline-core`.

pub mod app;
pub mod chat_cmd;
pub mod config;
pub mod db;
pub mod doc_cmd;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod qdrant;
pub mod search_cmd;
pub mod sqlite_store;
pub mod web_search;
pub mod workspace_cmd;
