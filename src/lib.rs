//! Face-embedding catalogue and recognition engine.
//!
//! faceprint keeps one unit-length embedding per enrolled face, answers "who is this
//! face?" with an exact inner-product search, and enriches matches with person
//! metadata from an identity directory through a read-through cache. It is served
//! over [MCP](https://modelcontextprotocol.io/) and a command-line interface.
//!
//! # Architecture
//!
//! - **Storage**: the catalogue is a JSON document replaced atomically on every
//!   write; person metadata lives in SQLite
//! - **Search**: an exact dense matrix of unit vectors; an equivalent linear scan is
//!   kept for verification
//! - **Concurrency**: readers work on immutable snapshots; writers are serialized and
//!   publish a new snapshot only after the write is durable
//! - **Transport**: MCP over stdio (primary) or streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`catalogue`]: the ordered identity catalogue and its persistence
//! - [`index`]: the similarity index and the reference linear scan
//! - [`recognition`]: the per-face match decision
//! - [`enrollment`]: aggregation of per-frame embeddings
//! - [`cache`]: the metadata cache in front of the identity directory
//! - [`db`]: SQLite identity directory, schema, and migrations
//! - [`engine`]: snapshot publication tying the above together
//! - [`service`]: async facade with detector and metadata timeouts

pub mod cache;
pub mod catalogue;
pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod index;
pub mod recognition;
pub mod server;
pub mod service;
pub mod tools;
