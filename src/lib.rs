//! `gixflow`: a NetFlow v9 / IPFIX collector that enriches flow records with
//! Autonomous System Numbers via a longest-prefix-match cache backed by
//! Team Cymru DNS lookups, optionally re-emitting enriched v9 datagrams to
//! a downstream collector, and persisting the prefix cache across restarts.
//!
//! The library crate exposes the five core components (cache, resolver,
//! decoder, pipeline, persistence) plus the shared [`context::AppContext`]
//! that wires them together; the `gixflow` binary (`src/bin/gixflow.rs`) is
//! a thin CLI shell around this crate.

pub mod cache;
pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod persistence;
pub mod pipeline;
pub mod resolver;
mod time;
