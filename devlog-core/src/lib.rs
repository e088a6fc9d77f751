#![doc = "devlog-core: core logic library for devlog."]

//! This crate holds the pipeline that turns commits into published posts,
//! along with the rate limiting, generation, diff summarizing and persisted
//! state it relies on. Network adapters for concrete services live in the
//! `devlog` binary crate and plug in through the traits in [`contract`].
//!
//! # Usage
//! Build a [`generation::GenerationClient`] around a
//! [`contract::GenerationService`], hand it with a [`contract::Publisher`] to
//! [`pipeline::Pipeline::new`], then call [`pipeline::Pipeline::run`] with the
//! fetched events and notes.

pub mod cache;
pub mod config;
pub mod contract;
pub mod error;
pub mod generation;
pub mod ledger;
pub mod pipeline;
pub mod prompts;
pub mod rate_limit;
pub mod summarize;
