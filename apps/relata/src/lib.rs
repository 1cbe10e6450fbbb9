//! # relata
//!
//! Command line front end for the relata relation engine: entities and
//! their relations persisted in a workspace file or redb database.

pub mod cli;
pub mod config;
