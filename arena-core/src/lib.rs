//! Arena Core - Identity, data model and collaborator interfaces
//!
//! This crate provides the types every tournament component agrees on:
//! - Genome identity (species/organism indices packed into one key)
//! - Population entries, wire players and score records
//! - Error kinds shared by the worker pool and schedulers
//! - Collaborator traits (games, environments, genome factories)
//! - A typed plugin registry for resolving collaborators by key

pub mod error;
pub mod genome;
pub mod identity;
pub mod plugin;

// Re-exports for convenient access
pub use error::{ArenaError, Result};
pub use genome::{FitnessEntry, GenomeEntry, GenomeFactoryOptions, Player, PlayerScore};
pub use identity::{GenomeId, INDEX_BITS, MAX_INDEX};
pub use plugin::{
    Environment, Executor, GameData, GameExecutor, GenomeFactory, LocalBoxFuture, PluginRegistry,
};
