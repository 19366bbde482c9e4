// Copyright 2025 Cowboy AI, LLC.

//! Map service
//!
//! Tracks which characters are in which field and turns character status
//! events into enter and exit transitions. See [`processor`] for the
//! ordering guarantees of a transition.

pub mod consumer;
pub mod occupancy;
pub mod processor;
pub mod script;
pub mod visit;

pub use consumer::CharacterStatusHandler;
pub use occupancy::OccupancyRegistry;
pub use processor::{
    MapActionBody, MapProcessor, MapStatusBody, MAP_STATUS_CHARACTER_ENTER,
    MAP_STATUS_CHARACTER_EXIT,
};
pub use script::{CommandSpawner, MapScripts, Spawner, StaticMapScripts};
pub use visit::{InMemoryVisitStore, PgVisitStore, Visit, VisitStore};
