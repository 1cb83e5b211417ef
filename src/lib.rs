//! Island generation library
//!
//! Noise fields, cellular automata masks, image filters and the island
//! composer that turns two noise fields into a biome bitmap. Re-exports
//! modules for use by binaries and tools.

pub mod automata;
pub mod color;
pub mod config;
pub mod export;
pub mod filters;
pub mod grid;
pub mod island;
pub mod logging;
pub mod noise_field;
pub mod palette;
pub mod seeds;
