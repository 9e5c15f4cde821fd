#![allow(clippy::type_complexity)]

//! Portals rendered with off-axis projector cameras.
//!
//! [`portal`] holds the engine independent core: portal instances, the archetype connection
//! graph, connection lifecycle and projector math. [`plugins::portal`] hooks it into Bevy, the
//! remaining plugins make up the demo application.

pub mod config;
pub mod plugins;
pub mod portal;
pub mod util;
