//! Catalog, filtering, favorites and playback control for the iptv-org
//! channel directory.

pub mod catalog;
pub mod config;
pub mod error;
pub mod favorites;
pub mod filter;
pub mod loader;
pub mod model;
pub mod platform;
pub mod playback;
