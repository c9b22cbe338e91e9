//! Atelier: the client data layer of a designer portfolio gallery.
//!
//! Leaf components ([`cache`], [`pacing`], [`visibility`]) have no knowledge of
//! the portfolio API; [`application`] composes them into the gallery services
//! and [`infra`] provides the HTTP, storage and telemetry adapters.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod pacing;
pub mod visibility;

pub(crate) mod util;
