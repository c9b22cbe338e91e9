//! Gallery client services: fetching, engagement reporting and likes.

pub mod api;
pub mod engagement;
pub mod error;
pub mod fetch;
pub mod gallery;
pub mod likes;
pub mod ports;
pub mod refresh;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;
