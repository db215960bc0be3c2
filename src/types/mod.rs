//! Types that are used across multiple components of the consensus engine.
//!
//! Types specific to a single component, e.g., [`CwRatings`](crate::cw_rating::CwRatings), are defined
//! in that component's module.

pub mod bundle;

pub mod crypto_primitives;

pub mod data_types;

pub mod milestone;

pub mod transaction;
