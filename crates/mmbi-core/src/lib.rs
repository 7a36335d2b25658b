//! Core types and trait definitions for the money-market BI entity service.
//!
//! No HTTP or database dependencies live here. The crate holds the entity
//! model and its schema, the filter grammar, and the two storage seams: the
//! authoritative [`store::EntityStore`] and the derived
//! [`search::SearchIndex`].

// Store and index traits declare `Send` futures explicitly.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod filter;
pub mod listing;
pub mod model;
pub mod search;
pub mod store;

pub use error::{DomainFailure, Error, Result};
