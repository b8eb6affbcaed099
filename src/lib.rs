// src/lib.rs

//! Tierwatch Library
//!
//! Scrapes tier data embedded in a page script, caches it per role, and
//! watches a news listing so each article is delivered downstream once.

pub mod cache;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use cache::TtlCache;
pub use error::{AppError, Result};
