//! # rustwos
//!
//! Finds the corresponding authors of papers listed in a CSV file by searching
//! Web of Science, then marks them with a trailing `*` in the full author list.
//!
//! ## Modules
//!
//! - [`names`] - Author name normalization and matching
//! - [`annotate`] - Corresponding-author marking of author lists
//! - [`title`] - Title cleanup for search queries
//! - [`records`] - CSV paper table
//! - [`extractor`] - Web of Science session and page parsing
//! - [`batch`] - Two-pass scrape driver with checkpoints
//! - [`cookies`] - Cookie persistence
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust
//! use rustwos::annotate::mark_author_field;
//!
//! let marked = mark_author_field("Li, Wei; Zheng, Yu-Feng", Some("Zheng, Yu Feng"));
//! assert_eq!(marked, "Li, Wei; Zheng, Yu-Feng*");
//! ```

pub mod annotate;
pub mod batch;
pub mod cookies;
pub mod error;
pub mod extractor;
pub mod names;
pub mod records;
pub mod title;

pub use error::{Result, WosError};
