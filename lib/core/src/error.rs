//! Error handling foundation for crewboard.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own error enums and wraps them in a `Report`
//! where callers benefit from layered context.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
