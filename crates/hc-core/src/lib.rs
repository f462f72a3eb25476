//! # hc-core
//!
//! Core types shared by the histcard crates: the error taxonomy and the
//! histogram template type that observations, processes and shape
//! systematics bind.

pub mod error;
pub mod histogram;

pub use error::{Error, Result};
pub use histogram::Histogram;
