//! # peersync testkit
//!
//! Test utilities for peersync.
//!
//! This crate provides:
//! - Temp-dir backed members and contact payload helpers
//! - A scripted backend that delays, hangs, fails or panics chosen calls
//! - Storage whose writes can be switched to fail
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use peersync_testkit::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn hung_member() {
//!     let member = TestMember::new("phone");
//!     member.backend.always(Call::Connect, Step::Hang);
//!     // ... register member.open() with a coordinator and run
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use scripted::*;
