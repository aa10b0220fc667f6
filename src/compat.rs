//! std/no-std compatibility layer
//!
//! Internal module for handling differences between std and no-std environments.

// Consumed unevenly across feature combinations and test builds.
#![allow(unused_imports)]

// Basic types and formatting
#[cfg(not(feature = "std"))]
pub use alloc::{
    format,
    string::{String, ToString},
    vec,
    vec::Vec,
};

#[cfg(feature = "std")]
pub use std::{
    format,
    string::{String, ToString},
    vec,
    vec::Vec,
};

// Core traits and functions
pub use core::fmt;
