//! sysdefs (System Definitions) is a small crate meant exclusively to contain
//! definitions for simple, basic, or axiomatic block-device concepts: UUIDs as
//! the OS reports them and the content formats a device may carry.
//!
//! As the name implies, the crate mainly provides definitions, and should
//! contain minimal or no behavior at all.
//!

pub mod formats;
pub mod osuuid;
