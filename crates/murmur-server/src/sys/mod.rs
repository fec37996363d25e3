//! Operating-system readiness backends.

pub mod poll;
