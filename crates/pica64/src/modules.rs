//! Interfaces to the collaborators of the interpreter.

pub mod platform;
pub mod render;
