//! Fast3D display list interpreter.
//!
//! The interpreter walks N64 display lists, emulates the RSP and RDP register files and forwards
//! a deduplicated stream of state changes and vertex batches to a [`modules::render`] backend.

pub mod modules;
pub mod system;

#[cfg(test)]
mod test;

pub use system::{Config, Modules, Stats, System};

#[rustfmt::skip]
pub use color;
#[rustfmt::skip]
pub use glam;
#[rustfmt::skip]
pub use picatex;
