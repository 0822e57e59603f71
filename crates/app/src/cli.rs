use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use renderer::EvictionKind;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Eviction {
    /// Invalidate the whole pool once it is full
    RoundRobin,
    /// Replace the least recently used texture
    Lru,
}

impl From<Eviction> for EvictionKind {
    fn from(value: Eviction) -> Self {
        match value {
            Eviction::RoundRobin => Self::RoundRobin,
            Eviction::Lru => Self::Lru,
        }
    }
}

fn parse_addr(value: &str) -> Result<u32, std::num::ParseIntError> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

/// pica64: replays N64 display lists through a PICA200 renderer
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Path to the RAM image holding the display lists and their data
    #[arg(short('i'), long)]
    pub ram: PathBuf,
    /// Address of the display list to run every frame
    ///
    /// Accepts decimal or `0x` prefixed hexadecimal addresses.
    #[arg(short, long, value_parser = parse_addr)]
    pub entry: u32,
    /// Number of frames to run
    #[arg(short, long, default_value_t = 1)]
    pub frames: u32,
    /// Position of the 3D slider, from 0 (2D) to 1
    #[arg(long, default_value_t = 0.0)]
    pub slider: f32,
    /// Path to a RON file with the system and renderer configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Texture eviction strategy, overriding the configuration file
    #[arg(long)]
    pub eviction: Option<Eviction>,
    /// Whether to stop on malformed display lists
    #[arg(long, default_value_t = false)]
    pub strict: bool,
    /// Whether to print every GPU command
    #[arg(long, default_value_t = false)]
    pub dump: bool,
}
