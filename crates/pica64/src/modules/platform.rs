//! Platform module interface.

/// Size of the render target, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for Dimensions {
    /// The 3DS top screen.
    fn default() -> Self {
        Self {
            width: 400,
            height: 240,
        }
    }
}

impl Dimensions {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

pub trait PlatformModule {
    /// Delivers pending input and UI events.
    fn poll_events(&mut self);
    /// Prepares a new frame. Returns `false` if the frame should be dropped.
    fn start_frame(&mut self) -> bool;
    fn swap_begin(&mut self);
    fn swap_end(&mut self);
    fn dimensions(&self) -> Dimensions;
}

/// An implementation of [`PlatformModule`] that never drops frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPlatformModule {
    pub dimensions: Dimensions,
}

impl PlatformModule for NopPlatformModule {
    fn poll_events(&mut self) {}

    fn start_frame(&mut self) -> bool {
        true
    }

    fn swap_begin(&mut self) {}

    fn swap_end(&mut self) {}

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}
