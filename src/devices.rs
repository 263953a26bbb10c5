//! The three collaborator interfaces the interpreter drives, plus
//! memory-backed implementations suitable for any host that polls state
//! once per frame.

use crate::{DISPLAY_X, DISPLAY_Y, Display, u4};

#[cfg(test)]
use mockall::automock;

/// A monochrome pixel surface written to by the draw and clear instructions.
#[cfg_attr(test, automock)]
pub trait Framebuffer {
    /// Turns every pixel off.
    fn clear(&mut self);

    /// XORs the pixel at (x, y) and returns true if it was toggled off.
    ///
    /// Coordinates are already wrapped into range by the caller.
    fn toggle_pixel(&mut self, x: usize, y: usize) -> bool;

    /// Called once at the end of each non-suspended frame, after the
    /// instruction batch has run.
    fn present(&mut self);
}

/// The pressed/released state of the 16-key hex keypad.
#[cfg_attr(test, automock)]
pub trait Keypad {
    fn is_pressed(&self, key: u4) -> bool;

    fn set_pressed(&mut self, key: u4, pressed: bool);
}

/// A square-wave beeper driven by the sound timer.
///
/// Both calls are idempotent; the interpreter issues one of them every
/// non-suspended frame.
#[cfg_attr(test, automock)]
pub trait ToneGenerator {
    fn start(&mut self, frequency_hz: f32);

    fn stop(&mut self);
}

/// A [`Framebuffer`] backed by a plain 64x32 pixel grid.
///
/// Hosts read the grid back through [`PixelGrid::pixels`] after each frame
/// and rasterize it however they like.
pub struct PixelGrid {
    pixels: Display<bool>,
}

impl PixelGrid {
    pub fn new() -> Self {
        Self {
            pixels: [[false; DISPLAY_X]; DISPLAY_Y],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[y][x]
    }

    pub fn pixels(&self) -> &Display<bool> {
        &self.pixels
    }
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl Framebuffer for PixelGrid {
    fn clear(&mut self) {
        self.pixels = [[false; DISPLAY_X]; DISPLAY_Y];
    }

    fn toggle_pixel(&mut self, x: usize, y: usize) -> bool {
        let pixel = &mut self.pixels[y][x];
        *pixel ^= true;
        !*pixel
    }

    fn present(&mut self) {
        // The grid itself is the presented surface; hosts poll it.
    }
}

/// A [`Keypad`] backed by a plain pressed-state table.
pub struct KeyState {
    pressed: [bool; 16],
}

impl KeyState {
    pub fn new() -> Self {
        Self {
            pressed: [false; 16],
        }
    }

    pub fn pressed(&self) -> &[bool; 16] {
        &self.pressed
    }
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new()
    }
}

impl Keypad for KeyState {
    fn is_pressed(&self, key: u4) -> bool {
        self.pressed[key]
    }

    fn set_pressed(&mut self, key: u4, pressed: bool) {
        self.pressed[key] = pressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_pixel_reports_erasure() {
        let mut grid = PixelGrid::new();

        // First toggle turns the pixel on, second turns it back off
        assert!(!grid.toggle_pixel(3, 7));
        assert!(grid.pixel(3, 7));
        assert!(grid.toggle_pixel(3, 7));
        assert!(!grid.pixel(3, 7));
    }

    #[test]
    fn clear_turns_everything_off() {
        let mut grid = PixelGrid::new();
        grid.toggle_pixel(0, 0);
        grid.toggle_pixel(63, 31);

        grid.clear();

        assert!(grid.pixels().iter().flatten().all(|p| !p));
    }

    #[test]
    fn key_state_tracks_presses() {
        let mut keys = KeyState::new();
        let key = u4::new(0xB);

        assert!(!keys.is_pressed(key));
        keys.set_pressed(key, true);
        assert!(keys.is_pressed(key));
        keys.set_pressed(key, false);
        assert!(!keys.is_pressed(key));
    }
}
