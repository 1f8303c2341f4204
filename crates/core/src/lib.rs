//! Core emulator primitives and traits.

pub mod cpu_lr35902;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// An RGBA8 framebuffer, row-major, top-to-bottom.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        /// 4 bytes per pixel: R, G, B, A.
        pub pixels: Vec<u8>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height * 4) as usize],
            }
        }

        /// Overwrite one pixel. Out-of-range coordinates are ignored.
        pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
            if x < self.width && y < self.height {
                let idx = ((y * self.width + x) * 4) as usize;
                self.pixels[idx..idx + 4].copy_from_slice(&rgba);
            }
        }
    }
}

use serde_json::Value;

/// Byte-addressable memory seam between a CPU core and its machine bus.
///
/// Both operations are total over the 16-bit address range: unmapped reads
/// and discarded writes are bus policy, not errors.
pub trait Memory {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);
}

/// A complete emulated machine driven one frame at a time.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return the CPU and peripherals to their power-on state. The loaded
    /// program image and RAM contents are left alone.
    fn reset(&mut self);

    /// Replace the loaded program image and fully reset the machine.
    fn load_program(&mut self, image: &[u8]) -> Result<(), Self::Error>;

    /// Emulate one frame's worth of cycles and return the framebuffer.
    fn step_frame(&mut self) -> Result<types::Frame, Self::Error>;

    /// Return a JSON-serializable snapshot of emulator state.
    /// Note: snapshots should NOT include ROM or RAM contents.
    fn save_state(&self) -> Value;

    /// Restore a snapshot produced by `save_state`.
    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_initialization() {
        let f = types::Frame::new(160, 144);
        assert_eq!(f.width, 160);
        assert_eq!(f.height, 144);
        assert_eq!(f.pixels.len(), 160 * 144 * 4);
        assert!(f.pixels.iter().all(|&b| b == 0));
    }

    #[test]
    fn frame_put_pixel() {
        let mut f = types::Frame::new(4, 4);
        f.put_pixel(1, 2, [10, 20, 30, 255]);
        let idx = (2 * 4 + 1) * 4;
        assert_eq!(&f.pixels[idx..idx + 4], &[10, 20, 30, 255]);
    }

    #[test]
    fn frame_put_pixel_out_of_range() {
        let mut f = types::Frame::new(4, 4);
        f.put_pixel(4, 0, [1, 2, 3, 4]);
        f.put_pixel(0, 4, [1, 2, 3, 4]);
        assert!(f.pixels.iter().all(|&b| b == 0));
    }
}
