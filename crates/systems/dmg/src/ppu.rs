//! Game Boy PPU: cycle-driven scanline renderer for the background layer.
//!
//! The PPU keeps only a cycle accumulator and its working framebuffer;
//! everything the hardware exposes (LCD registers, the LY scanline counter,
//! tile and map data) lives in the shared bus, so the CPU and PPU observe
//! the same bytes.

use dmg_core::types::Frame;

use crate::bus::{DmgBus, IRQ_VBLANK, REG_BGP, REG_LCDC, REG_LY, REG_SCX, REG_SCY};

pub const SCREEN_WIDTH: u32 = 160;
pub const SCREEN_HEIGHT: u32 = 144;

/// Dots per scanline.
const CYCLES_PER_SCANLINE: u32 = 456;
/// Visible lines plus the vertical blanking interval.
const SCANLINES_PER_FRAME: u8 = 154;
/// First blanking line; reaching it completes the frame.
const VBLANK_LINE: u8 = 144;

// LCDC bits
const LCDC_ENABLE: u8 = 0x80;
const LCDC_BG_TILEMAP: u8 = 0x08;
const LCDC_TILE_DATA_UNSIGNED: u8 = 0x10;

/// Fixed DMG shade palette (RGBA), lightest to darkest.
const PALETTE: [[u8; 4]; 4] = [
    [224, 248, 208, 255],
    [136, 192, 112, 255],
    [52, 104, 86, 255],
    [8, 24, 32, 255],
];

/// Game Boy PPU state
pub struct Ppu {
    /// Cycles accumulated toward the current scanline (0..456)
    cycles: u32,
    /// Working framebuffer; lines persist until re-rendered
    frame: Frame,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            cycles: 0,
            frame: Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT),
        }
    }

    /// Power-on state: default LCD registers, cleared framebuffer.
    pub fn reset(&mut self, bus: &mut DmgBus) {
        bus.io[REG_LCDC] = 0x91;
        bus.io[REG_SCY] = 0;
        bus.io[REG_SCX] = 0;
        bus.io[REG_LY] = 0;
        bus.io[REG_BGP] = 0xE4;
        self.cycles = 0;
        self.frame = Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT);
    }

    /// The working framebuffer.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Advance the PPU by `cpu_cycles`. Every completed 456-cycle scanline
    /// is processed independently and in order: visible lines are rendered
    /// the moment they are reached, line 144 raises the V-Blank interrupt
    /// and reports frame completion. Returns true when this call crossed
    /// into V-Blank.
    pub fn step(&mut self, bus: &mut DmgBus, cpu_cycles: u32) -> bool {
        self.cycles += cpu_cycles;
        let mut frame_done = false;
        while self.cycles >= CYCLES_PER_SCANLINE {
            self.cycles -= CYCLES_PER_SCANLINE;
            let ly = bus.io[REG_LY].wrapping_add(1) % SCANLINES_PER_FRAME;
            bus.io[REG_LY] = ly;
            if ly < VBLANK_LINE {
                self.render_scanline(bus);
            } else if ly == VBLANK_LINE {
                bus.request_interrupt(IRQ_VBLANK);
                frame_done = true;
            }
        }
        frame_done
    }

    /// Render the background for the current LY into the framebuffer.
    ///
    /// With the LCD disabled the line is deliberately left untouched, so
    /// the buffer keeps whatever was rendered before.
    fn render_scanline(&mut self, bus: &DmgBus) {
        let ly = bus.io[REG_LY];
        if ly >= VBLANK_LINE {
            return;
        }
        let lcdc = bus.io[REG_LCDC];
        if lcdc & LCDC_ENABLE == 0 {
            return;
        }

        let scy = bus.io[REG_SCY];
        let scx = bus.io[REG_SCX];
        let map_base: usize = if lcdc & LCDC_BG_TILEMAP != 0 {
            0x1C00 // $9C00
        } else {
            0x1800 // $9800
        };
        let unsigned_tiles = lcdc & LCDC_TILE_DATA_UNSIGNED != 0;

        // The 256x256 background wraps on both axes
        let map_y = ly.wrapping_add(scy);
        let tile_row = (map_y / 8) as usize;
        let line = (map_y % 8) as usize * 2;

        for x in 0..SCREEN_WIDTH as u8 {
            let map_x = x.wrapping_add(scx);
            let tile_col = (map_x / 8) as usize;
            let tile_index = bus.vram[map_base + tile_row * 32 + tile_col];

            let tile_addr = if unsigned_tiles {
                // $8000 addressing: index straight into tile data
                tile_index as usize * 16
            } else {
                // $8800 addressing: signed index around $9000
                (0x1000 + tile_index as i8 as i32 * 16) as usize
            };

            let lo = bus.vram[(tile_addr + line) & 0x1FFF];
            let hi = bus.vram[(tile_addr + line + 1) & 0x1FFF];
            let bit = 7 - (map_x % 8);
            let color = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
            self.frame
                .put_pixel(x as u32, ly as u32, PALETTE[color as usize]);
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (Ppu, DmgBus) {
        let mut bus = DmgBus::new();
        let mut ppu = Ppu::new();
        ppu.reset(&mut bus);
        (ppu, bus)
    }

    #[test]
    fn reset_writes_default_lcd_registers() {
        let (_, bus) = fresh();
        assert_eq!(bus.io[REG_LCDC], 0x91);
        assert_eq!(bus.io[REG_LY], 0);
        assert_eq!(bus.io[REG_BGP], 0xE4);
    }

    #[test]
    fn ly_advances_once_per_456_cycles() {
        let (mut ppu, mut bus) = fresh();
        ppu.step(&mut bus, 455);
        assert_eq!(bus.io[REG_LY], 0);
        ppu.step(&mut bus, 1);
        assert_eq!(bus.io[REG_LY], 1);
    }

    #[test]
    fn large_step_processes_each_boundary() {
        let (mut ppu, mut bus) = fresh();
        ppu.step(&mut bus, 456 * 5 + 10);
        assert_eq!(bus.io[REG_LY], 5);
    }

    #[test]
    fn vblank_line_raises_interrupt_and_completes_frame() {
        let (mut ppu, mut bus) = fresh();
        bus.io[REG_LY] = 143;
        assert!(ppu.step(&mut bus, 456));
        assert_eq!(bus.io[REG_LY], 144);
        assert_eq!(bus.io[crate::bus::REG_IF] & IRQ_VBLANK, IRQ_VBLANK);
    }

    #[test]
    fn blanking_lines_do_not_signal_again() {
        let (mut ppu, mut bus) = fresh();
        bus.io[REG_LY] = 144;
        assert!(!ppu.step(&mut bus, 456 * 9));
        assert_eq!(bus.io[REG_LY], 153);
    }

    #[test]
    fn ly_wraps_to_zero_after_line_153() {
        let (mut ppu, mut bus) = fresh();
        bus.io[REG_LY] = 153;
        assert!(!ppu.step(&mut bus, 456));
        assert_eq!(bus.io[REG_LY], 0);
    }

    #[test]
    fn renders_tile_pixels_through_fixed_palette() {
        let (mut ppu, mut bus) = fresh();
        // Tile 0, row 0: both bitplanes set -> color index 3 across the row
        bus.vram[0] = 0xFF;
        bus.vram[1] = 0xFF;
        // Tilemap at $9800 is already all zeroes (tile 0 everywhere)
        bus.io[REG_LY] = 153;
        ppu.step(&mut bus, 456); // wraps to line 0 and renders it
        let frame = ppu.frame();
        assert_eq!(&frame.pixels[0..4], &PALETTE[3]);
        // Row 1 of the tile is empty -> color 0 on the next scanline
        ppu.step(&mut bus, 456);
        let idx = (SCREEN_WIDTH as usize) * 4;
        assert_eq!(&ppu.frame().pixels[idx..idx + 4], &PALETTE[0]);
    }

    #[test]
    fn scroll_x_shifts_sampled_tiles() {
        let (mut ppu, mut bus) = fresh();
        // Tile 1 is solid color 3; the map points column 1 at tile 1
        bus.vram[16] = 0xFF;
        bus.vram[17] = 0xFF;
        bus.vram[0x1800 + 1] = 1;
        bus.io[REG_SCX] = 8; // shift one tile to the left
        bus.io[REG_LY] = 153;
        ppu.step(&mut bus, 456);
        assert_eq!(&ppu.frame().pixels[0..4], &PALETTE[3]);
    }

    #[test]
    fn signed_addressing_resolves_around_0x9000() {
        let (mut ppu, mut bus) = fresh();
        bus.io[REG_LCDC] = 0x81; // LCD on, signed tile addressing
        // Tile index 0 in signed mode lives at VRAM offset 0x1000
        bus.vram[0x1000] = 0xFF;
        bus.vram[0x1001] = 0xFF;
        bus.io[REG_LY] = 153;
        ppu.step(&mut bus, 456);
        assert_eq!(&ppu.frame().pixels[0..4], &PALETTE[3]);
    }

    #[test]
    fn disabled_lcd_leaves_framebuffer_untouched() {
        let (mut ppu, mut bus) = fresh();
        bus.vram[0] = 0xFF;
        bus.vram[1] = 0xFF;
        bus.io[REG_LY] = 153;
        ppu.step(&mut bus, 456);
        assert_eq!(&ppu.frame().pixels[0..4], &PALETTE[3]);

        // Turn the LCD off, change the tile, re-render the same line:
        // the old pixels must survive
        bus.io[REG_LCDC] = 0x11;
        bus.vram[0] = 0x00;
        bus.vram[1] = 0x00;
        bus.io[REG_LY] = 153;
        ppu.step(&mut bus, 456);
        assert_eq!(&ppu.frame().pixels[0..4], &PALETTE[3]);
    }

    #[test]
    fn frame_buffer_is_rgba_160_by_144() {
        let (ppu, _) = fresh();
        assert_eq!(ppu.frame().pixels.len(), 160 * 144 * 4);
    }
}
