//! Game Boy memory bus: the shared address space.
//!
//! Routes 16-bit addresses to the physical byte regions and applies the
//! range policies of the DMG memory map. The echo region mirrors work RAM,
//! the `$FEA0-$FEFF` gap reads `0xFF` and swallows writes, and the
//! cartridge region is read-only (no mapper hardware is modelled).
//!
//! # Memory Map
//!
//! ```text
//! $0000-$7FFF  Cartridge ROM (32KB, fixed; writes discarded)
//! $8000-$9FFF  Video RAM (8KB)
//! $A000-$BFFF  External RAM (8KB)
//! $C000-$DFFF  Work RAM (8KB)
//! $E000-$FDFF  Echo RAM (mirror of $C000-$DDFF)
//! $FE00-$FE9F  OAM - Object Attribute Memory (160 bytes)
//! $FEA0-$FEFF  Not usable (reads $FF)
//! $FF00-$FF7F  I/O Registers
//! $FF80-$FFFE  High RAM (127 bytes)
//! $FFFF        Interrupt Enable Register
//! ```
//!
//! The CPU sees the bus through the [`Memory`] trait; the PPU and joypad
//! access their backing regions (`vram`, `io`) directly within the crate,
//! so CPU-visible side effects stay in one place.

use dmg_core::Memory;

// I/O register offsets within the $FF00 block
pub(crate) const REG_JOYP: usize = 0x00;
pub(crate) const REG_IF: usize = 0x0F;
pub(crate) const REG_LCDC: usize = 0x40;
pub(crate) const REG_SCY: usize = 0x42;
pub(crate) const REG_SCX: usize = 0x43;
pub(crate) const REG_LY: usize = 0x44;
pub(crate) const REG_BGP: usize = 0x47;

// Pending-interrupt bits in the IF register
pub(crate) const IRQ_VBLANK: u8 = 0x01;
pub(crate) const IRQ_JOYPAD: u8 = 0x10;

/// Game Boy address space: every physical byte region in one place.
pub struct DmgBus {
    rom: [u8; 0x8000],
    pub(crate) vram: [u8; 0x2000],
    eram: [u8; 0x2000],
    wram: [u8; 0x2000],
    oam: [u8; 0xA0],
    pub(crate) io: [u8; 0x80],
    hram: [u8; 0x7F],
    ie: u8,
}

impl DmgBus {
    pub fn new() -> Self {
        Self {
            rom: [0; 0x8000],
            vram: [0; 0x2000],
            eram: [0; 0x2000],
            wram: [0; 0x2000],
            oam: [0; 0xA0],
            io: [0; 0x80],
            hram: [0; 0x7F],
            ie: 0,
        }
    }

    /// Replace the cartridge region with `image`, truncating anything past
    /// 32 KiB and zero-padding the remainder.
    pub fn load_program(&mut self, image: &[u8]) {
        self.rom = [0; 0x8000];
        let len = image.len().min(self.rom.len());
        self.rom[..len].copy_from_slice(&image[..len]);
        if image.len() > self.rom.len() {
            log::info!(
                "program image truncated from {} to {} bytes",
                image.len(),
                self.rom.len()
            );
        } else {
            log::info!("loaded {len} byte program image");
        }
    }

    /// OR a pending-interrupt bit into the IF register.
    /// Bit 0: VBlank, Bit 4: Joypad.
    pub fn request_interrupt(&mut self, bit: u8) {
        self.io[REG_IF] |= bit;
    }
}

impl Default for DmgBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory for DmgBus {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.rom[addr as usize],
            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize],
            0xA000..=0xBFFF => self.eram[(addr - 0xA000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            // Echo RAM
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize],
            // Not usable
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.io[(addr - 0xFF00) as usize],
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            // ROM is read-only; without a mapper the write has no effect
            0x0000..=0x7FFF => {}
            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize] = val,
            0xA000..=0xBFFF => self.eram[(addr - 0xA000) as usize] = val,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            // Echo RAM
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize] = val,
            // Not usable
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.io[(addr - 0xFF00) as usize] = val,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie = val,
        }
    }
}
