//! Game Boy (DMG) machine: bus, CPU, PPU, and joypad in lockstep.
//!
//! [`DmgSystem`] owns one of each component and arbitrates access to the
//! shared bus from a single-threaded frame loop; the components never hold
//! references to each other. A frame is 70,224 CPU cycles and the caller
//! drives the machine one frame at a time.

use dmg_core::cpu_lr35902::CpuLr35902;
use dmg_core::types::Frame;
use dmg_core::System;

mod bus;
mod joypad;
mod ppu;

pub use bus::DmgBus;
pub use joypad::{Button, Joypad};
pub use ppu::{Ppu, SCREEN_HEIGHT, SCREEN_WIDTH};

// Game Boy runs at ~4.194304 MHz with a frame rate of ~59.73 Hz:
// 4194304 / 59.73 ~= 70224 cycles per frame
const CYCLES_PER_FRAME: u32 = 70_224;

#[derive(thiserror::Error, Debug)]
pub enum DmgError {
    #[error("no program loaded")]
    NoProgram,
}

/// A complete DMG machine behind one caller-owned handle.
pub struct DmgSystem {
    bus: DmgBus,
    cpu: CpuLr35902,
    ppu: Ppu,
    joypad: Joypad,
    program_loaded: bool,
}

impl DmgSystem {
    pub fn new() -> Self {
        let mut bus = DmgBus::new();
        let mut ppu = Ppu::new();
        ppu.reset(&mut bus);

        Self {
            bus,
            cpu: CpuLr35902::new(),
            ppu,
            joypad: Joypad::new(),
            program_loaded: false,
        }
    }

    /// Update one button's pressed state.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.joypad.set_button(&mut self.bus, button, pressed);
    }

    /// Shared address space, for embedders that peek at machine state.
    pub fn bus(&self) -> &DmgBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut DmgBus {
        &mut self.bus
    }

    /// CPU register file.
    pub fn cpu(&self) -> &CpuLr35902 {
        &self.cpu
    }
}

impl Default for DmgSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for DmgSystem {
    type Error = DmgError;

    fn reset(&mut self) {
        self.cpu.reset();
        self.ppu.reset(&mut self.bus);
        self.joypad = Joypad::new();
    }

    /// Loading a program always resets the whole machine; a stale CPU or
    /// PPU state must never survive into the new program.
    fn load_program(&mut self, image: &[u8]) -> Result<(), DmgError> {
        self.bus.load_program(image);
        self.program_loaded = true;
        self.reset();
        Ok(())
    }

    fn step_frame(&mut self) -> Result<Frame, DmgError> {
        if !self.program_loaded {
            return Err(DmgError::NoProgram);
        }

        let mut cycles = 0;
        while cycles < CYCLES_PER_FRAME {
            let cpu_cycles = self.cpu.step(&mut self.bus);
            cycles += cpu_cycles;

            self.joypad.update(&mut self.bus);
            if self.ppu.step(&mut self.bus, cpu_cycles) {
                // V-Blank boundary; the PPU already raised the IF bit
            }
        }

        Ok(self.ppu.frame().clone())
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({
            "system": "dmg",
            "version": 1,
            "cpu": {
                "a": self.cpu.a,
                "f": self.cpu.f,
                "b": self.cpu.b,
                "c": self.cpu.c,
                "d": self.cpu.d,
                "e": self.cpu.e,
                "h": self.cpu.h,
                "l": self.cpu.l,
                "sp": self.cpu.sp,
                "pc": self.cpu.pc,
                "ime": self.cpu.ime,
                "halted": self.cpu.halted,
                "stopped": self.cpu.stopped,
            }
        })
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
        if let Some(state) = v.get("cpu") {
            let get_u64 = |field: &str| state.get(field).and_then(serde_json::Value::as_u64);
            let get_bool = |field: &str| state.get(field).and_then(serde_json::Value::as_bool);

            if let Some(val) = get_u64("a") {
                self.cpu.a = val as u8;
            }
            if let Some(val) = get_u64("f") {
                self.cpu.f = val as u8;
            }
            if let Some(val) = get_u64("b") {
                self.cpu.b = val as u8;
            }
            if let Some(val) = get_u64("c") {
                self.cpu.c = val as u8;
            }
            if let Some(val) = get_u64("d") {
                self.cpu.d = val as u8;
            }
            if let Some(val) = get_u64("e") {
                self.cpu.e = val as u8;
            }
            if let Some(val) = get_u64("h") {
                self.cpu.h = val as u8;
            }
            if let Some(val) = get_u64("l") {
                self.cpu.l = val as u8;
            }
            if let Some(val) = get_u64("sp") {
                self.cpu.sp = val as u16;
            }
            if let Some(val) = get_u64("pc") {
                self.cpu.pc = val as u16;
            }
            if let Some(val) = get_bool("ime") {
                self.cpu.ime = val;
            }
            if let Some(val) = get_bool("halted") {
                self.cpu.halted = val;
            }
            if let Some(val) = get_bool("stopped") {
                self.cpu.stopped = val;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{IRQ_VBLANK, REG_IF, REG_JOYP};
    use dmg_core::Memory;

    /// Pad an instruction sequence out to the 0x0100 entry point.
    fn image_with_entry(code: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 0x0100];
        image.extend_from_slice(code);
        image
    }

    #[test]
    fn step_frame_without_program_fails() {
        let mut sys = DmgSystem::new();
        assert!(matches!(sys.step_frame(), Err(DmgError::NoProgram)));
    }

    #[test]
    fn load_program_restores_power_on_registers() {
        let mut sys = DmgSystem::new();
        sys.load_program(&image_with_entry(&[0x3E, 0x55, 0x76])).unwrap();
        sys.step_frame().unwrap();
        assert_eq!(sys.cpu.a, 0x55);

        // A second load must discard all prior machine state
        sys.load_program(&[0x00]).unwrap();
        assert_eq!(sys.cpu.a, 0x01);
        assert_eq!(sys.cpu.f, 0xB0);
        assert_eq!(sys.cpu.bc(), 0x0013);
        assert_eq!(sys.cpu.de(), 0x00D8);
        assert_eq!(sys.cpu.hl(), 0x014D);
        assert_eq!(sys.cpu.sp, 0xFFFE);
        assert_eq!(sys.cpu.pc, 0x0100);
        assert!(!sys.cpu.halted);
    }

    #[test]
    fn step_frame_returns_full_rgba_buffer() {
        let mut sys = DmgSystem::new();
        sys.load_program(&[0x00]).unwrap();
        let frame = sys.step_frame().unwrap();
        assert_eq!(frame.width, 160);
        assert_eq!(frame.height, 144);
        assert_eq!(frame.pixels.len(), 92_160);
    }

    #[test]
    fn step_frame_consumes_at_least_the_frame_budget() {
        let mut sys = DmgSystem::new();
        sys.load_program(&[0x00]).unwrap();
        sys.step_frame().unwrap();
        assert!(sys.cpu.cycles >= 70_224);
    }

    #[test]
    fn frame_crosses_vblank_and_raises_interrupt() {
        let mut sys = DmgSystem::new();
        sys.load_program(&[0x00]).unwrap();
        sys.step_frame().unwrap();
        assert_eq!(sys.bus.io[REG_IF] & IRQ_VBLANK, IRQ_VBLANK);
    }

    #[test]
    fn store_accumulator_then_halt() {
        // LD A,5 ; LD (0xC000),A ; HALT
        let mut sys = DmgSystem::new();
        sys.load_program(&image_with_entry(&[0x3E, 0x05, 0xEA, 0x00, 0xC0, 0x76]))
            .unwrap();
        sys.step_frame().unwrap();
        assert_eq!(sys.bus.read(0xC000), 5);
        assert!(sys.cpu.halted);
        // A halted CPU keeps reporting the fixed idle cost
        for _ in 0..3 {
            assert_eq!(sys.cpu.step(&mut sys.bus), 4);
        }
    }

    #[test]
    fn buttons_reach_the_joyp_register() {
        let mut sys = DmgSystem::new();
        sys.load_program(&[0x00]).unwrap();
        sys.set_button(Button::A, true);
        sys.bus.io[REG_JOYP] = 0x10; // select action buttons
        sys.joypad.update(&mut sys.bus);
        assert_eq!(sys.bus.io[REG_JOYP] & 0x01, 0);

        sys.set_button(Button::A, false);
        sys.joypad.update(&mut sys.bus);
        assert_eq!(sys.bus.io[REG_JOYP] & 0x01, 1);
    }

    #[test]
    fn save_state_roundtrips_register_file() {
        let mut sys = DmgSystem::new();
        sys.load_program(&image_with_entry(&[0x3E, 0x42, 0xC3, 0x02, 0x01]))
            .unwrap();
        sys.step_frame().unwrap();
        let snapshot = sys.save_state();
        assert_eq!(snapshot["system"], "dmg");

        let mut restored = DmgSystem::new();
        restored.load_state(&snapshot).unwrap();
        assert_eq!(restored.cpu.a, sys.cpu.a);
        assert_eq!(restored.cpu.pc, sys.cpu.pc);
        assert_eq!(restored.cpu.sp, sys.cpu.sp);
        assert_eq!(restored.cpu.halted, sys.cpu.halted);
    }

    #[test]
    fn machines_are_independent() {
        let mut first = DmgSystem::new();
        let mut second = DmgSystem::new();
        first.load_program(&image_with_entry(&[0x3E, 0x11, 0x76])).unwrap();
        second.load_program(&image_with_entry(&[0x3E, 0x22, 0x76])).unwrap();
        first.step_frame().unwrap();
        second.step_frame().unwrap();
        assert_eq!(first.cpu.a, 0x11);
        assert_eq!(second.cpu.a, 0x22);
    }
}
