//! Joypad input latch for the shared P1/JOYP register.
//!
//! The hardware multiplexes eight buttons onto four output lines; the
//! program selects the direction pad or the action buttons through bits
//! 4-5 of `$FF00` (active-low) and reads the group's state back from the
//! low nibble. The latch rewrites that nibble on every machine step.

use serde::{Deserialize, Serialize};

use crate::bus::{DmgBus, IRQ_JOYPAD, REG_JOYP};

// JOYP select bits (0 = selected)
const SELECT_DPAD: u8 = 0x10;
const SELECT_ACTION: u8 = 0x20;

/// The eight DMG buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    /// Bit position in the packed state byte: direction pad in the low
    /// nibble, action buttons in the high nibble.
    fn bit(self) -> u8 {
        match self {
            Button::Right => 0,
            Button::Left => 1,
            Button::Up => 2,
            Button::Down => 3,
            Button::A => 4,
            Button::B => 5,
            Button::Select => 6,
            Button::Start => 7,
        }
    }
}

/// Joypad state latch
pub struct Joypad {
    /// Active-low button state, one bit per [`Button`]
    state: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self { state: 0xFF }
    }

    /// Record a button transition. Any edge requests a joypad interrupt,
    /// matching the hardware's pin-change reporting.
    pub fn set_button(&mut self, bus: &mut DmgBus, button: Button, pressed: bool) {
        if pressed {
            self.state &= !(1 << button.bit());
        } else {
            self.state |= 1 << button.bit();
        }
        bus.request_interrupt(IRQ_JOYPAD);
    }

    /// Rewrite the JOYP output nibble for whichever group(s) the program
    /// selected. Both groups share the four output lines, so when both are
    /// selected the nibbles combine with AND: a line is pulled low by
    /// either group. The select bits are preserved and the top two bits
    /// always read 1.
    pub fn update(&self, bus: &mut DmgBus) {
        let joyp = bus.io[REG_JOYP];
        let mut lines = 0x0F;
        if joyp & SELECT_DPAD == 0 {
            lines &= self.state & 0x0F;
        }
        if joyp & SELECT_ACTION == 0 {
            lines &= (self.state >> 4) & 0x0F;
        }
        bus.io[REG_JOYP] = 0xC0 | (joyp & 0x30) | lines;
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}
