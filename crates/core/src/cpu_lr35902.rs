//! Sharp LR35902 CPU core (the Game Boy CPU).
//!
//! A Z80 derivative: no index or shadow registers, a reworked flag byte,
//! and Game Boy specific loads (LDH, LD (HL+)/(HL-)). The core owns only
//! register state; every memory access goes through the [`Memory`] seam
//! passed into `step`, so the same core runs against the machine bus or a
//! flat test memory.

use crate::Memory;

// Flag bit positions (in F register)
const FLAG_Z: u8 = 0x80;
const FLAG_N: u8 = 0x40;
const FLAG_H: u8 = 0x20;
const FLAG_C: u8 = 0x10;

/// Cycle cost reported while halted or stopped.
const IDLE_CYCLES: u32 = 4;

/// Sharp LR35902 CPU state
#[derive(Debug, Clone)]
pub struct CpuLr35902 {
    /// Accumulator
    pub a: u8,
    /// Flags: Z N H C in the high nibble, low nibble always zero
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    /// Stack pointer
    pub sp: u16,
    /// Program counter
    pub pc: u16,
    /// Interrupt Master Enable flag
    pub ime: bool,
    /// Halted state (HALT executed)
    pub halted: bool,
    /// Stopped state (STOP executed)
    pub stopped: bool,
    /// Total cycles executed since the last reset
    pub cycles: u64,
}

impl Default for CpuLr35902 {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuLr35902 {
    pub fn new() -> Self {
        let mut cpu = Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
            ime: false,
            halted: false,
            stopped: false,
            cycles: 0,
        };
        cpu.reset();
        cpu
    }

    /// Restore the DMG post-boot register file.
    pub fn reset(&mut self) {
        self.a = 0x01;
        self.f = 0xB0;
        self.b = 0x00;
        self.c = 0x13;
        self.d = 0x00;
        self.e = 0xD8;
        self.h = 0x01;
        self.l = 0x4D;
        self.sp = 0xFFFE;
        self.pc = 0x0100;
        self.ime = false;
        self.halted = false;
        self.stopped = false;
        self.cycles = 0;
    }

    /// Execute one instruction and return its cycle cost.
    ///
    /// While halted or stopped the core does not touch memory and reports
    /// a fixed idle cost, so a driving loop keeps making timing progress.
    pub fn step<M: Memory>(&mut self, mem: &mut M) -> u32 {
        if self.halted || self.stopped {
            self.cycles += IDLE_CYCLES as u64;
            return IDLE_CYCLES;
        }

        let opcode = self.fetch8(mem);
        let cost = self.execute(mem, opcode);
        self.cycles += cost as u64;
        cost
    }

    fn fetch8<M: Memory>(&mut self, mem: &mut M) -> u8 {
        let byte = mem.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch16<M: Memory>(&mut self, mem: &mut M) -> u16 {
        let lo = self.fetch8(mem) as u16;
        let hi = self.fetch8(mem) as u16;
        hi << 8 | lo
    }

    fn push16<M: Memory>(&mut self, mem: &mut M, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        mem.write(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        mem.write(self.sp, val as u8);
    }

    fn pop16<M: Memory>(&mut self, mem: &mut M) -> u16 {
        let lo = mem.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = mem.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        hi << 8 | lo
    }

    // Register pair accessors
    pub fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    pub fn af(&self) -> u16 {
        (self.a as u16) << 8 | self.f as u16
    }

    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8 & 0xF0; // low nibble is hardwired to zero
    }

    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.f |= mask;
        } else {
            self.f &= !mask;
        }
    }

    /// Redefine all four flags at once.
    fn set_znhc(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = (z as u8) << 7 | (n as u8) << 6 | (h as u8) << 5 | (c as u8) << 4;
    }

    /// Branch condition encoded in bits 4-3 of the opcode: NZ, Z, NC, C.
    fn condition(&self, idx: u8) -> bool {
        match idx & 0x03 {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            _ => self.flag(FLAG_C),
        }
    }

    /// 8-bit register selected by an opcode field: B C D E H L (HL) A.
    fn read_r8<M: Memory>(&mut self, mem: &mut M, idx: u8) -> u8 {
        match idx & 0x07 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => mem.read(self.hl()),
            _ => self.a,
        }
    }

    fn write_r8<M: Memory>(&mut self, mem: &mut M, idx: u8, val: u8) {
        match idx & 0x07 {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            6 => mem.write(self.hl(), val),
            _ => self.a = val,
        }
    }

    // Accumulator arithmetic
    fn alu_add(&mut self, val: u8, with_carry: bool) {
        let carry = (with_carry && self.flag(FLAG_C)) as u8;
        let result = self.a as u16 + val as u16 + carry as u16;
        let half = (self.a & 0x0F) + (val & 0x0F) + carry > 0x0F;
        self.set_znhc(result as u8 == 0, false, half, result > 0xFF);
        self.a = result as u8;
    }

    fn alu_sub(&mut self, val: u8, with_carry: bool) {
        let carry = (with_carry && self.flag(FLAG_C)) as u8;
        let result = self.a.wrapping_sub(val).wrapping_sub(carry);
        let half = (self.a & 0x0F) < (val & 0x0F) + carry;
        let borrow = (self.a as u16) < val as u16 + carry as u16;
        self.set_znhc(result == 0, true, half, borrow);
        self.a = result;
    }

    fn alu_and(&mut self, val: u8) {
        self.a &= val;
        self.set_znhc(self.a == 0, false, true, false);
    }

    fn alu_xor(&mut self, val: u8) {
        self.a ^= val;
        self.set_znhc(self.a == 0, false, false, false);
    }

    fn alu_or(&mut self, val: u8) {
        self.a |= val;
        self.set_znhc(self.a == 0, false, false, false);
    }

    fn alu_cp(&mut self, val: u8) {
        let half = (self.a & 0x0F) < (val & 0x0F);
        self.set_znhc(self.a == val, true, half, self.a < val);
    }

    /// ALU operation selected by bits 5-3 of the opcode.
    fn alu_dispatch(&mut self, op: u8, val: u8) {
        match op & 0x07 {
            0 => self.alu_add(val, false),
            1 => self.alu_add(val, true),
            2 => self.alu_sub(val, false),
            3 => self.alu_sub(val, true),
            4 => self.alu_and(val),
            5 => self.alu_xor(val),
            6 => self.alu_or(val),
            _ => self.alu_cp(val),
        }
    }

    // INC/DEC leave the carry flag alone
    fn alu_inc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, val & 0x0F == 0x0F);
        result
    }

    fn alu_dec(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, true);
        self.set_flag(FLAG_H, val & 0x0F == 0);
        result
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.hl();
        let (result, carry) = hl.overflowing_add(val);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF);
        self.set_flag(FLAG_C, carry);
        self.set_hl(result);
    }

    /// SP plus a signed immediate; carries computed on the low byte.
    fn sp_plus_offset<M: Memory>(&mut self, mem: &mut M) -> u16 {
        let offset = self.fetch8(mem) as i8 as i16 as u16;
        let half = (self.sp & 0x000F) + (offset & 0x000F) > 0x000F;
        let carry = (self.sp & 0x00FF) + (offset & 0x00FF) > 0x00FF;
        self.set_znhc(false, false, half, carry);
        self.sp.wrapping_add(offset)
    }

    // Rotates and shifts (CB semantics: Z computed from the result)
    fn rlc(&mut self, val: u8) -> u8 {
        let out = val.rotate_left(1);
        self.set_znhc(out == 0, false, false, val & 0x80 != 0);
        out
    }

    fn rrc(&mut self, val: u8) -> u8 {
        let out = val.rotate_right(1);
        self.set_znhc(out == 0, false, false, val & 0x01 != 0);
        out
    }

    fn rl(&mut self, val: u8) -> u8 {
        let out = val << 1 | self.flag(FLAG_C) as u8;
        self.set_znhc(out == 0, false, false, val & 0x80 != 0);
        out
    }

    fn rr(&mut self, val: u8) -> u8 {
        let out = val >> 1 | (self.flag(FLAG_C) as u8) << 7;
        self.set_znhc(out == 0, false, false, val & 0x01 != 0);
        out
    }

    fn sla(&mut self, val: u8) -> u8 {
        let out = val << 1;
        self.set_znhc(out == 0, false, false, val & 0x80 != 0);
        out
    }

    fn sra(&mut self, val: u8) -> u8 {
        let out = val >> 1 | (val & 0x80);
        self.set_znhc(out == 0, false, false, val & 0x01 != 0);
        out
    }

    fn swap(&mut self, val: u8) -> u8 {
        let out = val.rotate_left(4);
        self.set_znhc(out == 0, false, false, false);
        out
    }

    fn srl(&mut self, val: u8) -> u8 {
        let out = val >> 1;
        self.set_znhc(out == 0, false, false, val & 0x01 != 0);
        out
    }

    fn execute<M: Memory>(&mut self, mem: &mut M, opcode: u8) -> u32 {
        match opcode {
            // NOP
            0x00 => 4,

            // LD rr,d16
            0x01 => {
                let val = self.fetch16(mem);
                self.set_bc(val);
                12
            }
            0x11 => {
                let val = self.fetch16(mem);
                self.set_de(val);
                12
            }
            0x21 => {
                let val = self.fetch16(mem);
                self.set_hl(val);
                12
            }
            0x31 => {
                self.sp = self.fetch16(mem);
                12
            }

            // LD (BC),A / LD (DE),A / LD A,(BC) / LD A,(DE)
            0x02 => {
                mem.write(self.bc(), self.a);
                8
            }
            0x12 => {
                mem.write(self.de(), self.a);
                8
            }
            0x0A => {
                self.a = mem.read(self.bc());
                8
            }
            0x1A => {
                self.a = mem.read(self.de());
                8
            }

            // LD (HL+),A / LD (HL-),A / LD A,(HL+) / LD A,(HL-)
            0x22 => {
                let addr = self.hl();
                mem.write(addr, self.a);
                self.set_hl(addr.wrapping_add(1));
                8
            }
            0x32 => {
                let addr = self.hl();
                mem.write(addr, self.a);
                self.set_hl(addr.wrapping_sub(1));
                8
            }
            0x2A => {
                let addr = self.hl();
                self.a = mem.read(addr);
                self.set_hl(addr.wrapping_add(1));
                8
            }
            0x3A => {
                let addr = self.hl();
                self.a = mem.read(addr);
                self.set_hl(addr.wrapping_sub(1));
                8
            }

            // INC rr / DEC rr (no flags)
            0x03 => {
                self.set_bc(self.bc().wrapping_add(1));
                8
            }
            0x13 => {
                self.set_de(self.de().wrapping_add(1));
                8
            }
            0x23 => {
                self.set_hl(self.hl().wrapping_add(1));
                8
            }
            0x33 => {
                self.sp = self.sp.wrapping_add(1);
                8
            }
            0x0B => {
                self.set_bc(self.bc().wrapping_sub(1));
                8
            }
            0x1B => {
                self.set_de(self.de().wrapping_sub(1));
                8
            }
            0x2B => {
                self.set_hl(self.hl().wrapping_sub(1));
                8
            }
            0x3B => {
                self.sp = self.sp.wrapping_sub(1);
                8
            }

            // INC r / DEC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let idx = opcode >> 3;
                let val = self.read_r8(mem, idx);
                let out = self.alu_inc(val);
                self.write_r8(mem, idx, out);
                if idx & 0x07 == 6 {
                    12
                } else {
                    4
                }
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let idx = opcode >> 3;
                let val = self.read_r8(mem, idx);
                let out = self.alu_dec(val);
                self.write_r8(mem, idx, out);
                if idx & 0x07 == 6 {
                    12
                } else {
                    4
                }
            }

            // LD r,d8
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let idx = opcode >> 3;
                let val = self.fetch8(mem);
                self.write_r8(mem, idx, val);
                if idx & 0x07 == 6 {
                    12
                } else {
                    8
                }
            }

            // RLCA / RRCA / RLA / RRA always clear Z
            0x07 => {
                self.a = self.rlc(self.a);
                self.set_flag(FLAG_Z, false);
                4
            }
            0x0F => {
                self.a = self.rrc(self.a);
                self.set_flag(FLAG_Z, false);
                4
            }
            0x17 => {
                self.a = self.rl(self.a);
                self.set_flag(FLAG_Z, false);
                4
            }
            0x1F => {
                self.a = self.rr(self.a);
                self.set_flag(FLAG_Z, false);
                4
            }

            // LD (a16),SP
            0x08 => {
                let addr = self.fetch16(mem);
                mem.write(addr, self.sp as u8);
                mem.write(addr.wrapping_add(1), (self.sp >> 8) as u8);
                20
            }

            // ADD HL,rr
            0x09 => {
                self.add_hl(self.bc());
                8
            }
            0x19 => {
                self.add_hl(self.de());
                8
            }
            0x29 => {
                self.add_hl(self.hl());
                8
            }
            0x39 => {
                self.add_hl(self.sp);
                8
            }

            // JR r8 / JR cc,r8
            0x18 => {
                let offset = self.fetch8(mem) as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
                12
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(mem) as i8;
                if self.condition(opcode >> 3) {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    12
                } else {
                    8
                }
            }

            // DAA
            0x27 => {
                let mut adjust = 0u8;
                let mut carry = false;
                if self.flag(FLAG_H) || (!self.flag(FLAG_N) && self.a & 0x0F > 0x09) {
                    adjust |= 0x06;
                }
                if self.flag(FLAG_C) || (!self.flag(FLAG_N) && self.a > 0x99) {
                    adjust |= 0x60;
                    carry = true;
                }
                self.a = if self.flag(FLAG_N) {
                    self.a.wrapping_sub(adjust)
                } else {
                    self.a.wrapping_add(adjust)
                };
                self.set_flag(FLAG_Z, self.a == 0);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, carry);
                4
            }
            // CPL
            0x2F => {
                self.a = !self.a;
                self.set_flag(FLAG_N, true);
                self.set_flag(FLAG_H, true);
                4
            }
            // SCF
            0x37 => {
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, true);
                4
            }
            // CCF
            0x3F => {
                let carry = self.flag(FLAG_C);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, !carry);
                4
            }

            // STOP (consumes its padding byte) / HALT
            0x10 => {
                self.stopped = true;
                self.fetch8(mem);
                4
            }
            0x76 => {
                self.halted = true;
                4
            }

            // LD r,r'
            0x40..=0x7F => {
                let val = self.read_r8(mem, opcode);
                self.write_r8(mem, opcode >> 3, val);
                if opcode & 0x07 == 6 || (opcode >> 3) & 0x07 == 6 {
                    8
                } else {
                    4
                }
            }

            // ADD/ADC/SUB/SBC/AND/XOR/OR/CP r
            0x80..=0xBF => {
                let val = self.read_r8(mem, opcode);
                self.alu_dispatch(opcode >> 3, val);
                if opcode & 0x07 == 6 {
                    8
                } else {
                    4
                }
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition(opcode >> 3) {
                    self.pc = self.pop16(mem);
                    20
                } else {
                    8
                }
            }

            // POP rr
            0xC1 => {
                let val = self.pop16(mem);
                self.set_bc(val);
                12
            }
            0xD1 => {
                let val = self.pop16(mem);
                self.set_de(val);
                12
            }
            0xE1 => {
                let val = self.pop16(mem);
                self.set_hl(val);
                12
            }
            0xF1 => {
                let val = self.pop16(mem);
                self.set_af(val);
                12
            }

            // JP cc,a16 / JP a16
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let target = self.fetch16(mem);
                if self.condition(opcode >> 3) {
                    self.pc = target;
                    16
                } else {
                    12
                }
            }
            0xC3 => {
                self.pc = self.fetch16(mem);
                16
            }

            // CALL cc,a16 / CALL a16
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let target = self.fetch16(mem);
                if self.condition(opcode >> 3) {
                    self.push16(mem, self.pc);
                    self.pc = target;
                    24
                } else {
                    12
                }
            }
            0xCD => {
                let target = self.fetch16(mem);
                self.push16(mem, self.pc);
                self.pc = target;
                24
            }

            // PUSH rr
            0xC5 => {
                self.push16(mem, self.bc());
                16
            }
            0xD5 => {
                self.push16(mem, self.de());
                16
            }
            0xE5 => {
                self.push16(mem, self.hl());
                16
            }
            0xF5 => {
                self.push16(mem, self.af());
                16
            }

            // ALU d8
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.fetch8(mem);
                self.alu_dispatch(opcode >> 3, val);
                8
            }

            // RST n
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push16(mem, self.pc);
                self.pc = (opcode & 0x38) as u16;
                16
            }

            // RET / RETI
            0xC9 => {
                self.pc = self.pop16(mem);
                16
            }
            0xD9 => {
                self.pc = self.pop16(mem);
                self.ime = true;
                16
            }

            // CB prefix
            0xCB => {
                let op = self.fetch8(mem);
                self.execute_cb(mem, op)
            }

            // LDH (a8),A / LDH A,(a8)
            0xE0 => {
                let offset = self.fetch8(mem) as u16;
                mem.write(0xFF00 | offset, self.a);
                12
            }
            0xF0 => {
                let offset = self.fetch8(mem) as u16;
                self.a = mem.read(0xFF00 | offset);
                12
            }

            // LD (C),A / LD A,(C)
            0xE2 => {
                mem.write(0xFF00 | self.c as u16, self.a);
                8
            }
            0xF2 => {
                self.a = mem.read(0xFF00 | self.c as u16);
                8
            }

            // LD (a16),A / LD A,(a16)
            0xEA => {
                let addr = self.fetch16(mem);
                mem.write(addr, self.a);
                16
            }
            0xFA => {
                let addr = self.fetch16(mem);
                self.a = mem.read(addr);
                16
            }

            // ADD SP,r8 / LD HL,SP+r8
            0xE8 => {
                self.sp = self.sp_plus_offset(mem);
                16
            }
            0xF8 => {
                let val = self.sp_plus_offset(mem);
                self.set_hl(val);
                12
            }

            // JP (HL) / LD SP,HL
            0xE9 => {
                self.pc = self.hl();
                4
            }
            0xF9 => {
                self.sp = self.hl();
                8
            }

            // DI / EI
            0xF3 => {
                self.ime = false;
                4
            }
            0xFB => {
                self.ime = true;
                4
            }

            // Holes in the opcode map degrade to a NOP so a partially
            // decoded program keeps running.
            _ => {
                log::debug!(
                    "unimplemented opcode {:#04x} at {:#06x}",
                    opcode,
                    self.pc.wrapping_sub(1)
                );
                4
            }
        }
    }

    fn execute_cb<M: Memory>(&mut self, mem: &mut M, opcode: u8) -> u32 {
        let val = self.read_r8(mem, opcode);
        let field = (opcode >> 3) & 0x07; // operation for 0x00-0x3F, bit number above

        let out = match opcode >> 6 {
            0 => match field {
                0 => self.rlc(val),
                1 => self.rrc(val),
                2 => self.rl(val),
                3 => self.rr(val),
                4 => self.sla(val),
                5 => self.sra(val),
                6 => self.swap(val),
                _ => self.srl(val),
            },
            // BIT b,r: flags only, no writeback
            1 => {
                self.set_flag(FLAG_Z, val & (1 << field) == 0);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, true);
                return if opcode & 0x07 == 6 { 12 } else { 8 };
            }
            // RES b,r / SET b,r
            2 => val & !(1 << field),
            _ => val | (1 << field),
        };

        self.write_r8(mem, opcode, out);
        if opcode & 0x07 == 6 {
            16
        } else {
            8
        }
    }
}
