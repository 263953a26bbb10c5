use crate::{
    DISPLAY_X, DISPLAY_Y, VmError,
    devices::{Framebuffer, Keypad, ToneGenerator},
    font::GLYPH_SIZE,
    interpreter::{Interpreter, MAX_STACK_DEPTH},
    opcode::{AluOp, Opcode},
    u4,
};

impl<F: Framebuffer, K: Keypad, T: ToneGenerator> Interpreter<F, K, T> {
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Result<(), VmError> {
        // Advance past the instruction word before dispatch, so that jumps
        // and calls can assign the program counter directly.
        self.pc = self.pc.wrapping_add(2);

        match opcode {
            Opcode::ClearScreen => {
                self.framebuffer.clear();
            }
            Opcode::Return => {
                self.pc = self
                    .stack
                    .pop()
                    .ok_or(VmError::StackUnderflow { pc: self.pc.wrapping_sub(2) })?;
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } => {
                if self.stack.len() >= MAX_STACK_DEPTH {
                    return Err(VmError::StackOverflow {
                        pc: self.pc.wrapping_sub(2),
                        max_depth: MAX_STACK_DEPTH,
                    });
                }
                self.stack.push(self.pc);
                self.pc = nnn;
            }
            Opcode::SkipEqImm { x, nn } => {
                if self.v[x] == nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipNeImm { x, nn } => {
                if self.v[x] != nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipEqReg { x, y } => {
                if self.v[x] == self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipNeReg { x, y } => {
                if self.v[x] != self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::LoadImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::Alu { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                self.v[x] = rand::random::<u8>() & nn;
            }
            Opcode::LoadIndex { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndex { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n);
            }
            Opcode::SkipKeyPressed { x } => {
                if self.keypad.is_pressed(u4::truncate(self.v[x])) {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipKeyNotPressed { x } => {
                if !self.keypad.is_pressed(u4::truncate(self.v[x])) {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::WaitKey { x } => {
                self.waiting_key = Some(x);
            }
            Opcode::LoadDelay { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelay { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSound { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::GlyphAddr { x } => {
                self.i = u16::from(self.v[x]) * GLYPH_SIZE as u16;
            }
            Opcode::StoreBcd { x } => {
                let value = self.v[x];
                self.write(self.i, value / 100);
                self.write(self.i.wrapping_add(1), (value % 100) / 10);
                self.write(self.i.wrapping_add(2), value % 10);
            }
            Opcode::StoreRegs { x } => {
                for offset in 0..=u16::from(x) {
                    self.write(self.i.wrapping_add(offset), self.v[offset as usize]);
                }
            }
            Opcode::LoadRegs { x } => {
                for offset in 0..=u16::from(x) {
                    self.v[offset as usize] = self.read(self.i.wrapping_add(offset));
                }
            }
        }

        Ok(())
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: AluOp) {
        match op {
            AluOp::Load => self.v[x] = self.v[y],
            AluOp::Or => self.v[x] |= self.v[y],
            AluOp::And => self.v[x] &= self.v[y],
            AluOp::Xor => self.v[x] ^= self.v[y],
            AluOp::Add => {
                let (result, carry) = self.v[x].overflowing_add(self.v[y]);
                self.v[x] = result;
                self.v[0xF] = carry as u8;
            }
            AluOp::Sub => {
                // The flag is set before the subtraction, strictly-greater
                let no_borrow = (self.v[x] > self.v[y]) as u8;
                self.v[x] = self.v[x].wrapping_sub(self.v[y]);
                self.v[0xF] = no_borrow;
            }
            AluOp::SubNegate => {
                let no_borrow = (self.v[y] > self.v[x]) as u8;
                self.v[x] = self.v[y].wrapping_sub(self.v[x]);
                self.v[0xF] = no_borrow;
            }
            AluOp::ShiftRight => {
                self.v[0xF] = self.v[x] & 0x1;
                self.v[x] >>= 1;
            }
            AluOp::ShiftLeft => {
                // Compatibility quirk: the flag keeps the raw 0x80 mask
                // instead of being normalized to 0/1 like ShiftRight
                self.v[0xF] = self.v[x] & 0x80;
                self.v[x] <<= 1;
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) {
        let origin_x = self.v[x] as usize;
        let origin_y = self.v[y] as usize;

        self.v[0xF] = 0;
        for row in 0..usize::from(n) {
            let sprite_byte = self.read(self.i.wrapping_add(row as u16));

            for col in 0..8 {
                if sprite_byte & (0x80 >> col) != 0 {
                    // Out-of-range coordinates wrap to the opposite edge
                    let px = (origin_x + col) % DISPLAY_X;
                    let py = (origin_y + row) % DISPLAY_Y;

                    if self.framebuffer.toggle_pixel(px, py) {
                        self.v[0xF] = 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{KeyState, PixelGrid, ToneGenerator};
    use crate::interpreter::PROGRAM_START;

    struct SilentTone;

    impl ToneGenerator for SilentTone {
        fn start(&mut self, _frequency_hz: f32) {}
        fn stop(&mut self) {}
    }

    fn machine() -> Interpreter<PixelGrid, KeyState, SilentTone> {
        Interpreter::new(PixelGrid::new(), KeyState::new(), SilentTone)
    }

    /// Decodes and executes a single raw opcode word.
    fn run(machine: &mut Interpreter<PixelGrid, KeyState, SilentTone>, raw: u16) {
        try_run(machine, raw).unwrap()
    }

    fn try_run(
        machine: &mut Interpreter<PixelGrid, KeyState, SilentTone>,
        raw: u16,
    ) -> Result<(), VmError> {
        machine.execute(Opcode::decode(raw).unwrap())
    }

    #[test]
    fn add_sets_carry_on_overflow() {
        let mut machine = machine();

        machine.v[1] = 200;
        machine.v[2] = 100;
        run(&mut machine, 0x8124);
        assert_eq!(machine.v[1], (200u16 + 100) as u8);
        assert_eq!(machine.v[0xF], 1);

        machine.v[1] = 10;
        machine.v[2] = 20;
        run(&mut machine, 0x8124);
        assert_eq!(machine.v[1], 30);
        assert_eq!(machine.v[0xF], 0);
    }

    #[test]
    fn sub_flag_is_strictly_greater_before_subtracting() {
        let mut machine = machine();

        machine.v[1] = 7;
        machine.v[2] = 5;
        run(&mut machine, 0x8125);
        assert_eq!(machine.v[1], 2);
        assert_eq!(machine.v[0xF], 1);

        // Equal operands: no borrow occurs but the flag still reads 0
        machine.v[1] = 5;
        machine.v[2] = 5;
        run(&mut machine, 0x8125);
        assert_eq!(machine.v[1], 0);
        assert_eq!(machine.v[0xF], 0);

        machine.v[1] = 3;
        machine.v[2] = 5;
        run(&mut machine, 0x8125);
        assert_eq!(machine.v[1], 3u8.wrapping_sub(5));
        assert_eq!(machine.v[0xF], 0);
    }

    #[test]
    fn sub_negate_reverses_the_operands() {
        let mut machine = machine();

        machine.v[1] = 5;
        machine.v[2] = 7;
        run(&mut machine, 0x8127);
        assert_eq!(machine.v[1], 2);
        assert_eq!(machine.v[0xF], 1);

        machine.v[1] = 7;
        machine.v[2] = 5;
        run(&mut machine, 0x8127);
        assert_eq!(machine.v[1], 5u8.wrapping_sub(7));
        assert_eq!(machine.v[0xF], 0);
    }

    #[test]
    fn shift_right_keeps_the_low_bit_normalized() {
        let mut machine = machine();

        machine.v[4] = 0b1001_0011;
        run(&mut machine, 0x8406);
        assert_eq!(machine.v[4], 0b0100_1001);
        assert_eq!(machine.v[0xF], 1);

        machine.v[4] = 0b0000_0010;
        run(&mut machine, 0x8406);
        assert_eq!(machine.v[4], 0b0000_0001);
        assert_eq!(machine.v[0xF], 0);
    }

    #[test]
    fn shift_left_keeps_the_raw_high_bit_mask() {
        let mut machine = machine();

        machine.v[4] = 0b1001_0011;
        run(&mut machine, 0x840E);
        assert_eq!(machine.v[4], 0b0010_0110);
        // Quirk: VF holds 0x80, not 1
        assert_eq!(machine.v[0xF], 0x80);

        machine.v[4] = 0b0101_0101;
        run(&mut machine, 0x840E);
        assert_eq!(machine.v[4], 0b1010_1010);
        assert_eq!(machine.v[0xF], 0);
    }

    #[test]
    fn bitwise_ops_leave_the_flag_alone() {
        let mut machine = machine();
        machine.v[0xF] = 0x33;
        machine.v[1] = 0b1100;
        machine.v[2] = 0b1010;

        run(&mut machine, 0x8121); // OR
        assert_eq!(machine.v[1], 0b1110);
        run(&mut machine, 0x8122); // AND
        assert_eq!(machine.v[1], 0b1010);
        run(&mut machine, 0x8123); // XOR
        assert_eq!(machine.v[1], 0b0000);

        assert_eq!(machine.v[0xF], 0x33);
    }

    #[test]
    fn skips_advance_by_four_or_two() {
        let mut machine = machine();

        machine.v[1] = 0x42;
        run(&mut machine, 0x3142);
        assert_eq!(machine.pc, PROGRAM_START + 4);

        run(&mut machine, 0x3143);
        assert_eq!(machine.pc, PROGRAM_START + 6);

        run(&mut machine, 0x4143);
        assert_eq!(machine.pc, PROGRAM_START + 10);

        machine.v[2] = 0x42;
        run(&mut machine, 0x5120);
        assert_eq!(machine.pc, PROGRAM_START + 14);

        run(&mut machine, 0x9120);
        assert_eq!(machine.pc, PROGRAM_START + 16);
    }

    #[test]
    fn key_skips_query_the_keypad() {
        let mut machine = machine();
        machine.v[1] = 0xB;
        machine.keypad.set_pressed(u4::new(0xB), true);

        run(&mut machine, 0xE19E);
        assert_eq!(machine.pc, PROGRAM_START + 4);

        run(&mut machine, 0xE1A1);
        assert_eq!(machine.pc, PROGRAM_START + 6);

        machine.keypad.set_pressed(u4::new(0xB), false);
        run(&mut machine, 0xE1A1);
        assert_eq!(machine.pc, PROGRAM_START + 10);
    }

    #[test]
    fn call_and_return_round_trip() {
        let mut machine = machine();

        run(&mut machine, 0x2400);
        assert_eq!(machine.pc, 0x400);
        assert_eq!(machine.stack, vec![PROGRAM_START + 2]);

        run(&mut machine, 0x2600);
        assert_eq!(machine.pc, 0x600);

        run(&mut machine, 0x00EE);
        assert_eq!(machine.pc, 0x402);

        run(&mut machine, 0x00EE);
        // Back at the instruction after the original call site
        assert_eq!(machine.pc, PROGRAM_START + 2);
        assert!(machine.stack.is_empty());
    }

    #[test]
    fn call_overflows_at_the_depth_limit() {
        let mut machine = machine();

        for _ in 0..MAX_STACK_DEPTH {
            run(&mut machine, 0x2300);
        }

        machine.pc = 0x500;
        let err = try_run(&mut machine, 0x2300).unwrap_err();
        assert!(matches!(
            err,
            VmError::StackOverflow {
                pc: 0x500,
                max_depth: MAX_STACK_DEPTH
            }
        ));
        assert_eq!(machine.stack.len(), MAX_STACK_DEPTH);
    }

    #[test]
    fn return_underflows_on_an_empty_stack() {
        let mut machine = machine();

        let err = try_run(&mut machine, 0x00EE).unwrap_err();
        assert!(matches!(err, VmError::StackUnderflow { pc: 0x200 }));
    }

    #[test]
    fn jump_with_offset_adds_v0() {
        let mut machine = machine();
        machine.v[0] = 0x20;

        run(&mut machine, 0xB300);
        assert_eq!(machine.pc, 0x320);
    }

    #[test]
    fn random_is_masked_by_the_immediate() {
        let mut machine = machine();

        for _ in 0..32 {
            run(&mut machine, 0xC10F);
            assert_eq!(machine.v[1] & 0xF0, 0);
        }

        run(&mut machine, 0xC500);
        assert_eq!(machine.v[5], 0);
    }

    #[test]
    fn draw_sets_a_sprite_row_without_collision() {
        let mut machine = machine();
        machine.i = 0x300;
        machine.memory[0x300] = 0xFF;

        run(&mut machine, 0xD011);

        for x in 0..8 {
            assert!(machine.framebuffer.pixel(x, 0));
        }
        assert!(!machine.framebuffer.pixel(8, 0));
        assert_eq!(machine.v[0xF], 0);
    }

    #[test]
    fn double_draw_erases_and_reports_collision() {
        let mut machine = machine();
        machine.i = 0x300;
        machine.memory[0x300..0x305].copy_from_slice(&[0xF0, 0x90, 0x90, 0x90, 0xF0]);
        machine.v[1] = 12;
        machine.v[2] = 20;

        run(&mut machine, 0xD125);
        assert_eq!(machine.v[0xF], 0);
        let after_first: Vec<bool> = machine.framebuffer.pixels().iter().flatten().copied().collect();
        assert!(after_first.iter().any(|&p| p));

        run(&mut machine, 0xD125);
        assert_eq!(machine.v[0xF], 1);
        assert!(machine.framebuffer.pixels().iter().flatten().all(|&p| !p));
    }

    #[test]
    fn draw_wraps_around_both_edges() {
        let mut machine = machine();
        machine.i = 0x300;
        machine.memory[0x300] = 0b1100_0000;
        machine.memory[0x301] = 0b1100_0000;
        machine.v[1] = (DISPLAY_X - 1) as u8;
        machine.v[2] = (DISPLAY_Y - 1) as u8;

        run(&mut machine, 0xD122);

        assert!(machine.framebuffer.pixel(DISPLAY_X - 1, DISPLAY_Y - 1));
        assert!(machine.framebuffer.pixel(0, DISPLAY_Y - 1));
        assert!(machine.framebuffer.pixel(DISPLAY_X - 1, 0));
        assert!(machine.framebuffer.pixel(0, 0));
    }

    #[test]
    fn clear_screen_wipes_the_framebuffer() {
        let mut machine = machine();
        machine.i = 0x300;
        machine.memory[0x300] = 0xFF;
        run(&mut machine, 0xD011);

        run(&mut machine, 0x00E0);

        assert!(machine.framebuffer.pixels().iter().flatten().all(|&p| !p));
    }

    #[test]
    fn glyph_addr_points_into_the_font() {
        let mut machine = machine();
        machine.v[3] = 0xA;

        run(&mut machine, 0xF329);

        assert_eq!(machine.i, 0xA * GLYPH_SIZE as u16);
        // The glyph bytes for 'A' live there
        assert_eq!(
            machine.memory[machine.i as usize..machine.i as usize + 5],
            [0xF0, 0x90, 0xF0, 0x90, 0x90]
        );
    }

    #[test]
    fn bcd_stores_three_digits() {
        let mut machine = machine();
        machine.v[7] = 254;
        machine.i = 0x300;

        run(&mut machine, 0xF733);

        assert_eq!(machine.memory[0x300..0x303], [2, 5, 4]);
    }

    #[test]
    fn store_and_load_registers_leave_index_unchanged() {
        let mut machine = machine();
        for idx in 0..=5u8 {
            machine.v[idx as usize] = idx * 11;
        }
        machine.i = 0x300;

        run(&mut machine, 0xF555);
        assert_eq!(machine.i, 0x300);
        assert_eq!(machine.memory[0x300..0x306], [0, 11, 22, 33, 44, 55]);
        // V5 was the last register dumped
        assert_eq!(machine.memory[0x306], 0);

        machine.v = [0xEE; 16];
        run(&mut machine, 0xF565);
        assert_eq!(machine.i, 0x300);
        assert_eq!(machine.v[..6], [0, 11, 22, 33, 44, 55]);
        assert_eq!(machine.v[6], 0xEE);
    }

    #[test]
    fn index_arithmetic_and_timers() {
        let mut machine = machine();

        run(&mut machine, 0xA123);
        assert_eq!(machine.i, 0x123);

        machine.v[2] = 0x10;
        run(&mut machine, 0xF21E);
        assert_eq!(machine.i, 0x133);

        machine.v[3] = 42;
        run(&mut machine, 0xF315);
        assert_eq!(machine.delay_timer, 42);

        run(&mut machine, 0xF318);
        assert_eq!(machine.sound_timer, 42);

        machine.delay_timer = 7;
        run(&mut machine, 0xF407);
        assert_eq!(machine.v[4], 7);
    }

    #[test]
    fn memory_writes_wrap_into_the_address_space() {
        let mut machine = machine();
        machine.v[7] = 123;
        machine.i = 0xFFE;

        run(&mut machine, 0xF733);

        assert_eq!(machine.memory[0xFFE], 1);
        assert_eq!(machine.memory[0xFFF], 2);
        // Third digit wraps to address 0
        assert_eq!(machine.memory[0x000], 3);
    }
}
