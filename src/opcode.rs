use crate::u4;

/// A decoded CHIP-8 instruction.
///
/// The fields (`x`, `y`, `n`, `nn`, `nnn`) are the operand fields extracted
/// from the raw 16-bit opcode word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// 00E0 - Clear the framebuffer.
    ClearScreen,
    /// 00EE - Return from a subroutine.
    Return,

    /// 1nnn - Jump to address nnn.
    Jump { nnn: u16 },
    /// Bnnn - Jump to address nnn + V0.
    JumpOffset { nnn: u16 },
    /// 2nnn - Call subroutine at nnn.
    Call { nnn: u16 },

    /// 3xnn - Skip next instruction if Vx == nn.
    SkipEqImm { x: u4, nn: u8 },
    /// 4xnn - Skip next instruction if Vx != nn.
    SkipNeImm { x: u4, nn: u8 },
    /// 5xy0 - Skip next instruction if Vx == Vy.
    SkipEqReg { x: u4, y: u4 },
    /// 9xy0 - Skip next instruction if Vx != Vy.
    SkipNeReg { x: u4, y: u4 },

    /// 6xnn - Set Vx = nn.
    LoadImm { x: u4, nn: u8 },
    /// 7xnn - Set Vx = Vx + nn, wrapping, without touching VF.
    AddImm { x: u4, nn: u8 },

    /// 8xy0..8xyE - Register-register ALU operations.
    Alu { x: u4, y: u4, op: AluOp },
    /// Cxnn - Set Vx = random byte AND nn.
    Random { x: u4, nn: u8 },

    /// Annn - Set I = nnn.
    LoadIndex { nnn: u16 },
    /// Fx1E - Set I = I + Vx.
    AddIndex { x: u4 },

    /// Dxyn - Draw the 8xN sprite at memory[I..] to (Vx, Vy).
    Draw { x: u4, y: u4, n: u4 },

    /// Ex9E - Skip next instruction if key Vx is pressed.
    SkipKeyPressed { x: u4 },
    /// ExA1 - Skip next instruction if key Vx is not pressed.
    SkipKeyNotPressed { x: u4 },
    /// Fx0A - Suspend execution until a key is pressed, store it in Vx.
    WaitKey { x: u4 },

    /// Fx07 - Set Vx = delay timer.
    LoadDelay { x: u4 },
    /// Fx15 - Set delay timer = Vx.
    SetDelay { x: u4 },
    /// Fx18 - Set sound timer = Vx.
    SetSound { x: u4 },

    /// Fx29 - Set I to the font glyph address for digit Vx.
    GlyphAddr { x: u4 },
    /// Fx33 - Store the BCD digits of Vx at memory[I..I+3).
    StoreBcd { x: u4 },

    /// Fx55 - Store V0..=Vx at memory[I..]; I is left unchanged.
    StoreRegs { x: u4 },
    /// Fx65 - Load V0..=Vx from memory[I..]; I is left unchanged.
    LoadRegs { x: u4 },
}

/// Operation selector for the 8xyN instruction family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Load,
    Or,
    And,
    Xor,
    Add,
    Sub,
    ShiftRight,
    SubNegate,
    ShiftLeft,
}

impl Opcode {
    /// Decodes a raw 16-bit opcode word.
    ///
    /// Returns `None` for any bit pattern outside the instruction set, so
    /// that the interpreter can fault instead of silently continuing.
    pub fn decode(opcode: u16) -> Option<Self> {
        let nibble = (
            ((opcode & 0xF000) >> 12) as u8,
            ((opcode & 0x0F00) >> 8) as u8,
            ((opcode & 0x00F0) >> 4) as u8,
            (opcode & 0x000F) as u8,
        );

        let x = u4::new(nibble.1);
        let y = u4::new(nibble.2);
        let n = u4::new(nibble.3);
        let nn = (opcode & 0x00FF) as u8;
        let nnn = opcode & 0x0FFF;

        let decoded = match (nibble.0, nibble.1, nibble.2, nibble.3) {
            (0x0, 0x0, 0xE, 0x0) => Opcode::ClearScreen,
            (0x0, 0x0, 0xE, 0xE) => Opcode::Return,
            (0x1, _, _, _) => Opcode::Jump { nnn },
            (0x2, _, _, _) => Opcode::Call { nnn },
            (0x3, _, _, _) => Opcode::SkipEqImm { x, nn },
            (0x4, _, _, _) => Opcode::SkipNeImm { x, nn },
            (0x5, _, _, 0x0) => Opcode::SkipEqReg { x, y },
            (0x6, _, _, _) => Opcode::LoadImm { x, nn },
            (0x7, _, _, _) => Opcode::AddImm { x, nn },
            (0x8, _, _, _) => Opcode::Alu {
                x,
                y,
                op: match nibble.3 {
                    0x0 => AluOp::Load,
                    0x1 => AluOp::Or,
                    0x2 => AluOp::And,
                    0x3 => AluOp::Xor,
                    0x4 => AluOp::Add,
                    0x5 => AluOp::Sub,
                    0x6 => AluOp::ShiftRight,
                    0x7 => AluOp::SubNegate,
                    0xE => AluOp::ShiftLeft,
                    _ => return None,
                },
            },
            (0x9, _, _, 0x0) => Opcode::SkipNeReg { x, y },
            (0xA, _, _, _) => Opcode::LoadIndex { nnn },
            (0xB, _, _, _) => Opcode::JumpOffset { nnn },
            (0xC, _, _, _) => Opcode::Random { x, nn },
            (0xD, _, _, _) => Opcode::Draw { x, y, n },
            (0xE, _, 0x9, 0xE) => Opcode::SkipKeyPressed { x },
            (0xE, _, 0xA, 0x1) => Opcode::SkipKeyNotPressed { x },
            (0xF, _, 0x0, 0x7) => Opcode::LoadDelay { x },
            (0xF, _, 0x0, 0xA) => Opcode::WaitKey { x },
            (0xF, _, 0x1, 0x5) => Opcode::SetDelay { x },
            (0xF, _, 0x1, 0x8) => Opcode::SetSound { x },
            (0xF, _, 0x1, 0xE) => Opcode::AddIndex { x },
            (0xF, _, 0x2, 0x9) => Opcode::GlyphAddr { x },
            (0xF, _, 0x3, 0x3) => Opcode::StoreBcd { x },
            (0xF, _, 0x5, 0x5) => Opcode::StoreRegs { x },
            (0xF, _, 0x6, 0x5) => Opcode::LoadRegs { x },

            _ => return None,
        };

        Some(decoded)
    }
}
