use crate::{
    VmError,
    devices::{Framebuffer, Keypad, ToneGenerator},
    font,
    opcode::Opcode,
    u4,
};

pub const MEMORY_SIZE: usize = 4096;
pub const PROGRAM_START: u16 = 0x200;

/// Instructions executed per frame unless overridden.
pub const DEFAULT_SPEED: u32 = 10;

/// Nesting limit of the call stack. The classic interpreters allowed 16
/// levels; a 2nnn beyond that raises [`VmError::StackOverflow`].
pub const MAX_STACK_DEPTH: usize = 16;

/// Memory addresses are 12 bits wide; every access wraps into this range.
const ADDRESS_MASK: u16 = 0x0FFF;

/// Frequency fed to the tone generator while the sound timer is running.
pub const TONE_HZ: f32 = 440.0;

/// The CHIP-8 virtual machine.
///
/// Owns memory, registers, stack, timers and the key-wait state, and drives
/// the three injected devices. A host calls [`Interpreter::run_frame`] at
/// 60 Hz and routes key events through [`Interpreter::press_key`] and
/// [`Interpreter::release_key`].
pub struct Interpreter<F, K, T> {
    pub memory: [u8; MEMORY_SIZE],

    pub pc: u16,
    pub i: u16,
    pub v: [u8; 16],
    pub stack: Vec<u16>,

    pub delay_timer: u8,
    pub sound_timer: u8,

    /// Target register of a pending Fx0A key wait. While this is set the
    /// machine is suspended: no instructions, timer ticks or device output.
    pub waiting_key: Option<u4>,

    /// Instructions executed per call to [`Interpreter::run_frame`].
    pub speed: u32,

    pub framebuffer: F,
    pub keypad: K,
    pub tone: T,
}

impl<F: Framebuffer, K: Keypad, T: ToneGenerator> Interpreter<F, K, T> {
    /// Creates a machine with cleared memory, the font glyphs installed at
    /// address 0 and the program counter at [`PROGRAM_START`].
    pub fn new(framebuffer: F, keypad: K, tone: T) -> Self {
        let mut memory = [0; MEMORY_SIZE];
        memory[..font::FONT.len()].copy_from_slice(&font::FONT);

        Self {
            memory,
            pc: PROGRAM_START,
            i: 0,
            v: [0; 16],
            stack: Vec::new(),
            delay_timer: 0,
            sound_timer: 0,
            waiting_key: None,
            speed: DEFAULT_SPEED,
            framebuffer,
            keypad,
            tone,
        }
    }

    /// Copies a program image into memory starting at [`PROGRAM_START`].
    ///
    /// Registers, timers and the program counter are deliberately left
    /// alone, matching the original hardware: loading mid-session keeps
    /// whatever state the machine had.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), VmError> {
        if program.is_empty() {
            return Err(VmError::EmptyProgram);
        }

        let start = PROGRAM_START as usize;
        let max_size = MEMORY_SIZE - start;
        if program.len() > max_size {
            return Err(VmError::ProgramTooLarge {
                size: program.len(),
                max_size,
            });
        }

        self.memory[start..start + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Runs one 60 Hz frame: up to `speed` instructions, one timer tick,
    /// tone synchronization and a framebuffer present.
    ///
    /// While a key wait is pending the whole frame is suspended, including
    /// timers and device output. A decode fault aborts the frame
    /// immediately; no further instructions of the batch run.
    pub fn run_frame(&mut self) -> Result<(), VmError> {
        for _ in 0..self.speed {
            // Fx0A can suspend the machine mid-batch
            if self.waiting_key.is_some() {
                break;
            }
            self.step()?;
        }

        if self.waiting_key.is_none() {
            self.tick_timers();
            self.sync_tone();
            self.framebuffer.present();
        }

        Ok(())
    }

    /// Delivers a key-down event: updates the pressed table and resolves a
    /// pending Fx0A wait by storing the key in its target register.
    pub fn press_key(&mut self, key: u4) {
        self.keypad.set_pressed(key, true);

        if let Some(x) = self.waiting_key.take() {
            self.v[x] = key.into();
        }
    }

    /// Delivers a key-up event.
    pub fn release_key(&mut self, key: u4) {
        self.keypad.set_pressed(key, false);
    }

    /// Fetches, decodes and executes a single instruction.
    fn step(&mut self) -> Result<(), VmError> {
        let pc = self.pc;
        let opcode = self.fetch();
        let decoded = Opcode::decode(opcode).ok_or(VmError::UnknownOpcode { opcode, pc })?;

        self.execute(decoded)
    }

    /// Reads the big-endian opcode word at the program counter.
    fn fetch(&self) -> u16 {
        let high = self.read(self.pc);
        let low = self.read(self.pc.wrapping_add(1));

        u16::from_be_bytes([high, low])
    }

    fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    fn sync_tone(&mut self) {
        if self.sound_timer > 0 {
            self.tone.start(TONE_HZ);
        } else {
            self.tone.stop();
        }
    }

    pub(crate) fn read(&self, addr: u16) -> u8 {
        self.memory[(addr & ADDRESS_MASK) as usize]
    }

    pub(crate) fn write(&mut self, addr: u16, value: u8) {
        self.memory[(addr & ADDRESS_MASK) as usize] = value;
    }
}
