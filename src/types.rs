pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;

/// A type alias for the CHIP-8 display buffer representation.
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];

/// Errors surfaced by the virtual machine.
///
/// Program load errors occur before any execution and leave the machine
/// untouched; the opcode and stack faults are fatal to the current run and
/// stop the frame in which they occur.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("program image is empty")]
    EmptyProgram,

    #[error("program image is too large ({size} bytes), max size is {max_size} bytes")]
    ProgramTooLarge { size: usize, max_size: usize },

    #[error("unknown opcode {opcode:#06X} at address {pc:#05X}")]
    UnknownOpcode { opcode: u16, pc: u16 },

    #[error("call stack overflow at address {pc:#05X} (max depth {max_depth})")]
    StackOverflow { pc: u16, max_depth: usize },

    #[error("return with an empty call stack at address {pc:#05X}")]
    StackUnderflow { pc: u16 },
}
