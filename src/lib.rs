//! A CHIP-8 virtual machine.
//!
//! The [`Interpreter`] owns memory, registers, stack and timers, and drives
//! its display, keypad and sound through the three device traits in
//! [`devices`]. Hosts inject the devices, call [`Interpreter::run_frame`]
//! at 60 Hz and deliver key events; everything else is instruction
//! semantics.

pub mod devices;
mod execute;
mod font;
mod interpreter;
mod nibble;
mod opcode;
mod runner;
mod types;

pub use interpreter::{
    DEFAULT_SPEED, Interpreter, MAX_STACK_DEPTH, MEMORY_SIZE, PROGRAM_START, TONE_HZ,
};
pub use nibble::u4;
pub use opcode::{AluOp, Opcode};
pub use runner::{FRAME_HZ, FrameClock};
pub use types::{DISPLAY_X, DISPLAY_Y, Display, VmError};
