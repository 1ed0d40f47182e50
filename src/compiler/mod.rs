// Toy Compiler Module

pub mod chunk;
mod compiler;
pub mod opcode;

pub use chunk::Chunk;
pub use compiler::Compiler;
pub use opcode::{OpCode, CALL_FRAME_SLOTS, HOST_RETURN, ITER_FRAME_SLOTS};
