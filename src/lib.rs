//! A small stack-based bytecode virtual machine.
//!
//! A [`Chunk`] holds code, constants and a run-length encoded line table.
//! The [`VM`] runs a chunk against an operand stack and reports each step
//! through a [`Tracer`], which the [`disassembler`] renders as text.

pub mod chunk;
pub mod disassembler;
pub mod trace;
pub mod value;
pub mod vm;

pub use chunk::{Chunk, CompileError, Lines, Opcode, Slot};
pub use trace::{NoTrace, Tracer, WriterTracer};
pub use value::Value;
pub use vm::{InterpretError, RuntimeError, State, VM};
