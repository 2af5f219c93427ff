//! Sinks for the per-step execution trace.
//!
//! The VM reports what it is doing through a [`Tracer`] so dispatch never
//! touches formatting or I/O itself. [`NoTrace`] drops everything;
//! [`WriterTracer`] renders the classic listing into any [`io::Write`].

use std::io::{self, Write};

use tracing::warn;

use crate::{chunk::Chunk, disassembler, value::Value};

pub trait Tracer {
    /// Called before an instruction runs, only while the stack holds values.
    fn stack(&mut self, stack: &[Value]);

    /// Called with the offset of the instruction about to run.
    fn instruction(&mut self, chunk: &Chunk, offset: usize);

    /// Called once when a run returns.
    fn result(&mut self, value: Value);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl Tracer for NoTrace {
    fn stack(&mut self, _: &[Value]) {}

    fn instruction(&mut self, _: &Chunk, _: usize) {}

    fn result(&mut self, _: Value) {}
}

/// Writes the trace as text:
///
/// ```text
/// [ 1.2 , 3.4 ]
/// 000004 01              |  Add
/// [ 4.6 ]
/// 000005 06              |  Return
///
/// Result: 4.6
/// ```
///
/// Tracing is a side channel, so a failed write doesn't stop the run. The
/// first error is kept, later output is dropped, and [`finish`] reports it.
///
/// [`finish`]: WriterTracer::finish
#[derive(Debug)]
pub struct WriterTracer<W> {
    writer: W,
    error: Option<io::Error>,
}

impl<W: Write> WriterTracer<W> {
    pub fn new(writer: W) -> WriterTracer<W> {
        WriterTracer {
            writer,
            error: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Flushes and hands back the writer, or the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        self.writer.flush()?;
        Ok(self.writer)
    }

    fn emit(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }

        if let Err(error) = writeln!(self.writer, "{}", text) {
            warn!(%error, "trace output failed, dropping the rest of the trace");
            self.error = Some(error);
        }
    }
}

impl<W: Write> Tracer for WriterTracer<W> {
    fn stack(&mut self, stack: &[Value]) {
        self.emit(&disassembler::stack(stack));
    }

    fn instruction(&mut self, chunk: &Chunk, offset: usize) {
        let (text, _) = disassembler::instruction(chunk, offset);
        self.emit(&text);
    }

    fn result(&mut self, value: Value) {
        self.emit(&format!("\nResult: {}", value));
    }
}
