use thiserror::Error;

use crate::{disassembler, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Constant,
    Add,
    Sub,
    Mul,
    Div,
    Negate,
    Return,
}

impl Opcode {
    pub fn to_str(self) -> &'static str {
        match self {
            Opcode::Constant => "Constant",
            Opcode::Add => "Add",
            Opcode::Sub => "Sub",
            Opcode::Mul => "Mul",
            Opcode::Div => "Div",
            Opcode::Negate => "Negate",
            Opcode::Return => "Return",
        }
    }

    /// Number of slots the instruction occupies, operand included.
    pub fn width(self) -> usize {
        match self {
            Opcode::Constant => 2,
            _ => 1,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as _
    }
}

/// One token of a chunk's code: either an opcode or the raw operand that
/// follows one. Operands are plain integers and never pass through
/// [`Opcode`], so the constant pool isn't limited by the opcode range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Op(Opcode),
    Operand(usize),
}

impl Slot {
    /// The token's numeric value as shown by the disassembler.
    pub fn raw(self) -> usize {
        match self {
            Slot::Op(op) => u8::from(op).into(),
            Slot::Operand(n) => n,
        }
    }
}

impl From<Opcode> for Slot {
    fn from(op: Opcode) -> Slot {
        Slot::Op(op)
    }
}

impl From<usize> for Slot {
    fn from(operand: usize) -> Slot {
        Slot::Operand(operand)
    }
}

/// Run-length encoded map from code offsets to source lines.
///
/// `breakpoints[i]` is the first offset whose line is `lines[i]`; a new run
/// only starts when the line changes, so straight-line code on one source
/// line costs a single entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lines {
    breakpoints: Vec<usize>,
    lines: Vec<usize>,
}

impl Lines {
    fn record(&mut self, offset: usize, line: usize) {
        if self.lines.last() != Some(&line) {
            self.breakpoints.push(offset);
            self.lines.push(line);
        }
    }

    /// Line of the run containing `offset`, found by binary search for the
    /// greatest breakpoint not after it.
    pub fn get(&self, offset: usize) -> Option<usize> {
        let runs = self.breakpoints.partition_point(|&start| start <= offset);
        runs.checked_sub(1).and_then(|run| self.lines.get(run).copied())
    }

    pub fn breakpoints(&self) -> &[usize] {
        &self.breakpoints
    }

    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

/// Structural problems found by [`Chunk::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("chunk contains no code")]
    EmptyChunk,

    #[error("constant instruction at {offset:06} has no operand")]
    MissingOperand { offset: usize },

    #[error("operand at {offset:06} does not follow a constant instruction")]
    StrayOperand { offset: usize },

    #[error("constant instruction at {offset:06} references missing constant {index}")]
    ConstantOutOfRange { offset: usize, index: usize },

    #[error("chunk never returns")]
    MissingReturn,
}

#[derive(Debug, Clone, Default)]
pub struct Chunk {
    code: Vec<Slot>,
    constants: Vec<Value>,
    lines: Lines,
}

impl Chunk {
    pub fn new() -> Chunk {
        Chunk::default()
    }

    pub fn write(&mut self, slot: impl Into<Slot>, line: usize) {
        self.lines.record(self.code.len(), line);
        self.code.push(slot.into());
    }

    pub fn write_op(&mut self, op: Opcode, line: usize) {
        self.write(op, line);
    }

    /// Adds `value` to the pool and emits the instruction that loads it.
    pub fn write_constant(&mut self, value: impl Into<Value>, line: usize) -> usize {
        let constant = self.add_constant(value);
        self.write(Opcode::Constant, line);
        self.write(constant, line);
        constant
    }

    pub fn add_constant(&mut self, value: impl Into<Value>) -> usize {
        self.constants.push(value.into());
        self.constants.len() - 1
    }

    pub fn get_line(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset)
    }

    pub fn code(&self) -> &[Slot] {
        &self.code
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn lines(&self) -> &Lines {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Checks that every constant instruction owns an in-range operand, no
    /// operand floats free, and a return is present.
    pub fn verify(&self) -> Result<(), CompileError> {
        if self.code.is_empty() {
            return Err(CompileError::EmptyChunk);
        }

        let mut returns = false;
        let mut offset = 0;
        while offset < self.code.len() {
            let op = match self.code[offset] {
                Slot::Op(op) => op,
                Slot::Operand(_) => {
                    return Err(CompileError::StrayOperand { offset })
                }
            };

            match op {
                Opcode::Constant => match self.code.get(offset + 1) {
                    Some(&Slot::Operand(index))
                        if index < self.constants.len() => {}
                    Some(&Slot::Operand(index)) => {
                        return Err(CompileError::ConstantOutOfRange {
                            offset,
                            index,
                        })
                    }
                    _ => return Err(CompileError::MissingOperand { offset }),
                },
                Opcode::Return => returns = true,
                _ => {}
            }

            offset += op.width();
        }

        if returns {
            Ok(())
        } else {
            Err(CompileError::MissingReturn)
        }
    }
}

// Debug helpers
impl Chunk {
    pub fn disassemble(&self, name: &str) -> String {
        let mut listing = format!("== {} ==\n", name);

        let mut offset = 0;
        while offset < self.code.len() {
            let (text, next) = self.disassemble_instruction(offset);
            listing.push_str(&text);
            listing.push('\n');
            offset = next;
        }

        listing
    }

    pub fn disassemble_instruction(&self, offset: usize) -> (String, usize) {
        disassembler::instruction(self, offset)
    }
}
