use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    chunk::{Chunk, CompileError, Opcode, Slot},
    trace::{NoTrace, Tracer},
    value::Value,
};

macro_rules! binop {
    ($vm:expr, $op:expr) => {{
        let (l, r) = $vm.pop_pair()?;
        $vm.push($op(l, r));
    }};
}

/// Faults raised while running a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("constant {index} is out of bounds for a pool of {len}")]
    InvalidConstantIndex { index: usize, len: usize },

    #[error("unknown opcode {raw}")]
    UnknownOpcode { raw: usize },

    #[error("constant instruction is followed by {found} instead of an operand")]
    MissingOperand { found: &'static str },

    #[error("reached the end of code without a return")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpretError {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {error}\n[line {line}] at {offset:06}")]
    Runtime {
        error: RuntimeError,
        offset: usize,
        line: usize,
    },
}

impl InterpretError {
    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        match self {
            InterpretError::Runtime { error, .. } => Some(error),
            InterpretError::Compile(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ready,
    Running,
    Halted,
    Failed,
}

/// A single-frame stack machine.
///
/// The VM only borrows a chunk for the length of [`VM::interpret`]; stack
/// and instruction pointer are reset on every call and left as they were
/// when a run ends, so a failed run can be inspected afterwards.
#[derive(Debug)]
pub struct VM<T = NoTrace> {
    stack: Vec<Value>,
    ip: usize,
    state: State,
    tracer: T,
}

impl VM {
    pub fn new() -> VM {
        VM::with_tracer(NoTrace)
    }
}

impl Default for VM {
    fn default() -> VM {
        VM::new()
    }
}

impl<T: Tracer> VM<T> {
    pub fn with_tracer(tracer: T) -> VM<T> {
        VM {
            stack: Vec::new(),
            ip: 0,
            state: State::Ready,
            tracer,
        }
    }

    /// Runs `chunk` from offset 0 until it returns or faults.
    ///
    /// The only compile-kind result is `Compile(EmptyChunk)` for a chunk with
    /// no code; everything else that goes wrong surfaces as `Runtime`.
    pub fn interpret(&mut self, chunk: &Chunk) -> Result<Value, InterpretError> {
        self.reset_stack();
        self.ip = 0;

        if chunk.is_empty() {
            self.state = State::Failed;
            return Err(CompileError::EmptyChunk.into());
        }

        self.state = State::Running;
        debug!(
            code = chunk.len(),
            constants = chunk.constants().len(),
            "interpreting chunk"
        );

        let result = self.run(chunk);

        match &result {
            Ok(value) => {
                self.state = State::Halted;
                debug!(%value, ip = self.ip, "halted");
            }
            Err(error) => {
                self.state = State::Failed;
                warn!(%error, depth = self.stack.len(), "run failed");
            }
        }

        result
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut T {
        &mut self.tracer
    }

    pub fn into_tracer(self) -> T {
        self.tracer
    }

    fn run(&mut self, chunk: &Chunk) -> Result<Value, InterpretError> {
        loop {
            let start = self.ip;

            match self.step(chunk) {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {}
                Err(error) => return Err(self.runtime_error(chunk, start, error)),
            }
        }
    }

    /// Runs one instruction. `Some` carries the result once `Return` is hit.
    fn step(&mut self, chunk: &Chunk) -> Result<Option<Value>, RuntimeError> {
        if !self.stack.is_empty() {
            self.tracer.stack(&self.stack);
        }

        if self.ip < chunk.len() {
            self.tracer.instruction(chunk, self.ip);
        }

        let instruction = match self.read_slot(chunk)? {
            Slot::Op(op) => op,
            Slot::Operand(raw) => return Err(RuntimeError::UnknownOpcode { raw }),
        };

        trace!(
            ip = self.ip - 1,
            op = instruction.to_str(),
            depth = self.stack.len()
        );

        match instruction {
            Opcode::Constant => {
                let constant = self.read_constant(chunk)?;
                self.push(constant);
            }

            Opcode::Return => {
                let result = self.pop()?;

                if !self.stack.is_empty() {
                    self.tracer.stack(&self.stack);
                }
                self.tracer.result(result);

                return Ok(Some(result));
            }

            Opcode::Negate => {
                let value = -self.pop()?;
                self.push(value);
            }

            Opcode::Add => binop!(self, std::ops::Add::add),
            Opcode::Sub => binop!(self, std::ops::Sub::sub),
            Opcode::Mul => binop!(self, std::ops::Mul::mul),
            Opcode::Div => binop!(self, std::ops::Div::div),
        }

        Ok(None)
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pops the right operand, then the left. Checks depth first so an
    /// underflow leaves the stack untouched.
    fn pop_pair(&mut self) -> Result<(Value, Value), RuntimeError> {
        if self.stack.len() < 2 {
            return Err(RuntimeError::StackUnderflow);
        }

        let r = self.pop()?;
        let l = self.pop()?;
        Ok((l, r))
    }

    fn read_slot(&mut self, chunk: &Chunk) -> Result<Slot, RuntimeError> {
        let slot = chunk
            .code()
            .get(self.ip)
            .copied()
            .ok_or(RuntimeError::UnexpectedEnd)?;
        self.ip += 1;
        Ok(slot)
    }

    fn read_constant(&mut self, chunk: &Chunk) -> Result<Value, RuntimeError> {
        let index = match self.read_slot(chunk)? {
            Slot::Operand(index) => index,
            Slot::Op(op) => {
                return Err(RuntimeError::MissingOperand { found: op.to_str() })
            }
        };

        chunk.constants().get(index).copied().ok_or(
            RuntimeError::InvalidConstantIndex {
                index,
                len: chunk.constants().len(),
            },
        )
    }

    fn runtime_error(
        &self,
        chunk: &Chunk,
        offset: usize,
        error: RuntimeError,
    ) -> InterpretError {
        InterpretError::Runtime {
            error,
            offset,
            line: chunk.get_line(offset).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::WriterTracer;

    fn run(chunk: &Chunk) -> (Result<Value, InterpretError>, VM) {
        let mut vm = VM::new();
        let result = vm.interpret(chunk);
        (result, vm)
    }

    fn assert_close(value: Value, expected: f64) {
        assert!(
            (value.as_f64() - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            value
        );
    }

    #[test]
    fn adds_two_constants() {
        let mut chunk = Chunk::new();
        chunk.write_constant(1.2, 87);
        chunk.write_constant(3.4, 87);
        chunk.write_op(Opcode::Add, 87);
        chunk.write_op(Opcode::Return, 87);

        let (result, vm) = run(&chunk);
        assert_close(result.unwrap(), 4.6);
        assert_eq!(vm.state(), State::Halted);
        assert_eq!(vm.ip(), chunk.len());
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn operand_order_for_non_commutative_ops() {
        let mut chunk = Chunk::new();
        chunk.write_constant(10, 1);
        chunk.write_constant(4, 1);
        chunk.write_op(Opcode::Sub, 1);
        chunk.write_op(Opcode::Return, 1);
        assert_eq!(run(&chunk).0, Ok(Value::Integer(6)));

        let mut chunk = Chunk::new();
        chunk.write_constant(1, 1);
        chunk.write_constant(4, 1);
        chunk.write_op(Opcode::Div, 1);
        chunk.write_op(Opcode::Return, 1);
        assert_eq!(run(&chunk).0, Ok(Value::Float(0.25)));
    }

    #[test]
    fn negate() {
        let mut chunk = Chunk::new();
        chunk.write_constant(2.5, 1);
        chunk.write_op(Opcode::Negate, 1);
        chunk.write_op(Opcode::Return, 1);

        assert_eq!(run(&chunk).0, Ok(Value::Float(-2.5)));
    }

    #[test]
    fn division_by_zero_is_not_an_error() {
        let mut chunk = Chunk::new();
        chunk.write_constant(1, 1);
        chunk.write_constant(0, 1);
        chunk.write_op(Opcode::Div, 1);
        chunk.write_op(Opcode::Return, 1);

        let value = run(&chunk).0.unwrap();
        assert_eq!(value.as_f64(), f64::INFINITY);
    }

    #[test]
    fn underflow_leaves_stack_untouched() {
        let mut chunk = Chunk::new();
        chunk.write_constant(1, 4);
        chunk.write_op(Opcode::Mul, 5);
        chunk.write_op(Opcode::Return, 5);

        let (result, vm) = run(&chunk);
        assert_eq!(
            result,
            Err(InterpretError::Runtime {
                error: RuntimeError::StackUnderflow,
                offset: 2,
                line: 5,
            })
        );
        assert_eq!(vm.state(), State::Failed);
        assert_eq!(vm.stack(), &[Value::Integer(1)]);
    }

    #[test]
    fn negate_on_empty_stack() {
        let mut chunk = Chunk::new();
        chunk.write_op(Opcode::Negate, 1);
        chunk.write_op(Opcode::Return, 1);

        let (result, vm) = run(&chunk);
        assert_eq!(
            result,
            Err(InterpretError::Runtime {
                error: RuntimeError::StackUnderflow,
                offset: 0,
                line: 1,
            })
        );
        assert_eq!(vm.state(), State::Failed);
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn return_on_empty_stack() {
        let mut chunk = Chunk::new();
        chunk.write_op(Opcode::Return, 1);

        let mut vm = VM::with_tracer(WriterTracer::new(Vec::new()));
        assert_eq!(
            vm.interpret(&chunk),
            Err(InterpretError::Runtime {
                error: RuntimeError::StackUnderflow,
                offset: 0,
                line: 1,
            })
        );
        assert_eq!(vm.state(), State::Failed);
        assert!(vm.stack().is_empty());

        let trace = String::from_utf8(vm.into_tracer().finish().unwrap()).unwrap();
        assert_eq!(trace, "000000 06              1  Return\n");
        assert!(!trace.contains("Result:"));
    }

    #[test]
    fn invalid_constant_index() {
        let mut chunk = Chunk::new();
        chunk.add_constant(1);
        chunk.write_op(Opcode::Constant, 1);
        chunk.write(1usize, 1);
        chunk.write_op(Opcode::Return, 1);

        let (result, _) = run(&chunk);
        assert_eq!(
            result.unwrap_err().runtime_error(),
            Some(&RuntimeError::InvalidConstantIndex { index: 1, len: 1 })
        );
    }

    #[test]
    fn stray_operand_is_unknown_opcode() {
        let mut chunk = Chunk::new();
        chunk.write(42usize, 1);

        let (result, _) = run(&chunk);
        assert_eq!(
            result.unwrap_err().runtime_error(),
            Some(&RuntimeError::UnknownOpcode { raw: 42 })
        );
    }

    #[test]
    fn constant_followed_by_opcode() {
        let mut chunk = Chunk::new();
        chunk.add_constant(1);
        chunk.write_op(Opcode::Constant, 1);
        chunk.write_op(Opcode::Return, 1);

        let (result, _) = run(&chunk);
        assert_eq!(
            result.unwrap_err().runtime_error(),
            Some(&RuntimeError::MissingOperand { found: "Return" })
        );
    }

    #[test]
    fn running_off_the_end() {
        let mut chunk = Chunk::new();
        chunk.write_constant(1, 1);
        chunk.write_constant(2, 2);

        let (result, vm) = run(&chunk);
        assert_eq!(
            result,
            Err(InterpretError::Runtime {
                error: RuntimeError::UnexpectedEnd,
                offset: 4,
                line: 2,
            })
        );
        assert_eq!(vm.stack(), &[Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn empty_chunk_is_a_compile_error() {
        let (result, vm) = run(&Chunk::new());
        assert_eq!(result, Err(InterpretError::Compile(CompileError::EmptyChunk)));
        assert_eq!(vm.state(), State::Failed);
    }

    #[test]
    fn state_resets_between_runs() {
        let mut bad = Chunk::new();
        bad.write_constant(1, 1);
        bad.write_constant(2, 1);
        bad.write_op(Opcode::Add, 1);
        bad.write_op(Opcode::Add, 1);

        let mut good = Chunk::new();
        good.write_constant(3, 1);
        good.write_op(Opcode::Return, 1);

        let mut vm = VM::new();
        assert_eq!(vm.state(), State::Ready);
        assert!(vm.interpret(&bad).is_err());
        assert_eq!(vm.stack(), &[Value::Integer(3)]);

        assert_eq!(vm.interpret(&good), Ok(Value::Integer(3)));
        assert_eq!(vm.state(), State::Halted);
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn return_leaves_values_below_result() {
        let mut chunk = Chunk::new();
        chunk.write_constant(1, 1);
        chunk.write_constant(2, 1);
        chunk.write_op(Opcode::Return, 1);

        let (result, vm) = run(&chunk);
        assert_eq!(result, Ok(Value::Integer(2)));
        assert_eq!(vm.stack(), &[Value::Integer(1)]);
    }
}
