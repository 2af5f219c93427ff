//! Text rendering of chunk contents for listings and execution traces.
//!
//! A rendered instruction looks like
//!
//! ```text
//! 000000 00 00          87  Constant            0 '1.2'
//! 000002 00 01           |  Constant            1 '3.4'
//! 000004 01              |  Add
//! ```
//!
//! offset, raw tokens padded to four columns, source line (or `|` when it
//! repeats the previous instruction's line), then the mnemonic.

use crate::{
    chunk::{Chunk, Opcode, Slot},
    value::Value,
};

const TOKEN_COLUMNS: usize = 4;

/// Renders the instruction at `offset` and returns it together with the
/// offset of the next instruction.
///
/// Never panics on malformed code: a stray operand renders as an unknown
/// opcode, and a constant without an operand is shown as such.
pub fn instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let code = chunk.code();
    let width = match code.get(offset) {
        Some(Slot::Op(Opcode::Constant)) => match code.get(offset + 1) {
            Some(Slot::Operand(_)) => Opcode::Constant.width(),
            _ => 1,
        },
        Some(Slot::Op(op)) => op.width(),
        _ => 1,
    };
    let next = offset.saturating_add(width);

    let mut text = format!("{:06} ", offset);

    let tokens = code.get(offset..next.min(code.len())).unwrap_or(&[]);
    for slot in tokens {
        text.push_str(&format!("{:02} ", slot.raw()));
    }
    for _ in tokens.len()..TOKEN_COLUMNS {
        text.push_str("   ");
    }

    text.push_str(&line_column(chunk, offset));

    match code.get(offset) {
        Some(Slot::Op(Opcode::Constant)) => {
            text.push_str(&constant_instruction(chunk, offset))
        }
        Some(Slot::Op(op)) => text.push_str(op.to_str()),
        Some(Slot::Operand(n)) => {
            text.push_str(&format!("Unknown opcode {}", n))
        }
        None => text.push_str("<end of code>"),
    }

    (text, next)
}

fn line_column(chunk: &Chunk, offset: usize) -> String {
    if offset >= chunk.len() {
        return "    ?  ".to_string();
    }

    let line = chunk.get_line(offset);

    if offset > 0 && line == chunk.get_line(offset - 1) {
        "    |  ".to_string()
    } else {
        match line {
            Some(line) => format!("{:>5}  ", line),
            None => "    ?  ".to_string(),
        }
    }
}

fn constant_instruction(chunk: &Chunk, offset: usize) -> String {
    let name = Opcode::Constant.to_str();

    match chunk.code().get(offset + 1) {
        Some(&Slot::Operand(index)) => {
            let value = chunk
                .constants()
                .get(index)
                .map(Value::to_string)
                .unwrap_or_else(|| "<invalid>".to_string());
            format!("{:<16} {:4} '{}'", name, index, value)
        }
        _ => format!("{:<16} <missing operand>", name),
    }
}

/// Renders a stack bottom to top as `[ v1 , v2 , ... ]`.
pub fn stack(values: &[Value]) -> String {
    let values: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("[ {} ]", values.join(" , "))
}
