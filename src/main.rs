use std::{env::args, io, process::exit};

use rvm::{Chunk, InterpretError, NoTrace, Opcode, VM, WriterTracer};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if args().len() != 1 {
        eprintln!("Usage: rvm");
        exit(64);
    }

    let chunk = demo_chunk();
    print!("{}", chunk.disassemble("demo"));
    println!();

    if let Err(error) = chunk.verify() {
        eprintln!("{}", error);
        exit(65);
    }

    let result = if cfg!(feature = "debug_trace") {
        let mut vm = VM::with_tracer(WriterTracer::new(io::stdout()));
        let result = vm.interpret(&chunk);
        vm.into_tracer().finish()?;
        result
    } else {
        let result = VM::with_tracer(NoTrace).interpret(&chunk);
        if let Ok(value) = &result {
            println!("Result: {}", value);
        }
        result
    };

    match result {
        Err(error @ InterpretError::Runtime { .. }) => {
            eprintln!("{}", error);
            exit(70)
        }
        Err(error @ InterpretError::Compile(_)) => {
            eprintln!("{}", error);
            exit(65)
        }
        Ok(_) => Ok(()),
    }
}

/// -((1.2 + 3.4) / 2 * 10 - 1.5 - 1.5)
fn demo_chunk() -> Chunk {
    let mut chunk = Chunk::new();

    chunk.write_constant(1.2, 87);
    chunk.write_constant(3.4, 87);
    chunk.write_op(Opcode::Add, 87);

    chunk.write_constant(2, 87);
    chunk.write_op(Opcode::Div, 87);

    chunk.write_constant(10, 87);
    chunk.write_op(Opcode::Mul, 87);

    for _ in 0..2 {
        chunk.write_constant(1.5, 87);
        chunk.write_op(Opcode::Sub, 87);
    }

    chunk.write_op(Opcode::Negate, 87);
    chunk.write_op(Opcode::Return, 87);

    chunk
}
