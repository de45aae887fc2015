//! Positron — a small dynamically-typed scripting language.
//!
//! The crate is the classic single-pass triple: a hand-written lexer feeds
//! a Pratt compiler that emits bytecode straight into per-function blocks,
//! and a stack-based virtual machine with call frames executes the result.
//! There is no AST and no serialized bytecode format; source goes in,
//! effects come out.
//!
//! # Quick start
//!
//! ```
//! let mut out = Vec::new();
//! let code = positron::interpret("print 1 + 2 * 3;", "example", &mut out).unwrap();
//! assert_eq!(code, 0);
//! assert_eq!(out, b"7\n");
//! ```
//!
//! # Language sketch
//!
//! ```text
//! let total = 0;
//! for (let i = 0; i < 5; i = i + 1) total = total + i;
//! print total;                      // 10
//!
//! fun add(a, b) { return a + b; }
//! print add(2, 40);                 // 42
//!
//! struct Point { x, y }
//! let p = Point(3, 4);
//! print p.x + p.y;                  // 7
//!
//! let xs = [10, 20, 30];
//! print xs:1;                       // 20 — ':' is the subscript operator
//! xs.add(40);
//! print xs.size();                  // 4
//! ```
//!
//! Values are null, bools, 64-bit float numbers, and heap objects
//! (strings, functions, builtins, struct templates and instances, lists).
//! All heap objects live in a [`Heap`] arena until program end. Runtime
//! faults (type errors, division by zero, bad indexing, arity mismatches)
//! terminate execution with a [`RuntimeError`]; parse errors are collected
//! across the whole source and reported together.

mod builtins;
mod bytecode;
mod compiler;
mod error;
mod lexer;
mod operators;
mod table;
mod value;
mod vm;

pub use bytecode::{Block, Op, MAX_CONSTANTS};
pub use compiler::compile;
pub use error::{CompileErrors, Diagnostic, Error, Result, RuntimeError};
pub use lexer::{Lexer, Token, TokenKind};
pub use table::Table;
pub use value::{Heap, Obj, ObjRef, Value};
pub use vm::{Vm, MAX_FRAMES, STACK_SIZE};

/// Compile and run a source buffer, writing `print` output to `out`.
///
/// Returns the process exit code: 0 for a normal finish, or the operand
/// of an `exit` statement.
pub fn interpret<W: std::io::Write>(source: &str, name: &str, out: &mut W) -> Result<i32> {
    let mut heap = Heap::new();
    let script = compile(source, name, &mut heap)?;
    Vm::new(&mut heap, out).interpret(script)
}
