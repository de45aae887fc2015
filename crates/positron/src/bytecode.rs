//! Bytecode instruction set and the compiled block representation.
//!
//! A [`Block`] is a function body's compiled form: a flat byte stream of
//! opcodes and operands plus an indexed constant pool. The compiler emits
//! into it, the VM fetches from it, and the disassembler renders it for
//! the `-d` debug mode.
//!
//! Encoding is byte-oriented: every opcode is one byte, followed by zero,
//! one, or two operand bytes depending on the instruction family. Jump
//! operands are two bytes, big-endian, unsigned, and measured relative to
//! the byte immediately after the operand pair — forward jumps add the
//! offset to the instruction pointer, [`Op::JumpBack`] subtracts it.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::value::{Heap, Value};

/// Maximum number of constants addressable by a one-byte pool index.
pub const MAX_CONSTANTS: usize = 256;

/// One opcode. The discriminant is the encoded byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Op {
    // --- Zero-operand (1 byte) ---
    Nop,
    Pop,
    Dupe,
    Swap,
    Exit,
    Return,
    Print,
    Not,
    Negate,
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
    GlobalDefine,
    GlobalSet,
    GlobalGet,
    FieldGet,
    FieldSet,
    List,
    Index,

    // --- One-byte operand (2 bytes) ---
    /// Push `constants[k]`.
    Constant,
    /// Call the value sitting below `argc` arguments.
    Call,
    /// Push the frame slot at the operand index.
    LocalGet,
    /// Write the top of stack into the frame slot at the operand index.
    LocalSet,

    // --- Two-byte big-endian operand (3 bytes) ---
    /// Unconditional forward jump.
    Jump,
    /// Unconditional backward jump.
    JumpBack,
    /// Pop the condition; jump forward when it is false.
    CJumpF,
    /// Pop the condition; jump forward when it is true.
    CJumpT,
}

impl Op {
    /// How many operand bytes follow the opcode byte.
    pub fn operand_bytes(self) -> usize {
        match self {
            Op::Constant | Op::Call | Op::LocalGet | Op::LocalSet => 1,
            Op::Jump | Op::JumpBack | Op::CJumpF | Op::CJumpT => 2,
            _ => 0,
        }
    }

    /// The mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            Op::Nop => "NOP",
            Op::Pop => "POP",
            Op::Dupe => "DUPE",
            Op::Swap => "SWAP",
            Op::Exit => "EXIT",
            Op::Return => "RETURN",
            Op::Print => "PRINT",
            Op::Not => "NOT",
            Op::Negate => "NEGATE",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Lt => "LT",
            Op::Gt => "GT",
            Op::Lte => "LTE",
            Op::Gte => "GTE",
            Op::Eq => "EQ",
            Op::Neq => "NEQ",
            Op::GlobalDefine => "GLOBAL_DEFINE",
            Op::GlobalSet => "GLOBAL_SET",
            Op::GlobalGet => "GLOBAL_GET",
            Op::FieldGet => "FIELD_GET",
            Op::FieldSet => "FIELD_SET",
            Op::List => "LIST",
            Op::Index => "INDEX",
            Op::Constant => "CONSTANT",
            Op::Call => "CALL",
            Op::LocalGet => "LOCAL_GET",
            Op::LocalSet => "LOCAL_SET",
            Op::Jump => "JUMP",
            Op::JumpBack => "JUMP_BACK",
            Op::CJumpF => "CJUMPF",
            Op::CJumpT => "CJUMPT",
        }
    }
}

/// A unit of compiled bytecode plus its constant pool.
pub struct Block {
    /// The opcode/operand byte stream.
    pub code: Vec<u8>,
    /// Values referenced by `CONSTANT` operands. At most
    /// [`MAX_CONSTANTS`] entries so indices fit in one byte.
    pub constants: Vec<Value>,
}

impl Block {
    pub fn new() -> Self {
        Block {
            code: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Append one opcode.
    pub fn write_op(&mut self, op: Op) {
        self.code.push(op.into());
    }

    /// Append an opcode followed by a one-byte operand.
    pub fn write_op_byte(&mut self, op: Op, operand: u8) {
        self.code.push(op.into());
        self.code.push(operand);
    }

    /// Append a raw operand byte.
    pub fn write_byte(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Add a value to the constant pool and return its index, reusing the
    /// slot of an identical existing constant. `None` when the pool is
    /// already at [`MAX_CONSTANTS`] entries.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        if let Some(index) = self.constants.iter().position(|c| *c == value) {
            return Some(index as u8);
        }
        if self.constants.len() == MAX_CONSTANTS {
            return None;
        }
        self.constants.push(value);
        Some((self.constants.len() - 1) as u8)
    }

    /// Render the whole block, one instruction per line.
    pub fn disassemble(&self, name: &str, heap: &Heap) -> String {
        let mut text = format!("== {} ==\n", name);
        let mut offset = 0;
        while offset < self.code.len() {
            let (line, length) = self.disassemble_at(heap, offset);
            text.push_str(&line);
            text.push('\n');
            offset += length;
        }
        text
    }

    /// Render the instruction at `offset` and return its byte length
    /// (1, 2, or 3 depending on the instruction family).
    pub fn disassemble_at(&self, heap: &Heap, offset: usize) -> (String, usize) {
        let byte = self.code[offset];
        let op = match Op::try_from(byte) {
            Ok(op) => op,
            Err(_) => return (format!("{:04} ??? {:#04x}", offset, byte), 1),
        };
        let text = match op {
            Op::Constant => {
                let index = self.code[offset + 1];
                let value = self.constants[index as usize];
                format!(
                    "{:04} {:<14} {:3} '{}'",
                    offset,
                    op.name(),
                    index,
                    heap.display(value)
                )
            }
            Op::Call | Op::LocalGet | Op::LocalSet => {
                format!("{:04} {:<14} {:3}", offset, op.name(), self.code[offset + 1])
            }
            Op::Jump | Op::CJumpF | Op::CJumpT | Op::JumpBack => {
                let operand =
                    u16::from_be_bytes([self.code[offset + 1], self.code[offset + 2]]) as usize;
                let after = offset + 3;
                let target = if op == Op::JumpBack {
                    after - operand
                } else {
                    after + operand
                };
                format!("{:04} {:<14} {:3} -> {:04}", offset, op.name(), operand, target)
            }
            _ => format!("{:04} {}", offset, op.name()),
        };
        (text, 1 + op.operand_bytes())
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bytes_round_trip() {
        for byte in 0..=u8::MAX {
            if let Ok(op) = Op::try_from(byte) {
                let encoded: u8 = op.into();
                assert_eq!(encoded, byte);
            }
        }
        assert!(Op::try_from(0xff).is_err());
    }

    #[test]
    fn constant_pool_caps_at_256_entries() {
        let mut block = Block::new();
        for i in 0..MAX_CONSTANTS {
            assert_eq!(block.add_constant(Value::Number(i as f64)), Some(i as u8));
        }
        assert_eq!(block.add_constant(Value::Number(9999.0)), None);
    }

    #[test]
    fn identical_constants_share_a_slot() {
        let mut block = Block::new();
        let a = block.add_constant(Value::Number(1.0)).unwrap();
        let b = block.add_constant(Value::Number(1.0)).unwrap();
        let c = block.add_constant(Value::Bool(true)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(block.constants.len(), 2);
    }

    #[test]
    fn disassembled_lengths_match_instruction_families() {
        let heap = Heap::new();
        let mut block = Block::new();
        block.write_op(Op::Add);
        let k = block.add_constant(Value::Number(1.0)).unwrap();
        block.write_op_byte(Op::Constant, k);
        block.write_op(Op::Jump);
        block.write_byte(0);
        block.write_byte(4);

        let (_, len) = block.disassemble_at(&heap, 0);
        assert_eq!(len, 1);
        let (text, len) = block.disassemble_at(&heap, 1);
        assert_eq!(len, 2);
        assert!(text.contains("CONSTANT"));
        assert!(text.contains("'1'"));
        let (text, len) = block.disassemble_at(&heap, 3);
        assert_eq!(len, 3);
        // Forward target: operand 4 relative to the byte after the pair.
        assert!(text.contains("-> 0010"));
    }
}
