//! Stack-based bytecode virtual machine.
//!
//! Executes a compiled script function on a fixed-capacity value stack
//! with a fixed-capacity call-frame stack. The VM is the only component
//! that mutates runtime state: the stack, the frames, the globals table,
//! and (through allocation) the heap. Everything else — operators,
//! builtins — is a stateless helper it dispatches to.
//!
//! Each frame addresses a slot region on the shared value stack: the
//! caller-supplied arguments followed by the callee's locals, so local
//! slot N is always `stack[slots_base + N]`. `print` output goes through
//! the writer supplied at construction, which is how tests capture it.

use std::io::Write;

use crate::builtins;
use crate::bytecode::{Block, Op};
use crate::error::{Error, Result, RuntimeError};
use crate::operators;
use crate::table::Table;
use crate::value::{Heap, List, Obj, ObjRef, StructInstance, Value};

/// Fixed capacity of the value stack.
pub const STACK_SIZE: usize = 256;
/// Fixed capacity of the call-frame stack.
pub const MAX_FRAMES: usize = 256;

/// One activation record: the function being executed, the instruction
/// pointer into its block, and the slot region on the value stack.
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    function: ObjRef,
    ip: usize,
    /// First stack index of the caller-supplied argument region.
    slots_base: usize,
    /// Number of argument slots the caller supplied.
    slot_count: usize,
}

/// How a `CALL` resolves, copied out of the heap before dispatch.
enum Callee {
    Function { arity: u8 },
    Builtin {
        func: crate::value::BuiltinFn,
        parent: Option<ObjRef>,
        arity: u8,
    },
    Template { fields: Vec<(String, usize)> },
}

/// The bytecode interpreter.
pub struct Vm<'h, 'w, W: Write> {
    heap: &'h mut Heap,
    stack: [Value; STACK_SIZE],
    sp: usize,
    frames: Vec<CallFrame>,
    globals: Table,
    out: &'w mut W,
    trace: bool,
}

impl<'h, 'w, W: Write> Vm<'h, 'w, W> {
    /// Build a VM around a heap and an output writer; the globals table
    /// starts with the host builtins installed.
    pub fn new(heap: &'h mut Heap, out: &'w mut W) -> Self {
        let mut globals = Table::new();
        builtins::install(heap, &mut globals);
        Vm {
            heap,
            stack: [Value::Null; STACK_SIZE],
            sp: 0,
            frames: Vec::new(),
            globals,
            out,
            trace: false,
        }
    }

    /// Print each instruction and the stack to stderr while running.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Execute a compiled script function.
    ///
    /// Returns the process exit code: 0 on a normal finish, or the value
    /// an `exit` statement produced.
    pub fn interpret(&mut self, script: ObjRef) -> Result<i32> {
        self.frames.push(CallFrame {
            function: script,
            ip: 0,
            slots_base: 0,
            slot_count: 0,
        });
        self.run().map_err(Error::from)
    }

    // -----------------------------------------------------------------------
    // Fetch/decode/execute loop
    // -----------------------------------------------------------------------

    fn run(&mut self) -> std::result::Result<i32, RuntimeError> {
        loop {
            let frame = *self.frames.last().unwrap();
            if frame.ip >= self.block_of(frame.function).code.len() {
                return Ok(0);
            }
            if self.trace {
                self.trace_instruction(frame);
            }

            let byte = self.fetch_byte();
            let op = Op::try_from(byte).map_err(|_| RuntimeError::UnknownOpcode(byte))?;
            match op {
                Op::Nop => {}
                Op::Pop => {
                    self.pop()?;
                }
                Op::Dupe => {
                    let top = self.peek(0)?;
                    self.push(top)?;
                }
                Op::Swap => {
                    let a = self.pop()?;
                    let b = self.pop()?;
                    self.push(a)?;
                    self.push(b)?;
                }
                Op::Exit => {
                    let value = self.pop()?;
                    match value {
                        Value::Number(code) => return Ok(code as i32),
                        other => {
                            return Err(RuntimeError::Type {
                                expected: "number",
                                got: other.type_name(self.heap),
                            });
                        }
                    }
                }
                Op::Return => {
                    let frame = *self.frames.last().unwrap();
                    // Anything above the slot region is the return value.
                    let result = if self.sp > frame.slots_base + frame.slot_count {
                        self.pop()?
                    } else {
                        Value::Null
                    };
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(0);
                    }
                    // Discard the callee's arguments and the callable.
                    self.sp = frame.slots_base - 1;
                    self.push(result)?;
                }
                Op::Print => {
                    let value = self.pop()?;
                    let text = self.heap.display(value);
                    writeln!(self.out, "{}", text)
                        .map_err(|e| RuntimeError::Io(e.to_string()))?;
                }
                Op::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(!value.is_truthy()))?;
                }
                Op::Negate => {
                    let value = self.pop()?;
                    match value {
                        Value::Number(n) => self.push(Value::Number(-n))?,
                        other => {
                            return Err(RuntimeError::Type {
                                expected: "number",
                                got: other.type_name(self.heap),
                            });
                        }
                    }
                }
                Op::Add
                | Op::Sub
                | Op::Mul
                | Op::Div
                | Op::Lt
                | Op::Gt
                | Op::Lte
                | Op::Gte => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = operators::binary(self.heap, op, a, b)?;
                    self.push(result)?;
                }
                Op::Eq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(operators::equals(a, b)))?;
                }
                Op::Neq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(!operators::equals(a, b)))?;
                }
                Op::Constant => {
                    let index = self.fetch_byte() as usize;
                    let frame = self.frames.last().unwrap();
                    let value = self.block_of(frame.function).constants[index];
                    self.push(value)?;
                }
                Op::GlobalDefine => {
                    let name_value = self.pop()?;
                    let name_ref = self.string_ref(name_value)?;
                    let name = self.heap.as_str(name_ref);
                    self.globals.set(name, Value::Null);
                }
                Op::GlobalSet => {
                    let name_value = self.pop()?;
                    let value = self.pop()?;
                    let name_ref = self.string_ref(name_value)?;
                    let name = self.heap.as_str(name_ref);
                    self.globals.set(name, value);
                }
                Op::GlobalGet => {
                    let name_value = self.pop()?;
                    let name_ref = self.string_ref(name_value)?;
                    let value = {
                        let name = self.heap.as_str(name_ref);
                        self.globals
                            .get(name)
                            .ok_or_else(|| RuntimeError::UndefinedGlobal(name.to_string()))?
                    };
                    self.push(value)?;
                }
                Op::LocalGet => {
                    let slot = self.fetch_byte() as usize;
                    let frame = self.frames.last().unwrap();
                    let value = self.stack[frame.slots_base + slot];
                    self.push(value)?;
                }
                Op::LocalSet => {
                    let slot = self.fetch_byte() as usize;
                    let frame = *self.frames.last().unwrap();
                    let value = self.peek(0)?;
                    self.stack[frame.slots_base + slot] = value;
                    // The assigned value is consumed unless it *is* the slot.
                    if self.sp > frame.slots_base + slot + 1 {
                        self.pop()?;
                    }
                }
                Op::FieldGet => {
                    let name_value = self.pop()?;
                    let receiver = self.pop()?;
                    let name_ref = self.string_ref(name_value)?;
                    let result = self.field_get(receiver, name_ref)?;
                    self.push(result)?;
                }
                Op::FieldSet => {
                    let name_value = self.pop()?;
                    let value = self.pop()?;
                    let receiver = self.pop()?;
                    let name_ref = self.string_ref(name_value)?;
                    let name = self.heap.as_str(name_ref).to_string();
                    let obj = match receiver {
                        Value::Obj(r) => r,
                        other => {
                            return Err(RuntimeError::Type {
                                expected: "struct instance",
                                got: other.type_name(self.heap),
                            });
                        }
                    };
                    match self.heap.get_mut(obj) {
                        Obj::StructInstance(instance) => {
                            instance.fields.set(&name, value);
                        }
                        other => {
                            return Err(RuntimeError::Type {
                                expected: "struct instance",
                                got: other.type_name(),
                            });
                        }
                    }
                }
                Op::List => {
                    let count_value = self.pop()?;
                    let count = match count_value {
                        Value::Number(n) => n as usize,
                        other => {
                            return Err(RuntimeError::Type {
                                expected: "number",
                                got: other.type_name(self.heap),
                            });
                        }
                    };
                    if count > self.sp {
                        return Err(RuntimeError::StackUnderflow);
                    }
                    let start = self.sp - count;
                    let elements = self.stack[start..self.sp].to_vec();
                    self.sp = start;
                    let list = self.heap.alloc(Obj::List(List {
                        elements,
                        methods: Table::new(),
                    }));
                    builtins::bind_list_methods(self.heap, list);
                    self.push(Value::Obj(list))?;
                }
                Op::Index => {
                    let index_value = self.pop()?;
                    let receiver = self.pop()?;
                    let index = match index_value {
                        Value::Number(n) => n as i64,
                        other => {
                            return Err(RuntimeError::Type {
                                expected: "number",
                                got: other.type_name(self.heap),
                            });
                        }
                    };
                    let element = self.index_list(receiver, index)?;
                    self.push(element)?;
                }
                Op::Jump => {
                    let offset = self.fetch_u16() as usize;
                    self.frames.last_mut().unwrap().ip += offset;
                }
                Op::JumpBack => {
                    let offset = self.fetch_u16() as usize;
                    self.frames.last_mut().unwrap().ip -= offset;
                }
                Op::CJumpF => {
                    let offset = self.fetch_u16() as usize;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.frames.last_mut().unwrap().ip += offset;
                    }
                }
                Op::CJumpT => {
                    let offset = self.fetch_u16() as usize;
                    let condition = self.pop()?;
                    if condition.is_truthy() {
                        self.frames.last_mut().unwrap().ip += offset;
                    }
                }
                Op::Call => {
                    let argc = self.fetch_byte() as usize;
                    self.call_value(argc)?;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Dispatch a `CALL argc`: the callable sits below the arguments.
    fn call_value(&mut self, argc: usize) -> std::result::Result<(), RuntimeError> {
        let callee_value = self.peek(argc)?;
        let callee_ref = match callee_value {
            Value::Obj(r) => r,
            _ => return Err(RuntimeError::NotCallable),
        };
        let callee = match self.heap.get(callee_ref) {
            Obj::Function(f) => Callee::Function { arity: f.arity },
            Obj::Builtin(b) => Callee::Builtin {
                func: b.func,
                parent: b.parent,
                arity: b.arity,
            },
            Obj::StructTemplate(t) => {
                let fields = t
                    .fields
                    .iter()
                    .map(|(name, ordinal)| {
                        let ordinal = match ordinal {
                            Value::Number(n) => n as usize,
                            _ => 0,
                        };
                        (name.to_string(), ordinal)
                    })
                    .collect();
                Callee::Template { fields }
            }
            _ => return Err(RuntimeError::NotCallable),
        };

        match callee {
            Callee::Function { arity } => {
                if arity as usize != argc {
                    return Err(RuntimeError::ArityMismatch {
                        expected: arity as usize,
                        got: argc,
                    });
                }
                if self.frames.len() == MAX_FRAMES {
                    return Err(RuntimeError::FrameOverflow);
                }
                self.frames.push(CallFrame {
                    function: callee_ref,
                    ip: 0,
                    slots_base: self.sp - argc,
                    slot_count: argc,
                });
            }
            Callee::Builtin {
                func,
                parent,
                arity,
            } => {
                if arity as usize != argc {
                    return Err(RuntimeError::ArityMismatch {
                        expected: arity as usize,
                        got: argc,
                    });
                }
                let start = self.sp - argc;
                let result = func(self.heap, parent, &self.stack[start..self.sp])?;
                // Arguments plus the callable itself.
                self.sp = start - 1;
                self.push(result)?;
            }
            Callee::Template { fields } => {
                if fields.len() != argc {
                    return Err(RuntimeError::ArityMismatch {
                        expected: fields.len(),
                        got: argc,
                    });
                }
                let start = self.sp - argc;
                let mut instance_fields = Table::new();
                for (name, ordinal) in &fields {
                    instance_fields.set(name, self.stack[start + ordinal]);
                }
                let instance = self.heap.alloc(Obj::StructInstance(StructInstance {
                    template: callee_ref,
                    fields: instance_fields,
                }));
                self.sp = start - 1;
                self.push(Value::Obj(instance))?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Field & index helpers
    // -----------------------------------------------------------------------

    /// `FIELD_GET` on a struct instance reads the field; on a list it
    /// resolves a bound method builtin.
    fn field_get(
        &self,
        receiver: Value,
        name_ref: ObjRef,
    ) -> std::result::Result<Value, RuntimeError> {
        let obj = match receiver {
            Value::Obj(r) => r,
            other => {
                return Err(RuntimeError::Type {
                    expected: "struct instance or list",
                    got: other.type_name(self.heap),
                });
            }
        };
        match self.heap.get(obj) {
            Obj::StructInstance(instance) => {
                let name = self.heap.as_str(name_ref);
                instance
                    .fields
                    .get(name)
                    .ok_or_else(|| RuntimeError::UndefinedField(name.to_string()))
            }
            Obj::List(list) => {
                let name = self.heap.as_str(name_ref);
                list.methods
                    .get(name)
                    .ok_or_else(|| RuntimeError::UndefinedMethod(name.to_string()))
            }
            other => Err(RuntimeError::Type {
                expected: "struct instance or list",
                got: other.type_name(),
            }),
        }
    }

    fn index_list(
        &self,
        receiver: Value,
        index: i64,
    ) -> std::result::Result<Value, RuntimeError> {
        let obj = match receiver {
            Value::Obj(r) => r,
            other => {
                return Err(RuntimeError::Type {
                    expected: "list",
                    got: other.type_name(self.heap),
                });
            }
        };
        match self.heap.get(obj) {
            Obj::List(list) => {
                if index < 0 || index as usize >= list.elements.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        index,
                        len: list.elements.len(),
                    });
                }
                Ok(list.elements[index as usize])
            }
            other => Err(RuntimeError::Type {
                expected: "list",
                got: other.type_name(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Stack & fetch primitives
    // -----------------------------------------------------------------------

    fn push(&mut self, value: Value) -> std::result::Result<(), RuntimeError> {
        if self.sp == STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> std::result::Result<Value, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    fn peek(&self, depth: usize) -> std::result::Result<Value, RuntimeError> {
        if self.sp < depth + 1 {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack[self.sp - depth - 1])
    }

    fn fetch_byte(&mut self) -> u8 {
        let (function, ip) = {
            let frame = self.frames.last().unwrap();
            (frame.function, frame.ip)
        };
        let byte = self.block_of(function).code[ip];
        self.frames.last_mut().unwrap().ip += 1;
        byte
    }

    fn fetch_u16(&mut self) -> u16 {
        let hi = self.fetch_byte();
        let lo = self.fetch_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn block_of(&self, function: ObjRef) -> &Block {
        match self.heap.get(function) {
            Obj::Function(f) => &f.block,
            _ => unreachable!("frame does not reference a function"),
        }
    }

    /// A value that must be an interned name string.
    fn string_ref(&self, value: Value) -> std::result::Result<ObjRef, RuntimeError> {
        match value {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Str(_)) => Ok(r),
            other => Err(RuntimeError::Type {
                expected: "string",
                got: other.type_name(self.heap),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Debug trace
    // -----------------------------------------------------------------------

    /// One line per instruction: disassembly plus the current stack.
    fn trace_instruction(&self, frame: CallFrame) {
        let (text, _) = self.block_of(frame.function).disassemble_at(self.heap, frame.ip);
        let mut stack_text = String::new();
        for i in 0..self.sp {
            stack_text.push_str(&format!("[ {} ]", self.heap.display(self.stack[i])));
        }
        eprintln!("{:<40} {}", text, stack_text);
    }
}
