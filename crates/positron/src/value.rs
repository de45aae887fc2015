//! Runtime value representation and the object heap.
//!
//! [`Value`] is the universal tagged type flowing through the stack, the
//! globals table, and constant pools. It is `Copy`: heap-backed variants
//! carry an [`ObjRef`] — an index into the [`Heap`] arena — instead of a
//! pointer. The arena owns every object for the lifetime of the program;
//! there is no incremental reclamation, everything is dropped with the
//! heap at teardown.
//!
//! Strings are interned: allocating the same text twice yields the same
//! `ObjRef`, which lets name constants be shared between blocks and field
//! lookups stay cheap.

use crate::bytecode::Block;
use crate::error::RuntimeError;
use crate::table::Table;

/// Index of an object in the [`Heap`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjRef(u32);

/// A runtime value.
///
/// The derived `PartialEq` backs constant-pool deduplication only; the
/// language's `==` lives in `operators::equals` and compares numbers alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// The single numeric type. Integer-valued numbers print without a
    /// decimal point.
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    /// Truthiness: null is false, bools are themselves, numbers are true
    /// when nonzero, heap references are always true.
    pub fn is_truthy(self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Number(n) => n != 0.0,
            Value::Obj(_) => true,
        }
    }

    /// Name of the value's variant, for error messages.
    pub fn type_name(self, heap: &Heap) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Obj(r) => heap.get(r).type_name(),
        }
    }
}

/// Host builtin entry point: `(heap, bound receiver, arguments) -> value`.
pub type BuiltinFn =
    fn(&mut Heap, Option<ObjRef>, &[Value]) -> Result<Value, RuntimeError>;

/// A user-defined function: a name, an arity, and a compiled block.
pub struct Function {
    pub name: ObjRef,
    pub arity: u8,
    pub block: Block,
}

/// A host-provided function. List methods are builtins whose `parent`
/// is the owning list.
pub struct Builtin {
    pub parent: Option<ObjRef>,
    pub name: ObjRef,
    pub arity: u8,
    pub func: BuiltinFn,
}

/// A struct declaration: field name → field ordinal (as a Number).
pub struct StructTemplate {
    pub name: ObjRef,
    pub fields: Table,
}

/// An instantiated struct: field name → value.
pub struct StructInstance {
    pub template: ObjRef,
    pub fields: Table,
}

/// An ordered sequence of values plus its bound method table.
pub struct List {
    pub elements: Vec<Value>,
    pub methods: Table,
}

/// A heap-allocated object.
pub enum Obj {
    Str(Box<str>),
    Function(Function),
    Builtin(Builtin),
    StructTemplate(StructTemplate),
    StructInstance(StructInstance),
    List(List),
}

impl Obj {
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::Str(_) => "string",
            Obj::Function(_) => "function",
            Obj::Builtin(_) => "builtin",
            Obj::StructTemplate(_) => "struct template",
            Obj::StructInstance(_) => "struct instance",
            Obj::List(_) => "list",
        }
    }
}

/// Owned arena of every heap object in the program.
///
/// Objects are only ever appended; an `ObjRef` handed out once stays valid
/// until the heap is dropped.
pub struct Heap {
    objects: Vec<Obj>,
    /// Interned strings: content → `Value::Obj` of the canonical string.
    strings: Table,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            objects: Vec::new(),
            strings: Table::new(),
        }
    }

    /// Move an object into the arena and return its handle.
    pub fn alloc(&mut self, object: Obj) -> ObjRef {
        let index = self.objects.len() as u32;
        self.objects.push(object);
        ObjRef(index)
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        &self.objects[r.0 as usize]
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        &mut self.objects[r.0 as usize]
    }

    /// Iterate every allocated object.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &Obj)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjRef(i as u32), o))
    }

    /// Intern a string, reusing the existing object for equal content.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        if let Some(Value::Obj(r)) = self.strings.get(text) {
            return r;
        }
        let r = self.alloc(Obj::Str(text.into()));
        self.strings.set(text, Value::Obj(r));
        r
    }

    /// The text of a string object. Panics on a non-string reference; the
    /// compiler only emits string refs where names are expected.
    pub fn as_str(&self, r: ObjRef) -> &str {
        match self.get(r) {
            Obj::Str(s) => s,
            other => panic!("expected string object, found {}", other.type_name()),
        }
    }

    /// Render a value for `print` and the disassembler.
    pub fn display(&self, value: Value) -> String {
        let mut seen = Vec::new();
        self.display_inner(value, &mut seen)
    }

    fn display_inner(&self, value: Value, seen: &mut Vec<ObjRef>) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Obj(r) => match self.get(r) {
                Obj::Str(s) => s.to_string(),
                Obj::Function(f) => format!("<fn {}>", self.as_str(f.name)),
                Obj::Builtin(b) => format!("<builtin {}>", self.as_str(b.name)),
                Obj::StructTemplate(t) => format!("<struct {}>", self.as_str(t.name)),
                Obj::StructInstance(i) => {
                    let name = match self.get(i.template) {
                        Obj::StructTemplate(t) => self.as_str(t.name),
                        _ => "struct",
                    };
                    format!("<{} instance>", name)
                }
                Obj::List(list) => {
                    // A list can contain itself; cut the recursion off.
                    if seen.contains(&r) {
                        return "[...]".to_string();
                    }
                    seen.push(r);
                    let items: Vec<String> = list
                        .elements
                        .iter()
                        .map(|v| self.display_inner(*v, seen))
                        .collect();
                    seen.pop();
                    format!("[{}]", items.join(", "))
                }
            },
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        let mut heap = Heap::new();
        let s = heap.intern("hi");
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(-3.0).is_truthy());
        assert!(Value::Obj(s).is_truthy());
    }

    #[test]
    fn interning_reuses_objects() {
        let mut heap = Heap::new();
        let a = heap.intern("name");
        let b = heap.intern("name");
        let c = heap.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn integer_valued_numbers_print_without_decimal() {
        let heap = Heap::new();
        assert_eq!(heap.display(Value::Number(7.0)), "7");
        assert_eq!(heap.display(Value::Number(2.5)), "2.5");
        assert_eq!(heap.display(Value::Number(-0.5)), "-0.5");
    }

    #[test]
    fn self_referential_list_display_terminates() {
        let mut heap = Heap::new();
        let list = heap.alloc(Obj::List(List {
            elements: Vec::new(),
            methods: Table::new(),
        }));
        if let Obj::List(l) = heap.get_mut(list) {
            l.elements.push(Value::Obj(list));
            l.elements.push(Value::Number(1.0));
        }
        assert_eq!(heap.display(Value::Obj(list)), "[[...], 1]");
    }
}
