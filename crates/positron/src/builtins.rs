//! Host-provided builtin functions and list methods.
//!
//! Builtins all share one calling convention: they receive the heap, an
//! optional bound receiver, and the evaluated arguments, and return a
//! value or a runtime error. Free builtins (like `abs`) live in the
//! globals table with no receiver; list methods are builtins whose
//! `parent` is the owning list, created when the list is.

use crate::error::RuntimeError;
use crate::table::Table;
use crate::value::{Builtin, Heap, Obj, ObjRef, Value};

/// Names seeded into the compiler's known-global set.
pub const NAMES: &[&str] = &["abs"];

/// Register every free builtin in a globals table.
pub fn install(heap: &mut Heap, globals: &mut Table) {
    let name = heap.intern("abs");
    let r = heap.alloc(Obj::Builtin(Builtin {
        parent: None,
        name,
        arity: 1,
        func: native_abs,
    }));
    globals.set("abs", Value::Obj(r));
}

/// Attach the method table to a freshly allocated list.
pub fn bind_list_methods(heap: &mut Heap, list: ObjRef) {
    let mut methods = Table::new();
    for (name, arity, func) in [
        ("size", 0, list_size as crate::value::BuiltinFn),
        ("add", 1, list_add as crate::value::BuiltinFn),
    ] {
        let name_ref = heap.intern(name);
        let r = heap.alloc(Obj::Builtin(Builtin {
            parent: Some(list),
            name: name_ref,
            arity,
            func,
        }));
        methods.set(name, Value::Obj(r));
    }
    match heap.get_mut(list) {
        Obj::List(l) => l.methods = methods,
        _ => unreachable!("bind_list_methods on a non-list"),
    }
}

/// `abs(n)` — absolute value of a number.
fn native_abs(heap: &mut Heap, _parent: Option<ObjRef>, args: &[Value]) -> Result<Value, RuntimeError> {
    match args[0] {
        Value::Number(n) => Ok(Value::Number(n.abs())),
        other => Err(RuntimeError::Type {
            expected: "number",
            got: other.type_name(heap),
        }),
    }
}

/// `list.size()` — the element count.
fn list_size(heap: &mut Heap, parent: Option<ObjRef>, _args: &[Value]) -> Result<Value, RuntimeError> {
    let list = parent.expect("list method without a receiver");
    match heap.get(list) {
        Obj::List(l) => Ok(Value::Number(l.elements.len() as f64)),
        _ => unreachable!("list method bound to a non-list"),
    }
}

/// `list.add(v)` — append a value; evaluates to null.
fn list_add(heap: &mut Heap, parent: Option<ObjRef>, args: &[Value]) -> Result<Value, RuntimeError> {
    let list = parent.expect("list method without a receiver");
    match heap.get_mut(list) {
        Obj::List(l) => {
            l.elements.push(args[0]);
            Ok(Value::Null)
        }
        _ => unreachable!("list method bound to a non-list"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::List;

    #[test]
    fn abs_requires_a_number() {
        let mut heap = Heap::new();
        assert_eq!(
            native_abs(&mut heap, None, &[Value::Number(-4.0)]),
            Ok(Value::Number(4.0))
        );
        assert!(matches!(
            native_abs(&mut heap, None, &[Value::Null]),
            Err(RuntimeError::Type { .. })
        ));
    }

    #[test]
    fn list_methods_share_the_receiver() {
        let mut heap = Heap::new();
        let list = heap.alloc(Obj::List(List {
            elements: vec![Value::Number(1.0)],
            methods: Table::new(),
        }));
        bind_list_methods(&mut heap, list);

        assert_eq!(
            list_size(&mut heap, Some(list), &[]),
            Ok(Value::Number(1.0))
        );
        assert_eq!(
            list_add(&mut heap, Some(list), &[Value::Number(2.0)]),
            Ok(Value::Null)
        );
        assert_eq!(
            list_size(&mut heap, Some(list), &[]),
            Ok(Value::Number(2.0))
        );

        match heap.get(list) {
            Obj::List(l) => assert!(l.methods.contains("add") && l.methods.contains("size")),
            _ => unreachable!(),
        }
    }
}
