use positron::{interpret, Error, RuntimeError};
use pretty_assertions::assert_eq;

/// Run a program that must succeed with exit code 0; return its output.
fn run(source: &str) -> String {
    let mut out = Vec::new();
    let code = interpret(source, "test", &mut out).expect("program failed");
    assert_eq!(code, 0, "unexpected exit code");
    String::from_utf8(out).unwrap()
}

/// Run a program that must succeed; return (exit code, output).
fn run_with_exit(source: &str) -> (i32, String) {
    let mut out = Vec::new();
    let code = interpret(source, "test", &mut out).expect("program failed");
    (code, String::from_utf8(out).unwrap())
}

/// Run a program that must fail; return the error.
fn run_err(source: &str) -> Error {
    let mut out = Vec::new();
    interpret(source, "test", &mut out).expect_err("program unexpectedly succeeded")
}

// ---------------------------------------------------------------------------
// Core scenarios
// ---------------------------------------------------------------------------

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("print 1 + 2 * 3;"), "7\n");
}

#[test]
fn global_variables() {
    assert_eq!(run("let a = 10; let b = 20; print a + b;"), "30\n");
}

#[test]
fn while_loop() {
    assert_eq!(
        run("let x = 0; while (x < 3) { print x; x = x + 1; }"),
        "0\n1\n2\n"
    );
}

#[test]
fn function_call() {
    assert_eq!(run("fun add(a, b) { return a + b; } print add(2, 40);"), "42\n");
}

#[test]
fn struct_construction_and_field_access() {
    assert_eq!(
        run("struct P { x, y } let p = P(3, 4); print p.x + p.y;"),
        "7\n"
    );
}

#[test]
fn list_literal_and_subscript() {
    assert_eq!(run("let xs = [10, 20, 30]; print xs:1;"), "20\n");
}

#[test]
fn if_else() {
    assert_eq!(run("if (1 < 2) print \"yes\"; else print \"no\";"), "yes\n");
}

#[test]
fn for_loop_sum() {
    assert_eq!(
        run("let s = 0; for (let i = 0; i < 5; i = i + 1) s = s + i; print s;"),
        "10\n"
    );
}

// ---------------------------------------------------------------------------
// Language surface details
// ---------------------------------------------------------------------------

#[test]
fn numbers_print_like_integers_when_integral() {
    assert_eq!(run("print 7.0;"), "7\n");
    assert_eq!(run("print 10 / 4;"), "2.5\n");
    assert_eq!(run("print 2.5 + 0.25;"), "2.75\n");
}

#[test]
fn unary_operators() {
    assert_eq!(run("print -(3);"), "-3\n");
    assert_eq!(run("print !true;"), "false\n");
    assert_eq!(run("print !0;"), "true\n");
    assert_eq!(run("print !null;"), "true\n");
}

#[test]
fn semicolons_are_optional() {
    assert_eq!(run("print 1"), "1\n");
    assert_eq!(run("let a = 2\nprint a"), "2\n");
}

#[test]
fn comments_are_skipped() {
    assert_eq!(run("// leading\nprint 1; // trailing\n// done"), "1\n");
}

#[test]
fn string_literals_print_raw() {
    assert_eq!(run("print \"hello world\";"), "hello world\n");
}

#[test]
fn truthiness_drives_branches() {
    assert_eq!(run("if (0) print \"t\"; else print \"zero\";"), "zero\n");
    assert_eq!(run("if (null) print \"t\"; else print \"null\";"), "null\n");
    assert_eq!(run("if (7) print \"seven\";"), "seven\n");
}

#[test]
fn equality_is_defined_for_numbers_only() {
    assert_eq!(run("print 1 == 1;"), "true\n");
    assert_eq!(run("print 1 == 2;"), "false\n");
    assert_eq!(run("print 1 != 2;"), "true\n");
    // Any pairing that is not two numbers is unequal, even when the
    // values are identical.
    assert_eq!(run("print true == true;"), "false\n");
    assert_eq!(run("print null == null;"), "false\n");
    assert_eq!(run("print \"a\" == \"a\";"), "false\n");
    assert_eq!(run("print 1 == true;"), "false\n");
    assert_eq!(run("print 0 == null;"), "false\n");
    assert_eq!(run("print 1 != true;"), "true\n");
    assert_eq!(run("print null != null;"), "true\n");
}

#[test]
fn short_circuit_does_not_evaluate_the_right_side() {
    let source = "\
fun effect() { print \"effect\"; return true; }
print false && effect();
print true || effect();
";
    assert_eq!(run(source), "false\ntrue\n");
}

#[test]
fn logical_operators_produce_the_deciding_operand() {
    assert_eq!(run("print true && false;"), "false\n");
    assert_eq!(run("print false || true;"), "true\n");
    assert_eq!(run("print 1 < 2 && 2 < 3;"), "true\n");
}

// ---------------------------------------------------------------------------
// Scoping
// ---------------------------------------------------------------------------

#[test]
fn inner_locals_shadow_and_do_not_leak() {
    let source = "\
let x = 1;
{
  let x = 2;
  print x;
}
print x;
";
    assert_eq!(run(source), "2\n1\n");
}

#[test]
fn nested_block_shadowing() {
    let source = "\
{
  let a = 1;
  {
    let a = 2;
    print a;
  }
  print a;
}
";
    assert_eq!(run(source), "2\n1\n");
}

#[test]
fn assigning_a_global_from_a_nested_scope() {
    let source = "\
let g = 1;
{
  g = 5;
}
print g;
";
    assert_eq!(run(source), "5\n");
}

#[test]
fn loop_body_locals_are_popped_each_iteration() {
    let source = "\
let i = 0;
while (i < 2) {
  let x = i * 10;
  print x;
  i = i + 1;
}
";
    assert_eq!(run(source), "0\n10\n");
}

#[test]
fn local_set_then_get_round_trips() {
    let source = "\
{
  let a = 1;
  a = 41;
  print a + 1;
}
";
    assert_eq!(run(source), "42\n");
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

#[test]
fn recursion_through_the_global_table() {
    let source = "\
fun fib(n) {
  if (n < 2) return n;
  return fib(n - 1) + fib(n - 2);
}
print fib(10);
";
    assert_eq!(run(source), "55\n");
}

#[test]
fn functions_without_return_yield_null() {
    assert_eq!(run("fun f() { } print f();"), "null\n");
    assert_eq!(run("fun g() { return; } print g();"), "null\n");
}

#[test]
fn function_locals_live_in_their_own_frame() {
    let source = "\
fun double(n) {
  let twice = n * 2;
  return twice;
}
let n = 5;
print double(n);
print n;
";
    assert_eq!(run(source), "10\n5\n");
}

// ---------------------------------------------------------------------------
// Structs & lists
// ---------------------------------------------------------------------------

#[test]
fn struct_field_assignment() {
    let source = "\
struct P { x, y }
let p = P(1, 2);
p.x = 10;
print p.x + p.y;
";
    assert_eq!(run(source), "12\n");
}

#[test]
fn struct_declared_in_a_nested_scope_is_local() {
    let source = "\
{
  struct Pair { a, b }
  let p = Pair(1, 2);
  print p.a + p.b;
}
";
    assert_eq!(run(source), "3\n");
}

#[test]
fn list_methods_size_and_add() {
    let source = "\
let xs = [10, 20, 30];
print xs.size();
xs.add(40);
print xs.size();
print xs:3;
";
    assert_eq!(run(source), "3\n4\n40\n");
}

#[test]
fn lists_print_their_elements() {
    assert_eq!(run("print [1, 2, 3];"), "[1, 2, 3]\n");
    assert_eq!(run("print [];"), "[]\n");
}

#[test]
fn builtin_abs() {
    assert_eq!(run("print abs(0 - 5);"), "5\n");
    assert_eq!(run("print abs(5);"), "5\n");
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

#[test]
fn exit_sets_the_process_code() {
    assert_eq!(run_with_exit("exit 3;"), (3, String::new()));
}

#[test]
fn exit_halts_immediately() {
    let (code, output) = run_with_exit("print 1; exit 9; print 2;");
    assert_eq!(code, 9);
    assert_eq!(output, "1\n");
}

// ---------------------------------------------------------------------------
// Compile-time failures
// ---------------------------------------------------------------------------

#[test]
fn undefined_global_fails_to_compile() {
    let err = run_err("print a;");
    assert!(matches!(err, Error::Compile(_)));
    assert!(err.to_string().contains("[line 1] Error at 'a'"));
    assert!(err.to_string().contains("Undefined variable 'a'"));
}

#[test]
fn local_redeclaration_fails_to_compile() {
    let err = run_err("{ let a = 1; let a = 2; }");
    assert!(matches!(err, Error::Compile(_)));
}

#[test]
fn unterminated_string_is_a_lex_error() {
    assert!(matches!(run_err("print \"oops"), Error::Lex { .. }));
}

// ---------------------------------------------------------------------------
// Runtime failures
// ---------------------------------------------------------------------------

#[test]
fn adding_a_number_and_a_bool_is_a_type_error() {
    assert!(matches!(
        run_err("1 + true;"),
        Error::Runtime(RuntimeError::Type { .. })
    ));
}

#[test]
fn division_by_zero() {
    assert_eq!(
        run_err("print 1 / 0;"),
        Error::Runtime(RuntimeError::DivisionByZero)
    );
}

#[test]
fn undefined_field_on_an_instance() {
    assert!(matches!(
        run_err("struct P { x, } let p = P(1); print p.y;"),
        Error::Runtime(RuntimeError::UndefinedField(_))
    ));
}

#[test]
fn undefined_list_method() {
    assert!(matches!(
        run_err("let xs = [1]; xs.shuffle();"),
        Error::Runtime(RuntimeError::UndefinedMethod(_))
    ));
}

#[test]
fn calling_a_number_is_a_runtime_error() {
    assert_eq!(
        run_err("let n = 3; n();"),
        Error::Runtime(RuntimeError::NotCallable)
    );
}

#[test]
fn function_arity_is_checked() {
    assert_eq!(
        run_err("fun f(a) { return a; } f(1, 2);"),
        Error::Runtime(RuntimeError::ArityMismatch {
            expected: 1,
            got: 2
        })
    );
}

#[test]
fn struct_construction_arity_is_checked() {
    assert!(matches!(
        run_err("struct P { x, y } let p = P(1);"),
        Error::Runtime(RuntimeError::ArityMismatch { .. })
    ));
}

#[test]
fn index_out_of_bounds() {
    assert!(matches!(
        run_err("let xs = [1, 2]; print xs:5;"),
        Error::Runtime(RuntimeError::IndexOutOfBounds { .. })
    ));
    assert!(matches!(
        run_err("let xs = [1, 2]; print xs:(0 - 1);"),
        Error::Runtime(RuntimeError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn runaway_recursion_overflows() {
    let err = run_err("fun f(n) { return f(n + 1); } f(0);");
    assert!(matches!(
        err,
        Error::Runtime(RuntimeError::StackOverflow | RuntimeError::FrameOverflow)
    ));
}
