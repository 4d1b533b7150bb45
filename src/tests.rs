use crate::harness::{self, CompileError, HarnessError};
use crate::runtime::{
    error::RuntimeError,
    value::{ArrayValue, Value},
    Interpreter,
};
use std::path::PathBuf;

fn run(source: &str) -> Value {
    harness::run_function(source, "main").expect("program must compile and run")
}

#[test]
fn lazy_var_string_materializes_the_literal() {
    let value = run(
        r#"
String main() {
  @lazy var s = "hello";
  return s.get();
}
"#,
    );
    assert_eq!(value, Value::String("hello".into()));
}

#[test]
fn lazy_primitive_int_materializes_boxed_value() {
    let value = run(
        r#"
int main() {
  @lazy int n = 42;
  return n.get();
}
"#,
    );
    assert_eq!(value, Value::Int(42));
}

#[test]
fn lazy_var_array_materializes_the_array() {
    let value = run(
        r#"
int[] main() {
  @lazy var a = new int[]{1, 2, 3};
  return a.get();
}
"#,
    );
    let expected = Value::Array(ArrayValue::new(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
    ]));
    assert_eq!(value, expected);
}

#[test]
fn lazy_constructor_materializes_an_equal_instance() {
    let value = run(
        r#"
class SomeType {
  int count;
  String label;
}

SomeType main() {
  @lazy SomeType r = new SomeType(42, "hello");
  return r.get();
}
"#,
    );
    let direct = run(
        r#"
class SomeType {
  int count;
  String label;
}

SomeType main() {
  return new SomeType(42, "hello");
}
"#,
    );
    assert_eq!(value, direct);
}

#[test]
fn lazy_boolean_and_char_round_trip() {
    let value = run(
        r#"
boolean main() {
  @lazy boolean b = true;
  return b.get();
}
"#,
    );
    assert_eq!(value, Value::Bool(true));
    let value = run(
        r#"
char main() {
  @lazy char c = 'x';
  return c.get();
}
"#,
    );
    assert_eq!(value, Value::Char('x'));
}

#[test]
fn factory_captures_the_surrounding_scope() {
    let value = run(
        r#"
int main() {
  int a = 40;
  @lazy int n = a + 2;
  return n.get();
}
"#,
    );
    assert_eq!(value, Value::Int(42));
}

#[test]
fn initializer_is_not_evaluated_without_a_get() {
    let value = run(
        r#"
int main() {
  @lazy int n = 1 / 0;
  return 7;
}
"#,
    );
    assert_eq!(value, Value::Int(7));
}

#[test]
fn materialize_returns_the_same_instance_every_time() {
    // Mutating the materialized object is visible through the next get:
    // the factory ran once and the value is shared, not rebuilt.
    let value = run(
        r#"
class Point {
  int x;
  String label;
}

int main() {
  @lazy Point p = new Point(1, "a");
  p.get().x = 5;
  return p.get().x;
}
"#,
    );
    assert_eq!(value, Value::Int(5));
}

#[test]
fn plain_lambda_supplier_rebuilds_on_every_get() {
    let value = run(
        r#"
class Point {
  int x;
  String label;
}

int main() {
  var f = () -> new Point(1, "a");
  f.get().x = 5;
  return f.get().x;
}
"#,
    );
    assert_eq!(value, Value::Int(1));
}

#[test]
fn pre_annotated_supplier_declaration_works() {
    let value = run(
        r#"
String main() {
  @lazy Supplier<String> s = "wrapped";
  return s.get();
}
"#,
    );
    assert_eq!(value, Value::String("wrapped".into()));
}

#[test]
fn failing_factory_surfaces_once_then_goes_silent() {
    let source = r#"
Supplier<Integer> make() {
  @lazy int n = 1 / 0;
  return n;
}

int read(Supplier<Integer> s) {
  return s.get();
}
"#;
    let unit = harness::compile("tests::poison", PathBuf::from("poison.latte"), source)
        .expect("compile");
    let mut interpreter = Interpreter::new(&unit);
    let supplier = interpreter.invoke("make", Vec::new()).expect("make");

    let first = interpreter.invoke("read", vec![supplier.clone()]);
    assert!(matches!(first, Err(RuntimeError::DivisionByZero)));

    // The cell is poisoned: no re-evaluation, no error, just an absent value.
    let second = interpreter.invoke("read", vec![supplier]);
    assert_eq!(second.expect("second read"), Value::Null);
}

#[test]
fn two_type_arguments_fail_compilation() {
    let err = harness::run_function(
        r#"
void main() {
  @lazy Supplier<String, Integer> s = "x";
}
"#,
        "main",
    )
    .expect_err("two type arguments");
    let HarnessError::Compile(CompileError::Rewrite(errors)) = err else {
        panic!("expected a rewrite failure, got {err:?}");
    };
    assert!(errors.errors[0].message.contains("at most 1 type argument"));
}

#[test]
fn unsupported_initializer_shape_fails_compilation() {
    let err = harness::run_function(
        r#"
int f() {
  return 1;
}

void main() {
  @lazy x = f();
}
"#,
        "main",
    )
    .expect_err("call initializers cannot seed inference");
    let HarnessError::Compile(CompileError::Rewrite(errors)) = err else {
        panic!("expected a rewrite failure, got {err:?}");
    };
    assert!(errors.errors[0]
        .message
        .contains("literal or constructor invocation"));
}

#[test]
fn while_loops_and_lazy_bindings_compose() {
    let value = run(
        r#"
int main() {
  @lazy int step = 2;
  int total = 0;
  int i = 0;
  while (i < 3) {
    total = total + step.get();
    i = i + 1;
  }
  return total;
}
"#,
    );
    assert_eq!(value, Value::Int(6));
}

#[test]
fn unmarked_declarations_run_unchanged() {
    let value = run(
        r#"
int main() {
  int n = 42;
  return n;
}
"#,
    );
    assert_eq!(value, Value::Int(42));
}

#[test]
fn lazy_bindings_inside_nested_blocks() {
    let value = run(
        r#"
int main() {
  int total = 0;
  if (true) {
    @lazy int n = 40;
    total = n.get() + 2;
  }
  return total;
}
"#,
    );
    assert_eq!(value, Value::Int(42));
}
