use crate::language::ast::Expr;
use crate::runtime::environment::Environment;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    String(String),
    Array(ArrayValue),
    Object(ObjectInstance),
    Supplier(SupplierValue),
    Lazy(LazyValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "void",
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::String(_) => "String",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Supplier(_) => "Supplier",
            Value::Lazy(_) => "LazySupplier",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => *a.items.borrow() == *b.items.borrow(),
            (Value::Object(a), Value::Object(b)) => {
                a.class == b.class && *a.fields.borrow() == *b.fields.borrow()
            }
            (Value::Supplier(a), Value::Supplier(b)) => Rc::ptr_eq(&a.thunk, &b.thunk),
            (Value::Lazy(a), Value::Lazy(b)) => Rc::ptr_eq(&a.cell, &b.cell),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "void"),
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Array(array) => {
                write!(f, "[")?;
                for (idx, value) in array.items.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Object(instance) => write!(f, "{instance}"),
            Value::Supplier(_) => write!(f, "<supplier>"),
            Value::Lazy(lazy) => {
                let cell = lazy.cell.borrow();
                if cell.supplied {
                    match &cell.value {
                        Some(value) => write!(f, "LazySupplier({value})"),
                        None => write!(f, "LazySupplier(<failed>)"),
                    }
                } else {
                    write!(f, "LazySupplier(<unevaluated>)")
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct ArrayValue {
    pub items: Rc<RefCell<Vec<Value>>>,
}

impl ArrayValue {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: Rc::new(RefCell::new(items)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ObjectInstance {
    pub class: String,
    pub fields: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl ObjectInstance {
    pub fn new(class: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            class: class.into(),
            fields: Rc::new(RefCell::new(fields)),
        }
    }
}

impl fmt::Display for ObjectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.class)?;
        let mut first = true;
        for (name, value) in self.fields.borrow().iter() {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, " {name}: {value}")?;
        }
        write!(f, " }}")
    }
}

// The captured original-initializer expression plus the environment it
// closed over. Shared so that supplier values stay cheap to clone.
#[derive(Clone, Debug)]
pub struct Thunk {
    pub body: Expr,
    pub env: Environment,
}

#[derive(Clone, Debug)]
pub struct SupplierValue {
    pub thunk: Rc<Thunk>,
}

impl SupplierValue {
    pub fn new(body: Expr, env: Environment) -> Self {
        Self {
            thunk: Rc::new(Thunk { body, env }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LazyValue {
    pub cell: Rc<RefCell<LazyCell>>,
}

impl LazyValue {
    pub fn new(thunk: Rc<Thunk>) -> Self {
        Self {
            cell: Rc::new(RefCell::new(LazyCell {
                thunk: Some(thunk),
                value: None,
                supplied: false,
            })),
        }
    }
}

// Same state machine as `runtime::lazy::LazySupplier`, driven by the
// interpreter because thunk evaluation needs it: `supplied` flips before the
// thunk runs and never flips back, so a failing first evaluation leaves the
// cell poisoned and later reads observe `null`.
#[derive(Debug)]
pub struct LazyCell {
    pub thunk: Option<Rc<Thunk>>,
    pub value: Option<Value>,
    pub supplied: bool,
}
