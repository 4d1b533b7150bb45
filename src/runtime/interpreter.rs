use crate::language::ast::*;
use crate::language::types::{TypeAnnotation, TypeExpr};
use crate::runtime::{
    environment::Environment,
    error::{RuntimeError, RuntimeResult},
    value::{ArrayValue, LazyValue, ObjectInstance, SupplierValue, Value},
};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

pub struct Interpreter {
    classes: HashMap<String, ClassDecl>,
    functions: HashMap<String, FunctionDecl>,
    env: Environment,
}

enum Flow {
    Normal,
    Return(Value),
}

impl Interpreter {
    pub fn new(unit: &CompilationUnit) -> Self {
        let mut classes = HashMap::new();
        let mut functions = HashMap::new();
        for item in &unit.items {
            match item {
                Item::Class(def) => {
                    classes.insert(def.name.clone(), def.clone());
                }
                Item::Function(def) => {
                    functions.insert(def.name.clone(), def.clone());
                }
            }
        }
        Self {
            classes,
            functions,
            env: Environment::new(),
        }
    }

    pub fn invoke(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let def = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
            })?;
        self.call_function(&def, args)
    }

    fn call_function(&mut self, def: &FunctionDecl, args: Vec<Value>) -> RuntimeResult<Value> {
        if def.params.len() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                name: def.name.clone(),
                expected: def.params.len(),
                received: args.len(),
            });
        }
        let saved = std::mem::take(&mut self.env);
        for (param, arg) in def.params.iter().zip(args) {
            self.env.declare(&param.name, arg);
        }
        let result = self.exec_block(&def.body);
        self.env = saved;
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Unit),
        }
    }

    fn exec_block(&mut self, block: &Block) -> RuntimeResult<Flow> {
        self.env.push_scope();
        let result = (|| {
            for stmt in &block.statements {
                if let Flow::Return(value) = self.exec_statement(stmt)? {
                    return Ok(Flow::Return(value));
                }
            }
            Ok(Flow::Normal)
        })();
        self.env.pop_scope();
        result
    }

    fn exec_statement(&mut self, stmt: &Statement) -> RuntimeResult<Flow> {
        match stmt {
            Statement::Local(decl) => {
                let value = match &decl.init {
                    Some(init) => self.eval_expression(init)?,
                    None => Value::Null,
                };
                self.env.declare(&decl.name, value);
                Ok(Flow::Normal)
            }
            Statement::Assign(assign) => {
                let value = self.eval_expression(&assign.value)?;
                self.assign(&assign.target, value)?;
                Ok(Flow::Normal)
            }
            Statement::Expr(stmt) => {
                self.eval_expression(&stmt.expr)?;
                Ok(Flow::Normal)
            }
            Statement::Return(ret) => {
                let value = match &ret.value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(value))
            }
            Statement::If(if_stmt) => {
                if self.eval_condition(&if_stmt.condition)? {
                    self.exec_block(&if_stmt.then_branch)
                } else if let Some(else_branch) = &if_stmt.else_branch {
                    self.exec_block(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::While(while_stmt) => {
                while self.eval_condition(&while_stmt.condition)? {
                    if let Flow::Return(value) = self.exec_block(&while_stmt.body)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::Block(block) => self.exec_block(block),
        }
    }

    fn eval_condition(&mut self, condition: &Expr) -> RuntimeResult<bool> {
        match self.eval_expression(condition)? {
            Value::Bool(value) => Ok(value),
            other => Err(RuntimeError::TypeMismatch {
                message: format!("condition evaluated to `{}`", other.type_name()),
            }),
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> RuntimeResult<()> {
        match target {
            Expr::Identifier(ident) => {
                if self.env.assign(&ident.name, value) {
                    Ok(())
                } else {
                    Err(RuntimeError::UnknownSymbol {
                        name: ident.name.clone(),
                    })
                }
            }
            Expr::Index { base, index, .. } => {
                let base = self.eval_expression(base)?;
                let index = self.eval_index(index)?;
                let Value::Array(array) = base else {
                    return Err(RuntimeError::TypeMismatch {
                        message: format!("cannot index `{}`", base.type_name()),
                    });
                };
                let mut items = array.items.borrow_mut();
                let len = items.len();
                let slot = items
                    .get_mut(index as usize)
                    .ok_or(RuntimeError::IndexOutOfBounds { index, len })?;
                *slot = value;
                Ok(())
            }
            Expr::FieldAccess { base, field, .. } => {
                let base = self.eval_expression(base)?;
                let Value::Object(instance) = base else {
                    return Err(RuntimeError::TypeMismatch {
                        message: format!("`{}` has no fields", base.type_name()),
                    });
                };
                let mut fields = instance.fields.borrow_mut();
                match fields.get_mut(field) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::UnknownSymbol {
                        name: field.clone(),
                    }),
                }
            }
            _ => Err(RuntimeError::Unsupported {
                message: "invalid assignment target".into(),
            }),
        }
    }

    fn eval_expression(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(eval_literal(literal)),
            Expr::Identifier(ident) => {
                self.env
                    .get(&ident.name)
                    .ok_or_else(|| RuntimeError::UnknownSymbol {
                        name: ident.name.clone(),
                    })
            }
            Expr::Lambda { body, .. } => Ok(Value::Supplier(SupplierValue::new(
                (**body).clone(),
                self.env.clone(),
            ))),
            Expr::New { class, args, .. } => self.construct(class, args),
            Expr::NewArray { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval_expression(element)?);
                }
                Ok(Value::Array(ArrayValue::new(items)))
            }
            Expr::Call { name, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expression(arg)?);
                }
                self.invoke(&name.name, values)
            }
            Expr::MethodCall {
                receiver,
                name,
                args,
                ..
            } => self.eval_method_call(receiver, name, args),
            Expr::FieldAccess { base, field, .. } => {
                let base = self.eval_expression(base)?;
                let Value::Object(instance) = base else {
                    return Err(RuntimeError::TypeMismatch {
                        message: format!("`{}` has no fields", base.type_name()),
                    });
                };
                let fields = instance.fields.borrow();
                fields
                    .get(field)
                    .cloned()
                    .ok_or_else(|| RuntimeError::UnknownSymbol {
                        name: field.clone(),
                    })
            }
            Expr::Index { base, index, .. } => {
                let base = self.eval_expression(base)?;
                let index = self.eval_index(index)?;
                let Value::Array(array) = base else {
                    return Err(RuntimeError::TypeMismatch {
                        message: format!("cannot index `{}`", base.type_name()),
                    });
                };
                let items = array.items.borrow();
                items
                    .get(index as usize)
                    .cloned()
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index,
                        len: items.len(),
                    })
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let left = self.eval_expression(left)?;
                // Short-circuit before touching the right operand.
                match (op, &left) {
                    (BinaryOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
                    (BinaryOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let right = self.eval_expression(right)?;
                eval_binary(*op, left, right)
            }
            Expr::Unary { op, expr, .. } => {
                let value = self.eval_expression(expr)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(-v)),
                    (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
                    (UnaryOp::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
                    (_, value) => Err(RuntimeError::TypeMismatch {
                        message: format!("operator does not apply to `{}`", value.type_name()),
                    }),
                }
            }
        }
    }

    fn eval_index(&mut self, index: &Expr) -> RuntimeResult<i64> {
        match self.eval_expression(index)? {
            Value::Int(value) => Ok(value),
            other => Err(RuntimeError::TypeMismatch {
                message: format!("array index evaluated to `{}`", other.type_name()),
            }),
        }
    }

    fn construct(&mut self, class: &TypeAnnotation, args: &[Expr]) -> RuntimeResult<Value> {
        if class.ty.is_lazy_supplier() {
            let [factory] = args else {
                return Err(RuntimeError::ArityMismatch {
                    name: "LazySupplier".into(),
                    expected: 1,
                    received: args.len(),
                });
            };
            let factory = self.eval_expression(factory)?;
            let Value::Supplier(supplier) = factory else {
                return Err(RuntimeError::TypeMismatch {
                    message: format!(
                        "LazySupplier needs a factory, got `{}`",
                        factory.type_name()
                    ),
                });
            };
            return Ok(Value::Lazy(LazyValue::new(Rc::clone(&supplier.thunk))));
        }

        let TypeExpr::Named { name, .. } = &class.ty else {
            return Err(RuntimeError::UnknownClass {
                name: class.ty.canonical_name(),
            });
        };
        let def = self
            .classes
            .get(name.simple_name())
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownClass {
                name: name.to_string(),
            })?;
        if def.fields.len() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                name: def.name.clone(),
                expected: def.fields.len(),
                received: args.len(),
            });
        }
        let mut fields = BTreeMap::new();
        for (field, arg) in def.fields.iter().zip(args) {
            let value = self.eval_expression(arg)?;
            fields.insert(field.name.clone(), value);
        }
        Ok(Value::Object(ObjectInstance::new(def.name, fields)))
    }

    fn eval_method_call(
        &mut self,
        receiver: &Expr,
        name: &str,
        args: &[Expr],
    ) -> RuntimeResult<Value> {
        let receiver = self.eval_expression(receiver)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expression(arg)?);
        }
        match (&receiver, name) {
            (Value::Lazy(lazy), "get") => self.materialize(&lazy.clone()),
            (Value::Supplier(supplier), "get") => {
                // A plain supplier re-evaluates on every call.
                let thunk = Rc::clone(&supplier.thunk);
                self.eval_thunk(&thunk.body, thunk.env.clone())
            }
            (Value::Array(array), "length") => Ok(Value::Int(array.items.borrow().len() as i64)),
            (Value::String(value), "length") => Ok(Value::Int(value.chars().count() as i64)),
            _ => Err(RuntimeError::Unsupported {
                message: format!("`{}` has no method `{}`", receiver.type_name(), name),
            }),
        }
    }

    // First call flips the cell to supplied before running the thunk, so a
    // failing thunk poisons it: the error surfaces once, and later reads get
    // the stored slot (null after a failure) without re-evaluating.
    fn materialize(&mut self, lazy: &LazyValue) -> RuntimeResult<Value> {
        let thunk = {
            let mut cell = lazy.cell.borrow_mut();
            if cell.supplied {
                return Ok(cell.value.clone().unwrap_or(Value::Null));
            }
            cell.supplied = true;
            cell.thunk.take()
        };
        let Some(thunk) = thunk else {
            return Ok(Value::Null);
        };
        let value = self.eval_thunk(&thunk.body, thunk.env.clone())?;
        lazy.cell.borrow_mut().value = Some(value.clone());
        Ok(value)
    }

    fn eval_thunk(&mut self, body: &Expr, env: Environment) -> RuntimeResult<Value> {
        let saved = std::mem::replace(&mut self.env, env);
        let result = self.eval_expression(body);
        self.env = saved;
        result
    }
}

fn eval_literal(literal: &Literal) -> Value {
    match literal {
        Literal::Int(value, _) => Value::Int(*value),
        Literal::Float(value, _) => Value::Float(*value),
        Literal::Bool(value, _) => Value::Bool(*value),
        Literal::Char(value, _) => Value::Char(*value),
        Literal::String(value, _) => Value::String(value.clone()),
        Literal::Null(_) => Value::Null,
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> RuntimeResult<Value> {
    use BinaryOp::*;
    match op {
        Add => {
            if let (Value::String(_), _) | (_, Value::String(_)) = (&left, &right) {
                return Ok(Value::String(format!("{left}{right}")));
            }
            numeric_op(left, right, |a, b| a.checked_add(b), |a, b| a + b)
        }
        Sub => numeric_op(left, right, |a, b| a.checked_sub(b), |a, b| a - b),
        Mul => numeric_op(left, right, |a, b| a.checked_mul(b), |a, b| a * b),
        Div => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            _ => numeric_op(left, right, |a, b| a.checked_div(b), |a, b| a / b),
        },
        Rem => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            _ => numeric_op(left, right, |a, b| a.checked_rem(b), |a, b| a % b),
        },
        And | Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == And {
                a && b
            } else {
                a || b
            })),
            (left, right) => Err(mismatch(&left, &right)),
        },
        Eq => Ok(Value::Bool(left == right)),
        NotEq => Ok(Value::Bool(left != right)),
        Lt | LtEq | Gt | GtEq => {
            let ordering = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
                (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
                (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
                (Value::Char(a), Value::Char(b)) => a.partial_cmp(b),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(mismatch(&left, &right));
            };
            Ok(Value::Bool(match op {
                Lt => ordering.is_lt(),
                LtEq => ordering.is_le(),
                Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
    }
}

fn numeric_op(
    left: Value,
    right: Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> RuntimeResult<Value> {
    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            int_op(*a, *b)
                .map(Value::Int)
                .ok_or(RuntimeError::Unsupported {
                    message: "integer overflow".into(),
                })
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        _ => Err(mismatch(&left, &right)),
    }
}

fn mismatch(left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        message: format!(
            "operator does not apply to `{}` and `{}`",
            left.type_name(),
            right.type_name()
        ),
    }
}
