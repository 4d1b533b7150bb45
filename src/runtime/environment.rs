use crate::runtime::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug)]
struct Scope {
    bindings: HashMap<String, Rc<RefCell<Value>>>,
}

impl Scope {
    fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }
}

// Cloning an environment snapshots the scope stack while sharing the
// binding cells, which is how lambdas capture their surroundings.
#[derive(Clone, Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        if self.scopes.is_empty() {
            self.scopes.push(Scope::new());
        }
    }

    pub fn declare(&mut self, name: &str, value: Value) {
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .bindings
            .insert(name.to_string(), Rc::new(RefCell::new(value)));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.cell(name).map(|cell| cell.borrow().clone())
    }

    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.cell(name) {
            Some(cell) => {
                *cell.borrow_mut() = value;
                true
            }
            None => false,
        }
    }

    fn cell(&self, name: &str) -> Option<Rc<RefCell<Value>>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name).cloned())
    }
}
