/// Memoizing wrapper around a zero-argument factory.
///
/// The factory runs at most once, on the first `get` call. The cell flips to
/// supplied before the factory is invoked, whether or not the factory
/// completes: a panicking factory poisons the cell, and every later `get`
/// returns `None` without running anything again. Not thread-safe; the cell
/// carries no synchronization and is meant to be owned by a single caller.
pub struct LazySupplier<T> {
    factory: Option<Box<dyn FnOnce() -> T>>,
    value: Option<T>,
    supplied: bool,
}

impl<T> LazySupplier<T> {
    pub fn new(factory: impl FnOnce() -> T + 'static) -> Self {
        Self {
            factory: Some(Box::new(factory)),
            value: None,
            supplied: false,
        }
    }

    pub fn get(&mut self) -> Option<&T> {
        if !self.supplied {
            self.supplied = true;
            if let Some(factory) = self.factory.take() {
                self.value = Some(factory());
            }
        }
        self.value.as_ref()
    }

    pub fn is_supplied(&self) -> bool {
        self.supplied
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LazySupplier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazySupplier")
            .field("value", &self.value)
            .field("supplied", &self.supplied)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::LazySupplier;
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::rc::Rc;

    #[test]
    fn runs_the_factory_exactly_once() {
        let calls = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&calls);
        let mut cell = LazySupplier::new(move || {
            counter.set(counter.get() + 1);
            "hello".to_string()
        });
        assert!(!cell.is_supplied());
        assert_eq!(cell.get(), Some(&"hello".to_string()));
        assert_eq!(cell.get(), Some(&"hello".to_string()));
        assert_eq!(cell.get(), Some(&"hello".to_string()));
        assert_eq!(calls.get(), 1);
        assert!(cell.is_supplied());
    }

    #[test]
    fn value_is_not_computed_before_first_get() {
        let calls = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&calls);
        let mut cell = LazySupplier::new(move || {
            counter.set(counter.get() + 1);
            42
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(cell.get(), Some(&42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn panicking_factory_poisons_the_cell() {
        let calls = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&calls);
        let mut cell: LazySupplier<i32> = LazySupplier::new(move || {
            counter.set(counter.get() + 1);
            panic!("factory failure");
        });
        let failure = catch_unwind(AssertUnwindSafe(|| {
            cell.get();
        }));
        assert!(failure.is_err());
        assert!(cell.is_supplied());
        // The failure is not replayed: later reads see an absent value.
        assert_eq!(cell.get(), None);
        assert_eq!(calls.get(), 1);
    }
}
