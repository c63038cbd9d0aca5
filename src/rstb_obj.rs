use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

// RstbObj lets tasks of one simulation share mutable testbench state (a
// monitor's samples, a scoreboard, a model's state probe). Everything runs on
// the simulation thread, so Rc/RefCell is enough.
pub struct RstbObj<T>(Rc<RefCell<T>>);

impl<T> RstbObj<T> {
    pub fn new(data: T) -> RstbObj<T> {
        RstbObj(Rc::new(RefCell::new(data)))
    }

    pub fn get(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn get_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    pub fn replace(&self, data: T) -> T {
        self.0.replace(data)
    }
}

impl<T: Clone> RstbObj<T> {
    pub fn snapshot(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for RstbObj<T> {
    fn clone(&self) -> Self {
        RstbObj(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for RstbObj<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RstbObj").field(&*self.0.borrow()).finish()
    }
}
