//! Lexically scoped variable bindings.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use xylem_xdm::{ExpandedName, Value};

struct Frame {
    bindings: RefCell<HashMap<ExpandedName, Value>>,
    parent: Option<Rc<Frame>>,
}

/// A persistent chain of binding frames. `push` returns a new scope with a
/// fresh innermost frame and leaves the receiver untouched, so derived
/// contexts never observe each other's local bindings. `bind` mutates only
/// the innermost frame of the scope it is called on.
#[derive(Clone)]
pub struct VariableScope {
    frame: Rc<Frame>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self {
            frame: Rc::new(Frame {
                bindings: RefCell::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    pub fn push(&self) -> Self {
        Self {
            frame: Rc::new(Frame {
                bindings: RefCell::new(HashMap::new()),
                parent: Some(self.frame.clone()),
            }),
        }
    }

    pub fn bind(&self, name: ExpandedName, value: Value) {
        self.frame.bindings.borrow_mut().insert(name, value);
    }

    /// Walks the chain from the innermost frame rootward.
    pub fn lookup(&self, name: &ExpandedName) -> Option<Value> {
        let mut frame = Some(&self.frame);
        while let Some(current) = frame {
            if let Some(value) = current.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            frame = current.parent.as_ref();
        }
        None
    }

    /// A scope anchored at the root frame: only global bindings visible.
    pub fn global_only(&self) -> Self {
        let mut frame = self.frame.clone();
        while let Some(parent) = frame.parent.clone() {
            frame = parent;
        }
        Self { frame }
    }
}

impl Default for VariableScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VariableScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut depth = 0;
        let mut frame = Some(&self.frame);
        while let Some(current) = frame {
            depth += 1;
            frame = current.parent.as_ref();
        }
        f.debug_struct("VariableScope").field("depth", &depth).finish()
    }
}
