// Datastructure to manage lexical scoping.
//
// A frame maps interned symbols to values and chains to an optional
// parent. define binds in this frame only; set and get walk the chain.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::symbol::Symbol;
use crate::value::Value;

pub type Env = Rc<Frame>;

pub struct Frame {
    table: RefCell<HashMap<Symbol, Value>>,
    parent: Option<Env>,
}

impl Frame {
    fn new(parent: Option<Env>) -> Env {
        Rc::new(Frame {
            table: RefCell::new(HashMap::new()),
            parent,
        })
    }

    pub fn root() -> Env {
        Self::new(None)
    }

    pub fn chain(parent: &Env) -> Env {
        Self::new(Some(parent.clone()))
    }

    /// Insert or overwrite a binding in this frame only.
    pub fn define(&self, sym: Symbol, value: Value) {
        self.table.borrow_mut().insert(sym, value);
    }

    /// Mutate the first binding found in this frame or any parent.
    pub fn set(&self, sym: &Symbol, value: Value) -> Result<()> {
        if let Some(slot) = self.table.borrow_mut().get_mut(sym) {
            *slot = value;
            return Ok(());
        }
        let mut cur = self.parent.clone();
        while let Some(frame) = cur {
            if let Some(slot) = frame.table.borrow_mut().get_mut(sym) {
                *slot = value;
                return Ok(());
            }
            cur = frame.parent.clone();
        }
        Err(Error::Unbound(sym.clone()))
    }

    /// Look up a symbol in this frame or any parent.
    pub fn get(&self, sym: &Symbol) -> Result<Value> {
        if let Some(value) = self.table.borrow().get(sym) {
            return Ok(value.clone());
        }
        let mut cur = self.parent.clone();
        while let Some(frame) = cur {
            if let Some(value) = frame.table.borrow().get(sym) {
                return Ok(value.clone());
            }
            cur = frame.parent.clone();
        }
        Err(Error::Unbound(sym.clone()))
    }

    /// Import a set of bindings into this frame.
    pub fn import(&self, bindings: Vec<(Symbol, Value)>) {
        for (sym, value) in bindings {
            self.define(sym, value);
        }
    }

    pub fn parent(&self) -> Option<Env> {
        self.parent.clone()
    }

    // The collector iterates bound values without holding the table
    // borrow across marking.
    pub(crate) fn snapshot(&self) -> Vec<Value> {
        self.table.borrow().values().cloned().collect()
    }
}
