// Symbol interning.
//
// A symbol is an opaque handle onto a string owned by the interpreter's
// symbol table. Interning the same spelling twice hands back the same
// allocation, so symbol equality and hashing reduce to pointer identity.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

#[derive(Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The unique key of this symbol: the address of its interned string.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const u8 as usize
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Symbol) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.id());
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bijective map between spellings and symbol handles.
pub struct SymbolTable {
    table: HashMap<String, Symbol>,
    gensym_count: usize,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            table: HashMap::new(),
            gensym_count: 0,
        }
    }

    /// Return the existing handle for this spelling, or intern a new one.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(sym) = self.table.get(name) {
            return sym.clone();
        }
        let sym = Symbol(Rc::from(name));
        self.table.insert(name.to_string(), sym.clone());
        sym
    }

    /// Synthesise a fresh symbol. The spelling contains a space, which the
    /// reader never produces, so it cannot collide with source symbols.
    pub fn gensym(&mut self) -> Symbol {
        loop {
            let name = format!("symbol {}", self.gensym_count);
            self.gensym_count += 1;
            if !self.table.contains_key(&name) {
                return self.intern(&name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_identity() {
        let mut tab = SymbolTable::new();
        let a = tab.intern("foo");
        let b = tab.intern("foo");
        let c = tab.intern("bar");
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, c);
        assert_eq!(a.name(), "foo");
        assert_eq!(tab.len(), 2);
    }

    #[test]
    fn test_clone_preserves_identity() {
        let mut tab = SymbolTable::new();
        let a = tab.intern("quux");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_gensym_is_fresh() {
        let mut tab = SymbolTable::new();
        let user = tab.intern("symbol 0");
        let g1 = tab.gensym();
        let g2 = tab.gensym();
        assert_ne!(g1, user);
        assert_ne!(g1, g2);
        assert!(g1.name().contains(' '));
    }
}
