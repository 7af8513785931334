// The cons arena and its mark-sweep collector.
//
// Pairs are the only values that can form reference cycles, so they are
// the only values under tracing collection; strings, vectors, ports,
// procedures and environments stay reference-counted. The arena keeps one
// strong reference to every allocated cell. Sweeping an unreachable cell
// first clears its car and cdr, which breaks any cycle running through
// it, and then drops the arena reference; the cell is freed once the last
// outside reference disappears.
//
// Pair values are `Rc<Cons>`, so pointers taken before a collection stay
// valid after it for every surviving cell.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info};

use crate::env::Frame;
use crate::proc::Procedure;
use crate::value::Value;

/// Collection is due after this many fresh allocations.
pub const GC_STEP: usize = 10_000;

pub struct Cons {
    pub(crate) car: RefCell<Value>,
    pub(crate) cdr: RefCell<Value>,
    mark: Cell<bool>,
}

pub struct Heap {
    store: Vec<Rc<Cons>>,
    last_size: usize,
    gc_step: usize,
    logging: bool,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::with_step(GC_STEP)
    }

    pub fn with_step(gc_step: usize) -> Heap {
        Heap {
            store: Vec::new(),
            last_size: 0,
            gc_step: gc_step.max(1),
            logging: false,
        }
    }

    pub fn set_logging(&mut self, on: bool) {
        self.logging = on;
    }

    /// Allocate a fresh pair in the arena.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Value {
        let cell = Rc::new(Cons {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
            mark: Cell::new(false),
        });
        self.store.push(cell.clone());
        Value::Pair(cell)
    }

    /// Build a proper list from the items.
    pub fn list(&mut self, items: Vec<Value>) -> Value {
        let mut tail = Value::Nil;
        for item in items.into_iter().rev() {
            tail = self.cons(item, tail);
        }
        tail
    }

    /// Build a list with an explicit (possibly non-nil) tail.
    pub fn improper_list(&mut self, items: Vec<Value>, tail: Value) -> Value {
        let mut tail = tail;
        for item in items.into_iter().rev() {
            tail = self.cons(item, tail);
        }
        tail
    }

    pub fn size(&self) -> usize {
        self.store.len()
    }

    /// Has the arena grown by at least one step since the last collection?
    pub fn should_collect(&self) -> bool {
        self.store.len() >= self.last_size + self.gc_step
    }

    /// Mark everything reachable from the root environment, then drop the
    /// rest. Returns the number of released cells.
    pub fn collect(&mut self, root: &Rc<Frame>) -> usize {
        let mut marker = Marker::new();
        marker.mark_env(root);

        let before = self.store.len();
        let mut kept = Vec::with_capacity(before);
        for cell in self.store.drain(..) {
            if cell.mark.replace(false) {
                kept.push(cell);
            } else {
                // Break cycles through the dead cell so the Rc can drop.
                cell.car.replace(Value::Nil);
                cell.cdr.replace(Value::Nil);
            }
        }
        self.store = kept;
        self.last_size = self.store.len();

        let released = before - self.store.len();
        if self.logging {
            info!(
                "garbage collector released {} cons-cells from {} in total",
                released, before
            );
        } else {
            debug!(
                "garbage collector released {} cons-cells from {} in total",
                released, before
            );
        }
        released
    }

    /// Write the arena table: index, mark bit, car and cdr of every cell.
    pub fn dump(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "store size: {}", self.store.len())?;
        for (i, cell) in self.store.iter().enumerate() {
            writeln!(
                out,
                "{} | mark: {} | {} : {}",
                i,
                cell.mark.get() as u8,
                cell.car.borrow(),
                cell.cdr.borrow()
            )?;
        }
        Ok(())
    }
}

// The mark phase. Side sets keep vectors and environments from being
// visited twice; pair revisits are cut off by the mark bit itself.
struct Marker {
    vset: HashSet<usize>,
    eset: HashSet<usize>,
}

impl Marker {
    fn new() -> Marker {
        Marker {
            vset: HashSet::new(),
            eset: HashSet::new(),
        }
    }

    fn mark_value(&mut self, value: &Value) {
        match value {
            Value::Pair(cell) => self.mark_cons(cell),
            Value::Vector(vec) => self.mark_vector(vec),
            Value::Procedure(proc) => self.mark_proc(proc),
            Value::Env(env) => self.mark_env(env),
            _ => {}
        }
    }

    // Iterate down the cdr so long lists do not recurse; the mark bit
    // guards against cycles.
    fn mark_cons(&mut self, cell: &Rc<Cons>) {
        let mut cur = cell.clone();
        loop {
            if cur.mark.replace(true) {
                return;
            }
            let car = cur.car.borrow().clone();
            self.mark_value(&car);
            let cdr = cur.cdr.borrow().clone();
            match cdr {
                Value::Pair(next) => cur = next,
                other => {
                    self.mark_value(&other);
                    return;
                }
            }
        }
    }

    fn mark_vector(&mut self, vec: &Rc<RefCell<Vec<Value>>>) {
        if !self.vset.insert(Rc::as_ptr(vec) as usize) {
            return;
        }
        let items = vec.borrow().clone();
        for item in &items {
            self.mark_value(item);
        }
    }

    fn mark_proc(&mut self, proc: &Procedure) {
        self.mark_value(&proc.formals());
        self.mark_value(&proc.body());
        self.mark_env(&proc.env());
    }

    fn mark_env(&mut self, env: &Rc<Frame>) {
        let mut cur = Some(env.clone());
        while let Some(frame) = cur {
            if !self.eset.insert(Rc::as_ptr(&frame) as usize) {
                return;
            }
            for value in frame.snapshot() {
                self.mark_value(&value);
            }
            cur = frame.parent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use crate::symbol::SymbolTable;

    fn num(i: i64) -> Value {
        Value::Number(Number::Int(i))
    }

    #[test]
    fn test_cons_stability() {
        let mut heap = Heap::new();
        let first = heap.cons(num(1), num(2));
        for i in 0..10_000 {
            heap.cons(num(i), Value::Nil);
        }
        // The early pair is untouched by later allocations.
        assert_eq!(first.car().unwrap(), num(1));
        assert_eq!(first.cdr().unwrap(), num(2));
    }

    #[test]
    fn test_collect_keeps_rooted() {
        let mut heap = Heap::new();
        let mut syms = SymbolTable::new();
        let root = Frame::root();

        let lst = heap.list(vec![num(1), num(2), num(3)]);
        root.define(syms.intern("keep"), lst.clone());
        for i in 0..100 {
            heap.cons(num(i), Value::Nil);
        }

        let released = heap.collect(&root);
        assert_eq!(released, 100);
        assert_eq!(heap.size(), 3);
        assert_eq!(lst.car().unwrap(), num(1));
        assert_eq!(lst.list_length(), 3);
    }

    #[test]
    fn test_collect_reclaims_cycles() {
        let mut heap = Heap::new();
        let root = Frame::root();

        {
            let a = heap.cons(num(1), Value::Nil);
            let b = heap.cons(num(2), a.clone());
            a.set_cdr(b.clone()).unwrap();
        }
        assert_eq!(heap.size(), 2);
        heap.collect(&root);
        assert_eq!(heap.size(), 0);
    }

    #[test]
    fn test_collect_traces_compounds() {
        let mut heap = Heap::new();
        let mut syms = SymbolTable::new();
        let root = Frame::root();

        let inner = heap.cons(num(1), Value::Nil);
        let vec = Value::Vector(Rc::new(RefCell::new(vec![inner.clone()])));
        root.define(syms.intern("v"), vec);

        let child = Frame::chain(&root);
        let through_env = heap.cons(num(2), Value::Nil);
        child.define(syms.intern("x"), through_env.clone());
        root.define(syms.intern("e"), Value::Env(child));

        heap.collect(&root);
        assert_eq!(heap.size(), 2);
        assert_eq!(inner.car().unwrap(), num(1));
        assert_eq!(through_env.car().unwrap(), num(2));
    }

    #[test]
    fn test_should_collect_threshold() {
        let mut heap = Heap::with_step(10);
        let root = Frame::root();
        assert!(!heap.should_collect());
        for i in 0..10 {
            heap.cons(num(i), Value::Nil);
        }
        assert!(heap.should_collect());
        heap.collect(&root);
        assert!(!heap.should_collect());
    }

    #[test]
    fn test_dump() {
        let mut heap = Heap::new();
        heap.cons(num(1), num(2));
        let mut out = Vec::new();
        heap.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("store size: 1"));
        assert!(text.contains("0 | mark: 0 | 1 : 2"));
    }
}
