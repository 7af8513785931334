// Closures and host functions.
//
// A procedure captures its definition environment, a formals value and a
// non-empty body list, plus the macro flag. Formals take three shapes: a
// single symbol binding the whole argument list, a proper list of
// distinct symbols, or a dotted list whose tail symbol takes the
// remaining arguments.

use std::rc::Rc;

use crate::env::{Env, Frame};
use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::prims::Opcode;
use crate::symbol::Symbol;
use crate::value::Value;

#[derive(Clone)]
pub struct Procedure(Rc<Closure>);

struct Closure {
    env: Env,
    formals: Value,
    body: Value,
    is_macro: bool,
}

/// Formal parameters must be symbols and must not repeat.
fn is_unique_symbol_list(formals: &Value) -> bool {
    match formals {
        Value::Nil | Value::Symbol(_) => return true,
        Value::Pair(_) => {}
        _ => return false,
    }
    let mut seen: Vec<Symbol> = Vec::new();
    let mut cur = formals.clone();
    while let Value::Pair(cell) = cur {
        match &*cell.car.borrow() {
            Value::Symbol(sym) => {
                if seen.contains(sym) {
                    return false;
                }
                seen.push(sym.clone());
            }
            _ => return false,
        }
        cur = cell.cdr.borrow().clone();
    }
    match cur {
        Value::Nil => true,
        Value::Symbol(sym) => !seen.contains(&sym),
        _ => false,
    }
}

impl Procedure {
    pub fn new(env: &Env, formals: Value, body: Value, is_macro: bool) -> Result<Procedure> {
        if !is_unique_symbol_list(&formals) {
            return Err(Error::Syntax(
                "formal parameters must be distinct symbols",
                formals,
            ));
        }
        if !body.is_pair() {
            return Err(Error::Syntax("procedure body must not be empty", body));
        }
        Ok(Procedure(Rc::new(Closure {
            env: env.clone(),
            formals,
            body,
            is_macro,
        })))
    }

    pub fn is_macro(&self) -> bool {
        self.0.is_macro
    }

    pub fn env(&self) -> Env {
        self.0.env.clone()
    }

    pub fn formals(&self) -> Value {
        self.0.formals.clone()
    }

    pub fn body(&self) -> Value {
        self.0.body.clone()
    }

    pub fn ptr_eq(&self, other: &Procedure) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live references to the shared closure.
    pub fn use_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    fn bind(env: &Env, formal: Value, value: Value) -> Result<()> {
        env.define(formal.cast()?, value);
        Ok(())
    }

    fn arity_error(&self, got_pairs: i64) -> Error {
        let expected = self.0.formals.list_length() as usize;
        Error::arity(expected, got_pairs.max(0) as usize)
    }

    /// Evaluate the arguments in the caller environment and bind them to
    /// the formals in a fresh child of the captured environment. Returns
    /// the new environment and the body list for the evaluator to re-enter.
    ///
    /// In apply mode all but the last argument are evaluated normally; the
    /// last must evaluate to a list, whose elements are bound without
    /// re-evaluation.
    pub fn apply(
        &self,
        scm: &mut Interp,
        env: &Env,
        args: Value,
        is_list: bool,
    ) -> Result<(Env, Value)> {
        let newenv = Frame::chain(&self.0.env);
        let mut iter = self.0.formals.clone();
        let given = args.list_length();

        if is_list {
            let mut rest = args;
            while iter.is_pair() && rest.is_pair() {
                Self::bind(&newenv, iter.car()?, scm.eval(env, rest.car()?)?)?;
                iter = iter.cdr()?;
                rest = rest.cdr()?;
            }
            match &iter {
                // Dotted tail or single-symbol formals: the remaining
                // expressions evaluate into a fresh list.
                Value::Symbol(sym) => {
                    let rest = scm.eval_list(env, rest, true)?;
                    newenv.define(sym.clone(), rest);
                }
                Value::Nil if rest.is_nil() => {}
                _ => return Err(self.arity_error(given)),
            }
        } else {
            let mut rest = args;
            while iter.is_pair() && rest.is_pair() && rest.cdr()?.is_pair() {
                Self::bind(&newenv, iter.car()?, scm.eval(env, rest.car()?)?)?;
                iter = iter.cdr()?;
                rest = rest.cdr()?;
            }
            if rest.is_pair() && rest.cdr()?.is_nil() {
                // The trailing expression supplies a list of arguments
                // that are spread without re-evaluation.
                let mut spread = scm.eval(env, rest.car()?)?;
                while iter.is_pair() && spread.is_pair() {
                    Self::bind(&newenv, iter.car()?, spread.car()?)?;
                    iter = iter.cdr()?;
                    spread = spread.cdr()?;
                }
                match &iter {
                    Value::Symbol(sym) => newenv.define(sym.clone(), spread),
                    Value::Nil if spread.is_nil() => {}
                    _ => return Err(self.arity_error(given)),
                }
            } else if rest.is_pair() {
                // Formals exhausted with arguments left over; only a rest
                // symbol can absorb them.
                match &iter {
                    Value::Symbol(sym) => {
                        let rest = scm.eval_list(env, rest, false)?;
                        newenv.define(sym.clone(), rest);
                    }
                    _ => return Err(self.arity_error(given)),
                }
            } else {
                match &iter {
                    Value::Symbol(sym) => newenv.define(sym.clone(), Value::Nil),
                    Value::Nil => {}
                    _ => return Err(self.arity_error(given)),
                }
            }
        }
        Ok((newenv, self.0.body.clone()))
    }

    /// Expand a macro call. The formals bind the unevaluated operands;
    /// the body runs in that environment; the call-site pair is
    /// destructively rewritten to `(begin v)` so expansion happens once
    /// per site.
    pub fn expand(&self, scm: &mut Interp, expr: &Value) -> Result<Value> {
        if !self.is_macro() {
            return Err(Error::Syntax("not a macro", expr.clone()));
        }
        let newenv = Frame::chain(&self.0.env);
        let mut iter = self.0.formals.clone();
        let mut args = expr.cdr()?;
        let given = args.list_length();

        while iter.is_pair() && args.is_pair() {
            Self::bind(&newenv, iter.car()?, args.car()?)?;
            iter = iter.cdr()?;
            args = args.cdr()?;
        }
        match &iter {
            Value::Symbol(sym) => newenv.define(sym.clone(), args),
            Value::Nil if args.is_nil() => {}
            _ => return Err(self.arity_error(given)),
        }

        let mut body = self.0.body.clone();
        let mut expansion = Value::None;
        while let Value::Pair(cell) = body.clone() {
            expansion = scm.eval(&newenv, cell.car.borrow().clone())?;
            body = cell.cdr.borrow().clone();
        }

        expr.set_car(Value::Intern(Opcode::Begin))?;
        let tail = scm.heap.cons(expansion.clone(), Value::Nil);
        expr.set_cdr(tail)?;
        Ok(expansion)
    }
}

/// A named host callable bound into an environment.
pub struct Function {
    name: Symbol,
    func: Box<dyn Fn(&mut Interp, &Env, &[Value]) -> Result<Value>>,
}

impl Function {
    pub fn new<F>(name: Symbol, func: F) -> Function
    where
        F: Fn(&mut Interp, &Env, &[Value]) -> Result<Value> + 'static,
    {
        Function {
            name,
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn call(&self, scm: &mut Interp, env: &Env, args: &[Value]) -> Result<Value> {
        (self.func)(scm, env, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use crate::symbol::SymbolTable;

    fn sym(tab: &mut SymbolTable, s: &str) -> Value {
        Value::Symbol(tab.intern(s))
    }

    #[test]
    fn test_formals_shapes() {
        let mut tab = SymbolTable::new();
        let mut heap = Heap::new();
        let env = Frame::root();
        let body = heap.list(vec![Value::Bool(true)]);

        // Single symbol.
        assert!(Procedure::new(&env, sym(&mut tab, "rest"), body.clone(), false).is_ok());
        // Proper list.
        let formals = heap.list(vec![sym(&mut tab, "a"), sym(&mut tab, "b")]);
        assert!(Procedure::new(&env, formals, body.clone(), false).is_ok());
        // Dotted list.
        let a = sym(&mut tab, "a");
        let r = sym(&mut tab, "r");
        let dotted = heap.improper_list(vec![a], r);
        assert!(Procedure::new(&env, dotted, body.clone(), false).is_ok());
        // Nil formals.
        assert!(Procedure::new(&env, Value::Nil, body, false).is_ok());
    }

    #[test]
    fn test_duplicate_formals_rejected() {
        let mut tab = SymbolTable::new();
        let mut heap = Heap::new();
        let env = Frame::root();
        let body = heap.list(vec![Value::Bool(true)]);

        let formals = heap.list(vec![sym(&mut tab, "x"), sym(&mut tab, "x")]);
        assert!(matches!(
            Procedure::new(&env, formals, body.clone(), false),
            Err(Error::Syntax(_, _))
        ));

        // Dotted tail repeating a positional formal.
        let x = sym(&mut tab, "x");
        let dotted = heap.improper_list(vec![x.clone()], x);
        assert!(Procedure::new(&env, dotted, body, false).is_err());
    }

    #[test]
    fn test_non_symbol_formals_rejected() {
        let mut heap = Heap::new();
        let env = Frame::root();
        let body = heap.list(vec![Value::Bool(true)]);
        let formals = heap.list(vec![Value::Bool(true)]);
        assert!(Procedure::new(&env, formals, body, false).is_err());
    }

    #[test]
    fn test_empty_body_rejected() {
        let env = Frame::root();
        assert!(Procedure::new(&env, Value::Nil, Value::Nil, false).is_err());
    }
}
