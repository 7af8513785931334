// The interpreter object and its embedding surface.
//
// An Interp owns the symbol table, the cons arena, the standard ports
// and the top frame, which is seeded with the builtin table, the derived
// binding forms and the mathematical constants. Collection runs between
// top-level expressions, rooted at the environment in use.

use std::cell::RefCell;
use std::f64::consts;
use std::rc::Rc;

use crate::clock::Clock;
use crate::config::Config;
use crate::env::{Env, Frame};
use crate::error::Result;
use crate::heap::Heap;
use crate::port::Port;
use crate::prims::{self, Opcode};
use crate::proc::Function;
use crate::reader::Reader;
use crate::symbol::{Symbol, SymbolTable};
use crate::number::Number;
use crate::value::{expected, TypeTag, Value};

// Derived binding forms, defined in the language itself. Expansion
// rewrites each call site once.
const PRELUDE: &str = r#"
(define-macro (let spec . body)
  (if (symbol? spec)
      ((lambda (bindings)
         (list 'letrec
               (list (list spec (cons 'lambda (cons (map car bindings) (cdr body)))))
               (cons spec (map cadr bindings))))
       (car body))
      (cons (cons 'lambda (cons (map car spec) body))
            (map cadr spec))))

(define-macro (letrec bindings . body)
  (cons (cons 'lambda
              (cons (map car bindings)
                    (append (map (lambda (b) (list 'set! (car b) (cadr b))) bindings)
                            body)))
        (map (lambda (b) #f) bindings)))

(define-macro (let* bindings . body)
  (if (null? bindings)
      (cons 'begin body)
      (list 'let (list (car bindings))
            (cons 'let* (cons (cdr bindings) body)))))
"#;

pub struct Interp {
    pub heap: Heap,
    pub clock: Clock,
    symtab: SymbolTable,
    topenv: Env,
    config: Config,
    stdin: Value,
    stdout: Value,
    stderr: Value,
}

impl Interp {
    pub fn new() -> Interp {
        Interp::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Interp {
        let mut heap = Heap::with_step(config.gc_step);
        heap.set_logging(config.gc_logging);

        let mut scm = Interp {
            heap,
            clock: Clock::new(),
            symtab: SymbolTable::new(),
            topenv: Frame::root(),
            config,
            stdin: Value::Port(Rc::new(RefCell::new(Port::stdin()))),
            stdout: Value::Port(Rc::new(RefCell::new(Port::stdout()))),
            stderr: Value::Port(Rc::new(RefCell::new(Port::stderr()))),
        };
        scm.seed_topenv();
        let topenv = scm.topenv.clone();
        scm.eval_str(&topenv, PRELUDE)
            .expect("the builtin prelude must load");
        scm
    }

    fn seed_topenv(&mut self) {
        for (name, op) in prims::BUILTINS {
            let sym = self.symtab.intern(name);
            self.topenv.define(sym, Value::Intern(*op));
        }
        let constants: &[(&str, f64)] = &[
            ("pi", consts::PI),
            ("%pi", consts::PI),
            ("%e", consts::E),
            ("%G", 6.67430e-11),
            ("%c", 2.99792458e8),
            ("%h", 6.62607015e-34),
            ("%NA", 6.02214076e23),
            ("%R", 8.31446261815324),
        ];
        for (name, x) in constants {
            let sym = self.symtab.intern(name);
            self.topenv.define(sym, Value::Number(Number::from(*x)));
        }
    }

    /// The top frame; it outlives every child environment.
    pub fn topenv(&self) -> Env {
        self.topenv.clone()
    }

    /// A fresh child frame of the given environment, or of the top frame.
    pub fn mkenv(&self, parent: Option<&Env>) -> Env {
        Frame::chain(parent.unwrap_or(&self.topenv))
    }

    pub fn mksym(&mut self, name: &str) -> Symbol {
        self.symtab.intern(name)
    }

    pub fn gensym(&mut self) -> Symbol {
        self.symtab.gensym()
    }

    /// Bind a name in an environment.
    pub fn define(&mut self, env: &Env, name: &str, value: Value) {
        let sym = self.mksym(name);
        env.define(sym, value);
    }

    /// Bind a host callable into the top frame and return it.
    pub fn mkfun<F>(&mut self, name: &str, func: F) -> Value
    where
        F: Fn(&mut Interp, &Env, &[Value]) -> Result<Value> + 'static,
    {
        let sym = self.mksym(name);
        let fun = Value::Function(Rc::new(Function::new(sym.clone(), func)));
        self.topenv.define(sym, fun.clone());
        fun
    }

    pub fn cons(&mut self, car: Value, cdr: Value) -> Value {
        self.heap.cons(car, cdr)
    }

    pub fn list(&mut self, items: Vec<Value>) -> Value {
        self.heap.list(items)
    }

    pub fn stdin_port(&self) -> Value {
        self.stdin.clone()
    }

    pub fn stdout_port(&self) -> Value {
        self.stdout.clone()
    }

    pub fn stderr_port(&self) -> Value {
        self.stderr.clone()
    }

    /// Call a procedure value on already evaluated arguments.
    pub fn apply_values(&mut self, env: &Env, proc: &Value, args: Vec<Value>) -> Result<Value> {
        match proc {
            Value::Procedure(_) | Value::Function(_) => {}
            Value::Intern(op) if !op.is_syntax() => {}
            other => {
                return Err(expected(
                    TypeTag::Procedure | TypeTag::Function | TypeTag::Intern,
                    other,
                ))
            }
        }
        // (apply 'proc '(args ...)): quoting keeps both halves from a
        // second evaluation.
        let arglist = self.heap.list(args);
        let quoted_args = self.quote(arglist);
        let quoted_proc = self.quote(proc.clone());
        let expr = self
            .heap
            .list(vec![Value::Intern(Opcode::Apply), quoted_proc, quoted_args]);
        self.eval(env, expr)
    }

    /// Read and evaluate every expression in the source text; the value
    /// of the last one is returned.
    pub fn eval_str(&mut self, env: &Env, src: &str) -> Result<Value> {
        let port = Rc::new(RefCell::new(Port::in_string(src)));
        let mut reader = Reader::new();
        let mut result = Value::None;
        while let Some(expr) = reader.read(self, &port)? {
            result = self.eval(env, expr)?;
        }
        Ok(result)
    }

    /// Read the file and evaluate each top-level expression, reporting
    /// per-expression errors without propagating them.
    pub fn load(&mut self, path: &str, env: Option<&Env>) -> Result<()> {
        let env = match env {
            Some(e) => e.clone(),
            None => self.topenv(),
        };
        let port = Rc::new(RefCell::new(Port::open_in(path)?));
        let mut reader = Reader::new();
        loop {
            match reader.read(self, &port) {
                Ok(None) => return Ok(()),
                Ok(Some(expr)) => {
                    let context = expr.clone();
                    if let Err(e) = self.eval(&env, expr) {
                        eprintln!("{}: {}", e, context);
                    }
                    self.maybe_collect(&env);
                }
                Err(e) => {
                    // The reader lost sync; give up on the rest of the
                    // file.
                    eprintln!("{}", e);
                    return Ok(());
                }
            }
        }
    }

    /// The prompt loop: read one expression, evaluate, print the result
    /// unless it is the no-result marker; return on the exit sentinel or
    /// end of input.
    pub fn repl(&mut self, env: Option<&Env>) {
        let env = match env {
            Some(e) => Frame::chain(e),
            None => Frame::chain(&self.topenv),
        };
        let port: Rc<RefCell<Port>> = self.stdin.cast().expect("stdin is a port");
        let mut reader = Reader::new();
        loop {
            print!("{}", self.config.prompt);
            let _ = std::io::Write::flush(&mut std::io::stdout());
            match reader.read(self, &port) {
                Ok(None) => return,
                Ok(Some(expr)) => {
                    let context = expr.clone();
                    match self.eval(&env, expr) {
                        Ok(v) if v.is_exit() => return,
                        Ok(v) if v.is_none() => {}
                        Ok(v) => println!("{}", v),
                        Err(e) => println!("{}: {}", e, context),
                    }
                    self.maybe_collect(&env);
                }
                Err(e) => println!("{}", e),
            }
        }
    }

    /// Force a collection rooted at the given environment.
    pub fn collect(&mut self, env: &Env) -> usize {
        self.heap.collect(env)
    }

    /// Collect if the arena has grown by a step since the last cycle.
    pub fn maybe_collect(&mut self, env: &Env) {
        if self.heap.should_collect() {
            self.heap.collect(env);
        }
    }
}
