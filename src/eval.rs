// The trampolined evaluator.
//
// eval runs a single loop over an (env, expr) pair. Special forms in tail
// position rewrite the pair and re-enter the loop; everything else
// returns. Procedure application binds formals into a fresh frame, sets
// env to it and expr to the body tail, so deep tail recursion costs no
// host stack. Recursion happens only for operator and non-tail operand
// evaluation.

use crate::env::Env;
use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::prims::{self, Opcode};
use crate::proc::Procedure;
use crate::symbol::Symbol;
use crate::value::Value;

impl Interp {
    /// Evaluate an expression: symbols look up, non-pairs self-evaluate,
    /// pairs apply their operator to the operand list.
    pub fn eval(&mut self, env: &Env, expr: Value) -> Result<Value> {
        let mut env = env.clone();
        let mut expr = expr;

        loop {
            match &expr {
                Value::Symbol(sym) => return env.get(sym),
                Value::Pair(_) => {}
                _ => return Ok(expr),
            }
            let call_site = expr.clone();
            let args = expr.cdr()?;
            let proc = self.eval(&env, expr.car()?)?;

            match proc {
                Value::Function(f) => {
                    let argv = self.eval_args(&env, args, true)?;
                    return f.call(self, &env, &argv);
                }
                Value::Procedure(p) => {
                    if p.is_macro() {
                        expr = p.expand(self, &call_site)?;
                    } else {
                        let (newenv, body) = p.apply(self, &env, args, true)?;
                        env = newenv;
                        expr = self.body_tail(&env, body)?;
                    }
                }
                Value::Intern(op) => match op {
                    Opcode::Quote => {
                        return args
                            .car()
                            .map_err(|_| Error::Syntax("quote expects one operand", call_site));
                    }
                    Opcode::Define => return self.syntax_define(&env, args),
                    Opcode::Macro => return self.syntax_macro(&env, args),
                    Opcode::SetBang => return self.syntax_set(&env, args),
                    Opcode::Lambda => {
                        let p = Procedure::new(&env, args.car()?, args.cdr()?, false)?;
                        return Ok(Value::Procedure(p));
                    }
                    Opcode::Begin => expr = self.body_tail(&env, args)?,
                    Opcode::If => expr = self.syntax_if(&env, args)?,
                    Opcode::Cond => expr = self.syntax_cond(&env, args)?,
                    Opcode::When => expr = self.syntax_when(&env, args)?,
                    Opcode::Unless => expr = self.syntax_unless(&env, args)?,
                    Opcode::And => expr = self.syntax_and(&env, args)?,
                    Opcode::Or => expr = self.syntax_or(&env, args)?,
                    Opcode::Apply => {
                        let target = self.eval(&env, args.car()?)?;
                        let rest = args.cdr()?;
                        match target {
                            Value::Procedure(p) => {
                                if p.is_macro() {
                                    expr = p.expand(self, &args)?;
                                } else {
                                    let (newenv, body) = p.apply(self, &env, rest, false)?;
                                    env = newenv;
                                    expr = self.body_tail(&env, body)?;
                                }
                            }
                            Value::Function(f) => {
                                let argv = self.eval_args(&env, rest, false)?;
                                return f.call(self, &env, &argv);
                            }
                            Value::Intern(op) if !op.is_syntax() => {
                                let argv = self.eval_args(&env, rest, false)?;
                                return prims::call(self, &env, op, &argv);
                            }
                            other => {
                                return Err(Error::Syntax("apply to a non-procedure", other));
                            }
                        }
                    }
                    Opcode::Else | Opcode::Arrow => {
                        return Err(Error::Syntax("misplaced syntax keyword", call_site));
                    }
                    Opcode::Quasiquote | Opcode::Unquote | Opcode::UnquoteSplice => {
                        return Err(Error::Syntax(
                            "quasiquotation is resolved by the reader",
                            call_site,
                        ));
                    }
                    op => {
                        let argv = self.eval_args(&env, args, true)?;
                        return prims::call(self, &env, op, &argv);
                    }
                },
                other => return Err(Error::Syntax("operator is not callable", other)),
            }
        }
    }

    /// Evaluate every expression of a body except the last and hand the
    /// last one back unevaluated, keeping it in tail position.
    pub fn body_tail(&mut self, env: &Env, body: Value) -> Result<Value> {
        let mut body = body;
        if !body.is_pair() {
            return Ok(Value::None);
        }
        loop {
            let tail = body.cdr()?;
            if tail.is_nil() {
                return body.car();
            }
            if !tail.is_pair() {
                return Err(Error::Syntax("improper expression list", body));
            }
            let head = body.car()?;
            self.eval(env, head)?;
            body = tail;
        }
    }

    /// Evaluate an operand list into an argument vector.
    ///
    /// In call mode every spine element is evaluated and a non-nil tail
    /// is a syntax error. In apply mode the last element is evaluated and
    /// spread: it must yield nil or a proper list, whose elements join
    /// the vector unevaluated.
    pub fn eval_args(&mut self, env: &Env, args: Value, is_list: bool) -> Result<Vec<Value>> {
        let mut argv = Vec::new();
        let mut args = args;

        if is_list {
            while let Value::Pair(cell) = args.clone() {
                let head = cell.car.borrow().clone();
                argv.push(self.eval(env, head)?);
                args = cell.cdr.borrow().clone();
            }
            if !args.is_nil() {
                return Err(Error::Syntax("improper argument list", args));
            }
            return Ok(argv);
        }

        let mut last = Value::Nil;
        while let Value::Pair(cell) = args.clone() {
            let head = cell.car.borrow().clone();
            last = self.eval(env, head)?;
            argv.push(last.clone());
            args = cell.cdr.borrow().clone();
        }
        if last.is_nil() {
            argv.pop();
            return Ok(argv);
        }
        argv.pop();
        let mut rest = last;
        while let Value::Pair(cell) = rest.clone() {
            argv.push(cell.car.borrow().clone());
            rest = cell.cdr.borrow().clone();
        }
        if !rest.is_nil() {
            return Err(Error::Syntax(
                "apply expects a proper list of arguments",
                rest,
            ));
        }
        Ok(argv)
    }

    /// Evaluate an operand list into a fresh heap list; used to bind a
    /// rest parameter.
    pub fn eval_list(&mut self, env: &Env, args: Value, is_list: bool) -> Result<Value> {
        let argv = self.eval_args(env, args, is_list)?;
        Ok(self.heap.list(argv))
    }

    fn define_symbol(target: &Value) -> Result<Symbol> {
        target
            .cast()
            .map_err(|_| Error::Syntax("expected a symbol to bind", target.clone()))
    }

    fn syntax_define(&mut self, env: &Env, args: Value) -> Result<Value> {
        if !args.is_pair() {
            return Err(Error::Syntax("define needs a target", args));
        }
        let target = args.car()?;
        if target.is_pair() {
            // (define (name . formals) body...)
            let name = Self::define_symbol(&target.car()?)?;
            let proc = Procedure::new(env, target.cdr()?, args.cdr()?, false)?;
            env.define(name, Value::Procedure(proc));
        } else {
            let name = Self::define_symbol(&target)?;
            let value = self.eval(env, args.cadr()?)?;
            env.define(name, value);
        }
        Ok(Value::None)
    }

    // (define-macro (name . formals) body...)
    fn syntax_macro(&mut self, env: &Env, args: Value) -> Result<Value> {
        let target = args.car()?;
        if !target.is_pair() {
            return Err(Error::Syntax(
                "define-macro expects (name . formals)",
                target,
            ));
        }
        let name = Self::define_symbol(&target.car()?)?;
        let proc = Procedure::new(env, target.cdr()?, args.cdr()?, true)?;
        env.define(name, Value::Procedure(proc));
        Ok(Value::None)
    }

    fn syntax_set(&mut self, env: &Env, args: Value) -> Result<Value> {
        let name: Symbol = Self::define_symbol(&args.car()?)?;
        let value = self.eval(env, args.cadr()?)?;
        env.set(&name, value)?;
        Ok(Value::None)
    }

    fn syntax_if(&mut self, env: &Env, args: Value) -> Result<Value> {
        let test = self.eval(env, args.car()?)?;
        if test.is_true() {
            args.cadr()
        } else {
            let alt = args.cddr()?;
            if alt.is_nil() {
                Ok(Value::None)
            } else {
                alt.car()
            }
        }
    }

    fn syntax_when(&mut self, env: &Env, args: Value) -> Result<Value> {
        let test = self.eval(env, args.car()?)?;
        if test.is_true() {
            self.body_tail(env, args.cdr()?)
        } else {
            Ok(Value::None)
        }
    }

    fn syntax_unless(&mut self, env: &Env, args: Value) -> Result<Value> {
        let test = self.eval(env, args.car()?)?;
        if test.is_false() {
            self.body_tail(env, args.cdr()?)
        } else {
            Ok(Value::None)
        }
    }

    fn syntax_and(&mut self, env: &Env, args: Value) -> Result<Value> {
        if !args.is_pair() {
            return Ok(Value::Bool(true));
        }
        let mut args = args;
        loop {
            let tail = args.cdr()?;
            if tail.is_nil() {
                // Last expression stays unevaluated for the trampoline.
                return args.car();
            }
            if !tail.is_pair() {
                return Err(Error::Syntax("improper expression list", args));
            }
            let head = args.car()?;
            if self.eval(env, head)?.is_false() {
                return Ok(Value::Bool(false));
            }
            args = tail;
        }
    }

    fn syntax_or(&mut self, env: &Env, args: Value) -> Result<Value> {
        if !args.is_pair() {
            return Ok(Value::Bool(false));
        }
        let mut args = args;
        loop {
            let tail = args.cdr()?;
            if tail.is_nil() {
                return args.car();
            }
            if !tail.is_pair() {
                return Err(Error::Syntax("improper expression list", args));
            }
            let head = args.car()?;
            let value = self.eval(env, head)?;
            if value.is_true() {
                // Protect the already-evaluated value from a second
                // evaluation round.
                return Ok(self.quote(value));
            }
            args = tail;
        }
    }

    // Find the first clause with a true test; a (test => proc) clause
    // applies proc to the test value.
    fn syntax_cond(&mut self, env: &Env, args: Value) -> Result<Value> {
        let mut test = Value::Bool(false);
        let mut body = Value::Nil;
        let mut args = args;

        while args.is_pair() {
            let clause = args.car()?;
            if !clause.is_pair() {
                return Err(Error::Syntax("invalid cond clause", clause));
            }
            if test.is_false() {
                test = self.eval(env, clause.car()?)?;
                if test.is_true() {
                    body = clause.cdr()?;
                }
            }
            args = args.cdr()?;
        }
        if test.is_false() {
            return Ok(Value::None);
        }
        if body.is_nil() {
            // A clause of the bare form (test): its value is the test.
            return Ok(self.quote(test));
        }
        let first = body.car()?;
        let is_arrow =
            first.is_arrow() || (first.is_symbol() && self.eval(env, first.clone())?.is_arrow());
        if is_arrow {
            if test.is_else() {
                return Err(Error::Syntax("else clause takes no =>", body));
            }
            let mut exprs = body.cdr()?;
            if !exprs.is_pair() {
                return Err(Error::Syntax("=> expects a receiver", body));
            }
            // All but the last receiver run here; the last is handed to
            // the trampoline to keep the tail call.
            while exprs.cdr()?.is_pair() {
                let receiver = exprs.car()?;
                let call = self.arrow_apply(receiver, test.clone());
                self.eval(env, call)?;
                exprs = exprs.cdr()?;
            }
            let receiver = exprs.car()?;
            return Ok(self.arrow_apply(receiver, test));
        }
        self.body_tail(env, body)
    }

    // Build (apply receiver (quote test) ()).
    fn arrow_apply(&mut self, receiver: Value, test: Value) -> Value {
        let quoted = self.quote(test);
        self.heap.list(vec![
            Value::Intern(Opcode::Apply),
            receiver,
            quoted,
            Value::Nil,
        ])
    }

    /// Wrap a value so a further evaluation round returns it unchanged.
    pub fn quote(&mut self, value: Value) -> Value {
        self.heap.list(vec![Value::Intern(Opcode::Quote), value])
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::interp::Interp;
    use crate::number::Number;
    use crate::value::Value;

    // Evaluate source text and return the value of its last expression.
    fn run(src: &str) -> crate::error::Result<Value> {
        let mut scm = Interp::new();
        let env = scm.mkenv(None);
        scm.eval_str(&env, src)
    }

    fn assert_runs_to(src: &str, expected: Value) {
        match run(src) {
            Ok(v) => assert_eq!(v, expected, "source: {}", src),
            Err(e) => panic!("{} raised {}", src, e),
        }
    }

    fn num(i: i64) -> Value {
        Value::Number(Number::Int(i))
    }

    #[test]
    fn test_self_evaluating() {
        assert_runs_to("42", num(42));
        assert_runs_to("#t", Value::Bool(true));
        assert_runs_to("\"hi\"", Value::Str(std::rc::Rc::new(std::cell::RefCell::new(
            "hi".to_string(),
        ))));
        assert_runs_to("#\\a", Value::Char('a'));
    }

    #[test]
    fn test_arithmetic() {
        assert_runs_to("(+ 1 2 3)", num(6));
        assert_runs_to("(* 2 (- 10 7))", num(6));
        assert_runs_to("(/ 10 4)", Value::Number(Number::Float(2.5)));
    }

    fn assert_runs_to_symbol(src: &str, name: &str) {
        match run(src) {
            Ok(Value::Symbol(sym)) => assert_eq!(sym.name(), name, "source: {}", src),
            Ok(v) => panic!("{} evaluated to {}, expected symbol {}", src, v, name),
            Err(e) => panic!("{} raised {}", src, e),
        }
    }

    #[test]
    fn test_quote() {
        assert_runs_to_symbol("(quote a) (quote b) 'done", "done");
        assert_runs_to("(car '(1 2))", num(1));
    }

    #[test]
    fn test_if() {
        assert_runs_to("(if #t 1 2)", num(1));
        assert_runs_to("(if #f 1 2)", num(2));
        assert_runs_to("(if #f 1)", Value::None);
        // Only #f is false.
        assert_runs_to("(if 0 'yes 'no) (if '() 'yes 'no) 1", num(1));
    }

    #[test]
    fn test_define_and_set() {
        assert_runs_to("(define x 10) x", num(10));
        assert_runs_to("(define x 1) (set! x 2) x", num(2));
        assert_runs_to("(define (double n) (* 2 n)) (double 21)", num(42));
        assert!(matches!(run("(set! nowhere 1)"), Err(Error::Unbound(_))));
        assert!(matches!(run("unbound"), Err(Error::Unbound(_))));
    }

    #[test]
    fn test_lambda_shapes() {
        assert_runs_to("((lambda (a b) (+ a b)) 1 2)", num(3));
        assert_runs_to("((lambda args (length args)) 1 2 3)", num(3));
        assert_runs_to("((lambda (a . rest) (cons a (length rest))) 1 2 3)", {
            let mut scm = Interp::new();
            let env = scm.mkenv(None);
            scm.eval_str(&env, "(cons 1 2)").unwrap()
        });
        assert!(run("((lambda (a b) a) 1)").is_err());
        assert!(run("((lambda (a) a) 1 2)").is_err());
        assert!(run("(lambda (x x) x)").is_err());
    }

    #[test]
    fn test_closures() {
        assert_runs_to(
            "(define (adder n) (lambda (x) (+ x n)))
             (define add3 (adder 3))
             (add3 39)",
            num(42),
        );
        assert_runs_to(
            "(define (counter)
               (define n 0)
               (lambda () (set! n (+ n 1)) n))
             (define c (counter))
             (c) (c) (c)",
            num(3),
        );
    }

    #[test]
    fn test_begin() {
        assert_runs_to("(begin 1 2 3)", num(3));
        assert_runs_to("(begin)", Value::None);
        assert_runs_to("(define x 0) (begin (set! x 1) (set! x (+ x 1)) x)", num(2));
    }

    #[test]
    fn test_and_or() {
        assert_runs_to("(and)", Value::Bool(true));
        assert_runs_to("(or)", Value::Bool(false));
        assert_runs_to("(and 1 2 3)", num(3));
        assert_runs_to("(and 1 #f 3)", Value::Bool(false));
        assert_runs_to("(or #f 2 3)", num(2));
        assert_runs_to("(or #f #f)", Value::Bool(false));
        // Short circuit: the unbound variable is never evaluated.
        assert_runs_to("(or 1 unbound)", num(1));
        assert_runs_to("(and #f unbound)", Value::Bool(false));
        // A truthy symbol value survives the extra evaluation round.
        assert_runs_to_symbol("(define s 'sym) (or (begin #f) s 1)", "sym");
    }

    #[test]
    fn test_when_unless() {
        assert_runs_to("(when #t 1 2)", num(2));
        assert_runs_to("(when #f 1 2)", Value::None);
        assert_runs_to("(unless #f 'a 'b) 1", num(1));
        assert_runs_to("(unless #t 1)", Value::None);
    }

    #[test]
    fn test_cond() {
        assert_runs_to("(cond (#f 1) (#t 2) (#t 3))", num(2));
        assert_runs_to("(cond (#f 1) (else 42))", num(42));
        assert_runs_to("(cond (#f 1))", Value::None);
        assert_runs_to("(cond (42))", num(42));
        assert_runs_to("(cond ((+ 1 2) => (lambda (n) (* n 10))))", num(30));
        assert!(run("(cond (else => (lambda (x) x)))").is_err());
    }

    #[test]
    fn test_apply() {
        assert_runs_to("(apply + 1 2 '(3 4))", num(10));
        assert_runs_to("(apply + '())", num(0));
        assert_runs_to("(apply (lambda (a b) (- a b)) '(10 4))", num(6));
        assert_runs_to("(apply list 1 '(2 3))", {
            let mut scm = Interp::new();
            let env = scm.mkenv(None);
            scm.eval_str(&env, "'(1 2 3)").unwrap()
        });
    }

    #[test]
    fn test_recursion() {
        assert_runs_to(
            "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1))))) (fact 10)",
            num(3628800),
        );
        assert_runs_to(
            "(define (fib n) (if (<= n 1) n (+ (fib (- n 1)) (fib (- n 2))))) (fib 15)",
            num(610),
        );
    }

    #[test]
    fn test_tail_recursion_depth() {
        // A million tail calls must run in constant host stack.
        assert_runs_to(
            "(define (loop n) (if (= n 0) 'done (loop (- n 1))))
             (loop 1000000) 1",
            num(1),
        );
    }

    #[test]
    fn test_named_let_tail_loop() {
        assert_runs_to(
            "(let loop ((i 0) (a 0)) (if (= i 1000000) a (loop (+ i 1) (+ a 1))))",
            num(1000000),
        );
    }

    #[test]
    fn test_let_forms() {
        assert_runs_to("(let ((a 1) (b 2)) (+ a b))", num(3));
        assert_runs_to("(define x 1) (let ((x 2)) x)", num(2));
        assert_runs_to("(define x 1) (let ((x 2)) 'ignore) x", num(1));
        assert_runs_to("(let* ((a 1) (b (+ a 1))) (* a b))", num(2));
        assert_runs_to(
            "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                      (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))
               (even? 100))",
            Value::Bool(true),
        );
    }

    #[test]
    fn test_macro_expansion() {
        assert_runs_to(
            "(define-macro (when2 t . b) (list 'if t (cons 'begin b)))
             (when2 #t 1 2 3)",
            num(3),
        );
        assert_runs_to(
            "(define-macro (swap! a b)
               (list 'let (list (list 'tmp a))
                 (list 'set! a b)
                 (list 'set! b 'tmp)))
             (define p 1) (define q 2)
             (swap! p q)
             (list p q)",
            {
                let mut scm = Interp::new();
                let env = scm.mkenv(None);
                scm.eval_str(&env, "'(2 1)").unwrap()
            },
        );
    }

    #[test]
    fn test_macro_rewrites_call_site() {
        // Expanding a macro inside a procedure body mutates the body, so
        // a second call takes the expanded path.
        assert_runs_to(
            "(define-macro (inc x) (list '+ x 1))
             (define (f n) (inc n))
             (f 1) (f 41)",
            num(42),
        );
    }

    #[test]
    fn test_eval_primitive() {
        assert_runs_to("(eval '(+ 1 2))", num(3));
        assert_runs_to("(define form (list '* 6 7)) (eval form)", num(42));
    }

    #[test]
    fn test_improper_call_errors() {
        assert!(run("(1 2 3)").is_err());
        assert!(matches!(
            run("(+ 1 . 2)"),
            Err(Error::Syntax(_, _))
        ));
    }

    #[test]
    fn test_scenario_sqrt_complex() {
        assert_runs_to("(define e (sqrt -1)) (* e e)", num(-1));
    }

    #[test]
    fn test_gc_transparency() {
        // Forcing a collection in the middle of a program does not change
        // the observable result.
        assert_runs_to(
            "(define keep (list 1 2 3))
             (define (build n) (if (= n 0) '() (cons n (build (- n 1)))))
             (build 50)
             (gc)
             (length keep)",
            num(3),
        );
    }
}
