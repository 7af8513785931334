// Rendering values as text.
//
// write produces the readable form: strings quoted and escaped, character
// literals prefixed. display produces raw text for human output. Both are
// total: a cycle through a pair or vector renders as "..." at the point
// the printer would revisit a node on the current path.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Adapter selecting the display (human-readable) form:
/// `format!("{}", Displayed(&v))`.
pub struct Displayed<'a>(pub &'a Value);

impl<'a> fmt::Display for Displayed<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        print(self.0, f, true, &mut HashSet::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        print(self, f, false, &mut HashSet::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        print(self, f, false, &mut HashSet::new())
    }
}

fn write_char(c: char, f: &mut fmt::Formatter) -> fmt::Result {
    match c {
        ' ' => write!(f, "#\\space"),
        '\n' => write!(f, "#\\newline"),
        '\t' => write!(f, "#\\tab"),
        '\r' => write!(f, "#\\return"),
        '\0' => write!(f, "#\\null"),
        '\x07' => write!(f, "#\\alarm"),
        '\x08' => write!(f, "#\\backspace"),
        '\x7f' => write!(f, "#\\delete"),
        '\x1b' => write!(f, "#\\escape"),
        c => write!(f, "#\\{}", c),
    }
}

fn write_string(s: &str, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

// The seen set holds arena and vector addresses on the current print
// path; nodes are removed on exit so shared acyclic structure prints in
// full while true cycles cut off with "...".
fn print(
    value: &Value,
    f: &mut fmt::Formatter,
    display: bool,
    seen: &mut HashSet<usize>,
) -> fmt::Result {
    match value {
        Value::None => write!(f, "#<none>"),
        Value::Nil => write!(f, "()"),
        Value::Bool(true) => write!(f, "#t"),
        Value::Bool(false) => write!(f, "#f"),
        Value::Char(c) => {
            if display {
                write!(f, "{}", c)
            } else {
                write_char(*c, f)
            }
        }
        Value::Intern(op) => write!(f, "#<primop {}>", op.name()),
        Value::Number(n) => write!(f, "{}", n),
        Value::Symbol(sym) => write!(f, "{}", sym),
        Value::Str(s) => {
            if display {
                write!(f, "{}", s.borrow())
            } else {
                write_string(&s.borrow(), f)
            }
        }
        Value::Pair(cell) => {
            let key = Rc::as_ptr(cell) as usize;
            if !seen.insert(key) {
                return write!(f, "...");
            }
            write!(f, "(")?;
            print(&cell.car.borrow().clone(), f, display, seen)?;
            let mut spine = vec![key];
            let mut cur = cell.cdr.borrow().clone();
            loop {
                match cur {
                    Value::Nil => break,
                    Value::Pair(next) => {
                        let key = Rc::as_ptr(&next) as usize;
                        if !seen.insert(key) {
                            write!(f, " ...")?;
                            break;
                        }
                        spine.push(key);
                        write!(f, " ")?;
                        print(&next.car.borrow().clone(), f, display, seen)?;
                        cur = next.cdr.borrow().clone();
                    }
                    tail => {
                        write!(f, " . ")?;
                        print(&tail, f, display, seen)?;
                        break;
                    }
                }
            }
            for key in spine {
                seen.remove(&key);
            }
            write!(f, ")")
        }
        Value::Vector(vec) => {
            let key = Rc::as_ptr(vec) as usize;
            if !seen.insert(key) {
                return write!(f, "...");
            }
            write!(f, "#(")?;
            let items = vec.borrow().clone();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                print(item, f, display, seen)?;
            }
            seen.remove(&key);
            write!(f, ")")
        }
        Value::Port(_) => write!(f, "#<port>"),
        Value::Function(fun) => write!(f, "#<function {}>", fun.name()),
        Value::Procedure(p) => {
            if p.is_macro() {
                write!(f, "#<macro>")
            } else {
                write!(f, "#<procedure>")
            }
        }
        Value::Env(_) => write!(f, "#<environment>"),
    }
}
