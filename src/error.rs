// Error kinds raised by the interpreter.
//
// Errors unwind to the nearest host-level catch; the evaluator never
// catches internally. The REPL and the file loader print them with the
// offending expression and continue.

use std::fmt;
use std::io;

use crate::symbol::Symbol;
use crate::value::{TypeSet, TypeTag, Value};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A primitive received a value of the wrong variant.
    Type { expect: TypeSet, got: TypeTag },
    /// Wrong number of arguments to a procedure or form.
    Arity {
        expected: usize,
        at_least: bool,
        got: usize,
    },
    /// Malformed special form or macro definition.
    Syntax(&'static str, Value),
    /// Lookup or set! on an unknown symbol.
    Unbound(Symbol),
    /// Index out of bounds on a list, string or vector.
    Range(&'static str, Value),
    /// Math outside the operation's domain.
    Domain(&'static str, Value),
    /// A port operation failed.
    Io(String),
    /// Raised by (error msg irritants...).
    User(Value),
}

impl Error {
    pub fn arity(expected: usize, got: usize) -> Error {
        Error::Arity {
            expected,
            at_least: false,
            got,
        }
    }

    pub fn arity_at_least(expected: usize, got: usize) -> Error {
        Error::Arity {
            expected,
            at_least: true,
            got,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e.to_string())
    }
}

fn tag_name(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::None => "#<none>",
        TypeTag::Nil => "()",
        TypeTag::Bool => "#<boolean>",
        TypeTag::Char => "#<character>",
        TypeTag::Intern => "#<primop>",
        TypeTag::Number => "#<number>",
        TypeTag::Symbol => "#<symbol>",
        TypeTag::Pair => "#<pair>",
        TypeTag::Str => "#<string>",
        TypeTag::Vector => "#<vector>",
        TypeTag::Port => "#<port>",
        TypeTag::Function => "#<function>",
        TypeTag::Procedure => "#<procedure>",
        TypeTag::Env => "#<environment>",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Type { expect, got } => {
                write!(f, "wrong argument type: expected ")?;
                for (i, tag) in expect.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{}", tag_name(tag))?;
                }
                write!(f, ", got {}", tag_name(*got))
            }
            Error::Arity {
                expected,
                at_least,
                got,
            } => write!(
                f,
                "wrong number of arguments: expected {}{}, got {}",
                if *at_least { "at least " } else { "" },
                expected,
                got
            ),
            Error::Syntax(msg, val) => {
                if val.is_none() {
                    write!(f, "syntax error: {}", msg)
                } else {
                    write!(f, "syntax error: {}: {}", msg, val)
                }
            }
            Error::Unbound(sym) => write!(f, "unbound variable: {}", sym),
            Error::Range(msg, val) => write!(f, "range error: {}: {}", msg, val),
            Error::Domain(msg, val) => write!(f, "domain error: {}: {}", msg, val),
            Error::Io(msg) => write!(f, "i/o error: {}", msg),
            Error::User(val) => write!(f, "error: {}", val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;

    #[test]
    fn test_display() {
        let e = Error::Type {
            expect: TypeTag::Number | TypeTag::Str,
            got: TypeTag::Bool,
        };
        let msg = e.to_string();
        assert!(msg.contains("#<number>"));
        assert!(msg.contains("#<string>"));
        assert!(msg.contains("#<boolean>"));

        let e = Error::arity(2, 3);
        assert_eq!(e.to_string(), "wrong number of arguments: expected 2, got 3");
        let e = Error::arity_at_least(1, 0);
        assert_eq!(
            e.to_string(),
            "wrong number of arguments: expected at least 1, got 0"
        );

        let e = Error::Domain("divide by zero", Value::Number(Number::Int(1)));
        assert!(e.to_string().contains("divide by zero"));
    }
}
