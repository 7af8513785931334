// Builtin opcodes and the primitive dispatch table.
//
// Every builtin is identified by an interned opcode; the top frame binds
// the user-visible names to these opcodes. Syntax keywords are handled by
// the evaluator itself; everything else lands in call(), which receives
// the evaluated argument vector.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::json;
use crate::number::{Int, Number};
use crate::port::Port;
use crate::printer::Displayed;
use crate::reader::Reader;
use crate::value::{expected, is_equal, is_eqv, TypeTag, Value};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd)]
pub enum Opcode {
    /* Syntax keywords, handled inside the evaluator. */
    Or,
    And,
    If,
    Cond,
    Else,
    Arrow,
    When,
    Unless,
    Define,
    SetBang,
    Begin,
    Lambda,
    Macro,
    Apply,
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplice,

    /* Equivalence predicates. */
    OpEq,
    OpEqv,
    OpEqual,

    /* Numbers. */
    OpIsNum,
    OpIsCpx,
    OpIsReal,
    OpIsRat,
    OpIsInt,
    OpIsExact,
    OpIsInexact,
    OpIsExactInt,
    OpEx2Inex,
    OpInex2Ex,
    OpIsOdd,
    OpIsEven,
    OpNumEq,
    OpNumLt,
    OpNumGt,
    OpNumLe,
    OpNumGe,
    OpMin,
    OpMax,
    OpIsPos,
    OpIsNeg,
    OpIsZero,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpMod,
    OpRem,
    OpQuotient,
    OpFloor,
    OpCeil,
    OpTrunc,
    OpRound,
    OpSin,
    OpCos,
    OpTan,
    OpASin,
    OpACos,
    OpATan,
    OpSinh,
    OpCosh,
    OpTanh,
    OpASinh,
    OpACosh,
    OpATanh,
    OpSqrt,
    OpCbrt,
    OpExp,
    OpPow,
    OpSquare,
    OpLog,
    OpLog10,
    OpAbs,
    OpReal,
    OpImag,
    OpArg,
    OpConj,
    OpRect,
    OpPolar,
    OpHypot,
    OpStrNum,
    OpNumStr,

    /* Booleans. */
    OpNot,
    OpIsBool,
    OpIsBoolEq,

    /* Pairs and lists. */
    OpCons,
    OpCar,
    OpCdr,
    OpCaar,
    OpCddr,
    OpCadr,
    OpCdar,
    OpCaddr,
    OpSetCar,
    OpSetCdr,
    OpList,
    OpMkList,
    OpIsNil,
    OpIsPair,
    OpIsList,
    OpLength,
    OpAppend,
    OpReverse,
    OpListTail,
    OpListRef,
    OpListSet,
    OpListCopy,
    OpMemq,
    OpMemv,
    OpMember,
    OpAssq,
    OpAssv,
    OpAssoc,

    /* Symbols. */
    OpIsSym,
    OpSymStr,
    OpStrSym,
    OpGensym,

    /* Characters. */
    OpIsChar,
    OpCharEq,
    OpCharLt,
    OpCharGt,
    OpCharLe,
    OpCharGe,
    OpIsAlpha,
    OpIsDigit,
    OpIsWspace,
    OpIsUpper,
    OpIsLower,
    OpCharInt,
    OpIntChar,
    OpDigitVal,
    OpCharUpcase,
    OpCharDowncase,

    /* Strings. */
    OpIsStr,
    OpMkStr,
    OpStr,
    OpStrLen,
    OpStrRef,
    OpStrSet,
    OpStrEq,
    OpStrLt,
    OpStrGt,
    OpStrLe,
    OpStrGe,
    OpStrUpcase,
    OpStrDowncase,
    OpStrAppend,
    OpStrList,
    OpListStr,
    OpSubstr,
    OpStrCopy,
    OpStrFill,
    OpStrMap,
    OpStrForEach,

    /* Vectors. */
    OpIsVec,
    OpMkVec,
    OpVec,
    OpVecLen,
    OpVecRef,
    OpVecSet,
    OpVecList,
    OpListVec,
    OpVecCopy,
    OpVecAppend,
    OpVecFill,
    OpVecMap,
    OpVecForEach,

    /* Control features. */
    OpIsProc,
    OpMap,
    OpForEach,
    OpCallCC,
    OpError,

    /* Environments and evaluation. */
    OpExit,
    OpReplEnv,
    OpEval,
    OpGc,
    OpGcDump,
    OpMacroExp,
    OpUseCount,

    /* Input and output. */
    OpIsPort,
    OpIsInPort,
    OpIsOutPort,
    OpInPort,
    OpOutPort,
    OpErrPort,
    OpOpenInFile,
    OpOpenOutFile,
    OpClosePort,
    OpOpenInStr,
    OpOpenOutStr,
    OpGetOutStr,
    OpRead,
    OpReadChar,
    OpPeekChar,
    OpReadLine,
    OpReadStr,
    OpEof,
    OpIsEof,
    OpCharReady,
    OpWrite,
    OpDisplay,
    OpNewline,
    OpWriteChar,
    OpWriteStr,
    OpFlush,

    /* System interface. */
    OpLoad,
    OpFileOk,
    OpDelFile,
    OpGetEnv,
    OpCurrSec,
    OpCurrJiffy,
    OpJiffsPerSec,
    OpFeatures,

    /* Extensions. */
    OpRegexMatch,
    OpRegexSearch,
    OpJsonRead,
    OpJsonWrite,
}

impl Opcode {
    /// Syntax keywords are dispatched by the evaluator, never through the
    /// primitive table.
    pub fn is_syntax(&self) -> bool {
        *self <= Opcode::UnquoteSplice
    }

    /// The first bound name of this opcode.
    pub fn name(&self) -> &'static str {
        for (name, op) in BUILTINS {
            if op == self {
                return name;
            }
        }
        "unknown"
    }
}

/// The table seeding the top frame: stable names form the user-visible
/// ABI.
pub const BUILTINS: &[(&str, Opcode)] = &[
    ("or", Opcode::Or),
    ("and", Opcode::And),
    ("if", Opcode::If),
    ("cond", Opcode::Cond),
    ("else", Opcode::Else),
    ("=>", Opcode::Arrow),
    ("when", Opcode::When),
    ("unless", Opcode::Unless),
    ("define", Opcode::Define),
    ("set!", Opcode::SetBang),
    ("begin", Opcode::Begin),
    ("lambda", Opcode::Lambda),
    ("define-macro", Opcode::Macro),
    ("apply", Opcode::Apply),
    ("quote", Opcode::Quote),
    ("quasiquote", Opcode::Quasiquote),
    ("unquote", Opcode::Unquote),
    ("unquote-splicing", Opcode::UnquoteSplice),
    /*-------------------------------*/
    ("eq?", Opcode::OpEq),
    ("eqv?", Opcode::OpEqv),
    ("equal?", Opcode::OpEqual),
    /*-------------------------------*/
    ("number?", Opcode::OpIsNum),
    ("complex?", Opcode::OpIsCpx),
    ("real?", Opcode::OpIsReal),
    ("rational?", Opcode::OpIsRat),
    ("integer?", Opcode::OpIsInt),
    ("exact?", Opcode::OpIsExact),
    ("inexact?", Opcode::OpIsInexact),
    ("exact-integer?", Opcode::OpIsExactInt),
    ("inexact", Opcode::OpEx2Inex),
    ("exact->inexact", Opcode::OpEx2Inex),
    ("exact", Opcode::OpInex2Ex),
    ("inexact->exact", Opcode::OpInex2Ex),
    ("odd?", Opcode::OpIsOdd),
    ("even?", Opcode::OpIsEven),
    ("=", Opcode::OpNumEq),
    ("<", Opcode::OpNumLt),
    (">", Opcode::OpNumGt),
    ("<=", Opcode::OpNumLe),
    (">=", Opcode::OpNumGe),
    ("min", Opcode::OpMin),
    ("max", Opcode::OpMax),
    ("positive?", Opcode::OpIsPos),
    ("negative?", Opcode::OpIsNeg),
    ("zero?", Opcode::OpIsZero),
    ("+", Opcode::OpAdd),
    ("-", Opcode::OpSub),
    ("*", Opcode::OpMul),
    ("/", Opcode::OpDiv),
    ("modulo", Opcode::OpMod),
    ("remainder", Opcode::OpRem),
    ("quotient", Opcode::OpQuotient),
    ("floor", Opcode::OpFloor),
    ("ceiling", Opcode::OpCeil),
    ("truncate", Opcode::OpTrunc),
    ("round", Opcode::OpRound),
    ("sin", Opcode::OpSin),
    ("cos", Opcode::OpCos),
    ("tan", Opcode::OpTan),
    ("asin", Opcode::OpASin),
    ("acos", Opcode::OpACos),
    ("atan", Opcode::OpATan),
    ("sinh", Opcode::OpSinh),
    ("cosh", Opcode::OpCosh),
    ("tanh", Opcode::OpTanh),
    ("asinh", Opcode::OpASinh),
    ("acosh", Opcode::OpACosh),
    ("atanh", Opcode::OpATanh),
    ("sqrt", Opcode::OpSqrt),
    ("cbrt", Opcode::OpCbrt),
    ("exp", Opcode::OpExp),
    ("expt", Opcode::OpPow),
    ("square", Opcode::OpSquare),
    ("log", Opcode::OpLog),
    ("log10", Opcode::OpLog10),
    ("abs", Opcode::OpAbs),
    ("magnitude", Opcode::OpAbs),
    ("real-part", Opcode::OpReal),
    ("imag-part", Opcode::OpImag),
    ("angle", Opcode::OpArg),
    ("conjugate", Opcode::OpConj),
    ("make-rectangular", Opcode::OpRect),
    ("make-polar", Opcode::OpPolar),
    ("hypot", Opcode::OpHypot),
    ("string->number", Opcode::OpStrNum),
    ("number->string", Opcode::OpNumStr),
    /*-------------------------------*/
    ("not", Opcode::OpNot),
    ("boolean?", Opcode::OpIsBool),
    ("boolean=?", Opcode::OpIsBoolEq),
    /*-------------------------------*/
    ("cons", Opcode::OpCons),
    ("car", Opcode::OpCar),
    ("cdr", Opcode::OpCdr),
    ("caar", Opcode::OpCaar),
    ("cddr", Opcode::OpCddr),
    ("cadr", Opcode::OpCadr),
    ("cdar", Opcode::OpCdar),
    ("caddr", Opcode::OpCaddr),
    ("set-car!", Opcode::OpSetCar),
    ("set-cdr!", Opcode::OpSetCdr),
    ("list", Opcode::OpList),
    ("make-list", Opcode::OpMkList),
    ("null?", Opcode::OpIsNil),
    ("pair?", Opcode::OpIsPair),
    ("list?", Opcode::OpIsList),
    ("length", Opcode::OpLength),
    ("append", Opcode::OpAppend),
    ("reverse", Opcode::OpReverse),
    ("list-tail", Opcode::OpListTail),
    ("list-ref", Opcode::OpListRef),
    ("list-set!", Opcode::OpListSet),
    ("list-copy", Opcode::OpListCopy),
    ("memq", Opcode::OpMemq),
    ("memv", Opcode::OpMemv),
    ("member", Opcode::OpMember),
    ("assq", Opcode::OpAssq),
    ("assv", Opcode::OpAssv),
    ("assoc", Opcode::OpAssoc),
    /*-------------------------------*/
    ("symbol?", Opcode::OpIsSym),
    ("symbol->string", Opcode::OpSymStr),
    ("string->symbol", Opcode::OpStrSym),
    ("gensym", Opcode::OpGensym),
    /*-------------------------------*/
    ("char?", Opcode::OpIsChar),
    ("char=?", Opcode::OpCharEq),
    ("char<?", Opcode::OpCharLt),
    ("char>?", Opcode::OpCharGt),
    ("char<=?", Opcode::OpCharLe),
    ("char>=?", Opcode::OpCharGe),
    ("char-alphabetic?", Opcode::OpIsAlpha),
    ("char-numeric?", Opcode::OpIsDigit),
    ("char-whitespace?", Opcode::OpIsWspace),
    ("char-upper-case?", Opcode::OpIsUpper),
    ("char-lower-case?", Opcode::OpIsLower),
    ("char->integer", Opcode::OpCharInt),
    ("integer->char", Opcode::OpIntChar),
    ("digit-value", Opcode::OpDigitVal),
    ("char-upcase", Opcode::OpCharUpcase),
    ("char-downcase", Opcode::OpCharDowncase),
    /*-------------------------------*/
    ("string?", Opcode::OpIsStr),
    ("make-string", Opcode::OpMkStr),
    ("string", Opcode::OpStr),
    ("string-length", Opcode::OpStrLen),
    ("string-ref", Opcode::OpStrRef),
    ("string-set!", Opcode::OpStrSet),
    ("string=?", Opcode::OpStrEq),
    ("string<?", Opcode::OpStrLt),
    ("string>?", Opcode::OpStrGt),
    ("string<=?", Opcode::OpStrLe),
    ("string>=?", Opcode::OpStrGe),
    ("string-upcase", Opcode::OpStrUpcase),
    ("string-downcase", Opcode::OpStrDowncase),
    ("string-append", Opcode::OpStrAppend),
    ("string->list", Opcode::OpStrList),
    ("list->string", Opcode::OpListStr),
    ("substring", Opcode::OpSubstr),
    ("string-copy", Opcode::OpStrCopy),
    ("string-fill!", Opcode::OpStrFill),
    ("string-map", Opcode::OpStrMap),
    ("string-for-each", Opcode::OpStrForEach),
    /*-------------------------------*/
    ("vector?", Opcode::OpIsVec),
    ("make-vector", Opcode::OpMkVec),
    ("vector", Opcode::OpVec),
    ("vector-length", Opcode::OpVecLen),
    ("vector-ref", Opcode::OpVecRef),
    ("vector-set!", Opcode::OpVecSet),
    ("vector->list", Opcode::OpVecList),
    ("list->vector", Opcode::OpListVec),
    ("vector-copy", Opcode::OpVecCopy),
    ("vector-append", Opcode::OpVecAppend),
    ("vector-fill!", Opcode::OpVecFill),
    ("vector-map", Opcode::OpVecMap),
    ("vector-for-each", Opcode::OpVecForEach),
    /*-------------------------------*/
    ("procedure?", Opcode::OpIsProc),
    ("map", Opcode::OpMap),
    ("for-each", Opcode::OpForEach),
    ("call/cc", Opcode::OpCallCC),
    ("call-with-current-continuation", Opcode::OpCallCC),
    ("error", Opcode::OpError),
    /*-------------------------------*/
    ("exit", Opcode::OpExit),
    ("interaction-environment", Opcode::OpReplEnv),
    ("eval", Opcode::OpEval),
    ("gc", Opcode::OpGc),
    ("gc-dump", Opcode::OpGcDump),
    ("macro-expand", Opcode::OpMacroExp),
    ("use-count", Opcode::OpUseCount),
    /*-------------------------------*/
    ("port?", Opcode::OpIsPort),
    ("input-port?", Opcode::OpIsInPort),
    ("output-port?", Opcode::OpIsOutPort),
    ("current-input-port", Opcode::OpInPort),
    ("current-output-port", Opcode::OpOutPort),
    ("current-error-port", Opcode::OpErrPort),
    ("open-input-file", Opcode::OpOpenInFile),
    ("open-output-file", Opcode::OpOpenOutFile),
    ("close-port", Opcode::OpClosePort),
    ("close-input-port", Opcode::OpClosePort),
    ("close-output-port", Opcode::OpClosePort),
    ("open-input-string", Opcode::OpOpenInStr),
    ("open-output-string", Opcode::OpOpenOutStr),
    ("get-output-string", Opcode::OpGetOutStr),
    ("read", Opcode::OpRead),
    ("read-char", Opcode::OpReadChar),
    ("peek-char", Opcode::OpPeekChar),
    ("read-line", Opcode::OpReadLine),
    ("read-string", Opcode::OpReadStr),
    ("eof-object", Opcode::OpEof),
    ("eof-object?", Opcode::OpIsEof),
    ("char-ready?", Opcode::OpCharReady),
    ("write", Opcode::OpWrite),
    ("display", Opcode::OpDisplay),
    ("newline", Opcode::OpNewline),
    ("write-char", Opcode::OpWriteChar),
    ("write-string", Opcode::OpWriteStr),
    ("flush-output-port", Opcode::OpFlush),
    /*-------------------------------*/
    ("load", Opcode::OpLoad),
    ("file-exists?", Opcode::OpFileOk),
    ("delete-file", Opcode::OpDelFile),
    ("get-environment-variable", Opcode::OpGetEnv),
    ("current-second", Opcode::OpCurrSec),
    ("current-jiffy", Opcode::OpCurrJiffy),
    ("jiffies-per-second", Opcode::OpJiffsPerSec),
    ("features", Opcode::OpFeatures),
    /*-------------------------------*/
    ("regex-match?", Opcode::OpRegexMatch),
    ("regex-search", Opcode::OpRegexSearch),
    ("json-read", Opcode::OpJsonRead),
    ("json-write", Opcode::OpJsonWrite),
];

fn exactly(n: usize, args: &[Value]) -> Result<()> {
    if args.len() != n {
        return Err(Error::arity(n, args.len()));
    }
    Ok(())
}

fn at_least(n: usize, args: &[Value]) -> Result<()> {
    if args.len() < n {
        return Err(Error::arity_at_least(n, args.len()));
    }
    Ok(())
}

fn between(lo: usize, hi: usize, args: &[Value]) -> Result<()> {
    if args.len() < lo {
        return Err(Error::arity(lo, args.len()));
    }
    if args.len() > hi {
        return Err(Error::arity(hi, args.len()));
    }
    Ok(())
}

fn boolean(b: bool) -> Result<Value> {
    Ok(Value::Bool(b))
}

fn number(n: Number) -> Result<Value> {
    Ok(Value::Number(n))
}

fn string_value(s: String) -> Value {
    Value::Str(Rc::new(RefCell::new(s)))
}

fn index_of(v: &Value) -> Result<usize> {
    let n: Number = v.cast()?;
    let i = n.to_int()?;
    if i < 0 {
        return Err(Error::Range("negative index", v.clone()));
    }
    Ok(i as usize)
}

/// Dispatch one primitive call.
pub fn call(scm: &mut Interp, env: &Env, op: Opcode, args: &[Value]) -> Result<Value> {
    match op {
        /* Equivalence. */
        Opcode::OpEq | Opcode::OpEqv => {
            exactly(2, args)?;
            boolean(is_eqv(&args[0], &args[1]))
        }
        Opcode::OpEqual => {
            exactly(2, args)?;
            boolean(is_equal(&args[0], &args[1]))
        }

        /* Numbers. */
        Opcode::OpIsNum | Opcode::OpIsCpx => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Number(_)))
        }
        Opcode::OpIsReal => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Number(n) if !n.is_complex()))
        }
        Opcode::OpIsRat => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Number(n)
                if !n.is_complex() && n.to_f64().is_finite()))
        }
        Opcode::OpIsInt => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Number(n) if n.is_integer()))
        }
        Opcode::OpIsExact => {
            exactly(1, args)?;
            boolean(args[0].cast::<Number>()?.is_exact())
        }
        Opcode::OpIsInexact => {
            exactly(1, args)?;
            boolean(!args[0].cast::<Number>()?.is_exact())
        }
        Opcode::OpIsExactInt => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Number(Number::Int(_))))
        }
        Opcode::OpEx2Inex => {
            exactly(1, args)?;
            let n: Number = args[0].cast()?;
            // The collapse invariant folds integral floats straight back.
            number(Number::from(n.to_f64()))
        }
        Opcode::OpInex2Ex => {
            exactly(1, args)?;
            let n: Number = args[0].cast()?;
            match n {
                Number::Int(_) => number(n),
                _ => Err(Error::Domain("no exact representation", args[0].clone())),
            }
        }
        Opcode::OpIsOdd => {
            exactly(1, args)?;
            boolean(args[0].cast::<Number>()?.is_odd()?)
        }
        Opcode::OpIsEven => {
            exactly(1, args)?;
            boolean(!args[0].cast::<Number>()?.is_odd()?)
        }
        Opcode::OpNumEq => num_chain(args, |a, b| Ok(a == b)),
        Opcode::OpNumLt => num_chain(args, |a, b| a.lt(b)),
        Opcode::OpNumGt => num_chain(args, |a, b| a.gt(b)),
        Opcode::OpNumLe => num_chain(args, |a, b| a.le(b)),
        Opcode::OpNumGe => num_chain(args, |a, b| a.ge(b)),
        Opcode::OpMin => num_fold1(args, |a, b| a.min(&b)),
        Opcode::OpMax => num_fold1(args, |a, b| a.max(&b)),
        Opcode::OpIsPos => {
            exactly(1, args)?;
            boolean(args[0].cast::<Number>()?.gt(&Number::Int(0))?)
        }
        Opcode::OpIsNeg => {
            exactly(1, args)?;
            boolean(args[0].cast::<Number>()?.lt(&Number::Int(0))?)
        }
        Opcode::OpIsZero => {
            exactly(1, args)?;
            boolean(args[0].cast::<Number>()?.is_zero())
        }
        Opcode::OpAdd => {
            let mut acc = Number::Int(0);
            for v in args {
                acc = acc + v.cast()?;
            }
            number(acc)
        }
        Opcode::OpMul => {
            let mut acc = Number::Int(1);
            for v in args {
                acc = acc * v.cast()?;
            }
            number(acc)
        }
        Opcode::OpSub => {
            at_least(1, args)?;
            let first: Number = args[0].cast()?;
            if args.len() == 1 {
                return number(-first);
            }
            let mut acc = first;
            for v in &args[1..] {
                acc = acc - v.cast()?;
            }
            number(acc)
        }
        Opcode::OpDiv => {
            at_least(1, args)?;
            let first: Number = args[0].cast()?;
            if args.len() == 1 {
                return number(Number::Int(1).div(&first)?);
            }
            let mut acc = first;
            for v in &args[1..] {
                acc = acc.div(&v.cast()?)?;
            }
            number(acc)
        }
        Opcode::OpMod => num_binop(args, |a, b| a.modulo(b)),
        Opcode::OpRem => num_binop(args, |a, b| a.remainder(b)),
        Opcode::OpQuotient => num_binop(args, |a, b| a.quotient(b)),
        Opcode::OpFloor => num_unop(args, |n| n.floor()),
        Opcode::OpCeil => num_unop(args, |n| n.ceil()),
        Opcode::OpTrunc => num_unop(args, |n| n.trunc()),
        Opcode::OpRound => num_unop(args, |n| n.round()),
        Opcode::OpSin => num_unop(args, |n| Ok(n.sin())),
        Opcode::OpCos => num_unop(args, |n| Ok(n.cos())),
        Opcode::OpTan => num_unop(args, |n| Ok(n.tan())),
        Opcode::OpASin => num_unop(args, |n| Ok(n.asin())),
        Opcode::OpACos => num_unop(args, |n| Ok(n.acos())),
        Opcode::OpATan => num_unop(args, |n| Ok(n.atan())),
        Opcode::OpSinh => num_unop(args, |n| Ok(n.sinh())),
        Opcode::OpCosh => num_unop(args, |n| Ok(n.cosh())),
        Opcode::OpTanh => num_unop(args, |n| Ok(n.tanh())),
        Opcode::OpASinh => num_unop(args, |n| Ok(n.asinh())),
        Opcode::OpACosh => num_unop(args, |n| Ok(n.acosh())),
        Opcode::OpATanh => num_unop(args, |n| Ok(n.atanh())),
        Opcode::OpSqrt => num_unop(args, |n| Ok(n.sqrt())),
        Opcode::OpCbrt => num_unop(args, |n| Ok(n.cbrt())),
        Opcode::OpExp => num_unop(args, |n| Ok(n.exp())),
        Opcode::OpPow => num_binop(args, |a, b| Ok(a.pow(b))),
        Opcode::OpSquare => num_unop(args, |n| Ok(*n * *n)),
        Opcode::OpLog => num_unop(args, |n| Ok(n.log())),
        Opcode::OpLog10 => num_unop(args, |n| Ok(n.log10())),
        Opcode::OpAbs => num_unop(args, |n| Ok(n.abs())),
        Opcode::OpReal => num_unop(args, |n| Ok(n.real_part())),
        Opcode::OpImag => num_unop(args, |n| Ok(n.imag_part())),
        Opcode::OpArg => num_unop(args, |n| Ok(n.arg())),
        Opcode::OpConj => num_unop(args, |n| Ok(n.conj())),
        Opcode::OpRect => num_binop(args, |a, b| Ok(Number::rect(a.to_f64(), b.to_f64()))),
        Opcode::OpPolar => num_binop(args, |a, b| Ok(Number::polar(a.to_f64(), b.to_f64()))),
        Opcode::OpHypot => num_binop(args, |a, b| Ok(a.hypot(b))),
        Opcode::OpStrNum => str_to_number(args),
        Opcode::OpNumStr => number_to_str(args),

        /* Booleans. */
        Opcode::OpNot => {
            exactly(1, args)?;
            boolean(args[0].is_false())
        }
        Opcode::OpIsBool => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Bool(_)))
        }
        Opcode::OpIsBoolEq => {
            at_least(2, args)?;
            let first: bool = args[0].cast()?;
            for v in &args[1..] {
                if v.cast::<bool>()? != first {
                    return boolean(false);
                }
            }
            boolean(true)
        }

        /* Pairs and lists. */
        Opcode::OpCons => {
            exactly(2, args)?;
            Ok(scm.heap.cons(args[0].clone(), args[1].clone()))
        }
        Opcode::OpCar => {
            exactly(1, args)?;
            args[0].car()
        }
        Opcode::OpCdr => {
            exactly(1, args)?;
            args[0].cdr()
        }
        Opcode::OpCaar => {
            exactly(1, args)?;
            args[0].caar()
        }
        Opcode::OpCddr => {
            exactly(1, args)?;
            args[0].cddr()
        }
        Opcode::OpCadr => {
            exactly(1, args)?;
            args[0].cadr()
        }
        Opcode::OpCdar => {
            exactly(1, args)?;
            args[0].cdar()
        }
        Opcode::OpCaddr => {
            exactly(1, args)?;
            args[0].caddr()
        }
        Opcode::OpSetCar => {
            exactly(2, args)?;
            args[0].set_car(args[1].clone())?;
            Ok(Value::None)
        }
        Opcode::OpSetCdr => {
            exactly(2, args)?;
            args[0].set_cdr(args[1].clone())?;
            Ok(Value::None)
        }
        Opcode::OpList => Ok(scm.heap.list(args.to_vec())),
        Opcode::OpMkList => {
            between(1, 2, args)?;
            let n = index_of(&args[0])?;
            let fill = args.get(1).cloned().unwrap_or(Value::None);
            Ok(scm.heap.list(vec![fill; n]))
        }
        Opcode::OpIsNil => {
            exactly(1, args)?;
            boolean(args[0].is_nil())
        }
        Opcode::OpIsPair => {
            exactly(1, args)?;
            boolean(args[0].is_pair())
        }
        Opcode::OpIsList => {
            exactly(1, args)?;
            boolean(args[0].is_list())
        }
        Opcode::OpLength => {
            exactly(1, args)?;
            number(Number::Int(args[0].list_length()))
        }
        Opcode::OpAppend => list_append(scm, args),
        Opcode::OpReverse => {
            exactly(1, args)?;
            let mut items = proper_list(&args[0])?;
            items.reverse();
            Ok(scm.heap.list(items))
        }
        Opcode::OpListTail => {
            exactly(2, args)?;
            let mut cur = args[0].clone();
            let mut k = index_of(&args[1])?;
            while k > 0 {
                match cur {
                    Value::Pair(c) => {
                        cur = c.cdr.borrow().clone();
                        k -= 1;
                    }
                    _ => return Err(Error::Range("list index out of range", args[1].clone())),
                }
            }
            Ok(cur)
        }
        Opcode::OpListRef => {
            exactly(2, args)?;
            args[0].list_ref(index_of(&args[1])? as i64)
        }
        Opcode::OpListSet => {
            exactly(3, args)?;
            let mut cur = args[0].clone();
            let mut k = index_of(&args[1])?;
            while k > 0 && cur.is_pair() {
                cur = cur.cdr()?;
                k -= 1;
            }
            if !cur.is_pair() {
                return Err(Error::Range("list index out of range", args[1].clone()));
            }
            cur.set_car(args[2].clone())?;
            Ok(Value::None)
        }
        Opcode::OpListCopy => {
            exactly(1, args)?;
            let items = proper_list(&args[0])?;
            Ok(scm.heap.list(items))
        }
        Opcode::OpMemq | Opcode::OpMemv => list_member(args, is_eqv),
        Opcode::OpMember => list_member(args, is_equal),
        Opcode::OpAssq | Opcode::OpAssv => list_assoc(args, is_eqv),
        Opcode::OpAssoc => list_assoc(args, is_equal),

        /* Symbols. */
        Opcode::OpIsSym => {
            exactly(1, args)?;
            boolean(args[0].is_symbol())
        }
        Opcode::OpSymStr => {
            exactly(1, args)?;
            let sym: crate::symbol::Symbol = args[0].cast()?;
            Ok(string_value(sym.name().to_string()))
        }
        Opcode::OpStrSym => {
            exactly(1, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let name = s.borrow().clone();
            Ok(Value::Symbol(scm.mksym(&name)))
        }
        Opcode::OpGensym => {
            exactly(0, args)?;
            Ok(Value::Symbol(scm.gensym()))
        }

        /* Characters. */
        Opcode::OpIsChar => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Char(_)))
        }
        Opcode::OpCharEq => char_chain(args, |a, b| a == b),
        Opcode::OpCharLt => char_chain(args, |a, b| a < b),
        Opcode::OpCharGt => char_chain(args, |a, b| a > b),
        Opcode::OpCharLe => char_chain(args, |a, b| a <= b),
        Opcode::OpCharGe => char_chain(args, |a, b| a >= b),
        Opcode::OpIsAlpha => char_pred(args, |c| c.is_alphabetic()),
        Opcode::OpIsDigit => char_pred(args, |c| c.is_ascii_digit()),
        Opcode::OpIsWspace => char_pred(args, |c| c.is_whitespace()),
        Opcode::OpIsUpper => char_pred(args, |c| c.is_uppercase()),
        Opcode::OpIsLower => char_pred(args, |c| c.is_lowercase()),
        Opcode::OpCharInt => {
            exactly(1, args)?;
            let c: char = args[0].cast()?;
            number(Number::Int(c as Int))
        }
        Opcode::OpIntChar => {
            exactly(1, args)?;
            let i = index_of(&args[0])?;
            match std::char::from_u32(i as u32) {
                Some(c) => Ok(Value::Char(c)),
                None => Err(Error::Range("invalid character code", args[0].clone())),
            }
        }
        Opcode::OpDigitVal => {
            exactly(1, args)?;
            let c: char = args[0].cast()?;
            match c.to_digit(10) {
                Some(d) => number(Number::Int(d as Int)),
                None => boolean(false),
            }
        }
        Opcode::OpCharUpcase => {
            exactly(1, args)?;
            let c: char = args[0].cast()?;
            Ok(Value::Char(c.to_uppercase().next().unwrap_or(c)))
        }
        Opcode::OpCharDowncase => {
            exactly(1, args)?;
            let c: char = args[0].cast()?;
            Ok(Value::Char(c.to_lowercase().next().unwrap_or(c)))
        }

        /* Strings. */
        Opcode::OpIsStr => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Str(_)))
        }
        Opcode::OpMkStr => {
            between(1, 2, args)?;
            let n = index_of(&args[0])?;
            let c = match args.get(1) {
                Some(v) => v.cast()?,
                None => ' ',
            };
            Ok(string_value(std::iter::repeat(c).take(n).collect()))
        }
        Opcode::OpStr => {
            let mut s = String::new();
            for v in args {
                s.push(v.cast()?);
            }
            Ok(string_value(s))
        }
        Opcode::OpStrLen => {
            exactly(1, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let len = s.borrow().chars().count();
            number(Number::Int(len as Int))
        }
        Opcode::OpStrRef => {
            exactly(2, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let k = index_of(&args[1])?;
            let result = match s.borrow().chars().nth(k) {
                Some(c) => Ok(Value::Char(c)),
                None => Err(Error::Range("string index out of range", args[1].clone())),
            };
            result
        }
        Opcode::OpStrSet => {
            exactly(3, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let k = index_of(&args[1])?;
            let c: char = args[2].cast()?;
            let mut buf = s.borrow_mut();
            let mut chars: Vec<char> = buf.chars().collect();
            if k >= chars.len() {
                return Err(Error::Range("string index out of range", args[1].clone()));
            }
            chars[k] = c;
            *buf = chars.into_iter().collect();
            Ok(Value::None)
        }
        Opcode::OpStrEq => str_chain(args, |a, b| a == b),
        Opcode::OpStrLt => str_chain(args, |a, b| a < b),
        Opcode::OpStrGt => str_chain(args, |a, b| a > b),
        Opcode::OpStrLe => str_chain(args, |a, b| a <= b),
        Opcode::OpStrGe => str_chain(args, |a, b| a >= b),
        Opcode::OpStrUpcase => str_unop(args, |s| s.to_uppercase()),
        Opcode::OpStrDowncase => str_unop(args, |s| s.to_lowercase()),
        Opcode::OpStrAppend => {
            let mut out = String::new();
            for v in args {
                let s: Rc<RefCell<String>> = v.cast()?;
                out.push_str(&s.borrow());
            }
            Ok(string_value(out))
        }
        Opcode::OpStrList => {
            exactly(1, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let chars: Vec<Value> = s.borrow().chars().map(Value::Char).collect();
            Ok(scm.heap.list(chars))
        }
        Opcode::OpListStr => {
            exactly(1, args)?;
            let mut out = String::new();
            for item in proper_list(&args[0])? {
                out.push(item.cast()?);
            }
            Ok(string_value(out))
        }
        Opcode::OpSubstr => {
            exactly(3, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let start = index_of(&args[1])?;
            let end = index_of(&args[2])?;
            let chars: Vec<char> = s.borrow().chars().collect();
            if start > end || end > chars.len() {
                return Err(Error::Range("substring out of range", args[2].clone()));
            }
            Ok(string_value(chars[start..end].iter().collect()))
        }
        Opcode::OpStrCopy => {
            exactly(1, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let copy = s.borrow().clone();
            Ok(string_value(copy))
        }
        Opcode::OpStrFill => {
            exactly(2, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let c: char = args[1].cast()?;
            let mut buf = s.borrow_mut();
            let n = buf.chars().count();
            *buf = std::iter::repeat(c).take(n).collect();
            Ok(Value::None)
        }
        Opcode::OpStrMap => {
            exactly(2, args)?;
            let s: Rc<RefCell<String>> = args[1].cast()?;
            let chars: Vec<char> = s.borrow().chars().collect();
            let mut out = String::new();
            for c in chars {
                let r = scm.apply_values(env, &args[0], vec![Value::Char(c)])?;
                out.push(r.cast()?);
            }
            Ok(string_value(out))
        }
        Opcode::OpStrForEach => {
            exactly(2, args)?;
            let s: Rc<RefCell<String>> = args[1].cast()?;
            let chars: Vec<char> = s.borrow().chars().collect();
            for c in chars {
                scm.apply_values(env, &args[0], vec![Value::Char(c)])?;
            }
            Ok(Value::None)
        }

        /* Vectors. */
        Opcode::OpIsVec => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Vector(_)))
        }
        Opcode::OpMkVec => {
            between(1, 2, args)?;
            let n = index_of(&args[0])?;
            let fill = args.get(1).cloned().unwrap_or(Value::None);
            Ok(Value::Vector(Rc::new(RefCell::new(vec![fill; n]))))
        }
        Opcode::OpVec => Ok(Value::Vector(Rc::new(RefCell::new(args.to_vec())))),
        Opcode::OpVecLen => {
            exactly(1, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[0].cast()?;
            let len = v.borrow().len();
            number(Number::Int(len as Int))
        }
        Opcode::OpVecRef => {
            exactly(2, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[0].cast()?;
            let k = index_of(&args[1])?;
            let v = v.borrow();
            v.get(k)
                .cloned()
                .ok_or_else(|| Error::Range("vector index out of range", args[1].clone()))
        }
        Opcode::OpVecSet => {
            exactly(3, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[0].cast()?;
            let k = index_of(&args[1])?;
            let mut v = v.borrow_mut();
            match v.get_mut(k) {
                Some(slot) => {
                    *slot = args[2].clone();
                    Ok(Value::None)
                }
                None => Err(Error::Range("vector index out of range", args[1].clone())),
            }
        }
        Opcode::OpVecList => {
            exactly(1, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[0].cast()?;
            let items = v.borrow().clone();
            Ok(scm.heap.list(items))
        }
        Opcode::OpListVec => {
            exactly(1, args)?;
            let items = proper_list(&args[0])?;
            Ok(Value::Vector(Rc::new(RefCell::new(items))))
        }
        Opcode::OpVecCopy => {
            exactly(1, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[0].cast()?;
            let copy = v.borrow().clone();
            Ok(Value::Vector(Rc::new(RefCell::new(copy))))
        }
        Opcode::OpVecAppend => {
            let mut out = Vec::new();
            for arg in args {
                let v: Rc<RefCell<Vec<Value>>> = arg.cast()?;
                out.extend(v.borrow().iter().cloned());
            }
            Ok(Value::Vector(Rc::new(RefCell::new(out))))
        }
        Opcode::OpVecFill => {
            exactly(2, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[0].cast()?;
            for slot in v.borrow_mut().iter_mut() {
                *slot = args[1].clone();
            }
            Ok(Value::None)
        }
        Opcode::OpVecMap => {
            exactly(2, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[1].cast()?;
            let items = v.borrow().clone();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(scm.apply_values(env, &args[0], vec![item])?);
            }
            Ok(Value::Vector(Rc::new(RefCell::new(out))))
        }
        Opcode::OpVecForEach => {
            exactly(2, args)?;
            let v: Rc<RefCell<Vec<Value>>> = args[1].cast()?;
            let items = v.borrow().clone();
            for item in items {
                scm.apply_values(env, &args[0], vec![item])?;
            }
            Ok(Value::None)
        }

        /* Control features. */
        Opcode::OpIsProc => {
            exactly(1, args)?;
            boolean(match &args[0] {
                Value::Procedure(_) | Value::Function(_) => true,
                Value::Intern(op) => !op.is_syntax(),
                _ => false,
            })
        }
        Opcode::OpMap => map_lists(scm, env, args, true),
        Opcode::OpForEach => map_lists(scm, env, args, false),
        Opcode::OpCallCC => Err(Error::Syntax(
            "call/cc is not implemented",
            Value::None,
        )),
        Opcode::OpError => {
            at_least(1, args)?;
            Err(Error::User(scm.heap.list(args.to_vec())))
        }

        /* Environments and evaluation. */
        Opcode::OpExit => Ok(Value::Intern(Opcode::OpExit)),
        Opcode::OpReplEnv => {
            exactly(0, args)?;
            Ok(Value::Env(scm.topenv()))
        }
        Opcode::OpEval => {
            between(1, 2, args)?;
            let env = match args.get(1) {
                Some(v) => v.cast()?,
                None => env.clone(),
            };
            scm.eval(&env, args[0].clone())
        }
        Opcode::OpGc => {
            exactly(0, args)?;
            let released = scm.heap.collect(env);
            number(Number::Int(released as Int))
        }
        Opcode::OpGcDump => {
            exactly(0, args)?;
            scm.heap.dump(&mut io::stdout())?;
            Ok(Value::None)
        }
        Opcode::OpMacroExp => {
            exactly(1, args)?;
            let form = args[0].clone();
            if !form.is_pair() {
                return Ok(form);
            }
            let op = scm.eval(env, form.car()?)?;
            match op {
                Value::Procedure(p) if p.is_macro() => p.expand(scm, &form),
                _ => Ok(form),
            }
        }
        Opcode::OpUseCount => {
            exactly(1, args)?;
            number(Number::Int(use_count(&args[0])))
        }

        /* Input and output. */
        Opcode::OpIsPort => {
            exactly(1, args)?;
            boolean(matches!(args[0], Value::Port(_)))
        }
        Opcode::OpIsInPort => {
            exactly(1, args)?;
            let p: Rc<RefCell<Port>> = args[0].cast()?;
            let b = p.borrow().is_input();
            boolean(b)
        }
        Opcode::OpIsOutPort => {
            exactly(1, args)?;
            let p: Rc<RefCell<Port>> = args[0].cast()?;
            let b = p.borrow().is_output();
            boolean(b)
        }
        Opcode::OpInPort => {
            exactly(0, args)?;
            Ok(scm.stdin_port())
        }
        Opcode::OpOutPort => {
            exactly(0, args)?;
            Ok(scm.stdout_port())
        }
        Opcode::OpErrPort => {
            exactly(0, args)?;
            Ok(scm.stderr_port())
        }
        Opcode::OpOpenInFile => {
            exactly(1, args)?;
            let path: Rc<RefCell<String>> = args[0].cast()?;
            let path = path.borrow().clone();
            Ok(Value::Port(Rc::new(RefCell::new(Port::open_in(&path)?))))
        }
        Opcode::OpOpenOutFile => {
            exactly(1, args)?;
            let path: Rc<RefCell<String>> = args[0].cast()?;
            let path = path.borrow().clone();
            Ok(Value::Port(Rc::new(RefCell::new(Port::open_out(&path)?))))
        }
        Opcode::OpClosePort => {
            exactly(1, args)?;
            let p: Rc<RefCell<Port>> = args[0].cast()?;
            p.borrow_mut().close();
            Ok(Value::None)
        }
        Opcode::OpOpenInStr => {
            exactly(1, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let text = s.borrow().clone();
            Ok(Value::Port(Rc::new(RefCell::new(Port::in_string(&text)))))
        }
        Opcode::OpOpenOutStr => {
            exactly(0, args)?;
            Ok(Value::Port(Rc::new(RefCell::new(Port::out_string()))))
        }
        Opcode::OpGetOutStr => {
            exactly(1, args)?;
            let p: Rc<RefCell<Port>> = args[0].cast()?;
            let text = p.borrow().string_contents();
            match text {
                Some(text) => Ok(string_value(text)),
                None => Err(Error::Io("not a string output port".to_string())),
            }
        }
        Opcode::OpRead => {
            between(0, 1, args)?;
            let port = in_port(scm, args, 0)?;
            match Reader::new().read(scm, &port)? {
                Some(value) => Ok(value),
                None => Ok(Value::Intern(Opcode::OpEof)),
            }
        }
        Opcode::OpReadChar => {
            between(0, 1, args)?;
            let port = in_port(scm, args, 0)?;
            let c = port.borrow_mut().read_char()?;
            Ok(c.map(Value::Char).unwrap_or(Value::Intern(Opcode::OpEof)))
        }
        Opcode::OpPeekChar => {
            between(0, 1, args)?;
            let port = in_port(scm, args, 0)?;
            let c = port.borrow_mut().peek_char()?;
            Ok(c.map(Value::Char).unwrap_or(Value::Intern(Opcode::OpEof)))
        }
        Opcode::OpReadLine => {
            between(0, 1, args)?;
            let port = in_port(scm, args, 0)?;
            let line = port.borrow_mut().read_line()?;
            Ok(line
                .map(string_value)
                .unwrap_or(Value::Intern(Opcode::OpEof)))
        }
        Opcode::OpReadStr => {
            between(1, 2, args)?;
            let n = index_of(&args[0])?;
            let port = in_port(scm, args, 1)?;
            let text = port.borrow_mut().read_string(n)?;
            Ok(text
                .map(string_value)
                .unwrap_or(Value::Intern(Opcode::OpEof)))
        }
        Opcode::OpEof => {
            exactly(0, args)?;
            Ok(Value::Intern(Opcode::OpEof))
        }
        Opcode::OpIsEof => {
            exactly(1, args)?;
            boolean(args[0].is_eof())
        }
        Opcode::OpCharReady => {
            between(0, 1, args)?;
            let port = in_port(scm, args, 0)?;
            let b = port.borrow().char_ready();
            boolean(b)
        }
        Opcode::OpWrite => {
            between(1, 2, args)?;
            let port = out_port(scm, args, 1)?;
            let text = format!("{}", args[0]);
            port.borrow_mut().write_str(&text)?;
            Ok(Value::None)
        }
        Opcode::OpDisplay => {
            between(1, 2, args)?;
            let port = out_port(scm, args, 1)?;
            let text = format!("{}", Displayed(&args[0]));
            port.borrow_mut().write_str(&text)?;
            Ok(Value::None)
        }
        Opcode::OpNewline => {
            between(0, 1, args)?;
            let port = out_port(scm, args, 0)?;
            port.borrow_mut().write_char('\n')?;
            Ok(Value::None)
        }
        Opcode::OpWriteChar => {
            between(1, 2, args)?;
            let c: char = args[0].cast()?;
            let port = out_port(scm, args, 1)?;
            port.borrow_mut().write_char(c)?;
            Ok(Value::None)
        }
        Opcode::OpWriteStr => {
            between(1, 2, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let text = s.borrow().clone();
            let port = out_port(scm, args, 1)?;
            port.borrow_mut().write_str(&text)?;
            Ok(Value::None)
        }
        Opcode::OpFlush => {
            between(0, 1, args)?;
            let port = out_port(scm, args, 0)?;
            port.borrow_mut().flush()?;
            Ok(Value::None)
        }

        /* System interface. */
        Opcode::OpLoad => {
            between(1, 2, args)?;
            let path: Rc<RefCell<String>> = args[0].cast()?;
            let path = path.borrow().clone();
            let env = match args.get(1) {
                Some(v) => v.cast()?,
                None => env.clone(),
            };
            scm.load(&path, Some(&env))?;
            Ok(Value::None)
        }
        Opcode::OpFileOk => {
            exactly(1, args)?;
            let path: Rc<RefCell<String>> = args[0].cast()?;
            let exists = std::path::Path::new(path.borrow().as_str()).exists();
            boolean(exists)
        }
        Opcode::OpDelFile => {
            exactly(1, args)?;
            let path: Rc<RefCell<String>> = args[0].cast()?;
            std::fs::remove_file(path.borrow().as_str())
                .map_err(|e| Error::Io(e.to_string()))?;
            Ok(Value::None)
        }
        Opcode::OpGetEnv => {
            exactly(1, args)?;
            let name: Rc<RefCell<String>> = args[0].cast()?;
            let result = match std::env::var(name.borrow().as_str()) {
                Ok(value) => Ok(string_value(value)),
                Err(_) => boolean(false),
            };
            result
        }
        Opcode::OpCurrSec => {
            exactly(0, args)?;
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            number(Number::from(secs))
        }
        Opcode::OpCurrJiffy => {
            exactly(0, args)?;
            number(Number::Int(scm.clock.jiffies()))
        }
        Opcode::OpJiffsPerSec => {
            exactly(0, args)?;
            number(Number::Int(crate::clock::JIFFIES_PER_SECOND))
        }
        Opcode::OpFeatures => {
            exactly(0, args)?;
            let features = vec![
                Value::Symbol(scm.mksym("r7rs")),
                Value::Symbol(scm.mksym("uscheme")),
            ];
            Ok(scm.heap.list(features))
        }

        /* Extensions. */
        Opcode::OpRegexMatch => {
            exactly(2, args)?;
            let re = compile_regex(&args[0])?;
            let text: Rc<RefCell<String>> = args[1].cast()?;
            let b = re.is_match(&text.borrow());
            boolean(b)
        }
        Opcode::OpRegexSearch => {
            exactly(2, args)?;
            let re = compile_regex(&args[0])?;
            let text: Rc<RefCell<String>> = args[1].cast()?;
            let found = re.find(&text.borrow()).map(|m| m.as_str().to_string());
            match found {
                Some(m) => Ok(string_value(m)),
                None => boolean(false),
            }
        }
        Opcode::OpJsonRead => {
            exactly(1, args)?;
            let s: Rc<RefCell<String>> = args[0].cast()?;
            let text = s.borrow().clone();
            json::read(scm, &text)
        }
        Opcode::OpJsonWrite => {
            exactly(1, args)?;
            Ok(string_value(json::write(&args[0])?))
        }

        op => Err(Error::Syntax("invalid primary operation", Value::Intern(op))),
    }
}

fn use_count(value: &Value) -> Int {
    match value {
        Value::Pair(rc) => Rc::strong_count(rc) as Int,
        Value::Str(rc) => Rc::strong_count(rc) as Int,
        Value::Vector(rc) => Rc::strong_count(rc) as Int,
        Value::Port(rc) => Rc::strong_count(rc) as Int,
        Value::Function(rc) => Rc::strong_count(rc) as Int,
        Value::Procedure(p) => p.use_count() as Int,
        Value::Env(rc) => Rc::strong_count(rc) as Int,
        _ => 0,
    }
}

fn compile_regex(pattern: &Value) -> Result<Regex> {
    let s: Rc<RefCell<String>> = pattern.cast()?;
    let result = Regex::new(&s.borrow())
        .map_err(|_| Error::Domain("invalid regular expression", pattern.clone()));
    result
}

fn num_unop(args: &[Value], f: impl Fn(&Number) -> Result<Number>) -> Result<Value> {
    exactly(1, args)?;
    number(f(&args[0].cast()?)?)
}

fn num_binop(args: &[Value], f: impl Fn(&Number, &Number) -> Result<Number>) -> Result<Value> {
    exactly(2, args)?;
    number(f(&args[0].cast()?, &args[1].cast()?)?)
}

fn num_chain(args: &[Value], f: impl Fn(&Number, &Number) -> Result<bool>) -> Result<Value> {
    at_least(2, args)?;
    let mut prev: Number = args[0].cast()?;
    for v in &args[1..] {
        let next: Number = v.cast()?;
        if !f(&prev, &next)? {
            return boolean(false);
        }
        prev = next;
    }
    boolean(true)
}

fn num_fold1(args: &[Value], f: impl Fn(Number, Number) -> Result<Number>) -> Result<Value> {
    at_least(1, args)?;
    let mut acc: Number = args[0].cast()?;
    for v in &args[1..] {
        acc = f(acc, v.cast()?)?;
    }
    number(acc)
}

fn char_chain(args: &[Value], f: impl Fn(char, char) -> bool) -> Result<Value> {
    at_least(2, args)?;
    let mut prev: char = args[0].cast()?;
    for v in &args[1..] {
        let next: char = v.cast()?;
        if !f(prev, next) {
            return boolean(false);
        }
        prev = next;
    }
    boolean(true)
}

fn char_pred(args: &[Value], f: impl Fn(char) -> bool) -> Result<Value> {
    exactly(1, args)?;
    boolean(f(args[0].cast()?))
}

fn str_chain(args: &[Value], f: impl Fn(&str, &str) -> bool) -> Result<Value> {
    at_least(2, args)?;
    let first: Rc<RefCell<String>> = args[0].cast()?;
    let mut prev = first.borrow().clone();
    for v in &args[1..] {
        let s: Rc<RefCell<String>> = v.cast()?;
        let next = s.borrow().clone();
        if !f(&prev, &next) {
            return boolean(false);
        }
        prev = next;
    }
    boolean(true)
}

fn str_unop(args: &[Value], f: impl Fn(&str) -> String) -> Result<Value> {
    exactly(1, args)?;
    let s: Rc<RefCell<String>> = args[0].cast()?;
    let out = f(&s.borrow());
    Ok(string_value(out))
}

fn str_to_number(args: &[Value]) -> Result<Value> {
    between(1, 2, args)?;
    let s: Rc<RefCell<String>> = args[0].cast()?;
    let text = s.borrow().clone();
    let radix = match args.get(1) {
        Some(v) => index_of(v)?,
        None => 10,
    };
    if radix == 10 {
        return match Number::parse(&text) {
            Some(n) => number(n),
            None => boolean(false),
        };
    }
    match Int::from_str_radix(&text, radix as u32) {
        Ok(i) => number(Number::Int(i)),
        Err(_) => boolean(false),
    }
}

fn number_to_str(args: &[Value]) -> Result<Value> {
    between(1, 2, args)?;
    let n: Number = args[0].cast()?;
    let radix = match args.get(1) {
        Some(v) => index_of(v)?,
        None => 10,
    };
    let text = match (n, radix) {
        (_, 10) => n.to_string(),
        (Number::Int(i), 2) => format!("{:b}", i),
        (Number::Int(i), 8) => format!("{:o}", i),
        (Number::Int(i), 16) => format!("{:x}", i),
        _ => {
            return Err(Error::Domain(
                "unsupported radix for this number",
                args[0].clone(),
            ))
        }
    };
    Ok(string_value(text))
}

// Collect a proper list into a vector; improper input is a type error.
fn proper_list(value: &Value) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut cur = value.clone();
    loop {
        match cur {
            Value::Nil => return Ok(items),
            Value::Pair(cell) => {
                items.push(cell.car.borrow().clone());
                cur = cell.cdr.borrow().clone();
            }
            other => return Err(expected(TypeTag::Pair | TypeTag::Nil, &other)),
        }
    }
}

// append shares the final argument instead of copying it.
fn list_append(scm: &mut Interp, args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Ok(Value::Nil);
    }
    let mut items = Vec::new();
    for arg in &args[..args.len() - 1] {
        items.extend(proper_list(arg)?);
    }
    let tail = args[args.len() - 1].clone();
    Ok(scm.heap.improper_list(items, tail))
}

fn list_member(args: &[Value], eq: impl Fn(&Value, &Value) -> bool) -> Result<Value> {
    exactly(2, args)?;
    let mut cur = args[1].clone();
    while let Value::Pair(cell) = cur.clone() {
        if eq(&args[0], &cell.car.borrow()) {
            return Ok(cur);
        }
        cur = cell.cdr.borrow().clone();
    }
    boolean(false)
}

fn list_assoc(args: &[Value], eq: impl Fn(&Value, &Value) -> bool) -> Result<Value> {
    exactly(2, args)?;
    let mut cur = args[1].clone();
    while let Value::Pair(cell) = cur {
        let entry = cell.car.borrow().clone();
        if let Value::Pair(pair) = &entry {
            if eq(&args[0], &pair.car.borrow()) {
                return Ok(entry);
            }
        }
        cur = cell.cdr.borrow().clone();
    }
    boolean(false)
}

// (map proc list1 list2 ...) walks the lists in lockstep, stopping at the
// shortest.
fn map_lists(scm: &mut Interp, env: &Env, args: &[Value], collect: bool) -> Result<Value> {
    at_least(2, args)?;
    let proc = args[0].clone();
    let lists: Vec<Vec<Value>> = args[1..]
        .iter()
        .map(proper_list)
        .collect::<Result<Vec<_>>>()?;
    let len = lists.iter().map(Vec::len).min().unwrap_or(0);

    let mut out = Vec::with_capacity(if collect { len } else { 0 });
    for i in 0..len {
        let row: Vec<Value> = lists.iter().map(|l| l[i].clone()).collect();
        let result = scm.apply_values(env, &proc, row)?;
        if collect {
            out.push(result);
        }
    }
    if collect {
        Ok(scm.heap.list(out))
    } else {
        Ok(Value::None)
    }
}

fn in_port(scm: &Interp, args: &[Value], idx: usize) -> Result<Rc<RefCell<Port>>> {
    match args.get(idx) {
        Some(v) => v.cast(),
        None => scm.stdin_port().cast(),
    }
}

fn out_port(scm: &Interp, args: &[Value], idx: usize) -> Result<Rc<RefCell<Port>>> {
    match args.get(idx) {
        Some(v) => v.cast(),
        None => scm.stdout_port().cast(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Interp;

    fn run(src: &str) -> Result<Value> {
        let mut scm = Interp::new();
        let env = scm.mkenv(None);
        scm.eval_str(&env, src)
    }

    fn runs_to(src: &str, printed: &str) {
        match run(src) {
            Ok(v) => assert_eq!(v.to_string(), printed, "source: {}", src),
            Err(e) => panic!("{} raised {}", src, e),
        }
    }

    #[test]
    fn test_equivalence() {
        runs_to("(eq? 'a 'a)", "#t");
        runs_to("(eq? '(1) '(1))", "#f");
        runs_to("(define x '(1 2)) (eq? x x)", "#t");
        runs_to("(eqv? 1 1)", "#t");
        runs_to("(equal? '(1 (2 3)) '(1 (2 3)))", "#t");
        runs_to("(equal? \"ab\" \"ab\")", "#t");
        runs_to("(equal? #(1 2) #(1 2))", "#t");
        runs_to("(equal? '(1 2) '(1 3))", "#f");
    }

    #[test]
    fn test_number_predicates() {
        runs_to("(number? 1)", "#t");
        runs_to("(number? 'a)", "#f");
        runs_to("(integer? 42)", "#t");
        runs_to("(integer? 1.5)", "#f");
        runs_to("(exact? 1)", "#t");
        runs_to("(exact? 1.5)", "#f");
        runs_to("(real? 2+3i)", "#f");
        runs_to("(complex? 2+3i)", "#t");
        runs_to("(zero? 0)", "#t");
        runs_to("(positive? 3)", "#t");
        runs_to("(negative? -3)", "#t");
        runs_to("(odd? 3)", "#t");
        runs_to("(even? 4)", "#t");
    }

    #[test]
    fn test_numeric_ops() {
        runs_to("(+ 1 2 3)", "6");
        runs_to("(+)", "0");
        runs_to("(*)", "1");
        runs_to("(- 5)", "-5");
        runs_to("(- 10 1 2)", "7");
        runs_to("(/ 2)", "0.5");
        runs_to("(modulo -7 3)", "2");
        runs_to("(remainder -7 3)", "-1");
        runs_to("(quotient 7 2)", "3");
        runs_to("(min 3 1 2)", "1");
        runs_to("(max 3 1 2)", "3");
        runs_to("(abs -4)", "4");
        runs_to("(expt 2 10)", "1024");
        runs_to("(square 7)", "49");
        runs_to("(floor 1.5)", "1");
        runs_to("(ceiling 1.5)", "2");
        runs_to("(round 2.5)", "2");
        runs_to("(truncate -1.5)", "-1");
        runs_to("(sqrt 16)", "4");
        runs_to("(= 1 1 1)", "#t");
        runs_to("(< 1 2 3)", "#t");
        runs_to("(< 1 3 2)", "#f");
        runs_to("(>= 3 3 2)", "#t");
    }

    #[test]
    fn test_complex_ops() {
        runs_to("(make-rectangular 2 3)", "2+3i");
        runs_to("(real-part 2+3i)", "2");
        runs_to("(imag-part 2+3i)", "3");
        runs_to("(conjugate 2+3i)", "2-3i");
        runs_to("(make-rectangular 2 0)", "2");
        runs_to("(magnitude 3+4i)", "5");
        assert!(run("(< 1+2i 3)").is_err());
    }

    #[test]
    fn test_string_number_conversion() {
        runs_to("(string->number \"42\")", "42");
        runs_to("(string->number \"1.5\")", "1.5");
        runs_to("(string->number \"nope\")", "#f");
        runs_to("(string->number \"ff\" 16)", "255");
        runs_to("(number->string 42)", "\"42\"");
        runs_to("(number->string 255 16)", "\"ff\"");
    }

    #[test]
    fn test_booleans() {
        runs_to("(not #f)", "#t");
        runs_to("(not 0)", "#f");
        runs_to("(boolean? #t)", "#t");
        runs_to("(boolean? 0)", "#f");
        runs_to("(boolean=? #t #t #t)", "#t");
        runs_to("(boolean=? #t #f)", "#f");
    }

    #[test]
    fn test_list_ops() {
        runs_to("(cons 1 2)", "(1 . 2)");
        runs_to("(list 1 2 3)", "(1 2 3)");
        runs_to("(car '(1 2))", "1");
        runs_to("(cdr '(1 2))", "(2)");
        runs_to("(cadr '(1 2 3))", "2");
        runs_to("(caddr '(1 2 3))", "3");
        runs_to("(length '(1 2 3))", "3");
        runs_to("(length '())", "0");
        runs_to("(append '(1 2) '(3) '(4 5))", "(1 2 3 4 5)");
        runs_to("(append)", "()");
        runs_to("(append '(1) 2)", "(1 . 2)");
        runs_to("(reverse '(1 2 3))", "(3 2 1)");
        runs_to("(list-tail '(1 2 3) 1)", "(2 3)");
        runs_to("(list-ref '(1 2 3) 2)", "3");
        runs_to("(make-list 3 'x)", "(x x x)");
        runs_to("(define l (list 1 2)) (list-set! l 1 'b) l", "(1 b)");
        runs_to("(define l (list 1 2)) (set-car! l 9) l", "(9 2)");
        runs_to("(list-copy '(1 2 3))", "(1 2 3)");
        assert!(run("(list-ref '(1) 5)").is_err());
        assert!(run("(car 1)").is_err());
    }

    #[test]
    fn test_circular_lists() {
        runs_to("(define x (cons 1 2)) (set-cdr! x x) (list? x)", "#t");
        runs_to("(define x (cons 1 2)) (set-cdr! x x) (length x)", "1");
        runs_to(
            "(define ring (list 1 2 3))
             (set-cdr! (cddr ring) ring)
             (length ring)",
            "3",
        );
        runs_to("(list? '(1 2))", "#t");
        runs_to("(list? '(1 . 2))", "#f");
    }

    #[test]
    fn test_member_assoc() {
        runs_to("(memq 'c '(a b c d))", "(c d)");
        runs_to("(memq 'z '(a b))", "#f");
        runs_to("(member '(1) '((0) (1) (2)))", "((1) (2))");
        runs_to("(assq 'b '((a 1) (b 2)))", "(b 2)");
        runs_to("(assoc \"b\" '((\"a\" 1) (\"b\" 2)))", "(\"b\" 2)");
        runs_to("(assq 'z '((a 1)))", "#f");
    }

    #[test]
    fn test_symbols() {
        runs_to("(symbol? 'a)", "#t");
        runs_to("(symbol->string 'abc)", "\"abc\"");
        runs_to("(string->symbol \"xyz\")", "xyz");
        runs_to("(eq? (string->symbol \"q\") 'q)", "#t");
        runs_to("(symbol? (gensym))", "#t");
        runs_to("(eq? (gensym) (gensym))", "#f");
    }

    #[test]
    fn test_chars() {
        runs_to("(char? #\\a)", "#t");
        runs_to("(char=? #\\a #\\a)", "#t");
        runs_to("(char<? #\\a #\\b)", "#t");
        runs_to("(char-alphabetic? #\\a)", "#t");
        runs_to("(char-numeric? #\\5)", "#t");
        runs_to("(char-whitespace? #\\space)", "#t");
        runs_to("(char->integer #\\A)", "65");
        runs_to("(integer->char 97)", "#\\a");
        runs_to("(char-upcase #\\a)", "#\\A");
        runs_to("(char-downcase #\\A)", "#\\a");
        runs_to("(digit-value #\\7)", "7");
        runs_to("(digit-value #\\x)", "#f");
    }

    #[test]
    fn test_strings() {
        runs_to("(string? \"a\")", "#t");
        runs_to("(make-string 3 #\\z)", "\"zzz\"");
        runs_to("(string #\\a #\\b)", "\"ab\"");
        runs_to("(string-length \"hello\")", "5");
        runs_to("(string-ref \"abc\" 1)", "#\\b");
        runs_to("(define s (make-string 3 #\\a)) (string-set! s 1 #\\b) s", "\"aba\"");
        runs_to("(string=? \"ab\" \"ab\")", "#t");
        runs_to("(string<? \"ab\" \"b\")", "#t");
        runs_to("(string-upcase \"abc\")", "\"ABC\"");
        runs_to("(string-append \"foo\" \"bar\")", "\"foobar\"");
        runs_to("(string->list \"ab\")", "(#\\a #\\b)");
        runs_to("(list->string '(#\\a #\\b))", "\"ab\"");
        runs_to("(substring \"hello\" 1 3)", "\"el\"");
        runs_to("(string-copy \"abc\")", "\"abc\"");
        runs_to("(define s (make-string 2 #\\a)) (string-fill! s #\\q) s", "\"qq\"");
        runs_to("(string-map char-upcase \"abc\")", "\"ABC\"");
        assert!(run("(string-ref \"a\" 3)").is_err());
        assert!(run("(substring \"ab\" 2 1)").is_err());
    }

    #[test]
    fn test_vectors() {
        runs_to("(vector? #(1))", "#t");
        runs_to("(make-vector 2 0)", "#(0 0)");
        runs_to("(vector 1 2 3)", "#(1 2 3)");
        runs_to("(vector-length #(1 2))", "2");
        runs_to("(vector-ref #(1 2) 1)", "2");
        runs_to("(define v (make-vector 2 0)) (vector-set! v 0 'a) v", "#(a 0)");
        runs_to("(vector->list #(1 2))", "(1 2)");
        runs_to("(list->vector '(1 2))", "#(1 2)");
        runs_to("(vector-copy #(1 2))", "#(1 2)");
        runs_to("(vector-append #(1) #(2 3))", "#(1 2 3)");
        runs_to("(define v (make-vector 2 0)) (vector-fill! v 'x) v", "#(x x)");
        runs_to("(vector-map (lambda (x) (* x x)) #(1 2 3))", "#(1 4 9)");
        assert!(run("(vector-ref #(1) 1)").is_err());
    }

    #[test]
    fn test_control() {
        runs_to("(procedure? car)", "#t");
        runs_to("(procedure? (lambda (x) x))", "#t");
        runs_to("(procedure? 'car)", "#f");
        runs_to("(procedure? if)", "#f");
        runs_to("(map (lambda (x) (* 2 x)) '(1 2 3))", "(2 4 6)");
        runs_to("(map + '(1 2) '(10 20))", "(11 22)");
        runs_to("(map car '((1 2) (3 4)))", "(1 3)");
        runs_to(
            "(define acc '())
             (for-each (lambda (x) (set! acc (cons x acc))) '(1 2 3))
             acc",
            "(3 2 1)",
        );
        assert!(run("(call/cc (lambda (k) 1))").is_err());
    }

    #[test]
    fn test_error_primitive() {
        match run("(error \"boom\" 1 2)") {
            Err(Error::User(v)) => assert_eq!(v.to_string(), "(\"boom\" 1 2)"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_eval_and_env() {
        runs_to("(eval '(+ 1 2))", "3");
        runs_to("(eval '(+ 1 2) (interaction-environment))", "3");
        runs_to("(procedure? interaction-environment)", "#t");
    }

    #[test]
    fn test_exit_sentinel() {
        let v = run("(exit)").unwrap();
        assert!(v.is_exit());
    }

    #[test]
    fn test_string_ports() {
        runs_to(
            "(define p (open-output-string))
             (display \"half \" p)
             (write \"life\" p)
             (get-output-string p)",
            "\"half \\\"life\\\"\"",
        );
        runs_to(
            "(define p (open-input-string \"(+ 1 2) 42\"))
             (eval (read p))",
            "3",
        );
        runs_to(
            "(define p (open-input-string \"ab\"))
             (read-char p)
             (read-char p)
             (eof-object? (read-char p))",
            "#t",
        );
        runs_to("(eof-object? (eof-object))", "#t");
        runs_to(
            "(define p (open-input-string \"line one\nline two\"))
             (read-line p)",
            "\"line one\"",
        );
        runs_to(
            "(define p (open-input-string \"xy\"))
             (peek-char p)
             (read-char p)",
            "#\\x",
        );
    }

    #[test]
    fn test_gc_primitives() {
        runs_to("(number? (gc))", "#t");
        runs_to("(define keep '(1 2 3)) (gc) keep", "(1 2 3)");
    }

    #[test]
    fn test_regex_extension() {
        runs_to("(regex-match? \"^a+$\" \"aaa\")", "#t");
        runs_to("(regex-match? \"^a+$\" \"ab\")", "#f");
        runs_to("(regex-search \"[0-9]+\" \"abc123def\")", "\"123\"");
        runs_to("(regex-search \"[0-9]+\" \"abc\")", "#f");
        assert!(run("(regex-match? \"(\" \"x\")").is_err());
    }

    #[test]
    fn test_features() {
        runs_to("(pair? (features))", "#t");
        runs_to("(memq 'uscheme (features))", "(uscheme)");
    }

    #[test]
    fn test_clock_primitives() {
        runs_to("(number? (current-second))", "#t");
        runs_to("(number? (current-jiffy))", "#t");
        runs_to("(jiffies-per-second)", "1000");
    }

    #[test]
    fn test_use_count() {
        runs_to("(number? (use-count '(1)))", "#t");
        runs_to("(use-count 1)", "0");
        // Shared payloads report their live reference count; a bound
        // closure is held by the binding and by the argument vector.
        runs_to("(define f (lambda (x) x)) (positive? (use-count f))", "#t");
        runs_to(
            "(define f (lambda (x) x))
             (define g f)
             (> (use-count f) 1)",
            "#t",
        );
    }

    #[test]
    fn test_arity_errors() {
        assert!(matches!(run("(cons 1)"), Err(Error::Arity { .. })));
        assert!(matches!(run("(car)"), Err(Error::Arity { .. })));
        assert!(matches!(run("(not 1 2)"), Err(Error::Arity { .. })));
    }
}
