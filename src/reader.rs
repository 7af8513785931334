// The reader: a character-stream tokenizer and datum parser.
//
// read consumes one complete expression from an input port and yields a
// value, or None at end of input. Quote sugar becomes (quote x) with the
// interned syntax opcode as operator. Quasiquotation is resolved here:
// the evaluator only ever sees cons/append/list/quote forms.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::number::Number;
use crate::port::Port;
use crate::prims::Opcode;
use crate::value::Value;

pub struct Reader {
    depth: usize,
}

enum Token {
    OParen,
    CParen,
    Dot,
    Quote,
    Quasi,
    Unquote,
    UnquoteSplice,
    VecOpen,
    Bool(bool),
    Char(char),
    Str(String),
    Num(Number),
    Sym(String),
    Eof,
}

fn getc(port: &Rc<RefCell<Port>>) -> Result<Option<char>> {
    port.borrow_mut().read_char()
}

fn ungetc(port: &Rc<RefCell<Port>>, c: char) {
    port.borrow_mut().unread_char(c);
}

// Characters that end a word: whitespace handled separately.
fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '"' | ';' | '\'' | '`' | ',')
}

impl Reader {
    pub fn new() -> Reader {
        Reader { depth: 0 }
    }

    /// Read the next expression from the port; None at end of input.
    pub fn read(&mut self, scm: &mut Interp, port: &Rc<RefCell<Port>>) -> Result<Option<Value>> {
        self.depth = 0;
        match self.get_token(port)? {
            Token::Eof => Ok(None),
            tok => self.parse(scm, port, tok).map(Some),
        }
    }

    fn parse_datum(&mut self, scm: &mut Interp, port: &Rc<RefCell<Port>>) -> Result<Value> {
        match self.get_token(port)? {
            Token::Eof => Err(Error::Syntax("unexpected end of input", Value::None)),
            tok => self.parse(scm, port, tok),
        }
    }

    fn parse(&mut self, scm: &mut Interp, port: &Rc<RefCell<Port>>, tok: Token) -> Result<Value> {
        match tok {
            Token::Bool(b) => Ok(Value::Bool(b)),
            Token::Char(c) => Ok(Value::Char(c)),
            Token::Num(n) => Ok(Value::Number(n)),
            Token::Str(s) => Ok(Value::Str(Rc::new(RefCell::new(s)))),
            Token::Sym(name) => Ok(Value::Symbol(scm.mksym(&name))),
            Token::OParen => self.parse_list(scm, port),
            Token::VecOpen => self.parse_vector(scm, port),
            Token::Quote => {
                let datum = self.parse_datum(scm, port)?;
                Ok(scm.heap.list(vec![Value::Intern(Opcode::Quote), datum]))
            }
            Token::Quasi => {
                self.depth += 1;
                let datum = self.parse_datum(scm, port)?;
                self.depth -= 1;
                if self.depth == 0 {
                    self.qq_expand(scm, datum, 1)
                } else {
                    Ok(scm
                        .heap
                        .list(vec![Value::Intern(Opcode::Quasiquote), datum]))
                }
            }
            Token::Unquote => {
                if self.depth == 0 {
                    return Err(Error::Syntax("unquote outside quasiquote", Value::None));
                }
                self.depth -= 1;
                let datum = self.parse_datum(scm, port)?;
                self.depth += 1;
                Ok(scm.heap.list(vec![Value::Intern(Opcode::Unquote), datum]))
            }
            Token::UnquoteSplice => {
                if self.depth == 0 {
                    return Err(Error::Syntax(
                        "unquote-splicing outside quasiquote",
                        Value::None,
                    ));
                }
                self.depth -= 1;
                let datum = self.parse_datum(scm, port)?;
                self.depth += 1;
                Ok(scm
                    .heap
                    .list(vec![Value::Intern(Opcode::UnquoteSplice), datum]))
            }
            Token::CParen => Err(Error::Syntax("unexpected )", Value::None)),
            Token::Dot => Err(Error::Syntax("unexpected .", Value::None)),
            Token::Eof => Err(Error::Syntax("unexpected end of input", Value::None)),
        }
    }

    fn parse_list(&mut self, scm: &mut Interp, port: &Rc<RefCell<Port>>) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            match self.get_token(port)? {
                Token::CParen => return Ok(scm.heap.list(items)),
                Token::Dot => {
                    if items.is_empty() {
                        return Err(Error::Syntax("unexpected .", Value::None));
                    }
                    let tail = self.parse_datum(scm, port)?;
                    match self.get_token(port)? {
                        Token::CParen => return Ok(scm.heap.improper_list(items, tail)),
                        _ => return Err(Error::Syntax("expected ) after dotted tail", tail)),
                    }
                }
                Token::Eof => {
                    return Err(Error::Syntax("unterminated list", scm.heap.list(items)));
                }
                tok => items.push(self.parse(scm, port, tok)?),
            }
        }
    }

    fn parse_vector(&mut self, scm: &mut Interp, port: &Rc<RefCell<Port>>) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            match self.get_token(port)? {
                Token::CParen => return Ok(Value::Vector(Rc::new(RefCell::new(items)))),
                Token::Eof => {
                    return Err(Error::Syntax("unterminated vector", Value::None));
                }
                Token::Dot => return Err(Error::Syntax("unexpected . in vector", Value::None)),
                tok => items.push(self.parse(scm, port, tok)?),
            }
        }
    }

    // Rewrite a quasiquoted datum into cons/append/list->vector/quote
    // forms. depth tracks quasiquote nesting; only level-one unquotes
    // escape, deeper markers are rebuilt one level shallower.
    fn qq_expand(&mut self, scm: &mut Interp, datum: Value, depth: usize) -> Result<Value> {
        if datum.is_pair() {
            let head = datum.car()?;
            if head.is_intern(Opcode::Unquote) {
                let inner = datum.cadr()?;
                if depth == 1 {
                    return Ok(inner);
                }
                let e = self.qq_expand(scm, inner, depth - 1)?;
                return Ok(scm.heap.list(vec![
                    Value::Intern(Opcode::OpList),
                    Value::Intern(Opcode::Unquote),
                    e,
                ]));
            }
            if head.is_intern(Opcode::UnquoteSplice) {
                if depth == 1 {
                    return Err(Error::Syntax(
                        "unquote-splicing outside list context",
                        datum,
                    ));
                }
                let inner = datum.cadr()?;
                let e = self.qq_expand(scm, inner, depth - 1)?;
                return Ok(scm.heap.list(vec![
                    Value::Intern(Opcode::OpList),
                    Value::Intern(Opcode::UnquoteSplice),
                    e,
                ]));
            }
            if head.is_intern(Opcode::Quasiquote) {
                let inner = datum.cadr()?;
                let e = self.qq_expand(scm, inner, depth + 1)?;
                return Ok(scm.heap.list(vec![
                    Value::Intern(Opcode::OpList),
                    Value::Intern(Opcode::Quasiquote),
                    e,
                ]));
            }
            // A level-one splicing element turns the rest of the list
            // into an append.
            if depth == 1 && head.is_pair() && head.car()?.is_intern(Opcode::UnquoteSplice) {
                let spliced = head.cadr()?;
                let rest = self.qq_expand(scm, datum.cdr()?, depth)?;
                return Ok(scm.heap.list(vec![
                    Value::Intern(Opcode::OpAppend),
                    spliced,
                    rest,
                ]));
            }
            let car_e = self.qq_expand(scm, head, depth)?;
            let cdr_e = self.qq_expand(scm, datum.cdr()?, depth)?;
            return Ok(scm
                .heap
                .list(vec![Value::Intern(Opcode::OpCons), car_e, cdr_e]));
        }
        if let Value::Vector(vec) = &datum {
            let items = vec.borrow().clone();
            let as_list = scm.heap.list(items);
            let e = self.qq_expand(scm, as_list, depth)?;
            return Ok(scm
                .heap
                .list(vec![Value::Intern(Opcode::OpListVec), e]));
        }
        Ok(scm.quote(datum))
    }

    fn get_token(&mut self, port: &Rc<RefCell<Port>>) -> Result<Token> {
        // Skip whitespace and line comments.
        let c = loop {
            match getc(port)? {
                None => return Ok(Token::Eof),
                Some(';') => {
                    while let Some(c) = getc(port)? {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some(c) if c.is_whitespace() => {}
                Some(c) => break c,
            }
        };

        match c {
            '(' => Ok(Token::OParen),
            ')' => Ok(Token::CParen),
            '\'' => Ok(Token::Quote),
            '`' => Ok(Token::Quasi),
            ',' => match getc(port)? {
                Some('@') => Ok(Token::UnquoteSplice),
                Some(c) => {
                    ungetc(port, c);
                    Ok(Token::Unquote)
                }
                None => Ok(Token::Unquote),
            },
            '"' => self.lex_string(port),
            '#' => self.lex_special(port),
            c => {
                let word = self.read_word(port, c)?;
                self.classify(word)
            }
        }
    }

    fn read_word(&mut self, port: &Rc<RefCell<Port>>, first: char) -> Result<String> {
        let mut word = String::new();
        word.push(first);
        while let Some(c) = getc(port)? {
            if c.is_whitespace() || is_delimiter(c) {
                ungetc(port, c);
                break;
            }
            word.push(c);
        }
        Ok(word)
    }

    fn classify(&mut self, word: String) -> Result<Token> {
        if word == "." {
            return Ok(Token::Dot);
        }
        if let Some(n) = Number::parse(&word) {
            return Ok(Token::Num(n));
        }
        if word.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::Syntax("invalid numeric literal", Value::None));
        }
        Ok(Token::Sym(word))
    }

    fn lex_string(&mut self, port: &Rc<RefCell<Port>>) -> Result<Token> {
        let mut text = String::new();
        loop {
            match getc(port)? {
                None => return Err(Error::Syntax("unterminated string", Value::None)),
                Some('"') => return Ok(Token::Str(text)),
                Some('\\') => match getc(port)? {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    _ => return Err(Error::Syntax("invalid string escape", Value::None)),
                },
                Some(c) => text.push(c),
            }
        }
    }

    fn lex_special(&mut self, port: &Rc<RefCell<Port>>) -> Result<Token> {
        match getc(port)? {
            Some('(') => Ok(Token::VecOpen),
            Some('\\') => self.lex_char(port),
            Some(c) => {
                let word = self.read_word(port, c)?;
                match word.as_str() {
                    "t" | "true" => Ok(Token::Bool(true)),
                    "f" | "false" => Ok(Token::Bool(false)),
                    _ => Err(Error::Syntax("invalid # syntax", Value::None)),
                }
            }
            None => Err(Error::Syntax("unexpected end of input", Value::None)),
        }
    }

    fn lex_char(&mut self, port: &Rc<RefCell<Port>>) -> Result<Token> {
        let first = match getc(port)? {
            Some(c) => c,
            None => {
                return Err(Error::Syntax(
                    "unexpected end of character literal",
                    Value::None,
                ))
            }
        };
        if !first.is_alphabetic() {
            return Ok(Token::Char(first));
        }
        let word = self.read_word(port, first)?;
        if word.chars().count() == 1 {
            return Ok(Token::Char(first));
        }
        match word.as_str() {
            "alarm" => Ok(Token::Char('\x07')),
            "backspace" => Ok(Token::Char('\x08')),
            "delete" => Ok(Token::Char('\x7f')),
            "escape" => Ok(Token::Char('\x1b')),
            "newline" => Ok(Token::Char('\n')),
            "null" => Ok(Token::Char('\0')),
            "return" => Ok(Token::Char('\r')),
            "space" => Ok(Token::Char(' ')),
            "tab" => Ok(Token::Char('\t')),
            w if w.starts_with('x') => {
                let code = u32::from_str_radix(&w[1..], 16)
                    .map_err(|_| Error::Syntax("invalid character code", Value::None))?;
                match std::char::from_u32(code) {
                    Some(c) => Ok(Token::Char(c)),
                    None => Err(Error::Syntax("invalid character code", Value::None)),
                }
            }
            _ => Err(Error::Syntax("unknown character name", Value::None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Interp;

    // Read a single datum from source text.
    fn read1(scm: &mut Interp, src: &str) -> Result<Option<Value>> {
        let port = Rc::new(RefCell::new(Port::in_string(src)));
        Reader::new().read(scm, &port)
    }

    fn reads_as(src: &str, printed: &str) {
        let mut scm = Interp::new();
        let v = read1(&mut scm, src).unwrap().unwrap();
        assert_eq!(v.to_string(), printed, "source: {}", src);
    }

    #[test]
    fn test_atoms() {
        reads_as("42", "42");
        reads_as("-17", "-17");
        reads_as("1.5", "1.5");
        reads_as("2+3i", "2+3i");
        reads_as("#t", "#t");
        reads_as("#false", "#f");
        reads_as("foo", "foo");
        reads_as("\"a b\"", "\"a b\"");
        reads_as("#\\a", "#\\a");
        reads_as("#\\space", "#\\space");
        reads_as("#\\x41", "#\\A");
        reads_as("+", "+");
        reads_as("...", "...");
    }

    #[test]
    fn test_lists() {
        reads_as("(1 2 3)", "(1 2 3)");
        reads_as("()", "()");
        reads_as("(1 (2 3) 4)", "(1 (2 3) 4)");
        reads_as("(1 . 2)", "(1 . 2)");
        reads_as("(1 2 . 3)", "(1 2 . 3)");
        reads_as("#(1 #(2) 3)", "#(1 #(2) 3)");
    }

    #[test]
    fn test_comments_and_whitespace() {
        reads_as("  ; leading comment\n  (1 ; inline\n 2)", "(1 2)");
    }

    #[test]
    fn test_quote_sugar() {
        let mut scm = Interp::new();
        let v = read1(&mut scm, "'x").unwrap().unwrap();
        assert!(v.car().unwrap().is_intern(Opcode::Quote));
        assert_eq!(v.cadr().unwrap().to_string(), "x");
        assert!(v.cddr().unwrap().is_nil());
    }

    #[test]
    fn test_eof_and_errors() {
        let mut scm = Interp::new();
        assert!(read1(&mut scm, "").unwrap().is_none());
        assert!(read1(&mut scm, "   ; only a comment").unwrap().is_none());
        assert!(read1(&mut scm, "(1 2").is_err());
        assert!(read1(&mut scm, ")").is_err());
        assert!(read1(&mut scm, "(1 . 2 3)").is_err());
        assert!(read1(&mut scm, "\"open").is_err());
        assert!(read1(&mut scm, ",x").is_err());
        assert!(read1(&mut scm, "1abc").is_err());
    }

    #[test]
    fn test_multiple_data() {
        let mut scm = Interp::new();
        let port = Rc::new(RefCell::new(Port::in_string("1 two \"three\"")));
        let mut reader = Reader::new();
        assert_eq!(
            reader.read(&mut scm, &port).unwrap().unwrap().to_string(),
            "1"
        );
        assert_eq!(
            reader.read(&mut scm, &port).unwrap().unwrap().to_string(),
            "two"
        );
        assert_eq!(
            reader.read(&mut scm, &port).unwrap().unwrap().to_string(),
            "\"three\""
        );
        assert!(reader.read(&mut scm, &port).unwrap().is_none());
    }

    #[test]
    fn test_quasiquote_evaluates() {
        let mut scm = Interp::new();
        let env = scm.mkenv(None);
        let v = scm
            .eval_str(&env, "`(1 ,(+ 1 2) ,@(list 3 4) tail)")
            .unwrap();
        assert_eq!(v.to_string(), "(1 3 3 4 tail)");

        let v = scm.eval_str(&env, "`(a . ,(+ 1 1))").unwrap();
        assert_eq!(v.to_string(), "(a . 2)");

        let v = scm.eval_str(&env, "`#(1 ,(+ 1 1))").unwrap();
        assert_eq!(v.to_string(), "#(1 2)");
    }

    #[test]
    fn test_interned_symbols_are_shared() {
        let mut scm = Interp::new();
        let a = read1(&mut scm, "foo").unwrap().unwrap();
        let b = read1(&mut scm, "foo").unwrap().unwrap();
        assert!(crate::value::is_eqv(&a, &b));
    }
}
