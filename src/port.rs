// Shared I/O handles.
//
// A port wraps one of the standard streams, a file, or an in-memory
// string. Input ports keep a pushback queue so the reader can give back
// characters it looked at but did not consume; interactive input is
// pulled in one line at a time.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use crate::error::{Error, Result};

pub enum PortKind {
    Stdin,
    Stdout,
    Stderr,
    InFile(BufReader<File>),
    OutFile(File),
    InString,
    OutString(String),
    Closed,
}

pub struct Port {
    kind: PortKind,
    pushback: VecDeque<char>,
}

impl Port {
    pub fn stdin() -> Port {
        Port::new(PortKind::Stdin)
    }

    pub fn stdout() -> Port {
        Port::new(PortKind::Stdout)
    }

    pub fn stderr() -> Port {
        Port::new(PortKind::Stderr)
    }

    pub fn open_in(path: &str) -> Result<Port> {
        let file = File::open(path)
            .map_err(|e| Error::Io(format!("couldn't open input file '{}': {}", path, e)))?;
        Ok(Port::new(PortKind::InFile(BufReader::new(file))))
    }

    pub fn open_out(path: &str) -> Result<Port> {
        let file = File::create(path)
            .map_err(|e| Error::Io(format!("couldn't open output file '{}': {}", path, e)))?;
        Ok(Port::new(PortKind::OutFile(file)))
    }

    /// An input port over an in-memory string.
    pub fn in_string(text: &str) -> Port {
        let mut port = Port::new(PortKind::InString);
        port.pushback = text.chars().collect();
        port
    }

    /// An output port collecting into an in-memory string.
    pub fn out_string() -> Port {
        Port::new(PortKind::OutString(String::new()))
    }

    fn new(kind: PortKind) -> Port {
        Port {
            kind,
            pushback: VecDeque::new(),
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(
            self.kind,
            PortKind::Stdin | PortKind::InFile(_) | PortKind::InString
        )
    }

    pub fn is_output(&self) -> bool {
        matches!(
            self.kind,
            PortKind::Stdout | PortKind::Stderr | PortKind::OutFile(_) | PortKind::OutString(_)
        )
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.kind, PortKind::Closed)
    }

    pub fn close(&mut self) {
        self.kind = PortKind::Closed;
        self.pushback.clear();
    }

    // Pull another line from the underlying stream into the pushback
    // queue. Returns false at end of input.
    fn fill(&mut self) -> Result<bool> {
        if !self.pushback.is_empty() {
            return Ok(true);
        }
        let mut line = String::new();
        let n = match &mut self.kind {
            PortKind::Stdin => io::stdin().read_line(&mut line)?,
            PortKind::InFile(reader) => reader.read_line(&mut line)?,
            PortKind::InString => 0,
            PortKind::Closed => return Err(Error::Io("port is closed".to_string())),
            _ => return Err(Error::Io("not an input port".to_string())),
        };
        self.pushback.extend(line.chars());
        Ok(n > 0)
    }

    pub fn read_char(&mut self) -> Result<Option<char>> {
        if !self.fill()? {
            return Ok(None);
        }
        Ok(self.pushback.pop_front())
    }

    pub fn peek_char(&mut self) -> Result<Option<char>> {
        if !self.fill()? {
            return Ok(None);
        }
        Ok(self.pushback.front().copied())
    }

    /// Give characters back to the port, before anything already pushed.
    pub fn unread(&mut self, text: &str) {
        for c in text.chars().rev() {
            self.pushback.push_front(c);
        }
    }

    pub fn unread_char(&mut self, c: char) {
        self.pushback.push_front(c);
    }

    /// Read up to the next newline; the newline is consumed but not
    /// returned. None at end of input.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        loop {
            match self.read_char()? {
                Some('\n') => return Ok(Some(line)),
                Some(c) => line.push(c),
                None if line.is_empty() => return Ok(None),
                None => return Ok(Some(line)),
            }
        }
    }

    /// Read at most n characters. None at end of input.
    pub fn read_string(&mut self, n: usize) -> Result<Option<String>> {
        let mut text = String::new();
        for _ in 0..n {
            match self.read_char()? {
                Some(c) => text.push(c),
                None => break,
            }
        }
        if text.is_empty() && n > 0 {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    /// Would read-char block? True whenever buffered input is pending or
    /// the source is non-interactive.
    pub fn char_ready(&self) -> bool {
        !self.pushback.is_empty()
            || matches!(self.kind, PortKind::InFile(_) | PortKind::InString)
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        match &mut self.kind {
            PortKind::Stdout => {
                io::stdout().write_all(text.as_bytes())?;
            }
            PortKind::Stderr => {
                io::stderr().write_all(text.as_bytes())?;
            }
            PortKind::OutFile(file) => {
                file.write_all(text.as_bytes())?;
            }
            PortKind::OutString(buf) => buf.push_str(text),
            PortKind::Closed => return Err(Error::Io("port is closed".to_string())),
            _ => return Err(Error::Io("not an output port".to_string())),
        }
        Ok(())
    }

    pub fn write_char(&mut self, c: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.write_str(c.encode_utf8(&mut buf))
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.kind {
            PortKind::Stdout => io::stdout().flush()?,
            PortKind::OutFile(file) => file.flush()?,
            _ => {}
        }
        Ok(())
    }

    /// The collected contents of a string output port.
    pub fn string_contents(&self) -> Option<String> {
        match &self.kind {
            PortKind::OutString(buf) => Some(buf.clone()),
            _ => None,
        }
    }
}
