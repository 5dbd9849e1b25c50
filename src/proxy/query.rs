//! Parser for the index server's query language, only as much of it as
//! needed to learn the frame targeted by every top-level call.
//!
//! ```text
//! query := call*
//! call  := IDENT "(" [ arg ("," arg)* ] ")"
//! arg   := IDENT "=" value | value
//! value := call | IDENT | NUMBER | STRING | "[" [ value ("," value)* ] "]"
//! ```
//!
//! Whitespace is allowed between tokens. Strings are quoted with single or
//! double quotes, with backslash escapes.

use regex::Regex;

use std::{fmt, result};

use crate::Result;

/// Position in (line_no, col_no) format within the text. Both start from 1.
pub struct Position(usize, usize);

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "({},{})", self.0, self.1)
    }
}

/// A call in the query, like `TopN(color, n=5)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Positional(Value),
    Keyed(String, Value),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Call(Call),
}

impl Call {
    /// Return the frame targeted by this call, from its `frame=` argument,
    /// else from its first positional identifier.
    pub fn to_frame(&self) -> Option<&str> {
        let keyed = self.args.iter().find_map(|arg| match arg {
            Arg::Keyed(key, Value::Ident(frame)) if key == "frame" => Some(frame.as_str()),
            Arg::Keyed(key, Value::Str(frame)) if key == "frame" => Some(frame.as_str()),
            _ => None,
        });
        keyed.or_else(|| {
            self.args.iter().find_map(|arg| match arg {
                Arg::Positional(Value::Ident(frame)) => Some(frame.as_str()),
                _ => None,
            })
        })
    }
}

// cursor over the query text, tracking line and column for errors.
struct Lex<'a> {
    text: &'a str,
    row_no: usize, // start from ZERO
    col_no: usize, // start from ZERO
    cursor: usize, // start from ZERO
}

impl<'a> Lex<'a> {
    fn new(text: &'a str) -> Lex<'a> {
        Lex {
            text,
            row_no: 0,
            col_no: 0,
            cursor: 0,
        }
    }

    fn to_position(&self) -> Position {
        Position(self.row_no + 1, self.col_no + 1)
    }

    fn move_cursor(&mut self, n: usize) {
        let r = self.cursor..(self.cursor + n);
        for ch in self.text[r].chars() {
            match ch {
                '\n' => {
                    self.row_no += 1;
                    self.col_no = 0;
                }
                _ => self.col_no += 1,
            }
        }

        self.cursor += n;
    }

    fn as_str(&self) -> &'a str {
        &self.text[self.cursor..]
    }

    fn skip_ws(&mut self) {
        let n = self.as_str().len() - self.as_str().trim_start().len();
        self.move_cursor(n)
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.as_str().chars().next()
    }

    fn expect(&mut self, ch: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == ch => {
                self.move_cursor(ch.len_utf8());
                Ok(())
            }
            Some(c) => err_at!(
                FailParse, msg: "expected {:?} found {:?} at {}", ch, c, self.to_position()
            ),
            None => err_at!(FailParse, msg: "expected {:?} found end of query", ch),
        }
    }

    fn token(&mut self, re: &Regex) -> Option<&'a str> {
        self.skip_ws();
        let text = self.as_str();
        let m = re.find(text)?;
        let token = &text[..m.end()];
        self.move_cursor(m.end());
        Some(token)
    }
}

/// Parse query text into top-level calls.
pub struct QueryParser {
    ident: Regex,
    number: Regex,
}

impl QueryParser {
    pub fn new() -> Result<QueryParser> {
        let val = QueryParser {
            ident: err_at!(Fatal, Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-\.]*"))?,
            number: err_at!(Fatal, Regex::new(r"^-?[0-9]+(\.[0-9]+)?([eE][-+]?[0-9]+)?"))?,
        };
        Ok(val)
    }

    pub fn parse(&self, text: &str) -> Result<Vec<Call>> {
        let mut lex = Lex::new(text);
        let mut calls = vec![];
        while lex.peek().is_some() {
            calls.push(self.parse_call(&mut lex)?);
        }
        Ok(calls)
    }

    fn parse_call(&self, lex: &mut Lex) -> Result<Call> {
        let pos = lex.to_position();
        let name = match lex.token(&self.ident) {
            Some(name) => name.to_string(),
            None => err_at!(FailParse, msg: "expected call at {}", pos)?,
        };
        self.parse_args(name, lex)
    }

    fn parse_args(&self, name: String, lex: &mut Lex) -> Result<Call> {
        lex.expect('(')?;

        let mut args = vec![];
        if lex.peek() == Some(')') {
            lex.expect(')')?;
            return Ok(Call { name, args });
        }

        loop {
            args.push(self.parse_arg(lex)?);
            match lex.peek() {
                Some(',') => lex.expect(',')?,
                _ => break lex.expect(')')?,
            }
        }

        Ok(Call { name, args })
    }

    fn parse_arg(&self, lex: &mut Lex) -> Result<Arg> {
        match self.parse_value(lex)? {
            Value::Ident(key) if lex.peek() == Some('=') => {
                lex.expect('=')?;
                Ok(Arg::Keyed(key, self.parse_value(lex)?))
            }
            value => Ok(Arg::Positional(value)),
        }
    }

    fn parse_value(&self, lex: &mut Lex) -> Result<Value> {
        let pos = lex.to_position();
        match lex.peek() {
            Some('[') => {
                lex.expect('[')?;
                let mut items = vec![];
                if lex.peek() != Some(']') {
                    loop {
                        items.push(self.parse_value(lex)?);
                        match lex.peek() {
                            Some(',') => lex.expect(',')?,
                            _ => break,
                        }
                    }
                }
                lex.expect(']')?;
                Ok(Value::List(items))
            }
            Some(q) if q == '"' || q == '\'' => Ok(Value::Str(parse_string(lex, q)?)),
            Some(_) => {
                if let Some(num) = lex.token(&self.number) {
                    return parse_number(num);
                }
                match lex.token(&self.ident) {
                    Some(name) if lex.peek() == Some('(') => {
                        Ok(Value::Call(self.parse_args(name.to_string(), lex)?))
                    }
                    Some(name) => Ok(Value::Ident(name.to_string())),
                    None => err_at!(FailParse, msg: "unexpected token at {}", pos),
                }
            }
            None => err_at!(FailParse, msg: "unexpected end of query at {}", pos),
        }
    }
}

fn parse_number(num: &str) -> Result<Value> {
    match num.parse::<i64>() {
        Ok(val) => Ok(Value::Int(val)),
        Err(_) => Ok(Value::Float(err_at!(FailParse, num.parse::<f64>())?)),
    }
}

fn parse_string(lex: &mut Lex, quote: char) -> Result<String> {
    let pos = lex.to_position();
    lex.move_cursor(quote.len_utf8());

    let (mut s, mut escape) = (String::new(), false);
    let mut n = 0;
    for ch in lex.as_str().chars() {
        n += ch.len_utf8();
        match ch {
            ch if escape => {
                match ch {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    ch => s.push(ch),
                }
                escape = false;
            }
            '\\' => escape = true,
            ch if ch == quote => {
                lex.move_cursor(n);
                return Ok(s);
            }
            ch => s.push(ch),
        }
    }

    err_at!(FailParse, msg: "unterminated string at {}", pos)
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
