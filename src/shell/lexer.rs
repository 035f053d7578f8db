//! Tokenizer for the run-line shell language
//!
//! Supports single and double quotes, backslash escapes, `|`, `&&`, `||`,
//! `;` and the redirections `<`, `>`, `>>`, `2>`, `2>>`, `2>&1`, `1>&2`,
//! `>&2` and `&>`. Background jobs, subshells and command substitution
//! are rejected.

use std::fmt;

use crate::common::{Error, Result};

/// Redirection operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// `< file`
    In,
    /// `> file`, `1> file`
    Out,
    /// `>> file`, `1>> file`
    Append,
    /// `2> file`
    Err,
    /// `2>> file`
    ErrAppend,
    /// `2>&1`
    ErrToOut,
    /// `1>&2`, `>&2`
    OutToErr,
    /// `&> file`
    Both,
}

impl RedirectOp {
    /// Whether the operator is followed by a file name
    pub fn takes_target(self) -> bool {
        !matches!(self, RedirectOp::ErrToOut | RedirectOp::OutToErr)
    }
}

impl fmt::Display for RedirectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RedirectOp::In => "<",
            RedirectOp::Out => ">",
            RedirectOp::Append => ">>",
            RedirectOp::Err => "2>",
            RedirectOp::ErrAppend => "2>>",
            RedirectOp::ErrToOut => "2>&1",
            RedirectOp::OutToErr => "1>&2",
            RedirectOp::Both => "&>",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Pipe,
    AndIf,
    OrIf,
    Semi,
    Redirect(RedirectOp),
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    word: String,
    in_word: bool,
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn finish_word(&mut self) {
        if self.in_word {
            self.tokens.push(Token::Word(std::mem::take(&mut self.word)));
            self.in_word = false;
        }
    }

    fn push_op(&mut self, token: Token, len: usize) {
        self.finish_word();
        self.tokens.push(token);
        self.pos += len;
    }

    fn single_quoted(&mut self) -> Result<()> {
        self.pos += 1;
        self.in_word = true;
        loop {
            match self.peek(0) {
                Some('\'') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(c) => {
                    self.word.push(c);
                    self.pos += 1;
                }
                None => return Err(Error::ScriptParse("unterminated single quote".to_string())),
            }
        }
    }

    fn double_quoted(&mut self) -> Result<()> {
        self.pos += 1;
        self.in_word = true;
        loop {
            match self.peek(0) {
                Some('"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some('\\') => match self.peek(1) {
                    Some(c @ ('"' | '\\' | '$' | '`')) => {
                        self.word.push(c);
                        self.pos += 2;
                    }
                    _ => {
                        self.word.push('\\');
                        self.pos += 1;
                    }
                },
                Some(c) => {
                    self.word.push(c);
                    self.pos += 1;
                }
                None => return Err(Error::ScriptParse("unterminated double quote".to_string())),
            }
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while let Some(c) = self.peek(0) {
            match c {
                c if c.is_whitespace() => {
                    self.finish_word();
                    self.pos += 1;
                }
                '\'' => self.single_quoted()?,
                '"' => self.double_quoted()?,
                '\\' => {
                    self.in_word = true;
                    match self.peek(1) {
                        Some(next) => {
                            self.word.push(next);
                            self.pos += 2;
                        }
                        None => {
                            self.word.push('\\');
                            self.pos += 1;
                        }
                    }
                }
                '|' if self.peek(1) == Some('|') => self.push_op(Token::OrIf, 2),
                '|' => self.push_op(Token::Pipe, 1),
                '&' if self.peek(1) == Some('&') => self.push_op(Token::AndIf, 2),
                '&' if self.peek(1) == Some('>') => {
                    self.push_op(Token::Redirect(RedirectOp::Both), 2)
                }
                '&' => {
                    return Err(Error::ScriptParse(
                        "background jobs ('&') are not supported".to_string(),
                    ))
                }
                ';' => self.push_op(Token::Semi, 1),
                '<' => self.push_op(Token::Redirect(RedirectOp::In), 1),
                '>' if self.peek(1) == Some('>') => {
                    self.push_op(Token::Redirect(RedirectOp::Append), 2)
                }
                '>' if self.peek(1) == Some('&') && self.peek(2) == Some('2') => {
                    self.push_op(Token::Redirect(RedirectOp::OutToErr), 3)
                }
                '>' => self.push_op(Token::Redirect(RedirectOp::Out), 1),
                '1' | '2' if !self.in_word && self.peek(1) == Some('>') => {
                    let op = match (c, self.peek(2), self.peek(3)) {
                        ('2', Some('&'), Some('1')) => (RedirectOp::ErrToOut, 4),
                        ('1', Some('&'), Some('2')) => (RedirectOp::OutToErr, 4),
                        ('2', Some('>'), _) => (RedirectOp::ErrAppend, 3),
                        ('1', Some('>'), _) => (RedirectOp::Append, 3),
                        ('2', _, _) => (RedirectOp::Err, 2),
                        _ => (RedirectOp::Out, 2),
                    };
                    self.push_op(Token::Redirect(op.0), op.1);
                }
                '(' | ')' | '`' => {
                    return Err(Error::ScriptParse(format!(
                        "'{}' (subshells and command substitution) is not supported",
                        c
                    )))
                }
                '$' if self.peek(1) == Some('(') => {
                    return Err(Error::ScriptParse(
                        "command substitution '$(' is not supported".to_string(),
                    ))
                }
                c => {
                    self.in_word = true;
                    self.word.push(c);
                    self.pos += 1;
                }
            }
        }
        self.finish_word();
        Ok(self.tokens)
    }
}

/// Split a command line into tokens
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer {
        chars: input.chars().collect(),
        pos: 0,
        tokens: Vec::new(),
        word: String::new(),
        in_word: false,
    }
    .run()
}
