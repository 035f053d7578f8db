//! Parser for the run-line shell language
//!
//! ```text
//! script   := pipeline (connector pipeline)* [';']
//! connector := ';' | '&&' | '||'
//! pipeline := command ('|' command)*
//! command  := (word | redirect word | dup-redirect)+
//! ```
//!
//! `&&` and `||` have equal precedence and associate to the left, so a
//! script is a flat list of pipelines each guarded by the connector in
//! front of it.

use std::fmt;

use super::lexer::{tokenize, RedirectOp, Token};
use crate::common::{shell_quote, Error, Result};

/// How a pipeline is joined to the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// First pipeline, or after `;`: always runs
    Always,
    /// After `&&`: runs if the previous status was success
    And,
    /// After `||`: runs if the previous status was failure
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub op: RedirectOp,
    pub target: Option<String>,
}

/// A command with its arguments and redirections
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleCommand {
    pub args: Vec<String>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
    pub stages: Vec<SimpleCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    pub items: Vec<(Connector, Pipeline)>,
}

impl fmt::Display for SimpleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.args.iter().map(|a| shell_quote(a)).collect();
        for r in &self.redirects {
            match &r.target {
                Some(target) => parts.push(format!("{} {}", r.op, shell_quote(target))),
                None => parts.push(r.op.to_string()),
            }
        }
        f.write_str(&parts.join(" "))
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<String> = self.stages.iter().map(|s| s.to_string()).collect();
        f.write_str(&stages.join(" | "))
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn command(&mut self) -> Result<SimpleCommand> {
        let mut command = SimpleCommand::default();
        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    if let Some(Token::Word(w)) = self.next() {
                        command.args.push(w);
                    }
                }
                Some(Token::Redirect(op)) => {
                    let op = *op;
                    self.pos += 1;
                    let target = if op.takes_target() {
                        match self.next() {
                            Some(Token::Word(w)) => Some(w),
                            _ => {
                                return Err(Error::ScriptParse(format!(
                                    "missing file name after '{}'",
                                    op
                                )))
                            }
                        }
                    } else {
                        None
                    };
                    command.redirects.push(Redirect { op, target });
                }
                _ => break,
            }
        }
        if command.args.is_empty() {
            return Err(Error::ScriptParse(match self.peek() {
                Some(token) => format!("expected a command before {:?}", token),
                None => "expected a command".to_string(),
            }));
        }
        Ok(command)
    }

    fn pipeline(&mut self) -> Result<Pipeline> {
        let mut pipeline = Pipeline {
            stages: vec![self.command()?],
        };
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            pipeline.stages.push(self.command()?);
        }
        Ok(pipeline)
    }

    fn script(&mut self) -> Result<Script> {
        let mut script = Script::default();
        let mut connector = Connector::Always;
        loop {
            script.items.push((connector, self.pipeline()?));
            connector = match self.next() {
                None => break,
                Some(Token::Semi) if self.peek().is_none() => break,
                Some(Token::Semi) => Connector::Always,
                Some(Token::AndIf) => Connector::And,
                Some(Token::OrIf) => Connector::Or,
                Some(token) => {
                    return Err(Error::ScriptParse(format!("unexpected {:?}", token)))
                }
            };
        }
        Ok(script)
    }
}

/// Parse a command line into a script
pub fn parse(input: &str) -> Result<Script> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(Error::ScriptParse("empty command".to_string()));
    }
    Parser { tokens, pos: 0 }.script()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline_with_redirects() {
        let script = parse("%cmc -emit-llvm -- a.cpp 2>&1 | FileCheck a.cpp").unwrap();
        assert_eq!(script.items.len(), 1);
        let (connector, pipeline) = &script.items[0];
        assert_eq!(*connector, Connector::Always);
        assert_eq!(pipeline.stages.len(), 2);
        assert_eq!(pipeline.stages[0].args, vec!["%cmc", "-emit-llvm", "--", "a.cpp"]);
        assert_eq!(
            pipeline.stages[0].redirects,
            vec![Redirect {
                op: RedirectOp::ErrToOut,
                target: None
            }]
        );
        assert_eq!(pipeline.stages[1].args, vec!["FileCheck", "a.cpp"]);
    }

    #[test]
    fn test_parse_connectors() {
        let script = parse("a && b || c ; d;").unwrap();
        let connectors: Vec<_> = script.items.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            connectors,
            vec![
                Connector::Always,
                Connector::And,
                Connector::Or,
                Connector::Always
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "| a", "a |", "a && ", "a > ", "a ;; b", "2>&1"] {
            assert!(matches!(parse(bad), Err(Error::ScriptParse(_))), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_display_round_trips_quoting() {
        let script = parse("echo 'a b' > 'out file' | cat").unwrap();
        assert_eq!(script.items[0].1.to_string(), "echo 'a b' > 'out file' | cat");
    }
}
