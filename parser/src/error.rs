use colored::Colorize;
use lexer::token::{Token, TokenType};
use std::{fmt, rc::Rc};

#[derive(Debug, Clone)]
pub enum ParseError {
    UnknownToken(Rc<Token>),
    ExpectedInstead(Vec<TokenType>, Rc<Token>),
    ExpectedExpr(Rc<Token>),
    InvalidAssignTarget(Rc<Token>),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", "compile error: ".bright_red().bold())?;
        match self {
            Self::UnknownToken(token) => {
                write!(f, "unknown token '{}'", token.lexeme())?;
            }
            Self::ExpectedInstead(expected, token) => {
                let wanted = expected
                    .iter()
                    .map(|typ| format!("'{typ}'"))
                    .collect::<Vec<_>>()
                    .join(" or ");
                write!(f, "expected {wanted} but got '{}'", token.typ())?;
            }
            Self::ExpectedExpr(token) => {
                write!(f, "expected an expression but got '{}'", token.typ())?;
            }
            Self::InvalidAssignTarget(token) => {
                write!(f, "invalid assignment target '{}'", token.lexeme())?;
            }
        }
        write!(f, "\n[line {}] in script", self.token().line())
    }
}

impl ParseError {
    pub fn token(&self) -> Rc<Token> {
        match self {
            Self::UnknownToken(t)
            | Self::ExpectedInstead(_, t)
            | Self::ExpectedExpr(t)
            | Self::InvalidAssignTarget(t) => Rc::clone(t),
        }
    }
}

impl std::error::Error for ParseError {}
