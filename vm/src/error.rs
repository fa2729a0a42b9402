use colored::Colorize;
use lexer::token::Token;
use std::{fmt, rc::Rc};

/// Failures raised while dispatching opcodes. Each carries the token at
/// the faulting instruction, used for the `[line N] in script` trailer.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    TypeNumber(Rc<Token>),
    TypeNumberOperands(Rc<Token>),
    TypeString(Rc<Token>),
    UndefinedGlobal(String, Rc<Token>),
    NotCallable(Rc<Token>),
    ArityMismatch(usize, usize, Rc<Token>),
    StackOverflow(Rc<Token>),
    ValueStackOverflow(Rc<Token>),
}

impl RuntimeError {
    pub fn token(&self) -> Rc<Token> {
        match self {
            Self::TypeNumber(t)
            | Self::TypeNumberOperands(t)
            | Self::TypeString(t)
            | Self::UndefinedGlobal(_, t)
            | Self::NotCallable(t)
            | Self::ArityMismatch(_, _, t)
            | Self::StackOverflow(t)
            | Self::ValueStackOverflow(t) => Rc::clone(t),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", "runtime error: ".bright_red().bold())?;
        match self {
            Self::TypeNumber(_) => write!(f, "Operand must be a number.")?,
            Self::TypeNumberOperands(_) => write!(f, "Operands must be numbers.")?,
            Self::TypeString(_) => write!(f, "Operands must be strings.")?,
            Self::UndefinedGlobal(name, _) => write!(f, "Undefined variable '{name}'.")?,
            Self::NotCallable(_) => write!(f, "Can only call functions.")?,
            Self::ArityMismatch(expected, got, _) => {
                write!(f, "Expected {expected} arguments but got {got}.")?
            }
            Self::StackOverflow(_) => write!(f, "Stack overflow.")?,
            Self::ValueStackOverflow(_) => write!(f, "Stack overflow.")?,
        }
        write!(f, "\n[line {}] in script", self.token().line())
    }
}

impl std::error::Error for RuntimeError {}
