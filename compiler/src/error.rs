use colored::Colorize;
use lexer::token::Token;
use std::{fmt, rc::Rc};

/// Failures the generator can hit while emitting a chunk. All are
/// capacity overflows of the single-byte/double-byte operand encodings
/// in `chunk::Instruction` — nothing here depends on program semantics.
#[derive(Debug, Clone)]
pub enum CompileError {
    TooManyConstants(Rc<Token>),
    TooManyLocals(Rc<Token>),
    DuplicateLocal(Rc<Token>),
    JumpTooFar(Rc<Token>),
    TooManyArgs(Rc<Token>),
}

impl CompileError {
    pub fn token(&self) -> Rc<Token> {
        match self {
            Self::TooManyConstants(t)
            | Self::TooManyLocals(t)
            | Self::DuplicateLocal(t)
            | Self::JumpTooFar(t)
            | Self::TooManyArgs(t) => Rc::clone(t),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", "compile error: ".bright_red().bold())?;
        match self {
            Self::TooManyConstants(_) => {
                write!(f, "a function body cannot hold more than 256 constants")?;
            }
            Self::TooManyLocals(_) => {
                write!(f, "a function body cannot declare more than 256 locals")?;
            }
            Self::DuplicateLocal(token) => {
                write!(f, "'{}' is already declared in this function", token.lexeme())?;
            }
            Self::JumpTooFar(_) => {
                write!(f, "cannot jump over more than 65535 bytes of code")?;
            }
            Self::TooManyArgs(_) => {
                write!(f, "a call cannot pass more than 255 arguments")?;
            }
        }
        write!(f, "\n[line {}] in script", self.token().line())
    }
}

impl std::error::Error for CompileError {}
