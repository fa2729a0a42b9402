use lexer::token::Token;
use std::rc::Rc;

/// Expression nodes. Every variant carries the token that introduces it
/// (operator, literal, or identifier) so the code generator can attribute
/// emitted instructions to a source line.
#[derive(Debug, Clone)]
pub enum Expr {
    Number(Rc<Token>),
    String(Rc<Token>),
    True(Rc<Token>),
    False(Rc<Token>),
    Nil(Rc<Token>),
    Identifier(Rc<Token>),
    Unary(Rc<Token>, Box<Expr>),
    Binary(Rc<Token>, Box<Expr>, Box<Expr>),
    Logical(Rc<Token>, Box<Expr>, Box<Expr>),
    /// Named callee plus the (already-parsed) argument list.
    Call(Rc<Token>, Vec<Expr>),
}

impl Expr {
    pub fn token(&self) -> Rc<Token> {
        match self {
            Self::Number(t)
            | Self::String(t)
            | Self::True(t)
            | Self::False(t)
            | Self::Nil(t)
            | Self::Identifier(t)
            | Self::Unary(t, ..)
            | Self::Binary(t, ..)
            | Self::Logical(t, ..)
            | Self::Call(t, ..) => Rc::clone(t),
        }
    }
}

/// Statement nodes. A `Vec<Stml>` stands in for the source spec's
/// linked-list-via-`next` `Statements` node — the generator walks it the
/// same way, in declaration order.
#[derive(Debug, Clone)]
pub enum Stml {
    Print(Rc<Token>, Expr),
    Assign(Rc<Token>, Expr),
    LocalDecl(Rc<Token>, Option<Expr>),
    If(Rc<Token>, Expr, Vec<Stml>, Option<Vec<Stml>>),
    While(Rc<Token>, Expr, Vec<Stml>),
    ExpressionStatement(Expr),
    FunctionDef(Rc<Token>, Vec<Rc<Token>>, Vec<Stml>),
    Return(Rc<Token>, Option<Expr>),
}

impl Stml {
    pub fn token(&self) -> Rc<Token> {
        match self {
            Self::Print(t, ..)
            | Self::Assign(t, ..)
            | Self::LocalDecl(t, ..)
            | Self::If(t, ..)
            | Self::While(t, ..)
            | Self::FunctionDef(t, ..)
            | Self::Return(t, ..) => Rc::clone(t),
            Self::ExpressionStatement(e) => e.token(),
        }
    }
}
