pub mod ast;
pub mod error;

use ast::{Expr, Stml};
use error::ParseError;
use lexer::token::{Token, TokenType};
use lexer::Lexer;
use std::rc::Rc;
use TokenType::*;

/// Recursive-descent statement parser over a precedence-climbing
/// expression parser. Consumes a flat token stream (from `lexer::Lexer`)
/// and produces the syntax tree in `ast`.
///
/// Recovery is coarse: the first parse error sets a permanent panic flag;
/// every subsequent error is discarded for the rest of the parse (the
/// parser still resynchronizes at statement boundaries so it can run to
/// completion, but `parse()` returns only the first diagnostic and never
/// hands back a partial tree).
pub struct Parser {
    tokens: Vec<Rc<Token>>,
    pos: usize,
    panic_mode: bool,
    errors: Vec<ParseError>,
}

const STATEMENT_BOUNDARIES: [TokenType; 7] =
    [Print, Local, If, While, Function, Return, End];

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            tokens: Lexer::new(source).lex(),
            pos: 0,
            panic_mode: false,
            errors: vec![],
        }
    }

    fn peek(&self) -> Rc<Token> {
        Rc::clone(&self.tokens[self.pos])
    }

    fn previous(&self) -> Rc<Token> {
        Rc::clone(&self.tokens[self.pos - 1])
    }

    fn at_end(&self) -> bool {
        self.peek().typ() == EOF
    }

    /// The sentinel EOF token, used by the compiler to attribute a
    /// chunk's synthesized trailing `RETURN` when a program (or an empty
    /// block) has no statement to blame it on.
    pub fn eof(&self) -> Rc<Token> {
        Rc::clone(&self.tokens[self.tokens.len() - 1])
    }

    fn check(&self, typ: TokenType) -> bool {
        self.peek().typ() == typ
    }

    fn advance(&mut self) -> Rc<Token> {
        if !self.at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn matches(&mut self, typ: TokenType) -> bool {
        if self.check(typ) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, typ: TokenType) -> Result<Rc<Token>, ()> {
        if self.check(typ) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            self.error(ParseError::ExpectedInstead(vec![typ], token));
            Err(())
        }
    }

    fn error(&mut self, err: ParseError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors.push(err);
    }

    fn synchronize(&mut self) {
        while !self.at_end() {
            if STATEMENT_BOUNDARIES.contains(&self.peek().typ()) {
                return;
            }
            self.advance();
        }
    }

    pub fn parse(&mut self) -> Result<Vec<Stml>, Vec<ParseError>> {
        if cfg!(feature = "verbose") {
            println!("[PARSER] started");
        }
        let mut stmts = vec![];
        while !self.at_end() {
            match self.statement() {
                Ok(stml) => stmts.push(stml),
                Err(()) => self.synchronize(),
            }
        }
        if self.errors.is_empty() {
            if cfg!(feature = "verbose") {
                println!("[PARSER] succeeded");
                println!("{stmts:#?}");
            }
            Ok(stmts)
        } else {
            if cfg!(feature = "verbose") {
                println!("[PARSER] failed");
            }
            Err(self.errors.clone())
        }
    }

    // ---- statements ----

    /// Parses statements until (but not consuming) a token in `terminators`
    /// or EOF, as used by `if`/`while`/`function` bodies.
    fn block(&mut self, terminators: &[TokenType]) -> Result<Vec<Stml>, ()> {
        let mut stmts = vec![];
        while !self.at_end() && !terminators.contains(&self.peek().typ()) {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stml, ()> {
        if self.matches(Print) {
            self.print_stml()
        } else if self.matches(Local) {
            self.local_decl()
        } else if self.matches(If) {
            self.if_stml()
        } else if self.matches(While) {
            self.while_stml()
        } else if self.matches(Function) {
            self.function_def()
        } else if self.matches(Return) {
            self.return_stml()
        } else {
            self.expr_or_assign_stml()
        }
    }

    fn print_stml(&mut self) -> Result<Stml, ()> {
        let token = self.previous();
        self.consume(OParen)?;
        let value = self.expression()?;
        self.consume(CParen)?;
        Ok(Stml::Print(token, value))
    }

    fn local_decl(&mut self) -> Result<Stml, ()> {
        let token = self.previous();
        self.consume(Identifier)?;
        let name = self.previous();
        let init = if self.matches(Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        let _ = token;
        Ok(Stml::LocalDecl(name, init))
    }

    fn if_stml(&mut self) -> Result<Stml, ()> {
        let token = self.previous();
        let cond = self.expression()?;
        self.consume(Then)?;
        let then_branch = self.block(&[Else, End])?;
        let else_branch = if self.matches(Else) {
            Some(self.block(&[End])?)
        } else {
            None
        };
        self.consume(End)?;
        Ok(Stml::If(token, cond, then_branch, else_branch))
    }

    fn while_stml(&mut self) -> Result<Stml, ()> {
        let token = self.previous();
        let cond = self.expression()?;
        self.consume(Do)?;
        let body = self.block(&[End])?;
        self.consume(End)?;
        Ok(Stml::While(token, cond, body))
    }

    fn function_def(&mut self) -> Result<Stml, ()> {
        let token = self.previous();
        self.consume(Identifier)?;
        let name = self.previous();
        self.consume(OParen)?;
        let mut params = vec![];
        if !self.check(CParen) {
            self.consume(Identifier)?;
            params.push(self.previous());
            while self.matches(Comma) {
                self.consume(Identifier)?;
                params.push(self.previous());
            }
        }
        self.consume(CParen)?;
        let body = self.block(&[End])?;
        self.consume(End)?;
        Ok(Stml::FunctionDef(name, params, body))
    }

    fn return_stml(&mut self) -> Result<Stml, ()> {
        let token = self.previous();
        let value = if self.at_end() || self.check(End) || self.check(Else) {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(Stml::Return(token, value))
    }

    fn expr_or_assign_stml(&mut self) -> Result<Stml, ()> {
        let expr = self.expression()?;
        if self.matches(Equal) {
            match expr {
                Expr::Identifier(name) => {
                    let value = self.expression()?;
                    Ok(Stml::Assign(name, value))
                }
                other => {
                    self.error(ParseError::InvalidAssignTarget(other.token()));
                    Err(())
                }
            }
        } else {
            Ok(Stml::ExpressionStatement(expr))
        }
    }

    // ---- expressions, lowest to highest precedence ----

    fn expression(&mut self) -> Result<Expr, ()> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ()> {
        let mut expr = self.and_expr()?;
        while self.check(Or) {
            let token = self.advance();
            let rhs = self.and_expr()?;
            expr = Expr::Logical(token, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<Expr, ()> {
        let mut expr = self.equality()?;
        while self.check(And) {
            let token = self.advance();
            let rhs = self.equality()?;
            expr = Expr::Logical(token, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ()> {
        let mut expr = self.comparison()?;
        while self.check(DEqual) || self.check(NotEqual) {
            let token = self.advance();
            let rhs = self.comparison()?;
            expr = Expr::Binary(token, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ()> {
        let mut expr = self.concat()?;
        while self.check(Greater)
            || self.check(GreaterEqual)
            || self.check(Less)
            || self.check(LessEqual)
        {
            let token = self.advance();
            let rhs = self.concat()?;
            expr = Expr::Binary(token, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    /// `..` is right-associative.
    fn concat(&mut self) -> Result<Expr, ()> {
        let expr = self.additive()?;
        if self.check(Concat) {
            let token = self.advance();
            let rhs = self.concat()?;
            Ok(Expr::Binary(token, Box::new(expr), Box::new(rhs)))
        } else {
            Ok(expr)
        }
    }

    fn additive(&mut self) -> Result<Expr, ()> {
        let mut expr = self.multiplicative()?;
        while self.check(Plus) || self.check(Minus) {
            let token = self.advance();
            let rhs = self.multiplicative()?;
            expr = Expr::Binary(token, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr, ()> {
        let mut expr = self.unary()?;
        while self.check(Star) || self.check(Slash) {
            let token = self.advance();
            let rhs = self.unary()?;
            expr = Expr::Binary(token, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ()> {
        if self.check(Not) || self.check(Minus) {
            let token = self.advance();
            let operand = self.unary()?;
            Ok(Expr::Unary(token, Box::new(operand)))
        } else {
            self.call()
        }
    }

    fn call(&mut self) -> Result<Expr, ()> {
        let expr = self.primary()?;
        if let Expr::Identifier(name) = &expr {
            if self.check(OParen) {
                self.advance();
                let args = self.arguments()?;
                return Ok(Expr::Call(Rc::clone(name), args));
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ()> {
        let mut args = vec![];
        if !self.check(CParen) {
            args.push(self.expression()?);
            while self.matches(Comma) {
                args.push(self.expression()?);
            }
        }
        self.consume(CParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ()> {
        let token = self.peek();
        match token.typ() {
            Number => {
                self.advance();
                Ok(Expr::Number(token))
            }
            String => {
                self.advance();
                Ok(Expr::String(token))
            }
            True => {
                self.advance();
                Ok(Expr::True(token))
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::False(token))
            }
            Nil => {
                self.advance();
                Ok(Expr::Nil(token))
            }
            Identifier => {
                self.advance();
                Ok(Expr::Identifier(token))
            }
            OParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(CParen)?;
                Ok(expr)
            }
            Unknown => {
                self.advance();
                self.error(ParseError::UnknownToken(token));
                Err(())
            }
            _ => {
                self.error(ParseError::ExpectedExpr(token));
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Vec<Stml> {
        Parser::new(src).parse().expect("expected a valid parse")
    }

    fn parse_err(src: &str) -> Vec<ParseError> {
        Parser::new(src)
            .parse()
            .expect_err("expected a parse error")
    }

    #[test]
    fn arithmetic_precedence() {
        let stmts = parse_ok("print(1 + 2 * 3)");
        match &stmts[0] {
            Stml::Print(_, Expr::Binary(op, lhs, rhs)) => {
                assert_eq!(op.typ(), Plus);
                assert!(matches!(**lhs, Expr::Number(_)));
                assert!(matches!(**rhs, Expr::Binary(..)));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn concat_is_right_associative() {
        let stmts = parse_ok(r#"print("a" .. "b" .. "c")"#);
        match &stmts[0] {
            Stml::Print(_, Expr::Binary(_, lhs, rhs)) => {
                assert!(matches!(**lhs, Expr::String(_)));
                assert!(matches!(**rhs, Expr::Binary(..)));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn assignment_only_targets_identifiers() {
        let errs = parse_err("1 = 2");
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], ParseError::InvalidAssignTarget(_)));
    }

    #[test]
    fn only_first_error_is_reported() {
        // two independent syntax mistakes; only the first is surfaced.
        let errs = parse_err("if 1 then end\nif 2 then");
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn function_def_and_call_round_trip_shape() {
        let stmts = parse_ok("function add(a, b) return a + b end");
        match &stmts[0] {
            Stml::FunctionDef(name, params, body) => {
                assert_eq!(name.lexeme(), "add");
                assert_eq!(params.len(), 2);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn if_else_parses_both_branches() {
        let stmts = parse_ok("if 1 < 2 then print(\"y\") else print(\"n\") end");
        match &stmts[0] {
            Stml::If(_, _, then_branch, Some(else_branch)) => {
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.len(), 1);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }
}
