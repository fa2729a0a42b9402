pub mod chunk;
pub mod error;

use chunk::value::{Function, Value};
use chunk::{Chunk, Instruction::*};
use error::CompileError;
use lexer::token::{Token, TokenType};
use parser::ast::{Expr, Stml};
use std::{cell::RefCell, rc::Rc};

/// Single-pass, depth-first code generator. Walks a parsed syntax tree and
/// emits instructions into a `Chunk`; a nested `FunctionDef` gets its own
/// fresh chunk, compiled the same way, and is folded back in as a
/// `Function` constant of the enclosing chunk.
pub struct Compiler {
    errors: RefCell<Vec<CompileError>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            errors: RefCell::new(vec![]),
        }
    }

    fn err(&self, err: CompileError) {
        self.errors.borrow_mut().push(err);
    }

    fn write_const(
        &self,
        chunk: &Chunk,
        instr: chunk::Instruction,
        token: &Rc<Token>,
        value: Value,
    ) -> Result<(), ()> {
        chunk
            .write_const(instr, Rc::clone(token), value)
            .map_err(|_| self.err(CompileError::TooManyConstants(Rc::clone(token))))
    }

    fn write_local(
        &self,
        chunk: &Chunk,
        instr: chunk::Instruction,
        token: &Rc<Token>,
        slot: usize,
    ) -> Result<(), ()> {
        chunk
            .write_local(instr, Rc::clone(token), slot)
            .map_err(|_| self.err(CompileError::TooManyLocals(Rc::clone(token))))
    }

    fn patch(&self, end: Box<dyn FnOnce() -> Result<(), ()> + '_>, token: &Rc<Token>) {
        if end().is_err() {
            self.err(CompileError::JumpTooFar(Rc::clone(token)));
        }
    }

    /// Compiles a whole program into its top-level chunk (arity 0). `eof`
    /// is used to attribute the synthesized trailing `NIL`+`RETURN` when
    /// the program has no statements at all.
    pub fn compile(&self, ast: &[Stml], eof: Rc<Token>) -> Result<Chunk, Vec<CompileError>> {
        if cfg!(feature = "verbose") {
            println!("[COMPILER] started");
        }
        let chunk = Chunk::new(0);
        self.stmts(&chunk, ast);
        let end_token = ast.last().map(|s| s.token()).unwrap_or(eof);
        self.finish(&chunk, &end_token);
        if self.errors.borrow().is_empty() {
            if cfg!(feature = "verbose") {
                println!("[COMPILER] succeeded");
                println!("{chunk:?}");
            }
            Ok(chunk)
        } else {
            if cfg!(feature = "verbose") {
                println!("[COMPILER] failed");
            }
            Err(self.errors.borrow().clone())
        }
    }

    fn finish(&self, chunk: &Chunk, token: &Rc<Token>) {
        chunk.write_instr(NIL, Rc::clone(token));
        chunk.write_instr(RETURN, Rc::clone(token));
    }

    fn stmts(&self, chunk: &Chunk, stmts: &[Stml]) {
        for stmt in stmts {
            self.stmt(chunk, stmt).ok();
        }
    }

    fn stmt(&self, chunk: &Chunk, stmt: &Stml) -> Result<(), ()> {
        match stmt {
            Stml::Print(token, expr) => {
                self.expr(chunk, expr)?;
                chunk.write_instr(PRINT, Rc::clone(token));
                Ok(())
            }
            Stml::Assign(name, expr) => {
                self.expr(chunk, expr)?;
                self.write_const(chunk, SET_GLOBAL, name, Value::from(name.lexeme().to_string()))?;
                chunk.write_instr(POP, Rc::clone(name));
                Ok(())
            }
            Stml::LocalDecl(name, init) => self.local_decl(chunk, name, init),
            Stml::If(token, cond, then_branch, else_branch) => {
                self.if_stmt(chunk, token, cond, then_branch, else_branch)
            }
            Stml::While(token, cond, body) => self.while_stmt(chunk, token, cond, body),
            Stml::ExpressionStatement(expr) => {
                self.expr(chunk, expr)?;
                chunk.write_instr(POP, expr.token());
                Ok(())
            }
            Stml::FunctionDef(name, params, body) => self.function_def(chunk, name, params, body),
            Stml::Return(token, value) => self.return_stmt(chunk, token, value),
        }
    }

    /// A fresh local's `SET_LOCAL` writes into the very slot the pushed
    /// value already occupies at the top of the stack, so no trailing POP
    /// is needed — the pushed value simply becomes that slot.
    fn local_decl(&self, chunk: &Chunk, name: &Rc<Token>, init: &Option<Expr>) -> Result<(), ()> {
        match init {
            Some(expr) => self.expr(chunk, expr)?,
            None => chunk.write_instr(NIL, Rc::clone(name)),
        }
        if chunk.resolve_local(name.lexeme()).is_some() {
            self.err(CompileError::DuplicateLocal(Rc::clone(name)));
            return Err(());
        }
        let slot = chunk
            .declare_local(name.lexeme().to_string())
            .map_err(|_| self.err(CompileError::TooManyLocals(Rc::clone(name))))?;
        self.write_local(chunk, SET_LOCAL, name, slot)
    }

    fn if_stmt(
        &self,
        chunk: &Chunk,
        token: &Rc<Token>,
        cond: &Expr,
        then_branch: &[Stml],
        else_branch: &Option<Vec<Stml>>,
    ) -> Result<(), ()> {
        self.expr(chunk, cond)?;
        let else_jump = chunk.write_jump(JUMP_IF_FALSE, Rc::clone(token));
        chunk.write_instr(POP, Rc::clone(token));
        self.stmts(chunk, then_branch);
        let exit_jump = chunk.write_jump(JUMP, Rc::clone(token));
        self.patch(else_jump, token);
        chunk.write_instr(POP, Rc::clone(token));
        if let Some(else_branch) = else_branch {
            self.stmts(chunk, else_branch);
        }
        self.patch(exit_jump, token);
        Ok(())
    }

    fn while_stmt(
        &self,
        chunk: &Chunk,
        token: &Rc<Token>,
        cond: &Expr,
        body: &[Stml],
    ) -> Result<(), ()> {
        let loop_start = chunk.len();
        self.expr(chunk, cond)?;
        let exit_jump = chunk.write_jump(JUMP_IF_FALSE, Rc::clone(token));
        chunk.write_instr(POP, Rc::clone(token));
        self.stmts(chunk, body);
        if chunk.write_loop(Rc::clone(token), loop_start).is_err() {
            self.err(CompileError::JumpTooFar(Rc::clone(token)));
        }
        self.patch(exit_jump, token);
        chunk.write_instr(POP, Rc::clone(token));
        Ok(())
    }

    fn function_def(
        &self,
        chunk: &Chunk,
        name: &Rc<Token>,
        params: &[Rc<Token>],
        body: &[Stml],
    ) -> Result<(), ()> {
        let fn_chunk = Chunk::new(params.len());
        for param in params {
            if fn_chunk.resolve_local(param.lexeme()).is_some() {
                self.err(CompileError::DuplicateLocal(Rc::clone(param)));
                continue;
            }
            if fn_chunk.declare_local(param.lexeme().to_string()).is_err() {
                self.err(CompileError::TooManyLocals(Rc::clone(param)));
            }
        }

        self.stmts(&fn_chunk, body);

        let end_token = body.last().map(|s| s.token()).unwrap_or_else(|| Rc::clone(name));
        self.finish(&fn_chunk, &end_token);

        let function = Function::new(name.lexeme().to_string(), fn_chunk);
        self.write_const(chunk, CONSTANT, name, Value::from(function))?;
        self.write_const(chunk, SET_GLOBAL, name, Value::from(name.lexeme().to_string()))?;
        chunk.write_instr(POP, Rc::clone(name));
        Ok(())
    }

    fn return_stmt(&self, chunk: &Chunk, token: &Rc<Token>, value: &Option<Expr>) -> Result<(), ()> {
        match value {
            Some(expr) => self.expr(chunk, expr)?,
            None => chunk.write_instr(NIL, Rc::clone(token)),
        }
        chunk.write_instr(RETURN, Rc::clone(token));
        Ok(())
    }

    fn expr(&self, chunk: &Chunk, expr: &Expr) -> Result<(), ()> {
        match expr {
            Expr::Number(token) => {
                let n: f64 = token
                    .lexeme()
                    .parse()
                    .expect("lexer only produces well-formed number lexemes");
                self.write_const(chunk, CONSTANT, token, Value::Number(n))
            }
            Expr::String(token) => {
                self.write_const(chunk, CONSTANT, token, Value::from(token.lexeme().to_string()))
            }
            Expr::True(token) => {
                chunk.write_instr(TRUE, Rc::clone(token));
                Ok(())
            }
            Expr::False(token) => {
                chunk.write_instr(FALSE, Rc::clone(token));
                Ok(())
            }
            Expr::Nil(token) => {
                chunk.write_instr(NIL, Rc::clone(token));
                Ok(())
            }
            Expr::Identifier(token) => self.get(chunk, token),
            Expr::Unary(op, operand) => self.unary(chunk, op, operand),
            Expr::Binary(op, lhs, rhs) => self.binary(chunk, op, lhs, rhs),
            Expr::Logical(op, lhs, rhs) => self.logical(chunk, op, lhs, rhs),
            Expr::Call(name, args) => self.call(chunk, name, args),
        }
    }

    /// A miss in the current function's own locals falls back to a
    /// global lookup; there are no upvalues to climb through enclosing
    /// functions.
    fn get(&self, chunk: &Chunk, token: &Rc<Token>) -> Result<(), ()> {
        if let Some(slot) = chunk.resolve_local(token.lexeme()) {
            self.write_local(chunk, GET_LOCAL, token, slot)
        } else {
            self.write_const(chunk, GET_GLOBAL, token, Value::from(token.lexeme().to_string()))
        }
    }

    fn unary(&self, chunk: &Chunk, op: &Rc<Token>, operand: &Expr) -> Result<(), ()> {
        self.expr(chunk, operand)?;
        match op.typ() {
            TokenType::Minus => chunk.write_instr(NEGATE, Rc::clone(op)),
            TokenType::Not => chunk.write_instr(NOT, Rc::clone(op)),
            _ => unreachable!(),
        }
        Ok(())
    }

    fn binary(&self, chunk: &Chunk, op: &Rc<Token>, lhs: &Expr, rhs: &Expr) -> Result<(), ()> {
        self.expr(chunk, lhs)?;
        self.expr(chunk, rhs)?;
        let instr = match op.typ() {
            TokenType::Plus => ADD,
            TokenType::Minus => SUB,
            TokenType::Star => MUL,
            TokenType::Slash => DIV,
            TokenType::Concat => CONCAT,
            TokenType::Greater => GREATER,
            TokenType::GreaterEqual => GREATER_EQUAL,
            TokenType::Less => LESS,
            TokenType::LessEqual => LESS_EQUAL,
            TokenType::DEqual => EQUAL,
            TokenType::NotEqual => NOT_EQUAL,
            _ => unreachable!(),
        };
        chunk.write_instr(instr, Rc::clone(op));
        Ok(())
    }

    /// `A and B`: emit A; jump past B (popping the condition first) if A
    /// is falsey. `A or B`: emit A; jump to B (again popping first) if A
    /// is truthy, else fall through past the short-circuit.
    fn logical(&self, chunk: &Chunk, op: &Rc<Token>, lhs: &Expr, rhs: &Expr) -> Result<(), ()> {
        self.expr(chunk, lhs)?;
        match op.typ() {
            TokenType::And => {
                let end = chunk.write_jump(JUMP_IF_FALSE, Rc::clone(op));
                chunk.write_instr(POP, Rc::clone(op));
                self.expr(chunk, rhs)?;
                self.patch(end, op);
            }
            TokenType::Or => {
                let else_jump = chunk.write_jump(JUMP_IF_FALSE, Rc::clone(op));
                let end = chunk.write_jump(JUMP, Rc::clone(op));
                self.patch(else_jump, op);
                chunk.write_instr(POP, Rc::clone(op));
                self.expr(chunk, rhs)?;
                self.patch(end, op);
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Functions are only ever reachable as globals (`FunctionDef` always
    /// binds through `SET_GLOBAL`), so a call's callee is always fetched
    /// with `GET_GLOBAL`.
    fn call(&self, chunk: &Chunk, name: &Rc<Token>, args: &[Expr]) -> Result<(), ()> {
        self.write_const(chunk, GET_GLOBAL, name, Value::from(name.lexeme().to_string()))?;
        for arg in args {
            self.expr(chunk, arg)?;
        }
        chunk
            .write_call(Rc::clone(name), args.len())
            .map_err(|_| self.err(CompileError::TooManyArgs(Rc::clone(name))))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk::Instruction;
    use parser::Parser;

    fn compile_ok(src: &str) -> Chunk {
        let mut parser = Parser::new(src);
        let ast = parser.parse().expect("expected a valid parse");
        let eof = Rc::new(Token::new(TokenType::EOF, String::new(), 1));
        Compiler::new().compile(&ast, eof).expect("expected a valid compile")
    }

    fn compile_err(src: &str) -> Vec<CompileError> {
        let mut parser = Parser::new(src);
        let ast = parser.parse().expect("expected a valid parse");
        let eof = Rc::new(Token::new(TokenType::EOF, String::new(), 1));
        Compiler::new()
            .compile(&ast, eof)
            .expect_err("expected a compile error")
    }

    fn opcodes(chunk: &Chunk) -> Vec<Instruction> {
        let mut ip = 0;
        let mut out = vec![];
        while ip < chunk.len() {
            let instr: Instruction = chunk.byte(ip).into();
            ip += match instr {
                Instruction::GET_LOCAL
                | Instruction::SET_LOCAL
                | Instruction::CALL
                | Instruction::CONSTANT
                | Instruction::GET_GLOBAL
                | Instruction::SET_GLOBAL => 2,
                Instruction::JUMP | Instruction::JUMP_IF_FALSE => 3,
                _ => 1,
            };
            out.push(instr);
        }
        out
    }

    #[test]
    fn print_emits_constant_then_print() {
        let chunk = compile_ok("print(1)");
        assert_eq!(
            opcodes(&chunk),
            vec![Instruction::CONSTANT, Instruction::PRINT, Instruction::NIL, Instruction::RETURN]
        );
    }

    #[test]
    fn local_decl_does_not_emit_a_trailing_pop() {
        let chunk = compile_ok("local x = 1");
        assert_eq!(
            opcodes(&chunk),
            vec![Instruction::CONSTANT, Instruction::SET_LOCAL, Instruction::NIL, Instruction::RETURN]
        );
    }

    #[test]
    fn assign_targets_a_global_and_pops() {
        let chunk = compile_ok("x = 1");
        assert_eq!(
            opcodes(&chunk),
            vec![
                Instruction::CONSTANT,
                Instruction::SET_GLOBAL,
                Instruction::POP,
                Instruction::NIL,
                Instruction::RETURN
            ]
        );
    }

    #[test]
    fn duplicate_local_is_a_compile_error() {
        let errs = compile_err("function f(a, a) return a end");
        assert!(matches!(errs[0], CompileError::DuplicateLocal(_)));
    }

    #[test]
    fn return_at_top_level_compiles() {
        let chunk = compile_ok("local x = 10 return x");
        assert_eq!(
            opcodes(&chunk),
            vec![
                Instruction::CONSTANT,
                Instruction::SET_LOCAL,
                Instruction::GET_LOCAL,
                Instruction::RETURN,
                Instruction::NIL,
                Instruction::RETURN
            ]
        );
    }

    #[test]
    fn if_without_else_still_pops_condition_on_both_branches() {
        let chunk = compile_ok("if 1 < 2 then print(1) end");
        let ops = opcodes(&chunk);
        assert_eq!(ops.iter().filter(|i| **i == Instruction::POP).count(), 2);
    }
}
