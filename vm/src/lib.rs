pub mod error;

use compiler::chunk::value::{Function, Value};
use compiler::chunk::{Chunk, Instruction};
use error::RuntimeError;
use lexer::token::Token;
use std::{cmp::Ordering, rc::Rc};
use table::Table;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

enum FrameSource {
    Script(Rc<Chunk>),
    Function(Rc<Function>),
}

impl FrameSource {
    fn chunk(&self) -> &Chunk {
        match self {
            Self::Script(chunk) => chunk,
            Self::Function(function) => function.chunk(),
        }
    }
}

/// A stack VM: one value stack shared by every call frame, a globals
/// table, and whatever `Frame`s are live on the Rust call stack at a
/// given moment (call depth is tracked explicitly and capped at
/// `FRAMES_MAX` rather than relying on the host stack to overflow first).
pub struct Vm {
    stack: Vec<Value>,
    globals: Table<Value>,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(STACK_MAX.min(1024)),
            globals: Table::new(),
        }
    }

    /// Runs `chunk` as the top-level script. Returns once the outermost
    /// frame's synthesized `RETURN` fires.
    pub fn run(&mut self, chunk: Chunk) -> Result<(), RuntimeError> {
        let source = FrameSource::Script(Rc::new(chunk));
        Frame::new(self, source, 0, 0).run()?;
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

struct Frame<'a> {
    vm: &'a mut Vm,
    source: FrameSource,
    ip: usize,
    base: usize,
    depth: usize,
}

impl<'a> Frame<'a> {
    fn new(vm: &'a mut Vm, source: FrameSource, base: usize, depth: usize) -> Self {
        Self {
            vm,
            source,
            ip: 0,
            base,
            depth,
        }
    }

    fn chunk(&self) -> &Chunk {
        self.source.chunk()
    }

    fn token(&self) -> Rc<Token> {
        self.chunk().token(self.ip)
    }

    fn byte(&self, offset: usize) -> u8 {
        self.chunk().byte(self.ip + offset)
    }

    /// Reads a jump instruction's signed 16-bit offset and resolves it to
    /// an absolute `ip`, per the `ip_at_opcode + 3 + offset` convention
    /// the code generator's patch sites use (see `Chunk::write_jump`).
    fn jump_target(&self) -> usize {
        let bits = ((self.byte(1) as u16) << 8) | self.byte(2) as u16;
        (self.ip as isize + 3 + bits as i16 as isize) as usize
    }

    fn push(&mut self, value: Value) {
        self.vm.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.vm.stack.pop().expect("value stack underflow")
    }

    fn peek(&self) -> &Value {
        self.vm.stack.last().expect("value stack underflow")
    }

    fn slot(&self, idx: usize) -> Value {
        self.vm.stack[self.base + idx].clone()
    }

    fn set_slot(&mut self, idx: usize, value: Value) {
        self.vm.stack[self.base + idx] = value;
    }

    fn global_name(&self, idx: usize) -> String {
        match self.chunk().constant(idx) {
            Value::String(name) => name,
            _ => unreachable!("GET_GLOBAL/SET_GLOBAL operand is always a string constant"),
        }
    }

    /// Dispatches opcodes until this frame's chunk executes `RETURN`,
    /// returning the popped return value.
    fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let instr: Instruction = self.byte(0).into();

            if cfg!(feature = "verbose") {
                println!("{} => {:?} {:?}", self.ip, instr, self.vm.stack);
            }

            macro_rules! numeric_binop {
                ($op:tt) => {{
                    let b = self.pop();
                    let a = self.pop();
                    match (&a, &b) {
                        (Value::Number(_), Value::Number(_)) => self.push(a $op b),
                        _ => return Err(RuntimeError::TypeNumberOperands(self.token())),
                    }
                }};
            }

            macro_rules! numeric_cmp {
                ($($ordering:expr),+) => {{
                    let b = self.pop();
                    let a = self.pop();
                    match (&a, &b) {
                        (Value::Number(na), Value::Number(nb)) => {
                            let ordering = na.partial_cmp(nb).unwrap_or(Ordering::Greater);
                            self.push(Value::from($(ordering == $ordering)||+));
                        }
                        _ => return Err(RuntimeError::TypeNumberOperands(self.token())),
                    }
                }};
            }

            match instr {
                Instruction::CONSTANT => {
                    let value = self.chunk().constant(self.byte(1) as usize);
                    self.push(value);
                    self.ip += 2;
                }
                Instruction::TRUE => {
                    self.push(Value::True);
                    self.ip += 1;
                }
                Instruction::FALSE => {
                    self.push(Value::False);
                    self.ip += 1;
                }
                Instruction::NIL => {
                    self.push(Value::Nil);
                    self.ip += 1;
                }
                Instruction::POP => {
                    self.pop();
                    self.ip += 1;
                }
                Instruction::GET_GLOBAL => {
                    let name = self.global_name(self.byte(1) as usize);
                    match self.vm.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value);
                        }
                        None => return Err(RuntimeError::UndefinedGlobal(name, self.token())),
                    }
                    self.ip += 2;
                }
                Instruction::SET_GLOBAL => {
                    let name = self.global_name(self.byte(1) as usize);
                    let value = self.peek().clone();
                    self.vm.globals.set(&name, value);
                    self.ip += 2;
                }
                Instruction::GET_LOCAL => {
                    let value = self.slot(self.byte(1) as usize);
                    self.push(value);
                    self.ip += 2;
                }
                Instruction::SET_LOCAL => {
                    let slot = self.byte(1) as usize;
                    let value = self.peek().clone();
                    self.set_slot(slot, value);
                    self.ip += 2;
                }
                Instruction::ADD => {
                    numeric_binop!(+);
                    self.ip += 1;
                }
                Instruction::SUB => {
                    numeric_binop!(-);
                    self.ip += 1;
                }
                Instruction::MUL => {
                    numeric_binop!(*);
                    self.ip += 1;
                }
                Instruction::DIV => {
                    numeric_binop!(/);
                    self.ip += 1;
                }
                Instruction::NEGATE => {
                    let a = self.pop();
                    match &a {
                        Value::Number(_) => self.push(-a),
                        _ => return Err(RuntimeError::TypeNumber(self.token())),
                    }
                    self.ip += 1;
                }
                Instruction::NOT => {
                    let a = self.pop();
                    self.push(!a);
                    self.ip += 1;
                }
                Instruction::CONCAT => {
                    let b = self.pop();
                    let a = self.pop();
                    match (a, b) {
                        (Value::String(a), Value::String(b)) => {
                            self.push(Value::String(a + &b))
                        }
                        _ => return Err(RuntimeError::TypeString(self.token())),
                    }
                    self.ip += 1;
                }
                Instruction::GREATER => {
                    numeric_cmp!(Ordering::Greater);
                    self.ip += 1;
                }
                Instruction::GREATER_EQUAL => {
                    numeric_cmp!(Ordering::Greater, Ordering::Equal);
                    self.ip += 1;
                }
                Instruction::LESS => {
                    numeric_cmp!(Ordering::Less);
                    self.ip += 1;
                }
                Instruction::LESS_EQUAL => {
                    numeric_cmp!(Ordering::Less, Ordering::Equal);
                    self.ip += 1;
                }
                Instruction::EQUAL => {
                    numeric_cmp!(Ordering::Equal);
                    self.ip += 1;
                }
                Instruction::NOT_EQUAL => {
                    let b = self.pop();
                    let a = self.pop();
                    match (&a, &b) {
                        (Value::Number(na), Value::Number(nb)) => {
                            self.push(Value::from(na != nb))
                        }
                        _ => return Err(RuntimeError::TypeNumberOperands(self.token())),
                    }
                    self.ip += 1;
                }
                Instruction::JUMP => {
                    self.ip = self.jump_target();
                }
                Instruction::JUMP_IF_FALSE => {
                    if !self.peek().truthy() {
                        self.ip = self.jump_target();
                    } else {
                        self.ip += 3;
                    }
                }
                Instruction::CALL => {
                    let argc = self.byte(1) as usize;
                    self.ip += 2;

                    let callee_idx = self.vm.stack.len() - argc - 1;
                    let callee = self.vm.stack[callee_idx].clone();
                    let function = match callee {
                        Value::Function(function) => function,
                        _ => return Err(RuntimeError::NotCallable(self.token())),
                    };
                    if argc != function.arity() {
                        return Err(RuntimeError::ArityMismatch(
                            function.arity(),
                            argc,
                            self.token(),
                        ));
                    }
                    if self.depth + 1 >= FRAMES_MAX {
                        return Err(RuntimeError::StackOverflow(self.token()));
                    }
                    if self.vm.stack.len() >= STACK_MAX {
                        return Err(RuntimeError::ValueStackOverflow(self.token()));
                    }

                    let base = self.vm.stack.len() - argc;
                    let returned = Frame::new(
                        self.vm,
                        FrameSource::Function(function),
                        base,
                        self.depth + 1,
                    )
                    .run()?;
                    self.vm.stack.truncate(base - 1);
                    self.push(returned);
                }
                Instruction::RETURN => {
                    return Ok(self.pop());
                }
                Instruction::PRINT => {
                    let value = self.pop();
                    println!("{value}");
                    self.ip += 1;
                }
                Instruction::UNKNOWN => unreachable!("UNKNOWN opcode reached at runtime"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::Compiler;
    use parser::Parser;

    fn run_ok(src: &str) {
        let mut parser = Parser::new(src);
        let ast = parser.parse().expect("expected a valid parse");
        let chunk = Compiler::new()
            .compile(&ast, parser.eof())
            .expect("expected a valid compile");
        Vm::new().run(chunk).expect("expected successful execution");
    }

    fn run_err(src: &str) -> RuntimeError {
        let mut parser = Parser::new(src);
        let ast = parser.parse().expect("expected a valid parse");
        let chunk = Compiler::new()
            .compile(&ast, parser.eof())
            .expect("expected a valid compile");
        Vm::new().run(chunk).expect_err("expected a runtime error")
    }

    #[test]
    fn arithmetic_and_print_run_cleanly() {
        run_ok("print(1 + 2 * 3)");
    }

    #[test]
    fn local_decl_and_read_round_trip() {
        run_ok("local x = 10 return x");
    }

    #[test]
    fn function_call_adds_arguments() {
        run_ok("function add(a, b) return a + b end print(add(2, 3))");
    }

    #[test]
    fn while_loop_counts_to_three() {
        run_ok("x = 0 while x < 3 do x = x + 1 end print(x)");
    }

    #[test]
    fn if_else_picks_the_true_branch() {
        run_ok(r#"if 1 < 2 then print("y") else print("n") end"#);
    }

    #[test]
    fn concat_joins_strings() {
        run_ok(r#"print("a" .. "b")"#);
    }

    #[test]
    fn adding_a_number_and_a_string_is_a_type_error() {
        let err = run_err(r#"print(1 + "a")"#);
        assert!(matches!(err, RuntimeError::TypeNumberOperands(_)));
    }

    #[test]
    fn short_circuit_and_skips_the_right_operand() {
        run_ok(
            "sentinel = 0
             function bump() sentinel = sentinel + 1 return true end
             x = false and bump()
             print(sentinel)",
        );
    }

    #[test]
    fn short_circuit_or_skips_the_right_operand() {
        run_ok(
            "sentinel = 0
             function bump() sentinel = sentinel + 1 return true end
             x = true or bump()
             print(sentinel)",
        );
    }

    #[test]
    fn calling_a_non_function_is_a_runtime_error() {
        let err = run_err("x = 1 x()");
        assert!(matches!(err, RuntimeError::NotCallable(_)));
    }

    #[test]
    fn recursive_function_terminates() {
        run_ok(
            "function countdown(n)
                 if n <= 0 then return 0 end
                 return countdown(n - 1)
             end
             print(countdown(100))",
        );
    }
}
