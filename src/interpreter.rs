//! The tree-walking evaluator.
//!
//! One arm per AST variant, dispatched by exhaustive `match`.  Statements
//! produce a [`Flow`] value so `return`, `break` and `continue` travel
//! in-band back to the boundary that consumes them (the function call for
//! `return`, the nearest loop for `break`/`continue`) without being confused
//! with runtime errors.
//!
//! Variable references annotated by the resolver with a depth walk exactly
//! that many frames and index a slot; unannotated references go to the
//! global frame's string map.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::callable::{Callable, NativeFunction, UserFunction};
use crate::class::LoxClass;
use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};
use crate::value::Value;

const OPERAND_MUST_BE_A_NUMBER: &str = "Operand must be a number";
const OPERANDS_MUST_BE_TWO_NUMBERS_OR_TWO_STRINGS: &str =
    "Operands must be two numbers or two strings";

/// Statement outcome.  Everything except `Normal` unwinds to the nearest
/// boundary that handles it; an unhandled signal at the top of the
/// interpreter is a fatal error.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    writer: Box<dyn Write>,
}

impl Interpreter {
    /// An interpreter printing to standard output.
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    /// An interpreter printing to the given sink; tests capture output this
    /// way.
    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new_global()));

        register_natives(&globals);

        Interpreter {
            environment: globals.clone(),
            globals,
            writer,
        }
    }

    /// Discards all global state and re-registers the built-ins.  Reserved
    /// for test isolation.
    pub fn reset_globals(&mut self) {
        let globals = Rc::new(RefCell::new(Environment::new_global()));

        register_natives(&globals);

        self.environment = globals.clone();
        self.globals = globals;
    }

    /// Runs a resolved program.  A runtime error aborts the statement that
    /// raised it and execution continues with the next top-level statement;
    /// the errors come back to the caller in source order for reporting.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Vec<LoxError> {
        info!("Interpreting {} top-level statement(s)", statements.len());

        let mut errors: Vec<LoxError> = Vec::new();

        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Normal) => {}

                Ok(flow) => {
                    // The parser and resolver reject stray signals, so one
                    // arriving here is a bug.
                    errors.push(LoxError::runtime(
                        0,
                        format!("Fatal: unhandled control-flow signal {:?}.", flow),
                    ));
                }

                Err(e) => errors.push(e),
            }
        }

        errors
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        debug!("Executing stmt: {:?}", std::mem::discriminant(stmt));

        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;

                Ok(Flow::Normal)
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;

                writeln!(self.writer, "{}", value)?;

                Ok(Flow::Normal)
            }

            Stmt::Var {
                name,
                initializer,
                env_index,
            } => {
                match initializer {
                    Some(expr) => {
                        let value: Value = self.evaluate(expr)?;

                        self.environment.borrow_mut().define(
                            &name.lexeme,
                            value,
                            env_index.get(),
                        );
                    }

                    None => {
                        self.environment
                            .borrow_mut()
                            .define_uninitialized(&name.lexeme, env_index.get());
                    }
                }

                Ok(Flow::Normal)
            }

            Stmt::Block {
                statements,
                env_size,
            } => {
                let environment = Rc::new(RefCell::new(Environment::new_sized(
                    self.environment.clone(),
                    env_size.get().max(0) as usize,
                )));

                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while is_truthy(&self.evaluate(condition)?) {
                    match self.execute(body)? {
                        Flow::Normal | Flow::Continue => {}

                        Flow::Break => break,

                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }

                Ok(Flow::Normal)
            }

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
                env_size,
            } => {
                // The for statement owns one frame for its initializer
                // clause; the body manages its own scope.
                let previous: Rc<RefCell<Environment>> = self.environment.clone();

                self.environment = Rc::new(RefCell::new(Environment::new_sized(
                    previous.clone(),
                    env_size.get().max(0) as usize,
                )));

                let result: Result<Flow> = self.run_for(
                    initializer.as_deref(),
                    condition.as_ref(),
                    increment.as_ref(),
                    body,
                );

                self.environment = previous;

                result
            }

            Stmt::Return { keyword: _, value } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,

                    None => Value::Nil,
                };

                Ok(Flow::Return(value))
            }

            Stmt::Break { .. } => Ok(Flow::Break),

            Stmt::Continue { .. } => Ok(Flow::Continue),

            Stmt::Function(decl) => {
                let function =
                    UserFunction::new(decl.clone(), self.environment.clone(), false);

                self.environment.borrow_mut().define(
                    &decl.name.lexeme,
                    Value::Function(Rc::new(function)),
                    decl.env_index.get(),
                );

                Ok(Flow::Normal)
            }

            Stmt::Class {
                name,
                superclass,
                methods,
                class_methods,
                env_index,
            } => self.execute_class(name, superclass.as_ref(), methods, class_methods, env_index.get()),
        }
    }

    /// Runs `statements` inside `environment`, restoring the previous frame
    /// on every exit path.
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Flow> {
        let previous: Rc<RefCell<Environment>> =
            std::mem::replace(&mut self.environment, environment);

        let mut flow: Flow = Flow::Normal;

        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Normal) => {}

                Ok(signal) => {
                    flow = signal;
                    break;
                }

                Err(e) => {
                    self.environment = previous;
                    return Err(e);
                }
            }
        }

        self.environment = previous;

        Ok(flow)
    }

    fn run_for(
        &mut self,
        initializer: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Flow> {
        if let Some(init) = initializer {
            self.execute(init)?;
        }

        loop {
            // 1. An absent condition is true.
            if let Some(cond) = condition {
                if !is_truthy(&self.evaluate(cond)?) {
                    break;
                }
            }

            // 2. `continue` skips the rest of the body but still runs the
            //    increment below.
            match self.execute(body)? {
                Flow::Normal | Flow::Continue => {}

                Flow::Break => break,

                Flow::Return(value) => return Ok(Flow::Return(value)),
            }

            if let Some(inc) = increment {
                self.evaluate(inc)?;
            }
        }

        Ok(Flow::Normal)
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        class_methods: &[Rc<FunctionDecl>],
        env_index: i32,
    ) -> Result<Flow> {
        // 1. The superclass expression must evaluate to a class value.
        let superclass_value: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),

                _ => {
                    let line: usize = match expr {
                        Expr::Variable { name, .. } => name.line,
                        _ => name.line,
                    };

                    return Err(LoxError::runtime(line, "Superclass must be a class."));
                }
            },

            None => None,
        };

        // 2. Forward-declare the class name so methods can refer to it.
        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Nil, env_index);

        // 3. With a superclass, methods close over a synthetic one-slot
        //    frame holding `super`.
        let method_closure: Rc<RefCell<Environment>> = match &superclass_value {
            Some(class) => {
                let mut frame: Environment =
                    Environment::new_sized(self.environment.clone(), 1);

                frame.define("super", Value::Class(class.clone()), 0);

                Rc::new(RefCell::new(frame))
            }

            None => self.environment.clone(),
        };

        // 4. Instance methods; `init` gets initializer semantics.
        let mut method_map: HashMap<String, Rc<UserFunction>> = HashMap::new();

        for decl in methods {
            let is_initializer: bool = decl.name.lexeme == "init";

            method_map.insert(
                decl.name.lexeme.clone(),
                Rc::new(UserFunction::new(
                    decl.clone(),
                    method_closure.clone(),
                    is_initializer,
                )),
            );
        }

        // 5. Static methods attach to the class value, not instances.
        let mut class_method_map: HashMap<String, Rc<UserFunction>> = HashMap::new();

        for decl in class_methods {
            class_method_map.insert(
                decl.name.lexeme.clone(),
                Rc::new(UserFunction::new(decl.clone(), method_closure.clone(), false)),
            );
        }

        let class = LoxClass::new(
            name.lexeme.clone(),
            superclass_value,
            method_map,
            class_method_map,
        );

        self.environment.borrow_mut().assign(
            &name.lexeme,
            env_index,
            Value::Class(Rc::new(class)),
            name.line,
        )?;

        Ok(Flow::Normal)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(token) => evaluate_literal(token),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_val: Value = self.evaluate(left)?;

                // Short-circuit yields the operand value itself, not a
                // coerced boolean.
                match operator.token_type {
                    TokenType::OR if is_truthy(&left_val) => Ok(left_val),

                    TokenType::AND if !is_truthy(&left_val) => Ok(left_val),

                    _ => self.evaluate(right),
                }
            }

            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }

            Expr::Variable { name, depth, index } => self.look_up(name, depth.get(), index.get()),

            Expr::This { keyword, depth, index } => {
                self.look_up(keyword, depth.get(), index.get())
            }

            Expr::Assign {
                name,
                value,
                depth,
                index,
            } => {
                let value: Value = self.evaluate(value)?;

                if depth.get() >= 0 {
                    Environment::assign_at(
                        &self.environment,
                        depth.get(),
                        index.get(),
                        &name.lexeme,
                        value.clone(),
                        name.line,
                    )?;
                } else {
                    self.globals.borrow_mut().assign(
                        &name.lexeme,
                        index.get(),
                        value.clone(),
                        name.line,
                    )?;
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_value: Value = self.evaluate(callee)?;

                let mut argument_values: Vec<Value> = Vec::with_capacity(arguments.len());

                for arg in arguments {
                    argument_values.push(self.evaluate(arg)?);
                }

                let callable: &dyn Callable = match &callee_value {
                    Value::Native(native) => native.as_ref(),

                    Value::Function(function) => function.as_ref(),

                    Value::Class(class) => class,

                    _ => {
                        return Err(LoxError::runtime(
                            paren.line,
                            "Can only call functions and classes.",
                        ));
                    }
                };

                if callable.arity() != argument_values.len() {
                    return Err(LoxError::runtime(
                        paren.line,
                        format!(
                            "Expected {} arguments but got {}.",
                            callable.arity(),
                            argument_values.len()
                        ),
                    ));
                }

                callable.call(self, argument_values)
            }

            Expr::Get { object, name } => {
                let object_value: Value = self.evaluate(object)?;

                match object_value {
                    Value::Instance(instance) => {
                        // 1. Fields shadow methods.
                        if let Some(value) = instance.field(&name.lexeme) {
                            return Ok(value);
                        }

                        // 2. Methods bind `this`; getter properties are
                        //    invoked on the spot.
                        if let Some(method) = instance.class().find_method(&name.lexeme) {
                            let bound: UserFunction = method.bind(instance.clone());

                            if bound.is_getter() {
                                return bound.call(self, Vec::new());
                            }

                            return Ok(Value::Function(Rc::new(bound)));
                        }

                        Err(LoxError::runtime(
                            name.line,
                            format!("Undefined property '{}'.", name.lexeme),
                        ))
                    }

                    Value::Class(class) => match class.find_class_method(&name.lexeme) {
                        Some(method) => Ok(Value::Function(method)),

                        None => Err(LoxError::runtime(
                            name.line,
                            format!("Undefined property '{}'.", name.lexeme),
                        )),
                    },

                    _ => Err(LoxError::runtime(
                        name.line,
                        "Only instances have properties.",
                    )),
                }
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                let object_value: Value = self.evaluate(object)?;

                match object_value {
                    Value::Instance(instance) => {
                        let value: Value = self.evaluate(value)?;

                        instance.set_field(&name.lexeme, value.clone());

                        Ok(value)
                    }

                    _ => Err(LoxError::runtime(name.line, "Only instances have fields.")),
                }
            }

            Expr::Super {
                keyword,
                method,
                depth,
            } => {
                // `super` sits in slot 0 of its synthetic frame and the
                // bound `this` one frame closer.
                let superclass: Value = Environment::get_at(
                    &self.environment,
                    depth.get(),
                    "super",
                    0,
                    keyword.line,
                )?;

                let instance: Value = Environment::get_at(
                    &self.environment,
                    depth.get() - 1,
                    "this",
                    0,
                    keyword.line,
                )?;

                let (Value::Class(superclass), Value::Instance(instance)) =
                    (superclass, instance)
                else {
                    return Err(LoxError::runtime(
                        keyword.line,
                        "Fatal: 'super' frame corrupted.",
                    ));
                };

                match superclass.find_method(&method.lexeme) {
                    Some(found) => {
                        let bound: UserFunction = found.bind(instance);

                        if bound.is_getter() {
                            return bound.call(self, Vec::new());
                        }

                        Ok(Value::Function(Rc::new(bound)))
                    }

                    None => Err(LoxError::runtime(
                        method.line,
                        format!("Undefined property '{}'.", method.lexeme),
                    )),
                }
            }
        }
    }

    /// Resolved references walk `depth` frames to a slot; unresolved ones
    /// consult the global map.
    fn look_up(&self, name: &Token, depth: i32, index: i32) -> Result<Value> {
        if depth >= 0 {
            Environment::get_at(&self.environment, depth, &name.lexeme, index, name.line)
        } else {
            self.globals.borrow().get(&name.lexeme, index, name.line)
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value> {
        let value: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => {
                let n: f64 = number_operand(operator, &value)?;

                Ok(Value::Number(-n))
            }

            TokenType::BANG => Ok(Value::Bool(!is_truthy(&value))),

            _ => Err(LoxError::runtime(operator.line, "Invalid unary operator.")),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left_val: Value = self.evaluate(left)?;
        let right_val: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),

                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),

                _ => Err(LoxError::runtime(
                    operator.line,
                    OPERANDS_MUST_BE_TWO_NUMBERS_OR_TWO_STRINGS,
                )),
            },

            TokenType::MINUS => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                Ok(Value::Number(a - b))
            }

            TokenType::STAR => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                Ok(Value::Number(a * b))
            }

            TokenType::SLASH => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                // IEEE-754 semantics; division by zero yields an infinity.
                Ok(Value::Number(a / b))
            }

            TokenType::STAR_STAR => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                Ok(Value::Number(a.powf(b)))
            }

            TokenType::GREATER => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                Ok(Value::Bool(a > b))
            }

            TokenType::GREATER_EQUAL => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                Ok(Value::Bool(a >= b))
            }

            TokenType::LESS => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                Ok(Value::Bool(a < b))
            }

            TokenType::LESS_EQUAL => {
                let (a, b) = number_operands(operator, &left_val, &right_val)?;

                Ok(Value::Bool(a <= b))
            }

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(is_equal(&left_val, &right_val))),

            TokenType::BANG_EQUAL => Ok(Value::Bool(!is_equal(&left_val, &right_val))),

            // The comma operator discards its left operand.
            TokenType::COMMA => Ok(right_val),

            _ => Err(LoxError::runtime(operator.line, "Invalid binary operator.")),
        }
    }
}

fn evaluate_literal(token: &Token) -> Result<Value> {
    match &token.token_type {
        TokenType::NUMBER(n) => Ok(Value::Number(*n)),

        TokenType::STRING(s) => Ok(Value::String(s.clone())),

        TokenType::TRUE => Ok(Value::Bool(true)),

        TokenType::FALSE => Ok(Value::Bool(false)),

        TokenType::NIL => Ok(Value::Nil),

        _ => Err(LoxError::runtime(token.line, "Invalid literal.")),
    }
}

/// Only `nil` and `false` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,

        Value::Bool(b) => *b,

        _ => true,
    }
}

/// Total equality: same-kind values compare by value (identity for
/// callables and instances); different kinds are never equal.
pub fn is_equal(left: &Value, right: &Value) -> bool {
    left == right
}

fn number_operand(operator: &Token, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => Ok(*n),

        _ => Err(LoxError::runtime(operator.line, OPERAND_MUST_BE_A_NUMBER)),
    }
}

fn number_operands(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64)> {
    Ok((
        number_operand(operator, left)?,
        number_operand(operator, right)?,
    ))
}

fn register_natives(globals: &Rc<RefCell<Environment>>) {
    globals.borrow_mut().define(
        "clock",
        Value::Native(Rc::new(NativeFunction {
            name: "clock".to_string(),
            arity: 0,
            func: clock_native,
        })),
        -1,
    );
}

/// The wall-clock second, 0..59, as a Lox number.
fn clock_native(_args: &[Value]) -> Result<Value> {
    let second: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() % 60)
        .unwrap_or(0);

    Ok(Value::Number(second as f64))
}
