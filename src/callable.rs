//! The call capability shared by native built-ins, user functions and
//! classes-as-constructors.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::class::ClassInstance;
use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::interpreter::{Flow, Interpreter};
use crate::value::Value;

/// Anything invocable through a `Call` expression.
pub trait Callable {
    fn arity(&self) -> usize;

    fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value>;
}

/// A host-provided built-in with a fixed arity.
#[derive(Debug)]
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: fn(&[Value]) -> Result<Value>,
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, _interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value> {
        (self.func)(&arguments)
    }
}

/// A function or method defined in Lox source, closed over the frame it was
/// declared in.  Initializers always yield the bound `this` regardless of
/// explicit `return`s.
pub struct UserFunction {
    definition: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl UserFunction {
    pub fn new(
        definition: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        UserFunction {
            definition,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name.lexeme
    }

    /// Getter properties are invoked on property access rather than through
    /// a call expression.
    pub fn is_getter(&self) -> bool {
        self.definition.is_getter()
    }

    /// Produces a copy of this function whose closure has `this` bound to
    /// `instance` in slot 0.
    pub fn bind(&self, instance: Rc<ClassInstance>) -> UserFunction {
        let mut frame: Environment = Environment::new_sized(self.closure.clone(), 1);

        frame.define("this", Value::Instance(instance), 0);

        UserFunction {
            definition: self.definition.clone(),
            closure: Rc::new(RefCell::new(frame)),
            is_initializer: self.is_initializer,
        }
    }

    /// The instance an initializer must return; only meaningful on bound
    /// functions, whose closure frame holds `this` in slot 0.
    fn bound_this(&self) -> Result<Value> {
        self.closure
            .borrow()
            .get("this", 0, self.definition.name.line)
    }
}

impl Callable for UserFunction {
    fn arity(&self) -> usize {
        self.definition.arity()
    }

    fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value> {
        debug!(
            "Calling <fn {}> with {} argument(s)",
            self.name(),
            arguments.len()
        );

        let size: usize = self.definition.env_size.get().max(0) as usize;

        let environment = Rc::new(RefCell::new(Environment::new_sized(
            self.closure.clone(),
            size,
        )));

        if let Some(params) = &self.definition.params {
            // Parameters occupy slots 0..params.len(); the interpreter has
            // already checked the arity.
            for (slot, (param, value)) in params.iter().zip(arguments).enumerate() {
                environment
                    .borrow_mut()
                    .define(&param.lexeme, value, slot as i32);
            }
        }

        match interpreter.execute_block(&self.definition.body, environment)? {
            Flow::Return(value) => {
                if self.is_initializer {
                    self.bound_this()
                } else {
                    Ok(value)
                }
            }

            Flow::Normal => {
                if self.is_initializer {
                    self.bound_this()
                } else {
                    Ok(Value::Nil)
                }
            }

            Flow::Break | Flow::Continue => Err(LoxError::runtime(
                self.definition.name.line,
                "Fatal: loop control signal escaped a function body.",
            )),
        }
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The closure is elided: frames reference functions which reference
        // frames, and Debug must not chase that cycle.
        f.debug_struct("UserFunction")
            .field("name", &self.definition.name.lexeme)
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}
