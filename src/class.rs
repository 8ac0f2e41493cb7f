//! User classes and their instances.
//!
//! A class doubles as the constructor for its instances: calling it allocates
//! an instance and, when an `init` method exists, runs it bound to the new
//! instance.  Method lookup walks the superclass chain; instance fields live
//! in a per-instance map and shadow methods of the same name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::callable::{Callable, UserFunction};
use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::value::Value;

pub struct LoxClass {
    pub name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Rc<UserFunction>>,
    class_methods: HashMap<String, Rc<UserFunction>>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<UserFunction>>,
        class_methods: HashMap<String, Rc<UserFunction>>,
    ) -> Self {
        LoxClass {
            name,
            superclass,
            methods,
            class_methods,
        }
    }

    /// Finds an instance method, searching the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<UserFunction>> {
        self.methods.get(name).cloned().or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name))
        })
    }

    /// Finds a static (class) method, searching the superclass chain.
    pub fn find_class_method(&self, name: &str) -> Option<Rc<UserFunction>> {
        self.class_methods.get(name).cloned().or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_class_method(name))
        })
    }
}

impl Callable for Rc<LoxClass> {
    /// A class's arity is its initializer's, or zero without one.
    fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }

    /// Constructs a new instance, running `init` when the class has one.
    /// The constructed instance is the result even when `init` returns
    /// early.
    fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value> {
        debug!("Constructing instance of <class {}>", self.name);

        let instance: Rc<ClassInstance> = Rc::new(ClassInstance::new(self.clone()));

        if let Some(initializer) = self.find_method("init") {
            initializer
                .bind(instance.clone())
                .call(interpreter, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxClass")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("class_methods", &self.class_methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct ClassInstance {
    class: Rc<LoxClass>,
    fields: RefCell<HashMap<String, Value>>,
}

impl ClassInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        ClassInstance {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn class(&self) -> &Rc<LoxClass> {
        &self.class
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_string(), value);
    }
}

impl fmt::Debug for ClassInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Fields may hold the instance itself; print the class name only.
        write!(f, "ClassInstance({})", self.class.name)
    }
}
