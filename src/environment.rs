//! Lexical environment frames.
//!
//! The global frame stores bindings in a string-keyed map.  Every other frame
//! stores its locals in a positional slot vector sized by the resolver, so a
//! resolved reference costs one ancestor walk plus one index.  A slot holds
//! [`Value::Uninitialized`] until its `var` initializer (or first definition)
//! runs; reading the sentinel is a runtime error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{LoxError, Result};
use crate::value::Value;

#[derive(Debug)]
pub struct Environment {
    values: HashMap<String, Value>,
    indexed: Vec<Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    /// The outermost frame.  Globals live in the map only; the slot vector
    /// stays empty.
    pub fn new_global() -> Self {
        Environment {
            values: HashMap::new(),
            indexed: Vec::new(),
            enclosing: None,
        }
    }

    /// A local frame with `size` slots, each starting out uninitialized.
    pub fn new_sized(enclosing: Rc<RefCell<Environment>>, size: usize) -> Self {
        Environment {
            values: HashMap::new(),
            indexed: vec![Value::Uninitialized; size],
            enclosing: Some(enclosing),
        }
    }

    /// Binds `name` to `value`.  A non-negative `index` targets the slot
    /// vector; `-1` targets the map.
    pub fn define(&mut self, name: &str, value: Value, index: i32) {
        debug!("Defining '{}' at index {}", name, index);

        if index >= 0 {
            self.indexed[index as usize] = value;
        } else {
            self.values.insert(name.to_string(), value);
        }
    }

    /// Declares `name` without a value; reads fail until it is assigned.
    pub fn define_uninitialized(&mut self, name: &str, index: i32) {
        self.define(name, Value::Uninitialized, index);
    }

    /// Looks `name` up in this frame, then outwards through the enclosing
    /// chain.
    pub fn get(&self, name: &str, index: i32, line: usize) -> Result<Value> {
        if index >= 0 && (index as usize) < self.indexed.len() {
            return checked(&self.indexed[index as usize], name, line);
        }

        if index < 0 {
            if let Some(value) = self.values.get(name) {
                return checked(value, name, line);
            }
        }

        match &self.enclosing {
            Some(parent) => parent.borrow().get(name, index, line),

            None => Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            )),
        }
    }

    /// Writes over an existing binding, walking outwards like [`get`].
    ///
    /// [`get`]: Environment::get
    pub fn assign(&mut self, name: &str, index: i32, value: Value, line: usize) -> Result<()> {
        if index >= 0 && (index as usize) < self.indexed.len() {
            self.indexed[index as usize] = value;
            return Ok(());
        }

        if index < 0 && self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
            return Ok(());
        }

        match &self.enclosing {
            Some(parent) => parent.borrow_mut().assign(name, index, value, line),

            None => Err(LoxError::runtime(
                line,
                format!("Undefined variable '{}'.", name),
            )),
        }
    }

    /// Walks exactly `distance` enclosing frames.  The resolver guarantees
    /// the chain is deep enough.
    pub fn ancestor(
        env: &Rc<RefCell<Environment>>,
        distance: i32,
    ) -> Rc<RefCell<Environment>> {
        let mut frame: Rc<RefCell<Environment>> = env.clone();

        for _ in 0..distance {
            let parent = frame
                .borrow()
                .enclosing
                .clone()
                .expect("resolver produced a depth deeper than the frame chain");

            frame = parent;
        }

        frame
    }

    /// `get` against the frame `distance` hops out.
    pub fn get_at(
        env: &Rc<RefCell<Environment>>,
        distance: i32,
        name: &str,
        index: i32,
        line: usize,
    ) -> Result<Value> {
        Environment::ancestor(env, distance).borrow().get(name, index, line)
    }

    /// `assign` against the frame `distance` hops out.
    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        distance: i32,
        index: i32,
        name: &str,
        value: Value,
        line: usize,
    ) -> Result<()> {
        Environment::ancestor(env, distance)
            .borrow_mut()
            .assign(name, index, value, line)
    }
}

/// Rejects reads of a slot that was declared but never assigned.
fn checked(value: &Value, name: &str, line: usize) -> Result<Value> {
    if matches!(value, Value::Uninitialized) {
        return Err(LoxError::runtime(
            line,
            format!("Uninitialized variable access: '{}'", name),
        ));
    }

    Ok(value.clone())
}
