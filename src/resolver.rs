//! Static resolution pass.
//!
//! A single top-down AST walk that:
//! 1. **Builds lexical scopes**: maintains a stack of scopes, each an ordered
//!    list of bindings recording name, declaration status (declared vs.
//!    defined), whether the binding was ever read, and the declaring token.
//!    A binding's position in its scope is its runtime slot index.
//! 2. **Enforces static rules**: redeclaration in the same scope, reading a
//!    variable in its own initializer, `return` outside functions, returning
//!    a value from an initializer, `this`/`super` placement, and
//!    self-inheritance.
//! 3. **Annotates the tree**: every variable occurrence gets its
//!    `(depth, index)` pair, every block/function/for/class node the slot
//!    count or slot its frame needs.  References not found in any scope are
//!    left at `-1` and resolve against the global frame at runtime.
//! 4. **Collects unused locals**: on scope exit, bindings that were declared
//!    by user code but never read are recorded; the driver reports them and
//!    refuses to run the program.
//!
//! Resolution halts at the first static error.  Globals are exempt from
//! both redeclaration checks and unused reporting.

use log::{debug, info};

use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::error::{LoxError, Result};
use crate::token::Token;

/// What kind of function body is being resolved; validates `return` and
/// `this`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
    /// A static method: attached to the class value, no `this`.
    ClassMethod,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    /// Not inside any class
    None,

    /// Inside a class declaration _without_ a superclass
    Class,

    /// Inside a class declaration _with_ a superclass
    Subclass,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BindingStatus {
    Declared,
    Defined,
}

/// One name in one scope.  `origin` is the declaring token for bindings that
/// participate in unused-local reporting; parameters and the implicit
/// `this`/`super` bindings carry `None`.
struct Binding {
    name: String,
    status: BindingStatus,
    used: bool,
    origin: Option<Token>,
}

type Scope = Vec<Binding>;

pub struct Resolver {
    scopes: Vec<Scope>,
    current_function: FunctionType,
    current_class: ClassType,
    unused: Vec<Token>,
}

impl Resolver {
    pub fn new() -> Self {
        info!("Resolver instantiated");
        Resolver {
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            unused: Vec::new(),
        }
    }

    /// Walks all top-level statements, annotating the tree in place.
    pub fn resolve(&mut self, statements: &[Stmt]) -> Result<()> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    /// The declaring tokens of every local that was never read, in scope
    /// exit order.
    pub fn into_unused(self) -> Vec<Token> {
        self.unused
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Class {
                name,
                superclass,
                methods,
                class_methods,
                env_index,
            } => {
                // 1. Self-inheritance guard
                if let Some(Expr::Variable { name: super_name, .. }) = superclass {
                    if super_name.lexeme == name.lexeme {
                        return Err(LoxError::resolve(
                            super_name.line,
                            "A class can't inherit from itself.",
                        ));
                    }
                }

                // 2. Declare & define the class name so methods can refer to
                //    the class itself
                let slot: i32 = self.declare(name, Some(name.clone()))?;
                self.define(&name.lexeme);
                env_index.set(slot);

                // 3. Save and enter the class context
                let enclosing_class: ClassType = self.current_class;

                self.current_class = if superclass.is_some() {
                    ClassType::Subclass
                } else {
                    ClassType::Class
                };

                // 4. If there is a superclass, resolve it and bind `super`
                //    in a synthetic one-slot scope
                if let Some(super_expr) = superclass {
                    self.resolve_expr(super_expr)?;

                    self.begin_scope();
                    self.declare_implicit("super");
                }

                // 5. Open the implicit `this` scope for methods
                self.begin_scope();
                self.declare_implicit("this");

                // 6. Resolve each method in its own function context
                for method in methods {
                    let kind: FunctionType = if method.name.lexeme == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };

                    self.resolve_function(method, kind)?;
                }

                // 7. Close the `this` scope
                self.end_scope();

                // 8. Static methods resolve outside the `this` scope: their
                //    runtime closure has no bound frame, so the depth of any
                //    captured binding must not count one.
                for class_method in class_methods {
                    self.resolve_function(class_method, FunctionType::ClassMethod)?;
                }

                // 9. If we opened a `super` scope, close it now
                if superclass.is_some() {
                    self.end_scope();
                }

                // 10. Restore the outer class context
                self.current_class = enclosing_class;
            }

            Stmt::Block {
                statements,
                env_size,
            } => {
                self.begin_scope();

                for s in statements {
                    self.resolve_stmt(s)?;
                }

                // The frame needs one slot per declaration made directly in
                // this block.
                env_size.set(self.end_scope());
            }

            Stmt::Var {
                name,
                initializer,
                env_index,
            } => {
                // 1. Declare the variable name (marked but not yet defined)
                let slot: i32 = self.declare(name, Some(name.clone()))?;

                // 2. Resolve the initializer expression, if any; reading the
                //    variable inside it is an error because the binding is
                //    still in `Declared` state
                if let Some(expr) = initializer {
                    self.resolve_expr(expr)?;
                }

                // 3. Define the variable and record its slot
                self.define(&name.lexeme);
                env_index.set(slot);
            }

            Stmt::Function(decl) => {
                // Declared and defined up front so the function can recurse.
                let slot: i32 = self.declare(&decl.name, Some(decl.name.clone()))?;
                self.define(&decl.name.lexeme);
                decl.env_index.set(slot);

                self.resolve_function(decl, FunctionType::Function)?;
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr)?;
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;

                self.resolve_stmt(then_branch)?;

                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb)?;
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition)?;

                self.resolve_stmt(body)?;
            }

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
                env_size,
            } => {
                // The loop owns one scope for its initializer clause; the
                // body, if a block, opens its own.
                self.begin_scope();

                if let Some(init) = initializer {
                    self.resolve_stmt(init)?;
                }

                if let Some(cond) = condition {
                    self.resolve_expr(cond)?;
                }

                if let Some(inc) = increment {
                    self.resolve_expr(inc)?;
                }

                self.resolve_stmt(body)?;

                env_size.set(self.end_scope());
            }

            Stmt::Return { keyword, value } => {
                // 1. Ensure we're inside a function body of some kind
                if self.current_function == FunctionType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot return from top-level code.",
                    ));
                }

                // 2. In an initializer, only bare `return;` is allowed
                if self.current_function == FunctionType::Initializer && value.is_some() {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot return a value from an initializer.",
                    ));
                }

                if let Some(expr) = value {
                    self.resolve_expr(expr)?;
                }
            }

            // The parser guarantees these appear only inside loops.
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner)?;
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right)?;
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)?;
            }

            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_expr(then_branch)?;
                self.resolve_expr(else_branch)?;
            }

            Expr::Variable { name, depth, index } => {
                // 1. Prevent reading a variable in its own initializer
                if let Some(scope) = self.scopes.last() {
                    let declaring = scope
                        .iter()
                        .find(|b| b.name == name.lexeme)
                        .map(|b| b.status);

                    if declaring == Some(BindingStatus::Declared) {
                        return Err(LoxError::resolve(
                            name.line,
                            "Cannot read local variable in its own initializer.",
                        ));
                    }
                }

                // 2. Bind this occurrence at its lexical depth and slot
                if let Some((d, i)) = self.resolve_local(&name.lexeme) {
                    depth.set(d);
                    index.set(i);
                }
            }

            Expr::Assign {
                name,
                value,
                depth,
                index,
            } => {
                // Resolve the right-hand side first, then bind the target.
                self.resolve_expr(value)?;

                if let Some((d, i)) = self.resolve_local(&name.lexeme) {
                    depth.set(d);
                    index.set(i);
                }
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee)?;

                for arg in arguments {
                    self.resolve_expr(arg)?;
                }
            }

            Expr::This { keyword, depth, index } => {
                // 1. 'this' is only valid inside instance method bodies
                if self.current_class == ClassType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot use 'this' outside of a class.",
                    ));
                }

                if self.current_function == FunctionType::ClassMethod {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot use 'this' outside instance initializers or methods.",
                    ));
                }

                // 2. Bind 'this' like a local variable
                if let Some((d, i)) = self.resolve_local(&keyword.lexeme) {
                    depth.set(d);
                    index.set(i);
                }
            }

            Expr::Get { object, .. } => {
                self.resolve_expr(object)?;
            }

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)?;
            }

            Expr::Super { keyword, depth, .. } => {
                // 1. Disallow outside any class
                if self.current_class == ClassType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot use 'super' outside of a class.",
                    ));
                }

                // 2. Disallow in a class with no superclass
                if self.current_class != ClassType::Subclass {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot use 'super' in a class with no superclass.",
                    ));
                }

                // 3. Valid; `super` always lives in slot 0 of its frame, so
                //    only the depth is recorded.
                if let Some((d, _)) = self.resolve_local(&keyword.lexeme) {
                    depth.set(d);
                }
            }
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.
    ///
    /// `kind` selects the `return`/`this` rules that apply inside the body.
    fn resolve_function(&mut self, decl: &FunctionDecl, kind: FunctionType) -> Result<()> {
        debug!(
            "Resolving function '{}' as {:?}",
            decl.name.lexeme, kind
        );

        // 1. Save the enclosing function context so we can restore it later.
        let enclosing: FunctionType = self.current_function;
        self.current_function = kind;

        // 2. One scope covers the parameters and the body's own locals.
        self.begin_scope();

        // 3. Getter properties have no parameter list to declare.
        if let Some(params) = &decl.params {
            for param in params {
                self.declare(param, None)?;
                self.define(&param.lexeme);
            }
        }

        // 4. Resolve the body in the new scope; failures must still restore
        //    the function context for REPL reuse.
        let result: Result<()> = decl
            .body
            .iter()
            .try_for_each(|stmt| self.resolve_stmt(stmt));

        if result.is_ok() {
            decl.env_size.set(self.end_scope());
        } else {
            self.end_scope();
        }

        self.current_function = enclosing;

        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Pops the innermost scope, recording its never-read bindings, and
    /// returns the slot count its runtime frame needs.
    fn end_scope(&mut self) -> i32 {
        let scope: Scope = self
            .scopes
            .pop()
            .expect("end_scope called with no open scope");

        for binding in &scope {
            if !binding.used {
                if let Some(origin) = &binding.origin {
                    debug!("Unused local '{}'", binding.name);
                    self.unused.push(origin.clone());
                }
            }
        }

        scope.len() as i32
    }

    /// Appends a new binding to the current scope and returns its slot, or
    /// `-1` at global scope where bindings are unchecked and map-stored.
    fn declare(&mut self, name: &Token, origin: Option<Token>) -> Result<i32> {
        match self.scopes.last_mut() {
            Some(scope) => {
                if scope.iter().any(|b| b.name == name.lexeme) {
                    return Err(LoxError::resolve(
                        name.line,
                        format!("Variable '{}' already declared in this scope.", name.lexeme),
                    ));
                }

                scope.push(Binding {
                    name: name.lexeme.clone(),
                    status: BindingStatus::Declared,
                    used: false,
                    origin,
                });

                Ok((scope.len() - 1) as i32)
            }

            None => Ok(-1),
        }
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(binding) = scope.iter_mut().rev().find(|b| b.name == name) {
                binding.status = BindingStatus::Defined;
            }
        }
    }

    /// Installs a synthetic binding (`this`/`super`) that is always defined
    /// and never reported unused.
    fn declare_implicit(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Binding {
                name: name.to_string(),
                status: BindingStatus::Defined,
                used: false,
                origin: None,
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding-distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Finds the innermost binding for `name`, marks it read, and returns
    /// `(depth, slot)`.  `None` means the reference is a global.
    fn resolve_local(&mut self, name: &str) -> Option<(i32, i32)> {
        for (depth, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some((slot, binding)) = scope
                .iter_mut()
                .enumerate()
                .rev()
                .find(|(_, b)| b.name == name)
            {
                debug!("Resolved '{}' at depth {}, slot {}", name, depth, slot);

                binding.used = true;

                return Some((depth as i32, slot as i32));
            }
        }

        debug!("Resolved '{}' as global", name);

        None
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}
