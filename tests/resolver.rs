mod common;

use treelox as lox;

use common::{parse_program, resolve_program};
use lox::ast::{Expr, Stmt};
use lox::resolver::Resolver;

fn resolve_error(source: &str) -> String {
    resolve_program(source)
        .expect_err("expected a resolve error")
        .to_string()
}

#[test]
fn return_at_top_level_is_rejected() {
    assert_eq!(
        resolve_error("return 1;"),
        "[line 1] Error: Cannot return from top-level code."
    );
}

#[test]
fn returning_a_value_from_an_initializer_is_rejected() {
    assert_eq!(
        resolve_error("class A { init() { return 1; } }"),
        "[line 1] Error: Cannot return a value from an initializer."
    );
}

#[test]
fn bare_return_in_an_initializer_is_allowed() {
    let result = resolve_program("class A { init() { return; } } A();");

    assert!(result.is_ok());
}

#[test]
fn this_outside_a_class_is_rejected() {
    assert_eq!(
        resolve_error("print this;"),
        "[line 1] Error: Cannot use 'this' outside of a class."
    );
}

#[test]
fn this_inside_a_static_method_is_rejected() {
    assert_eq!(
        resolve_error("class A { class f() { return this; } }"),
        "[line 1] Error: Cannot use 'this' outside instance initializers or methods."
    );
}

#[test]
fn super_outside_a_class_is_rejected() {
    assert_eq!(
        resolve_error("print super.x;"),
        "[line 1] Error: Cannot use 'super' outside of a class."
    );
}

#[test]
fn super_without_a_superclass_is_rejected() {
    assert_eq!(
        resolve_error("class A { f() { return super.f; } }"),
        "[line 1] Error: Cannot use 'super' in a class with no superclass."
    );
}

#[test]
fn self_inheritance_is_rejected() {
    assert_eq!(
        resolve_error("class A < A {}"),
        "[line 1] Error: A class can't inherit from itself."
    );
}

#[test]
fn redeclaration_in_the_same_local_scope_is_rejected() {
    assert_eq!(
        resolve_error("{ var a = 1; var a = 2; }"),
        "[line 1] Error: Variable 'a' already declared in this scope."
    );
}

#[test]
fn global_redeclaration_is_allowed() {
    let result = resolve_program("var a = 1; var a = 2; print a;");

    assert!(result.is_ok());
}

#[test]
fn reading_a_local_in_its_own_initializer_is_rejected() {
    assert_eq!(
        resolve_error("{ var a = a; }"),
        "[line 1] Error: Cannot read local variable in its own initializer."
    );
}

#[test]
fn shadowing_reads_the_outer_binding_in_the_initializer() {
    // `b` is still `Declared` only in the *inner* scope; the outer binding
    // is a different entry and legal to read.
    let source = "{ var b = 1; { var c = b; print c; } print b; }";

    let (_, unused) = resolve_program(source).expect("clean program");

    assert!(unused.is_empty());
}

#[test]
fn unused_local_variable_is_reported() {
    let (_, unused) = resolve_program("{ var a = 1; }").expect("resolves");

    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0].lexeme, "a");
}

#[test]
fn unused_local_function_is_reported() {
    let (_, unused) = resolve_program("{ fun helper() { return 1; } }").expect("resolves");

    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0].lexeme, "helper");
}

#[test]
fn used_locals_are_not_reported() {
    let (_, unused) =
        resolve_program("{ var a = 1; print a; }").expect("resolves");

    assert!(unused.is_empty());
}

#[test]
fn parameters_are_never_reported_unused() {
    let (_, unused) = resolve_program("fun f(ignored) { return 1; } f(1);").expect("resolves");

    assert!(unused.is_empty());
}

#[test]
fn globals_are_never_reported_unused() {
    let (_, unused) = resolve_program("var lonely = 1;").expect("resolves");

    assert!(unused.is_empty());
}

#[test]
fn local_references_get_depth_and_slot() {
    let source = "{ var a = 1; { print a; } }";

    let (statements, _) = resolve_program(source).expect("resolves");

    // Outer block: one slot for `a`.
    let Stmt::Block {
        statements: outer,
        env_size,
    } = &statements[0]
    else {
        panic!("expected a block");
    };

    assert_eq!(env_size.get(), 1);

    // Inner block declares nothing.
    let Stmt::Block {
        statements: inner,
        env_size: inner_size,
    } = &outer[1]
    else {
        panic!("expected a nested block");
    };

    assert_eq!(inner_size.get(), 0);

    // `a` is one frame out, slot 0.
    let Stmt::Print(Expr::Variable { depth, index, .. }) = &inner[0] else {
        panic!("expected a variable print");
    };

    assert_eq!(depth.get(), 1);
    assert_eq!(index.get(), 0);
}

#[test]
fn global_references_stay_unresolved() {
    let source = "var g = 1; { print g; }";

    let (statements, _) = resolve_program(source).expect("resolves");

    let Stmt::Block { statements: inner, .. } = &statements[1] else {
        panic!("expected a block");
    };

    let Stmt::Print(Expr::Variable { depth, index, .. }) = &inner[0] else {
        panic!("expected a variable print");
    };

    assert_eq!(depth.get(), -1);
    assert_eq!(index.get(), -1);
}

#[test]
fn function_frames_cover_parameters_and_locals() {
    let source = "fun f(a, b) { var c = a + b; return c; } f(1, 2);";

    let (statements, _) = resolve_program(source).expect("resolves");

    let Stmt::Function(decl) = &statements[0] else {
        panic!("expected a function declaration");
    };

    // Two parameters plus one body local.
    assert_eq!(decl.env_size.get(), 3);

    // Parameters sit in slots 0 and 1, so `c` lands in slot 2.
    let Stmt::Var { env_index, .. } = &decl.body[0] else {
        panic!("expected a var declaration");
    };

    assert_eq!(env_index.get(), 2);
}

#[test]
fn for_frames_hold_the_loop_variable() {
    let source = "for (var i = 0; i < 3; i = i + 1) print i;";

    let (statements, _) = resolve_program(source).expect("resolves");

    let Stmt::For { env_size, .. } = &statements[0] else {
        panic!("expected a for statement");
    };

    assert_eq!(env_size.get(), 1);
}

#[test]
fn this_resolves_through_the_method_scope() {
    let source = "class A { f() { return this; } } A().f();";

    let (statements, _) = resolve_program(source).expect("resolves");

    let Stmt::Class { methods, .. } = &statements[0] else {
        panic!("expected a class declaration");
    };

    let Stmt::Return { value, .. } = &methods[0].body[0] else {
        panic!("expected a return");
    };

    let Some(Expr::This { depth, index, .. }) = value else {
        panic!("expected `this`");
    };

    // One hop from the method body to the bound frame, slot 0.
    assert_eq!(depth.get(), 1);
    assert_eq!(index.get(), 0);
}

#[test]
fn re_resolution_is_idempotent() {
    let statements = parse_program("{ var a = 1; { print a; } }");

    fn annotations(statements: &[Stmt]) -> (i32, i32, i32) {
        let Stmt::Block {
            statements: outer,
            env_size,
        } = &statements[0]
        else {
            panic!("expected a block");
        };

        let Stmt::Block { statements: inner, .. } = &outer[1] else {
            panic!("expected a nested block");
        };

        let Stmt::Print(Expr::Variable { depth, index, .. }) = &inner[0] else {
            panic!("expected a variable print");
        };

        (env_size.get(), depth.get(), index.get())
    }

    let mut first = Resolver::new();
    first.resolve(&statements).expect("first pass");
    let first_annotations = annotations(&statements);
    let first_unused = first.into_unused();

    let mut second = Resolver::new();
    second.resolve(&statements).expect("second pass");

    assert_eq!(annotations(&statements), first_annotations);
    assert_eq!(
        second.into_unused().len(),
        first_unused.len()
    );
}

#[test]
fn super_resolves_past_the_this_scope() {
    let source = "\
class A { f() { return 1; } }
class B < A { f() { return super.f; } }
B().f();";

    let (statements, _) = resolve_program(source).expect("resolves");

    let Stmt::Class { methods, .. } = &statements[1] else {
        panic!("expected a class declaration");
    };

    let Stmt::Return { value, .. } = &methods[0].body[0] else {
        panic!("expected a return");
    };

    let Some(Expr::Super { depth, .. }) = value else {
        panic!("expected `super`");
    };

    // Method body -> bound `this` frame -> synthetic `super` frame.
    assert_eq!(depth.get(), 2);
}
