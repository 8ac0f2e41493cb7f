mod common;

use treelox as lox;

use common::{parse, parse_program};
use lox::ast::{Expr, Stmt};
use lox::token::TokenType;

#[test]
fn multiplication_binds_tighter_than_addition() {
    let statements = parse_program("print 1 + 2 * 3;");

    assert_eq!(statements.len(), 1);

    let Stmt::Print(Expr::Binary {
        operator, right, ..
    }) = &statements[0]
    else {
        panic!("expected print of a binary expression, got {:?}", statements[0]);
    };

    assert_eq!(operator.token_type, TokenType::PLUS);

    assert!(matches!(
        right.as_ref(),
        Expr::Binary { operator, .. } if operator.token_type == TokenType::STAR
    ));
}

#[test]
fn power_is_right_associative() {
    let statements = parse_program("print 2 ** 3 ** 2;");

    let Stmt::Print(Expr::Binary {
        left,
        operator,
        right,
    }) = &statements[0]
    else {
        panic!("expected print of a binary expression");
    };

    assert_eq!(operator.token_type, TokenType::STAR_STAR);
    assert!(matches!(left.as_ref(), Expr::Literal(_)));
    assert!(matches!(
        right.as_ref(),
        Expr::Binary { operator, .. } if operator.token_type == TokenType::STAR_STAR
    ));
}

#[test]
fn comma_operator_parses_in_expression_statements() {
    let statements = parse_program("1, 2;");

    assert!(matches!(
        &statements[0],
        Stmt::Expression(Expr::Binary { operator, .. })
            if operator.token_type == TokenType::COMMA
    ));
}

#[test]
fn ternary_parses_after_logic_and() {
    let statements = parse_program("print 1 < 2 ? \"yes\" : \"no\";");

    assert!(matches!(
        &statements[0],
        Stmt::Print(Expr::Ternary { .. })
    ));
}

#[test]
fn assignment_to_property_becomes_set() {
    let statements = parse_program("obj.field = 1;");

    assert!(matches!(
        &statements[0],
        Stmt::Expression(Expr::Set { .. })
    ));
}

#[test]
fn invalid_assignment_target_is_an_error() {
    let (_, errors) = parse("1 = 2;");

    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("Invalid assignment target."));
}

#[test]
fn class_body_separates_methods_getters_and_statics() {
    let statements = parse_program(
        "class Shape { \
           init(w) { this.w = w; } \
           area { return this.w * this.w; } \
           class describe() { return \"shape\"; } \
         }",
    );

    let Stmt::Class {
        methods,
        class_methods,
        superclass,
        ..
    } = &statements[0]
    else {
        panic!("expected a class declaration");
    };

    assert!(superclass.is_none());
    assert_eq!(methods.len(), 2);
    assert_eq!(class_methods.len(), 1);

    let area = methods
        .iter()
        .find(|m| m.name.lexeme == "area")
        .expect("area method");

    assert!(area.is_getter());

    let init = methods
        .iter()
        .find(|m| m.name.lexeme == "init")
        .expect("init method");

    assert!(!init.is_getter());
    assert_eq!(init.arity(), 1);

    assert_eq!(class_methods[0].name.lexeme, "describe");
    assert!(!class_methods[0].is_getter());
}

#[test]
fn superclass_clause_parses_as_variable() {
    let statements = parse_program("class B < A {}");

    let Stmt::Class { superclass, .. } = &statements[0] else {
        panic!("expected a class declaration");
    };

    assert!(matches!(
        superclass,
        Some(Expr::Variable { name, .. }) if name.lexeme == "A"
    ));
}

#[test]
fn function_declarations_require_a_parameter_list() {
    let (_, errors) = parse("fun f { 1; }");

    assert!(!errors.is_empty());
    assert!(errors[0]
        .to_string()
        .contains("Expect '(' after function name."));
}

#[test]
fn more_than_eight_arguments_is_an_error() {
    let (_, errors) = parse("f(1, 2, 3, 4, 5, 6, 7, 8, 9);");

    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Cannot have more than 8 arguments."));
}

#[test]
fn more_than_eight_parameters_is_an_error() {
    let (_, errors) = parse("fun f(a, b, c, d, e, g, h, i, j) { return; }");

    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Cannot have more than 8 parameters."));
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let (_, errors) = parse("break;");

    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Cannot use 'break' outside of a loop."));
}

#[test]
fn continue_outside_a_loop_is_an_error() {
    let (_, errors) = parse("if (true) continue;");

    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .to_string()
        .contains("Cannot use 'continue' outside of a loop."));
}

#[test]
fn function_bodies_do_not_inherit_the_enclosing_loop() {
    let (_, errors) = parse("while (true) { fun f() { break; } }");

    assert!(!errors.is_empty());
    assert!(errors[0]
        .to_string()
        .contains("Cannot use 'break' outside of a loop."));
}

#[test]
fn break_and_continue_parse_inside_loops() {
    let statements = parse_program(
        "for (var a = 1; a < 10; a = a + 1) { \
           if (a < 9) { continue; } \
           break; \
         }",
    );

    assert!(matches!(&statements[0], Stmt::For { .. }));
}

#[test]
fn synchronization_recovers_at_statement_boundaries() {
    let (statements, errors) = parse("var 1; print 2;");

    // The bad declaration is reported, the next statement still parses.
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("Expect variable name."));
    assert_eq!(statements.len(), 1);
    assert!(matches!(&statements[0], Stmt::Print(_)));
}

#[test]
fn missing_close_paren_is_reported_with_line() {
    let (_, errors) = parse("(1;");

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].to_string(),
        "[line 1] Error: Expect ')' after expression."
    );
}
