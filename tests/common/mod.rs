//! Shared pipeline plumbing for the integration suites.
#![allow(dead_code)]

use std::cell::RefCell;
use std::io;
use std::io::Write;
use std::rc::Rc;

use treelox as lox;

use lox::ast::Stmt;
use lox::error::LoxError;
use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::Scanner;
use lox::token::Token;

/// A clonable in-memory sink so a test can hand the interpreter a writer and
/// still read what `print` produced afterwards.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn scan(source: &str) -> Vec<Token> {
    Scanner::new(source.as_bytes())
        .filter_map(Result::ok)
        .collect()
}

pub fn parse(source: &str) -> (Vec<Stmt>, Vec<LoxError>) {
    let mut parser: Parser = Parser::new(scan(source));

    parser.parse()
}

/// Parses, asserting the program is syntactically clean.
pub fn parse_program(source: &str) -> Vec<Stmt> {
    let (statements, errors) = parse(source);

    assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);

    statements
}

/// Parses and resolves; returns the annotated program plus the unused-local
/// tokens.
pub fn resolve_program(source: &str) -> Result<(Vec<Stmt>, Vec<Token>), LoxError> {
    let statements: Vec<Stmt> = parse_program(source);

    let mut resolver: Resolver = Resolver::new();
    resolver.resolve(&statements)?;

    Ok((statements, resolver.into_unused()))
}

/// Full pipeline; returns everything `print` wrote.  Panics on any error.
pub fn run(source: &str) -> String {
    let (statements, unused) = resolve_program(source).expect("resolve error");

    assert!(unused.is_empty(), "unused locals: {:?}", unused);

    let buffer: SharedBuffer = SharedBuffer::default();
    let mut interpreter: Interpreter = Interpreter::with_writer(Box::new(buffer.clone()));

    let errors: Vec<LoxError> = interpreter.interpret(&statements);

    assert!(errors.is_empty(), "runtime errors: {:?}", errors);

    buffer.contents()
}

/// Full pipeline for programs expected to fail at runtime; returns the
/// runtime errors in source order.
pub fn run_expecting_errors(source: &str) -> Vec<LoxError> {
    let (statements, _) = resolve_program(source).expect("resolve error");

    let buffer: SharedBuffer = SharedBuffer::default();
    let mut interpreter: Interpreter = Interpreter::with_writer(Box::new(buffer.clone()));

    interpreter.interpret(&statements)
}
