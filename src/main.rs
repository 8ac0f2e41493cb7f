use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use treelox as lox;

use clap::Parser as ClapParser;

use lox::error::LoxError;
use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::Scanner;
use lox::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Script to execute; omit to start the REPL
    scripts: Vec<PathBuf>,
}

/// One interpreter run: the pipeline plus the three error flags that decide
/// the exit code.  The interpreter (and with it the global environment)
/// persists across REPL lines; the flags do not.
struct Lox {
    interpreter: Interpreter,
    had_parse_error: bool,
    had_semantic_error: bool,
    had_runtime_error: bool,
}

impl Lox {
    fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
            had_parse_error: false,
            had_semantic_error: false,
            had_runtime_error: false,
        }
    }

    /// Scan, parse, resolve, interpret.  Each stage runs only if the ones
    /// before it were clean.
    fn run(&mut self, source: &[u8]) {
        let scanner: Scanner = Scanner::new(source);

        let mut tokens: Vec<Token> = Vec::new();

        for result in scanner {
            match result {
                Ok(token) => tokens.push(token),

                Err(e) => {
                    eprintln!("{}", e);
                    self.had_parse_error = true;
                }
            }
        }

        let mut parser: Parser = Parser::new(tokens);
        let (statements, parse_errors) = parser.parse();

        for e in &parse_errors {
            eprintln!("{}", e);
            self.had_parse_error = true;
        }

        if self.had_parse_error {
            return;
        }

        let mut resolver: Resolver = Resolver::new();

        if let Err(e) = resolver.resolve(&statements) {
            eprintln!("{}", e);
            self.had_semantic_error = true;
            return;
        }

        let unused: Vec<Token> = resolver.into_unused();

        if !unused.is_empty() {
            for token in &unused {
                eprintln!(
                    "{}",
                    LoxError::resolve(
                        token.line,
                        format!("Unused local variable '{}'.", token.lexeme),
                    )
                );
            }

            self.had_semantic_error = true;
            return;
        }

        for e in self.interpreter.interpret(&statements) {
            eprintln!("{}", e);
            self.had_runtime_error = true;
        }
    }

    fn run_file(&mut self, path: &PathBuf) -> anyhow::Result<()> {
        let source: Vec<u8> = fs::read(path)?;

        self.run(&source);

        Ok(())
    }

    fn run_prompt(&mut self) -> anyhow::Result<()> {
        let stdin = io::stdin();

        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut line: String = String::new();

            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }

            self.run(line.as_bytes());

            // A failed line must not poison the next one.
            self.had_parse_error = false;
            self.had_semantic_error = false;
            self.had_runtime_error = false;
        }

        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Cli = Cli::parse();

    if args.scripts.len() > 1 {
        eprintln!("Usage: treelox [script]");
        process::exit(64);
    }

    let mut lox: Lox = Lox::new();

    match args.scripts.first() {
        Some(script) => {
            lox.run_file(script)?;

            if lox.had_parse_error {
                process::exit(65);
            }

            if lox.had_semantic_error || lox.had_runtime_error {
                process::exit(70);
            }
        }

        None => lox.run_prompt()?,
    }

    Ok(())
}
