// Toy Programming Language
// Bytecode compiler, stack VM with coroutines, and a tree-walk interpreter

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod vm;

use std::io::Write;

use ast::Program;
use compiler::{Chunk, Compiler};
use error::ToyResult;
use interp::Interpreter;
use lexer::Scanner;
use parser::Parser;
use vm::Vm;

/// Scan and parse a source file
pub fn parse_source(source: &str, file: &str) -> ToyResult<Program> {
    let tokens = Scanner::new(source, file).scan_tokens()?;
    Parser::new(tokens, file, source).parse()
}

/// Compile a source file to a standalone chunk
pub fn compile_source(source: &str, file: &str) -> ToyResult<Chunk> {
    let program = parse_source(source, file)?;
    Compiler::new(file, source).compile(&program)
}

/// Compile and run to completion. The finished Vm is returned so hosts
/// can inspect globals or call script functions.
pub fn run_source(source: &str, file: &str, out: impl Write + 'static) -> ToyResult<Vm> {
    let chunk = compile_source(source, file)?;
    let mut vm = Vm::new().with_output(out);
    vm.load(chunk, file, source);
    vm.run()?;
    Ok(vm)
}

/// Run more source on a live Vm, keeping every earlier binding. The
/// first entry of a fresh Vm is loaded as a whole program.
pub fn run_in(vm: &mut Vm, source: &str, file: &str) -> ToyResult<()> {
    let program = parse_source(source, file)?;
    if vm.chunk().code.is_empty() {
        let chunk = Compiler::new(file, source).compile(&program)?;
        vm.load(chunk, file, source);
    } else {
        let chunk = Compiler::continuing(file, source, vm.code_end()).compile(&program)?;
        vm.append(chunk, source)?;
    }
    vm.run()
}

/// Run a source file with the tree-walk interpreter
pub fn interpret_source(source: &str, file: &str, out: impl Write + 'static) -> ToyResult<()> {
    let program = parse_source(source, file)?;
    Interpreter::new()
        .with_output(out)
        .interpret(&program, file, source)
}
