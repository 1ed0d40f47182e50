// Toy CLI - Command Line Interface
// Usage: toy [FILE] [OPTIONS]

use clap::{Parser, ValueEnum};
use colored::*;
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ptree::TreeBuilder;
use toy_core::ast::{Expr, FunctionKind, Literal, LogicalOp, Program, Stmt, UnaryOp, UpdateOp};
use toy_core::compiler::{Chunk, Compiler};
use toy_core::config::VmConfig;
use toy_core::error::ToyResult;
use toy_core::interp::Interpreter;
use toy_core::lexer::{Scanner, Token};
use toy_core::parser;
use toy_core::vm::debugger::{Command, Outcome};
use toy_core::vm::{Debugger, Vm};

/// Toy - a small scripting language with coroutines
#[derive(Parser)]
#[command(name = "toy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A small dynamic scripting language with coroutines", long_about = None)]
struct Cli {
    /// Source file to run
    file: Option<PathBuf>,

    /// Print intermediate forms: tokens, ast, asm (comma-separated)
    #[arg(short = 'd', long = "debug", value_enum, value_delimiter = ',')]
    debug: Vec<DebugView>,

    /// Execute inline code
    #[arg(short = 'e', long = "exec")]
    exec: Option<String>,

    /// Run with the tree-walk interpreter instead of the VM
    #[arg(short = 'i', long = "interpret")]
    interpret: bool,

    /// Step through the compiled program
    #[arg(long = "debugger")]
    debugger: bool,

    /// Compile and print the instructions without running
    #[arg(short = 'c', long = "dump")]
    dump: bool,

    /// Scan, parse and compile, then stop
    #[arg(long = "check")]
    check: bool,

    /// VM configuration file (defaults to ./toy.json when present)
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TOY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let debug = DebugFlags::from_views(&cli.debug);

    let result = load_config(cli.config.as_deref()).and_then(|config| {
        let Some(path) = &cli.file else {
            return match &cli.exec {
                Some(code) => handle_source(code, "<exec>", debug, &config, cli.interpret),
                None => repl(&config),
            };
        };
        if let Some(code) = &cli.exec {
            return handle_source(code, "<exec>", debug, &config, cli.interpret);
        }
        match (cli.check, cli.dump, cli.debugger) {
            (true, _, _) => handle_check(path),
            (_, true, _) => handle_dump(path),
            (_, _, true) => handle_debugger(path, &config),
            _ => {
                let source = read_source(path)?;
                handle_source(&source, &display_name(path), debug, &config, cli.interpret)
            }
        }
    });

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DebugView {
    Tokens,
    Ast,
    Asm,
}

#[derive(Default, Clone, Copy)]
struct DebugFlags {
    tokens: bool,
    ast: bool,
    asm: bool,
}

impl DebugFlags {
    fn from_views(views: &[DebugView]) -> Self {
        DebugFlags {
            tokens: views.contains(&DebugView::Tokens),
            ast: views.contains(&DebugView::Ast),
            asm: views.contains(&DebugView::Asm),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn load_config(path: Option<&Path>) -> Result<VmConfig, String> {
    let config = match path {
        Some(path) => VmConfig::load(path),
        None => {
            let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
            VmConfig::discover(&cwd)
        }
    };
    config.map_err(|e| format!("{} {}", "Error:".red().bold(), e))
}

fn read_source(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading file '{}': {}", path.display(), e))
}

fn scan(source: &str, file_name: &str) -> Result<Vec<Token>, String> {
    Scanner::new(source, file_name)
        .scan_tokens()
        .map_err(|e| e.to_string())
}

fn parse(tokens: Vec<Token>, file_name: &str, source: &str) -> Result<Program, String> {
    parser::Parser::new(tokens, file_name, source)
        .parse()
        .map_err(|e| e.to_string())
}

fn compile(program: &Program, file_name: &str, source: &str) -> Result<Chunk, String> {
    Compiler::new(file_name, source)
        .compile(program)
        .map_err(|e| e.to_string())
}

fn handle_check(path: &Path) -> Result<(), String> {
    let source = read_source(path)?;
    let file_name = display_name(path);

    let tokens = scan(&source, &file_name)?;
    let program = parse(tokens, &file_name, &source)?;
    // Compiling catches misplaced break/continue/return
    compile(&program, &file_name, &source)?;

    println!("{} {} compiles", "✓".green(), path.display());
    Ok(())
}

fn handle_dump(path: &Path) -> Result<(), String> {
    let source = read_source(path)?;
    let file_name = display_name(path);

    let tokens = scan(&source, &file_name)?;
    let program = parse(tokens, &file_name, &source)?;
    let chunk = compile(&program, &file_name, &source)?;
    print!("{}", chunk.disassemble(&file_name));
    Ok(())
}

/// Run source with the VM or the interpreter, honoring debug flags
fn handle_source(
    source: &str,
    file_name: &str,
    debug: DebugFlags,
    config: &VmConfig,
    interpret: bool,
) -> Result<(), String> {
    let tokens = scan(source, file_name)?;

    if debug.tokens {
        println!("{}", "-- Tokens --".cyan());
        for token in &tokens {
            let at = token.span.start;
            println!("  {:>4}:{:<3} {:?}", at.line, at.column, token.kind);
        }
        println!();
        return Ok(());
    }

    let program = parse(tokens, file_name, source)?;

    if debug.ast {
        print_ast(&program)?;
        return Ok(());
    }

    if interpret {
        return Interpreter::new()
            .with_config(config.clone())
            .interpret(&program, file_name, source)
            .map_err(|e| e.to_string());
    }

    let chunk = compile(&program, file_name, source)?;

    if debug.asm {
        print!("{}", chunk.disassemble(file_name));
    }

    let mut vm = Vm::new().with_config(config.clone());
    vm.load(chunk, file_name, source);
    vm.run().map_err(|e| e.to_string())
}

fn handle_debugger(path: &Path, config: &VmConfig) -> Result<(), String> {
    use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};

    let source = read_source(path)?;
    let file_name = display_name(path);
    let tokens = scan(&source, &file_name)?;
    let program = parse(tokens, &file_name, &source)?;
    let chunk = compile(&program, &file_name, &source)?;

    let mut vm = Vm::new().with_config(config.clone());
    vm.load(chunk, &file_name, &source);
    let mut debugger = Debugger::new().map_err(|e| e.to_string())?;

    println!();
    println!("  {}  {}", "Toy debugger".cyan().bold(), file_name.bright_black());
    println!("  {}", "Type h for commands, q to quit".bright_black());
    println!();

    let mut report = String::new();
    debugger
        .execute(&mut vm, Command::Step(0), &mut report)
        .map_err(|e| e.to_string())?;
    print!("{}", report);

    let mut line_editor = Reedline::create();
    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic("(toy)".to_string()),
        DefaultPromptSegment::Empty,
    );

    loop {
        let line = match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => line,
            Ok(Signal::CtrlC) => continue,
            Ok(Signal::CtrlD) => break,
            Err(err) => return Err(format!("Error: {:?}", err)),
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match debugger.parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{} {}", "!".red(), message);
                continue;
            }
        };

        let mut report = String::new();
        let outcome = debugger.execute(&mut vm, command, &mut report);
        print!("{}", report);
        match outcome {
            Ok(Outcome::Paused) => {}
            Ok(Outcome::Finished) | Ok(Outcome::Quit) => break,
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(())
}

/// Dot commands understood at the start of a REPL entry
const REPL_COMMANDS: &[(&str, &str)] = &[
    (".help", "Show this help"),
    (".dump", "Show the session's instructions"),
    (".reset", "Start a fresh VM"),
    (".clear", "Clear the screen"),
    (".exit", "Leave the REPL (also .quit)"),
];

const REPL_KEYS: &[(&str, &str)] = &[
    ("Up/Down", "Walk the history"),
    ("Ctrl+R", "Search the history"),
    ("Ctrl+C", "Drop the pending entry"),
    ("Ctrl+D", "Leave the REPL"),
];

/// Unbalanced brackets or an open string mean the entry continues
fn needs_more_input(code: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut chars = code.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(_) if c == '\\' => {
                chars.next();
            }
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => depth -= 1,
                _ => {}
            },
        }
    }

    depth > 0 || quote.is_some()
}

struct ReplPrompt {
    continuing: bool,
}

impl reedline::Prompt for ReplPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed(if self.continuing { "... " } else { "toy> " })
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _: reedline::PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        search: reedline::PromptHistorySearch,
    ) -> Cow<'_, str> {
        let state = match search.status {
            reedline::PromptHistorySearchStatus::Passing => "search",
            reedline::PromptHistorySearchStatus::Failing => "no match",
        };
        Cow::Owned(format!("[{}: {}] ", state, search.term))
    }
}

/// What a dot command asks the loop to do next
enum Flow {
    Continue,
    Exit,
}

fn repl(config: &VmConfig) -> Result<(), String> {
    use reedline::{FileBackedHistory, Reedline, Signal};

    println!(
        "\n  {}  {}\n  {}\n",
        "Toy".cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Type .help for commands, .exit to quit".bright_black()
    );

    let history = FileBackedHistory::with_file(1000, history_file()).map_err(|e| e.to_string())?;
    let mut editor = Reedline::create().with_history(Box::new(history));

    // The session keeps one Vm; each entry is compiled onto the end of its code
    let mut vm = Vm::new().with_config(config.clone());
    let mut pending = String::new();

    loop {
        let prompt = ReplPrompt {
            continuing: !pending.is_empty(),
        };
        let line = match editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => line,
            Ok(Signal::CtrlC) => {
                let dropped = !pending.is_empty();
                pending.clear();
                let note = if dropped { "^C (entry dropped)" } else { "^C" };
                println!("{}", note.bright_black());
                continue;
            }
            Ok(Signal::CtrlD) => break,
            Err(err) => return Err(format!("Error: {:?}", err)),
        };

        let trimmed = line.trim();
        if pending.is_empty() {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('.') {
                match dot_command(trimmed, &mut vm, config) {
                    Flow::Continue => continue,
                    Flow::Exit => break,
                }
            }
        } else {
            pending.push('\n');
        }
        pending.push_str(&line);

        // A blank line submits whatever is pending
        if !trimmed.is_empty() && needs_more_input(&pending) {
            continue;
        }
        let entry = std::mem::take(&mut pending);
        if let Err(e) = run_repl_entry(&mut vm, entry.trim()) {
            eprintln!("{}", e);
        }
    }

    println!("{}", "bye".bright_black());
    Ok(())
}

fn dot_command(input: &str, vm: &mut Vm, config: &VmConfig) -> Flow {
    match input {
        ".exit" | ".quit" => return Flow::Exit,
        ".help" => print_repl_help(),
        ".dump" => print!("{}", vm.chunk().disassemble("<repl>")),
        ".reset" => {
            *vm = Vm::new().with_config(config.clone());
            println!("{}", "  fresh VM".bright_black());
        }
        ".clear" => {
            print!("\x1B[2J\x1B[1;1H");
            let _ = std::io::stdout().flush();
        }
        _ => println!(
            "{} Unknown command {} (try {})",
            "!".red(),
            input,
            ".help".cyan()
        ),
    }
    Flow::Continue
}

/// Compile one entry at the end of the session's code and run it
fn run_repl_entry(vm: &mut Vm, source: &str) -> ToyResult<()> {
    let mut source = source.to_string();
    if !source.ends_with(';') && !source.ends_with('}') {
        source.push(';');
    }
    toy_core::run_in(vm, &source, "<repl>")
}

fn history_file() -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    home.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toy_history")
}

fn print_repl_help() {
    for (title, rows) in [("Commands", REPL_COMMANDS), ("Keys", REPL_KEYS)] {
        println!("\n  {}", title.cyan().bold());
        for (name, what) in rows {
            println!("    {:<10} {}", name.yellow(), what);
        }
    }
    println!();
}

// ==================== AST dump ====================

fn print_ast(program: &Program) -> Result<(), String> {
    let mut tree = TreeBuilder::new("Program".to_string());
    stmt_nodes(&mut tree, &program.statements);
    ptree::print_tree(&tree.build()).map_err(|e| e.to_string())
}

/// Labelled child filled by `children`
fn branch(tree: &mut TreeBuilder, label: impl Into<String>, children: impl FnOnce(&mut TreeBuilder)) {
    tree.begin_child(label.into());
    children(tree);
    tree.end_child();
}

fn stmt_nodes(tree: &mut TreeBuilder, statements: &[Stmt]) {
    for stmt in statements {
        stmt_node(tree, stmt);
    }
}

fn expr_nodes(tree: &mut TreeBuilder, exprs: &[Expr]) {
    for expr in exprs {
        expr_node(tree, expr);
    }
}

fn stmt_node(tree: &mut TreeBuilder, stmt: &Stmt) {
    match stmt {
        Stmt::Var { bindings, .. } => {
            for binding in bindings {
                branch(tree, format!("var {}", binding.name), |t| {
                    if let Some(init) = &binding.initializer {
                        expr_node(t, init);
                    }
                });
            }
        }
        Stmt::Expression { expr, .. } => expr_node(tree, expr),
        Stmt::Block { statements, .. } => branch(tree, "block", |t| stmt_nodes(t, statements)),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => branch(tree, "if", |t| {
            expr_node(t, condition);
            branch(t, "then", |t| stmt_node(t, then_branch));
            if let Some(other) = else_branch {
                branch(t, "else", |t| stmt_node(t, other));
            }
        }),
        Stmt::While {
            condition, body, ..
        } => branch(tree, "while", |t| {
            expr_node(t, condition);
            stmt_node(t, body);
        }),
        Stmt::For {
            initializer,
            condition,
            increment,
            body,
            ..
        } => branch(tree, "for", |t| {
            if let Some(init) = initializer {
                branch(t, "init", |t| stmt_node(t, init));
            }
            if let Some(condition) = condition {
                branch(t, "test", |t| expr_node(t, condition));
            }
            if let Some(step) = increment {
                branch(t, "step", |t| expr_node(t, step));
            }
            stmt_node(t, body);
        }),
        Stmt::ForIn {
            key,
            value,
            iterable,
            body,
            ..
        } => branch(tree, format!("for {}, {} in", key, value), |t| {
            expr_node(t, iterable);
            stmt_node(t, body);
        }),
        Stmt::Function { def } => {
            let kind = match def.kind {
                FunctionKind::Function => "function",
                FunctionKind::Coroutine => "coroutine",
            };
            let label = format!("{} {}({})", kind, def.name, def.params.join(", "));
            branch(tree, label, |t| stmt_nodes(t, &def.body));
        }
        Stmt::Return { value, .. } => branch(tree, "return", |t| {
            if let Some(value) = value {
                expr_node(t, value);
            }
        }),
        Stmt::Break { .. } => {
            tree.add_empty_child("break".to_string());
        }
        Stmt::Continue { .. } => {
            tree.add_empty_child("continue".to_string());
        }
        Stmt::Empty { .. } => {
            tree.add_empty_child(";".to_string());
        }
    }
}

fn expr_node(tree: &mut TreeBuilder, expr: &Expr) {
    match expr {
        Expr::Literal { value, .. } => {
            let text = match value {
                Literal::Number(n) => n.to_string(),
                Literal::String(s) => format!("{:?}", s),
                Literal::Boolean(b) => b.to_string(),
                Literal::Null => "null".to_string(),
            };
            tree.add_empty_child(text);
        }
        Expr::Variable { name, .. } => {
            tree.add_empty_child(name.clone());
        }
        Expr::Unary { op, operand, .. } => {
            let symbol = match op {
                UnaryOp::Negate => "-",
                UnaryOp::Not => "!",
            };
            branch(tree, symbol, |t| expr_node(t, operand));
        }
        Expr::Binary {
            left, op, right, ..
        } => branch(tree, op.symbol(), |t| {
            expr_node(t, left);
            expr_node(t, right);
        }),
        Expr::Logical {
            left, op, right, ..
        } => {
            let symbol = match op {
                LogicalOp::And => "&&",
                LogicalOp::Or => "||",
            };
            branch(tree, symbol, |t| {
                expr_node(t, left);
                expr_node(t, right);
            });
        }
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
            ..
        } => branch(tree, "?:", |t| {
            expr_node(t, condition);
            expr_node(t, then_expr);
            expr_node(t, else_expr);
        }),
        Expr::Assignment {
            target, op, value, ..
        } => {
            let label = match op.binary() {
                Some(binary) => format!("{}=", binary.symbol()),
                None => "=".to_string(),
            };
            branch(tree, label, |t| {
                expr_node(t, target);
                expr_node(t, value);
            });
        }
        Expr::Update {
            target, op, prefix, ..
        } => {
            let symbol = match op {
                UpdateOp::Increment => "++",
                UpdateOp::Decrement => "--",
            };
            let label = if *prefix {
                format!("{}x", symbol)
            } else {
                format!("x{}", symbol)
            };
            branch(tree, label, |t| expr_node(t, target));
        }
        Expr::Call { callee, args, .. } => branch(tree, "call", |t| {
            expr_node(t, callee);
            expr_nodes(t, args);
        }),
        Expr::Index { object, index, .. } => branch(tree, "[]", |t| {
            expr_node(t, object);
            expr_node(t, index);
        }),
        Expr::Get {
            object, property, ..
        } => branch(tree, format!(".{}", property), |t| expr_node(t, object)),
        Expr::Array { elements, .. } => branch(tree, "array", |t| expr_nodes(t, elements)),
        Expr::Object { entries, .. } => branch(tree, "object", |t| {
            for (key, value) in entries {
                branch(t, key.clone(), |t| expr_node(t, value));
            }
        }),
        Expr::Yield { args, .. } => branch(tree, "yield", |t| expr_nodes(t, args)),
        Expr::Resume {
            coroutine, args, ..
        } => branch(tree, "resume", |t| {
            expr_node(t, coroutine);
            expr_nodes(t, args);
        }),
    }
}
