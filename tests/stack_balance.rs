// Generated programs keep main's operand stack empty between top-level
// statements, release their scopes, and print the same on both engines

use std::collections::HashSet;

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, TestCaseError};
use toy_core::vm::{SharedBuffer, Value, Vm};
use toy_core::{compile_source, interpret_source};

const PRELUDE: &str = r#"
var a = 1;
var b = 2;
var xs = [1, 2, 3];
function f(x) { return x + 1; }
function g(n) { for (i, v in xs) { if (v > n) return v; } return 0; }
"#;

const COROUTINE: &str = "coroutine co() { while (true) yield(a); }\n";

const STEP_LIMIT: usize = 5_000_000;

#[derive(Debug, Clone)]
enum Stmt {
    Assign(String),
    AddTo(String),
    Print(String, String),
    /// `break` or `continue` behind a condition, dropped outside loops
    Escape(bool, String),
    Block(String, Vec<Stmt>),
    If(String, Vec<Stmt>, Vec<Stmt>),
    For(u8, Vec<Stmt>),
    ForIn(Vec<Stmt>),
    While(u8, Vec<Stmt>),
}

fn leaf(with_co: bool) -> BoxedStrategy<String> {
    let plain = prop_oneof![
        (0u8..10).prop_map(|n| n.to_string()),
        Just("a".to_string()),
        Just("b".to_string()),
        (0u8..3).prop_map(|i| format!("xs[{}]", i)),
        Just("len(xs)".to_string()),
    ];
    if with_co {
        prop_oneof![5 => plain, 1 => Just("resume(co)".to_string())].boxed()
    } else {
        plain.boxed()
    }
}

/// Numeric expressions that cannot fail at runtime
fn expr(with_co: bool) -> BoxedStrategy<String> {
    leaf(with_co)
        .prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                (inner.clone(), prop_oneof![Just("+"), Just("-"), Just("*")], inner.clone())
                    .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r)),
                inner.clone().prop_map(|e| format!("f({})", e)),
                inner.clone().prop_map(|e| format!("g({})", e)),
                (inner.clone(), inner.clone(), inner)
                    .prop_map(|(c, t, e)| format!("({} < 3 ? {} : {})", c, t, e)),
            ]
        })
        .boxed()
}

fn stmt(with_co: bool) -> impl Strategy<Value = Stmt> {
    let e = move || expr(with_co);
    let simple = prop_oneof![
        e().prop_map(Stmt::Assign),
        e().prop_map(Stmt::AddTo),
        (e(), e()).prop_map(|(x, y)| Stmt::Print(x, y)),
        (any::<bool>(), e()).prop_map(|(brk, c)| Stmt::Escape(brk, c)),
    ];
    simple.prop_recursive(3, 24, 3, move |inner| {
        let body = prop::collection::vec(inner, 0..3);
        prop_oneof![
            (e(), body.clone()).prop_map(|(x, b)| Stmt::Block(x, b)),
            (e(), body.clone(), body.clone()).prop_map(|(c, t, f)| Stmt::If(c, t, f)),
            (1u8..4, body.clone()).prop_map(|(k, b)| Stmt::For(k, b)),
            body.clone().prop_map(Stmt::ForIn),
            (1u8..4, body).prop_map(|(k, b)| Stmt::While(k, b)),
        ]
    })
}

fn program(with_co: bool) -> impl Strategy<Value = String> {
    prop::collection::vec(stmt(with_co), 1..6).prop_map(move |stmts| {
        let mut source = String::from(PRELUDE);
        if with_co {
            source.push_str(COROUTINE);
        }
        render(&stmts, false, &mut source);
        source
    })
}

fn render(stmts: &[Stmt], in_loop: bool, out: &mut String) {
    for stmt in stmts {
        render_stmt(stmt, in_loop, out);
    }
}

fn render_stmt(stmt: &Stmt, in_loop: bool, out: &mut String) {
    match stmt {
        Stmt::Assign(e) => out.push_str(&format!("a = {};\n", e)),
        Stmt::AddTo(e) => out.push_str(&format!("b += {};\n", e)),
        Stmt::Print(x, y) => out.push_str(&format!("print({}, {});\n", x, y)),
        Stmt::Escape(brk, c) if in_loop => {
            let word = if *brk { "break" } else { "continue" };
            out.push_str(&format!("if ({} < 2) {};\n", c, word));
        }
        Stmt::Escape(..) => out.push_str(";\n"),
        Stmt::Block(e, body) => {
            out.push_str(&format!("{{ var t = {};\n", e));
            render(body, in_loop, out);
            out.push_str("}\n");
        }
        Stmt::If(c, then_body, else_body) => {
            out.push_str(&format!("if ({} < 4) {{\n", c));
            render(then_body, in_loop, out);
            out.push_str("} else {\n");
            render(else_body, in_loop, out);
            out.push_str("}\n");
        }
        Stmt::For(k, body) => {
            out.push_str(&format!("for (var i = 0; i < {}; i++) {{\n", k));
            render(body, true, out);
            out.push_str("}\n");
        }
        Stmt::ForIn(body) => {
            out.push_str("for (k, v in xs) {\n");
            render(body, true, out);
            out.push_str("}\n");
        }
        Stmt::While(k, body) => {
            out.push_str(&format!("{{ var n = 0; while (n < {}) {{ n++;\n", k));
            render(body, true, out);
            out.push_str("} }\n");
        }
    }
}

/// Step the program, checking main's stack at every top-level statement
fn run_balanced(source: &str) -> Result<(Vm, String), TestCaseError> {
    let chunk = compile_source(source, "prop.toy")
        .map_err(|e| TestCaseError::fail(format!("{}\n{}", e.format(), source)))?;
    let starts: HashSet<usize> = chunk.statement_starts.iter().copied().collect();
    let out = SharedBuffer::new();
    let mut vm = Vm::new().with_output(out.clone());
    vm.load(chunk, "prop.toy", source);

    let mut steps = 0;
    while !vm.is_finished() {
        if vm.is_main_current() && starts.contains(&vm.main_ip()) {
            prop_assert_eq!(vm.main_stack_len(), 0, "at {} in\n{}", vm.main_ip(), source);
        }
        vm.step()
            .map_err(|e| TestCaseError::fail(format!("{}\n{}", e.format(), source)))?;
        steps += 1;
        prop_assert!(steps < STEP_LIMIT, "runaway program\n{}", source);
    }
    prop_assert_eq!(vm.main_stack_len(), 0);
    Ok((vm, out.contents()))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64, max_shrink_iters: 200, .. ProptestConfig::default()
    })]

    #[test]
    fn main_stack_is_empty_between_statements(source in program(true)) {
        let (vm, _) = run_balanced(&source)?;
        // The global scope, plus the parameter scope of a started coroutine
        let started = match vm.global("co") {
            Some(Value::Coroutine(co)) => !co.state.borrow().is_fresh(),
            other => return Err(TestCaseError::fail(format!("co is {:?}", other))),
        };
        prop_assert_eq!(vm.scopes().live(), 1 + usize::from(started));
    }

    #[test]
    fn engines_print_the_same(source in program(false)) {
        let (vm, vm_out) = run_balanced(&source)?;
        prop_assert_eq!(vm.scopes().live(), 1);

        let out = SharedBuffer::new();
        interpret_source(&source, "prop.toy", out.clone())
            .map_err(|e| TestCaseError::fail(format!("{}\n{}", e.format(), source)))?;
        prop_assert_eq!(vm_out, out.contents(), "engines disagree on\n{}", source);
    }
}
