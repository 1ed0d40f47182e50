// End-to-end programs through the compiler and VM, and the tree-walk
// interpreter on the same sources

use toy_core::error::ErrorKind;
use toy_core::vm::SharedBuffer;
use toy_core::{interpret_source, run_source};

fn vm_output(source: &str) -> String {
    let out = SharedBuffer::new();
    if let Err(e) = run_source(source, "test.toy", out.clone()) {
        panic!("vm failed: {}", e.message);
    }
    out.contents()
}

fn interp_output(source: &str) -> String {
    let out = SharedBuffer::new();
    if let Err(e) = interpret_source(source, "test.toy", out.clone()) {
        panic!("interpreter failed: {}", e.message);
    }
    out.contents()
}

/// Run on both engines and require identical output
fn both(source: &str) -> String {
    let vm = vm_output(source);
    assert_eq!(vm, interp_output(source), "engines disagree on:\n{}", source);
    vm
}

fn vm_error(source: &str) -> toy_core::error::ToyError {
    match run_source(source, "test.toy", SharedBuffer::new()) {
        Ok(_) => panic!("expected an error from:\n{}", source),
        Err(e) => e,
    }
}

#[test]
fn fib_prints_55() {
    let source = r#"
        function fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print(fib(10));
    "#;
    assert_eq!(both(source), "55\n");
}

#[test]
fn arithmetic_and_strings() {
    let source = r#"
        print(1 + 2 * 3, (1 + 2) * 3, 7 / 2, 7 % 3, -4 + 1);
        print("ab" + "cd", "x" == "x", 1 == "1", null == null);
        print(3 < 4, 3 >= 4, !true, !0, !"text");
    "#;
    assert_eq!(
        both(source),
        "7\t9\t3.5\t1\t-3\nabcd\ttrue\tfalse\ttrue\ntrue\tfalse\tfalse\ttrue\ttrue\n"
    );
}

#[test]
fn infinities_compare_equal() {
    let source = r#"
        var inf = 1 / 0;
        print(inf == 1 / 0, inf != 1 / 0, inf == -1 / 0);
    "#;
    assert_eq!(both(source), "true\tfalse\tfalse\n");
}

#[test]
fn truthiness_is_strict() {
    let source = r#"
        if ("non-empty") print("string"); else print("not string");
        if (null) print("null"); else print("not null");
        if (2) print("number");
        if (0) print("zero"); elif (true) print("elif"); else print("else");
    "#;
    assert_eq!(both(source), "not string\nnot null\nnumber\nelif\n");
}

#[test]
fn logical_operators_short_circuit() {
    let source = r#"
        var calls = 0;
        function bump() { calls += 1; return true; }
        var a = false && bump();
        var b = true || bump();
        var c = true && bump();
        print(a, b, c, calls);
        print(1 ? "yes" : "no", 0 ? "yes" : "no");
    "#;
    assert_eq!(both(source), "false\ttrue\ttrue\t1\nyes\tno\n");
}

#[test]
fn block_scoping_and_shadowing() {
    let source = r#"
        var x = 1;
        {
            var x = 2;
            print(x);
            x = 3;
        }
        print(x);
        for (var i = 0; i < 2; i++) { var t = i * 10; print(t); }
    "#;
    assert_eq!(both(source), "2\n1\n0\n10\n");
}

#[test]
fn loops_with_break_and_continue() {
    let source = r#"
        var out = [];
        for (var i = 0; i < 4; i++) {
            for (var j = 0; j < 4; j++) {
                if (j == 1) continue;
                if (j == 3) break;
                push(out, i * 10 + j);
            }
            if (i == 2) break;
        }
        print(out);
        var n = 0;
        while (true) { n++; if (n > 5) break; }
        print(n);
    "#;
    assert_eq!(both(source), "[0, 2, 10, 12, 20, 22]\n6\n");
}

#[test]
fn for_in_walks_arrays_and_objects_in_order() {
    let source = r#"
        var xs = ["a", "b"];
        for (i, v in xs) print(i, v);
        var o = {z = 1, a: 2, "m" = 3};
        for (var k, v in o) print(k, v);
        var seen = 0;
        for (i, v in xs) { if (i == 0) push(xs, "c"); seen++; }
        print(seen, len(xs));
    "#;
    assert_eq!(both(source), "0\ta\n1\tb\nz\t1\na\t2\nm\t3\n3\t3\n");
}

#[test]
fn arrays_and_objects_share_by_reference() {
    let source = r#"
        var a = [1, [2, 3]];
        var b = a;
        b[1][0] = 9;
        var o = {inner = {n = 1}};
        var p = o.inner;
        p.n += 1;
        print(a, o.inner.n, len("hello"));
        print(pop(a));
        print(a);
    "#;
    assert_eq!(both(source), "[1, [9, 3]]\t2\t5\n[9, 3]\n[1]\n");
}

#[test]
fn update_operators() {
    let source = r#"
        var i = 5;
        var a = i++; var b = i; var c = ++i; var d = i--; var e = --i;
        print(a, b, c, d, e);
        var xs = [1];
        xs[0] += 4;
        xs[0]++;
        print(xs);
        var x = 0.1; var y = 0.7;
        print(x++, y--, x, y);
    "#;
    assert_eq!(both(source), "5\t6\t7\t7\t5\n[6]\n0.1\t0.7\t1.1\t-0.30000000000000004\n");
}

#[test]
fn arguments_are_read_at_call_time() {
    // Variables pass their own cell until the call copies them
    let source = r#"
        var k = 1;
        print(k, k = 2);
        var j = 1;
        print(j + j++);
    "#;
    assert_eq!(both(source), "2\t2\n3\n");
}

#[test]
fn functions_see_globals_but_not_callers() {
    let source = r#"
        var g = 10;
        function show() { return g; }
        function set(v) { g = v; }
        set(4);
        print(show());
        function outer() { var local = 1; function inner() { return 2; } return inner(); }
        print(outer(), typeof(outer), typeof(push));
    "#;
    assert_eq!(both(source), "4\n2\tFunction\tNative\n");
}

#[test]
fn return_from_nested_loops() {
    let source = r#"
        function find(grid, target) {
            for (r, row in grid) {
                for (c, cell in row) {
                    if (cell == target) return [r, c];
                }
            }
            return null;
        }
        print(find([[1, 2], [3, 4]], 4), find([[1]], 7));
    "#;
    assert_eq!(both(source), "[1, 1]\tnull\n");
}

#[test]
fn comments_and_escapes() {
    let source = "// line comment\n/* block\ncomment */ print(\"tab\\there\", \"q\\\"\");";
    assert_eq!(both(source), "tab\there\tq\"\n");
}

#[test]
fn type_errors_are_located() {
    let err = vm_error("var a = 1;\nvar b = a + \"x\";");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "Cannot add 'Number' and 'String'");
    assert_eq!(err.span.start.line, 2);
    assert_eq!(err.file, "test.toy");
}

#[test]
fn duplicate_var_is_rejected() {
    let err = vm_error("var a = 1; var a = 2;");
    assert_eq!(err.kind, ErrorKind::DuplicateBinding);
}

#[test]
fn undefined_variable() {
    let err = vm_error("print(nope);");
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    assert_eq!(err.message, "Undefined variable 'nope'");
}

#[test]
fn misplaced_control_flow_fails_to_compile() {
    for source in ["break;", "continue;", "return 1;", "function f() { break; }"] {
        let err = vm_error(source);
        assert_eq!(err.kind, ErrorKind::SyntaxError, "{}", source);
    }
}

#[test]
fn syntax_errors_report_position() {
    let err = vm_error("var x = ;");
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert_eq!(err.span.start.line, 1);
}

#[test]
fn interpreter_rejects_coroutines() {
    let err = interpret_source("coroutine c() { yield(1); }", "test.toy", SharedBuffer::new())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
}
