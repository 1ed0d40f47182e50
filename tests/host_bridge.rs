// Embedding: host natives, host calls into scripts, REPL-style
// continuation and configuration

use toy_core::config::VmConfig;
use toy_core::error::ErrorKind;
use toy_core::vm::{NativeCall, SharedBuffer, Value, Vm};
use toy_core::{compile_source, run_in, run_source};

#[test]
fn host_calls_script_functions() {
    let source = r#"
        function fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        function greet(name) { return "hi " + name; }
    "#;
    let mut vm = run_source(source, "host.toy", SharedBuffer::new()).unwrap();
    assert_eq!(vm.call("fib", &[Value::Number(10.0)]).unwrap(), Value::Number(55.0));
    assert_eq!(
        vm.call("greet", &[Value::string("toy")]).unwrap(),
        Value::string("hi toy")
    );
    assert_eq!(vm.main_stack_len(), 0);
    assert_eq!(vm.scopes().live(), 1);
}

#[test]
fn host_calls_can_reach_natives() {
    let mut vm = run_source("var xs = [1, 2];", "host.toy", SharedBuffer::new()).unwrap();
    let xs = vm.global("xs").unwrap();
    vm.call("push", &[xs.clone(), Value::Number(3.0)]).unwrap();
    assert_eq!(xs.to_string(), "[1, 2, 3]");
    assert_eq!(vm.call("typeof", &[xs]).unwrap(), Value::string("Array"));
}

#[test]
fn calling_unknown_or_uncallable_names_fails() {
    let mut vm = run_source("var n = 3;", "host.toy", SharedBuffer::new()).unwrap();
    assert_eq!(vm.call("missing", &[]).unwrap_err().kind, ErrorKind::UndefinedVariable);
    assert_eq!(vm.call("n", &[]).unwrap_err().kind, ErrorKind::InvalidCall);
}

#[test]
fn host_calls_drive_coroutines() {
    let source = r#"
        coroutine counter() {
            var n = 0;
            while (true) { n++; yield(n); }
        }
        function tick() { return resume(counter); }
    "#;
    let mut vm = run_source(source, "host.toy", SharedBuffer::new()).unwrap();
    assert_eq!(vm.call("tick", &[]).unwrap(), Value::Number(1.0));
    assert_eq!(vm.call("tick", &[]).unwrap(), Value::Number(2.0));
    assert_eq!(vm.main_stack_len(), 0);
}

#[test]
fn script_errors_surface_from_host_calls() {
    let mut vm = run_source(
        "function fail(x) { return x + true; }",
        "host.toy",
        SharedBuffer::new(),
    )
    .unwrap();
    let err = vm.call("fail", &[Value::Number(1.0)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.stack_trace[0].function_name, "fail");
    assert_eq!(err.stack_trace[1].function_name, "<host>");
}

#[test]
fn a_failed_host_call_leaves_the_vm_reusable() {
    let source = r#"
        function inner(xs) {
            for (var i, v in xs) { var bad = v + true; }
        }
        function outer() {
            var a = 1;
            { var b = 2; return inner([1, 2]); }
        }
        function ok(n) { return n * 2; }
    "#;
    let mut vm = run_source(source, "host.toy", SharedBuffer::new()).unwrap();
    let err = vm.call("outer", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(vm.main_stack_len(), 0);
    assert_eq!(vm.scopes().live(), 1);
    assert!(vm.is_main_current());

    assert_eq!(vm.call("ok", &[Value::Number(21.0)]).unwrap(), Value::Number(42.0));
    assert_eq!(vm.main_stack_len(), 0);
    assert_eq!(vm.scopes().live(), 1);
}

#[test]
fn a_coroutine_failing_under_a_host_call_is_dead() {
    let source = r#"
        coroutine g() { var z = 1 + true; }
        function drive() { return resume(g); }
        function ok(n) { return n + 1; }
    "#;
    let mut vm = run_source(source, "host.toy", SharedBuffer::new()).unwrap();
    let err = vm.call("drive", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(vm.is_main_current());
    assert_eq!(vm.main_stack_len(), 0);
    assert_eq!(vm.scopes().live(), 1);

    let g = vm.global("g").unwrap();
    assert_eq!(vm.call("costatus", &[g]).unwrap(), Value::string("dead"));
    assert_eq!(vm.call("ok", &[Value::Number(1.0)]).unwrap(), Value::Number(2.0));
    assert_eq!(vm.main_stack_len(), 0);
}

#[test]
fn registered_natives_are_callable_from_scripts() {
    let source = "print(host_add(2, 3), host_pair());";
    let out = SharedBuffer::new();
    let mut vm = Vm::new().with_output(out.clone());
    vm.register_native("host_add", |call: &mut NativeCall| {
        let sum = call.number(0)? + call.number(1)?;
        call.push(Value::Number(sum))?;
        Ok(1)
    })
    .unwrap();
    vm.register_native("host_pair", |call: &mut NativeCall| {
        call.push(Value::string("a"))?;
        call.push(Value::Boolean(false))?;
        Ok(2)
    })
    .unwrap();
    vm.load(compile_source(source, "host.toy").unwrap(), "host.toy", source);
    vm.run().unwrap();
    assert_eq!(out.contents(), "5\t[a, false]\n");
}

#[test]
fn native_errors_are_located_in_the_script() {
    let source = "var x = 1;\nhost_fail();";
    let mut vm = Vm::new().with_output(SharedBuffer::new());
    vm.register_native("host_fail", |_: &mut NativeCall| {
        Err(toy_core::error::ToyError::runtime_error("host refused"))
    })
    .unwrap();
    vm.load(compile_source(source, "host.toy").unwrap(), "host.toy", source);
    let err = vm.run().unwrap_err();
    assert_eq!(err.message, "host refused");
    assert_eq!(err.span.start.line, 2);
    assert_eq!(err.file, "host.toy");
}

#[test]
fn duplicate_native_names_are_rejected() {
    let mut vm = Vm::new();
    vm.register_native("host_only", |_: &mut NativeCall| Ok(0)).unwrap();
    let err = vm.register_native("push", |_: &mut NativeCall| Ok(0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateBinding);
}

#[test]
fn continuation_keeps_state_across_entries() {
    let out = SharedBuffer::new();
    let mut vm = Vm::new().with_output(out.clone());
    run_in(&mut vm, "var total = 1; function add(n) { total += n; }", "repl").unwrap();
    run_in(&mut vm, "add(4);", "repl").unwrap();
    run_in(&mut vm, "print(total, len(\"abc\"));", "repl").unwrap();
    assert_eq!(out.contents(), "5\t3\n");

    // A failed entry leaves earlier bindings intact
    let err = run_in(&mut vm, "print(nope);", "repl").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    run_in(&mut vm, "print(total);", "repl").unwrap();
    assert_eq!(out.contents(), "5\t3\n5\n");
    assert_eq!(vm.main_stack_len(), 0);
}

#[test]
fn call_depth_is_configurable() {
    let source = "function down(n) { if (n == 0) return 0; return down(n - 1); }";
    let chunk = compile_source(source, "host.toy").unwrap();
    let mut vm = Vm::new().with_config(VmConfig {
        max_call_depth: 20,
        ..VmConfig::default()
    });
    vm.load(chunk, "host.toy", source);
    vm.run().unwrap();
    assert_eq!(vm.call("down", &[Value::Number(10.0)]).unwrap(), Value::Number(0.0));
    let err = vm.call("down", &[Value::Number(30.0)]).unwrap_err();
    assert_eq!(err.message, "Stack overflow");
}
