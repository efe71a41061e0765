use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hollicode::{Error, Interpreter, Value};
use pretty_assertions::assert_eq;

const HEADER: &str = "{\"bytecodeVersion\":\"0.1.0\"}";

fn load(body: &str) -> Interpreter {
    let mut interpreter = Interpreter::new();
    interpreter
        .load_text(&format!("{HEADER}\n{body}"))
        .unwrap();
    interpreter
}

type Echoes = Arc<Mutex<Vec<Value>>>;

fn capture_echoes(interpreter: &mut Interpreter) -> Echoes {
    let echoes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&echoes);
    interpreter.on_echo(move |_, value| sink.lock().unwrap().push(value));
    echoes
}

fn capture_waits(interpreter: &mut Interpreter) -> Arc<AtomicUsize> {
    let waits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&waits);
    interpreter.on_wait(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    waits
}

#[test]
fn test_echo() {
    let mut interpreter = load("STR hi\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("hi")]);
    assert_eq!(interpreter.stack(), &[] as &[Value]);
    assert_eq!(interpreter.ip(), 2);
    assert!(interpreter.yielded());
}

#[test]
fn test_branch_taken_on_falsy() {
    // FJMP branches when the top of stack is falsy.
    let mut interpreter = load("BOOL false\nFJMP 2\nSTR A\nJMP 1\nSTR B\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("B")]);
    // FJMP peeks: the tested value stays on the stack.
    assert_eq!(interpreter.stack(), &[Value::Bool(false)]);
}

#[test]
fn test_branch_not_taken_on_truthy() {
    let mut interpreter = load("BOOL true\nFJMP 3\nSTR A\nJMP 2\nSTR B\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("A")]);
}

#[test]
fn test_subroutine_falls_off_end() {
    let mut interpreter = load("TJMP 3\nECHO\nRET\nSTR x");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    // TJMP jumped straight to the STR; the ECHO was never reached.
    assert_eq!(*echoes.lock().unwrap(), vec![] as Vec<Value>);
    assert_eq!(interpreter.stack(), &[Value::from("x")]);
    assert!(interpreter.yielded());
}

#[test]
fn test_subroutine_returns_past_traced_jump() {
    // TJMP saves its own index; RET resumes at the instruction after it.
    let mut interpreter = load("TJMP 3\nSTR after\nECHO\nRET\nSTR x\nJMP -4");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("after")]);
}

#[test]
fn test_option_selection() {
    let mut interpreter = load("STR pick\nOPT 1\nJMP 3\nSTR chose A\nECHO\nRET\nWAIT");
    let echoes = capture_echoes(&mut interpreter);
    let waits = capture_waits(&mut interpreter);

    let emitted: Arc<Mutex<Vec<Vec<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    interpreter.on_option(move |_, args| sink.lock().unwrap().push(args));

    interpreter.run().unwrap();

    assert_eq!(*emitted.lock().unwrap(), vec![vec![Value::from("pick")]]);
    assert_eq!(interpreter.options().len(), 1);
    assert_eq!(interpreter.options()[0].args, vec![Value::from("pick")]);
    assert!(interpreter.yielded());
    assert!(echoes.lock().unwrap().is_empty());

    interpreter.go_to_option(1).unwrap();
    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("chose A")]);
    assert!(interpreter.options().is_empty());
    assert_eq!(waits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_option_emission_order_matches_selection_index() {
    let body = "STR one\nOPT 1\nJMP 4\nSTR first\nECHO\nRET\n\
                STR two\nOPT 1\nJMP 4\nSTR second\nECHO\nRET\nWAIT";
    let mut interpreter = load(body);
    let echoes = capture_echoes(&mut interpreter);

    let emitted: Arc<Mutex<Vec<Vec<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    interpreter.on_option(move |_, args| sink.lock().unwrap().push(args));

    interpreter.run().unwrap();

    assert_eq!(
        *emitted.lock().unwrap(),
        vec![vec![Value::from("one")], vec![Value::from("two")]]
    );

    interpreter.go_to_option(2).unwrap();
    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("second")]);
}

#[test]
fn test_chosen_branch_is_not_reentered() {
    let mut interpreter = load("STR pick\nOPT 1\nJMP 3\nSTR chose\nECHO\nRET\nWAIT");
    let options_seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&options_seen);
    interpreter.on_option(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    interpreter.run().unwrap();
    interpreter.go_to_option(1).unwrap();
    interpreter.run().unwrap();
    interpreter.run().unwrap();

    // The OPT was dispatched once; choosing it cleared the registry and
    // resuming never re-emitted it.
    assert_eq!(options_seen.load(Ordering::SeqCst), 1);
    assert!(interpreter.options().is_empty());
}

#[test]
fn test_go_to_option_out_of_range_is_fatal() {
    let mut interpreter = load("STR pick\nOPT 1\nJMP 1\nWAIT");
    interpreter.run().unwrap();
    assert_eq!(interpreter.options().len(), 1);

    assert!(matches!(
        interpreter.go_to_option(0),
        Err(Error::OptionOutOfRange { index: 0, available: 1 })
    ));
    assert!(matches!(
        interpreter.go_to_option(2),
        Err(Error::OptionOutOfRange { index: 2, available: 1 })
    ));
}

#[test]
fn test_addition() {
    let mut interpreter = load("NUM 2\nNUM 3\nBOP +\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::Number(5.0)]);
}

#[test]
fn test_subtraction_pop_order() {
    // BOP pops left first: left = 3, right = 2, so the result is 3 - 2.
    let mut interpreter = load("NUM 2\nNUM 3\nBOP -\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::Number(1.0)]);
}

#[test]
fn test_missing_variable_is_nil() {
    let mut interpreter = load("GETV missing\nNOT\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::Bool(true)]);
}

#[test]
fn test_variable_lookup() {
    let mut interpreter = load("GETV name\nECHO");
    interpreter.set_variable("name", "Ana");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("Ana")]);
}

#[test]
fn test_nil_survives_push_pop() {
    let mut interpreter = Interpreter::new();
    interpreter.push(Value::Nil);

    assert_eq!(interpreter.pop(), Value::Nil);
    // A real nil came off the stack; no empty-pop warning was raised.
    assert!(interpreter.warnings().is_empty());
}

#[test]
fn test_popping_empty_stack_warns_and_returns_nil() {
    let mut interpreter = Interpreter::new();

    assert_eq!(interpreter.pop(), Value::Nil);
    assert_eq!(interpreter.warnings().len(), 1);
}

#[test]
fn test_pop_discards_top() {
    let mut interpreter = load("NUM 1\nNUM 2\nPOP");
    interpreter.run().unwrap();
    assert_eq!(interpreter.stack(), &[Value::Number(1.0)]);
}

#[test]
fn test_empty_program_yields_without_error() {
    let mut interpreter = load("");
    interpreter.run().unwrap();
    assert!(interpreter.yielded());
    assert_eq!(interpreter.ip(), 0);
}

#[test]
fn test_fjmp_zero_spins_in_place() {
    // FJMP 0 on a falsy top is an infinite loop: the dispatcher never
    // auto-advances. The instruction budget is the only way out.
    let mut interpreter = load("NIL\nFJMP 0");
    interpreter.set_instruction_limit(Some(50));

    let err = interpreter.run().unwrap_err();

    assert!(matches!(err, Error::InstructionLimitExceeded(50)));
    assert_eq!(interpreter.ip(), 1);
}

#[test]
fn test_backward_jump() {
    let mut interpreter = load("BOOL true\nJMP 2\nWAIT\nJMP -1");
    let waits = capture_waits(&mut interpreter);

    interpreter.run().unwrap();

    // JMP 2 skipped the WAIT, JMP -1 branched back onto it.
    assert_eq!(waits.load(Ordering::SeqCst), 1);
    assert_eq!(interpreter.ip(), 3);
}

#[test]
fn test_jump_before_start_is_fatal() {
    let mut interpreter = load("JMP -5");
    let err = interpreter.run().unwrap_err();
    assert!(matches!(
        err,
        Error::InstructionPointerOutOfRange { target: -5 }
    ));
}

#[test]
fn test_call_registered_function() {
    let mut interpreter = load("NUM 2\nNUM 3\nGETV add\nCALL 2");
    interpreter.register_function("add", |args| {
        // Arguments arrive in pop order: the last value pushed is first.
        assert_eq!(args, vec![Value::Number(3.0), Value::Number(2.0)]);
        Value::Number(args[0].as_number().unwrap() + args[1].as_number().unwrap())
    });

    interpreter.run().unwrap();

    assert_eq!(interpreter.stack(), &[Value::Number(5.0)]);
}

#[test]
fn test_function_call_callback_replaces_direct_invocation() {
    let mut interpreter = load("STR b\nSTR a\nSTR greet\nCALL 2\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    let calls: Arc<Mutex<Vec<(Value, Vec<Value>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    interpreter.on_function_call(move |vm, method, args| {
        sink.lock().unwrap().push((method, args));
        vm.push("done");
    });

    interpreter.run().unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![(
            Value::from("greet"),
            vec![Value::from("a"), Value::from("b")]
        )]
    );
    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("done")]);
}

#[test]
fn test_call_on_nil_without_callback_is_fatal() {
    let mut interpreter = load("NIL\nCALL 0");
    assert!(matches!(interpreter.run(), Err(Error::CalledNil)));
}

#[test]
fn test_call_on_non_callable_is_fatal() {
    let mut interpreter = load("NUM 1\nCALL 0");
    assert!(matches!(
        interpreter.run(),
        Err(Error::NotCallable { type_name: "number" })
    ));
}

#[test]
fn test_yield_at_function_call() {
    let mut interpreter = load("GETV f\nCALL 0\nECHO");
    interpreter.register_function("f", |_| Value::Number(7.0));
    interpreter.set_yield_at_function_call(true);
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    // The call completed and pushed its result, then execution suspended
    // before the ECHO.
    assert!(interpreter.yielded());
    assert_eq!(interpreter.stack(), &[Value::Number(7.0)]);
    assert!(echoes.lock().unwrap().is_empty());

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::Number(7.0)]);
}

#[test]
fn test_resumption_continues_past_wait() {
    let mut interpreter = load("WAIT\nSTR hi\nECHO");
    let echoes = capture_echoes(&mut interpreter);
    let waits = capture_waits(&mut interpreter);

    interpreter.run().unwrap();
    assert_eq!(waits.load(Ordering::SeqCst), 1);
    assert!(echoes.lock().unwrap().is_empty());

    interpreter.run().unwrap();
    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("hi")]);
}

#[test]
fn test_callback_can_request_yield() {
    let mut interpreter = load("STR a\nECHO\nSTR b\nECHO");

    let echoes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&echoes);
    interpreter.on_echo(move |vm, value| {
        sink.lock().unwrap().push(value);
        vm.request_yield();
    });

    interpreter.run().unwrap();
    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("a")]);

    interpreter.run().unwrap();
    assert_eq!(
        *echoes.lock().unwrap(),
        vec![Value::from("a"), Value::from("b")]
    );
}

#[test]
fn test_mismatched_operator_is_fatal() {
    let mut interpreter = load("STR a\nNUM 1\nBOP -");
    assert!(matches!(interpreter.run(), Err(Error::Type { .. })));
}

#[test]
fn test_lookup_indexes_objects() {
    let mut interpreter = load("STR name\nGETV player\nLOOK\nECHO");
    let mut player = HashMap::new();
    player.insert("name".to_string(), Value::from("Ana"));
    interpreter.set_variable("player", player);
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::from("Ana")]);
}

#[test]
fn test_lookup_missing_key_is_nil() {
    let mut interpreter = load("STR age\nGETV player\nLOOK\nECHO");
    interpreter.set_variable("player", HashMap::new());
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::Nil]);
}

#[test]
fn test_lookup_on_non_object_is_fatal() {
    let mut interpreter = load("STR name\nNUM 1\nLOOK");
    assert!(matches!(interpreter.run(), Err(Error::Type { .. })));
}

#[test]
fn test_negation() {
    let mut interpreter = load("NUM 3\nNEG\nECHO");
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::Number(-3.0)]);
}

#[test]
fn test_negating_non_number_is_fatal() {
    let mut interpreter = load("STR a\nNEG");
    assert!(matches!(interpreter.run(), Err(Error::Type { .. })));
}

#[test]
fn test_host_can_seed_the_stack() {
    let mut interpreter = load("ECHO");
    interpreter.push(Value::Number(42.0));
    let echoes = capture_echoes(&mut interpreter);

    interpreter.run().unwrap();

    assert_eq!(*echoes.lock().unwrap(), vec![Value::Number(42.0)]);
}
