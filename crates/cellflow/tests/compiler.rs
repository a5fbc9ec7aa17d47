use cellflow::{Compiler, Env, EvalError, Library, Value};
use pretty_assertions::assert_eq;

fn env(bindings: &[(&str, Value)]) -> Env {
    bindings.iter().map(|(name, value)| (*name, value.clone())).collect()
}

fn names(names: &[&str]) -> Env {
    names.iter().map(|name| (*name, Value::Undefined)).collect()
}

fn free_variables(source: &str) -> Vec<String> {
    Compiler::default()
        .compile(source, &Env::new())
        .free_variables()
        .iter()
        .cloned()
        .collect()
}

#[test]
fn free_variables_exclude_bound_names() {
    assert_eq!(free_variables("let y = x * 2; y + z"), ["x", "z"]);
    assert_eq!(free_variables("(a, b) => a + b + c"), ["c"]);
    assert_eq!(free_variables("{ total, n: count }"), ["count", "total"]);
    assert_eq!(free_variables("// just a comment"), Vec::<String>::new());
}

#[test]
fn run_reads_only_the_used_slice() {
    let compiler = Compiler::default();
    let unit = compiler.compile("price * quantity", &names(&["price", "quantity", "unrelated"]));
    let result = unit.run(&env(&[
        ("price", Value::Number(2.5)),
        ("quantity", Value::Number(4.0)),
        ("unrelated", Value::Pending),
    ]));
    assert_eq!(result, Value::Number(10.0));
}

#[test]
fn pending_input_short_circuits() {
    let compiler = Compiler::default();
    let unit = compiler.compile("error('never evaluated') + a", &names(&["a"]));
    assert_eq!(unit.run(&env(&[("a", Value::Pending)])), Value::Pending);
}

#[test]
fn run_never_fails() {
    let compiler = Compiler::default();
    for source in [
        "1 +",
        "undefined.x",
        "'a' * 2",
        "(1)(2)",
        "error('custom')",
        "x => await x",
        "let f = n => f(n + 1); f(0)",
    ] {
        let result = compiler.compile(source, &Env::new()).run(&Env::new());
        assert!(result.is_error(), "{source} gave {result:?}");
    }
}

#[test]
fn runaway_recursion_is_a_range_error() {
    let compiler = Compiler::default();
    let error = compiler
        .compile("let f = n => f(n + 1); f(0)", &Env::new())
        .run_unsafe(&Env::new())
        .unwrap_err();
    assert!(matches!(error, EvalError::CallDepth(_)), "{error:?}");
    assert!(error.to_string().starts_with("RangeError"));

    // The depth is released again once the failed call unwinds
    let unit = compiler.compile("let count = n => n <= 0 ? 0 : 1 + count(n - 1); count(50)", &Env::new());
    assert_eq!(unit.run(&Env::new()), Value::Number(50.0));
}

#[test]
fn lambdas_only_see_earlier_lets() {
    let compiler = Compiler::default();
    let unit = compiler.compile("let g = () => y; let y = 2; g()", &Env::new());
    assert_eq!(unit.run(&Env::new()).to_string(), "ReferenceError: y is not defined");
    assert_eq!(
        unit.run(&env(&[("y", Value::Number(5.0))])),
        Value::Number(5.0),
        "the environment still provides a `y` the lambda can read"
    );
}

#[test]
fn syntax_errors_carry_a_code_frame() {
    let compiler = Compiler::default();
    let unit = compiler.compile("let total = (1 + ", &Env::new());
    let error = unit.run_unsafe(&Env::new()).unwrap_err();
    let EvalError::Syntax { span, frame, .. } = &error else {
        panic!("Expected a syntax error, got {error:?}");
    };
    assert!(span.start <= "let total = (1 + ".len());
    assert!(frame.contains("let total = (1 +"));
    assert_eq!(error.code_frame(), Some(frame.as_str()));
}

#[test]
fn await_inside_lambda_is_rejected() {
    let compiler = Compiler::default();
    let unit = compiler.compile("let f = () => await 1; f()", &Env::new());
    let error = unit.run_unsafe(&Env::new()).unwrap_err();
    assert!(error.to_string().contains("top level"), "{error}");
}

#[test]
fn library_is_explicit() {
    let bare = Compiler::new(Library::new());
    assert_eq!(
        bare.compile("abs(-1)", &Env::new()).run(&Env::new()).to_string(),
        "ReferenceError: abs is not defined"
    );

    let custom = Compiler::new(Library::new().with("answer", Value::Number(42.0)));
    assert_eq!(custom.compile("answer", &Env::new()).run(&Env::new()), Value::Number(42.0));
}

#[test]
fn language_tour() {
    let compiler = Compiler::default();
    let cases = [
        ("1 + 2 * 3", "7"),
        ("(1 + 2) * 3", "9"),
        ("7 % 4", "3"),
        ("'n = ' + 2", "n = 2"),
        ("[1, 2, 3].length", "3"),
        ("{a: 1, 'b c': 2}['b c']", "2"),
        ("1 < 2 && 'yes' || 'no'", "yes"),
        ("null || 'fallback'", "fallback"),
        ("!0", "true"),
        ("[1, 2] == [1, 2]", "true"),
        ("3 > 2 ? 'big' : 'small'", "big"),
        ("map(range(4), x => x * x)", "[0, 1, 4, 9]"),
        ("filter([1, 2, 3, 4], (x, i) => i % 2 == 0)", "[1, 3]"),
        ("reduce([1, 2, 3], (sum, x) => sum + x, 10)", "16"),
        ("let add = a => b => a + b; add(2)(3)", "5"),
        ("join(split('a-b-c', '-'), '+')", "a+b+c"),
        ("let missing = (a, b) => b; missing(1)", "undefined"),
        ("'tab\\there'", "tab\there"),
        ("1e3 / 4", "250"),
        ("let x = 1", "undefined"),
    ];
    for (source, expected) in cases {
        assert_eq!(
            compiler.compile(source, &Env::new()).run(&Env::new()).to_string(),
            expected,
            "{source}"
        );
    }
}
