use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};
use cellflow::blocks::ExpressionState;
use cellflow::{Compiler, Entry, Env, EventLoop, Library, Sheet, Store, Value, Visibility};
use clap::{Parser as ClapParser, Subcommand};

mod cells;

use cells::{Line, TestCase};

#[derive(ClapParser)]
#[command(name = "cellflow")]
#[command(about = "Evaluate sheets of named expressions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single expression and print its settled value
    Eval {
        /// Source of the expression
        code: String,
        /// JSON object whose fields become the environment
        #[arg(long)]
        env: Option<PathBuf>,
    },
    /// Evaluate a sheet and print every visible line
    Run {
        /// A `.cells` file, or a `.json` file holding serialized lines
        file: PathBuf,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
        /// JSON object whose fields become the environment
        #[arg(long)]
        env: Option<PathBuf>,
        /// Move the virtual clock by this many milliseconds instead of
        /// running until every timer fired
        #[arg(long)]
        advance_ms: Option<u64>,
    },
    /// Report syntax errors in a `.cells` file
    Check {
        file: PathBuf,
    },
    /// Run `// test:` cases and compare the last line with `// expect:`
    Test {
        /// Test files to run
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Eval { code, env } => eval(&code, env.as_deref()),
        Commands::Run {
            file,
            json,
            env,
            advance_ms,
        } => run(&file, json, env.as_deref(), advance_ms),
        Commands::Check { file } => check(&file),
        Commands::Test { files } => run_tests(&files),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Everything a sheet needs to evaluate: compiler, timers and the loop
/// settling its async results.
struct Session {
    event_loop: EventLoop,
    sheet: Sheet,
}

impl Session {
    fn new() -> Self {
        let event_loop = EventLoop::new();
        let library = Library::standard().with_timers(event_loop.timers());
        let compiler = Rc::new(Compiler::new(library));
        let sheet = Sheet::new(compiler, event_loop.spawner());
        Self { event_loop, sheet }
    }

    fn load(&self, lines: &serde_json::Value, env: Env) -> Store<Sheet> {
        Store::load(self.sheet.clone(), lines, env)
    }

    fn settle(&mut self, advance_ms: &[u64]) {
        if advance_ms.is_empty() {
            let elapsed = self.event_loop.run_until_idle();
            log::debug!("Settled after {elapsed} ms of virtual time");
            return;
        }
        for ms in advance_ms {
            self.event_loop.advance_by(*ms);
        }
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_env(path: Option<&Path>) -> Result<Env> {
    let Some(path) = path else {
        return Ok(Env::new());
    };
    let json: serde_json::Value =
        serde_json::from_str(&read(path)?).with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Env::from_json(&json).with_context(|| format!("{} must hold a JSON object", path.display()))
}

fn load_lines(path: &Path) -> Result<serde_json::Value> {
    let text = read(path)?;
    if path.extension().is_some_and(|extension| extension == "json") {
        return serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()));
    }
    Ok(cells::to_entries(&cells::parse_cells(&text)))
}

fn eval(code: &str, env: Option<&Path>) -> Result<bool> {
    let mut session = Session::new();
    let line = Line {
        name: String::new(),
        source: code.to_owned(),
    };
    let store = session.load(&cells::to_entries(&[line]), load_env(env)?);
    session.settle(&[]);
    let value = store.result();
    println!("{value}");
    Ok(!value.is_error())
}

fn run(file: &Path, json: bool, env: Option<&Path>, advance_ms: Option<u64>) -> Result<bool> {
    let mut session = Session::new();
    let store = session.load(&load_lines(file)?, load_env(env)?);
    session.settle(advance_ms.as_slice());

    let state = store.state();
    let shown = state
        .entries()
        .iter()
        .filter(|entry| entry.visibility != Visibility::Hidden);
    if json {
        let results: Vec<_> = shown
            .map(|entry| serde_json::json!({ "id": entry.id, "name": entry.name.as_ref(), "result": entry.result.to_json() }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for entry in shown {
            println!("{}", describe(entry));
        }
    }
    Ok(!state.entries().iter().any(|entry| entry.result.is_error()))
}

fn describe(entry: &Entry<ExpressionState>) -> String {
    match entry.visibility {
        Visibility::Result => entry.result.to_string(),
        _ => format!("{} = {}", entry.key(), entry.result),
    }
}

fn check(file: &Path) -> Result<bool> {
    let lines = cells::parse_cells(&read(file)?);
    let compiler = Compiler::default();
    let mut names = Env::new();
    let mut failed = 0;
    for (index, line) in lines.iter().enumerate() {
        let unit = compiler.compile(&line.source, &names);
        if let Some(error) = unit.error() {
            failed += 1;
            eprintln!("line {}: {error}", index + 1);
            if let Some(frame) = error.code_frame() {
                eprintln!("{frame}");
            }
        }
        let key = if line.name.is_empty() {
            format!("${index}")
        } else {
            line.name.clone()
        };
        names = names.with(key, Value::Undefined);
    }
    if failed == 0 {
        eprintln!("{}: {} lines ok", file.display(), lines.len());
    }
    Ok(failed == 0)
}

fn run_tests(files: &[PathBuf]) -> Result<bool> {
    let mut passed = 0;
    let mut failed = 0;
    for file in files {
        let (file_passed, file_failed) = run_test_file(file)?;
        passed += file_passed;
        failed += file_failed;
    }
    eprintln!("\n{passed} passed, {failed} failed");
    Ok(failed == 0)
}

fn run_test_file(file: &Path) -> Result<(usize, usize)> {
    let cases = cells::parse_tests(&read(file)?);
    eprintln!("{}: {} tests", file.display(), cases.len());
    let mut passed = 0;
    let mut failed = 0;
    for case in &cases {
        match run_single_test(case) {
            Ok(()) => {
                eprintln!("  ok   {}", case.name);
                passed += 1;
            }
            Err(reason) => {
                eprintln!("  FAILED {}: {reason:#}", case.name);
                failed += 1;
            }
        }
    }
    Ok((passed, failed))
}

fn run_single_test(case: &TestCase) -> Result<()> {
    let expected = case
        .expected
        .as_deref()
        .context("missing `// expect:` line")?;
    let expected: serde_json::Value =
        serde_json::from_str(expected).with_context(|| format!("`{expected}` is not JSON"))?;

    let mut session = Session::new();
    let store = session.load(&cells::to_entries(&case.lines), Env::new());
    session.settle(&case.advance_ms);
    let actual = session.sheet.last_result(&store.state());
    anyhow::ensure!(
        actual.to_json() == expected,
        "expected {expected}, got {actual}"
    );
    Ok(())
}
