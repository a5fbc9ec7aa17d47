//! Expression compiler
//!
//! Turns the source of one cell into a `CompiledUnit`: the free variables the
//! cell reads, the slice of them the environment actually provides, and an
//! executable program taking exactly that slice as parameters.

use crate::env::Env;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{Frame, execute};
use crate::library::Library;
use crate::parser::{
    Analysis, Input, ParseError, Parser, Span, Spanned, Statement, Token, lexer, parser,
    resolve_scopes,
};
use crate::promise::Promise;
use crate::value::Value;
use futures::FutureExt;
use lru::LruCache;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::rc::Rc;

pub(crate) mod lower;
mod report;

use lower::{Program, lower};

const FILENAME: &str = "cell";
const CACHE_CAPACITY: usize = 512;

type UnitKey = (Rc<str>, Vec<Rc<str>>);

pub struct Compiler {
    library: Library,
    analyses: RefCell<LruCache<Rc<str>, Rc<EvalResult<Analysis>>>>,
    units: RefCell<LruCache<UnitKey, Rc<CompiledUnit>>>,
}

impl Compiler {
    pub fn new(library: Library) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            library,
            analyses: RefCell::new(LruCache::new(capacity)),
            units: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Compiles `source` against the names `env` offers. Only the free
    /// variables of the source are looked up, so the cost does not grow with
    /// the size of the environment.
    ///
    /// Never fails: a broken source compiles into a unit that evaluates to
    /// its `SyntaxError`.
    pub fn compile(&self, source: &str, env: &Env) -> Rc<CompiledUnit> {
        if source.trim().is_empty() {
            return Rc::new(CompiledUnit::new(source, Rc::default(), false, Body::Noop));
        }

        let analysis = self.analyze(source);
        let analysis = match analysis.as_ref() {
            Ok(analysis) => analysis,
            Err(error) => {
                return Rc::new(CompiledUnit::new(
                    source,
                    Rc::default(),
                    false,
                    Body::Failed(Rc::new(error.clone())),
                ));
            }
        };

        let used: Vec<Rc<str>> = analysis
            .free_variables
            .iter()
            .filter(|name| env.contains(name.as_str()))
            .map(|name| Rc::from(name.as_str()))
            .collect();

        let key: UnitKey = (Rc::from(source), used);
        if let Some(unit) = self.units.borrow_mut().get(&key) {
            return unit.clone();
        }

        log::debug!("Compiling cell `{source}` with parameters {:?}", key.1);
        let body = match parse_statements(source, |statements| {
            Ok(lower(statements, &key.1, &self.library))
        }) {
            Ok(program) => Body::Program(Rc::new(program)),
            Err(error) => Body::Failed(Rc::new(error)),
        };
        let unit = Rc::new(CompiledUnit::new(
            source,
            Rc::new(analysis.free_variables.clone()),
            analysis.is_async,
            body,
        ));
        self.units.borrow_mut().put(key, unit.clone());
        unit
    }

    fn analyze(&self, source: &str) -> Rc<EvalResult<Analysis>> {
        if let Some(analysis) = self.analyses.borrow_mut().get(source) {
            return analysis.clone();
        }
        let analysis = Rc::new(parse_statements(source, |statements| {
            resolve_scopes(statements).map_err(|errors| {
                let mut errors = errors.into_iter();
                match errors.next() {
                    Some(error) => syntax_error(source, &error),
                    None => EvalError::Syntax {
                        message: "invalid scope".to_owned(),
                        span: 0..source.len(),
                        frame: String::new(),
                    },
                }
            })
        }));
        self.analyses
            .borrow_mut()
            .put(Rc::from(source), analysis.clone());
        analysis
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Library::standard())
    }
}

/// Lexes and parses `source`, then hands the statements to `visit`.
///
/// The statements borrow the token buffer, so everything that needs the AST
/// happens inside `visit`.
fn parse_statements<R>(
    source: &str,
    visit: impl FnOnce(&[Spanned<Statement<'_>>]) -> EvalResult<R>,
) -> EvalResult<R> {
    let (tokens, errors) = lexer().parse(source).into_output_errors();
    if let Some(error) = errors.first() {
        return Err(syntax_error(source, error));
    }
    let Some(mut tokens) = tokens else {
        return Err(incomplete(source));
    };

    tokens.retain(|spanned_token| !matches!(spanned_token.node, Token::Comment(_)));

    let (statements, errors) = parser()
        .parse(tokens.map(
            Span::from(source.len()..source.len()),
            |Spanned { node, span }| (node, span),
        ))
        .into_output_errors();
    if let Some(error) = errors.first() {
        return Err(syntax_error(source, error));
    }
    let Some(statements) = statements else {
        return Err(incomplete(source));
    };
    visit(&statements)
}

fn syntax_error<T: fmt::Display>(source: &str, error: &ParseError<'_, T>) -> EvalError {
    let span = error.span().into_range();
    let message = error.to_string();
    let frame = report::code_frame(
        FILENAME,
        source,
        span.clone(),
        &message,
        &error.reason().to_string(),
    );
    EvalError::Syntax {
        message,
        span,
        frame,
    }
}

fn incomplete(source: &str) -> EvalError {
    EvalError::Syntax {
        message: "incomplete input".to_owned(),
        span: source.len()..source.len(),
        frame: String::new(),
    }
}

enum Body {
    Noop,
    Failed(Rc<EvalError>),
    Program(Rc<Program>),
}

/// Executable form of one cell plus the names it depends on.
pub struct CompiledUnit {
    source: Rc<str>,
    free_variables: Rc<BTreeSet<String>>,
    is_async: bool,
    body: Body,
}

impl CompiledUnit {
    fn new(
        source: &str,
        free_variables: Rc<BTreeSet<String>>,
        is_async: bool,
        body: Body,
    ) -> Self {
        Self {
            source: source.into(),
            free_variables,
            is_async,
            body,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every name the cell reads without binding it, whether or not the
    /// environment provides it.
    pub fn free_variables(&self) -> &Rc<BTreeSet<String>> {
        &self.free_variables
    }

    /// The names read from the environment, sorted. They fill the first
    /// slots of the program's top frame.
    pub fn used_names(&self) -> &[Rc<str>] {
        match &self.body {
            Body::Program(program) => program.parameters.as_slice(),
            Body::Noop | Body::Failed(_) => &[],
        }
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn error(&self) -> Option<&EvalError> {
        match &self.body {
            Body::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Runs the cell. Errors come back as `Value::Error`.
    pub fn run(&self, env: &Env) -> Value {
        self.run_unsafe(env).unwrap_or_else(Value::error)
    }

    pub fn run_unsafe(&self, env: &Env) -> EvalResult<Value> {
        let program = match &self.body {
            Body::Noop => return Ok(Value::Undefined),
            Body::Failed(error) => return Err((**error).clone()),
            Body::Program(program) => program,
        };

        let mut slots = Vec::with_capacity(program.frame_size);
        for name in &program.parameters {
            let value = env.get(name).cloned().unwrap_or_default();
            if value.is_pending() {
                return Ok(Value::Pending);
            }
            slots.push(Some(value));
        }
        slots.resize(program.frame_size, None);
        let frame = Frame::new(slots, None);

        if self.is_async {
            let program = program.clone();
            return Ok(Value::Promise(Promise::new(async move {
                execute(&program, &frame).await
            })));
        }
        match execute(program, &frame).now_or_never() {
            Some(Ok(Value::Error(error))) => Err((*error).clone()),
            Some(result) => result,
            None => Err(EvalError::Suspended),
        }
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("source", &self.source)
            .field("used", &self.used_names())
            .field("is_async", &self.is_async)
            .finish()
    }
}
