//! Tree-walking evaluator over lowered programs.
//!
//! Everything runs synchronously except a top-level `await`, which suspends the
//! program on its promise. Function bodies never await, so calling a closure
//! always completes in a single poll.

use crate::compiler::lower::{Instruction, LambdaCode, Node, Program};
use crate::error::{EvalError, EvalResult};
use crate::promise::Settled;
use crate::value::{Arguments, Function, Value};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

mod operators;
use operators::{Operand, check};

/// Nested closure calls allowed before a call fails with a `RangeError`.
/// Every level costs native stack.
pub(crate) const MAX_CALL_DEPTH: usize = 100;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Counts one active closure call for as long as it lives.
struct CallGuard;

impl CallGuard {
    fn enter() -> EvalResult<Self> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(EvalError::CallDepth(MAX_CALL_DEPTH));
            }
            depth.set(depth.get() + 1);
            Ok(CallGuard)
        })
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Slots of one activation: the top level of a cell or one closure call.
pub(crate) struct Frame {
    slots: RefCell<Vec<Option<Value>>>,
    parent: Option<Rc<Frame>>,
}

impl Frame {
    pub(crate) fn new(slots: Vec<Option<Value>>, parent: Option<Rc<Frame>>) -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(slots),
            parent,
        })
    }

    fn read(&self, depth: usize, slot: usize, name: &str) -> EvalResult<Value> {
        let mut frame = self;
        for _ in 0..depth {
            frame = frame.parent.as_deref().ok_or_else(|| EvalError::Reference {
                name: name.to_owned(),
            })?;
        }
        let slots = frame.slots.borrow();
        match slots.get(slot) {
            Some(Some(value)) => Ok(value.clone()),
            _ => Err(EvalError::Uninitialized {
                name: name.to_owned(),
            }),
        }
    }

    fn write(&self, slot: usize, value: Value) {
        if let Some(target) = self.slots.borrow_mut().get_mut(slot) {
            *target = Some(value);
        }
    }
}

pub struct Closure {
    code: Rc<LambdaCode>,
    frame: Rc<Frame>,
}

impl Closure {
    pub fn arity(&self) -> usize {
        self.code.arity
    }

    fn enter(&self, arguments: Arguments) -> Rc<Frame> {
        let mut slots: Vec<Option<Value>> = arguments
            .into_iter()
            .take(self.code.arity)
            .map(Some)
            .collect();
        slots.resize(self.code.arity, Some(Value::Undefined));
        Frame::new(slots, Some(self.frame.clone()))
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Closure(arity: {})", self.code.arity)
    }
}

/// Calls a function value synchronously. Natives use this to invoke callbacks.
pub fn call_function(callee: &Value, arguments: Arguments) -> EvalResult<Value> {
    match callee {
        Value::Function(Function::Native(native)) => native.call(arguments),
        Value::Function(Function::Closure(closure)) => {
            let _guard = CallGuard::enter()?;
            let frame = closure.enter(arguments);
            evaluate(&closure.code.body, &frame)
                .now_or_never()
                .unwrap_or(Err(EvalError::Suspended))
        }
        Value::Error(error) => Err((**error).clone()),
        other => Err(EvalError::type_error(format!(
            "{} is not a function",
            other.type_name()
        ))),
    }
}

/// Runs a program in `frame`. The value of a cell is the value of its last
/// statement when that statement is an expression.
pub(crate) async fn execute(program: &Program, frame: &Rc<Frame>) -> EvalResult<Value> {
    let mut result = Value::Undefined;
    for instruction in &program.instructions {
        match instruction {
            Instruction::Let { slot, value } => {
                let value = evaluate(value, frame).await?;
                frame.write(*slot, value);
                result = Value::Undefined;
            }
            Instruction::Evaluate(node) => {
                result = evaluate(node, frame).await?;
            }
        }
    }
    Ok(result)
}

pub(crate) fn evaluate<'a>(node: &'a Node, frame: &'a Rc<Frame>) -> LocalBoxFuture<'a, EvalResult<Value>> {
    async move {
        match node {
            Node::Constant(value) => Ok(value.clone()),
            Node::Local { depth, slot, name } => frame.read(*depth, *slot, name),
            Node::Unbound(name) => Err(EvalError::Reference {
                name: name.to_string(),
            }),
            Node::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(evaluate(item, frame).await?);
                }
                Ok(Value::List(Rc::new(values)))
            }
            Node::Record(fields) => {
                let mut values = crate::value::Record::with_capacity(fields.len());
                for (name, value) in fields {
                    values.insert(name.clone(), evaluate(value, frame).await?);
                }
                Ok(Value::Record(Rc::new(values)))
            }
            Node::Lambda(code) => Ok(Value::Function(Function::Closure(Rc::new(Closure {
                code: code.clone(),
                frame: frame.clone(),
            })))),
            Node::Call { callee, arguments } => {
                let callee = evaluate(callee, frame).await?;
                let mut values = Arguments::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(evaluate(argument, frame).await?);
                }
                if callee.is_pending() || values.iter().any(Value::is_pending) {
                    return Ok(Value::Pending);
                }
                call_function(&callee, values)
            }
            Node::Member { object, property } => {
                operators::member(&evaluate(object, frame).await?, property)
            }
            Node::Index { object, index } => {
                let object = evaluate(object, frame).await?;
                let index = evaluate(index, frame).await?;
                operators::index(&object, &index)
            }
            Node::Unary { operator, operand } => {
                operators::unary(*operator, &evaluate(operand, frame).await?)
            }
            Node::Binary {
                operator,
                operand_a,
                operand_b,
            } => {
                let a = evaluate(operand_a, frame).await?;
                let b = evaluate(operand_b, frame).await?;
                operators::binary(*operator, &a, &b)
            }
            Node::And(operand_a, operand_b) => {
                let a = evaluate(operand_a, frame).await?;
                match check(&a)? {
                    Operand::Pending => Ok(Value::Pending),
                    Operand::Ready(value) if !value.is_truthy() => Ok(a.clone()),
                    Operand::Ready(_) => evaluate(operand_b, frame).await,
                }
            }
            Node::Or(operand_a, operand_b) => {
                let a = evaluate(operand_a, frame).await?;
                match check(&a)? {
                    Operand::Pending => Ok(Value::Pending),
                    Operand::Ready(value) if value.is_truthy() => Ok(a.clone()),
                    Operand::Ready(_) => evaluate(operand_b, frame).await,
                }
            }
            Node::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let condition = evaluate(condition, frame).await?;
                match check(&condition)? {
                    Operand::Pending => Ok(Value::Pending),
                    Operand::Ready(value) if value.is_truthy() => evaluate(then, frame).await,
                    Operand::Ready(_) => evaluate(otherwise, frame).await,
                }
            }
            Node::Await(operand) => match evaluate(operand, frame).await? {
                Value::Promise(promise) => match promise.settled().await {
                    Settled::Fulfilled(value) => Ok(value),
                    Settled::Rejected(error) => Err((*error).clone()),
                },
                value => Ok(value),
            },
        }
    }
    .boxed_local()
}
