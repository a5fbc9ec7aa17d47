//! Lowers a parsed cell into slot-addressed nodes the evaluator walks.

use crate::library::Library;
use crate::parser::{
    ArithmeticOperator, Comparator, Expression, Field, Literal, Logical, Spanned, Statement,
    UnaryOperator, unescape,
};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug)]
pub(crate) enum Node {
    Constant(Value),
    /// A binding `depth` frames up from the current one.
    Local {
        depth: usize,
        slot: usize,
        name: Rc<str>,
    },
    /// Bound neither by the cell, the environment slice nor the library.
    Unbound(Rc<str>),
    List(Vec<Node>),
    Record(Vec<(Rc<str>, Node)>),
    Lambda(Rc<LambdaCode>),
    Call {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },
    Member {
        object: Box<Node>,
        property: Rc<str>,
    },
    Index {
        object: Box<Node>,
        index: Box<Node>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Node>,
    },
    Binary {
        operator: BinaryOperator,
        operand_a: Box<Node>,
        operand_b: Box<Node>,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Conditional {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    Await(Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl BinaryOperator {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
        }
    }
}

#[derive(Debug)]
pub(crate) struct LambdaCode {
    pub arity: usize,
    pub body: Node,
}

#[derive(Debug)]
pub(crate) enum Instruction {
    Let { slot: usize, value: Node },
    Evaluate(Node),
}

#[derive(Debug)]
pub(crate) struct Program {
    /// Environment names copied into slots `0..parameters.len()` of the top frame.
    pub parameters: Vec<Rc<str>>,
    pub frame_size: usize,
    pub instructions: Vec<Instruction>,
}

#[derive(Default)]
struct FrameScope<'code> {
    names: HashMap<&'code str, usize>,
    size: usize,
}

impl<'code> FrameScope<'code> {
    fn declare(&mut self, name: &'code str) -> usize {
        let slot = self.size;
        self.size += 1;
        self.names.insert(name, slot);
        slot
    }
}

pub(crate) fn lower<'code>(
    statements: &[Spanned<Statement<'code>>],
    parameters: &'code [Rc<str>],
    library: &Library,
) -> Program {
    let mut top = FrameScope::default();
    for parameter in parameters {
        top.declare(parameter);
    }
    let mut lowering = Lowering {
        scopes: vec![top],
        library,
    };
    let mut instructions = Vec::with_capacity(statements.len());
    for statement in statements {
        match &statement.node {
            Statement::Let { name, value } => {
                let slot = lowering.declare(name.node);
                let value = lowering.expression(value);
                instructions.push(Instruction::Let { slot, value });
            }
            Statement::Expression(expression) => {
                instructions.push(Instruction::Evaluate(lowering.expression(expression)));
            }
        }
    }
    let frame_size = lowering.scopes.pop().map_or(0, |scope| scope.size);
    Program {
        parameters: parameters.to_vec(),
        frame_size,
        instructions,
    }
}

struct Lowering<'code, 'l> {
    scopes: Vec<FrameScope<'code>>,
    library: &'l Library,
}

impl<'code> Lowering<'code, '_> {
    fn declare(&mut self, name: &'code str) -> usize {
        match self.scopes.last_mut() {
            Some(scope) => scope.declare(name),
            None => 0,
        }
    }

    fn resolve(&self, name: &str) -> Node {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(slot) = scope.names.get(name) {
                return Node::Local {
                    depth,
                    slot: *slot,
                    name: name.into(),
                };
            }
        }
        match self.library.get(name) {
            Some(value) => Node::Constant(value.clone()),
            None => Node::Unbound(name.into()),
        }
    }

    fn boxed(&mut self, expression: &Spanned<Expression<'code>>) -> Box<Node> {
        Box::new(self.expression(expression))
    }

    fn binary(
        &mut self,
        operator: BinaryOperator,
        (operand_a, operand_b): (&Spanned<Expression<'code>>, &Spanned<Expression<'code>>),
    ) -> Node {
        Node::Binary {
            operator,
            operand_a: self.boxed(operand_a),
            operand_b: self.boxed(operand_b),
        }
    }

    fn expression(&mut self, expression: &Spanned<Expression<'code>>) -> Node {
        match &expression.node {
            Expression::Literal(literal) => Node::Constant(match literal {
                Literal::Number(number) => Value::Number(*number),
                Literal::Text(text) => Value::text(unescape(text)),
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            Expression::Identifier(name) => self.resolve(name),
            Expression::List { items } => {
                Node::List(items.iter().map(|item| self.expression(item)).collect())
            }
            Expression::Record { fields } => Node::Record(
                fields
                    .iter()
                    .map(|Field { name, value }| {
                        let value = match value {
                            Some(value) => self.expression(value),
                            None => self.resolve(name.node),
                        };
                        (Rc::from(unescape(name.node)), value)
                    })
                    .collect(),
            ),
            Expression::Lambda { parameters, body } => {
                let mut scope = FrameScope::default();
                for parameter in parameters {
                    scope.declare(parameter.node);
                }
                self.scopes.push(scope);
                let body = self.expression(body);
                self.scopes.pop();
                Node::Lambda(Rc::new(LambdaCode {
                    arity: parameters.len(),
                    body,
                }))
            }
            Expression::Call { callee, arguments } => Node::Call {
                callee: self.boxed(callee),
                arguments: arguments
                    .iter()
                    .map(|argument| self.expression(argument))
                    .collect(),
            },
            Expression::Member { object, property } => Node::Member {
                object: self.boxed(object),
                property: (*property).into(),
            },
            Expression::Index { object, index } => Node::Index {
                object: self.boxed(object),
                index: self.boxed(index),
            },
            Expression::Unary { operator, operand } => Node::Unary {
                operator: *operator,
                operand: self.boxed(operand),
            },
            Expression::Await { operand } => Node::Await(self.boxed(operand)),
            Expression::Comparator(comparator) => {
                let operator = match comparator {
                    Comparator::Equal { .. } => BinaryOperator::Equal,
                    Comparator::NotEqual { .. } => BinaryOperator::NotEqual,
                    Comparator::Greater { .. } => BinaryOperator::Greater,
                    Comparator::GreaterOrEqual { .. } => BinaryOperator::GreaterOrEqual,
                    Comparator::Less { .. } => BinaryOperator::Less,
                    Comparator::LessOrEqual { .. } => BinaryOperator::LessOrEqual,
                };
                self.binary(operator, comparator.operands())
            }
            Expression::ArithmeticOperator(arithmetic) => {
                let operator = match arithmetic {
                    ArithmeticOperator::Add { .. } => BinaryOperator::Add,
                    ArithmeticOperator::Subtract { .. } => BinaryOperator::Subtract,
                    ArithmeticOperator::Multiply { .. } => BinaryOperator::Multiply,
                    ArithmeticOperator::Divide { .. } => BinaryOperator::Divide,
                    ArithmeticOperator::Remainder { .. } => BinaryOperator::Remainder,
                };
                self.binary(operator, arithmetic.operands())
            }
            Expression::Logical(Logical::And { operand_a, operand_b }) => {
                Node::And(self.boxed(operand_a), self.boxed(operand_b))
            }
            Expression::Logical(Logical::Or { operand_a, operand_b }) => {
                Node::Or(self.boxed(operand_a), self.boxed(operand_b))
            }
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => Node::Conditional {
                condition: self.boxed(condition),
                then: self.boxed(then),
                otherwise: self.boxed(otherwise),
            },
        }
    }
}
