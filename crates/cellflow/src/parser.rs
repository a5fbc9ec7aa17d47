use chumsky::{input::ValueInput, pratt::*, prelude::*};

mod lexer;
pub use lexer::{Token, lexer, unescape};

mod scope_resolver;
pub use scope_resolver::{Analysis, ScopeError, resolve_scopes};

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// Parses a cell: a sequence of `let` bindings and expressions.
pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Statement<'code>>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let identifier = select! { Token::Identifier(identifier) => identifier };

    let expression = recursive(|expression| {
        let comma = just(Token::Comma);
        let colon = just(Token::Colon);
        let bracket_round_open = just(Token::BracketRoundOpen);
        let bracket_round_close = just(Token::BracketRoundClose);
        let bracket_curly_open = just(Token::BracketCurlyOpen);
        let bracket_curly_close = just(Token::BracketCurlyClose);
        let bracket_square_open = just(Token::BracketSquareOpen);
        let bracket_square_close = just(Token::BracketSquareClose);

        let identifier = select! { Token::Identifier(identifier) => identifier };
        let spanned_identifier = identifier.map_with(|name, extra| Spanned {
            node: name,
            span: extra.span(),
        });

        let literal = select! {
            Token::Number(number) => Literal::Number(number),
            Token::Text(text) => Literal::Text(text),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            Token::Undefined => Literal::Undefined,
        };
        let expression_literal = literal.map(Expression::Literal);

        let parameters = choice((
            spanned_identifier.clone().map(|parameter| vec![parameter]),
            spanned_identifier
                .clone()
                .separated_by(comma.clone())
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(bracket_round_open.clone(), bracket_round_close.clone()),
        ));

        let lambda = parameters
            .then_ignore(just(Token::Arrow))
            .then(expression.clone())
            .map(|(parameters, body)| Expression::Lambda {
                parameters,
                body: Box::new(body),
            });

        let list = expression
            .clone()
            .separated_by(comma.clone())
            .allow_trailing()
            .collect()
            .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
            .map(|items| Expression::List { items });

        let named_field = spanned_identifier
            .clone()
            .then(colon.clone().ignore_then(expression.clone()).or_not())
            .map(|(name, value)| Field { name, value });

        let quoted_field = select! { Token::Text(text) => text }
            .map_with(|name, extra| Spanned {
                node: name,
                span: extra.span(),
            })
            .then_ignore(colon.clone())
            .then(expression.clone())
            .map(|(name, value)| Field {
                name,
                value: Some(value),
            });

        let record = named_field
            .or(quoted_field)
            .separated_by(comma.clone())
            .allow_trailing()
            .collect()
            .delimited_by(bracket_curly_open, bracket_curly_close)
            .map(|fields| Expression::Record { fields });

        let nested = bracket_round_open
            .clone()
            .ignore_then(expression.clone())
            .then_ignore(bracket_round_close.clone());

        // Lambdas go first, `(a, b) => ..` would otherwise start as a nested expression
        let atom = choice((
            lambda,
            expression_literal,
            identifier.map(Expression::Identifier),
            list,
            record,
        ))
        .map_with(|expression, extra| Spanned {
            node: expression,
            span: extra.span(),
        })
        .or(nested);

        let arguments = expression
            .clone()
            .separated_by(comma)
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(bracket_round_open, bracket_round_close);

        let member = just(Token::Dot).ignore_then(identifier);

        let index = expression
            .clone()
            .delimited_by(bracket_square_open, bracket_square_close);

        let operation = atom.pratt((
            infix(left(1), just(Token::Or), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Logical(Logical::Or {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(2), just(Token::And), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Logical(Logical::And {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(3), just(Token::Equal), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::Equal {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(3), just(Token::NotEqual), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::NotEqual {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(4), just(Token::Greater), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::Greater {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(4), just(Token::GreaterOrEqual), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::GreaterOrEqual {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(4), just(Token::Less), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::Less {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(4), just(Token::LessOrEqual), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::LessOrEqual {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(5), just(Token::Plus), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Add {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(5), just(Token::Minus), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Subtract {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(6), just(Token::Asterisk), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Multiply {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(6), just(Token::Slash), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Divide {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(6), just(Token::Percent), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Remainder {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            prefix(
                7,
                select! {
                    Token::Minus => UnaryOperator::Negate,
                    Token::Not => UnaryOperator::Not,
                },
                |operator, operand, extra| Spanned {
                    span: extra.span(),
                    node: Expression::Unary {
                        operator,
                        operand: Box::new(operand),
                    },
                },
            ),
            prefix(7, just(Token::Await), |_, operand, extra| Spanned {
                span: extra.span(),
                node: Expression::Await {
                    operand: Box::new(operand),
                },
            }),
            postfix(8, arguments, |callee, arguments, extra| Spanned {
                span: extra.span(),
                node: Expression::Call {
                    callee: Box::new(callee),
                    arguments,
                },
            }),
            postfix(8, member, |object, property, extra| Spanned {
                span: extra.span(),
                node: Expression::Member {
                    object: Box::new(object),
                    property,
                },
            }),
            postfix(8, index, |object, index, extra| Spanned {
                span: extra.span(),
                node: Expression::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                },
            }),
        ));

        // Ternary binds looser than every pratt operator and nests to the right
        operation
            .then(
                just(Token::Question)
                    .ignore_then(expression.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expression)
                    .or_not(),
            )
            .map_with(|(condition, branches), extra| match branches {
                Some((then, otherwise)) => Spanned {
                    span: extra.span(),
                    node: Expression::Conditional {
                        condition: Box::new(condition),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                },
                None => condition,
            })
    });

    let let_statement = just(Token::Let)
        .ignore_then(identifier.map_with(|name, extra| Spanned {
            node: name,
            span: extra.span(),
        }))
        .then_ignore(just(Token::Assign))
        .then(expression.clone())
        .map(|(name, value)| Statement::Let { name, value });

    let statement = let_statement
        .or(expression.map(Statement::Expression))
        .map_with(|statement, extra| Spanned {
            node: statement,
            span: extra.span(),
        });

    let semicolons = just(Token::Semicolon).repeated();

    semicolons
        .clone()
        .ignore_then(statement.then_ignore(semicolons).repeated().collect())
}

#[derive(Debug, Clone)]
pub enum Statement<'code> {
    Let {
        name: Spanned<&'code str>,
        value: Spanned<Expression<'code>>,
    },
    Expression(Spanned<Expression<'code>>),
}

#[derive(Debug, Clone)]
pub enum Expression<'code> {
    Literal(Literal<'code>),
    Identifier(&'code str),
    List {
        items: Vec<Spanned<Self>>,
    },
    Record {
        fields: Vec<Field<'code>>,
    },
    Lambda {
        parameters: Vec<Spanned<&'code str>>,
        body: Box<Spanned<Self>>,
    },
    Call {
        callee: Box<Spanned<Self>>,
        arguments: Vec<Spanned<Self>>,
    },
    Member {
        object: Box<Spanned<Self>>,
        property: &'code str,
    },
    Index {
        object: Box<Spanned<Self>>,
        index: Box<Spanned<Self>>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    Await {
        operand: Box<Spanned<Self>>,
    },
    Comparator(Comparator<'code>),
    ArithmeticOperator(ArithmeticOperator<'code>),
    Logical(Logical<'code>),
    Conditional {
        condition: Box<Spanned<Self>>,
        then: Box<Spanned<Self>>,
        otherwise: Box<Spanned<Self>>,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum Literal<'code> {
    Number(f64),
    Text(&'code str),
    Bool(bool),
    Null,
    Undefined,
}

/// `name: value`, or the shorthand `name` when `value` is `None`.
#[derive(Debug, Clone)]
pub struct Field<'code> {
    pub name: Spanned<&'code str>,
    pub value: Option<Spanned<Expression<'code>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone)]
pub enum Comparator<'code> {
    Equal {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    NotEqual {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    Greater {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    GreaterOrEqual {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    Less {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    LessOrEqual {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
}

impl<'code> Comparator<'code> {
    pub fn operands(&self) -> (&Spanned<Expression<'code>>, &Spanned<Expression<'code>>) {
        match self {
            Self::Equal { operand_a, operand_b }
            | Self::NotEqual { operand_a, operand_b }
            | Self::Greater { operand_a, operand_b }
            | Self::GreaterOrEqual { operand_a, operand_b }
            | Self::Less { operand_a, operand_b }
            | Self::LessOrEqual { operand_a, operand_b } => (operand_a, operand_b),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ArithmeticOperator<'code> {
    Add {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    Subtract {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    Multiply {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    Divide {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    Remainder {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
}

impl<'code> ArithmeticOperator<'code> {
    pub fn operands(&self) -> (&Spanned<Expression<'code>>, &Spanned<Expression<'code>>) {
        match self {
            Self::Add { operand_a, operand_b }
            | Self::Subtract { operand_a, operand_b }
            | Self::Multiply { operand_a, operand_b }
            | Self::Divide { operand_a, operand_b }
            | Self::Remainder { operand_a, operand_b } => (operand_a, operand_b),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Logical<'code> {
    And {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
    Or {
        operand_a: Box<Spanned<Expression<'code>>>,
        operand_b: Box<Spanned<Expression<'code>>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::prelude::Parser;

    macro_rules! parse_and_test {
        ($code:expr, $test:expr) => {{
            let tokens = lexer().parse($code).unwrap();
            let input = tokens.map(
                Span::from($code.len()..$code.len()),
                |Spanned { node, span }| (node, span),
            );
            let statements = parser().parse(input).unwrap();
            let statement = statements.into_iter().last().unwrap().node;
            $test(&statement)
        }};
    }

    fn expression<'a, 'code>(statement: &'a Statement<'code>) -> &'a Expression<'code> {
        match statement {
            Statement::Expression(expression) => &expression.node,
            Statement::Let { value, .. } => &value.node,
        }
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        parse_and_test!("1 + 2 * 3", |statement: &Statement| {
            let Expression::ArithmeticOperator(ArithmeticOperator::Add { operand_b, .. }) =
                expression(statement)
            else {
                panic!("Expected Add, got {:?}", statement);
            };
            assert!(matches!(
                operand_b.node,
                Expression::ArithmeticOperator(ArithmeticOperator::Multiply { .. })
            ));
        });
    }

    #[test]
    fn test_single_parameter_lambda() {
        parse_and_test!("x => x * 2", |statement: &Statement| {
            if let Expression::Lambda { parameters, body } = expression(statement) {
                assert_eq!(parameters.len(), 1);
                assert_eq!(parameters[0].node, "x");
                assert!(matches!(body.node, Expression::ArithmeticOperator(_)));
            } else {
                panic!("Expected Lambda, got {:?}", statement);
            }
        });
    }

    #[test]
    fn test_parenthesized_lambda_and_nested_expression() {
        parse_and_test!("(a, b) => a", |statement: &Statement| {
            assert!(matches!(expression(statement), Expression::Lambda { parameters, .. } if parameters.len() == 2));
        });
        parse_and_test!("(a + b) * 2", |statement: &Statement| {
            assert!(matches!(
                expression(statement),
                Expression::ArithmeticOperator(ArithmeticOperator::Multiply { .. })
            ));
        });
    }

    #[test]
    fn test_postfix_chain() {
        parse_and_test!("rows[0].price(1)", |statement: &Statement| {
            let Expression::Call { callee, arguments } = expression(statement) else {
                panic!("Expected Call, got {:?}", statement);
            };
            assert_eq!(arguments.len(), 1);
            let Expression::Member { object, property } = &callee.node else {
                panic!("Expected Member, got {:?}", callee);
            };
            assert_eq!(*property, "price");
            assert!(matches!(object.node, Expression::Index { .. }));
        });
    }

    #[test]
    fn test_negation_applies_before_member_access() {
        parse_and_test!("-a.b", |statement: &Statement| {
            let Expression::Unary { operator, operand } = expression(statement) else {
                panic!("Expected Unary, got {:?}", statement);
            };
            assert_eq!(*operator, UnaryOperator::Negate);
            assert!(matches!(operand.node, Expression::Member { .. }));
        });
    }

    #[test]
    fn test_await_prefix() {
        parse_and_test!("await fetch(1) + 1", |statement: &Statement| {
            let Expression::ArithmeticOperator(ArithmeticOperator::Add { operand_a, .. }) =
                expression(statement)
            else {
                panic!("Expected Add, got {:?}", statement);
            };
            assert!(matches!(operand_a.node, Expression::Await { .. }));
        });
    }

    #[test]
    fn test_conditional() {
        parse_and_test!("a > 1 ? 'big' : a < 0 ? 'negative' : 'small'", |statement: &Statement| {
            let Expression::Conditional { condition, otherwise, .. } = expression(statement) else {
                panic!("Expected Conditional, got {:?}", statement);
            };
            assert!(matches!(condition.node, Expression::Comparator(Comparator::Greater { .. })));
            assert!(matches!(otherwise.node, Expression::Conditional { .. }));
        });
    }

    #[test]
    fn test_record_fields() {
        parse_and_test!("{ total: 1, \"unit price\": 2, tax }", |statement: &Statement| {
            let Expression::Record { fields } = expression(statement) else {
                panic!("Expected Record, got {:?}", statement);
            };
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[1].name.node, "unit price");
            assert!(fields[2].value.is_none());
        });
    }

    #[test]
    fn test_statements_with_and_without_semicolons() {
        let code = "let a = 1; let b = a + 1\nb * 2;";
        let tokens = lexer().parse(code).unwrap();
        let input = tokens.map(Span::from(code.len()..code.len()), |Spanned { node, span }| (node, span));
        let statements = parser().parse(input).unwrap();
        assert_eq!(statements.len(), 3);
        assert!(matches!(statements[0].node, Statement::Let { ref name, .. } if name.node == "a"));
        assert!(matches!(statements[2].node, Statement::Expression(_)));
    }

    #[test]
    fn test_unbalanced_bracket_is_error() {
        let code = "(1 + 2";
        let tokens = lexer().parse(code).unwrap();
        let input = tokens.map(Span::from(code.len()..code.len()), |Spanned { node, span }| (node, span));
        assert!(parser().parse(input).has_errors());
    }
}
