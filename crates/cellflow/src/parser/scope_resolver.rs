use super::{Expression, Field, Logical, ParseError, Spanned, Statement, Token};
use std::collections::{BTreeMap, BTreeSet};

/// Names bound at the current point of the walk, with the lambda level that binds them.
pub type ReachableNames<'code> = BTreeMap<&'code str, usize>;

pub type ScopeError<'code> = ParseError<'code, Token<'code>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    /// Identifiers read somewhere in the cell but bound nowhere inside it.
    pub free_variables: BTreeSet<String>,
    /// The cell awaits at its top level.
    pub is_async: bool,
}

pub fn resolve_scopes<'code>(
    statements: &[Spanned<Statement<'code>>],
) -> Result<Analysis, Vec<ScopeError<'code>>> {
    let mut resolver = ScopeResolver::default();
    let mut reachable_names = ReachableNames::default();
    let level = 0;
    for statement in statements {
        match &statement.node {
            // Visible from its own initializer onward: a lambda may call itself,
            // but never a `let` declared after it
            Statement::Let { name, value } => {
                reachable_names.insert(name.node, level);
                resolver.visit(value, &reachable_names, level);
            }
            Statement::Expression(expression) => {
                resolver.visit(expression, &reachable_names, level)
            }
        }
    }
    if resolver.errors.is_empty() {
        Ok(Analysis {
            free_variables: resolver
                .free_variables
                .into_iter()
                .map(str::to_owned)
                .collect(),
            is_async: resolver.is_async,
        })
    } else {
        Err(resolver.errors)
    }
}

#[derive(Default)]
struct ScopeResolver<'code> {
    free_variables: BTreeSet<&'code str>,
    is_async: bool,
    errors: Vec<ScopeError<'code>>,
}

impl<'code> ScopeResolver<'code> {
    fn visit(
        &mut self,
        expression: &Spanned<Expression<'code>>,
        reachable_names: &ReachableNames<'code>,
        level: usize,
    ) {
        let Spanned {
            span,
            node: expression,
        } = expression;
        match expression {
            Expression::Literal(_) => {}
            Expression::Identifier(name) => self.reference(name, reachable_names),
            Expression::List { items } => {
                for item in items {
                    self.visit(item, reachable_names, level);
                }
            }
            Expression::Record { fields } => {
                for Field { name, value } in fields {
                    match value {
                        Some(value) => self.visit(value, reachable_names, level),
                        None => self.reference(name.node, reachable_names),
                    }
                }
            }
            Expression::Lambda { parameters, body } => {
                let level = level + 1;
                let mut reachable_names = reachable_names.clone();
                for parameter in parameters {
                    reachable_names.insert(parameter.node, level);
                }
                self.visit(body, &reachable_names, level);
            }
            Expression::Call { callee, arguments } => {
                self.visit(callee, reachable_names, level);
                for argument in arguments {
                    self.visit(argument, reachable_names, level);
                }
            }
            Expression::Member { object, .. } => self.visit(object, reachable_names, level),
            Expression::Index { object, index } => {
                self.visit(object, reachable_names, level);
                self.visit(index, reachable_names, level);
            }
            Expression::Unary { operand, .. } => self.visit(operand, reachable_names, level),
            Expression::Await { operand } => {
                if level > 0 {
                    self.errors.push(ScopeError::custom(
                        *span,
                        "`await` is only allowed at the top level of a cell, not inside a function",
                    ));
                } else {
                    self.is_async = true;
                }
                self.visit(operand, reachable_names, level);
            }
            Expression::Comparator(comparator) => {
                let (operand_a, operand_b) = comparator.operands();
                self.visit(operand_a, reachable_names, level);
                self.visit(operand_b, reachable_names, level);
            }
            Expression::ArithmeticOperator(operator) => {
                let (operand_a, operand_b) = operator.operands();
                self.visit(operand_a, reachable_names, level);
                self.visit(operand_b, reachable_names, level);
            }
            Expression::Logical(Logical::And { operand_a, operand_b } | Logical::Or { operand_a, operand_b }) => {
                self.visit(operand_a, reachable_names, level);
                self.visit(operand_b, reachable_names, level);
            }
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.visit(condition, reachable_names, level);
                self.visit(then, reachable_names, level);
                self.visit(otherwise, reachable_names, level);
            }
        }
    }

    fn reference(&mut self, name: &'code str, reachable_names: &ReachableNames<'code>) {
        if !reachable_names.contains_key(name) {
            self.free_variables.insert(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Input, Parser, Span, lexer, parser};

    fn analyze(code: &str) -> Result<Analysis, Vec<String>> {
        let tokens = lexer().parse(code).unwrap();
        let input = tokens.map(Span::from(code.len()..code.len()), |Spanned { node, span }| {
            (node, span)
        });
        let statements = parser().parse(input).unwrap();
        resolve_scopes(&statements)
            .map_err(|errors| errors.iter().map(|error| error.to_string()).collect())
    }

    fn free(code: &str) -> Vec<String> {
        analyze(code).unwrap().free_variables.into_iter().collect()
    }

    #[test]
    fn test_free_variables_exclude_bound_names() {
        assert_eq!(free("a * 3 + b"), ["a", "b"]);
        assert_eq!(free("let x = 1; x + y"), ["y"]);
        assert_eq!(free("items => map(items, item => item * rate)"), ["map", "rate"]);
    }

    #[test]
    fn test_record_shorthand_is_a_reference() {
        assert_eq!(free("{ total, tax: rate * total }"), ["rate", "total"]);
    }

    #[test]
    fn test_member_names_are_not_references() {
        assert_eq!(free("$before.price"), ["$before"]);
    }

    #[test]
    fn test_let_is_visible_in_own_initializer() {
        assert_eq!(free("let fact = n => n < 2 ? 1 : n * fact(n - 1); fact(5)"), Vec::<String>::new());
    }

    #[test]
    fn test_lambda_cannot_see_later_let() {
        assert_eq!(free("let g = () => y; let y = 2; g()"), ["y"]);
        assert_eq!(free("let even = n => n == 0 || odd(n - 1); let odd = n => !even(n); even(2)"), ["odd"]);
    }

    #[test]
    fn test_reads_before_let_are_free() {
        assert_eq!(free("x + 1; let x = 2; x"), ["x"]);
    }

    #[test]
    fn test_top_level_await_marks_async() {
        assert!(analyze("await later").unwrap().is_async);
        assert!(!analyze("later").unwrap().is_async);
    }

    #[test]
    fn test_await_inside_lambda_is_error() {
        let errors = analyze("x => await x").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("top level"));
    }
}
