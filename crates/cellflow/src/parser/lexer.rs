use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Number(f64),
    // Raw content between the quotes, escapes are resolved during lowering
    Text(&'code str),
    Identifier(&'code str),
    Arrow,
    Assign,
    Colon,
    Semicolon,
    Comma,
    Dot,
    Question,
    NotEqual,
    Equal,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    And,
    Or,
    Not,
    Minus,
    Plus,
    Asterisk,
    Slash,
    Percent,
    Let,
    Await,
    True,
    False,
    Null,
    Undefined,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Number(number) => number.to_string().into(),
            Self::Text(text) => format!("\"{text}\"").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Arrow => "=>".into(),
            Self::Assign => "=".into(),
            Self::Colon => ":".into(),
            Self::Semicolon => ";".into(),
            Self::Comma => ",".into(),
            Self::Dot => ".".into(),
            Self::Question => "?".into(),
            Self::NotEqual => "!=".into(),
            Self::Equal => "==".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::And => "&&".into(),
            Self::Or => "||".into(),
            Self::Not => "!".into(),
            Self::Minus => "-".into(),
            Self::Plus => "+".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
            Self::Let => "let".into(),
            Self::Await => "await".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Null => "null".into(),
            Self::Undefined => "undefined".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    // Two-character operators have to be tried before their one-character prefixes
    let comparator_or_logical = choice((
        just("=>").to(Token::Arrow),
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just("<=").to(Token::LessOrEqual),
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('>').to(Token::Greater),
        just('<').to(Token::Less),
        just('!').to(Token::Not),
        just('=').to(Token::Assign),
    ));

    let arithmetic_operator = choice((
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let punctuation = choice((
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just('?').to(Token::Question),
    ));

    let comment = just("//")
        .ignore_then(any().and_is(text::newline().not()).repeated())
        .to_slice()
        .map(Token::Comment);

    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .then(
            one_of("eE")
                .then(one_of("+-").or_not())
                .then(text::digits(10))
                .or_not(),
        )
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    let escape = just('\\').then(any()).ignored();
    let double_quoted = just('"')
        .ignore_then(
            none_of("\\\"")
                .ignored()
                .or(escape.clone())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'));
    let single_quoted = just('\'')
        .ignore_then(none_of("\\'").ignored().or(escape).repeated().to_slice())
        .then_ignore(just('\''));
    let text = double_quoted.or(single_quoted).map(Token::Text);

    let identifier_or_keyword = any()
        .filter(|character: &char| {
            character.is_ascii_alphabetic() || *character == '_' || *character == '$'
        })
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || *character == '_' || *character == '$'
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier: &str| match identifier {
            "let" => Token::Let,
            "await" => Token::Await,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            _ => Token::Identifier(identifier),
        });

    let token = choice((
        bracket,
        comment,
        number,
        text,
        comparator_or_logical,
        arithmetic_operator,
        punctuation,
        identifier_or_keyword,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded()
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}

/// Resolves backslash escapes in the raw content of a `Token::Text`.
pub fn unescape(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut characters = raw.chars();
    while let Some(character) = characters.next() {
        if character != '\\' {
            text.push(character);
            continue;
        }
        match characters.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('r') => text.push('\r'),
            Some('0') => text.push('\0'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }
    text
}
