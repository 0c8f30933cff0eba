//! MSH Parser
//!
//! Turns one line of user input into a [`CommandLine`]. Words are separated by
//! whitespace; `|`, `<`, `>` and `&` are operators whether or not they are
//! surrounded by whitespace. There is no quoting, globbing or expansion.

use std::path::PathBuf;

use crate::core::command::CommandLine;
use crate::errors::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Pipe,
    Input,
    Output,
    Background,
}

impl Token {
    fn as_str(&self) -> &str {
        match *self {
            Token::Word(ref word) => word,
            Token::Pipe => "|",
            Token::Input => "<",
            Token::Output => ">",
            Token::Background => "&",
        }
    }
}

#[derive(Default)]
struct StageBuilder {
    arguments: Vec<String>,
    input_redirect: Option<PathBuf>,
    output_redirect: Option<PathBuf>,
}

/// Parses `input` according to msh grammar.
///
/// Returns `Ok(None)` for a blank line.
///
/// # Examples
///
/// ```
/// use msh_rs::core::parser;
///
/// let command = parser::parse("ls -l | tail -n 2 > out &").unwrap().unwrap();
/// assert_eq!(command.arguments, vec!["ls", "-l"]);
/// assert!(!command.blocking);
/// let last = command.next.unwrap();
/// assert_eq!(last.arguments, vec!["tail", "-n", "2"]);
/// assert_eq!(last.output_redirect.unwrap().to_str(), Some("out"));
/// ```
pub fn parse(input: &str) -> Result<Option<CommandLine>> {
    let mut tokens = tokenize(input);
    if tokens.is_empty() {
        return Ok(None);
    }

    let blocking = if tokens.last() == Some(&Token::Background) {
        tokens.pop();
        false
    } else {
        true
    };

    let mut stages = Vec::new();
    let mut current = StageBuilder::default();
    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => current.arguments.push(word),
            Token::Input => {
                let path = redirect_target(&token, tokens.next())?;
                if current.input_redirect.replace(path).is_some() {
                    return Err(Error::syntax(token.as_str()));
                }
            }
            Token::Output => {
                let path = redirect_target(&token, tokens.next())?;
                if current.output_redirect.replace(path).is_some() {
                    return Err(Error::syntax(token.as_str()));
                }
            }
            Token::Pipe => {
                if current.arguments.is_empty() {
                    return Err(Error::syntax(token.as_str()));
                }
                stages.push(current);
                current = StageBuilder::default();
            }
            Token::Background => return Err(Error::syntax(token.as_str())),
        }
    }

    if current.arguments.is_empty() {
        return Err(Error::syntax("newline"));
    }
    stages.push(current);

    let command = stages
        .into_iter()
        .rev()
        .fold(None, |next, stage| {
            Some(Box::new(CommandLine {
                arguments: stage.arguments,
                input_redirect: stage.input_redirect,
                output_redirect: stage.output_redirect,
                blocking,
                next,
            }))
        })
        .map(|head| *head);

    Ok(command)
}

fn redirect_target(operator: &Token, target: Option<Token>) -> Result<PathBuf> {
    match target {
        Some(Token::Word(path)) => Ok(PathBuf::from(path)),
        Some(other) => Err(Error::syntax(other.as_str())),
        None => Err(Error::syntax(format!("{} newline", operator.as_str()))),
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in input.chars() {
        let operator = match c {
            '|' => Some(Token::Pipe),
            '<' => Some(Token::Input),
            '>' => Some(Token::Output),
            '&' => Some(Token::Background),
            _ => None,
        };

        if operator.is_some() || c.is_whitespace() {
            if !word.is_empty() {
                tokens.push(Token::Word(word.split_off(0)));
            }
            tokens.extend(operator);
        } else {
            word.push(c);
        }
    }

    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }
    tokens
}
