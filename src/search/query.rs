// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search requests and the query-string AST.
//!
//! [`SearchQuery`] is what callers hand to a [`SearchIndex`](super::SearchIndex).
//! Engines that evaluate queries themselves parse query strings into a
//! [`QueryNode`] tree with [`parse_query_string`]:
//!
//! ```text
//! widget                 - term in any full-text field
//! name:widget            - term in one field
//! "blue widget"          - phrase
//! wid*                   - prefix
//! a AND b, a && b        - both
//! a OR b, a || b, a b    - either (juxtaposition is OR)
//! NOT a, !a, -a          - exclude
//! +a b                   - a required, b optional
//! name:(a b)             - group with a default field
//! *  or  *:*             - everything
//! ```
//!
//! ```rust
//! use catalog_sync::search::{parse_query_string, QueryNode};
//!
//! let node = parse_query_string("name:widget AND blue").unwrap();
//! assert!(matches!(node, QueryNode::And(_)));
//!
//! assert!(parse_query_string("name:").is_err());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::error::EngineError;

const MAX_DEPTH: usize = 32;

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchQuery {
    /// Every document.
    MatchAll,
    /// Engine-native query-string syntax, passed through untouched.
    QueryString { query: String },
    /// Analyzed text against one field; any token matches.
    Match { field: String, text: String },
    /// Documents with one of the given ids.
    Ids { values: Vec<String> },
}

impl SearchQuery {
    pub fn query_string(query: impl Into<String>) -> Self {
        Self::QueryString { query: query.into() }
    }

    pub fn matching(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Match {
            field: field.into(),
            text: text.into(),
        }
    }

    pub fn ids<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ids {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Elasticsearch query DSL body for this request.
    pub fn to_elasticsearch(&self) -> Value {
        match self {
            SearchQuery::MatchAll => json!({ "match_all": {} }),
            SearchQuery::QueryString { query } => json!({ "query_string": { "query": query } }),
            SearchQuery::Match { field, text } => json!({ "match": { field.as_str(): { "query": text } } }),
            SearchQuery::Ids { values } => json!({ "ids": { "values": values } }),
        }
    }

    /// Resolve into an AST. Unparseable query strings fail with the engine's
    /// own parse-failure payload.
    pub fn to_node(&self) -> Result<QueryNode, EngineError> {
        match self {
            SearchQuery::MatchAll => Ok(QueryNode::All),
            SearchQuery::QueryString { query } => parse_query_string(query)
                .map_err(|e| EngineError::query_parse_failure(query, &e.to_string())),
            SearchQuery::Match { field, text } => Ok(QueryNode::Or(
                analyze(text)
                    .into_iter()
                    .map(|term| QueryNode::Term {
                        field: Some(field.clone()),
                        term,
                    })
                    .collect(),
            )),
            SearchQuery::Ids { values } => Ok(QueryNode::Ids(values.clone())),
        }
    }
}

/// Query AST node. `field: None` means every full-text field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryNode {
    /// Every document
    All,
    /// Documents having the field at all
    Exists(String),
    Ids(Vec<String>),
    Term { field: Option<String>, term: String },
    Prefix { field: Option<String>, prefix: String },
    Phrase { field: Option<String>, terms: Vec<String> },
    And(Vec<QueryNode>),
    /// Any child matches. Empty matches nothing.
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    /// Clause list with `+`/`-` modifiers. With no `must` and no `should`
    /// clauses, everything not excluded matches.
    Bool {
        must: Vec<QueryNode>,
        should: Vec<QueryNode>,
        must_not: Vec<QueryNode>,
    },
}

impl QueryNode {
    /// Matches nothing.
    pub fn none() -> Self {
        QueryNode::Or(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot parse query at token {position}: {message}")]
pub struct QueryParseError {
    pub position: usize,
    pub message: String,
}

/// Lowercased alphanumeric tokens.
pub fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Parse query-string syntax. Blank input matches nothing.
pub fn parse_query_string(raw: &str) -> Result<QueryNode, QueryParseError> {
    let tokens = lex(raw)?;
    if tokens.is_empty() {
        return Ok(QueryNode::none());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_group(None, 0)?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unbalanced ')'"));
    }
    Ok(node)
}

// ═══════════════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Must,
    MustNot,
    Field(String),
    Word(String),
    Phrase(String),
}

impl Token {
    /// Tokens that may open a clause.
    fn starts_clause(&self) -> bool {
        matches!(
            self,
            Token::LParen | Token::Not | Token::Must | Token::MustNot | Token::Field(_) | Token::Word(_) | Token::Phrase(_)
        )
    }
}

fn lex(raw: &str) -> Result<Vec<Token>, QueryParseError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let fail = |tokens: &Vec<Token>, message: &str| QueryParseError {
        position: tokens.len(),
        message: message.to_string(),
    };

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ':' => return Err(fail(&tokens, "':' without a field name")),
            '"' => {
                let mut phrase = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(fail(&tokens, "unterminated phrase")),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            if let Some(&next) = chars.get(i + 1) {
                                phrase.push(next);
                            }
                            i += 2;
                        }
                        Some(&other) => {
                            phrase.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Phrase(phrase));
            }
            '+' | '-' | '!' => {
                let dangling = chars.get(i + 1).map_or(true, |n| n.is_whitespace() || *n == ')');
                if dangling {
                    return Err(fail(&tokens, &format!("dangling operator '{}'", c)));
                }
                tokens.push(match c {
                    '+' => Token::Must,
                    '-' => Token::MustNot,
                    _ => Token::Not,
                });
                i += 1;
            }
            _ => {
                let mut word = String::new();
                while let Some(&w) = chars.get(i) {
                    if w.is_whitespace() || matches!(w, '(' | ')' | '"' | ':') {
                        break;
                    }
                    if w == '\\' {
                        if let Some(&next) = chars.get(i + 1) {
                            word.push(next);
                        }
                        i += 2;
                        continue;
                    }
                    word.push(w);
                    i += 1;
                }
                if chars.get(i) == Some(&':') {
                    i += 1;
                    tokens.push(Token::Field(word));
                    continue;
                }
                tokens.push(match word.as_str() {
                    "AND" | "&&" => Token::And,
                    "OR" | "||" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════
// Parser
// ═══════════════════════════════════════════════════════════════════════════

enum Occur {
    Must,
    Should,
    MustNot,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: &str) -> QueryParseError {
        QueryParseError {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn expect_clause(&self, after: &str) -> Result<(), QueryParseError> {
        match self.peek() {
            Some(t) if t.starts_clause() => Ok(()),
            _ => Err(self.error(&format!("dangling operator '{}'", after))),
        }
    }

    /// clause (OR? clause)*
    fn parse_group(&mut self, field: Option<&str>, depth: usize) -> Result<QueryNode, QueryParseError> {
        if depth > MAX_DEPTH {
            return Err(self.error("query nested too deeply"));
        }
        let mut clauses: Vec<(Occur, QueryNode)> = Vec::new();
        loop {
            match self.peek() {
                None | Some(Token::RParen) => break,
                Some(Token::Or) => {
                    if clauses.is_empty() {
                        return Err(self.error("dangling operator 'OR'"));
                    }
                    self.pos += 1;
                    self.expect_clause("OR")?;
                }
                Some(Token::And) => return Err(self.error("dangling operator 'AND'")),
                Some(_) => {
                    let clause = self.parse_clause(field, depth)?;
                    clauses.push(clause);
                }
            }
        }
        if clauses.is_empty() {
            return Err(self.error("empty group"));
        }

        if clauses.iter().all(|(occur, _)| matches!(occur, Occur::Should)) {
            let mut nodes: Vec<QueryNode> = clauses.into_iter().map(|(_, n)| n).collect();
            return Ok(if nodes.len() == 1 {
                nodes.remove(0)
            } else {
                QueryNode::Or(nodes)
            });
        }

        let (mut must, mut should, mut must_not) = (Vec::new(), Vec::new(), Vec::new());
        for (occur, node) in clauses {
            match occur {
                Occur::Must => must.push(node),
                Occur::Should => should.push(node),
                Occur::MustNot => must_not.push(node),
            }
        }
        Ok(QueryNode::Bool { must, should, must_not })
    }

    fn parse_clause(&mut self, field: Option<&str>, depth: usize) -> Result<(Occur, QueryNode), QueryParseError> {
        let occur = match self.peek() {
            Some(Token::Must) => {
                self.pos += 1;
                Occur::Must
            }
            Some(Token::MustNot) => {
                self.pos += 1;
                Occur::MustNot
            }
            _ => Occur::Should,
        };
        let node = self.parse_and(field, depth)?;
        Ok((occur, node))
    }

    fn parse_and(&mut self, field: Option<&str>, depth: usize) -> Result<QueryNode, QueryParseError> {
        let mut nodes = vec![self.parse_unary(field, depth)?];
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            self.expect_clause("AND")?;
            nodes.push(self.parse_unary(field, depth)?);
        }
        Ok(if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            QueryNode::And(nodes)
        })
    }

    fn parse_unary(&mut self, field: Option<&str>, depth: usize) -> Result<QueryNode, QueryParseError> {
        if depth > MAX_DEPTH {
            return Err(self.error("query nested too deeply"));
        }
        if matches!(self.peek(), Some(Token::Not)) {
            self.pos += 1;
            self.expect_clause("NOT")?;
            let inner = self.parse_unary(field, depth + 1)?;
            return Ok(QueryNode::Not(Box::new(inner)));
        }
        self.parse_primary(field, depth)
    }

    fn parse_primary(&mut self, field: Option<&str>, depth: usize) -> Result<QueryNode, QueryParseError> {
        match self.next() {
            Some(Token::LParen) => self.parse_parenthesised(field, depth),
            Some(Token::Field(name)) => {
                let name = (name != "*").then_some(name);
                match self.next() {
                    Some(Token::LParen) => self.parse_parenthesised(name.as_deref(), depth),
                    Some(Token::Word(word)) => Ok(word_node(name.as_deref(), &word)),
                    Some(Token::Phrase(phrase)) => Ok(phrase_node(name.as_deref(), &phrase)),
                    _ => Err(self.error("field is missing a value")),
                }
            }
            Some(Token::Word(word)) => Ok(word_node(field, &word)),
            Some(Token::Phrase(phrase)) => Ok(phrase_node(field, &phrase)),
            Some(Token::RParen) => Err(self.error("unbalanced ')'")),
            Some(_) => Err(self.error("unexpected operator")),
            None => Err(self.error("unexpected end of query")),
        }
    }

    fn parse_parenthesised(&mut self, field: Option<&str>, depth: usize) -> Result<QueryNode, QueryParseError> {
        let inner = self.parse_group(field, depth + 1)?;
        match self.next() {
            Some(Token::RParen) => Ok(inner),
            _ => Err(self.error("unbalanced '('")),
        }
    }
}

fn word_node(field: Option<&str>, word: &str) -> QueryNode {
    if word == "*" {
        return match field {
            Some(f) => QueryNode::Exists(f.to_string()),
            None => QueryNode::All,
        };
    }
    if let Some(stem) = word.strip_suffix('*') {
        if !stem.is_empty() && !stem.contains('*') {
            return QueryNode::Prefix {
                field: field.map(str::to_string),
                prefix: stem.to_lowercase(),
            };
        }
    }
    phrase_node(field, word)
}

fn phrase_node(field: Option<&str>, text: &str) -> QueryNode {
    let mut terms = analyze(text);
    let field = field.map(str::to_string);
    match terms.len() {
        0 => QueryNode::none(),
        1 => QueryNode::Term {
            field,
            term: terms.remove(0),
        },
        _ => QueryNode::Phrase { field, terms },
    }
}
