//! Engine query model and the single-field expression parser.
//!
//! Queries are evaluated against any [`TermIndex`], i.e. something that can
//! answer "which ordinals carry this term (or a term with this prefix) under
//! this field". Both engines implement it over their postings.
//!
//! Expression syntax accepted by [`parse_expression`]:
//!
//! ```text
//! Foo              term in the default field
//! pn:com.acme      term in another field
//! "a phrase"       analyzed like a term, all tokens required
//! Str*             prefix, neither analyzed nor case-folded
//! +a -b            required / excluded
//! a AND b, a OR b, NOT a
//! ```

use std::collections::BTreeSet;

use crate::engine::{FieldKind, analyze};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Term { field: String, term: String },
    Prefix { field: String, prefix: String },
    Boolean(BooleanQuery),
    /// Matches no document.
    Nothing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BooleanQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
}

pub trait TermIndex {
    fn postings(&self, field: &str, term: &str) -> Result<BTreeSet<u64>, EngineError>;

    fn prefix_postings(&self, field: &str, prefix: &str) -> Result<BTreeSet<u64>, EngineError>;
}

impl Query {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    /// Conjunction of `clauses`; no clauses means [`Query::Nothing`].
    pub fn all_of(mut clauses: Vec<Query>) -> Self {
        match clauses.len() {
            0 => Self::Nothing,
            1 => clauses.remove(0),
            _ => Self::Boolean(BooleanQuery {
                must: clauses,
                ..BooleanQuery::default()
            }),
        }
    }

    /// Term conjunction for `value` analyzed as `kind`.
    pub fn analyzed(field: &str, value: &str, kind: FieldKind) -> Self {
        let clauses = analyze(value, kind)
            .into_iter()
            .map(|t| Query::term(field, t))
            .collect();
        Self::all_of(clauses)
    }

    pub fn matches(&self, index: &dyn TermIndex) -> Result<BTreeSet<u64>, EngineError> {
        match self {
            Self::Term { field, term } => index.postings(field, term),
            Self::Prefix { field, prefix } => index.prefix_postings(field, prefix),
            Self::Nothing => Ok(BTreeSet::new()),
            Self::Boolean(b) => b.matches(index),
        }
    }
}

impl BooleanQuery {
    fn matches(&self, index: &dyn TermIndex) -> Result<BTreeSet<u64>, EngineError> {
        let mut acc = if !self.must.is_empty() {
            let mut musts = self.must.iter();
            let mut acc = match musts.next() {
                Some(first) => first.matches(index)?,
                None => BTreeSet::new(),
            };
            for q in musts {
                if acc.is_empty() {
                    break;
                }
                let next = q.matches(index)?;
                acc.retain(|id| next.contains(id));
            }
            acc
        } else {
            let mut acc = BTreeSet::new();
            for q in &self.should {
                acc.extend(q.matches(index)?);
            }
            acc
        };

        for q in &self.must_not {
            if acc.is_empty() {
                break;
            }
            let excluded = q.matches(index)?;
            acc.retain(|id| !excluded.contains(id));
        }
        Ok(acc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseText {
    Word(String),
    Phrase(String),
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub occur: Occur,
    pub field: Option<String>,
    pub text: ClauseText,
}

enum Lexeme {
    And,
    Or,
    Not,
    Clause(Clause),
}

/// Parses `expr` into clauses without resolving fields.
pub fn parse_expression(expr: &str) -> Result<Vec<Clause>, EngineError> {
    let lexemes = lex(expr)?;
    if lexemes.is_empty() {
        return Err(EngineError::Query("empty query".to_string()));
    }

    let mut clauses: Vec<Clause> = Vec::new();
    let mut pending: Option<&'static str> = None;
    let mut negate = false;
    let mut require = false;

    for lexeme in lexemes {
        match lexeme {
            Lexeme::And | Lexeme::Or => {
                let op = if matches!(lexeme, Lexeme::And) { "AND" } else { "OR" };
                if clauses.is_empty() || pending.is_some() || negate {
                    return Err(EngineError::Query(format!("dangling {op}")));
                }
                if op == "AND"
                    && let Some(last) = clauses.last_mut()
                    && last.occur == Occur::Should
                {
                    last.occur = Occur::Must;
                }
                require = op == "AND";
                pending = Some(op);
            }
            Lexeme::Not => {
                if negate {
                    return Err(EngineError::Query("dangling NOT".to_string()));
                }
                negate = true;
            }
            Lexeme::Clause(mut clause) => {
                if negate {
                    clause.occur = Occur::MustNot;
                } else if require && clause.occur == Occur::Should {
                    clause.occur = Occur::Must;
                }
                clauses.push(clause);
                pending = None;
                negate = false;
                require = false;
            }
        }
    }

    if let Some(op) = pending {
        return Err(EngineError::Query(format!("dangling {op}")));
    }
    if negate {
        return Err(EngineError::Query("dangling NOT".to_string()));
    }
    Ok(clauses)
}

/// Parses `expr` and resolves it against `default_field`, analyzing words and
/// phrases with the kind `kind_of` reports for their field.
pub fn build_query<F>(default_field: &str, expr: &str, kind_of: F) -> Result<Query, EngineError>
where
    F: Fn(&str) -> Result<FieldKind, EngineError>,
{
    let mut query = BooleanQuery::default();
    for clause in parse_expression(expr)? {
        let field = clause.field.as_deref().unwrap_or(default_field);
        let q = match &clause.text {
            ClauseText::Prefix(prefix) => Query::Prefix {
                field: field.to_string(),
                prefix: prefix.clone(),
            },
            ClauseText::Word(text) | ClauseText::Phrase(text) => {
                match Query::analyzed(field, text, kind_of(field)?) {
                    // nothing left after analysis; the clause narrows nothing
                    Query::Nothing => continue,
                    q => q,
                }
            }
        };
        match clause.occur {
            Occur::Must => query.must.push(q),
            Occur::Should => query.should.push(q),
            Occur::MustNot => query.must_not.push(q),
        }
    }

    if query.must.is_empty() && query.should.is_empty() {
        return Ok(Query::Nothing);
    }
    if query.must_not.is_empty() {
        if query.must.is_empty() && query.should.len() == 1 {
            return Ok(query.should.remove(0));
        }
        if query.should.is_empty() && query.must.len() == 1 {
            return Ok(query.must.remove(0));
        }
    }
    Ok(Query::Boolean(query))
}

fn lex(expr: &str) -> Result<Vec<Lexeme>, EngineError> {
    let mut out = Vec::new();
    let mut chars = expr.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let occur = match first {
            '+' => Occur::Must,
            '-' => Occur::MustNot,
            _ => Occur::Should,
        };
        if occur != Occur::Should {
            chars.next();
        }

        let mut word = String::new();
        let mut field = None;
        let mut trailing_star = false;
        let mut phrase = None;

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| EngineError::Query("dangling escape".to_string()))?;
                    word.push(escaped);
                    trailing_star = false;
                }
                ':' if field.is_none() => {
                    if word.is_empty() {
                        return Err(EngineError::Query("empty field name".to_string()));
                    }
                    field = Some(std::mem::take(&mut word));
                    trailing_star = false;
                }
                '"' if word.is_empty() => {
                    let mut text = String::new();
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some(ch) => text.push(ch),
                            None => {
                                return Err(EngineError::Query("unterminated quote".to_string()));
                            }
                        }
                    }
                    phrase = Some(text);
                    break;
                }
                '*' => {
                    word.push(c);
                    trailing_star = true;
                }
                _ => {
                    word.push(c);
                    trailing_star = false;
                }
            }
        }

        let text = if let Some(text) = phrase {
            ClauseText::Phrase(text)
        } else if trailing_star {
            word.pop();
            ClauseText::Prefix(word)
        } else if word.is_empty() {
            return Err(EngineError::Query("empty term".to_string()));
        } else {
            if occur == Occur::Should && field.is_none() {
                let op = match word.as_str() {
                    "AND" | "&&" => Some(Lexeme::And),
                    "OR" | "||" => Some(Lexeme::Or),
                    "NOT" => Some(Lexeme::Not),
                    _ => None,
                };
                if let Some(op) = op {
                    out.push(op);
                    continue;
                }
            }
            ClauseText::Word(word)
        };

        out.push(Lexeme::Clause(Clause { occur, field, text }));
    }

    Ok(out)
}

/// Escapes `term` so it parses back as a single literal word.
///
/// Pair it with an explicit `field:` prefix when the term may spell an
/// operator (`AND`, `OR`, `NOT`).
pub fn escape(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if c.is_whitespace() || matches!(c, '\\' | '"' | '*' | ':' | '+' | '-') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct Fixture(BTreeMap<(String, String), BTreeSet<u64>>);

    impl Fixture {
        fn new(entries: &[(&str, &str, Vec<u64>)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(f, t, ids)| ((f.to_string(), t.to_string()), ids.iter().copied().collect()))
                    .collect(),
            )
        }
    }

    impl TermIndex for Fixture {
        fn postings(&self, field: &str, term: &str) -> Result<BTreeSet<u64>, EngineError> {
            Ok(self
                .0
                .get(&(field.to_string(), term.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        fn prefix_postings(&self, field: &str, prefix: &str) -> Result<BTreeSet<u64>, EngineError> {
            Ok(self
                .0
                .iter()
                .filter(|((f, t), _)| f == field && t.starts_with(prefix))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect())
        }
    }

    fn atomic(_: &str) -> Result<FieldKind, EngineError> {
        Ok(FieldKind::Atomic)
    }

    fn ids(q: &Query, index: &Fixture) -> Vec<u64> {
        q.matches(index).unwrap().into_iter().collect()
    }

    #[test]
    fn single_word_resolves_to_term_in_default_field() {
        let q = build_query("cn", "Foo", atomic).unwrap();
        assert_eq!(q, Query::term("cn", "Foo"));
    }

    #[test]
    fn field_prefix_overrides_default_field() {
        let q = build_query("cn", "jn:sample.jar", atomic).unwrap();
        assert_eq!(q, Query::term("jn", "sample.jar"));
    }

    #[test]
    fn prefix_terms_keep_their_case() {
        let q = build_query("cn", "StrU*", atomic).unwrap();
        assert_eq!(
            q,
            Query::Prefix {
                field: "cn".into(),
                prefix: "StrU".into()
            }
        );
    }

    #[test]
    fn escaped_star_is_literal() {
        let q = build_query("cn", r"A\*", atomic).unwrap();
        assert_eq!(q, Query::term("cn", "A*"));
    }

    #[test]
    fn boolean_operators_and_modifiers() {
        let index = Fixture::new(&[
            ("cn", "Foo", vec![1, 2]),
            ("pn", "a", vec![2, 3]),
            ("jn", "x.jar", vec![2]),
        ]);

        let and = build_query("cn", "Foo AND pn:a", atomic).unwrap();
        assert_eq!(ids(&and, &index), vec![2]);

        let or = build_query("cn", "Foo OR pn:a", atomic).unwrap();
        assert_eq!(ids(&or, &index), vec![1, 2, 3]);

        let not = build_query("cn", "Foo -jn:x.jar", atomic).unwrap();
        assert_eq!(ids(&not, &index), vec![1]);

        let not_kw = build_query("cn", "+Foo NOT jn:x.jar", atomic).unwrap();
        assert_eq!(ids(&not_kw, &index), vec![1]);
    }

    #[test]
    fn pure_negation_matches_nothing() {
        let index = Fixture::new(&[("cn", "Foo", vec![1])]);
        let q = build_query("cn", "-Bar", atomic).unwrap();
        assert!(ids(&q, &index).is_empty());
    }

    #[test]
    fn phrases_on_tokenized_fields_require_every_token() {
        let index = Fixture::new(&[("d", "red", vec![1, 2]), ("d", "car", vec![2, 3])]);
        let q = build_query("d", "\"red car\"", |_| Ok(FieldKind::Tokenized)).unwrap();
        assert_eq!(ids(&q, &index), vec![2]);
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for expr in ["", "   ", "\"open", ":x", "Foo AND", "OR Foo", "NOT", "x:", "a\\"] {
            assert!(
                matches!(build_query("cn", expr, atomic), Err(EngineError::Query(_))),
                "{expr:?} should not parse"
            );
        }
    }

    #[test]
    fn empty_conjunction_is_nothing() {
        assert_eq!(Query::all_of(Vec::new()), Query::Nothing);
        assert_eq!(
            Query::analyzed("d", "...", FieldKind::Tokenized),
            Query::Nothing
        );
    }

    #[test]
    fn escaped_terms_parse_as_one_literal_word() {
        let raw = "my lib-1.0*.jar";
        let clauses = parse_expression(&format!("jn:{}", escape(raw))).unwrap();
        assert_eq!(
            clauses,
            vec![Clause {
                occur: Occur::Should,
                field: Some("jn".to_string()),
                text: ClauseText::Word(raw.to_string()),
            }]
        );
        let clauses = parse_expression(&format!("jn:{}", escape("AND"))).unwrap();
        assert_eq!(clauses[0].text, ClauseText::Word("AND".to_string()));
    }
}
