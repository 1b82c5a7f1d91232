use std::fmt::Display;

use anyhow::{Context, Result};
use minicbor::{Decode, Encode};

/// An RDF term as stored in the quad dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub enum Term {
    #[n(0)]
    Iri(#[n(0)] String),
    #[n(1)]
    Blank(#[n(0)] String),
    #[n(2)]
    Literal(#[n(0)] Literal),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct Literal {
    #[n(0)]
    pub value: String,
    #[n(1)]
    pub lang: Option<String>,
    #[n(2)]
    pub datatype: Option<String>,
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Term {
        Term::Iri(iri.into())
    }

    pub fn blank(id: impl Into<String>) -> Term {
        Term::Blank(id.into())
    }

    pub fn literal(value: impl Into<String>) -> Term {
        Term::Literal(Literal {
            value: value.into(),
            lang: None,
            datatype: None,
        })
    }

    pub fn lang_literal(value: impl Into<String>, lang: impl Into<String>) -> Term {
        Term::Literal(Literal {
            value: value.into(),
            lang: Some(lang.into()),
            datatype: None,
        })
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Term {
        Term::Literal(Literal {
            value: value.into(),
            lang: None,
            datatype: Some(datatype.into()),
        })
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    /// Lexical value: the IRI, blank node label or literal value.
    pub fn value(&self) -> &str {
        match self {
            Term::Iri(iri) => iri,
            Term::Blank(id) => id,
            Term::Literal(literal) => &literal.value,
        }
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        minicbor::to_vec(self).context("unable to encode Term")
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Term> {
        minicbor::decode(bytes).context("unable to decode Term")
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Blank(id) => write!(f, "_:{id}"),
            Term::Literal(Literal {
                value,
                lang: Some(lang),
                ..
            }) => write!(f, "{value:?}@{lang}"),
            Term::Literal(Literal {
                value,
                datatype: Some(datatype),
                ..
            }) => write!(f, "{value:?}^^<{datatype}>"),
            Term::Literal(Literal { value, .. }) => write!(f, "{value:?}"),
        }
    }
}

/// A statement inside a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub graph: Term,
}

impl Quad {
    pub fn new(subject: Term, predicate: Term, object: Term, graph: Term) -> Quad {
        Quad {
            subject,
            predicate,
            object,
            graph,
        }
    }
}

/// A statement without its graph, as handed around when whole graphs are
/// read or replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Triple {
        Triple {
            subject,
            predicate,
            object,
        }
    }

    pub fn in_graph(&self, graph: &Term) -> Quad {
        Quad::new(
            self.subject.clone(),
            self.predicate.clone(),
            self.object.clone(),
            graph.clone(),
        )
    }
}

impl From<Quad> for Triple {
    fn from(quad: Quad) -> Triple {
        Triple::new(quad.subject, quad.predicate, quad.object)
    }
}

impl Display for Quad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} .",
            self.subject, self.predicate, self.object, self.graph
        )
    }
}

/// Statement filter. Unbound positions match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub graph: Option<Term>,
}

impl Pattern {
    pub fn any() -> Pattern {
        Pattern::default()
    }

    pub fn subject(mut self, subject: Term) -> Pattern {
        self.subject = Some(subject);
        self
    }

    pub fn predicate(mut self, predicate: Term) -> Pattern {
        self.predicate = Some(predicate);
        self
    }

    pub fn object(mut self, object: Term) -> Pattern {
        self.object = Some(object);
        self
    }

    pub fn graph(mut self, graph: Term) -> Pattern {
        self.graph = Some(graph);
        self
    }

    pub fn matches(&self, quad: &Quad) -> bool {
        fn bound(slot: &Option<Term>, term: &Term) -> bool {
            slot.as_ref().is_none_or(|t| t == term)
        }
        bound(&self.subject, &quad.subject)
            && bound(&self.predicate, &quad.predicate)
            && bound(&self.object, &quad.object)
            && bound(&self.graph, &quad.graph)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{Pattern, Quad, Term};

    #[test]
    fn term_bytes_are_stable() -> Result<()> {
        let term = Term::lang_literal("hej", "sv");
        let bytes = term.to_bytes()?;
        assert_eq!(Term::from_bytes(&bytes)?, term);
        assert_eq!(term.to_bytes()?, bytes);
        Ok(())
    }

    #[test]
    fn pattern_matches_bound_positions_only() {
        let quad = Quad::new(
            Term::iri("http://ex/s"),
            Term::iri("http://ex/p"),
            Term::literal("o"),
            Term::iri("http://ex/g"),
        );
        assert!(Pattern::any().matches(&quad));
        assert!(Pattern::any().graph(Term::iri("http://ex/g")).matches(&quad));
        assert!(!Pattern::any().object(Term::literal("x")).matches(&quad));
    }

    #[test]
    fn display_is_nquads_like() {
        let term = Term::typed_literal("1", "http://www.w3.org/2001/XMLSchema#long");
        assert_eq!(
            term.to_string(),
            "\"1\"^^<http://www.w3.org/2001/XMLSchema#long>"
        );
    }
}
