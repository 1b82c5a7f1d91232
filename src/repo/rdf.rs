//! RDF serialization of stored quads for export, import and backups.

use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use oxrdf::{BlankNode, GraphName, Literal as OxLiteral, NamedNode, Subject};
use oxttl::nquads::WriterNQuadsSerializer;
use oxttl::trig::WriterTriGSerializer;
use oxttl::{NQuadsParser, NQuadsSerializer, TriGParser, TriGSerializer};
use quads::{Quad, Term};
use tracing::warn;

use super::error::RepoError;
use super::vocab;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum RdfFormat {
    #[default]
    TriG,
    NQuads,
}

impl RdfFormat {
    pub(crate) fn name(self) -> &'static str {
        match self {
            RdfFormat::TriG => "trig",
            RdfFormat::NQuads => "nquads",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<RdfFormat> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trig" => Some(RdfFormat::TriG),
            "nquads" | "n-quads" => Some(RdfFormat::NQuads),
            _ => None,
        }
    }
}

fn named_node(iri: &str) -> Result<NamedNode> {
    NamedNode::new(iri).with_context(|| format!("unable to serialize IRI {iri:?}"))
}

fn subject_to_ox(term: &Term) -> Result<Subject> {
    Ok(match term {
        Term::Iri(iri) => named_node(iri)?.into(),
        Term::Blank(id) => BlankNode::new(id)?.into(),
        Term::Literal(_) => bail!("literal in subject position"),
    })
}

fn term_to_ox(term: &Term) -> Result<oxrdf::Term> {
    Ok(match term {
        Term::Iri(iri) => named_node(iri)?.into(),
        Term::Blank(id) => BlankNode::new(id)?.into(),
        Term::Literal(literal) => match (&literal.lang, &literal.datatype) {
            (Some(lang), _) => OxLiteral::new_language_tagged_literal(&literal.value, lang)?.into(),
            (None, Some(datatype)) if datatype != vocab::XSD_STRING => {
                OxLiteral::new_typed_literal(&literal.value, named_node(datatype)?).into()
            }
            (None, _) => OxLiteral::new_simple_literal(&literal.value).into(),
        },
    })
}

pub(crate) fn to_ox(quad: &Quad) -> Result<oxrdf::Quad> {
    let graph_name = match &quad.graph {
        Term::Iri(iri) => GraphName::NamedNode(named_node(iri)?),
        Term::Blank(id) => GraphName::BlankNode(BlankNode::new(id)?),
        Term::Literal(_) => bail!("literal graph name"),
    };
    let Term::Iri(predicate) = &quad.predicate else {
        bail!("non-IRI predicate");
    };
    Ok(oxrdf::Quad::new(
        subject_to_ox(&quad.subject)?,
        named_node(predicate)?,
        term_to_ox(&quad.object)?,
        graph_name,
    ))
}

/// Converts a parsed quad. Default-graph statements have no place in the
/// store and give `None`.
#[allow(unreachable_patterns)]
pub(crate) fn from_ox(quad: oxrdf::Quad) -> Option<Quad> {
    let subject = match quad.subject {
        Subject::NamedNode(node) => Term::Iri(node.into_string()),
        Subject::BlankNode(node) => Term::Blank(node.into_string()),
        _ => return None,
    };
    let object = match quad.object {
        oxrdf::Term::NamedNode(node) => Term::Iri(node.into_string()),
        oxrdf::Term::BlankNode(node) => Term::Blank(node.into_string()),
        oxrdf::Term::Literal(literal) => {
            let (value, datatype, lang) = literal.destruct();
            match (lang, datatype) {
                (Some(lang), _) => Term::lang_literal(value, lang),
                (None, Some(datatype)) if datatype.as_str() != vocab::XSD_STRING => {
                    Term::typed_literal(value, datatype.into_string())
                }
                (None, _) => Term::literal(value),
            }
        }
        _ => return None,
    };
    let graph = match quad.graph_name {
        GraphName::NamedNode(node) => Term::Iri(node.into_string()),
        GraphName::BlankNode(node) => Term::Blank(node.into_string()),
        GraphName::DefaultGraph => return None,
    };
    Some(Quad::new(
        subject,
        Term::Iri(quad.predicate.into_string()),
        object,
        graph,
    ))
}

/// Streams quads into a writer in either format.
pub(crate) enum QuadWriter<W: Write> {
    TriG(WriterTriGSerializer<W>),
    NQuads(WriterNQuadsSerializer<W>),
}

impl<W: Write> QuadWriter<W> {
    pub(crate) fn new(writer: W, format: RdfFormat) -> QuadWriter<W> {
        match format {
            RdfFormat::TriG => QuadWriter::TriG(TriGSerializer::new().for_writer(writer)),
            RdfFormat::NQuads => QuadWriter::NQuads(NQuadsSerializer::new().for_writer(writer)),
        }
    }

    pub(crate) fn write(&mut self, quad: &Quad) -> Result<()> {
        let quad = to_ox(quad)?;
        match self {
            QuadWriter::TriG(serializer) => serializer.serialize_quad(&quad),
            QuadWriter::NQuads(serializer) => serializer.serialize_quad(&quad),
        }
        .context("unable to write quad")
    }

    pub(crate) fn finish(self) -> Result<W> {
        match self {
            QuadWriter::TriG(serializer) => serializer.finish().context("unable to finish TriG"),
            QuadWriter::NQuads(serializer) => Ok(serializer.finish()),
        }
    }
}

pub(crate) fn write_quads<W: Write>(writer: W, format: RdfFormat, quads: &[Quad]) -> Result<W> {
    let mut out = QuadWriter::new(writer, format);
    for quad in quads {
        out.write(quad)?;
    }
    out.finish()
}

/// Parses a whole document. Syntax errors are malformed input; statements
/// outside named graphs are dropped.
pub(crate) fn read_quads<R: Read>(reader: R, format: RdfFormat) -> Result<Vec<Quad>> {
    match format {
        RdfFormat::TriG => collect_quads(TriGParser::new().for_reader(reader)),
        RdfFormat::NQuads => collect_quads(NQuadsParser::new().for_reader(reader)),
    }
}

fn collect_quads(
    parsed: impl Iterator<Item = Result<oxrdf::Quad, oxttl::TurtleParseError>>,
) -> Result<Vec<Quad>> {
    let mut quads = vec![];
    let mut skipped = 0usize;
    for quad in parsed {
        let quad = quad.map_err(|e| RepoError::MalformedInput(e.to_string()))?;
        match from_ox(quad) {
            Some(quad) => quads.push(quad),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(target: "transfer", skipped, "dropped statements outside named graphs");
    }
    Ok(quads)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use quads::{Quad, Term};

    use super::{RdfFormat, read_quads, write_quads};
    use crate::repo::vocab;

    fn sample() -> Vec<Quad> {
        let g = Term::iri("http://example.org/1/metadata/1");
        let s = Term::iri("http://example.org/1/resource/1");
        vec![
            Quad::new(
                s.clone(),
                Term::iri(vocab::DC_TITLE),
                Term::lang_literal("Titel", "de"),
                g.clone(),
            ),
            Quad::new(
                s.clone(),
                Term::iri(vocab::DC_CREATED),
                Term::typed_literal("2024-01-01T00:00:00Z", vocab::XSD_DATETIME),
                g.clone(),
            ),
            Quad::new(s, Term::iri("urn:p"), Term::blank("b0"), g),
        ]
    }

    #[test]
    fn both_formats_read_back() -> Result<()> {
        for format in [RdfFormat::TriG, RdfFormat::NQuads] {
            let bytes = write_quads(vec![], format, &sample())?;
            let back = read_quads(bytes.as_slice(), format)?;
            assert_eq!(back.len(), 3, "{format:?}");
            assert!(back.contains(&sample()[0]));
            assert!(back.contains(&sample()[1]));
        }
        Ok(())
    }

    #[test]
    fn default_graph_is_dropped_and_garbage_is_malformed() -> Result<()> {
        let doc = "<urn:s> <urn:p> \"x\" .\n<urn:s> <urn:p> \"y\" <urn:g> .\n";
        let quads = read_quads(doc.as_bytes(), RdfFormat::NQuads)?;
        assert_eq!(quads.len(), 1);
        assert_eq!(quads[0].graph, Term::iri("urn:g"));
        assert!(read_quads("<urn:s> <urn:p".as_bytes(), RdfFormat::NQuads).is_err());
        assert_eq!(RdfFormat::from_name("N-Quads"), Some(RdfFormat::NQuads));
        Ok(())
    }
}
