//! FHIR JSON to RDF/Turtle conversion for the pod transport.
//!
//! Mapping: the resource is a named subject `http://hl7.org/fhir/{Type}/{id}`
//! typed `fhir:{Type}` and marked `fhir:nodeRole fhir:treeRoot`. Every JSON
//! key becomes one `fhir:{key}` predicate. Array elements are blank nodes
//! carrying `fhir:index`; primitive array elements additionally carry their
//! literal under `fhir:value`. Literals are typed xsd:string / xsd:boolean /
//! xsd:integer / xsd:decimal. The mapping is deterministic both ways, so a
//! document written by this module reads back as the same JSON object.

use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Literal, NamedNode, Subject, Term, Triple};
use oxttl::{TurtleParser, TurtleSerializer};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::fhir::Resource;

const FHIR_NS: &str = "http://hl7.org/fhir/";
const LDP_CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";

#[derive(Debug, thiserror::Error)]
pub enum RdfError {
    #[error("Resource has no id element")]
    MissingId,
    #[error("Resource has no resourceType element")]
    MissingType,
    #[error("Invalid IRI: {0}")]
    Iri(#[from] oxrdf::IriParseError),
    #[error("Turtle output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Turtle parse failed: {0}")]
    Parse(String),
    #[error("Unsupported JSON shape at '{0}'")]
    Unsupported(String),
    #[error("No FHIR resource subject in document")]
    NoResource,
}

fn fhir_iri(local: &str) -> Result<NamedNode, RdfError> {
    Ok(NamedNode::new(format!("{}{}", FHIR_NS, local))?)
}

/// Serialize a resource to Turtle.
pub fn resource_to_turtle(resource: &Resource) -> Result<String, RdfError> {
    let type_name = resource.resource_type().ok_or(RdfError::MissingType)?;
    let id = resource.id().ok_or(RdfError::MissingId)?;

    let root = fhir_iri(&format!("{}/{}", type_name, id))?;
    let mut triples = Vec::new();
    triples.push(Triple::new(root.clone(), rdf::TYPE, fhir_iri(type_name)?));
    triples.push(Triple::new(root.clone(), fhir_iri("nodeRole")?, fhir_iri("treeRoot")?));

    for (key, value) in resource.as_map() {
        if key == "resourceType" {
            continue;
        }
        emit(&mut triples, &Subject::from(root.clone()), key, value)?;
    }

    let mut writer = TurtleSerializer::new().for_writer(Vec::new());
    for triple in &triples {
        writer.serialize_triple(triple)?;
    }
    let bytes = writer.finish()?;
    String::from_utf8(bytes).map_err(|e| RdfError::Parse(e.to_string()))
}

fn emit(
    triples: &mut Vec<Triple>,
    subject: &Subject,
    key: &str,
    value: &Value,
) -> Result<(), RdfError> {
    let predicate = fhir_iri(key)?;
    match value {
        Value::Null => {}
        Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            triples.push(Triple::new(subject.clone(), predicate, literal(value)?));
        }
        Value::Object(map) => {
            let node = BlankNode::default();
            triples.push(Triple::new(subject.clone(), predicate, node.clone()));
            emit_entries(triples, &Subject::from(node), map)?;
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let node = BlankNode::default();
                triples.push(Triple::new(subject.clone(), predicate.clone(), node.clone()));
                let element = Subject::from(node);
                triples.push(Triple::new(
                    element.clone(),
                    fhir_iri("index")?,
                    Literal::new_typed_literal(index.to_string(), xsd::INTEGER),
                ));
                match item {
                    Value::Object(map) => emit_entries(triples, &element, map)?,
                    Value::Array(_) => {
                        return Err(RdfError::Unsupported(key.to_string()));
                    }
                    Value::Null => {}
                    primitive => {
                        triples.push(Triple::new(
                            element,
                            fhir_iri("value")?,
                            literal(primitive)?,
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

fn emit_entries(
    triples: &mut Vec<Triple>,
    subject: &Subject,
    map: &Map<String, Value>,
) -> Result<(), RdfError> {
    for (key, value) in map {
        emit(triples, subject, key, value)?;
    }
    Ok(())
}

fn literal(value: &Value) -> Result<Literal, RdfError> {
    match value {
        Value::String(s) => Ok(Literal::new_simple_literal(s.as_str())),
        Value::Bool(b) => Ok(Literal::new_typed_literal(b.to_string(), xsd::BOOLEAN)),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Ok(Literal::new_typed_literal(n.to_string(), xsd::INTEGER))
            } else {
                Ok(Literal::new_typed_literal(n.to_string(), xsd::DECIMAL))
            }
        }
        other => Err(RdfError::Unsupported(other.to_string())),
    }
}

/// Parse a Turtle document back into a resource.
pub fn turtle_to_resource(turtle: &str, base_iri: &str) -> Result<Resource, RdfError> {
    let triples = parse_triples(turtle, Some(base_iri))?;

    let mut by_subject: HashMap<String, Vec<(String, Term)>> = HashMap::new();
    for triple in &triples {
        by_subject
            .entry(triple.subject.to_string())
            .or_default()
            .push((triple.predicate.as_str().to_string(), triple.object.clone()));
    }

    // The resource root is the named subject typed within the FHIR namespace
    let (root_key, type_name) = triples
        .iter()
        .find_map(|t| {
            if t.predicate.as_str() != rdf::TYPE.as_str() {
                return None;
            }
            if !matches!(t.subject, Subject::NamedNode(_)) {
                return None;
            }
            match &t.object {
                Term::NamedNode(n) => n
                    .as_str()
                    .strip_prefix(FHIR_NS)
                    .filter(|local| !local.contains('/'))
                    .map(|local| (t.subject.to_string(), local.to_string())),
                _ => None,
            }
        })
        .ok_or(RdfError::NoResource)?;

    let mut map = build_object(&root_key, &by_subject)?;
    map.insert("resourceType".to_string(), Value::String(type_name));
    Resource::from_value(Value::Object(map)).map_err(|e| RdfError::Parse(e.to_string()))
}

fn build_object(
    subject_key: &str,
    by_subject: &HashMap<String, Vec<(String, Term)>>,
) -> Result<Map<String, Value>, RdfError> {
    let mut grouped: Vec<(String, Vec<&Term>)> = Vec::new();
    if let Some(entries) = by_subject.get(subject_key) {
        for (predicate, object) in entries {
            if predicate == rdf::TYPE.as_str() {
                continue;
            }
            let Some(local) = predicate.strip_prefix(FHIR_NS) else {
                continue;
            };
            if local == "nodeRole" {
                continue;
            }
            match grouped.iter_mut().find(|(key, _)| key == local) {
                Some((_, terms)) => terms.push(object),
                None => grouped.push((local.to_string(), vec![object])),
            }
        }
    }

    let mut map = Map::new();
    for (key, terms) in grouped {
        map.insert(key, terms_to_value(&terms, by_subject)?);
    }
    Ok(map)
}

fn terms_to_value(
    terms: &[&Term],
    by_subject: &HashMap<String, Vec<(String, Term)>>,
) -> Result<Value, RdfError> {
    let mut converted = Vec::with_capacity(terms.len());
    for term in terms {
        converted.push(term_to_node(term, by_subject)?);
    }

    let is_array = converted.iter().any(|(index, _)| index.is_some());
    if is_array {
        converted.sort_by_key(|(index, _)| index.unwrap_or(u64::MAX));
        Ok(Value::Array(converted.into_iter().map(|(_, v)| v).collect()))
    } else if converted.len() == 1 {
        Ok(converted.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null))
    } else {
        // Repeated predicate without index markers; keep document order
        Ok(Value::Array(converted.into_iter().map(|(_, v)| v).collect()))
    }
}

/// Convert one term to JSON, returning the element's `fhir:index` when it
/// was serialized as an array element.
fn term_to_node(
    term: &Term,
    by_subject: &HashMap<String, Vec<(String, Term)>>,
) -> Result<(Option<u64>, Value), RdfError> {
    match term {
        Term::Literal(lit) => Ok((None, literal_to_value(lit))),
        Term::NamedNode(_) | Term::BlankNode(_) => {
            let key = term.to_string();
            let mut map = build_object(&key, by_subject)?;

            let index = map
                .remove("index")
                .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));

            // An array element holding only fhir:value is a primitive;
            // plain objects with a literal `value` key keep their shape
            if index.is_some() && map.len() == 1 {
                if let Some(value) = map.get("value") {
                    if !value.is_object() && !value.is_array() {
                        let value = value.clone();
                        return Ok((index, value));
                    }
                }
            }
            Ok((index, Value::Object(map)))
        }
        other => Err(RdfError::Unsupported(other.to_string())),
    }
}

fn literal_to_value(literal: &Literal) -> Value {
    let datatype = literal.datatype();
    if datatype == xsd::BOOLEAN {
        match literal.value() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::String(other.to_string()),
        }
    } else if datatype == xsd::INTEGER {
        literal
            .value()
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(literal.value().to_string()))
    } else if datatype == xsd::DECIMAL || datatype == xsd::DOUBLE {
        literal
            .value()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(literal.value().to_string()))
    } else {
        Value::String(literal.value().to_string())
    }
}

/// Check that a Turtle document parses. Used to validate serializer output
/// before it is written to the pod.
pub fn validate_turtle(turtle: &str) -> Result<(), RdfError> {
    parse_triples(turtle, None).map(|_| ())
}

/// URIs of all `ldp:contains` members of a container listing.
pub fn container_contents(turtle: &str, base_iri: &str) -> Result<Vec<String>, RdfError> {
    let triples = parse_triples(turtle, Some(base_iri))?;
    Ok(triples
        .into_iter()
        .filter(|t| t.predicate.as_str() == LDP_CONTAINS)
        .filter_map(|t| match t.object {
            Term::NamedNode(n) => Some(n.as_str().to_string()),
            _ => None,
        })
        .collect())
}

fn parse_triples(turtle: &str, base_iri: Option<&str>) -> Result<Vec<Triple>, RdfError> {
    let mut parser = TurtleParser::new();
    if let Some(base) = base_iri {
        parser = parser.with_base_iri(base)?;
    }
    let mut triples = Vec::new();
    for result in parser.for_reader(turtle.as_bytes()) {
        triples.push(result.map_err(|e| RdfError::Parse(e.to_string()))?);
    }
    Ok(triples)
}
