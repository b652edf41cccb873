//! YAML front-matter codec
//!
//! A ticket file is two `---` fences bounding a YAML mapping, followed by
//! the Markdown body. Parsing is tolerant: unknown keys are preserved (in
//! order) for round-trip, missing optional keys default to their zero
//! values. Serialization emits a fixed key order so that parse → serialize
//! is byte-stable, which keeps diffs meaningful.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_yaml::{Mapping, Value};

use super::{Relation, DEFAULT_PRIORITY};

/// Front-matter fields before the id/path/status are attached by the store.
#[derive(Debug, Clone)]
pub struct RawTicket {
    pub priority: u32,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub related: Vec<Relation>,
    pub content: String,
    pub extra: Mapping,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing opening front-matter fence")]
    MissingOpeningFence,
    #[error("missing closing front-matter fence")]
    MissingClosingFence,
    #[error("front matter is not a YAML mapping")]
    NotAMapping,
    #[error("invalid YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("field `{field}`: {reason}")]
    Field { field: &'static str, reason: String },
}

fn field_err(field: &'static str, reason: impl Into<String>) -> ParseError {
    ParseError::Field {
        field,
        reason: reason.into(),
    }
}

const KNOWN_KEYS: &[&str] = &[
    "priority",
    "description",
    "created_at",
    "started_at",
    "closed_at",
    "related",
];

/// Split fences and decode the YAML mapping.
pub fn parse(text: &str) -> Result<RawTicket, ParseError> {
    let rest = text
        .strip_prefix("---\n")
        .ok_or(ParseError::MissingOpeningFence)?;
    let (yaml, content) = match rest.split_once("\n---\n") {
        Some((yaml, content)) => (yaml, content),
        // A file may end right at the closing fence with no body.
        None => match rest.strip_suffix("\n---") {
            Some(yaml) => (yaml, ""),
            None => return Err(ParseError::MissingClosingFence),
        },
    };

    let mapping: Mapping = match serde_yaml::from_str::<Value>(yaml)? {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        _ => return Err(ParseError::NotAMapping),
    };

    let priority = match mapping.get("priority") {
        None | Some(Value::Null) => DEFAULT_PRIORITY,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| field_err("priority", format!("not a small positive integer: {n}")))?,
        Some(other) => {
            return Err(field_err("priority", format!("unexpected type: {other:?}")));
        }
    };

    let description = match mapping.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(field_err("description", format!("unexpected type: {other:?}")));
        }
    };

    let created_at = parse_timestamp(&mapping, "created_at")?
        .ok_or_else(|| field_err("created_at", "required timestamp missing"))?;
    let started_at = parse_timestamp(&mapping, "started_at")?;
    let closed_at = parse_timestamp(&mapping, "closed_at")?;

    let related = match mapping.get("related") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(seq)) => seq
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(Relation::parse(s)),
                other => Err(field_err("related", format!("non-string entry: {other:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(field_err("related", format!("unexpected type: {other:?}")));
        }
    };

    let mut extra = Mapping::new();
    for (key, value) in &mapping {
        let keep = match key.as_str() {
            Some(name) => !KNOWN_KEYS.contains(&name),
            None => true,
        };
        if keep {
            extra.insert(key.clone(), value.clone());
        }
    }

    Ok(RawTicket {
        priority,
        description,
        created_at,
        started_at,
        closed_at,
        related,
        content: content.to_string(),
        extra,
    })
}

fn parse_timestamp(
    mapping: &Mapping,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, ParseError> {
    match mapping.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| field_err(field, format!("not RFC3339: {e}"))),
        Some(other) => Err(field_err(field, format!("unexpected type: {other:?}"))),
    }
}

fn timestamp_value(ts: Option<DateTime<Utc>>) -> Value {
    match ts {
        Some(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => Value::Null,
    }
}

/// Emit the canonical file text: fixed key order, `null` for unset
/// timestamps, `related` omitted when empty, unknown keys last in their
/// preserved order.
pub fn serialize(ticket: &RawTicket) -> String {
    let mut mapping = Mapping::new();
    mapping.insert(
        Value::String("priority".to_string()),
        Value::Number(ticket.priority.into()),
    );
    mapping.insert(
        Value::String("description".to_string()),
        Value::String(ticket.description.clone()),
    );
    mapping.insert(
        Value::String("created_at".to_string()),
        timestamp_value(Some(ticket.created_at)),
    );
    mapping.insert(
        Value::String("started_at".to_string()),
        timestamp_value(ticket.started_at),
    );
    mapping.insert(
        Value::String("closed_at".to_string()),
        timestamp_value(ticket.closed_at),
    );
    if !ticket.related.is_empty() {
        mapping.insert(
            Value::String("related".to_string()),
            Value::Sequence(
                ticket
                    .related
                    .iter()
                    .map(|r| Value::String(r.to_string()))
                    .collect(),
            ),
        );
    }
    for (key, value) in &ticket.extra {
        mapping.insert(key.clone(), value.clone());
    }

    // serde_yaml always terminates the mapping with a newline.
    let yaml = serde_yaml::to_string(&mapping).expect("front matter is always serializable");
    format!("---\n{yaml}---\n{}", ticket.content)
}
