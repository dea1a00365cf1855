//! Evaluation of the delivery API's search parameters over JSON resources.
//!
//! Conditions are evaluated against a resource already rendered for one
//! locale, so `fields.name` is a plain value rather than a per-locale map.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

pub const MAX_LIMIT: usize = 1000;
pub const DEFAULT_LIMIT: usize = 100;
const MAX_INCLUDE: usize = 10;
const DEFAULT_INCLUDE: usize = 1;

/// A search parameter the server cannot evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidQuery(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleChoice {
    Single(String),
    Wildcard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    In,
    Nin,
    All,
    Exists,
    Lt,
    Lte,
    Gt,
    Gte,
    Match,
    Near,
    Within,
}

impl Op {
    fn parse(suffix: &str) -> Option<Op> {
        let op = match suffix {
            "ne" => Op::Ne,
            "in" => Op::In,
            "nin" => Op::Nin,
            "all" => Op::All,
            "exists" => Op::Exists,
            "lt" => Op::Lt,
            "lte" => Op::Lte,
            "gt" => Op::Gt,
            "gte" => Op::Gte,
            "match" => Op::Match,
            "near" => Op::Near,
            "within" => Op::Within,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone)]
struct Condition {
    path: Vec<String>,
    op: Op,
    value: String,
}

#[derive(Debug, Clone)]
struct SortKey {
    path: Vec<String>,
    descending: bool,
}

/// Parsed search parameters of one collection request.
#[derive(Debug, Clone)]
pub struct Search {
    pub content_type: Option<String>,
    pub locale: LocaleChoice,
    pub limit: usize,
    pub skip: usize,
    pub include: usize,
    pub mimetype_group: Option<String>,
    full_text: Option<String>,
    conditions: Vec<Condition>,
    order: Vec<SortKey>,
    near: Option<(Vec<String>, f64, f64)>,
}

fn split_path(path: &str) -> Result<Vec<String>, InvalidQuery> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(InvalidQuery(format!("invalid field path {path:?}")));
    }
    Ok(segments)
}

fn parse_count(key: &str, value: &str) -> Result<usize, InvalidQuery> {
    value
        .parse()
        .map_err(|_| InvalidQuery(format!("{key} must be a non-negative integer")))
}

fn parse_numbers(value: &str, count: usize) -> Option<Vec<f64>> {
    let numbers = value
        .split(',')
        .map(|n| n.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    (numbers.len() == count).then_some(numbers)
}

impl Search {
    pub fn parse(params: &[(String, String)], default_locale: &str) -> Result<Self, InvalidQuery> {
        let mut search = Search {
            content_type: None,
            locale: LocaleChoice::Single(default_locale.to_string()),
            limit: DEFAULT_LIMIT,
            skip: 0,
            include: DEFAULT_INCLUDE,
            mimetype_group: None,
            full_text: None,
            conditions: Vec::new(),
            order: Vec::new(),
            near: None,
        };
        for (key, value) in params {
            match key.as_str() {
                "content_type" => search.content_type = Some(value.clone()),
                "query" => search.full_text = Some(value.to_lowercase()),
                "mimetype_group" => search.mimetype_group = Some(value.clone()),
                "locale" if value == "*" => search.locale = LocaleChoice::Wildcard,
                "locale" => search.locale = LocaleChoice::Single(value.clone()),
                "limit" => {
                    search.limit = parse_count(key, value)?;
                    if search.limit > MAX_LIMIT {
                        return Err(InvalidQuery(format!(
                            "limit must be at most {MAX_LIMIT}"
                        )));
                    }
                }
                "skip" => search.skip = parse_count(key, value)?,
                "include" => {
                    search.include = parse_count(key, value)?;
                    if search.include > MAX_INCLUDE {
                        return Err(InvalidQuery(format!(
                            "include must be at most {MAX_INCLUDE}"
                        )));
                    }
                }
                "order" => {
                    for raw in value.split(',') {
                        let (path, descending) = match raw.strip_prefix('-') {
                            Some(path) => (path, true),
                            None => (raw, false),
                        };
                        search.order.push(SortKey {
                            path: split_path(path)?,
                            descending,
                        });
                    }
                }
                _ => search.push_condition(key, value)?,
            }
        }
        Ok(search)
    }

    fn push_condition(&mut self, key: &str, value: &str) -> Result<(), InvalidQuery> {
        let (path, op) = match key.split_once('[') {
            Some((path, rest)) => {
                let suffix = rest
                    .strip_suffix(']')
                    .ok_or_else(|| InvalidQuery(format!("malformed parameter {key:?}")))?;
                let op = Op::parse(suffix)
                    .ok_or_else(|| InvalidQuery(format!("unknown operator {suffix:?}")))?;
                (path, op)
            }
            None => (key, Op::Eq),
        };
        let path = split_path(path)?;
        match op {
            Op::Near => {
                let point = parse_numbers(value, 2)
                    .ok_or_else(|| InvalidQuery(format!("{key} expects lat,lon")))?;
                self.near = Some((path.clone(), point[0], point[1]));
            }
            Op::Within if parse_numbers(value, 4).is_none() => {
                return Err(InvalidQuery(format!("{key} expects four coordinates")));
            }
            Op::Exists if value != "true" && value != "false" => {
                return Err(InvalidQuery(format!("{key} expects true or false")));
            }
            _ => {}
        }
        self.conditions.push(Condition {
            path,
            op,
            value: value.to_string(),
        });
        Ok(())
    }

    /// Whether `doc` satisfies every condition and the full-text term.
    pub fn matches(&self, doc: &Value) -> bool {
        if let Some(content_type) = &self.content_type {
            if doc.pointer("/sys/contentType/sys/id").and_then(Value::as_str)
                != Some(content_type.as_str())
            {
                return false;
            }
        }
        if let Some(term) = &self.full_text {
            if !contains_text(&doc["fields"], term) {
                return false;
            }
        }
        self.conditions.iter().all(|c| c.holds(doc))
    }

    /// Apply `order`, or distance from the `near` point when no order was
    /// given.
    pub fn sort(&self, docs: &mut [Value]) {
        self.sort_with(docs, |doc| doc);
    }

    /// Like `sort`, for items that carry their searchable view alongside.
    pub fn sort_with<T>(&self, items: &mut [T], view: impl Fn(&T) -> &Value) {
        if !self.order.is_empty() {
            items.sort_by(|a, b| {
                let (a, b) = (view(a), view(b));
                self.order
                    .iter()
                    .map(|key| {
                        let ordering = compare_present(lookup(a, &key.path), lookup(b, &key.path));
                        if key.descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        } else if let Some((path, lat, lon)) = &self.near {
            let distance = |doc: &Value| {
                location(lookup(doc, path))
                    .map(|(la, lo)| (la - lat).powi(2) + (lo - lon).powi(2))
                    .unwrap_or(f64::INFINITY)
            };
            items.sort_by(|a, b| distance(view(a)).total_cmp(&distance(view(b))));
        }
    }

    /// Page window over `total` results.
    pub fn window(&self, total: usize) -> std::ops::Range<usize> {
        let start = self.skip.min(total);
        start..(start + self.limit).min(total)
    }
}

impl Condition {
    fn holds(&self, doc: &Value) -> bool {
        let found = lookup(doc, &self.path);
        let value = self.value.as_str();
        match self.op {
            Op::Eq => found.is_some_and(|v| equals(v, value)),
            Op::Ne => !found.is_some_and(|v| equals(v, value)),
            Op::In => found.is_some_and(|v| value.split(',').any(|w| equals(v, w))),
            Op::Nin => !found.is_some_and(|v| value.split(',').any(|w| equals(v, w))),
            Op::All => found.is_some_and(|v| value.split(',').all(|w| equals(v, w))),
            Op::Exists => found.is_some_and(|v| !v.is_null()) == (value == "true"),
            Op::Lt => compare(found, value) == Some(Ordering::Less),
            Op::Lte => matches!(compare(found, value), Some(Ordering::Less | Ordering::Equal)),
            Op::Gt => compare(found, value) == Some(Ordering::Greater),
            Op::Gte => matches!(
                compare(found, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Op::Match => found.is_some_and(|v| {
                let text = v.as_str().unwrap_or_default().to_lowercase();
                value
                    .split_whitespace()
                    .all(|word| text.contains(&word.to_lowercase()))
            }),
            Op::Near => location(found).is_some(),
            Op::Within => match (location(found), parse_numbers(value, 4)) {
                (Some((lat, lon)), Some(b)) => {
                    let (north, west, south, east) = (b[0], b[1], b[2], b[3]);
                    (south..=north).contains(&lat) && (west..=east).contains(&lon)
                }
                _ => false,
            },
        }
    }
}

fn lookup<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |value, segment| value.get(segment))
}

fn location(value: Option<&Value>) -> Option<(f64, f64)> {
    let value = value?;
    Some((value.get("lat")?.as_f64()?, value.get("lon")?.as_f64()?))
}

/// Equality against a wire value. Arrays match when any element matches.
fn equals(value: &Value, wanted: &str) -> bool {
    match value {
        Value::String(s) => s == wanted || same_instant(s, wanted),
        Value::Number(n) => wanted.parse::<f64>().ok() == n.as_f64(),
        Value::Bool(b) => wanted == if *b { "true" } else { "false" },
        Value::Array(items) => items.iter().any(|item| equals(item, wanted)),
        _ => false,
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn same_instant(a: &str, b: &str) -> bool {
    matches!((parse_instant(a), parse_instant(b)), (Some(x), Some(y)) if x == y)
}

fn compare(found: Option<&Value>, wanted: &str) -> Option<Ordering> {
    match found? {
        Value::Number(n) => n.as_f64()?.partial_cmp(&wanted.parse::<f64>().ok()?),
        Value::String(s) => match (parse_instant(s), parse_instant(wanted)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => Some(s.as_str().cmp(wanted)),
        },
        _ => None,
    }
}

/// Order two optional values; missing values sort last.
fn compare_present(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or_default()
            .total_cmp(&y.as_f64().unwrap_or_default()),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn contains_text(value: &Value, term: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(term),
        Value::Array(items) => items.iter().any(|v| contains_text(v, term)),
        Value::Object(map) => {
            // Links carry ids, not text.
            !map.contains_key("sys") && map.values().any(|v| contains_text(v, term))
        }
        _ => false,
    }
}

/// MIME type group of a content type, as used by `mimetype_group`.
pub fn mime_group(mime: &str) -> &'static str {
    match mime {
        m if m.starts_with("image/") => "image",
        m if m.starts_with("audio/") => "audio",
        m if m.starts_with("video/") => "video",
        "application/pdf" => "pdfdocument",
        "text/plain" => "plaintext",
        "text/html" | "application/xml" | "text/xml" => "markup",
        "application/rtf" | "application/msword" => "richtext",
        "application/vnd.ms-excel" | "text/csv" => "spreadsheet",
        "application/vnd.ms-powerpoint" => "presentation",
        "application/zip" | "application/x-tar" | "application/gzip" => "archive",
        "application/json" | "application/javascript" | "text/css" => "code",
        _ => "attachment",
    }
}
