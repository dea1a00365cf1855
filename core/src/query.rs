//! Search, filter, sort and paging parameters for collection endpoints.
//!
//! # Design
//! A `Query` is an immutable-once-built description of what the caller
//! wants; `Query::build` turns it into `QueryParams`, the exact key/value
//! pairs the delivery API expects (`sys.id[in]=finn,jake`,
//! `order=-sys.createdAt`, ...). Operand kinds are checked when a `Filter`
//! is constructed, so a `Query` only ever holds well-formed filters and
//! `build` can only fail on collisions between parts of the query.
//!
//! `QueryParams` is backed by a `BTreeMap`, so identical queries always
//! produce byte-identical parameters regardless of the order filters were
//! added in.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{ApiError, ApiResult};

// ---------------------------------------------------------------------------
// Field paths
// ---------------------------------------------------------------------------

/// A dotted path into a resource, e.g. `sys.id` or `fields.likes`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> ApiResult<Self> {
        let path = path.into();
        let valid = !path.is_empty()
            && path.split('.').all(|segment| {
                !segment.is_empty()
                    && !segment
                        .chars()
                        .any(|c| c.is_whitespace() || matches!(c, '[' | ']' | ',' | '&' | '='))
            });
        if !valid {
            return Err(ApiError::InvalidFieldPath(path));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FieldPath {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::new(s)
    }
}

// ---------------------------------------------------------------------------
// Operators and operands
// ---------------------------------------------------------------------------

/// Comparison applied by a `Filter`. Everything but `Equals` is written as a
/// bracketed suffix on the field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    /// Matches if the field holds any of the listed values.
    In,
    /// Matches if the field holds none of the listed values.
    NotIn,
    /// Matches if an array field holds every listed value.
    All,
    Exists,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Full-text search scoped to one field.
    Match,
    /// Sort by distance from a point.
    Near,
    /// Restrict to a bounding box.
    Within,
}

impl Operator {
    /// Bracketed suffix used on the wire, `None` for equality.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Operator::Equals => None,
            Operator::NotEquals => Some("ne"),
            Operator::In => Some("in"),
            Operator::NotIn => Some("nin"),
            Operator::All => Some("all"),
            Operator::Exists => Some("exists"),
            Operator::LessThan => Some("lt"),
            Operator::LessThanOrEqual => Some("lte"),
            Operator::GreaterThan => Some("gt"),
            Operator::GreaterThanOrEqual => Some("gte"),
            Operator::Match => Some("match"),
            Operator::Near => Some("near"),
            Operator::Within => Some("within"),
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let op = match suffix {
            "ne" => Operator::NotEquals,
            "in" => Operator::In,
            "nin" => Operator::NotIn,
            "all" => Operator::All,
            "exists" => Operator::Exists,
            "lt" => Operator::LessThan,
            "lte" => Operator::LessThanOrEqual,
            "gt" => Operator::GreaterThan,
            "gte" => Operator::GreaterThanOrEqual,
            "match" => Operator::Match,
            "near" => Operator::Near,
            "within" => Operator::Within,
            _ => return None,
        };
        Some(op)
    }

    fn name(self) -> &'static str {
        self.suffix().unwrap_or("eq")
    }

    fn takes_list(self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::All | Operator::Near | Operator::Within
        )
    }
}

/// A single operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    /// Always held in UTC; any caller timezone is normalised on conversion.
    Date(DateTime<Utc>),
}

impl Scalar {
    /// Wire representation of this value.
    pub fn encode(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Integer(n) => n.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    fn is_numeric(&self) -> bool {
        match self {
            Scalar::Integer(_) => true,
            Scalar::Number(n) => n.is_finite(),
            _ => false,
        }
    }

    fn is_ordered(&self) -> bool {
        self.is_numeric() || matches!(self, Scalar::Date(_))
    }

    /// Best-effort reinterpretation of raw text as a number, boolean or date.
    fn coerce(self) -> Scalar {
        let text = match self {
            Scalar::Text(text) => text,
            other => return other,
        };
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Scalar::Integer(n);
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return Scalar::Number(n);
        }
        match trimmed {
            "true" => return Scalar::Bool(true),
            "false" => return Scalar::Bool(false),
            _ => {}
        }
        if let Ok(d) = DateTime::parse_from_rfc3339(trimmed) {
            return Scalar::Date(d.with_timezone(&Utc));
        }
        Scalar::Text(text)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Integer(n)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Scalar::Integer(n.into())
    }
}

impl From<u32> for Scalar {
    fn from(n: u32) -> Self {
        Scalar::Integer(n.into())
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Scalar {
    fn from(d: DateTime<Tz>) -> Self {
        Scalar::Date(d.with_timezone(&Utc))
    }
}

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A rectangle given by its four edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

/// The right-hand side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl Operand {
    pub fn encode(&self) -> String {
        match self {
            Operand::Scalar(s) => s.encode(),
            Operand::List(values) => values
                .iter()
                .map(Scalar::encode)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Reinterpret raw text the way the untyped parameter form does:
    /// comma-separated lists for list operators, numbers, booleans and
    /// dates where the operator expects them.
    fn coerce_for(self, operator: Operator) -> Operand {
        let coerce_items = |items: Vec<Scalar>| -> Vec<Scalar> {
            match operator {
                Operator::Near | Operator::Within => {
                    items.into_iter().map(Scalar::coerce).collect()
                }
                _ => items,
            }
        };
        match self {
            Operand::Scalar(Scalar::Text(text)) if operator.takes_list() => Operand::List(
                coerce_items(text.split(',').map(|s| Scalar::Text(s.to_string())).collect()),
            ),
            Operand::Scalar(s) if operator.takes_list() => Operand::List(vec![s]),
            Operand::List(items) => Operand::List(coerce_items(items)),
            Operand::Scalar(s) => match operator {
                Operator::Exists
                | Operator::LessThan
                | Operator::LessThanOrEqual
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual => Operand::Scalar(s.coerce()),
                _ => Operand::Scalar(s),
            },
        }
    }
}

impl From<Scalar> for Operand {
    fn from(s: Scalar) -> Self {
        Operand::Scalar(s)
    }
}

impl From<Vec<Scalar>> for Operand {
    fn from(values: Vec<Scalar>) -> Self {
        Operand::List(values)
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Scalar(s.into())
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Operand::Scalar(s.into())
    }
}

impl From<i64> for Operand {
    fn from(n: i64) -> Self {
        Operand::Scalar(n.into())
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Operand::Scalar(b.into())
    }
}

impl From<Vec<&str>> for Operand {
    fn from(values: Vec<&str>) -> Self {
        Operand::List(values.into_iter().map(Scalar::from).collect())
    }
}

impl From<GeoPoint> for Operand {
    fn from(p: GeoPoint) -> Self {
        Operand::List(vec![Scalar::Number(p.lat), Scalar::Number(p.lon)])
    }
}

impl From<BoundingBox> for Operand {
    fn from(b: BoundingBox) -> Self {
        Operand::List(vec![
            Scalar::Number(b.north),
            Scalar::Number(b.west),
            Scalar::Number(b.south),
            Scalar::Number(b.east),
        ])
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// One condition over a field. All filters in a `Query` must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: FieldPath,
    operator: Operator,
    operand: Operand,
}

impl Filter {
    pub fn new(field: &str, operator: Operator, operand: impl Into<Operand>) -> ApiResult<Self> {
        let field = FieldPath::new(field)?;
        let operand = operand.into();
        check_operand(&field, operator, &operand)?;
        Ok(Self {
            field,
            operator,
            operand,
        })
    }

    /// Parse an untyped `path[op]` key. Text operands are coerced the way
    /// the untyped form expects: `"finn,jake"` becomes a list for `[in]`,
    /// `"false"` a boolean for `[exists]`, `"38,-122"` two numbers for
    /// `[near]`.
    pub fn from_raw(key: &str, operand: impl Into<Operand>) -> ApiResult<Self> {
        let (path, operator) = match key.find('[') {
            None => (key, Operator::Equals),
            Some(open) => {
                let suffix = key[open + 1..].strip_suffix(']').unwrap_or("");
                let operator =
                    Operator::from_suffix(suffix).ok_or_else(|| ApiError::InvalidOperandKind {
                        field: key[..open].to_string(),
                        operator: suffix.to_string(),
                        expected: "a known operator",
                    })?;
                (&key[..open], operator)
            }
        };
        let operand: Operand = operand.into();
        Filter::new(path, operator, operand.coerce_for(operator))
    }

    pub fn equals(field: &str, value: impl Into<Scalar>) -> ApiResult<Self> {
        Filter::new(field, Operator::Equals, Operand::Scalar(value.into()))
    }

    pub fn not_equals(field: &str, value: impl Into<Scalar>) -> ApiResult<Self> {
        Filter::new(field, Operator::NotEquals, Operand::Scalar(value.into()))
    }

    pub fn includes_any<I, S>(field: &str, values: I) -> ApiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Filter::new(field, Operator::In, list(values))
    }

    pub fn excludes_all<I, S>(field: &str, values: I) -> ApiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Filter::new(field, Operator::NotIn, list(values))
    }

    pub fn includes_all<I, S>(field: &str, values: I) -> ApiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Filter::new(field, Operator::All, list(values))
    }

    pub fn exists(field: &str, present: bool) -> ApiResult<Self> {
        Filter::new(field, Operator::Exists, Operand::Scalar(Scalar::Bool(present)))
    }

    pub fn lt(field: &str, value: impl Into<Scalar>) -> ApiResult<Self> {
        Filter::new(field, Operator::LessThan, Operand::Scalar(value.into()))
    }

    pub fn lte(field: &str, value: impl Into<Scalar>) -> ApiResult<Self> {
        Filter::new(field, Operator::LessThanOrEqual, Operand::Scalar(value.into()))
    }

    pub fn gt(field: &str, value: impl Into<Scalar>) -> ApiResult<Self> {
        Filter::new(field, Operator::GreaterThan, Operand::Scalar(value.into()))
    }

    pub fn gte(field: &str, value: impl Into<Scalar>) -> ApiResult<Self> {
        Filter::new(field, Operator::GreaterThanOrEqual, Operand::Scalar(value.into()))
    }

    pub fn matches(field: &str, text: impl Into<String>) -> ApiResult<Self> {
        Filter::new(field, Operator::Match, Operand::Scalar(Scalar::Text(text.into())))
    }

    pub fn near(field: &str, point: GeoPoint) -> ApiResult<Self> {
        Filter::new(field, Operator::Near, point)
    }

    pub fn within(field: &str, bounds: BoundingBox) -> ApiResult<Self> {
        Filter::new(field, Operator::Within, bounds)
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Wire key: the field path plus the operator suffix.
    pub fn key(&self) -> String {
        match self.operator.suffix() {
            Some(suffix) => format!("{}[{suffix}]", self.field),
            None => self.field.to_string(),
        }
    }

    /// Wire value of the operand.
    pub fn value(&self) -> String {
        self.operand.encode()
    }
}

fn list<I, S>(values: I) -> Operand
where
    I: IntoIterator<Item = S>,
    S: Into<Scalar>,
{
    Operand::List(values.into_iter().map(Into::into).collect())
}

fn check_operand(field: &FieldPath, operator: Operator, operand: &Operand) -> ApiResult<()> {
    let (ok, expected) = match operator {
        Operator::Equals | Operator::NotEquals => {
            (matches!(operand, Operand::Scalar(_)), "a single value")
        }
        Operator::In | Operator::NotIn | Operator::All => (
            matches!(operand, Operand::List(v) if !v.is_empty()),
            "a non-empty list",
        ),
        Operator::Exists => (
            matches!(operand, Operand::Scalar(Scalar::Bool(_))),
            "a boolean",
        ),
        Operator::LessThan
        | Operator::LessThanOrEqual
        | Operator::GreaterThan
        | Operator::GreaterThanOrEqual => (
            matches!(operand, Operand::Scalar(s) if s.is_ordered()),
            "a number or a date",
        ),
        Operator::Match => (
            matches!(operand, Operand::Scalar(Scalar::Text(_))),
            "text",
        ),
        Operator::Near => (
            matches!(operand, Operand::List(v) if v.len() == 2 && v.iter().all(Scalar::is_numeric)),
            "two numbers (lat, lon)",
        ),
        Operator::Within => (
            matches!(operand, Operand::List(v) if v.len() == 4 && v.iter().all(Scalar::is_numeric)),
            "four numbers (north, west, south, east)",
        ),
    };
    if ok {
        Ok(())
    } else {
        Err(ApiError::InvalidOperandKind {
            field: field.to_string(),
            operator: operator.name().to_string(),
            expected,
        })
    }
}

// ---------------------------------------------------------------------------
// Sorting, locales, MIME groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One key of a multi-field sort. Later keys break ties of earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: FieldPath,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: &str) -> ApiResult<Self> {
        Ok(Self {
            field: FieldPath::new(field)?,
            direction: SortDirection::Ascending,
        })
    }

    pub fn desc(field: &str) -> ApiResult<Self> {
        Ok(Self {
            field: FieldPath::new(field)?,
            direction: SortDirection::Descending,
        })
    }

    /// Parse one element of an `order` value; a leading `-` means descending.
    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim().strip_prefix('-') {
            Some(path) => SortKey::desc(path),
            None => SortKey::asc(raw.trim()),
        }
    }

    fn encode(&self) -> String {
        match self.direction {
            SortDirection::Ascending => self.field.to_string(),
            SortDirection::Descending => format!("-{}", self.field),
        }
    }
}

/// Which locale(s) the server should return field values in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocaleSelector {
    Specific(String),
    /// Every locale; fields come back as per-locale maps.
    All,
}

impl LocaleSelector {
    pub const WILDCARD: &'static str = "*";

    pub fn encode(&self) -> &str {
        match self {
            LocaleSelector::Specific(code) => code,
            LocaleSelector::All => Self::WILDCARD,
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw == Self::WILDCARD {
            LocaleSelector::All
        } else {
            LocaleSelector::Specific(raw.to_string())
        }
    }
}

/// Asset MIME type families accepted by `mimetype_group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeTypeGroup {
    Attachment,
    Plaintext,
    Image,
    Audio,
    Video,
    Richtext,
    Presentation,
    Spreadsheet,
    PdfDocument,
    Archive,
    Code,
    Markup,
}

impl MimeTypeGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            MimeTypeGroup::Attachment => "attachment",
            MimeTypeGroup::Plaintext => "plaintext",
            MimeTypeGroup::Image => "image",
            MimeTypeGroup::Audio => "audio",
            MimeTypeGroup::Video => "video",
            MimeTypeGroup::Richtext => "richtext",
            MimeTypeGroup::Presentation => "presentation",
            MimeTypeGroup::Spreadsheet => "spreadsheet",
            MimeTypeGroup::PdfDocument => "pdfdocument",
            MimeTypeGroup::Archive => "archive",
            MimeTypeGroup::Code => "code",
            MimeTypeGroup::Markup => "markup",
        }
    }
}

impl FromStr for MimeTypeGroup {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let group = match s {
            "attachment" => MimeTypeGroup::Attachment,
            "plaintext" => MimeTypeGroup::Plaintext,
            "image" => MimeTypeGroup::Image,
            "audio" => MimeTypeGroup::Audio,
            "video" => MimeTypeGroup::Video,
            "richtext" => MimeTypeGroup::Richtext,
            "presentation" => MimeTypeGroup::Presentation,
            "spreadsheet" => MimeTypeGroup::Spreadsheet,
            "pdfdocument" => MimeTypeGroup::PdfDocument,
            "archive" => MimeTypeGroup::Archive,
            "code" => MimeTypeGroup::Code,
            "markup" => MimeTypeGroup::Markup,
            _ => {
                return Err(ApiError::InvalidOperandKind {
                    field: keys::MIMETYPE_GROUP.to_string(),
                    operator: "eq".to_string(),
                    expected: "a known MIME type group",
                })
            }
        };
        Ok(group)
    }
}

/// Reserved top-level parameter names.
pub mod keys {
    pub const CONTENT_TYPE: &str = "content_type";
    pub const QUERY: &str = "query";
    pub const ORDER: &str = "order";
    pub const LIMIT: &str = "limit";
    pub const SKIP: &str = "skip";
    pub const LOCALE: &str = "locale";
    pub const MIMETYPE_GROUP: &str = "mimetype_group";
    pub const INCLUDE: &str = "include";
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Everything a collection request can say about which items to return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    content_type: Option<String>,
    filters: Vec<Filter>,
    full_text: Option<String>,
    order: Vec<SortKey>,
    limit: Option<u32>,
    skip: Option<u32>,
    locale: Option<LocaleSelector>,
    mime_type_group: Option<MimeTypeGroup>,
    include: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from the untyped key/value form. Reserved keys map to
    /// their dedicated settings; every other key is parsed with
    /// `Filter::from_raw`.
    pub fn from_raw<I, K, V>(pairs: I) -> ApiResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Operand>,
    {
        let mut query = Query::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            let operand: Operand = value.into();
            query = match key {
                keys::CONTENT_TYPE => query.content_type(operand.encode()),
                keys::QUERY => query.full_text(operand.encode()),
                keys::LOCALE => query.locale(LocaleSelector::parse(&operand.encode())),
                keys::ORDER => {
                    let mut q = query;
                    for raw in operand.encode().split(',') {
                        q = q.order_by(SortKey::parse(raw)?);
                    }
                    q
                }
                keys::LIMIT => query.limit(raw_count(key, &operand)?),
                keys::SKIP => query.skip(raw_count(key, &operand)?),
                keys::INCLUDE => query.include(raw_count(key, &operand)?),
                keys::MIMETYPE_GROUP => query.mime_type_group(operand.encode().parse()?),
                _ => query.filter(Filter::from_raw(key, operand)?),
            };
        }
        Ok(query)
    }

    pub fn content_type(mut self, id: impl Into<String>) -> Self {
        self.content_type = Some(id.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Search all text and symbol fields.
    pub fn full_text(mut self, term: impl Into<String>) -> Self {
        self.full_text = Some(term.into());
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.order.push(key);
        self
    }

    /// Page size, sent as is. The server rejects values above 1000.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn locale(mut self, locale: LocaleSelector) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn mime_type_group(mut self, group: MimeTypeGroup) -> Self {
        self.mime_type_group = Some(group);
        self
    }

    /// Depth of linked resources the server should embed in `includes`.
    pub fn include(mut self, levels: u32) -> Self {
        self.include = Some(levels);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn locale_selector(&self) -> Option<&LocaleSelector> {
        self.locale.as_ref()
    }

    /// Encode into wire parameters.
    pub fn build(&self) -> ApiResult<QueryParams> {
        let mut params = QueryParams::default();
        if let Some(content_type) = &self.content_type {
            if content_type.is_empty() {
                return Err(ApiError::InvalidOperandKind {
                    field: keys::CONTENT_TYPE.to_string(),
                    operator: "eq".to_string(),
                    expected: "a non-empty content type id",
                });
            }
            params.insert(keys::CONTENT_TYPE, content_type.clone())?;
        }
        for filter in &self.filters {
            params.insert(filter.key(), filter.value())?;
        }
        if let Some(term) = &self.full_text {
            params.insert(keys::QUERY, term.clone())?;
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(SortKey::encode)
                .collect::<Vec<_>>()
                .join(",");
            params.insert(keys::ORDER, order)?;
        }
        if let Some(limit) = self.limit {
            params.insert(keys::LIMIT, limit.to_string())?;
        }
        if let Some(skip) = self.skip {
            params.insert(keys::SKIP, skip.to_string())?;
        }
        if let Some(locale) = &self.locale {
            params.insert(keys::LOCALE, locale.encode().to_string())?;
        }
        if let Some(group) = self.mime_type_group {
            params.insert(keys::MIMETYPE_GROUP, group.as_str().to_string())?;
        }
        if let Some(include) = self.include {
            params.insert(keys::INCLUDE, include.to_string())?;
        }
        Ok(params)
    }
}

fn raw_count(key: &str, operand: &Operand) -> ApiResult<u32> {
    let parsed = match operand {
        Operand::Scalar(Scalar::Integer(n)) => u32::try_from(*n).ok(),
        Operand::Scalar(Scalar::Text(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::InvalidOperandKind {
        field: key.to_string(),
        operator: "eq".to_string(),
        expected: "a non-negative integer",
    })
}

/// Wire parameters produced by `Query::build`, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    fn insert(&mut self, key: impl Into<String>, value: String) -> ApiResult<()> {
        let key = key.into();
        if self.0.contains_key(&key) {
            return Err(ApiError::DuplicateParameter(key));
        }
        self.0.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.0.into_iter().collect()
    }
}

impl IntoIterator for QueryParams {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;

    fn pairs(params: QueryParams) -> Vec<(String, String)> {
        params.into_pairs()
    }

    fn kv(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn content_type_equality_has_no_suffix() {
        let params = Query::new()
            .filter(Filter::equals("content_type", "cat").unwrap())
            .build()
            .unwrap();
        assert_eq!(pairs(params), vec![kv("content_type", "cat")]);
    }

    #[test]
    fn inclusion_list_is_comma_joined_in_order() {
        let params = Query::new()
            .filter(Filter::includes_any("sys.id", ["finn", "jake"]).unwrap())
            .build()
            .unwrap();
        assert_eq!(pairs(params), vec![kv("sys.id[in]", "finn,jake")]);
    }

    #[test]
    fn exclusion_list_keeps_duplicates() {
        let filter = Filter::excludes_all("fields.likes", ["rainbows", "lasagna", "rainbows"]).unwrap();
        assert_eq!(filter.key(), "fields.likes[nin]");
        assert_eq!(filter.value(), "rainbows,lasagna,rainbows");
    }

    #[test]
    fn descending_sort_gets_minus_prefix() {
        let params = Query::new()
            .order_by(SortKey::desc("sys.createdAt").unwrap())
            .build()
            .unwrap();
        assert_eq!(pairs(params), vec![kv("order", "-sys.createdAt")]);
    }

    #[test]
    fn multi_key_sort_preserves_order() {
        let params = Query::new()
            .order_by(SortKey::asc("sys.revision").unwrap())
            .order_by(SortKey::desc("sys.id").unwrap())
            .build()
            .unwrap();
        assert_eq!(params.get("order"), Some("sys.revision,-sys.id"));
    }

    #[test]
    fn exists_serializes_lowercase_booleans() {
        let present = Filter::exists("sys.archivedVersion", false).unwrap();
        assert_eq!(present.key(), "sys.archivedVersion[exists]");
        assert_eq!(present.value(), "false");
        assert_eq!(Filter::exists("fields.image", true).unwrap().value(), "true");
    }

    #[test]
    fn dates_are_normalised_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2016, 1, 1, 2, 30, 0).unwrap();
        let filter = Filter::lte("sys.updatedAt", local).unwrap();
        assert_eq!(filter.key(), "sys.updatedAt[lte]");
        assert_eq!(filter.value(), "2016-01-01T00:30:00.000Z");
    }

    #[test]
    fn range_operators_accept_numbers() {
        assert_eq!(Filter::gte("fields.lives", 3).unwrap().key(), "fields.lives[gte]");
        assert_eq!(Filter::lt("fields.lives", 9).unwrap().value(), "9");
        assert_eq!(Filter::gt("fields.weight", 2.5).unwrap().value(), "2.5");
    }

    #[test]
    fn range_operators_reject_text() {
        let err = Filter::lte("fields.name", "cat").unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperandKind { .. }));
    }

    #[test]
    fn full_text_and_field_match() {
        let params = Query::new()
            .content_type("dog")
            .filter(Filter::matches("fields.description", "bacon pancakes").unwrap())
            .full_text("bacon")
            .build()
            .unwrap();
        assert_eq!(
            pairs(params),
            vec![
                kv("content_type", "dog"),
                kv("fields.description[match]", "bacon pancakes"),
                kv("query", "bacon"),
            ]
        );
    }

    #[test]
    fn geo_filters_encode_coordinates() {
        let near = Filter::near("fields.center", GeoPoint { lat: 38.0, lon: -122.0 }).unwrap();
        assert_eq!(near.key(), "fields.center[near]");
        assert_eq!(near.value(), "38,-122");

        let bounds = BoundingBox {
            north: 40.0,
            west: -124.0,
            south: 36.0,
            east: -121.5,
        };
        let within = Filter::within("fields.center", bounds).unwrap();
        assert_eq!(within.key(), "fields.center[within]");
        assert_eq!(within.value(), "40,-124,36,-121.5");
    }

    #[test]
    fn near_requires_two_numbers() {
        let three = vec![Scalar::Number(1.0), Scalar::Number(2.0), Scalar::Number(3.0)];
        let err = Filter::new("fields.center", Operator::Near, three).unwrap_err();
        assert!(matches!(
            err,
            ApiError::InvalidOperandKind { ref operator, .. } if operator == "near"
        ));

        let text = vec![Scalar::from("a"), Scalar::from("b")];
        assert!(Filter::new("fields.center", Operator::Near, text).is_err());
    }

    #[test]
    fn within_requires_four_numbers() {
        let two = GeoPoint { lat: 1.0, lon: 2.0 };
        let err = Filter::new("fields.center", Operator::Within, two).unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperandKind { .. }));
    }

    #[test]
    fn inclusion_rejects_scalar_and_empty_list() {
        assert!(Filter::new("sys.id", Operator::In, "finn").is_err());
        assert!(Filter::includes_any("sys.id", Vec::<String>::new()).is_err());
    }

    #[test]
    fn exists_rejects_non_boolean() {
        assert!(Filter::new("sys.id", Operator::Exists, "yes").is_err());
    }

    #[test]
    fn invalid_field_paths_are_rejected() {
        for bad in ["", ".", "fields.", "sys..id", "fields.a b", "sys.id[ne]"] {
            let err = Filter::equals(bad, "x").unwrap_err();
            assert!(matches!(err, ApiError::InvalidFieldPath(_)), "{bad:?}");
        }
    }

    #[test]
    fn limit_and_skip_pass_through_unchanged() {
        let params = Query::new().limit(5000).skip(3).build().unwrap();
        assert_eq!(params.get("limit"), Some("5000"));
        assert_eq!(params.get("skip"), Some("3"));
    }

    #[test]
    fn locale_selector_encodes_code_or_wildcard() {
        let specific = Query::new()
            .locale(LocaleSelector::Specific("tlh".to_string()))
            .build()
            .unwrap();
        assert_eq!(specific.get("locale"), Some("tlh"));

        let all = Query::new().locale(LocaleSelector::All).build().unwrap();
        assert_eq!(all.get("locale"), Some("*"));
    }

    #[test]
    fn mime_type_group_and_include() {
        let params = Query::new()
            .mime_type_group(MimeTypeGroup::Image)
            .include(2)
            .build()
            .unwrap();
        assert_eq!(
            pairs(params),
            vec![kv("include", "2"), kv("mimetype_group", "image")]
        );
    }

    #[test]
    fn build_is_independent_of_filter_order() {
        let a = Query::new()
            .content_type("cat")
            .filter(Filter::equals("fields.likes", "lasagna").unwrap())
            .filter(Filter::not_equals("sys.id", "nyancat").unwrap())
            .build()
            .unwrap();
        let b = Query::new()
            .filter(Filter::not_equals("sys.id", "nyancat").unwrap())
            .filter(Filter::equals("fields.likes", "lasagna").unwrap())
            .content_type("cat")
            .build()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn colliding_keys_are_reported() {
        let err = Query::new()
            .content_type("cat")
            .filter(Filter::equals("content_type", "dog").unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateParameter(ref k) if k == "content_type"));
    }

    #[test]
    fn empty_content_type_is_rejected() {
        let err = Query::new().content_type("").build().unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperandKind { .. }));
    }

    #[test]
    fn raw_keys_are_parsed_and_coerced() {
        let query = Query::from_raw([
            ("sys.id[in]", Operand::from("finn,jake")),
            ("sys.archivedVersion[exists]", Operand::from("false")),
            ("fields.center[near]", Operand::from("38,-122")),
            ("order", Operand::from("sys.revision,-sys.id")),
            ("limit", Operand::from(3i64)),
            ("locale", Operand::from("*")),
        ])
        .unwrap();

        assert_eq!(query.filters()[0].operator(), Operator::In);
        assert_eq!(
            query.filters()[1].operand(),
            &Operand::Scalar(Scalar::Bool(false))
        );
        assert_eq!(query.locale_selector(), Some(&LocaleSelector::All));

        let params = query.build().unwrap();
        assert_eq!(
            pairs(params),
            vec![
                kv("fields.center[near]", "38,-122"),
                kv("limit", "3"),
                kv("locale", "*"),
                kv("order", "sys.revision,-sys.id"),
                kv("sys.archivedVersion[exists]", "false"),
                kv("sys.id[in]", "finn,jake"),
            ]
        );
    }

    #[test]
    fn raw_unknown_operator_is_rejected() {
        let err = Filter::from_raw("sys.id[like]", "nyan").unwrap_err();
        assert!(matches!(
            err,
            ApiError::InvalidOperandKind { ref operator, .. } if operator == "like"
        ));
    }

    #[test]
    fn raw_within_with_three_values_is_rejected() {
        assert!(Filter::from_raw("fields.center[within]", "40,-124,36").is_err());
        assert!(Filter::from_raw("fields.center[within]", "40,-124,36,-121").is_ok());
    }

    #[test]
    fn raw_date_comparison_is_normalised() {
        let filter = Filter::from_raw("sys.updatedAt[lte]", "2016-01-01T02:00:00+02:00").unwrap();
        assert_eq!(filter.value(), "2016-01-01T00:00:00.000Z");
    }

    #[test]
    fn raw_limit_must_be_a_count() {
        assert!(Query::from_raw([("limit", "many")]).is_err());
        assert!(Query::from_raw([("mimetype_group", "hologram")]).is_err());
    }
}
