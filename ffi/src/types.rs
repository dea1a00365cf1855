//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! tagged enums with explicit discriminants. Conversion functions live here
//! to keep `lib.rs` focused on the `extern "C"` surface.
//!
//! Parsed collections cross the boundary as JSON text with every resolved
//! link inlined, since a C caller has no use for the arena handles.

use std::collections::HashSet;
use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use serde_json::{json, Map, Value};

use delivery_core::{
    ApiError, Asset, DeliveryClient, EntryCollection, EntryRef, FieldValue, HttpMethod,
    HttpRequest, ItemRef, LinkGraph, Query,
};

/// Opaque handle to a `DeliveryClient`. C callers receive a pointer to this
/// and pass it back into every FFI function.
pub struct FfiClient {
    pub(crate) inner: DeliveryClient,
}

/// Opaque handle to a `Query` under construction.
pub struct FfiQuery {
    pub(crate) inner: Query,
}

/// Copy `s` into a heap C string. Interior NULs cannot be represented and
/// yield an empty string.
pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

/// Hand a vector to C as a pointer + length. Empty vectors become null.
fn leak_vec<T>(items: Vec<T>) -> (*mut T, u32) {
    if items.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let len = items.len() as u32;
    let boxed = items.into_boxed_slice();
    (Box::into_raw(boxed) as *mut T, len)
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
pub enum FfiHttpMethod {
    Get = 0,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
        }
    }
}

/// A key-value pair of C strings, used for headers and query parameters.
#[repr(C)]
pub struct FfiPair {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
///
/// Built by `cda_build_*` functions. `url` is ready to use as is; `path`
/// and `query` are the same request split apart for callers that encode
/// query strings themselves.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *mut c_char,
    pub path: *mut c_char,
    pub query: *mut FfiPair,
    pub query_len: u32,
    pub headers: *mut FfiPair,
    pub headers_len: u32,
}

fn pairs(items: Vec<(String, String)>) -> (*mut FfiPair, u32) {
    leak_vec(
        items
            .into_iter()
            .map(|(k, v)| FfiPair {
                key: c_string(k),
                value: c_string(v),
            })
            .collect(),
    )
}

impl FfiHttpRequest {
    /// Convert a core `HttpRequest` into a heap-allocated `FfiHttpRequest`.
    /// Returns null if the request URL cannot be formed.
    pub(crate) fn from_core(req: HttpRequest) -> *mut Self {
        let Ok(url) = req.url() else {
            return std::ptr::null_mut();
        };
        let (query, query_len) = pairs(req.query);
        let (headers, headers_len) = pairs(req.headers);
        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            url: c_string(url),
            path: c_string(req.path),
            query,
            query_len,
            headers,
            headers_len,
        }))
    }
}

/// Release the strings and arrays owned by a request produced by
/// `from_core`. The struct itself is freed by the caller.
///
/// # Safety
/// Every pointer must have come from `from_core` and not been freed yet.
pub(crate) unsafe fn free_request_fields(req: &FfiHttpRequest) {
    unsafe {
        free_string(req.url);
        free_string(req.path);
        free_pairs(req.query, req.query_len);
        free_pairs(req.headers, req.headers_len);
    }
}

unsafe fn free_pairs(ptr: *mut FfiPair, len: u32) {
    if ptr.is_null() || len == 0 {
        return;
    }
    let slice = std::ptr::slice_from_raw_parts_mut(ptr, len as usize);
    let items = unsafe { Box::from_raw(slice) };
    for pair in items.iter() {
        unsafe {
            free_string(pair.key);
            free_string(pair.value);
        }
    }
}

pub(crate) unsafe fn free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

// ---------------------------------------------------------------------------
// Response input (caller-provided, not heap-allocated by us)
// ---------------------------------------------------------------------------

/// A response header supplied by the caller.
#[repr(C)]
pub struct FfiHeaderRef {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// An HTTP response described as C-compatible plain data.
///
/// The C caller constructs this on the stack after executing an HTTP request,
/// then passes a pointer to a `cda_parse_*` function. The FFI layer reads
/// but does not free these fields. `headers` may be null when `headers_len`
/// is zero.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub headers: *const FfiHeaderRef,
    pub headers_len: u32,
    pub body: *const c_char,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned by query setters and in `FfiResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    NotFound = 1,
    Http = 2,
    Deserialization = 3,
    /// Malformed field path, operand or duplicate parameter.
    InvalidQuery = 4,
    Locale = 5,
    Request = 6,
    Config = 7,
    Cancelled = 8,
    Panic = 9,
    NullArg = 10,
}

impl From<&ApiError> for FfiErrorCode {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::InvalidFieldPath(_)
            | ApiError::InvalidOperandKind { .. }
            | ApiError::DuplicateParameter(_) => FfiErrorCode::InvalidQuery,
            ApiError::LocaleNotWildcardFetched { .. } => FfiErrorCode::Locale,
            ApiError::NotFound => FfiErrorCode::NotFound,
            ApiError::HttpError { .. } => FfiErrorCode::Http,
            ApiError::Request(_) => FfiErrorCode::Request,
            ApiError::DeserializationError(_)
            | ApiError::FieldType { .. }
            | ApiError::MissingField { .. }
            | ApiError::ContentTypeMismatch { .. } => FfiErrorCode::Deserialization,
            ApiError::Config(_) => FfiErrorCode::Config,
            ApiError::Cancelled => FfiErrorCode::Cancelled,
        }
    }
}

/// Tag that tells `cda_free_result` what `FfiResult::data` points to.
#[repr(C)]
pub enum FfiDataTag {
    None = 0,
    /// A NUL-terminated JSON document.
    Json = 1,
}

/// Result envelope for all parse operations.
///
/// On success `error_code` is `Ok`, `error_message` is null, and `data`
/// points to the parsed payload (tagged by `data_tag`).
/// On failure `error_code` describes the category, `error_message` is a
/// human-readable C string, and `data` is null. `request_id` is set when
/// the server identified the failed request.
#[repr(C)]
pub struct FfiResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub request_id: *mut c_char,
    pub data_tag: FfiDataTag,
    pub data: *mut c_void,
}

impl FfiResult {
    fn boxed(self) -> *mut Self {
        Box::into_raw(Box::new(self))
    }

    fn failure(error_code: FfiErrorCode, msg: &str, http_status: u16) -> Self {
        FfiResult {
            error_code,
            error_message: c_string(msg),
            http_status,
            request_id: std::ptr::null_mut(),
            data_tag: FfiDataTag::None,
            data: std::ptr::null_mut(),
        }
    }

    /// Build a success result carrying a JSON document.
    pub(crate) fn ok_json(value: &Value) -> *mut Self {
        FfiResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            http_status: 0,
            request_id: std::ptr::null_mut(),
            data_tag: FfiDataTag::Json,
            data: c_string(value.to_string()) as *mut c_void,
        }
        .boxed()
    }

    /// Build an error result from an `ApiError`.
    pub(crate) fn from_error(err: ApiError) -> *mut Self {
        let http_status = err.status().unwrap_or(0);
        let mut result = FfiResult::failure((&err).into(), &err.to_string(), http_status);
        if let ApiError::HttpError {
            request_id: Some(id),
            ..
        } = &err
        {
            result.request_id = c_string(id.as_str());
        }
        result.boxed()
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        FfiResult::failure(FfiErrorCode::NullArg, &format!("null argument: {name}"), 0).boxed()
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        FfiResult::failure(FfiErrorCode::Panic, msg, 0).boxed()
    }
}

// ---------------------------------------------------------------------------
// Collection rendering
// ---------------------------------------------------------------------------

/// Render a parsed collection as JSON with resolved links inlined.
///
/// Primary items always carry their full body. A linked entry is inlined
/// the first time it is reached and rendered as a plain link afterwards,
/// so each entry body appears at most once below the top level and a
/// cycle back to an ancestor ends in a link.
pub(crate) fn render_collection(collection: &EntryCollection) -> Value {
    let graph = &collection.graph;
    let mut expanded = HashSet::new();
    let items: Vec<Value> = graph
        .items()
        .iter()
        .map(|item| match item {
            ItemRef::Entry(r) => {
                expanded.insert(*r);
                render_entry_body(graph, *r, &mut expanded)
            }
            ItemRef::Asset(r) => graph.asset(*r).map_or(Value::Null, render_asset),
        })
        .collect();
    json!({
        "total": collection.total,
        "skip": collection.skip,
        "limit": collection.limit,
        "items": items,
    })
}

fn render_linked_entry(graph: &LinkGraph, r: EntryRef, expanded: &mut HashSet<EntryRef>) -> Value {
    if expanded.insert(r) {
        return render_entry_body(graph, r, expanded);
    }
    graph.entry(r).map_or(Value::Null, |entry| {
        json!({"sys": {"type": "Link", "linkType": "Entry", "id": entry.id()}})
    })
}

fn render_entry_body(graph: &LinkGraph, r: EntryRef, expanded: &mut HashSet<EntryRef>) -> Value {
    let Some(entry) = graph.entry(r) else {
        return Value::Null;
    };
    let mut fields = Map::new();
    for name in entry.field_names() {
        if let Some(value) = entry.field(name) {
            fields.insert(name.to_string(), render_value(graph, value, expanded));
        }
    }
    json!({
        "sys": serde_json::to_value(entry.sys()).unwrap_or(Value::Null),
        "fields": fields,
    })
}

fn render_asset(asset: &Asset) -> Value {
    let mut fields = Map::new();
    if let Some(title) = asset.title() {
        fields.insert("title".to_string(), json!(title));
    }
    if let Some(description) = asset.description() {
        fields.insert("description".to_string(), json!(description));
    }
    if let Some(file) = asset.file() {
        fields.insert(
            "file".to_string(),
            serde_json::to_value(file).unwrap_or(Value::Null),
        );
    }
    json!({
        "sys": serde_json::to_value(asset.sys()).unwrap_or(Value::Null),
        "fields": fields,
    })
}

fn render_value(graph: &LinkGraph, value: &FieldValue, expanded: &mut HashSet<EntryRef>) -> Value {
    match value {
        FieldValue::Text(s) => json!(s),
        FieldValue::Integer(n) => json!(n),
        FieldValue::Number(n) => json!(n),
        FieldValue::Boolean(b) => json!(b),
        FieldValue::Location(point) => json!({"lat": point.lat, "lon": point.lon}),
        FieldValue::Object(v) => v.clone(),
        FieldValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| render_value(graph, item, expanded))
                .collect(),
        ),
        FieldValue::Link(link) => serde_json::to_value(link).unwrap_or(Value::Null),
        FieldValue::Entry(r) => render_linked_entry(graph, *r, expanded),
        FieldValue::Asset(r) => graph.asset(*r).map_or(Value::Null, render_asset),
        FieldValue::Localized(per_locale) => Value::Object(
            per_locale
                .iter()
                .map(|(code, v)| (code.clone(), render_value(graph, v, expanded)))
                .collect(),
        ),
    }
}
