//! C-ABI wrapper around `delivery-core`.
//!
//! # Overview
//! Exposes query building, request building and collection parsing through
//! `extern "C"` functions so any language with a C FFI can talk to the
//! delivery API without linking to Rust's async runtime or serde directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Queries are built incrementally through an opaque `FfiQuery` handle
//!   using the untyped `field[op]` form; setters report an `FfiErrorCode`.
//! - A single `FfiResult` envelope with `FfiDataTag` + `void* data`
//!   conveys success payloads and errors uniformly.
//! - The C caller owns all returned pointers and must call the matching
//!   `cda_free_*` function to release them.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::catch_unwind;

use delivery_core::{
    ClientConfig, DeliveryClient, Filter, HttpResponse, LocaleSelector, Query, SortKey,
};

use types::*;

/// Borrow a caller C string. Null and invalid UTF-8 yield `None`.
fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a new client for `space_id`.
///
/// `host` and `default_locale` may be null to use the defaults. Returns null
/// if `space_id` is null or the configuration is invalid.
/// The caller must free the returned pointer with `cda_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn cda_client_new(
    space_id: *const c_char,
    host: *const c_char,
    secure: bool,
    default_locale: *const c_char,
) -> *mut FfiClient {
    catch_unwind(|| {
        let Some(space_id) = str_arg(space_id) else {
            return std::ptr::null_mut();
        };
        let mut config = ClientConfig::new(space_id).with_secure(secure);
        if let Some(host) = str_arg(host) {
            config = config.with_host(host);
        }
        if let Some(locale) = str_arg(default_locale) {
            config = config.with_default_locale(locale);
        }
        match DeliveryClient::new(config) {
            Ok(inner) => Box::into_raw(Box::new(FfiClient { inner })),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `cda_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn cda_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(client) });
        });
    }
}

// ---------------------------------------------------------------------------
// Query construction
// ---------------------------------------------------------------------------

/// Create an empty query. Free it with `cda_query_free`.
#[unsafe(no_mangle)]
pub extern "C" fn cda_query_new() -> *mut FfiQuery {
    catch_unwind(|| {
        Box::into_raw(Box::new(FfiQuery {
            inner: Query::new(),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a query created by `cda_query_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn cda_query_free(query: *mut FfiQuery) {
    if !query.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(query) });
        });
    }
}

/// Apply `f` to the query behind `query`.
fn update_query(query: *mut FfiQuery, f: impl FnOnce(Query) -> Query) -> FfiErrorCode {
    if query.is_null() {
        return FfiErrorCode::NullArg;
    }
    let query = unsafe { &mut *query };
    query.inner = f(std::mem::take(&mut query.inner));
    FfiErrorCode::Ok
}

#[unsafe(no_mangle)]
pub extern "C" fn cda_query_set_content_type(
    query: *mut FfiQuery,
    content_type: *const c_char,
) -> FfiErrorCode {
    catch_unwind(|| {
        let Some(id) = str_arg(content_type) else {
            return FfiErrorCode::NullArg;
        };
        update_query(query, |q| q.content_type(id))
    })
    .unwrap_or(FfiErrorCode::Panic)
}

/// Add a filter in the untyped form: `key` is `field` or `field[op]` and
/// `value` is the raw operand, comma-separated for list operators.
///
/// Returns `InvalidQuery` (and leaves the query unchanged) if the key or
/// operand is malformed.
#[unsafe(no_mangle)]
pub extern "C" fn cda_query_add_filter(
    query: *mut FfiQuery,
    key: *const c_char,
    value: *const c_char,
) -> FfiErrorCode {
    catch_unwind(|| {
        let (Some(key), Some(value)) = (str_arg(key), str_arg(value)) else {
            return FfiErrorCode::NullArg;
        };
        let filter = match Filter::from_raw(key, value) {
            Ok(filter) => filter,
            Err(e) => return (&e).into(),
        };
        update_query(query, |q| q.filter(filter))
    })
    .unwrap_or(FfiErrorCode::Panic)
}

/// Append a sort key. A leading `-` sorts descending.
#[unsafe(no_mangle)]
pub extern "C" fn cda_query_order_by(query: *mut FfiQuery, field: *const c_char) -> FfiErrorCode {
    catch_unwind(|| {
        let Some(raw) = str_arg(field) else {
            return FfiErrorCode::NullArg;
        };
        let key = match SortKey::parse(raw) {
            Ok(key) => key,
            Err(e) => return (&e).into(),
        };
        update_query(query, |q| q.order_by(key))
    })
    .unwrap_or(FfiErrorCode::Panic)
}

#[unsafe(no_mangle)]
pub extern "C" fn cda_query_set_limit(query: *mut FfiQuery, limit: u32) -> FfiErrorCode {
    catch_unwind(|| update_query(query, |q| q.limit(limit))).unwrap_or(FfiErrorCode::Panic)
}

#[unsafe(no_mangle)]
pub extern "C" fn cda_query_set_skip(query: *mut FfiQuery, skip: u32) -> FfiErrorCode {
    catch_unwind(|| update_query(query, |q| q.skip(skip))).unwrap_or(FfiErrorCode::Panic)
}

/// Select a locale code, or `*` for every locale.
#[unsafe(no_mangle)]
pub extern "C" fn cda_query_set_locale(
    query: *mut FfiQuery,
    locale: *const c_char,
) -> FfiErrorCode {
    catch_unwind(|| {
        let Some(locale) = str_arg(locale) else {
            return FfiErrorCode::NullArg;
        };
        update_query(query, |q| q.locale(LocaleSelector::parse(locale)))
    })
    .unwrap_or(FfiErrorCode::Panic)
}

// ---------------------------------------------------------------------------
// Build request functions
// ---------------------------------------------------------------------------

/// Build a request for the space itself. Feed the response to
/// `cda_client_use_space`.
#[unsafe(no_mangle)]
pub extern "C" fn cda_build_fetch_space(client: *const FfiClient) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        FfiHttpRequest::from_core(client.inner.build_fetch_space())
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Build a request for the entries matching `query`.
///
/// `query` may be null for an unfiltered request. Returns null if `client`
/// is null or the query produces conflicting parameters.
/// The caller must free the returned pointer with `cda_free_request`.
#[unsafe(no_mangle)]
pub extern "C" fn cda_build_fetch_entries(
    client: *const FfiClient,
    query: *const FfiQuery,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        let built = if query.is_null() {
            client.inner.build_fetch_entries(&Query::new())
        } else {
            client.inner.build_fetch_entries(unsafe { &(*query).inner })
        };
        match built {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Build a request for a single entry and its linked resources.
///
/// `locale` may be null for the space default. Returns null if `client` or
/// `id` is null.
#[unsafe(no_mangle)]
pub extern "C" fn cda_build_fetch_entry(
    client: *const FfiClient,
    id: *const c_char,
    locale: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        let Some(id) = str_arg(id) else {
            return std::ptr::null_mut();
        };
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        let locale = str_arg(locale).map(LocaleSelector::parse);
        match client.inner.build_fetch_entry(id, locale) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Build a request for the assets matching `query` (null for all assets).
#[unsafe(no_mangle)]
pub extern "C" fn cda_build_fetch_assets(
    client: *const FfiClient,
    query: *const FfiQuery,
) -> *mut FfiHttpRequest {
    catch_unwind(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        let built = if query.is_null() {
            client.inner.build_fetch_assets(&Query::new())
        } else {
            client.inner.build_fetch_assets(unsafe { &(*query).inner })
        };
        match built {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Parse response functions
// ---------------------------------------------------------------------------

/// Convert an `FfiHttpResponse` to a core `HttpResponse`.
fn ffi_response_to_core(resp: &FfiHttpResponse) -> HttpResponse {
    let body = str_arg(resp.body).unwrap_or("").to_string();
    let headers = if resp.headers.is_null() || resp.headers_len == 0 {
        Vec::new()
    } else {
        let raw = unsafe { std::slice::from_raw_parts(resp.headers, resp.headers_len as usize) };
        raw.iter()
            .filter_map(|h| Some((str_arg(h.key)?.to_string(), str_arg(h.value)?.to_string())))
            .collect()
    };
    HttpResponse {
        status: resp.status,
        headers,
        body,
    }
}

/// Parse an entries response, resolve its links and render it as JSON.
///
/// `locale` may be null. When set, entries fetched with the `*` locale are
/// switched to it (falling back to the default locale per field) before
/// rendering. Returns a result with `data_tag = Json` on success.
#[unsafe(no_mangle)]
pub extern "C" fn cda_parse_entries(
    client: *const FfiClient,
    response: *const FfiHttpResponse,
    locale: *const c_char,
) -> *mut FfiResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiResult::null_arg("client");
        }
        if response.is_null() {
            return FfiResult::null_arg("response");
        }
        let client = unsafe { &*client };
        let resp = unsafe { &*response };
        let core_resp = ffi_response_to_core(resp);
        match client.inner.parse_entries(core_resp) {
            Ok(mut collection) => {
                if let Some(locale) = str_arg(locale) {
                    collection.graph.set_locale(locale);
                }
                FfiResult::ok_json(&render_collection(&collection))
            }
            Err(e) => FfiResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiResult::panic("panic in cda_parse_entries"))
}

/// Parse a space response and make its default locale the client's
/// fallback for wildcard lookups. On success the result carries the space
/// as JSON.
#[unsafe(no_mangle)]
pub extern "C" fn cda_client_use_space(
    client: *mut FfiClient,
    response: *const FfiHttpResponse,
) -> *mut FfiResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiResult::null_arg("client");
        }
        if response.is_null() {
            return FfiResult::null_arg("response");
        }
        let client = unsafe { &mut *client };
        let core_resp = ffi_response_to_core(unsafe { &*response });
        match client.inner.parse_space(core_resp) {
            Ok(space) => {
                client.inner = client.inner.with_space(&space);
                FfiResult::ok_json(&serde_json::to_value(&space).unwrap_or_default())
            }
            Err(e) => FfiResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiResult::panic("panic in cda_client_use_space"))
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiHttpRequest` returned by any `cda_build_*` function.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn cda_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let req = unsafe { Box::from_raw(req) };
        unsafe { free_request_fields(&req) };
    });
}

/// Free an `FfiResult` returned by any `cda_parse_*` function.
/// Safe to call with null. Uses `data_tag` to determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn cda_free_result(result: *mut FfiResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        unsafe {
            free_string(result.error_message);
            free_string(result.request_id);
        }
        match result.data_tag {
            FfiDataTag::Json => unsafe { free_string(result.data as *mut c_char) },
            FfiDataTag::None => {}
        }
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn cda_free_string(s: *mut c_char) {
    let _ = catch_unwind(|| unsafe { free_string(s) });
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
