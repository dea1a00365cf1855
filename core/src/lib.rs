//! Synchronous client core for a content delivery API.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). The caller executes the
//! actual HTTP round-trip, making the core fully deterministic and testable.
//!
//! # Design
//! - `Query` turns filter, sort, paging and locale intent into a stable,
//!   sorted set of wire parameters (`field[op]=value`).
//! - `DeliveryClient` is stateless: it holds only its `ClientConfig`. Each
//!   operation is split into `build_*` (produces request) and `parse_*`
//!   (consumes response), so the I/O boundary is explicit.
//! - Parsed collections are placed in a `LinkGraph` arena and their links
//!   bound to the included resources before they are handed back.
//! - Entries fetched with `locale=*` keep every locale and resolve field
//!   lookups through an active locale with fallback to the default one.
//! - `FromEntry` maps entries onto plain structs through `EntryView`.
//! - `fetch` offers a single-shot, cancellable result channel for hosts that
//!   drive requests asynchronously.

pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod locale;
pub mod mapping;
pub mod query;
pub mod resolve;
pub mod resource;
pub mod types;

pub use client::{DeliveryClient, EntryCollection};
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use fetch::{CancelHandle, Completer, Exchange, Pending};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use locale::{LocaleMode, LocaleState};
pub use mapping::{EntryView, FromEntry, FromField};
pub use query::{
    BoundingBox, FieldPath, Filter, GeoPoint, LocaleSelector, MimeTypeGroup, Operand, Operator,
    Query, QueryParams, Scalar, SortDirection, SortKey,
};
pub use resolve::{Includes, ItemRef, LinkGraph, Resolved, ResolveStats, Resource};
pub use resource::{Asset, AssetFields, Entry, FileInfo, ImageFit, ImageFormat, ImageOptions};
pub use types::{
    AssetRef, ContentType, ContentTypeField, EntryRef, FieldValue, Link, LinkType, Locale, Page,
    Space, Sys,
};
