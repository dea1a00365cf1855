//! Stateless HTTP request builder and response parser for the delivery API.
//!
//! # Design
//! `DeliveryClient` holds only its validated configuration and carries no
//! mutable state between calls. Each operation is split into a `build_*`
//! method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. The caller executes the actual HTTP
//! round-trip, keeping the core deterministic and free of I/O.
//!
//! `fetch_*` methods pair the two halves with a single-shot result channel
//! (see [`crate::fetch`]) for hosts that drive requests asynchronously.
//!
//! Collection responses are parsed into a `LinkGraph` and resolved before
//! they are returned, so every link whose target came back in `includes`
//! is already bound.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::fetch::{self, Exchange, Pending};
use crate::http::{HttpRequest, HttpResponse, REQUEST_ID_HEADER};
use crate::mapping::FromEntry;
use crate::query::{Filter, LocaleSelector, Query, QueryParams};
use crate::resolve::{Includes, ItemRef, LinkGraph, Resource};
use crate::resource::{Asset, Entry, ImageOptions};
use crate::types::{ContentType, Page, Space};

/// Entries of one collection response with their links resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryCollection {
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub graph: LinkGraph,
}

impl EntryCollection {
    /// Primary entries in response order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.graph.item_entries()
    }

    pub fn first_entry(&self) -> Option<&Entry> {
        self.entries().next()
    }

    /// Primary entries converted with `T`'s mapping.
    pub fn typed_entries<'a, T: FromEntry<'a>>(&'a self) -> ApiResult<Vec<T>> {
        self.entries()
            .map(|entry| self.graph.view(entry).typed())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.graph.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.items().is_empty()
    }
}

#[derive(Deserialize)]
struct RawCollection {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    skip: u64,
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    includes: RawIncludes,
}

#[derive(Default, Deserialize)]
struct RawIncludes {
    #[serde(rename = "Entry", default)]
    entries: Vec<Value>,
    #[serde(rename = "Asset", default)]
    assets: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: Option<String>,
    request_id: Option<String>,
}

/// Synchronous, stateless client for the delivery API.
///
/// Builds `HttpRequest` values and parses `HttpResponse` values without
/// touching the network. The caller is responsible for executing the HTTP
/// round-trip between `build_*` and `parse_*`.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    config: ClientConfig,
    base_url: String,
    base: Url,
}

impl DeliveryClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        config.validate()?;
        let base_url = config.base_url();
        let base = Url::parse(&base_url)
            .map_err(|e| ApiError::Config(format!("invalid base url {base_url:?}: {e}")))?;
        Ok(Self {
            config,
            base_url,
            base,
        })
    }

    /// Client that falls back to the default locale of `space`, typically
    /// the result of `parse_space`.
    pub fn with_space(&self, space: &Space) -> Self {
        Self {
            config: self.config.clone().with_space(space),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `scheme://host/spaces/{space_id}`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str, params: QueryParams) -> HttpRequest {
        let request = HttpRequest::get(format!("{}{path}", self.base_url), params.into_pairs());
        debug!(
            path = %request.path,
            params = request.query.len(),
            "built request"
        );
        request
    }

    /// Request for `{base}/{collection}/{id}`. The id is percent-encoded as
    /// a single path segment.
    fn get_resource(&self, collection: &str, id: &str) -> HttpRequest {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(collection).push(id);
        }
        let request = HttpRequest::get(url.to_string(), Vec::new());
        debug!(path = %request.path, "built request");
        request
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_fetch_space(&self) -> HttpRequest {
        self.get("", QueryParams::default())
    }

    pub fn build_fetch_entries(&self, query: &Query) -> ApiResult<HttpRequest> {
        Ok(self.get("/entries", query.build()?))
    }

    /// Single entry by id. Goes through the collection endpoint so the
    /// response carries `includes` for the entry's links.
    pub fn build_fetch_entry(
        &self,
        id: &str,
        locale: Option<LocaleSelector>,
    ) -> ApiResult<HttpRequest> {
        let mut query = Query::new().filter(Filter::equals("sys.id", id)?);
        if let Some(locale) = locale {
            query = query.locale(locale);
        }
        self.build_fetch_entries(&query)
    }

    pub fn build_fetch_assets(&self, query: &Query) -> ApiResult<HttpRequest> {
        Ok(self.get("/assets", query.build()?))
    }

    pub fn build_fetch_asset(&self, id: &str) -> HttpRequest {
        self.get_resource("assets", id)
    }

    pub fn build_fetch_content_types(&self, query: &Query) -> ApiResult<HttpRequest> {
        Ok(self.get("/content_types", query.build()?))
    }

    pub fn build_fetch_content_type(&self, id: &str) -> HttpRequest {
        self.get_resource("content_types", id)
    }

    /// Request for an asset's binary data, optionally as a transformed
    /// image rendition. The URL points at the asset host, not the API.
    pub fn build_fetch_asset_data(
        &self,
        asset: &Asset,
        options: Option<&ImageOptions>,
    ) -> ApiResult<HttpRequest> {
        let location = match options {
            None => asset.url().ok_or(ApiError::NotFound)?,
            Some(options) => {
                if asset.file().is_none() {
                    return Err(ApiError::NotFound);
                }
                asset
                    .image_url(options)
                    .ok_or_else(|| ApiError::InvalidOperandKind {
                        field: "fields.file".to_string(),
                        operator: "image".to_string(),
                        expected: "an image asset",
                    })?
            }
        };
        let mut url = Url::parse(&location)
            .map_err(|e| ApiError::DeserializationError(format!("asset url: {e}")))?;
        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.set_query(None);

        let mut request = HttpRequest::get(url.to_string(), query);
        request.headers = vec![("accept".to_string(), "*/*".to_string())];
        debug!(asset = asset.id(), path = %request.path, "built asset data request");
        Ok(request)
    }

    // -----------------------------------------------------------------------
    // Response parsers
    // -----------------------------------------------------------------------

    pub fn parse_space(&self, response: HttpResponse) -> ApiResult<Space> {
        check_status(&response, 200)?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Parse an entries collection and bind its links.
    pub fn parse_entries(&self, response: HttpResponse) -> ApiResult<EntryCollection> {
        check_status(&response, 200)?;
        let raw: RawCollection = serde_json::from_str(&response.body)?;
        let locale = &self.config.default_locale;

        let items = raw
            .items
            .into_iter()
            .map(|value| resource_from_json(value, locale))
            .collect::<ApiResult<Vec<_>>>()?;
        let includes = Includes {
            entries: raw
                .includes
                .entries
                .into_iter()
                .map(|value| Entry::from_json(value, locale))
                .collect::<ApiResult<_>>()?,
            assets: raw
                .includes
                .assets
                .into_iter()
                .map(|value| Asset::from_json(value, locale))
                .collect::<ApiResult<_>>()?,
        };

        let mut graph = LinkGraph::new(items, includes);
        let stats = graph.resolve_links();
        if stats.unresolved > 0 {
            warn!(
                unresolved = stats.unresolved,
                "response references resources it did not include"
            );
        }
        Ok(EntryCollection {
            total: raw.total,
            skip: raw.skip,
            limit: raw.limit,
            graph,
        })
    }

    /// Parse the response of `build_fetch_entry`. An empty collection is
    /// `NotFound`.
    pub fn parse_entry(&self, response: HttpResponse) -> ApiResult<EntryCollection> {
        let collection = self.parse_entries(response)?;
        match collection.graph.items().first() {
            Some(ItemRef::Entry(_)) => Ok(collection),
            _ => Err(ApiError::NotFound),
        }
    }

    pub fn parse_assets(&self, response: HttpResponse) -> ApiResult<Page<Asset>> {
        check_status(&response, 200)?;
        let raw: RawCollection = serde_json::from_str(&response.body)?;
        let items = raw
            .items
            .into_iter()
            .map(|value| Asset::from_json(value, &self.config.default_locale))
            .collect::<ApiResult<_>>()?;
        Ok(Page {
            total: raw.total,
            skip: raw.skip,
            limit: raw.limit,
            items,
        })
    }

    pub fn parse_asset(&self, response: HttpResponse) -> ApiResult<Asset> {
        check_status(&response, 200)?;
        let value: Value = serde_json::from_str(&response.body)?;
        Asset::from_json(value, &self.config.default_locale)
    }

    pub fn parse_content_types(&self, response: HttpResponse) -> ApiResult<Page<ContentType>> {
        check_status(&response, 200)?;
        Ok(serde_json::from_str(&response.body)?)
    }

    pub fn parse_content_type(&self, response: HttpResponse) -> ApiResult<ContentType> {
        check_status(&response, 200)?;
        Ok(serde_json::from_str(&response.body)?)
    }

    // -----------------------------------------------------------------------
    // Fetches
    // -----------------------------------------------------------------------

    fn exchange<T: 'static>(
        &self,
        request: HttpRequest,
        parse: fn(&DeliveryClient, HttpResponse) -> ApiResult<T>,
    ) -> (Exchange<T>, Pending<T>) {
        let client = self.clone();
        let (completer, pending) = fetch::channel();
        let exchange = Exchange::new(
            request,
            completer,
            Box::new(move |response| parse(&client, response)),
        );
        (exchange, pending)
    }

    pub fn fetch_space(&self) -> (Exchange<Space>, Pending<Space>) {
        self.exchange(self.build_fetch_space(), DeliveryClient::parse_space)
    }

    pub fn fetch_entries(
        &self,
        query: &Query,
    ) -> ApiResult<(Exchange<EntryCollection>, Pending<EntryCollection>)> {
        let request = self.build_fetch_entries(query)?;
        Ok(self.exchange(request, DeliveryClient::parse_entries))
    }

    pub fn fetch_entry(
        &self,
        id: &str,
        locale: Option<LocaleSelector>,
    ) -> ApiResult<(Exchange<EntryCollection>, Pending<EntryCollection>)> {
        let request = self.build_fetch_entry(id, locale)?;
        Ok(self.exchange(request, DeliveryClient::parse_entry))
    }

    pub fn fetch_assets(
        &self,
        query: &Query,
    ) -> ApiResult<(Exchange<Page<Asset>>, Pending<Page<Asset>>)> {
        let request = self.build_fetch_assets(query)?;
        Ok(self.exchange(request, DeliveryClient::parse_assets))
    }

    pub fn fetch_asset(&self, id: &str) -> (Exchange<Asset>, Pending<Asset>) {
        self.exchange(self.build_fetch_asset(id), DeliveryClient::parse_asset)
    }

    pub fn fetch_content_types(
        &self,
        query: &Query,
    ) -> ApiResult<(Exchange<Page<ContentType>>, Pending<Page<ContentType>>)> {
        let request = self.build_fetch_content_types(query)?;
        Ok(self.exchange(request, DeliveryClient::parse_content_types))
    }

    pub fn fetch_content_type(&self, id: &str) -> (Exchange<ContentType>, Pending<ContentType>) {
        self.exchange(
            self.build_fetch_content_type(id),
            DeliveryClient::parse_content_type,
        )
    }
}

fn resource_from_json(value: Value, default_locale: &str) -> ApiResult<Resource> {
    let is_asset = value
        .pointer("/sys/type")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind == "Asset");
    if is_asset {
        Asset::from_json(value, default_locale).map(Resource::Asset)
    } else {
        Entry::from_json(value, default_locale).map(Resource::Entry)
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> ApiResult<()> {
    if response.status == expected {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    let body: Option<ErrorBody> = serde_json::from_str(&response.body).ok();
    let request_id = response
        .header(REQUEST_ID_HEADER)
        .map(str::to_string)
        .or_else(|| body.as_ref().and_then(|b| b.request_id.clone()));
    let message = body
        .and_then(|b| b.message)
        .unwrap_or_else(|| response.body.clone());
    Err(ApiError::HttpError {
        status: response.status,
        message,
        request_id,
    })
}
