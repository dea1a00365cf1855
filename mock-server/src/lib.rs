//! In-memory content delivery API over fixture spaces.
//!
//! Serves spaces, entries, assets and content types with the same wire
//! shapes, search parameters, locale handling and error bodies as the real
//! delivery API, so the client core can be exercised end to end.

pub mod fixtures;
pub mod search;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

use search::{mime_group, InvalidQuery, LocaleChoice, Search};

pub const REQUEST_ID_HEADER: &str = "x-contentful-request-id";

/// Everything the server knows about one space. Entry and asset fields are
/// stored per locale.
#[derive(Clone, Debug)]
pub struct SpaceData {
    pub space: Value,
    pub default_locale: String,
    pub entries: Vec<Value>,
    pub assets: Vec<Value>,
    pub content_types: Vec<Value>,
}

pub type Db = Arc<RwLock<HashMap<String, SpaceData>>>;

type Params = Query<Vec<(String, String)>>;

pub fn app() -> Router {
    let mut spaces = HashMap::new();
    spaces.insert(fixtures::SPACE_ID.to_string(), fixtures::example_space());
    spaces.insert(fixtures::KATZEN_SPACE_ID.to_string(), fixtures::katzen_space());
    let db: Db = Arc::new(RwLock::new(spaces));
    Router::new()
        .route("/spaces/{space}", get(get_space))
        .route("/spaces/{space}/entries", get(list_entries))
        .route("/spaces/{space}/entries/{id}", get(get_entry))
        .route("/spaces/{space}/assets", get(list_assets))
        .route("/spaces/{space}/assets/{id}", get(get_asset))
        .route("/spaces/{space}/content_types", get(list_content_types))
        .route("/spaces/{space}/content_types/{id}", get(get_content_type))
        .layer(middleware::map_response(stamp_request_id))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error response in the delivery API's JSON shape.
#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    id: &'static str,
    message: String,
}

impl ErrorResponse {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            id: "NotFound",
            message: "The resource could not be found.".to_string(),
        }
    }
}

impl From<InvalidQuery> for ErrorResponse {
    fn from(e: InvalidQuery) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            id: "InvalidQuery",
            message: e.0,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let body = json!({
            "sys": {"type": "Error", "id": self.id},
            "message": self.message,
            "requestId": request_id
        });
        let mut response = (self.status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}

async fn stamp_request_id(mut response: Response) -> Response {
    if !response.headers().contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
    }
    response
}

type ApiResponse = Result<Json<Value>, ErrorResponse>;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render a stored resource for one locale: each per-locale field map is
/// replaced by the value for `locale`, or for `default` when `locale` has
/// none. Fields with neither are omitted.
fn localize(resource: &Value, locale: &str, default: &str) -> Value {
    let mut out = resource.clone();
    if let Some(fields) = resource.get("fields").and_then(Value::as_object) {
        let localized: Map<String, Value> = fields
            .iter()
            .filter_map(|(name, per_locale)| {
                per_locale
                    .get(locale)
                    .or_else(|| per_locale.get(default))
                    .map(|v| (name.clone(), v.clone()))
            })
            .collect();
        out["fields"] = Value::Object(localized);
    }
    out["sys"]["locale"] = json!(locale);
    out
}

fn render(resource: &Value, choice: &LocaleChoice, default: &str) -> Value {
    match choice {
        LocaleChoice::Single(locale) => localize(resource, locale, default),
        LocaleChoice::Wildcard => resource.clone(),
    }
}

fn filter_view(resource: &Value, choice: &LocaleChoice, default: &str) -> Value {
    match choice {
        LocaleChoice::Single(locale) => localize(resource, locale, default),
        LocaleChoice::Wildcard => localize(resource, default, default),
    }
}

fn collect_links(value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            let sys = map.get("sys");
            let is_link = sys.and_then(|s| s.get("type")) == Some(&json!("Link"));
            if is_link {
                let kind = sys.and_then(|s| s.get("linkType")).and_then(Value::as_str);
                let id = sys.and_then(|s| s.get("id")).and_then(Value::as_str);
                if let (Some(kind), Some(id)) = (kind, id) {
                    out.push((kind.to_string(), id.to_string()));
                }
            } else {
                map.values().for_each(|v| collect_links(v, out));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_links(v, out)),
        _ => {}
    }
}

fn resource_key(resource: &Value) -> (String, String) {
    let sys = &resource["sys"];
    (
        sys["type"].as_str().unwrap_or_default().to_string(),
        sys["id"].as_str().unwrap_or_default().to_string(),
    )
}

/// Linked entries and assets reachable within `search.include` hops of `items`,
/// excluding the items themselves.
fn includes(data: &SpaceData, items: &[Value], search: &Search) -> (Vec<Value>, Vec<Value>) {
    let mut seen: Vec<(String, String)> = items.iter().map(resource_key).collect();
    let mut entries = Vec::new();
    let mut assets = Vec::new();
    let mut frontier: Vec<Value> = items.to_vec();

    for _ in 0..search.include {
        let mut links = Vec::new();
        for resource in &frontier {
            collect_links(&resource["fields"], &mut links);
        }
        let mut next = Vec::new();
        for (kind, id) in links {
            if seen.iter().any(|(k, i)| *k == kind && *i == id) {
                continue;
            }
            let pool = match kind.as_str() {
                "Entry" => &data.entries,
                "Asset" => &data.assets,
                _ => continue,
            };
            if let Some(found) = pool.iter().find(|r| r["sys"]["id"] == id.as_str()) {
                let rendered = render(found, &search.locale, &data.default_locale);
                if kind == "Entry" {
                    entries.push(rendered.clone());
                } else {
                    assets.push(rendered.clone());
                }
                next.push(rendered);
                seen.push((kind, id));
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    (entries, assets)
}

fn collection(total: usize, search: &Search, items: Vec<Value>) -> Value {
    json!({
        "sys": {"type": "Array"},
        "total": total,
        "skip": search.skip,
        "limit": search.limit,
        "items": items
    })
}

/// Filter, order and page `pool`; returns the total match count and the
/// rendered page.
fn select(
    pool: &[Value],
    search: &Search,
    default: &str,
    extra: impl Fn(&Value) -> bool,
) -> (usize, Vec<Value>) {
    let mut matched: Vec<(Value, &Value)> = pool
        .iter()
        .map(|resource| (filter_view(resource, &search.locale, default), resource))
        .filter(|(view, _)| search.matches(view) && extra(view))
        .collect();
    search.sort_with(&mut matched, |(view, _)| view);

    let total = matched.len();
    let page = matched[search.window(total)]
        .iter()
        .map(|(_, resource)| render(resource, &search.locale, default))
        .collect();
    (total, page)
}

async fn space_data(db: &Db, space: &str) -> Result<SpaceData, ErrorResponse> {
    db.read()
        .await
        .get(space)
        .cloned()
        .ok_or_else(ErrorResponse::not_found)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_space(State(db): State<Db>, Path(space): Path<String>) -> ApiResponse {
    debug!(%space, "get space");
    Ok(Json(space_data(&db, &space).await?.space))
}

async fn list_entries(
    State(db): State<Db>,
    Path(space): Path<String>,
    Query(params): Params,
) -> ApiResponse {
    debug!(%space, ?params, "list entries");
    let data = space_data(&db, &space).await?;
    let search = Search::parse(&params, &data.default_locale)?;
    let (total, items) = select(&data.entries, &search, &data.default_locale, |_| true);

    let (entries, assets) = includes(&data, &items, &search);
    let mut body = collection(total, &search, items);
    if !entries.is_empty() || !assets.is_empty() {
        let mut included = Map::new();
        if !entries.is_empty() {
            included.insert("Entry".to_string(), Value::Array(entries));
        }
        if !assets.is_empty() {
            included.insert("Asset".to_string(), Value::Array(assets));
        }
        body["includes"] = Value::Object(included);
    }
    Ok(Json(body))
}

async fn get_entry(
    State(db): State<Db>,
    Path((space, id)): Path<(String, String)>,
    Query(params): Params,
) -> ApiResponse {
    debug!(%space, %id, "get entry");
    let data = space_data(&db, &space).await?;
    let search = Search::parse(&params, &data.default_locale)?;
    data.entries
        .iter()
        .find(|e| e["sys"]["id"] == id.as_str())
        .map(|e| Json(render(e, &search.locale, &data.default_locale)))
        .ok_or_else(ErrorResponse::not_found)
}

async fn list_assets(
    State(db): State<Db>,
    Path(space): Path<String>,
    Query(params): Params,
) -> ApiResponse {
    debug!(%space, ?params, "list assets");
    let data = space_data(&db, &space).await?;
    let search = Search::parse(&params, &data.default_locale)?;
    let group = search.mimetype_group.clone();
    let (total, items) = select(&data.assets, &search, &data.default_locale, |view| {
        let Some(group) = group.as_deref() else {
            return true;
        };
        view.pointer("/fields/file/contentType")
            .and_then(Value::as_str)
            .is_some_and(|mime| mime_group(mime) == group)
    });
    Ok(Json(collection(total, &search, items)))
}

async fn get_asset(
    State(db): State<Db>,
    Path((space, id)): Path<(String, String)>,
    Query(params): Params,
) -> ApiResponse {
    debug!(%space, %id, "get asset");
    let data = space_data(&db, &space).await?;
    let search = Search::parse(&params, &data.default_locale)?;
    data.assets
        .iter()
        .find(|a| a["sys"]["id"] == id.as_str())
        .map(|a| Json(render(a, &search.locale, &data.default_locale)))
        .ok_or_else(ErrorResponse::not_found)
}

async fn list_content_types(
    State(db): State<Db>,
    Path(space): Path<String>,
    Query(params): Params,
) -> ApiResponse {
    debug!(%space, ?params, "list content types");
    let data = space_data(&db, &space).await?;
    let search = Search::parse(&params, &data.default_locale)?;
    let mut items: Vec<Value> = data
        .content_types
        .iter()
        .filter(|ct| search.matches(ct))
        .cloned()
        .collect();
    search.sort(&mut items);
    let total = items.len();
    let page = items[search.window(total)].to_vec();
    Ok(Json(collection(total, &search, page)))
}

async fn get_content_type(
    State(db): State<Db>,
    Path((space, id)): Path<(String, String)>,
) -> ApiResponse {
    debug!(%space, %id, "get content type");
    let data = space_data(&db, &space).await?;
    data.content_types
        .iter()
        .find(|ct| ct["sys"]["id"] == id.as_str())
        .cloned()
        .map(Json)
        .ok_or_else(ErrorResponse::not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localize_falls_back_to_default() {
        let stored = json!({
            "sys": {"id": "jake", "type": "Entry"},
            "fields": {"name": {"en-US": "Jake"}, "title": {"tlh": "Jake'"}, "other": {"de": "x"}}
        });
        let out = localize(&stored, "tlh", "en-US");
        assert_eq!(out["sys"]["locale"], "tlh");
        assert_eq!(out["fields"]["name"], "Jake");
        assert_eq!(out["fields"]["title"], "Jake'");
        assert!(out["fields"].get("other").is_none());
    }

    #[test]
    fn wildcard_render_keeps_locale_maps() {
        let stored = json!({"sys": {"id": "x"}, "fields": {"name": {"en-US": "X"}}});
        let out = render(&stored, &LocaleChoice::Wildcard, "en-US");
        assert!(out["sys"].get("locale").is_none());
        assert_eq!(out["fields"]["name"]["en-US"], "X");
    }

    #[test]
    fn links_are_collected_from_nested_values() {
        let fields = json!({
            "friend": {"sys": {"type": "Link", "linkType": "Entry", "id": "jake"}},
            "gallery": [{"sys": {"type": "Link", "linkType": "Asset", "id": "nyancat"}}],
            "location": {"lat": 1.0, "lon": 2.0}
        });
        let mut links = Vec::new();
        collect_links(&fields, &mut links);
        links.sort();
        assert_eq!(
            links,
            vec![
                ("Asset".to_string(), "nyancat".to_string()),
                ("Entry".to_string(), "jake".to_string())
            ]
        );
    }

    #[test]
    fn includes_stop_at_requested_depth() {
        let data = fixtures::example_space();
        let search = Search::parse(
            &[
                ("sys.id".to_string(), "nyancat".to_string()),
                ("include".to_string(), "1".to_string()),
            ],
            "en-US",
        )
        .unwrap();
        let (total, items) = select(&data.entries, &search, "en-US", |_| true);
        assert_eq!(total, 1);
        let (entries, assets) = includes(&data, &items, &search);
        let ids: Vec<_> = entries.iter().map(|e| e["sys"]["id"].clone()).collect();
        assert_eq!(ids, vec![json!("happycat")]);
        assert_eq!(assets.len(), 1);

        let deeper = Search::parse(
            &[
                ("sys.id".to_string(), "nyancat".to_string()),
                ("include".to_string(), "2".to_string()),
            ],
            "en-US",
        )
        .unwrap();
        let (_, assets) = includes(&data, &items, &deeper);
        // happycat's image comes in at the second level.
        assert_eq!(assets.len(), 2);
    }
}
