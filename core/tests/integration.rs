//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port, then drives the core
//! client over real HTTP using ureq. Validates that request building and
//! response parsing agree with an actual server, including the query
//! encoding, include resolution and locale handling.

use pretty_assertions::assert_eq;

use delivery_core::{
    ApiError, ApiResult, Asset, ClientConfig, DeliveryClient, EntryView, Filter, FromEntry,
    HttpRequest, HttpResponse, ImageFormat, ImageOptions, ItemRef, LocaleMode, LocaleSelector,
    MimeTypeGroup, Query, SortKey,
};

/// The `cat` content type as a plain struct.
#[derive(Debug)]
struct Cat<'a> {
    name: Option<String>,
    likes: Vec<String>,
    color: Option<String>,
    lives: Option<i64>,
    best_friend: Option<EntryView<'a>>,
    image: Option<&'a Asset>,
}

impl<'a> FromEntry<'a> for Cat<'a> {
    const CONTENT_TYPE: Option<&'static str> = Some("cat");

    fn from_entry(entry: EntryView<'a>) -> ApiResult<Self> {
        Ok(Cat {
            name: entry.get("name")?,
            likes: entry.get("likes")?.unwrap_or_default(),
            color: entry.get("color")?,
            lives: entry.get("lives")?,
            best_friend: entry.get("bestFriend")?,
            image: entry.get("image")?,
        })
    }
}

/// Execute an `HttpRequest` using ureq and return an `HttpResponse`.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses are returned as data rather than `Err`, letting the core
/// client handle status interpretation.
fn execute(req: HttpRequest) -> HttpResponse {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let url = req.url().unwrap();
    let mut call = agent.get(&url);
    for (name, value) in &req.headers {
        call = call.header(name, value);
    }
    let mut response = call.call().expect("HTTP transport error");

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response.body_mut().read_to_string().unwrap_or_default();

    HttpResponse {
        status,
        headers,
        body,
    }
}

/// Start the mock server on a random port and return a client for the
/// example space.
fn start() -> DeliveryClient {
    start_space("cfexampleapi")
}

/// Start the mock server on a random port and return a client for `space`.
fn start_space(space: &str) -> DeliveryClient {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    DeliveryClient::new(
        ClientConfig::new(space)
            .with_host(addr.to_string())
            .with_secure(false),
    )
    .unwrap()
}

#[test]
fn space_reports_its_default_locale() {
    let client = start();
    let space = client
        .parse_space(execute(client.build_fetch_space()))
        .unwrap();
    assert_eq!(space.default_locale(), Some("en-US"));
    assert_eq!(space.locales.len(), 2);
}

#[test]
fn cats_by_creation_date_with_resolved_links() {
    let client = start();
    let query = Query::new()
        .content_type("cat")
        .order_by(SortKey::asc("sys.createdAt").unwrap());
    let req = client.build_fetch_entries(&query).unwrap();
    let cats = client.parse_entries(execute(req)).unwrap();

    assert_eq!(cats.total, 3);
    let ids: Vec<&str> = cats.entries().map(|e| e.id()).collect();
    assert_eq!(ids, ["nyancat", "happycat", "garfield"]);

    let nyancat = cats.first_entry().unwrap();
    let friend = cats.graph.linked_entry(nyancat, "bestFriend").unwrap();
    assert_eq!(friend.id(), "happycat");
    let image = cats.graph.linked_asset(nyancat, "image").unwrap();
    assert_eq!(image.title(), Some("Nyan Cat"));
    assert!(image.file().unwrap().is_image());
}

#[test]
fn entries_map_onto_typed_structs() {
    let client = start();
    let req = client.build_fetch_entry("nyancat", None).unwrap();
    let collection = client.parse_entry(execute(req)).unwrap();

    let cats: Vec<Cat> = collection.typed_entries().unwrap();
    let nyancat = &cats[0];
    assert_eq!(nyancat.name.as_deref(), Some("Nyan Cat"));
    assert_eq!(nyancat.likes, ["rainbows", "fish"]);
    assert_eq!(nyancat.color.as_deref(), Some("rainbow"));
    assert_eq!(nyancat.lives, Some(1337));
    assert_eq!(nyancat.image.and_then(Asset::title), Some("Nyan Cat"));

    let friend: Cat = nyancat.best_friend.unwrap().typed().unwrap();
    assert_eq!(friend.name.as_deref(), Some("Happy Cat"));
    assert_eq!(friend.likes, ["cheezburger"]);
    assert_eq!(friend.lives, Some(1));

    let req = client.build_fetch_entry("jake", None).unwrap();
    let dogs = client.parse_entry(execute(req)).unwrap();
    let err = dogs.typed_entries::<Cat>().unwrap_err();
    assert!(matches!(err, ApiError::ContentTypeMismatch { expected: "cat", .. }));
}

#[test]
fn untyped_query_matches_typed_query() {
    let client = start();
    let raw = Query::from_raw([("sys.id[in]", "finn,jake")]).unwrap();
    let typed = Query::new().filter(Filter::includes_any("sys.id", ["finn", "jake"]).unwrap());
    assert_eq!(
        client.build_fetch_entries(&raw).unwrap(),
        client.build_fetch_entries(&typed).unwrap()
    );

    let req = client.build_fetch_entries(&raw).unwrap();
    let found = client.parse_entries(execute(req)).unwrap();
    assert_eq!(found.total, 2);
    let mut ids: Vec<&str> = found.entries().map(|e| e.id()).collect();
    ids.sort();
    assert_eq!(ids, ["finn", "jake"]);
}

#[test]
fn range_and_location_filters() {
    let client = start();
    let query = Query::new()
        .content_type("cat")
        .filter(Filter::lte("fields.lives", 9).unwrap())
        .order_by(SortKey::asc("fields.lives").unwrap());
    let req = client.build_fetch_entries(&query).unwrap();
    let ids: Vec<String> = client
        .parse_entries(execute(req))
        .unwrap()
        .entries()
        .map(|e| e.id().to_string())
        .collect();
    assert_eq!(ids, ["happycat", "garfield"]);

    let query = Query::from_raw([
        ("content_type", "human"),
        ("fields.location[within]", "40,-124,36,-121"),
    ])
    .unwrap();
    let req = client.build_fetch_entries(&query).unwrap();
    let found = client.parse_entries(execute(req)).unwrap();
    assert_eq!(found.first_entry().map(|e| e.id()), Some("finn"));
}

#[test]
fn wildcard_entry_switches_locale_with_fallback() {
    let client = start();
    let req = client
        .build_fetch_entry("nyancat", Some(LocaleSelector::All))
        .unwrap();
    let mut collection = client.parse_entry(execute(req)).unwrap();

    let nyancat = collection.first_entry().unwrap();
    assert_eq!(nyancat.locale_mode(), LocaleMode::Wildcard);
    assert_eq!(
        nyancat.field("name").and_then(|v| v.as_str()),
        Some("Nyan Cat")
    );

    assert!(collection.graph.set_locale("tlh") >= 1);
    let nyancat = collection.first_entry().unwrap();
    assert_eq!(nyancat.locale(), "tlh");
    assert_eq!(
        nyancat.field("name").and_then(|v| v.as_str()),
        Some("Nyan vIghro'")
    );
    assert_eq!(
        nyancat.field("color").and_then(|v| v.as_str()),
        Some("rainbow")
    );
    let friend = collection.graph.linked_entry(nyancat, "bestFriend").unwrap();
    assert_eq!(
        friend.field("name").and_then(|v| v.as_str()),
        Some("Quch vIghro'")
    );
}

#[test]
fn fallback_follows_the_space_default_locale() {
    let client = start_space("katzenapi");
    assert_eq!(client.config().default_locale, "en-US");
    let space = client
        .parse_space(execute(client.build_fetch_space()))
        .unwrap();
    assert_eq!(space.default_locale(), Some("de-DE"));

    let req = client
        .build_fetch_entry("grumpy", Some(LocaleSelector::All))
        .unwrap();
    let mut unaware = client.parse_entry(execute(req.clone())).unwrap();
    unaware.graph.set_locale("tlh");
    assert_eq!(unaware.first_entry().unwrap().field("lives"), None);

    let client = client.with_space(&space);
    assert_eq!(client.config().default_locale, "de-DE");
    let mut collection = client.parse_entry(execute(req)).unwrap();
    assert_eq!(collection.graph.set_locale("tlh"), 1);
    let grumpy = collection.first_entry().unwrap();
    assert_eq!(grumpy.field("lives").and_then(|v| v.as_i64()), Some(9));
    assert_eq!(
        grumpy.field("name").and_then(|v| v.as_str()),
        Some("QeHpu' vIghro'")
    );
}

#[test]
fn single_locale_entry_rejects_locale_switch() {
    let client = start();
    let req = client
        .build_fetch_entry("jake", Some(LocaleSelector::Specific("tlh".to_string())))
        .unwrap();
    let mut collection = client.parse_entry(execute(req)).unwrap();
    assert_eq!(collection.graph.entries().len(), 2);

    let jake = collection.first_entry().unwrap();
    assert_eq!(jake.locale_mode(), LocaleMode::Single);
    assert_eq!(jake.locale(), "tlh");
    assert_eq!(jake.field("name").and_then(|v| v.as_str()), Some("Jake"));

    assert_eq!(collection.graph.set_locale("en-US"), 0);
    let ItemRef::Entry(entry_ref) = collection.graph.items()[0] else {
        panic!("expected an entry");
    };
    let err = collection
        .graph
        .entry_mut(entry_ref)
        .unwrap()
        .set_locale("en-US")
        .unwrap_err();
    assert!(matches!(err, ApiError::LocaleNotWildcardFetched { ref id } if id == "jake"));
}

#[test]
fn missing_entry_is_not_found() {
    let client = start();
    let req = client.build_fetch_entry("bmo", None).unwrap();
    let err = client.parse_entry(execute(req)).unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    let err = client
        .parse_content_type(execute(client.build_fetch_content_type("unicorn")))
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    let err = client
        .parse_asset(execute(client.build_fetch_asset("../assets/nyancat")))
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
}

#[test]
fn limit_above_maximum_surfaces_server_error() {
    let client = start();
    let req = client
        .build_fetch_entries(&Query::new().limit(1001))
        .unwrap();
    assert_eq!(req.query_param("limit"), Some("1001"));

    let err = client.parse_entries(execute(req)).unwrap_err();
    match err {
        ApiError::HttpError {
            status, request_id, ..
        } => {
            assert_eq!(status, 400);
            assert!(request_id.is_some());
        }
        other => panic!("expected HttpError, got {other:?}"),
    }
}

#[test]
fn paging_windows_the_result() {
    let client = start();
    let query = Query::new()
        .order_by(SortKey::asc("sys.createdAt").unwrap())
        .skip(3)
        .limit(1);
    let req = client.build_fetch_entries(&query).unwrap();
    let page = client.parse_entries(execute(req)).unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.len(), 1);
    assert_eq!(page.first_entry().map(|e| e.id()), Some("jake"));
}

#[test]
fn assets_and_image_renditions() {
    let client = start();
    let query = Query::new()
        .mime_type_group(MimeTypeGroup::Image)
        .order_by(SortKey::asc("sys.id").unwrap());
    let req = client.build_fetch_assets(&query).unwrap();
    let images = client.parse_assets(execute(req)).unwrap();
    let ids: Vec<&str> = images.items.iter().map(|a| a.id()).collect();
    assert_eq!(ids, ["happycat", "jake", "nyancat"]);

    let asset = client
        .parse_asset(execute(client.build_fetch_asset("nyancat")))
        .unwrap();
    let options = ImageOptions {
        width: Some(100),
        format: Some(ImageFormat::Webp),
        ..ImageOptions::default()
    };
    let req = client
        .build_fetch_asset_data(&asset, Some(&options))
        .unwrap();
    assert_eq!(
        req.path,
        "https://images.example.net/cfexampleapi/Nyan_cat_250px_frame.png"
    );
    assert_eq!(req.query_param("w"), Some("100"));
    assert_eq!(req.query_param("fm"), Some("webp"));

    let pdf = client
        .parse_asset(execute(client.build_fetch_asset("cheatsheet")))
        .unwrap();
    let err = client
        .build_fetch_asset_data(&pdf, Some(&options))
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidOperandKind { .. }));
    assert!(client.build_fetch_asset_data(&pdf, None).is_ok());
}

#[test]
fn content_types_describe_their_fields() {
    let client = start();
    let query = Query::new().order_by(SortKey::asc("sys.id").unwrap());
    let req = client.build_fetch_content_types(&query).unwrap();
    let page = client.parse_content_types(execute(req)).unwrap();
    assert_eq!(page.total, 3);

    let cat = client
        .parse_content_type(execute(client.build_fetch_content_type("cat")))
        .unwrap();
    assert_eq!(cat.display_field.as_deref(), Some("name"));
    assert!(cat.field("name").unwrap().localized);
}

#[test]
fn exchange_delivers_parsed_result() {
    let client = start();
    let query = Query::new().content_type("dog");
    let (exchange, mut pending) = client.fetch_entries(&query).unwrap();
    let response = execute(exchange.request().clone());
    assert!(exchange.fulfill(Ok(response)));

    let dogs = pending.try_take().unwrap().unwrap();
    assert_eq!(dogs.first_entry().map(|e| e.id()), Some("jake"));
    let jake = dogs.first_entry().unwrap();
    let finn = dogs.graph.linked_entry(jake, "bestFriend").unwrap();
    assert_eq!(finn.id(), "finn");
}

#[test]
fn cancelled_exchange_skips_parsing() {
    let client = start();
    let (exchange, pending) = client.fetch_space();
    let handle = pending.cancel_handle();
    assert!(handle.cancel());
    assert!(exchange.is_cancelled());

    let response = execute(exchange.request().clone());
    assert!(!exchange.fulfill(Ok(response)));
}
