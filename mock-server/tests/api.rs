use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, REQUEST_ID_HEADER};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn get(uri: &str) -> axum::response::Response {
    app()
        .oneshot(Request::builder().uri(uri).body(String::new()).unwrap())
        .await
        .unwrap()
}

fn ids(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["sys"]["id"].as_str().unwrap().to_string())
        .collect()
}

const ENTRIES: &str = "/spaces/cfexampleapi/entries";

// --- space ---

#[tokio::test]
async fn space_lists_locales() {
    let resp = get("/spaces/cfexampleapi").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    let body = body_json(resp).await;
    assert_eq!(body["sys"]["type"], "Space");
    assert_eq!(body["locales"][0]["code"], "en-US");
    assert_eq!(body["locales"][0]["default"], true);
}

#[tokio::test]
async fn second_space_falls_back_to_its_own_default() {
    let body = body_json(get("/spaces/katzenapi").await).await;
    assert_eq!(body["locales"][1]["code"], "de-DE");
    assert_eq!(body["locales"][1]["default"], true);

    let body = body_json(get("/spaces/katzenapi/entries?locale=tlh").await).await;
    assert_eq!(body["items"][0]["fields"]["name"], "QeHpu' vIghro'");
    assert_eq!(body["items"][0]["fields"]["lives"], 9);
}

#[tokio::test]
async fn unknown_space_is_not_found_with_error_body() {
    let resp = get("/spaces/nope/entries").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let header = resp.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
    let body = body_json(resp).await;
    assert_eq!(body["sys"]["type"], "Error");
    assert_eq!(body["sys"]["id"], "NotFound");
    assert_eq!(body["requestId"], header.as_str());
}

// --- entries ---

#[tokio::test]
async fn entries_default_page() {
    let resp = get(ENTRIES).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["sys"]["type"], "Array");
    assert_eq!(body["total"], 5);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["skip"], 0);
    assert_eq!(body["items"][0]["sys"]["locale"], "en-US");
}

#[tokio::test]
async fn entries_by_content_type() {
    let body = body_json(get(&format!("{ENTRIES}?content_type=cat")).await).await;
    assert_eq!(body["total"], 3);
    let mut found = ids(&body);
    found.sort();
    assert_eq!(found, ["garfield", "happycat", "nyancat"]);
}

#[tokio::test]
async fn entries_by_id_list_and_inequality() {
    let body = body_json(get(&format!("{ENTRIES}?sys.id%5Bin%5D=finn%2Cjake")).await).await;
    let mut found = ids(&body);
    found.sort();
    assert_eq!(found, ["finn", "jake"]);

    let body = body_json(get(&format!("{ENTRIES}?sys.id%5Bne%5D=nyancat")).await).await;
    assert_eq!(body["total"], 4);
}

#[tokio::test]
async fn entries_by_array_membership() {
    let body =
        body_json(get(&format!("{ENTRIES}?content_type=cat&fields.likes=lasagna")).await).await;
    assert_eq!(ids(&body), ["garfield"]);

    let body = body_json(
        get(&format!(
            "{ENTRIES}?content_type=cat&fields.likes%5Bnin%5D=rainbows%2Clasagna"
        ))
        .await,
    )
    .await;
    assert_eq!(ids(&body), ["happycat"]);
}

#[tokio::test]
async fn entries_text_search() {
    let body = body_json(get(&format!("{ENTRIES}?query=bacon")).await).await;
    assert_eq!(ids(&body), ["jake"]);

    let body = body_json(
        get(&format!(
            "{ENTRIES}?content_type=dog&fields.description%5Bmatch%5D=bacon+pancakes"
        ))
        .await,
    )
    .await;
    assert_eq!(ids(&body), ["jake"]);
}

#[tokio::test]
async fn entries_exists_and_ranges() {
    let body =
        body_json(get(&format!("{ENTRIES}?sys.archivedVersion%5Bexists%5D=false")).await).await;
    assert_eq!(body["total"], 5);

    let body = body_json(
        get(&format!(
            "{ENTRIES}?content_type=cat&fields.lives%5Blte%5D=9&order=fields.lives"
        ))
        .await,
    )
    .await;
    assert_eq!(ids(&body), ["happycat", "garfield"]);

    let body = body_json(
        get(&format!(
            "{ENTRIES}?sys.updatedAt%5Blte%5D=2013-09-02T23%3A59%3A59.000Z&order=sys.id"
        ))
        .await,
    )
    .await;
    assert_eq!(ids(&body), ["finn", "garfield", "jake"]);
}

#[tokio::test]
async fn entries_location_search() {
    let body = body_json(
        get(&format!(
            "{ENTRIES}?content_type=human&fields.location%5Bwithin%5D=40%2C-124%2C36%2C-121"
        ))
        .await,
    )
    .await;
    assert_eq!(ids(&body), ["finn"]);

    let body =
        body_json(get(&format!("{ENTRIES}?fields.location%5Bnear%5D=38%2C-122")).await).await;
    assert_eq!(ids(&body), ["finn"]);
}

#[tokio::test]
async fn entries_ordering() {
    let body = body_json(get(&format!("{ENTRIES}?order=sys.createdAt")).await).await;
    assert_eq!(
        ids(&body),
        ["nyancat", "happycat", "garfield", "jake", "finn"]
    );

    let body = body_json(get(&format!("{ENTRIES}?order=-sys.createdAt")).await).await;
    assert_eq!(ids(&body)[0], "finn");

    let body = body_json(get(&format!("{ENTRIES}?order=sys.revision%2Csys.id")).await).await;
    assert_eq!(
        ids(&body),
        ["garfield", "jake", "nyancat", "finn", "happycat"]
    );
}

#[tokio::test]
async fn entries_paging() {
    let body = body_json(get(&format!("{ENTRIES}?order=sys.createdAt&limit=3")).await).await;
    assert_eq!(body["total"], 5);
    assert_eq!(ids(&body), ["nyancat", "happycat", "garfield"]);

    let body = body_json(get(&format!("{ENTRIES}?order=sys.createdAt&skip=3")).await).await;
    assert_eq!(body["skip"], 3);
    assert_eq!(ids(&body), ["jake", "finn"]);
}

#[tokio::test]
async fn limit_above_maximum_is_rejected() {
    let resp = get(&format!("{ENTRIES}?limit=1001")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["sys"]["id"], "InvalidQuery");
}

#[tokio::test]
async fn unknown_operator_is_rejected() {
    let resp = get(&format!("{ENTRIES}?sys.id%5Bregex%5D=cat")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn entries_include_linked_resources() {
    let body = body_json(get(&format!("{ENTRIES}?sys.id=nyancat")).await).await;
    assert_eq!(ids(&body), ["nyancat"]);
    let included = &body["includes"];
    assert_eq!(included["Entry"][0]["sys"]["id"], "happycat");
    assert_eq!(included["Asset"][0]["sys"]["id"], "nyancat");

    let body = body_json(get(&format!("{ENTRIES}?sys.id=nyancat&include=0")).await).await;
    assert!(body.get("includes").is_none());
}

#[tokio::test]
async fn specific_locale_falls_back_to_default() {
    let body = body_json(get(&format!("{ENTRIES}?sys.id%5Bin%5D=nyancat%2Cjake&locale=tlh&order=sys.id")).await).await;
    assert_eq!(body["items"][0]["sys"]["id"], "jake");
    assert_eq!(body["items"][0]["sys"]["locale"], "tlh");
    assert_eq!(body["items"][0]["fields"]["name"], "Jake");
    assert_eq!(body["items"][1]["fields"]["name"], "Nyan vIghro'");
}

#[tokio::test]
async fn wildcard_locale_returns_locale_maps() {
    let body = body_json(get(&format!("{ENTRIES}?sys.id=nyancat&locale=*")).await).await;
    let item = &body["items"][0];
    assert!(item["sys"].get("locale").is_none());
    assert_eq!(item["fields"]["name"]["tlh"], "Nyan vIghro'");
    assert_eq!(item["fields"]["name"]["en-US"], "Nyan Cat");
    let friend = &body["includes"]["Entry"][0];
    assert_eq!(friend["fields"]["name"]["en-US"], "Happy Cat");
}

#[tokio::test]
async fn single_entry_endpoint() {
    let resp = get(&format!("{ENTRIES}/jake")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["fields"]["name"], "Jake");

    let resp = get(&format!("{ENTRIES}/bmo")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- assets ---

#[tokio::test]
async fn assets_by_mime_group() {
    let body = body_json(get("/spaces/cfexampleapi/assets").await).await;
    assert_eq!(body["total"], 4);

    let body =
        body_json(get("/spaces/cfexampleapi/assets?mimetype_group=image&order=sys.id").await)
            .await;
    assert_eq!(ids(&body), ["happycat", "jake", "nyancat"]);

    let body = body_json(get("/spaces/cfexampleapi/assets?mimetype_group=pdfdocument").await).await;
    assert_eq!(ids(&body), ["cheatsheet"]);
}

#[tokio::test]
async fn single_asset_endpoint() {
    let body = body_json(get("/spaces/cfexampleapi/assets/nyancat").await).await;
    assert_eq!(body["fields"]["title"], "Nyan Cat");
    assert_eq!(body["fields"]["file"]["contentType"], "image/png");
}

// --- content types ---

#[tokio::test]
async fn content_types_endpoints() {
    let body = body_json(get("/spaces/cfexampleapi/content_types?order=sys.id").await).await;
    assert_eq!(ids(&body), ["cat", "dog", "human"]);

    let resp = get("/spaces/cfexampleapi/content_types/cat").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["displayField"], "name");
    assert_eq!(body["fields"][0]["localized"], true);

    let resp = get("/spaces/cfexampleapi/content_types/unicorn").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_has_empty_body() {
    let resp = get("/nothing").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(resp).await.is_empty());
}
