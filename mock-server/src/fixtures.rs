//! Fixture spaces. `cfexampleapi` holds a handful of cats, a dog and a
//! human. `katzenapi` is a one-cat space whose default locale is `de-DE`.
//!
//! Resources are stored the way the API returns them for `locale=*`: every
//! entry field and asset field is a map from locale code to value.

use serde_json::{json, Value};

use crate::SpaceData;

pub const SPACE_ID: &str = "cfexampleapi";
pub const DEFAULT_LOCALE: &str = "en-US";

pub const KATZEN_SPACE_ID: &str = "katzenapi";
pub const KATZEN_DEFAULT_LOCALE: &str = "de-DE";

const ASSET_HOST: &str = "//images.example.net/cfexampleapi";

fn link(link_type: &str, id: &str) -> Value {
    json!({"sys": {"type": "Link", "linkType": link_type, "id": id}})
}

fn sys(kind: &str, id: &str, created: &str, updated: &str, revision: u64) -> Value {
    json!({
        "type": kind,
        "id": id,
        "space": link("Space", SPACE_ID),
        "createdAt": created,
        "updatedAt": updated,
        "revision": revision
    })
}

fn entry(content_type: &str, id: &str, stamps: (&str, &str, u64), fields: Value) -> Value {
    let mut sys = sys("Entry", id, stamps.0, stamps.1, stamps.2);
    sys["contentType"] = link("ContentType", content_type);
    json!({"sys": sys, "fields": fields})
}

fn en(value: Value) -> Value {
    json!({ DEFAULT_LOCALE: value })
}

fn asset(id: &str, stamps: (&str, &str, u64), title: &str, file: Value) -> Value {
    json!({
        "sys": sys("Asset", id, stamps.0, stamps.1, stamps.2),
        "fields": {
            "title": en(json!(title)),
            "file": en(file)
        }
    })
}

fn image(file_name: &str, mime: &str, size: u64, width: u32, height: u32) -> Value {
    json!({
        "url": format!("{ASSET_HOST}/{file_name}"),
        "fileName": file_name,
        "contentType": mime,
        "details": {"size": size, "image": {"width": width, "height": height}}
    })
}

fn field(id: &str, name: &str, kind: &str, extra: Value) -> Value {
    let mut field = json!({
        "id": id,
        "name": name,
        "type": kind,
        "localized": false,
        "required": false,
        "disabled": false
    });
    if let (Value::Object(target), Value::Object(extra)) = (&mut field, extra) {
        target.extend(extra);
    }
    field
}

fn content_type(id: &str, name: &str, description: &str, fields: Vec<Value>) -> Value {
    json!({
        "sys": sys("ContentType", id, "2013-06-27T22:46:10.293Z", "2013-09-02T13:14:47.863Z", 3),
        "name": name,
        "description": description,
        "displayField": "name",
        "fields": fields
    })
}

pub fn example_space() -> SpaceData {
    let space = json!({
        "sys": {"type": "Space", "id": SPACE_ID},
        "name": "Contentful Example API",
        "locales": [
            {"code": DEFAULT_LOCALE, "name": "English", "default": true},
            {"code": "tlh", "name": "Klingon", "default": false}
        ]
    });

    let symbols = json!({"items": {"type": "Symbol"}});
    let content_types = vec![
        content_type(
            "cat",
            "Cat",
            "Meow.",
            vec![
                field("name", "Name", "Text", json!({"localized": true, "required": true})),
                field("likes", "Likes", "Array", symbols.clone()),
                field("color", "Color", "Symbol", json!({})),
                field("bestFriend", "Best Friend", "Link", json!({"linkType": "Entry"})),
                field("birthday", "Birthday", "Date", json!({})),
                field("lives", "Lives left", "Integer", json!({})),
                field("image", "Image", "Link", json!({"linkType": "Asset"})),
            ],
        ),
        content_type(
            "dog",
            "Dog",
            "Bark!",
            vec![
                field("name", "Name", "Text", json!({"required": true})),
                field("description", "Description", "Text", json!({})),
                field("bestFriend", "Best Friend", "Link", json!({"linkType": "Entry"})),
                field("image", "Image", "Link", json!({"linkType": "Asset"})),
            ],
        ),
        content_type(
            "human",
            "Human",
            "A human being",
            vec![
                field("name", "Name", "Text", json!({"required": true})),
                field("description", "Description", "Text", json!({})),
                field("likes", "Likes", "Array", symbols),
                field("location", "Home", "Location", json!({})),
                field("bestFriend", "Best Friend", "Link", json!({"linkType": "Entry"})),
            ],
        ),
    ];

    let entries = vec![
        entry(
            "cat",
            "nyancat",
            ("2013-06-27T22:46:19.513Z", "2013-09-04T09:19:39.027Z", 5),
            json!({
                "name": {"en-US": "Nyan Cat", "tlh": "Nyan vIghro'"},
                "likes": en(json!(["rainbows", "fish"])),
                "color": en(json!("rainbow")),
                "bestFriend": en(link("Entry", "happycat")),
                "birthday": en(json!("2011-04-04T22:00:00Z")),
                "lives": en(json!(1337)),
                "image": en(link("Asset", "nyancat"))
            }),
        ),
        entry(
            "cat",
            "happycat",
            ("2013-06-27T22:46:20.171Z", "2013-11-18T15:58:02.018Z", 8),
            json!({
                "name": {"en-US": "Happy Cat", "tlh": "Quch vIghro'"},
                "likes": en(json!(["cheezburger"])),
                "color": en(json!("gray")),
                "bestFriend": en(link("Entry", "nyancat")),
                "birthday": en(json!("2003-10-28T23:00:00Z")),
                "lives": en(json!(1)),
                "image": en(link("Asset", "happycat"))
            }),
        ),
        entry(
            "cat",
            "garfield",
            ("2013-06-27T22:46:20.821Z", "2013-08-27T10:09:07.929Z", 2),
            json!({
                "name": {"en-US": "Garfield", "tlh": "Garfield"},
                "likes": en(json!(["lasagna"])),
                "color": en(json!("orange")),
                "birthday": en(json!("1979-06-18T23:00:00Z")),
                "lives": en(json!(9))
            }),
        ),
        entry(
            "dog",
            "jake",
            ("2013-06-27T22:46:21.450Z", "2013-09-02T14:32:11.837Z", 5),
            json!({
                "name": en(json!("Jake")),
                "description": en(json!(
                    "Bacon pancakes, makin' bacon pancakes, take some bacon and I'll put it in a pancake."
                )),
                "bestFriend": en(link("Entry", "finn")),
                "image": en(link("Asset", "jake"))
            }),
        ),
        entry(
            "human",
            "finn",
            ("2013-06-27T22:46:21.989Z", "2013-09-02T14:32:52.519Z", 6),
            json!({
                "name": en(json!("Finn")),
                "description": en(json!(
                    "Finn is the main protagonist of the series. He is a human adventurer."
                )),
                "likes": en(json!(["adventure", "swords"])),
                "location": en(json!({"lat": 38.5, "lon": -121.5})),
                "bestFriend": en(link("Entry", "jake"))
            }),
        ),
    ];

    let assets = vec![
        asset(
            "nyancat",
            ("2013-09-02T14:56:34.240Z", "2013-09-02T14:56:34.240Z", 1),
            "Nyan Cat",
            image("Nyan_cat_250px_frame.png", "image/png", 12273, 250, 250),
        ),
        asset(
            "happycat",
            ("2013-09-02T14:56:34.267Z", "2013-09-02T14:56:34.267Z", 1),
            "Happy Cat",
            image("happycatw.jpg", "image/jpeg", 59939, 273, 397),
        ),
        asset(
            "jake",
            ("2013-09-02T14:56:34.260Z", "2013-09-02T14:56:34.260Z", 1),
            "Jake",
            image("jake.png", "image/png", 20480, 100, 161),
        ),
        asset(
            "cheatsheet",
            ("2013-09-03T10:12:00.000Z", "2013-09-03T10:12:00.000Z", 1),
            "Adventure Time cheat sheet",
            json!({
                "url": format!("{ASSET_HOST}/cheatsheet.pdf"),
                "fileName": "cheatsheet.pdf",
                "contentType": "application/pdf",
                "details": {"size": 48213}
            }),
        ),
    ];

    SpaceData {
        space,
        default_locale: DEFAULT_LOCALE.to_string(),
        entries,
        assets,
        content_types,
    }
}

pub fn katzen_space() -> SpaceData {
    let space = json!({
        "sys": {"type": "Space", "id": KATZEN_SPACE_ID},
        "name": "Katzen",
        "locales": [
            {"code": "tlh", "name": "Klingon", "default": false},
            {"code": KATZEN_DEFAULT_LOCALE, "name": "Deutsch", "default": true}
        ]
    });
    let entries = vec![json!({
        "sys": {
            "type": "Entry",
            "id": "grumpy",
            "space": link("Space", KATZEN_SPACE_ID),
            "contentType": link("ContentType", "cat"),
            "createdAt": "2014-02-11T09:00:00.000Z",
            "updatedAt": "2014-02-11T09:00:00.000Z",
            "revision": 1
        },
        "fields": {
            "name": {KATZEN_DEFAULT_LOCALE: "Miesepeter", "tlh": "QeHpu' vIghro'"},
            "lives": {KATZEN_DEFAULT_LOCALE: 9}
        }
    })];

    SpaceData {
        space,
        default_locale: KATZEN_DEFAULT_LOCALE.to_string(),
        entries,
        assets: Vec::new(),
        content_types: Vec::new(),
    }
}
