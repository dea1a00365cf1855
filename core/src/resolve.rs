//! Binding links to the resources already present in a response.
//!
//! # Design
//! A response's primary items and its `includes` are moved into one
//! `LinkGraph` arena. Resolution rewrites every `FieldValue::Link` whose
//! target is in the arena into an `EntryRef` / `AssetRef` handle, so cycles
//! (two cats that are each other's best friend) need no shared ownership.
//! Nothing here performs I/O: a link whose target was not sent stays a
//! `FieldValue::Link`.
//!
//! Targets are keyed by (link type, id). Ids are not guaranteed unique
//! across content types, so a link that names a content type only matches
//! a resource of that content type, and candidates are tried in arena order
//! (primary items before includes).

use std::collections::HashMap;

use tracing::debug;

use crate::resource::{Asset, Entry};
use crate::types::{AssetRef, EntryRef, FieldValue, Link, LinkType};

/// Either kind of resource, before it is placed in a graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Entry(Entry),
    Asset(Asset),
}

impl Resource {
    fn link_type(&self) -> LinkType {
        match self {
            Resource::Entry(_) => LinkType::Entry,
            Resource::Asset(_) => LinkType::Asset,
        }
    }

    fn id(&self) -> &str {
        match self {
            Resource::Entry(e) => e.id(),
            Resource::Asset(a) => a.id(),
        }
    }

    fn content_type_id(&self) -> Option<&str> {
        match self {
            Resource::Entry(e) => e.content_type_id(),
            Resource::Asset(_) => None,
        }
    }
}

/// Side-list of linked resources sent alongside the primary items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Includes {
    pub entries: Vec<Entry>,
    pub assets: Vec<Asset>,
}

/// Handle to a primary item of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Entry(EntryRef),
    Asset(AssetRef),
}

/// Borrowed view of a resolved link target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Entry(&'a Entry),
    Asset(&'a Asset),
}

/// Outcome of one `resolve_links` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Links rewritten into handles during this pass.
    pub bound: usize,
    /// Links left in place because their target is not in the graph.
    pub unresolved: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    target: ItemRef,
    content_type: Option<String>,
}

/// Every resource of one response, with links bound between them.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkGraph {
    entries: Vec<Entry>,
    assets: Vec<Asset>,
    items: Vec<ItemRef>,
    index: HashMap<(LinkType, String), Vec<Candidate>>,
}

impl LinkGraph {
    /// Place `items` and `includes` in one arena. An include that repeats a
    /// primary item (same type, id and content type) is dropped.
    pub fn new(items: Vec<Resource>, includes: Includes) -> Self {
        let mut graph = LinkGraph {
            entries: Vec::new(),
            assets: Vec::new(),
            items: Vec::with_capacity(items.len()),
            index: HashMap::new(),
        };
        for item in items {
            let target = graph.insert(item);
            graph.items.push(target);
        }
        let included = includes
            .entries
            .into_iter()
            .map(Resource::Entry)
            .chain(includes.assets.into_iter().map(Resource::Asset));
        for resource in included {
            if !graph.contains(&resource) {
                graph.insert(resource);
            }
        }
        graph
    }

    fn contains(&self, resource: &Resource) -> bool {
        self.index
            .get(&(resource.link_type(), resource.id().to_string()))
            .is_some_and(|candidates| {
                candidates
                    .iter()
                    .any(|c| c.content_type.as_deref() == resource.content_type_id())
            })
    }

    fn insert(&mut self, resource: Resource) -> ItemRef {
        let key = (resource.link_type(), resource.id().to_string());
        let content_type = resource.content_type_id().map(str::to_string);
        let target = match resource {
            Resource::Entry(entry) => {
                self.entries.push(entry);
                ItemRef::Entry(EntryRef(self.entries.len() - 1))
            }
            Resource::Asset(asset) => {
                self.assets.push(asset);
                ItemRef::Asset(AssetRef(self.assets.len() - 1))
            }
        };
        self.index.entry(key).or_default().push(Candidate {
            target,
            content_type,
        });
        target
    }

    /// Bind every link whose target is present in the graph. Links without a
    /// target are left as they are. Running this again changes nothing.
    pub fn resolve_links(&mut self) -> ResolveStats {
        let mut stats = ResolveStats::default();
        let index = &self.index;
        for entry in &mut self.entries {
            for value in entry.field_values_mut() {
                bind(value, index, &mut stats);
            }
        }
        debug!(
            bound = stats.bound,
            unresolved = stats.unresolved,
            "resolved links"
        );
        stats
    }

    /// Primary items in response order.
    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    /// Primary items that are entries, in response order.
    pub fn item_entries(&self) -> impl Iterator<Item = &Entry> {
        self.items.iter().filter_map(|item| match item {
            ItemRef::Entry(r) => self.entry(*r),
            ItemRef::Asset(_) => None,
        })
    }

    /// Primary items that are assets, in response order.
    pub fn item_assets(&self) -> impl Iterator<Item = &Asset> {
        self.items.iter().filter_map(|item| match item {
            ItemRef::Asset(r) => self.asset(*r),
            ItemRef::Entry(_) => None,
        })
    }

    pub fn entry(&self, r: EntryRef) -> Option<&Entry> {
        self.entries.get(r.0)
    }

    pub fn entry_mut(&mut self, r: EntryRef) -> Option<&mut Entry> {
        self.entries.get_mut(r.0)
    }

    pub fn asset(&self, r: AssetRef) -> Option<&Asset> {
        self.assets.get(r.0)
    }

    pub fn asset_mut(&mut self, r: AssetRef) -> Option<&mut Asset> {
        self.assets.get_mut(r.0)
    }

    /// Every entry in the graph, includes and all.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// First entry with `id`, primary items first.
    pub fn find_entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Target of a bound field value.
    pub fn resolve(&self, value: &FieldValue) -> Option<Resolved<'_>> {
        match value {
            FieldValue::Entry(r) => self.entry(*r).map(Resolved::Entry),
            FieldValue::Asset(r) => self.asset(*r).map(Resolved::Asset),
            _ => None,
        }
    }

    /// Entry linked from `entry`'s field `name`, in `entry`'s active locale.
    pub fn linked_entry(&self, entry: &Entry, name: &str) -> Option<&Entry> {
        entry
            .field(name)
            .and_then(FieldValue::as_entry)
            .and_then(|r| self.entry(r))
    }

    /// Asset linked from `entry`'s field `name`.
    pub fn linked_asset(&self, entry: &Entry, name: &str) -> Option<&Asset> {
        entry
            .field(name)
            .and_then(FieldValue::as_asset)
            .and_then(|r| self.asset(r))
    }

    /// Select `locale` on every wildcard-fetched resource. Returns how many
    /// resources switched; single-locale ones are left alone.
    pub fn set_locale(&mut self, locale: &str) -> usize {
        let entries = self
            .entries
            .iter_mut()
            .map(|e| e.set_locale(locale).is_ok())
            .filter(|switched| *switched)
            .count();
        let assets = self
            .assets
            .iter_mut()
            .map(|a| a.set_locale(locale).is_ok())
            .filter(|switched| *switched)
            .count();
        entries + assets
    }
}

fn lookup(index: &HashMap<(LinkType, String), Vec<Candidate>>, link: &Link) -> Option<ItemRef> {
    index
        .get(&(link.link_type, link.id.clone()))?
        .iter()
        .find(|c| link.content_type.is_none() || c.content_type == link.content_type)
        .map(|c| c.target)
}

fn bind(
    value: &mut FieldValue,
    index: &HashMap<(LinkType, String), Vec<Candidate>>,
    stats: &mut ResolveStats,
) {
    match value {
        FieldValue::Link(link) => match lookup(index, link) {
            Some(ItemRef::Entry(r)) => {
                *value = FieldValue::Entry(r);
                stats.bound += 1;
            }
            Some(ItemRef::Asset(r)) => {
                *value = FieldValue::Asset(r);
                stats.bound += 1;
            }
            None => stats.unresolved += 1,
        },
        FieldValue::List(items) => {
            for item in items {
                bind(item, index, stats);
            }
        }
        FieldValue::Localized(per_locale) => {
            for item in per_locale.values_mut() {
                bind(item, index, stats);
            }
        }
        _ => {}
    }
}
