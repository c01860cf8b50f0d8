// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hierarchical data: an arena of items with field indexes, CRUD, and events.
//!
//! Items are addressed by generational [`ItemId`]s. Structure and field
//! changes dispatch [`Signal::DATA_CHANGED`], meta changes dispatch
//! [`Signal::META_CHANGED`], and when [`dispatch_events`](TreeModel::set_dispatch_events)
//! is on every CRUD operation also reports a [`TreeEvent`].

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::OnceCell;
use core::cmp::Ordering;
use core::fmt;

use chartwell_consistency::{
    ComponentId, Dispatching, ListenerId, Signal, SignalDispatcher, SignalEvent,
};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::value::Value;

/// Field holding an item's id in parent-pointer data.
pub const ID_FIELD: &str = "id";
/// Field holding the parent's id in parent-pointer data.
pub const PARENT_FIELD: &str = "parent";

/// Field values of one item.
pub type Fields = HashMap<String, Value>;

/// Identifier for an item of a [`TreeModel`].
///
/// A slot index plus a generation. Removing an item frees its slot; reusing
/// the slot bumps the generation, so stale ids never alias a live item.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemId(u32, u32);

impl ItemId {
    const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Raw nested item data, as accepted by [`TreeModel::add_data`] and returned
/// by [`TreeModel::remove`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeData {
    /// Field values.
    pub fields: Fields,
    /// Child items, in order.
    pub children: Vec<Self>,
}

impl TreeData {
    /// Builds an item from `(name, value)` pairs.
    pub fn new<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            children: Vec::new(),
        }
    }

    /// Appends a child.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }
}

/// A structural or value change, reported to event listeners.
#[derive(Clone, Debug, PartialEq)]
pub enum TreeEvent {
    /// A new item was inserted.
    Create {
        /// The new item.
        item: ItemId,
        /// Its parent, `None` for a root.
        parent: Option<ItemId>,
        /// Its position among its siblings.
        index: usize,
    },
    /// An existing item changed position.
    Move {
        /// The moved item.
        item: ItemId,
        /// The previous parent.
        source: Option<ItemId>,
        /// The previous position.
        source_index: usize,
        /// The new parent.
        target: Option<ItemId>,
        /// The new position.
        target_index: usize,
    },
    /// A field was set or deleted.
    Update {
        /// The changed item.
        item: ItemId,
        /// The field name.
        field: String,
    },
    /// An item and its subtree were removed. `item` is stale by the time the
    /// event is delivered.
    Remove {
        /// The removed item.
        item: ItemId,
        /// Its former parent.
        source: Option<ItemId>,
        /// Its former position.
        source_index: usize,
    },
}

/// Errors reported by [`TreeModel`] operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// The id refers to a removed item.
    StaleItem(ItemId),
    /// The move would make an item its own ancestor.
    WouldCreateCycle(ItemId),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleItem(id) => write!(f, "tree item {}:{} no longer exists", id.0, id.1),
            Self::WouldCreateCycle(id) => {
                write!(f, "moving tree item {}:{} under itself", id.0, id.1)
            }
        }
    }
}

impl core::error::Error for TreeError {}

/// Handle of an event listener.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventListenerId(u32);

#[derive(Debug)]
struct Item {
    fields: Fields,
    meta: Fields,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    item: Option<Item>,
}

/// Sort key of a field index. Missing values sort first, then numbers, then
/// text.
#[derive(Clone, Debug)]
enum IndexKey {
    Missing,
    Number(f64),
    Text(String),
}

impl IndexKey {
    fn of(value: Option<&Value>, as_string: bool) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(v) if as_string => Self::Text(v.to_text()),
            Some(Value::Text(s)) => Self::Text(s.clone()),
            Some(v) => Self::Number(v.to_number()),
        }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Missing, Self::Missing) => Ordering::Equal,
            (Self::Missing, _) => Ordering::Less,
            (_, Self::Missing) => Ordering::Greater,
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

#[derive(Debug)]
struct FieldIndex {
    as_string: bool,
    entries: Vec<(IndexKey, SmallVec<[ItemId; 1]>)>,
}

impl FieldIndex {
    fn insert(&mut self, key: IndexKey, id: ItemId) {
        match self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(pos) => {
                let bucket = &mut self.entries[pos].1;
                if !bucket.contains(&id) {
                    bucket.push(id);
                }
            }
            Err(pos) => self.entries.insert(pos, (key, SmallVec::from_elem(id, 1))),
        }
    }

    fn remove(&mut self, key: &IndexKey, id: ItemId) {
        if let Ok(pos) = self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            let bucket = &mut self.entries[pos].1;
            bucket.retain(|other| *other != id);
            if bucket.is_empty() {
                self.entries.remove(pos);
            }
        }
    }

    fn get(&self, key: &IndexKey) -> &[ItemId] {
        match self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(pos) => &self.entries[pos].1,
            Err(_) => &[],
        }
    }
}

fn item_ref(slots: &[Slot], id: ItemId) -> Option<&Item> {
    slots
        .get(id.idx())
        .filter(|slot| slot.generation == id.1)
        .and_then(|slot| slot.item.as_ref())
}

fn item_mut_in(slots: &mut [Slot], id: ItemId) -> Option<&mut Item> {
    slots
        .get_mut(id.idx())
        .filter(|slot| slot.generation == id.1)
        .and_then(|slot| slot.item.as_mut())
}

type EventListener = Box<dyn FnMut(&TreeEvent)>;

/// An ordered forest of items with optional field indexes.
///
/// # Example
///
/// ```
/// use chartwell_data::{TreeData, TreeModel, Value};
///
/// let mut tree = TreeModel::new();
/// tree.add_data([TreeData::new([("id", "root")])
///     .with_child(TreeData::new([("id", "a"), ("duration", "3")]))]);
///
/// tree.create_index_on("id", true);
/// let a = tree.find("id", &Value::from("a")).unwrap();
/// assert_eq!(tree.get(a, "duration"), Some(&Value::from("3")));
/// assert_eq!(tree.depth(a), Some(1));
/// ```
pub struct TreeModel {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: Vec<ItemId>,
    live: usize,
    indexes: HashMap<String, FieldIndex>,
    traversal: OnceCell<Vec<ItemId>>,
    dispatcher: SignalDispatcher,
    dispatch_events: bool,
    listeners: Vec<(EventListenerId, EventListener)>,
    next_listener: u32,
}

impl fmt::Debug for TreeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeModel")
            .field("items", &self.live)
            .field("roots", &self.roots.len())
            .field("indexes", &self.indexes.len())
            .field("dispatch_events", &self.dispatch_events)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for TreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatching for TreeModel {
    fn dispatcher_mut(&mut self) -> &mut SignalDispatcher {
        &mut self.dispatcher
    }
}

impl TreeModel {
    /// Signals a tree dispatches.
    pub const SUPPORTED_SIGNALS: Signal = Signal::DATA_CHANGED.union(Signal::META_CHANGED);

    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            live: 0,
            indexes: HashMap::new(),
            traversal: OnceCell::new(),
            dispatcher: SignalDispatcher::new(ComponentId::next(), Self::SUPPORTED_SIGNALS),
            dispatch_events: true,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Returns the tree's component id.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.dispatcher.source()
    }

    /// Registers a signal listener.
    pub fn listen(&mut self, listener: impl FnMut(&SignalEvent) + 'static) -> ListenerId {
        self.dispatcher.listen(listener)
    }

    /// Removes a signal listener.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.dispatcher.unlisten(id)
    }

    /// Registers an event listener.
    pub fn listen_events(&mut self, listener: impl FnMut(&TreeEvent) + 'static) -> EventListenerId {
        let id = EventListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes an event listener.
    pub fn unlisten_events(&mut self, id: EventListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(other, _)| *other != id);
        self.listeners.len() != before
    }

    /// Returns whether CRUD operations report [`TreeEvent`]s.
    #[must_use]
    pub const fn dispatch_events(&self) -> bool {
        self.dispatch_events
    }

    /// Turns event reporting on or off. Signals are unaffected.
    pub fn set_dispatch_events(&mut self, enabled: bool) {
        self.dispatch_events = enabled;
    }

    /// Number of live items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the tree holds no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns `true` if `id` refers to a live item.
    #[must_use]
    pub fn is_alive(&self, id: ItemId) -> bool {
        item_ref(&self.slots, id).is_some()
    }

    /// Root items, in order.
    #[must_use]
    pub fn roots(&self) -> &[ItemId] {
        &self.roots
    }

    /// Children of `id`, in order.
    #[must_use]
    pub fn children(&self, id: ItemId) -> Option<&[ItemId]> {
        item_ref(&self.slots, id).map(|item| item.children.as_slice())
    }

    /// Parent of `id`; `None` for roots and stale ids.
    #[must_use]
    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        item_ref(&self.slots, id).and_then(|item| item.parent)
    }

    /// Distance from `id` to its root.
    #[must_use]
    pub fn depth(&self, id: ItemId) -> Option<usize> {
        let mut item = item_ref(&self.slots, id)?;
        let mut depth = 0;
        while let Some(parent) = item.parent {
            item = item_ref(&self.slots, parent)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Position of `id` among its siblings.
    #[must_use]
    pub fn index_in_parent(&self, id: ItemId) -> Option<usize> {
        self.siblings(self.parent(id))?
            .iter()
            .position(|other| *other == id)
    }

    /// All items in depth-first pre-order.
    ///
    /// The order is computed on first use and cached until the structure
    /// changes.
    pub fn traverse(&self) -> &[ItemId] {
        self.traversal.get_or_init(|| {
            let mut order = Vec::with_capacity(self.live);
            let mut stack: Vec<ItemId> = self.roots.iter().rev().copied().collect();
            while let Some(id) = stack.pop() {
                if let Some(item) = item_ref(&self.slots, id) {
                    order.push(id);
                    stack.extend(item.children.iter().rev());
                }
            }
            order
        })
    }

    /// Returns field `field` of `id`.
    #[must_use]
    pub fn get(&self, id: ItemId, field: &str) -> Option<&Value> {
        item_ref(&self.slots, id).and_then(|item| item.fields.get(field))
    }

    /// Returns all fields of `id`.
    #[must_use]
    pub fn fields(&self, id: ItemId) -> Option<&Fields> {
        item_ref(&self.slots, id).map(|item| &item.fields)
    }

    /// Sets field `field` of `id` and returns the previous value.
    ///
    /// Setting a field to its current value changes nothing and dispatches
    /// nothing.
    pub fn set(
        &mut self,
        id: ItemId,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, TreeError> {
        let value = value.into();
        let current = self.item(id)?.fields.get(field);
        if current == Some(&value) {
            return Ok(current.cloned());
        }
        self.unindex(id, Some(field));
        let previous = self.item_mut(id)?.fields.insert(field.into(), value);
        self.index(id, Some(field));
        self.data_changed();
        self.emit(TreeEvent::Update {
            item: id,
            field: field.into(),
        });
        Ok(previous)
    }

    /// Deletes field `field` of `id` and returns its value.
    pub fn del(&mut self, id: ItemId, field: &str) -> Result<Option<Value>, TreeError> {
        if !self.item(id)?.fields.contains_key(field) {
            return Ok(None);
        }
        self.unindex(id, Some(field));
        let previous = self.item_mut(id)?.fields.remove(field);
        self.index(id, Some(field));
        self.data_changed();
        self.emit(TreeEvent::Update {
            item: id,
            field: field.into(),
        });
        Ok(previous)
    }

    /// Returns meta value `key` of `id`.
    #[must_use]
    pub fn meta(&self, id: ItemId, key: &str) -> Option<&Value> {
        item_ref(&self.slots, id).and_then(|item| item.meta.get(key))
    }

    /// Sets meta value `key` of `id`.
    ///
    /// Meta is per-item bookkeeping for views (collapsed flags, cached
    /// geometry). It is never indexed and only dispatches
    /// [`Signal::META_CHANGED`].
    pub fn set_meta(
        &mut self,
        id: ItemId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, TreeError> {
        let value = value.into();
        let item = self.item_mut(id)?;
        if item.meta.get(key) == Some(&value) {
            return Ok(Some(value));
        }
        let previous = item.meta.insert(key.into(), value);
        self.dispatcher.dispatch(Signal::META_CHANGED);
        Ok(previous)
    }

    /// Appends a new root.
    pub fn add_child(&mut self, data: TreeData) -> ItemId {
        let index = self.roots.len();
        let id = self.build(data, None);
        self.insert_new(id, None, index)
    }

    /// Inserts a new item under `parent` (a root for `None`) at `index`,
    /// clamped to the sibling count.
    pub fn add_child_at(
        &mut self,
        parent: Option<ItemId>,
        data: TreeData,
        index: usize,
    ) -> Result<ItemId, TreeError> {
        if let Some(parent) = parent {
            self.item(parent)?;
        }
        let id = self.build(data, parent);
        Ok(self.insert_new(id, parent, index))
    }

    /// Appends a new child to `parent`.
    pub fn add_child_to(&mut self, parent: ItemId, data: TreeData) -> Result<ItemId, TreeError> {
        let index = self.item(parent)?.children.len();
        self.add_child_at(Some(parent), data, index)
    }

    /// Moves `id` under `target` (a root for `None`) at `index`, clamped to
    /// the target's child count after `id` is detached.
    pub fn move_item(
        &mut self,
        id: ItemId,
        target: Option<ItemId>,
        index: usize,
    ) -> Result<(), TreeError> {
        self.item(id)?;
        if let Some(target) = target {
            self.item(target)?;
            if self.is_ancestor_or_self(id, target) {
                return Err(TreeError::WouldCreateCycle(id));
            }
        }
        let (source, source_index) = self.detach(id);
        let target_index = self.attach(id, target, index);
        self.data_changed();
        self.emit(TreeEvent::Move {
            item: id,
            source,
            source_index,
            target,
            target_index,
        });
        Ok(())
    }

    /// Removes `id` with its subtree and returns the removed data.
    pub fn remove(&mut self, id: ItemId) -> Result<TreeData, TreeError> {
        self.item(id)?;
        let (source, source_index) = self.detach(id);
        self.unindex_subtree(id);
        let data = self.take_subtree(id);
        self.data_changed();
        self.emit(TreeEvent::Remove {
            item: id,
            source,
            source_index,
        });
        Ok(data)
    }

    /// Removes every child of `parent` (every root for `None`) and returns how
    /// many were removed. Dispatches a single signal and no events.
    pub fn remove_children(&mut self, parent: Option<ItemId>) -> Result<usize, TreeError> {
        let children = match parent {
            Some(parent) => core::mem::take(&mut self.item_mut(parent)?.children),
            None => core::mem::take(&mut self.roots),
        };
        for &child in &children {
            self.unindex_subtree(child);
            self.take_subtree(child);
        }
        if !children.is_empty() {
            self.data_changed();
        }
        Ok(children.len())
    }

    /// Appends nested items as roots.
    ///
    /// Listeners receive a single [`Signal::DATA_CHANGED`] and no events.
    pub fn add_data(&mut self, data: impl IntoIterator<Item = TreeData>) {
        self.bulk(|tree| {
            for data in data {
                let id = tree.build(data, None);
                tree.roots.push(id);
                tree.index_subtree(id);
                tree.data_changed();
            }
        });
    }

    /// Appends flat rows linked by [`ID_FIELD`] and [`PARENT_FIELD`].
    ///
    /// Ids compare as strings. When several rows share an id, the first one
    /// (or an item already in the tree) receives the children. Rows whose
    /// parent is unknown, or whose placement would close a cycle, become
    /// roots. Listeners receive a single [`Signal::DATA_CHANGED`] and no
    /// events.
    pub fn add_data_as_table(&mut self, rows: impl IntoIterator<Item = Fields>) {
        self.bulk(|tree| {
            let mut owners: HashMap<String, ItemId> = HashMap::new();
            let mut created: Vec<(ItemId, Option<String>)> = Vec::new();

            for fields in rows {
                let own = fields.get(ID_FIELD).filter(|v| !v.is_null()).map(Value::to_text);
                let parent = fields
                    .get(PARENT_FIELD)
                    .filter(|v| !v.is_null())
                    .map(Value::to_text);
                let id = tree.alloc(Item {
                    fields,
                    meta: Fields::new(),
                    parent: None,
                    children: Vec::new(),
                });
                if let Some(own) = own {
                    if owners.contains_key(&own) {
                        tracing::warn!(id = %own, "tree item id is not unique");
                    } else if let Some(existing) = tree.find_text(ID_FIELD, &own) {
                        tracing::warn!(id = %own, "tree item id duplicates an existing item");
                        owners.insert(own, existing);
                    } else {
                        owners.insert(own, id);
                    }
                }
                created.push((id, parent));
            }

            let ids: Vec<ItemId> = created.iter().map(|(id, _)| *id).collect();
            for (id, parent) in created {
                let target = match parent {
                    None => None,
                    Some(parent) => {
                        let found = owners
                            .get(&parent)
                            .copied()
                            .or_else(|| tree.find_text(ID_FIELD, &parent));
                        match found {
                            Some(target) if tree.is_ancestor_or_self(id, target) => {
                                tracing::warn!(parent = %parent, "tree data contains a cycle");
                                None
                            }
                            Some(target) => Some(target),
                            None => {
                                tracing::warn!(parent = %parent, "tree item parent is missing");
                                None
                            }
                        }
                    }
                };
                let index = tree.siblings(target).map_or(0, <[ItemId]>::len);
                tree.attach(id, target, index);
            }

            for &id in &ids {
                tree.index(id, None);
            }
            if !ids.is_empty() {
                tree.data_changed();
            }
        });
    }

    /// Creates an index on `field`. Values are compared as strings when
    /// `as_string` is set. Returns `false` if the index already existed.
    pub fn create_index_on(&mut self, field: &str, as_string: bool) -> bool {
        if self.indexes.contains_key(field) {
            return false;
        }
        let mut index = FieldIndex {
            as_string,
            entries: Vec::new(),
        };
        for &id in self.traverse() {
            if let Some(item) = item_ref(&self.slots, id) {
                index.insert(IndexKey::of(item.fields.get(field), as_string), id);
            }
        }
        tracing::debug!(field, keys = index.entries.len(), "created tree index");
        self.indexes.insert(field.into(), index);
        true
    }

    /// Drops the index on `field`. Returns `false` if there was none.
    pub fn remove_index_on(&mut self, field: &str) -> bool {
        self.indexes.remove(field).is_some()
    }

    /// Returns `true` if `field` is indexed.
    #[must_use]
    pub fn has_index_on(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    /// Returns every item whose `field` equals `value`.
    ///
    /// Uses the field index when one exists (in index bucket order) and the
    /// cached traversal otherwise (in tree order).
    #[must_use]
    pub fn search(&self, field: &str, value: &Value) -> Vec<ItemId> {
        if let Some(index) = self.indexes.get(field) {
            return index
                .get(&IndexKey::of(Some(value), index.as_string))
                .to_vec();
        }
        let key = IndexKey::of(Some(value), false);
        self.traverse()
            .iter()
            .copied()
            .filter(|&id| {
                item_ref(&self.slots, id)
                    .is_some_and(|item| IndexKey::of(item.fields.get(field), false) == key)
            })
            .collect()
    }

    /// Returns the first item whose `field` equals `value`.
    #[must_use]
    pub fn find(&self, field: &str, value: &Value) -> Option<ItemId> {
        if let Some(index) = self.indexes.get(field) {
            return index
                .get(&IndexKey::of(Some(value), index.as_string))
                .first()
                .copied();
        }
        let key = IndexKey::of(Some(value), false);
        self.traverse().iter().copied().find(|&id| {
            item_ref(&self.slots, id)
                .is_some_and(|item| IndexKey::of(item.fields.get(field), false) == key)
        })
    }

    /// Releases listeners and stops dispatch.
    pub fn dispose(&mut self) {
        self.listeners.clear();
        self.dispatcher.dispose();
    }

    fn item(&self, id: ItemId) -> Result<&Item, TreeError> {
        item_ref(&self.slots, id).ok_or(TreeError::StaleItem(id))
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut Item, TreeError> {
        item_mut_in(&mut self.slots, id).ok_or(TreeError::StaleItem(id))
    }

    fn siblings(&self, parent: Option<ItemId>) -> Option<&[ItemId]> {
        match parent {
            None => Some(&self.roots),
            Some(parent) => self.children(parent),
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "a tree never holds anywhere near u32::MAX slots"
    )]
    fn alloc(&mut self, item: Item) -> ItemId {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.generation += 1;
            slot.item = Some(item);
            return ItemId(idx, slot.generation);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            item: Some(item),
        });
        ItemId(idx, 1)
    }

    /// Allocates `data` and its descendants, detached from any sibling list.
    fn build(&mut self, data: TreeData, parent: Option<ItemId>) -> ItemId {
        let id = self.alloc(Item {
            fields: data.fields,
            meta: Fields::new(),
            parent,
            children: Vec::new(),
        });
        let children: Vec<ItemId> = data
            .children
            .into_iter()
            .map(|child| self.build(child, Some(id)))
            .collect();
        if let Ok(item) = self.item_mut(id) {
            item.children = children;
        }
        id
    }

    fn insert_new(&mut self, id: ItemId, parent: Option<ItemId>, index: usize) -> ItemId {
        let index = self.attach(id, parent, index);
        self.index_subtree(id);
        self.data_changed();
        self.emit(TreeEvent::Create {
            item: id,
            parent,
            index,
        });
        id
    }

    /// Inserts `id` into the sibling list of `parent`. Returns the clamped
    /// position.
    fn attach(&mut self, id: ItemId, parent: Option<ItemId>, index: usize) -> usize {
        let parent = parent.filter(|&p| self.is_alive(p));
        let siblings = match parent.and_then(|p| item_mut_in(&mut self.slots, p)) {
            Some(item) => &mut item.children,
            None => &mut self.roots,
        };
        let index = index.min(siblings.len());
        siblings.insert(index, id);
        if let Some(item) = item_mut_in(&mut self.slots, id) {
            item.parent = parent;
        }
        index
    }

    /// Removes `id` from its sibling list. Returns the former parent and
    /// position.
    fn detach(&mut self, id: ItemId) -> (Option<ItemId>, usize) {
        let parent = self.parent(id);
        let siblings = match parent.and_then(|p| item_mut_in(&mut self.slots, p)) {
            Some(item) => &mut item.children,
            None => &mut self.roots,
        };
        let Some(index) = siblings.iter().position(|other| *other == id) else {
            return (parent, 0);
        };
        siblings.remove(index);
        if let Some(item) = item_mut_in(&mut self.slots, id) {
            item.parent = None;
        }
        (parent, index)
    }

    /// Returns `true` if `ancestor` is `id` or one of its ancestors.
    fn is_ancestor_or_self(&self, ancestor: ItemId, id: ItemId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.parent(cur);
        }
        false
    }

    /// Frees `id` and its descendants, rebuilding their data.
    fn take_subtree(&mut self, id: ItemId) -> TreeData {
        let Some(item) = self
            .slots
            .get_mut(id.idx())
            .filter(|slot| slot.generation == id.1)
            .and_then(|slot| slot.item.take())
        else {
            return TreeData::default();
        };
        self.live -= 1;
        self.free.push(id.0);
        TreeData {
            fields: item.fields,
            children: item
                .children
                .into_iter()
                .map(|child| self.take_subtree(child))
                .collect(),
        }
    }

    fn find_text(&self, field: &str, text: &str) -> Option<ItemId> {
        self.traverse().iter().copied().find(|&id| {
            item_ref(&self.slots, id)
                .and_then(|item| item.fields.get(field))
                .is_some_and(|v| !v.is_null() && v.to_text() == text)
        })
    }

    fn index(&mut self, id: ItemId, only: Option<&str>) {
        let Some(item) = item_ref(&self.slots, id) else {
            return;
        };
        for (field, index) in &mut self.indexes {
            if only.is_none_or(|only| only == field.as_str()) {
                index.insert(IndexKey::of(item.fields.get(field), index.as_string), id);
            }
        }
    }

    fn unindex(&mut self, id: ItemId, only: Option<&str>) {
        let Some(item) = item_ref(&self.slots, id) else {
            return;
        };
        for (field, index) in &mut self.indexes {
            if only.is_none_or(|only| only == field.as_str()) {
                index.remove(&IndexKey::of(item.fields.get(field), index.as_string), id);
            }
        }
    }

    fn subtree(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(item) = item_ref(&self.slots, cur) {
                out.push(cur);
                stack.extend(item.children.iter().rev());
            }
        }
        out
    }

    fn index_subtree(&mut self, id: ItemId) {
        if self.indexes.is_empty() {
            return;
        }
        for item in self.subtree(id) {
            self.index(item, None);
        }
    }

    fn unindex_subtree(&mut self, id: ItemId) {
        if self.indexes.is_empty() {
            return;
        }
        for item in self.subtree(id) {
            self.unindex(item, None);
        }
    }

    fn data_changed(&mut self) {
        self.traversal.take();
        self.dispatcher.dispatch(Signal::DATA_CHANGED);
    }

    fn emit(&mut self, event: TreeEvent) {
        if !self.dispatch_events {
            return;
        }
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    /// Runs `f` with signals coalesced and events off.
    fn bulk(&mut self, f: impl FnOnce(&mut Self)) {
        let events = core::mem::replace(&mut self.dispatch_events, false);
        self.batch(f);
        self.dispatch_events = events;
    }
}
