//! The shared container handle.
//!
//! Each handle keeps a local mirror of the container. Before every access it
//! pulls: if the snapshot counter moved it reloads the current snapshot, then
//! it replays log records up to the published stream position. Mutations are
//! applied to the mirror first and then published as a log record; when the
//! log is full the whole container is written to a new snapshot instead.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use sharedobj_shm::Segment;

use crate::codec::{Codec, PostcardCodec};
use crate::config::{Config, Options, WriterLock};
use crate::error::{Error, Result};
use crate::kind::{Descriptor, Kind, unhashable};
use crate::layout::ControlBlock;
use crate::log::{OperationLog, log_name};
use crate::op::{MapOp, Op, SeqOp, SetOp};
use crate::registry::{Registry, registry_name};
use crate::snapshot;
use crate::value::{Value, normalize_index};

/// A list, queue, set or map replicated through shared memory.
///
/// Cloning a handle is cheap and shares the local mirror; every process (or
/// every independent attach) gets its own mirror.
pub struct SharedObject<C: Codec = PostcardCodec> {
    name: Arc<str>,
    inner: Arc<Mutex<Inner<C>>>,
}

impl<C: Codec> Clone for SharedObject<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: self.inner.clone(),
        }
    }
}

/// An element read out of a container: a plain value, or a handle to a
/// nested shared container.
pub enum Element<C: Codec = PostcardCodec> {
    Value(Value),
    Shared(SharedObject<C>),
}

pub(crate) struct Inner<C: Codec> {
    name: String,
    control: ControlBlock,
    log: OperationLog,
    pub(crate) kind: Kind,
    pub(crate) nested: bool,
    registry: Option<Registry<C>>,
    registry_name: Option<String>,
    /// This handle created or attached the registry and closes it.
    owns_registry: bool,
    child_config: Config,
    pub(crate) data: Value,
    position: u32,
    counter: u32,
    /// Materialized handles of nested children, by name.
    children: HashMap<String, SharedObject<C>>,
    dirty: bool,
    writer_lock: Option<Arc<dyn WriterLock>>,
    closed: bool,
    unlinked: bool,
}

// =============================================================================
// Construction
// =============================================================================

impl<C: Codec> SharedObject<C> {
    /// Create or attach, as described by `options`.
    pub fn open(options: Options) -> Result<Self> {
        if options.create {
            let value = options.value.ok_or(Error::MissingValue)?;
            Self::create_in(value, &options.config, None)
        } else {
            let name = options.config.name.ok_or(Error::MissingName)?;
            Self::attach_in(&name, None)
        }
    }

    /// Create a new container holding `value`.
    pub fn create(value: impl Into<Value>, config: &Config) -> Result<Self> {
        Self::create_in(value.into(), config, None)
    }

    /// Attach to the existing container `name`.
    pub fn attach(name: &str) -> Result<Self> {
        Self::attach_in(name, None)
    }

    fn create_in(value: Value, config: &Config, registry: Option<Registry<C>>) -> Result<Self> {
        let kind = Kind::of(&value)?;
        let nested = config.nested && kind.allows_nesting();

        let mut control = ControlBlock::create(config.name.as_deref(), config.control_size)?;
        let name = control.name().to_string();

        let tree_registry = nested.then(|| match &registry {
            Some(registry) => registry.name().to_string(),
            None => registry_name(&name),
        });
        let descriptor = Descriptor {
            kind: kind.clone(),
            registry: tree_registry.clone(),
        };
        let written = descriptor
            .encode::<C>()
            .and_then(|bytes| control.write_descriptor(&bytes))
            .and_then(|()| control.set_nested(nested));
        if let Err(e) = written {
            control.close();
            abandon(&name);
            return Err(e);
        }

        let mut log = match OperationLog::create(&log_name(&name), config.log_size) {
            Ok(log) => log,
            Err(e) => {
                control.close();
                abandon(&name);
                return Err(e);
            }
        };

        let (registry, owns_registry) = match (nested, registry) {
            (false, _) => (None, false),
            (true, Some(registry)) => (Some(registry), false),
            (true, None) => match Registry::create(&name, config) {
                Ok(registry) => (Some(registry), true),
                Err(e) => {
                    control.close();
                    log.close();
                    abandon(&name);
                    return Err(e);
                }
            },
        };

        let child_config = config.for_child();

        tracing::debug!(name = %name, kind = kind.name(), nested, "created shared container");

        let object = Self::from_inner(Inner {
            name,
            control,
            log,
            data: kind.empty(),
            kind,
            nested,
            registry,
            registry_name: tree_registry,
            owns_registry,
            child_config,
            position: 0,
            counter: 0,
            children: HashMap::new(),
            dirty: false,
            writer_lock: None,
            closed: false,
            unlinked: false,
        });
        if let Err(e) = object.populate(value) {
            if let Err(cleanup) = object.unlink() {
                tracing::warn!(name = %object.name(), error = %cleanup, "cleanup after failed create");
            }
            return Err(e);
        }
        Ok(object)
    }

    fn attach_in(name: &str, registry: Option<Registry<C>>) -> Result<Self> {
        let control = ControlBlock::open(name)?;
        let log = OperationLog::open(&log_name(name))?;
        let descriptor = Descriptor::decode::<C>(&control.read_descriptor()?)?;
        let nested = control.nested()?;

        let (registry, owns_registry) = match (nested, registry, &descriptor.registry) {
            (false, _, _) => (None, false),
            (true, Some(registry), _) => (Some(registry), false),
            (true, None, Some(registry_name)) => (Some(Registry::attach(registry_name)?), true),
            (true, None, None) => (None, false),
        };

        let child_config = Config {
            name: None,
            log_size: log.capacity(),
            control_size: control.len(),
            nested: true,
        };

        tracing::debug!(name = %name, kind = descriptor.kind.name(), nested, "attached shared container");

        let object = Self::from_inner(Inner {
            name: name.to_string(),
            control,
            log,
            data: descriptor.kind.empty(),
            kind: descriptor.kind,
            nested,
            registry,
            registry_name: descriptor.registry,
            owns_registry,
            child_config,
            position: 0,
            counter: 0,
            children: HashMap::new(),
            dirty: false,
            writer_lock: None,
            closed: false,
            unlinked: false,
        });
        object.apply_changes()?;
        Ok(object)
    }

    fn from_inner(inner: Inner<C>) -> Self {
        Self {
            name: Arc::from(inner.name.as_str()),
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Publish the initial contents element by element.
    fn populate(&self, value: Value) -> Result<()> {
        match value {
            Value::Seq(items) => self.extend(items),
            Value::Queue(queue) => self.extend(queue.into_vec()),
            Value::Set(members) => self.write(|inner| {
                for member in members {
                    inner.record(Op::Set(SetOp::Add(member)))?;
                }
                Ok(())
            }),
            Value::Map(entries) | Value::OrderedMap(entries) => self.assign_all(entries.into_pairs()),
            Value::DefaultMap(map) => self.assign_all(map.entries.into_pairs()),
            _ => Ok(()),
        }
    }

    fn assign_all(&self, pairs: Vec<(Value, Value)>) -> Result<()> {
        self.write(|inner| {
            for (key, item) in pairs {
                let item = inner.promote(item)?;
                inner.record(Op::Map(MapOp::Assign { key, item }))?;
            }
            Ok(())
        })
    }
}

/// Best-effort removal of a half-built container.
fn abandon(name: &str) {
    let _ = Segment::unlink(name);
    let _ = Segment::unlink(&log_name(name));
}

/// Unlink the control, log and current snapshot segments stored under `name`.
/// Missing segments are skipped.
fn destroy_storage(name: &str) {
    let snapshot = ControlBlock::open(name)
        .ok()
        .and_then(|control| control.snapshot_name().ok().flatten());
    for segment in [Some(name.to_string()), Some(log_name(name)), snapshot]
        .into_iter()
        .flatten()
    {
        if let Err(e) = Segment::unlink(&segment) {
            tracing::trace!(segment = %segment, error = %e, "segment already gone");
        }
    }
}

// =============================================================================
// Access plumbing
// =============================================================================

impl<C: Codec> SharedObject<C> {
    /// Run `f` on an up-to-date mirror.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&mut Inner<C>) -> Result<R>) -> Result<R> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.pull()?;
        let out = f(&mut *inner);
        inner.prune();
        out
    }

    /// Like [`read`](Self::read), holding the writer lock around the pull
    /// and the mutation.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Inner<C>) -> Result<R>) -> Result<R> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let writer_lock = inner.writer_lock.clone();
        if let Some(lock) = &writer_lock {
            lock.lock();
        }
        let out = match inner.pull() {
            Ok(()) => f(&mut *inner),
            Err(e) => Err(e),
        };
        if let Some(lock) = &writer_lock {
            lock.unlock();
        }
        inner.prune();
        out
    }

    /// Contents with nested references resolved, continuing a resolution
    /// that started in an enclosing container.
    fn resolved(&self, path: &mut Vec<String>) -> Result<Value> {
        self.read(|inner| {
            let data = inner.data.clone();
            inner.resolve_in(data, path)
        })
    }
}

impl<C: Codec> Inner<C> {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Fail with `WrongKind` unless `ok`.
    pub(crate) fn require(&self, operation: &'static str, ok: bool) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(Error::WrongKind {
                operation,
                kind: self.kind.name(),
            })
        }
    }

    /// Bring the mirror up to date with the shared state.
    fn pull(&mut self) -> Result<()> {
        loop {
            let counter = self.control.snapshot_counter()?;
            if counter != self.counter {
                self.load_snapshot(true)?;
            }
            let end = self.control.stream_position()?;
            // A snapshot published meanwhile resets the log under us.
            if self.control.snapshot_counter()? != counter {
                continue;
            }
            return self.replay(end);
        }
    }

    fn replay(&mut self, end: u32) -> Result<()> {
        if self.position > end {
            tracing::warn!(
                name = %self.name,
                position = self.position,
                end,
                "local position is past the published log"
            );
            return Ok(());
        }
        let mut applied = 0usize;
        while self.position < end {
            let position = self.position;
            let (payload, next) = self.log.read(position, end)?;
            let op: Op = C::decode(&payload).map_err(|e| Error::CorruptLog {
                position,
                reason: e.to_string(),
            })?;
            op.apply(&mut self.data).map_err(|e| Error::CorruptLog {
                position,
                reason: format!("{} does not apply: {}", op.name(), e),
            })?;
            self.position = next;
            applied += 1;
        }
        if applied > 0 {
            self.dirty = true;
            tracing::trace!(name = %self.name, applied, position = self.position, "replayed log");
        }
        Ok(())
    }

    /// Replace the mirror with the current snapshot.
    fn load_snapshot(&mut self, force: bool) -> Result<()> {
        let remote = self.control.snapshot_counter()?;
        if !force && remote == self.counter {
            return Err(Error::NoNewSnapshot);
        }
        let name = self.control.snapshot_name()?.ok_or(Error::NoNewSnapshot)?;
        let bytes = snapshot::read(&name)?;
        self.data = C::decode(&bytes).map_err(Error::codec)?;
        self.counter = remote;
        self.position = 0;
        self.dirty = true;
        tracing::debug!(name = %self.name, snapshot = %name, counter = remote, "loaded snapshot");
        Ok(())
    }

    /// Apply `op` to the mirror and publish it.
    pub(crate) fn record(&mut self, op: Op) -> Result<Option<Value>> {
        let payload = C::encode(&op).map_err(Error::codec)?;
        let out = op.apply(&mut self.data)?;
        self.dirty = true;

        let start = self.control.stream_position()?;
        match self.log.append(start, &payload)? {
            Some(end) => {
                self.position = end;
                self.control.set_stream_position(end)?;
                tracing::trace!(name = %self.name, op = op.name(), end, "published record");
            }
            None => {
                tracing::debug!(
                    name = %self.name,
                    op = op.name(),
                    len = payload.len(),
                    "log full, publishing snapshot"
                );
                self.dump()?;
            }
        }
        Ok(out)
    }

    /// Publish the whole mirror as a new snapshot and reset the log.
    pub(crate) fn dump(&mut self) -> Result<()> {
        self.pull()?;
        let previous = self.control.snapshot_name()?;
        let bytes = C::encode(&self.data).map_err(Error::codec)?;
        let name = snapshot::write(&bytes)?;

        self.control.set_snapshot_name(&name)?;
        self.counter = self.control.bump_snapshot_counter()?;
        self.position = 0;
        self.control.set_stream_position(0)?;

        if let Some(previous) = previous
            && previous != name
        {
            snapshot::unlink(&previous);
        }
        tracing::debug!(name = %self.name, snapshot = %name, counter = self.counter, "published snapshot");
        Ok(())
    }

    /// Turn `item` into what gets stored: in nested mode, containers become
    /// new child containers referenced by name.
    pub(crate) fn promote(&mut self, item: Value) -> Result<Value> {
        if item.contains_shared() {
            return Err(Error::UnsupportedKind(
                "shared references cannot be stored directly".to_string(),
            ));
        }
        if !self.nested || !item.is_container() {
            return Ok(item);
        }
        let Some(registry) = self.registry.clone() else {
            return Ok(item);
        };
        let child = SharedObject::create_in(item, &self.child_config, Some(registry.clone()))?;
        registry.register(child.name())?;
        if let Some(lock) = &self.writer_lock {
            child.inner.lock().writer_lock = Some(lock.clone());
        }
        let name = child.name().to_string();
        tracing::trace!(parent = %self.name, child = %name, "promoted nested container");
        self.children.insert(name.clone(), child);
        Ok(Value::Shared(name))
    }

    /// Handle of the nested child `name`, attaching it on first use.
    fn child(&mut self, name: &str) -> Result<SharedObject<C>> {
        if let Some(child) = self.children.get(name) {
            return Ok(child.clone());
        }
        let child = SharedObject::attach_in(name, self.registry.clone())?;
        if let Some(lock) = &self.writer_lock {
            child.inner.lock().writer_lock = Some(lock.clone());
        }
        self.children.insert(name.to_string(), child.clone());
        Ok(child)
    }

    pub(crate) fn element(&mut self, value: Value) -> Result<Element<C>> {
        match value {
            Value::Shared(name) if self.nested => Ok(Element::Shared(self.child(&name)?)),
            other => Ok(Element::Value(other)),
        }
    }

    /// Replace nested references inside `value` by their contents.
    pub(crate) fn resolve(&mut self, value: Value) -> Result<Value> {
        let mut path = vec![self.name.clone()];
        self.resolve_in(value, &mut path)
    }

    /// `path` holds the containers being resolved, outermost first; meeting
    /// one of them again is a cycle.
    fn resolve_in(&mut self, value: Value, path: &mut Vec<String>) -> Result<Value> {
        if !self.nested {
            return Ok(value);
        }
        Ok(match value {
            Value::Shared(name) => {
                if path.contains(&name) {
                    return Err(Error::CyclicReference(name));
                }
                let child = self.child(&name)?;
                path.push(name);
                let resolved = child.resolved(path);
                path.pop();
                resolved?
            }
            Value::Seq(items) => Value::Seq(self.resolve_all(items, path)?),
            Value::Tuple(items) => Value::Tuple(self.resolve_all(items, path)?),
            Value::Queue(mut queue) => {
                for slot in queue.iter_mut() {
                    *slot = self.resolve_in(std::mem::replace(slot, Value::Null), path)?;
                }
                Value::Queue(queue)
            }
            mut other => {
                if let Some(entries) = other.as_mapping_mut() {
                    for slot in entries.values_mut() {
                        *slot = self.resolve_in(std::mem::replace(slot, Value::Null), path)?;
                    }
                }
                other
            }
        })
    }

    fn resolve_all(&mut self, items: Vec<Value>, path: &mut Vec<String>) -> Result<Vec<Value>> {
        items
            .into_iter()
            .map(|item| self.resolve_in(item, path))
            .collect()
    }

    /// The mirror with every nested reference resolved.
    pub(crate) fn snapshot_value(&mut self) -> Result<Value> {
        let data = self.data.clone();
        self.resolve(data)
    }

    /// Items of a sequence or queue.
    pub(crate) fn sequence_items(&self, operation: &'static str) -> Result<Vec<Value>> {
        match &self.data {
            Value::Seq(items) => Ok(items.clone()),
            Value::Queue(queue) => Ok(queue.iter().cloned().collect()),
            _ => Err(Error::WrongKind {
                operation,
                kind: self.kind.name(),
            }),
        }
    }

    /// First index in `start..stop` whose (resolved) item equals `needle`.
    pub(crate) fn position_of(
        &mut self,
        needle: &Value,
        start: usize,
        stop: usize,
    ) -> Result<Option<usize>> {
        let items = self.sequence_items("index")?;
        for (i, item) in items.into_iter().enumerate() {
            if i < start {
                continue;
            }
            if i >= stop {
                break;
            }
            if &self.resolve(item)? == needle {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Drop cached child handles the container no longer references.
    fn prune(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        if self.children.is_empty() {
            return;
        }
        let live: HashSet<&str> = self.data.shared_refs().into_iter().collect();
        self.children.retain(|name, _| live.contains(name.as_str()));
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for (_, child) in self.children.drain() {
            child.close();
        }
        if self.owns_registry
            && let Some(registry) = &self.registry
        {
            registry.close();
        }
        self.control.close();
        self.log.close();
        tracing::trace!(name = %self.name, "closed shared container");
    }

    /// A usable registry handle, attaching a fresh one if ours is closed.
    fn live_registry(&self) -> Result<Option<Registry<C>>> {
        if let Some(registry) = &self.registry
            && !registry.is_closed()
        {
            return Ok(Some(registry.clone()));
        }
        match &self.registry_name {
            Some(name) => match Registry::attach(name) {
                Ok(registry) => Ok(Some(registry)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    fn unlink(&mut self) -> Result<()> {
        if self.unlinked {
            return Ok(());
        }
        let root_registry = registry_name(&self.name);
        let is_root = self.registry_name.as_deref() == Some(root_registry.as_str());

        destroy_storage(&self.name);

        if is_root {
            if let Some(registry) = self.live_registry()? {
                for child in registry.names()? {
                    destroy_storage(&child);
                }
            }
            destroy_storage(&root_registry);
        } else if self.nested {
            let referenced: Vec<String> = self
                .data
                .shared_refs()
                .into_iter()
                .map(str::to_string)
                .collect();
            let registry = self.live_registry()?;
            for name in referenced {
                match self.child(&name) {
                    Ok(child) => child.unlink()?,
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
                // Children that are not nested themselves (sets) do not
                // deregister on their own.
                if let Some(registry) = &registry {
                    registry.discard(&name)?;
                }
            }
            if let Some(registry) = &registry {
                registry.discard(&self.name)?;
            }
        }

        self.unlinked = true;
        tracing::debug!(name = %self.name, root = is_root, "unlinked shared container");
        self.close();
        Ok(())
    }
}

impl<C: Codec> Drop for Inner<C> {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Operations common to every kind
// =============================================================================

impl<C: Codec> SharedObject<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.inner.lock().kind.clone()
    }

    /// True when container elements are promoted into nested containers.
    pub fn is_nested(&self) -> bool {
        self.inner.lock().nested
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> Result<usize> {
        self.read(|inner| Ok(inner.data.container_len().unwrap_or(0)))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Membership: items of a sequence, members of a set, keys of a map.
    pub fn contains(&self, needle: &Value) -> Result<bool> {
        self.read(|inner| {
            if inner.kind.is_sequence() {
                let len = inner.data.container_len().unwrap_or(0);
                return Ok(inner.position_of(needle, 0, len)?.is_some());
            }
            match &inner.data {
                Value::Set(members) => Ok(members.contains(needle)),
                other => Ok(other.as_mapping().is_some_and(|m| m.contains_key(needle))),
            }
        })
    }

    /// Item at an index of a sequence, or value under a key of a map.
    ///
    /// On a default-valued map, a missing key is filled with the default and
    /// the insertion is published.
    pub fn get_item(&self, key: &Value) -> Result<Element<C>> {
        let is_default_map = matches!(self.inner.lock().kind, Kind::DefaultMap { .. });
        if is_default_map {
            return self.write(|inner| {
                if let Some(found) = inner.data.as_mapping().and_then(|m| m.get(key)).cloned() {
                    return inner.element(found);
                }
                let Kind::DefaultMap { default } = inner.kind.clone() else {
                    return Err(Error::wrong_kind("get_item", &inner.data));
                };
                let item = inner.promote(default)?;
                let stored = inner.record(Op::Map(MapOp::SetDefault {
                    key: key.clone(),
                    item,
                }))?;
                inner.element(stored.unwrap_or(Value::Null))
            });
        }

        self.read(|inner| {
            inner.require("get_item", !matches!(inner.kind, Kind::Set))?;
            let found = match &inner.data {
                Value::Seq(_) | Value::Queue(_) => {
                    let index = as_index(key)?;
                    let len = inner.data.container_len().unwrap_or(0);
                    let i = normalize_index(index, len).ok_or(Error::IndexOutOfRange(index))?;
                    match &inner.data {
                        Value::Seq(items) => items[i].clone(),
                        Value::Queue(queue) => queue.get(i).cloned().unwrap_or(Value::Null),
                        _ => Value::Null,
                    }
                }
                other => other
                    .as_mapping()
                    .and_then(|m| m.get(key))
                    .cloned()
                    .ok_or_else(|| Error::KeyNotFound(key.clone()))?,
            };
            inner.element(found)
        })
    }

    /// Replace the item at an index, or set the value under a key.
    pub fn set_item(&self, key: impl Into<Value>, item: impl Into<Value>) -> Result<()> {
        let (key, item) = (key.into(), item.into());
        self.write(|inner| {
            inner.require("set_item", !matches!(inner.kind, Kind::Set))?;
            if inner.kind.is_sequence() {
                let index = as_index(&key)?;
                let len = inner.data.container_len().unwrap_or(0);
                let i = normalize_index(index, len).ok_or(Error::IndexOutOfRange(index))?;
                let item = inner.promote(item)?;
                inner.record(Op::Seq(SeqOp::Assign {
                    index: i as i64,
                    item,
                }))?;
            } else {
                if !key.is_hashable() {
                    return Err(unhashable(&key));
                }
                let item = inner.promote(item)?;
                inner.record(Op::Map(MapOp::Assign { key, item }))?;
            }
            Ok(())
        })
    }

    /// Delete the item at an index, or the entry under a key.
    pub fn del_item(&self, key: &Value) -> Result<()> {
        self.write(|inner| {
            inner.require("del_item", !matches!(inner.kind, Kind::Set))?;
            if inner.kind.is_sequence() {
                let index = as_index(key)?;
                let len = inner.data.container_len().unwrap_or(0);
                let i = normalize_index(index, len).ok_or(Error::IndexOutOfRange(index))?;
                inner.record(Op::Seq(SeqOp::Delete(i as i64)))?;
            } else {
                inner.record(Op::Map(MapOp::Delete(key.clone())))?;
            }
            Ok(())
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.write(|inner| {
            let op = match inner.kind {
                Kind::Seq | Kind::Queue { .. } => Op::Seq(SeqOp::Clear),
                Kind::Set => Op::Set(SetOp::Clear),
                _ => Op::Map(MapOp::Clear),
            };
            inner.record(op)?;
            Ok(())
        })
    }

    /// Remove and return an item: the last one (or the one at `index`) of a
    /// sequence, the right end of a queue, the smallest member of a set.
    pub fn pop(&self, index: Option<i64>) -> Result<Element<C>> {
        self.write(|inner| {
            let op = match (&inner.kind, index) {
                (Kind::Seq, index) => Op::Seq(SeqOp::Pop(index)),
                (Kind::Queue { .. }, None) => Op::Seq(SeqOp::Pop(None)),
                (Kind::Set, None) => Op::Set(SetOp::Pop),
                _ => {
                    return Err(Error::WrongKind {
                        operation: "pop",
                        kind: inner.kind.name(),
                    });
                }
            };
            let popped = inner.record(op)?;
            inner.element(popped.unwrap_or(Value::Null))
        })
    }

    /// Remove the first item equal to `needle` (sequences) or the member
    /// `needle` (sets).
    pub fn remove(&self, needle: &Value) -> Result<()> {
        self.write(|inner| {
            if matches!(inner.kind, Kind::Set) {
                inner.record(Op::Set(SetOp::Remove(needle.clone())))?;
                return Ok(());
            }
            inner.require("remove", inner.kind.is_sequence())?;
            let len = inner.data.container_len().unwrap_or(0);
            let i = inner
                .position_of(needle, 0, len)?
                .ok_or_else(|| Error::ValueNotFound(needle.clone()))?;
            inner.record(Op::Seq(SeqOp::Delete(i as i64)))?;
            Ok(())
        })
    }

    /// Merge `other` in: its members for a set, its entries (or a sequence
    /// of key/value pairs) for a map.
    pub fn update(&self, other: impl Into<Value>) -> Result<()> {
        let other = other.into();
        self.write(|inner| {
            if matches!(inner.kind, Kind::Set) {
                let members = other.elements().ok_or_else(|| {
                    Error::UnsupportedKind(format!("{} is not iterable", other.kind_name()))
                })?;
                for member in members {
                    inner.record(Op::Set(SetOp::Add(member)))?;
                }
                return Ok(());
            }
            inner.require("update", inner.kind.is_mapping())?;
            for (key, item) in pairs_of(other)? {
                if !key.is_hashable() {
                    return Err(unhashable(&key));
                }
                let item = inner.promote(item)?;
                inner.record(Op::Map(MapOp::Assign { key, item }))?;
            }
            Ok(())
        })
    }

    /// Elements in order: sequence items, set members, map keys.
    pub fn iter(&self) -> Result<std::vec::IntoIter<Element<C>>> {
        self.read(|inner| {
            let values = inner.data.elements().unwrap_or_default();
            let elements = values
                .into_iter()
                .map(|value| inner.element(value))
                .collect::<Result<Vec<_>>>()?;
            Ok(elements.into_iter())
        })
    }

    /// A plain copy of the whole container, nested children included.
    pub fn to_value(&self) -> Result<Value> {
        self.read(|inner| inner.snapshot_value())
    }

    /// Pull pending changes into the local mirror.
    pub fn apply_changes(&self) -> Result<()> {
        self.read(|_| Ok(()))
    }

    /// Publish a snapshot of the container and reset the log.
    pub fn dump_full_object(&self) -> Result<()> {
        self.write(|inner| inner.dump())
    }

    /// Reload the mirror from the current snapshot.
    ///
    /// Without `force` this fails with [`Error::NoNewSnapshot`] unless a
    /// snapshot newer than the last one loaded has been published.
    pub fn load_full_object(&self, force: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.load_snapshot(force)?;
        inner.pull()?;
        inner.prune();
        Ok(())
    }

    /// Release this handle's mappings and those of its materialized nested
    /// children. Shared storage is left in place. Idempotent.
    pub fn close(&self) {
        self.inner.lock().close();
    }

    /// Remove the container's shared storage and close this handle. A root
    /// of a nested tree also removes every registered child and the
    /// registry; a nested child removes the children it references.
    /// Idempotent.
    pub fn unlink(&self) -> Result<()> {
        self.inner.lock().unlink()
    }

    /// Install a lock held around every mutation, shared with nested
    /// children.
    pub fn set_writer_lock(&self, lock: Arc<dyn WriterLock>) {
        let mut inner = self.inner.lock();
        for child in inner.children.values() {
            child.set_writer_lock(lock.clone());
        }
        inner.writer_lock = Some(lock);
    }

    /// Capacity of the operation log in bytes.
    pub fn log_size(&self) -> usize {
        self.inner.lock().log.capacity()
    }

    /// Published end of the log.
    pub fn stream_position(&self) -> Result<u32> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        inner.control.stream_position()
    }

    /// Number of snapshots published so far.
    pub fn snapshot_counter(&self) -> Result<u32> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        inner.control.snapshot_counter()
    }

    /// Names registered in this container's nested tree.
    pub fn registry_names(&self) -> Result<Vec<String>> {
        let registry = self.inner.lock().live_registry()?;
        match registry {
            Some(registry) => registry.names(),
            None => Ok(Vec::new()),
        }
    }

    /// Remove a single raw segment by name; false if it did not exist.
    pub fn unlink_by_name(name: &str) -> bool {
        match Segment::unlink(name) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(name = %name, error = %e, "unlink by name failed");
                false
            }
        }
    }
}

fn as_index(key: &Value) -> Result<i64> {
    match key {
        Value::Int(i) => Ok(*i),
        other => Err(Error::UnsupportedKind(format!(
            "{} is not a valid index",
            other.kind_name()
        ))),
    }
}

/// Key/value pairs from a mapping or a sequence of 2-tuples.
pub(crate) fn pairs_of(value: Value) -> Result<Vec<(Value, Value)>> {
    match value {
        Value::Map(m) | Value::OrderedMap(m) => Ok(m.into_pairs()),
        Value::DefaultMap(d) => Ok(d.entries.into_pairs()),
        Value::Seq(items) | Value::Tuple(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Tuple(mut pair) | Value::Seq(mut pair) if pair.len() == 2 => {
                    let item = pair.pop().unwrap_or(Value::Null);
                    let key = pair.pop().unwrap_or(Value::Null);
                    Ok((key, item))
                }
                other => Err(Error::UnsupportedKind(format!(
                    "{} is not a key/value pair",
                    other
                ))),
            })
            .collect(),
        other => Err(Error::UnsupportedKind(format!(
            "cannot update a map from a {}",
            other.kind_name()
        ))),
    }
}

// =============================================================================
// Comparison and formatting
// =============================================================================

impl<C: Codec> PartialEq for SharedObject<C> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        match (self.to_value(), other.to_value()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl<C: Codec> PartialEq<Value> for SharedObject<C> {
    fn eq(&self, other: &Value) -> bool {
        self.to_value().is_ok_and(|v| &v == other)
    }
}

impl<C: Codec> fmt::Debug for SharedObject<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedObject")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> fmt::Display for SharedObject<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_value() {
            Ok(value) => write!(f, "{}", value),
            Err(_) => write!(f, "<unavailable {}>", self.name),
        }
    }
}

impl<C: Codec> Element<C> {
    /// The element's contents, fetching nested containers.
    pub fn to_value(&self) -> Result<Value> {
        match self {
            Element::Value(value) => Ok(value.clone()),
            Element::Shared(object) => object.to_value(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Element::Value(value) => Some(value),
            Element::Shared(_) => None,
        }
    }

    pub fn as_shared(&self) -> Option<&SharedObject<C>> {
        match self {
            Element::Shared(object) => Some(object),
            Element::Value(_) => None,
        }
    }

    pub fn into_shared(self) -> Option<SharedObject<C>> {
        match self {
            Element::Shared(object) => Some(object),
            Element::Value(_) => None,
        }
    }
}

impl<C: Codec> Clone for Element<C> {
    fn clone(&self) -> Self {
        match self {
            Element::Value(value) => Element::Value(value.clone()),
            Element::Shared(object) => Element::Shared(object.clone()),
        }
    }
}

impl<C: Codec> PartialEq<Value> for Element<C> {
    fn eq(&self, other: &Value) -> bool {
        match self {
            Element::Value(value) => value == other,
            Element::Shared(object) => object == other,
        }
    }
}

impl<C: Codec> PartialEq for Element<C> {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_value(), other.to_value()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl<C: Codec> fmt::Debug for Element<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Element::Shared(object) => f.debug_tuple("Shared").field(object).finish(),
        }
    }
}

impl<C: Codec> fmt::Display for Element<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Value(value) => write!(f, "{}", value),
            Element::Shared(object) => write!(f, "{}", object),
        }
    }
}
