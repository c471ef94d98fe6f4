//! Per-activation storage for `$~` and `$_`.
//!
//! The storage lives in the outermost frame of a chain of declaration
//! frames (a method body and the blocks nested in it share one). A frame
//! layout records whether its frames carry the storage slot; the slot is
//! registered lazily, the first time anything in the chain asks for it.

use std::{
    collections::HashMap,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
};

use parking_lot::{Mutex, RwLock};

use crate::{CacheLimits, Value};

pub const SPECIAL_VARIABLES_SLOT: &str = "$~_";

struct LayoutState {
    slots: Vec<Arc<str>>,
    special: Option<usize>,
}

/// Slot layout shared by every activation of one piece of code. Any
/// structural change bumps `version`, which cached walks check.
pub struct FrameLayout {
    name: Arc<str>,
    state: Mutex<LayoutState>,
    version: AtomicU64,
}

impl FrameLayout {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            state: Mutex::new(LayoutState {
                slots: Vec::new(),
                special: None,
            }),
            version: AtomicU64::new(0),
        })
    }

    /// A layout that declares the storage slot up front.
    pub fn with_special_variables(name: &str) -> Arc<Self> {
        let layout = Self::new(name);
        layout.find_or_add_special_slot();
        layout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn add_slot(&self, name: &str) -> usize {
        let mut state = self.state.lock();
        Self::find_or_add(&mut state, name, &self.version)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.state.lock().slots.iter().position(|slot| &**slot == name)
    }

    pub fn slot_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn has_special_slot(&self) -> bool {
        self.state.lock().special.is_some()
    }

    /// Registration is serialized on the layout so racing callers agree on
    /// one slot.
    fn find_or_add_special_slot(&self) -> usize {
        let mut state = self.state.lock();
        if let Some(slot) = state.special {
            return slot;
        }
        let slot = Self::find_or_add(&mut state, SPECIAL_VARIABLES_SLOT, &self.version);
        state.special = Some(slot);
        log::trace!("registered special variable slot in {}", self.name);
        slot
    }

    fn find_or_add(state: &mut LayoutState, name: &str, version: &AtomicU64) -> usize {
        if let Some(index) = state.slots.iter().position(|slot| &**slot == name) {
            return index;
        }
        state.slots.push(Arc::from(name));
        version.fetch_add(1, Ordering::AcqRel);
        state.slots.len() - 1
    }
}

/// One activation. `declaration` is the lexically enclosing activation for
/// blocks and `None` for method bodies and top-level code.
pub struct Frame {
    layout: Arc<FrameLayout>,
    declaration: Option<Arc<Frame>>,
    storage: OnceLock<Arc<SpecialVariableStorage>>,
}

impl Frame {
    pub fn new(layout: Arc<FrameLayout>, declaration: Option<Arc<Frame>>) -> Arc<Self> {
        Arc::new(Self {
            layout,
            declaration,
            storage: OnceLock::new(),
        })
    }

    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.layout
    }

    pub fn declaration(&self) -> Option<&Arc<Frame>> {
        self.declaration.as_ref()
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(next) = current.declaration.as_deref() {
            depth += 1;
            current = next;
        }
        depth
    }

    /// Storage already materialized in this very frame, if any.
    pub fn storage_if_present(&self) -> Option<&Arc<SpecialVariableStorage>> {
        self.storage.get()
    }

    fn materialize(&self) -> Arc<SpecialVariableStorage> {
        self.storage
            .get_or_init(|| Arc::new(SpecialVariableStorage::new()))
            .clone()
    }
}

/// Walks from `frame` to the nearest frame whose layout has the slot,
/// registering it at the outermost frame if no layout has one.
pub fn get_storage(frame: &Frame) -> Arc<SpecialVariableStorage> {
    walk(frame, None)
}

fn walk(
    frame: &Frame,
    mut path: Option<&mut Vec<(Arc<FrameLayout>, u64)>>,
) -> Arc<SpecialVariableStorage> {
    let mut current = frame;
    loop {
        let found = current.layout.has_special_slot();
        if !found && current.declaration.is_none() {
            current.layout.find_or_add_special_slot();
        }
        if let Some(path) = path.as_deref_mut() {
            path.push((current.layout.clone(), current.layout.version()));
        }
        match current.declaration.as_deref() {
            Some(next) if !found => current = next,
            _ => return current.materialize(),
        }
    }
}

/// Call-site cache for [`get_storage`].
///
/// Remembers the layouts walked last time, with their versions, and replays
/// the same number of hops while every layout still matches. Once the
/// replay has failed `storage_site_failures` times the site stops caching.
pub struct StorageSite {
    path: RwLock<Option<Vec<(Arc<FrameLayout>, u64)>>>,
    failures: AtomicUsize,
    failure_limit: usize,
}

impl StorageSite {
    pub fn new(limits: &CacheLimits) -> Self {
        Self {
            path: RwLock::new(None),
            failures: AtomicUsize::new(0),
            failure_limit: limits.storage_site_failures,
        }
    }

    pub fn get_storage(&self, frame: &Frame) -> Arc<SpecialVariableStorage> {
        if self.is_generic() {
            return get_storage(frame);
        }
        if let Some(storage) = self.replay(frame) {
            return storage;
        }
        let had_path = self.path.read().is_some();
        if had_path {
            let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
            if failures >= self.failure_limit {
                log::debug!("storage site gave up caching after {failures} misses");
                *self.path.write() = None;
                return get_storage(frame);
            }
        }
        let mut path = Vec::new();
        let storage = walk(frame, Some(&mut path));
        *self.path.write() = Some(path);
        storage
    }

    fn replay(&self, frame: &Frame) -> Option<Arc<SpecialVariableStorage>> {
        let cached = self.path.read();
        let path = cached.as_ref()?;
        let mut current = frame;
        for (hop, (layout, version)) in path.iter().enumerate() {
            if !Arc::ptr_eq(&current.layout, layout) || layout.version() != *version {
                return None;
            }
            if hop + 1 < path.len() {
                current = current.declaration.as_deref()?;
            }
        }
        Some(current.materialize())
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        self.failures.load(Ordering::Acquire) >= self.failure_limit
    }

    pub fn cached_depth(&self) -> Option<usize> {
        self.path.read().as_ref().map(|path| path.len() - 1)
    }
}

/// A value visible only to the thread that set it, within one frame. The
/// creating thread's value is kept inline.
pub struct ThreadAndFrameLocal {
    owner: ThreadId,
    state: Mutex<(Value, HashMap<ThreadId, Value>)>,
}

impl ThreadAndFrameLocal {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            state: Mutex::new((Value::Nil, HashMap::new())),
        }
    }

    pub fn get(&self) -> Value {
        let current = thread::current().id();
        let state = self.state.lock();
        if current == self.owner {
            state.0.clone()
        } else {
            state.1.get(&current).cloned().unwrap_or(Value::Nil)
        }
    }

    pub fn set(&self, value: Value) {
        let current = thread::current().id();
        let mut state = self.state.lock();
        if current == self.owner {
            state.0 = value;
        } else {
            state.1.insert(current, value);
        }
    }
}

impl Default for ThreadAndFrameLocal {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the last regexp match (`$~`) and the last line read (`$_`).
#[derive(Default)]
pub struct SpecialVariableStorage {
    last_match: ThreadAndFrameLocal,
    last_line: ThreadAndFrameLocal,
}

impl SpecialVariableStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_match(&self) -> Value {
        self.last_match.get()
    }

    pub fn set_last_match(&self, value: Value) {
        self.last_match.set(value);
    }

    pub fn last_line(&self) -> Value {
        self.last_line.get()
    }

    pub fn set_last_line(&self, value: Value) {
        self.last_line.set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(depth: usize) -> (Vec<Arc<FrameLayout>>, Arc<Frame>) {
        let mut layouts = Vec::new();
        let mut frame: Option<Arc<Frame>> = None;
        for level in 0..=depth {
            let layout = FrameLayout::new(&format!("level{level}"));
            layouts.push(layout.clone());
            frame = Some(Frame::new(layout, frame));
        }
        (layouts, frame.unwrap())
    }

    #[test]
    fn slot_registered_at_outermost_frame() {
        let (layouts, leaf) = chain(3);
        assert_eq!(leaf.depth(), 3);
        let storage = get_storage(&leaf);
        assert!(layouts[0].has_special_slot());
        for layout in &layouts[1..] {
            assert!(!layout.has_special_slot());
        }
        let again = get_storage(&leaf);
        assert!(Arc::ptr_eq(&storage, &again));
    }

    #[test]
    fn nearest_declaring_frame_wins() {
        let outer = Frame::new(FrameLayout::new("method"), None);
        let middle = Frame::new(FrameLayout::with_special_variables("block"), Some(outer.clone()));
        let inner = Frame::new(FrameLayout::new("inner block"), Some(middle.clone()));
        let storage = get_storage(&inner);
        assert!(Arc::ptr_eq(&storage, middle.storage_if_present().unwrap()));
        assert!(outer.storage_if_present().is_none());
        assert!(!outer.layout().has_special_slot());
    }

    #[test]
    fn separate_activations_get_separate_storage() {
        let layout = FrameLayout::new("method");
        let a = Frame::new(layout.clone(), None);
        let b = Frame::new(layout, None);
        assert!(!Arc::ptr_eq(&get_storage(&a), &get_storage(&b)));
    }

    #[test]
    fn site_replays_cached_walk() {
        let (_, leaf) = chain(2);
        let site = StorageSite::new(&CacheLimits::default());
        let first = site.get_storage(&leaf);
        assert_eq!(site.cached_depth(), Some(2));
        let second = site.get_storage(&leaf);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!site.is_generic());
    }

    #[test]
    fn layout_change_invalidates_and_repeated_misses_go_generic() {
        let limits = CacheLimits {
            storage_site_failures: 2,
            ..CacheLimits::default()
        };
        let site = StorageSite::new(&limits);
        let (layouts, leaf) = chain(1);
        site.get_storage(&leaf);

        layouts[1].add_slot("x");
        let storage = site.get_storage(&leaf);
        assert!(Arc::ptr_eq(&storage, &get_storage(&leaf)));
        assert!(!site.is_generic());

        let (_, other) = chain(1);
        site.get_storage(&other);
        assert!(site.is_generic());
        assert!(site.cached_depth().is_none());
        let storage = site.get_storage(&leaf);
        assert!(Arc::ptr_eq(&storage, &get_storage(&leaf)));
    }

    #[test]
    fn last_match_is_thread_local() {
        let storage = Arc::new(SpecialVariableStorage::new());
        storage.set_last_match(Value::Fixnum(1));
        let other = storage.clone();
        thread::spawn(move || {
            assert_eq!(other.last_match(), Value::Nil);
            other.set_last_match(Value::Fixnum(2));
            assert_eq!(other.last_match(), Value::Fixnum(2));
        })
        .join()
        .unwrap();
        assert_eq!(storage.last_match(), Value::Fixnum(1));
        assert_eq!(storage.last_line(), Value::Nil);
    }
}
