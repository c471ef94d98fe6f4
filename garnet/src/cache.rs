use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Install {
    Added,
    Present,
    Megamorphic,
}

/// A bounded, ordered list of guarded entries owned by one call site.
///
/// Entries are probed in installation order and the first whose guard
/// passes wins. Installing past the limit drops every entry and flips the
/// site to megamorphic for good; callers then take their generic path.
pub struct GuardChain<E> {
    label: &'static str,
    limit: usize,
    entries: RwLock<Vec<E>>,
    megamorphic: AtomicBool,
}

impl<E> GuardChain<E> {
    pub fn new(label: &'static str, limit: usize) -> Self {
        Self {
            label,
            limit,
            entries: RwLock::new(Vec::new()),
            megamorphic: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn find_map<R>(&self, probe: impl FnMut(&E) -> Option<R>) -> Option<R> {
        if self.is_megamorphic() {
            return None;
        }
        self.entries.read().iter().find_map(probe)
    }

    /// Adds `entry` unless an entry that is `same` is already present.
    pub fn install(&self, entry: E, same: impl Fn(&E, &E) -> bool) -> Install {
        if self.is_megamorphic() {
            return Install::Megamorphic;
        }
        let mut entries = self.entries.write();
        if self.is_megamorphic() {
            return Install::Megamorphic;
        }
        if entries.iter().any(|existing| same(existing, &entry)) {
            return Install::Present;
        }
        if entries.len() >= self.limit {
            self.megamorphic.store(true, Ordering::Release);
            entries.clear();
            log::debug!(
                "{} site went megamorphic after {} entries",
                self.label,
                self.limit
            );
            return Install::Megamorphic;
        }
        entries.push(entry);
        Install::Added
    }

    /// Drops entries that fail `keep`. Has no effect on a megamorphic site.
    pub fn retain(&self, keep: impl FnMut(&E) -> bool) {
        self.entries.write().retain(keep);
    }

    pub fn for_each(&self, visit: impl FnMut(&E)) {
        self.entries.read().iter().for_each(visit);
    }

    #[inline]
    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
