use std::sync::Arc;

use dashmap::DashSet;
use smol_str::SmolStr;

/// URIs of entities the viewer should not display.
///
/// Cloning hands out another handle to the same set: the pagination
/// controller clears it on a fresh query and renderers read it while
/// resolving.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    uris: Arc<DashSet<SmolStr>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the URI was not hidden before.
    pub fn insert(&self, uri: impl AsRef<str>) -> bool {
        self.uris.insert(SmolStr::new(uri.as_ref()))
    }

    /// Returns `true` if the URI was hidden.
    pub fn remove(&self, uri: &str) -> bool {
        self.uris.remove(uri).is_some()
    }

    #[inline]
    pub fn contains(&self, uri: &str) -> bool {
        self.uris.contains(uri)
    }

    pub fn clear(&self) {
        self.uris.clear();
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for FilterSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let filter = Self::new();
        for uri in iter {
            filter.insert(uri);
        }
        filter
    }
}
