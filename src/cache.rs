use crate::error::{FvResult, SchemeCategory};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

type CacheKey = (TypeId, SchemeCategory, String);

/// Constructed schemes, shared between calls for the same term.
///
/// Entries are keyed by the scheme trait object type, which encodes the field rank, the
/// category and the term name. Construction happens outside the lock, so a scheme may be
/// constructed twice by racing threads, in which case the first one inserted is kept.
#[derive(Default)]
pub struct SchemeCache {
    entries: Mutex<FxHashMap<CacheKey, Box<dyn Any + Send + Sync>>>,
}

impl SchemeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert<S>(
        &self,
        category: SchemeCategory,
        term: &str,
        construct: impl FnOnce() -> FvResult<Box<S>>,
    ) -> FvResult<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let key = (TypeId::of::<Arc<S>>(), category, term.to_string());
        if let Some(cached) = self
            .entries
            .lock()
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<Arc<S>>())
        {
            return Ok(cached.clone());
        }

        let scheme: Arc<S> = Arc::from(construct()?);
        let mut entries = self.entries.lock();
        let entry = entries.entry(key).or_insert_with(|| Box::new(scheme) as Box<dyn Any + Send + Sync>);
        Ok(entry
            .downcast_ref::<Arc<S>>()
            .expect("Cache entries have the type of their key")
            .clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl std::fmt::Debug for SchemeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeCache").field("len", &self.len()).finish()
    }
}
