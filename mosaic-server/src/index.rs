//! Color -> image working set and nearest-color lookup with memoization.

use crate::color::{ImageHandle, PixelColor};
use crate::distance::{DistanceModel, to_perceptual};
use crate::error::{MosaicError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// One canonical image per representative color.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    entries: HashMap<PixelColor, ImageHandle>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless `color` is already present (first writer wins). Returns whether the pair was
    /// stored.
    pub fn insert_if_absent(&mut self, color: PixelColor, image: ImageHandle) -> bool {
        match self.entries.entry(color) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(image);
                true
            }
        }
    }

    pub fn get(&self, color: &PixelColor) -> Option<&ImageHandle> {
        self.entries.get(color)
    }

    pub fn contains(&self, color: &PixelColor) -> bool {
        self.entries.contains_key(color)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn colors(&self) -> impl Iterator<Item = &PixelColor> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PixelColor, &ImageHandle)> {
        self.entries.iter()
    }
}

impl FromIterator<(PixelColor, ImageHandle)> for WorkingSet {
    fn from_iter<T: IntoIterator<Item = (PixelColor, ImageHandle)>>(iter: T) -> Self {
        let mut set = WorkingSet::new();
        for (c, img) in iter {
            set.insert_if_absent(c, img);
        }
        set
    }
}

/// Query color -> previously resolved nearest working-set key. Grows only.
#[derive(Debug, Default)]
pub struct DistanceCache {
    inner: RwLock<HashMap<PixelColor, PixelColor>>,
}

impl DistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, query: &PixelColor) -> Option<PixelColor> {
        self.inner.read().get(query).copied()
    }

    fn insert(&self, query: PixelColor, nearest: PixelColor) {
        self.inner.write().entry(query).or_insert(nearest);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// How a [`resolve`] call found its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    Cached,
    Scanned,
}

/// Working-set key with the smallest distance to `query`.
///
/// Ties keep the first minimum met while iterating the set, whose order is unspecified.
pub fn find_closest(
    query: PixelColor,
    set: &WorkingSet,
    model: &DistanceModel,
) -> Result<PixelColor> {
    let q = to_perceptual(query);
    let mut best: Option<(PixelColor, f64)> = None;
    for &candidate in set.colors() {
        let d = model.distance_from(&q, candidate);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((candidate, d)),
        }
    }
    best.map(|(c, _)| c).ok_or(MosaicError::NotFound)
}

/// Exact match, then cache, then a full scan whose answer is memoized.
pub fn resolve(
    query: PixelColor,
    set: &WorkingSet,
    cache: &DistanceCache,
    model: &DistanceModel,
) -> Result<(ImageHandle, Lookup)> {
    if let Some(img) = set.get(&query) {
        return Ok((img.clone(), Lookup::Exact));
    }
    if let Some(img) = cache.get(&query).and_then(|key| set.get(&key)) {
        return Ok((img.clone(), Lookup::Cached));
    }
    let nearest = find_closest(query, set, model)?;
    cache.insert(query, nearest);
    let img = set.get(&nearest).ok_or(MosaicError::NotFound)?;
    Ok((img.clone(), Lookup::Scanned))
}

/// Image whose representative color best matches `query`.
pub fn best_image(
    query: PixelColor,
    set: &WorkingSet,
    cache: &DistanceCache,
    model: &DistanceModel,
) -> Result<ImageHandle> {
    resolve(query, set, cache, model).map(|(img, _)| img)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub colors: usize,
    pub cached: usize,
    pub exact_hits: u64,
    pub cache_hits: u64,
    pub scans: u64,
    pub distance_evaluations: u64,
}

/// A finalized working set bundled with its cache and distance model.
///
/// Safe to query from several threads; only the cache is mutated.
#[derive(Debug)]
pub struct NearestColorIndex {
    set: WorkingSet,
    cache: DistanceCache,
    model: DistanceModel,
    exact_hits: AtomicU64,
    cache_hits: AtomicU64,
    scans: AtomicU64,
}

impl NearestColorIndex {
    pub fn new(set: WorkingSet, model: DistanceModel) -> Self {
        Self {
            set,
            cache: DistanceCache::new(),
            model,
            exact_hits: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            scans: AtomicU64::new(0),
        }
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.set
    }

    pub fn model(&self) -> &DistanceModel {
        &self.model
    }

    pub fn find_closest(&self, query: PixelColor) -> Result<PixelColor> {
        find_closest(query, &self.set, &self.model)
    }

    pub fn best_image(&self, query: PixelColor) -> Result<ImageHandle> {
        let (img, how) = resolve(query, &self.set, &self.cache, &self.model)?;
        let counter = match how {
            Lookup::Exact => &self.exact_hits,
            Lookup::Cached => &self.cache_hits,
            Lookup::Scanned => &self.scans,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(img)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            colors: self.set.len(),
            cached: self.cache.len(),
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            distance_evaluations: self.model.evaluations(),
        }
    }
}
