// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Coordinate reference system resolution
//!
//! Structures only need to know that an SRID resolves; the resolver hands back
//! a shared [`CoordinateReferenceSystem`] that geometry structures keep next
//! to the SRID string.

use crate::error::{RegistryError, Result};
use log::{debug, warn};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Axis order of a reference system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisOrder {
    /// Longitude/easting first
    EastNorth,
    /// Latitude/northing first
    NorthEast,
}

/// Resolved coordinate reference system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinateReferenceSystem {
    /// Normalized code, e.g. `EPSG:4326`
    pub code: String,
    /// Human-readable name
    pub name: String,
    /// Axis order
    pub axis_order: AxisOrder,
}

impl CoordinateReferenceSystem {
    /// Create a reference system
    pub fn new(code: impl Into<String>, name: impl Into<String>, axis_order: AxisOrder) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            axis_order,
        }
    }
}

/// Decodes SRID strings into reference systems
pub trait CrsResolver: Send + Sync + Debug {
    /// Resolve a code
    fn decode(&self, code: &str) -> Result<Arc<CoordinateReferenceSystem>>;
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Resolver backed by a fixed table of well-known codes
#[derive(Debug)]
pub struct StaticCrsResolver {
    known: RwLock<FxHashMap<String, Arc<CoordinateReferenceSystem>>>,
}

impl StaticCrsResolver {
    /// Create a resolver that knows the common geographic and projected codes
    pub fn new() -> Self {
        let resolver = Self {
            known: RwLock::new(FxHashMap::default()),
        };
        resolver.register(CoordinateReferenceSystem::new(
            "EPSG:4326",
            "WGS 84",
            AxisOrder::NorthEast,
        ));
        resolver.register(CoordinateReferenceSystem::new(
            "EPSG:3857",
            "WGS 84 / Pseudo-Mercator",
            AxisOrder::EastNorth,
        ));
        resolver.register(CoordinateReferenceSystem::new(
            "EPSG:25832",
            "ETRS89 / UTM zone 32N",
            AxisOrder::EastNorth,
        ));
        resolver.register(CoordinateReferenceSystem::new(
            "EPSG:25833",
            "ETRS89 / UTM zone 33N",
            AxisOrder::EastNorth,
        ));
        resolver.register(CoordinateReferenceSystem::new(
            "CRS:84",
            "WGS 84 (CRS84)",
            AxisOrder::EastNorth,
        ));
        resolver
    }

    /// Register an additional reference system under its code
    pub fn register(&self, crs: CoordinateReferenceSystem) {
        let code = normalize(&crs.code);
        let crs = CoordinateReferenceSystem { code: code.clone(), ..crs };
        self.known.write().insert(code, Arc::new(crs));
    }
}

impl Default for StaticCrsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CrsResolver for StaticCrsResolver {
    fn decode(&self, code: &str) -> Result<Arc<CoordinateReferenceSystem>> {
        let normalized = normalize(code);
        if normalized.is_empty() {
            return Err(RegistryError::crs_factory(code, "empty code"));
        }
        if !normalized.contains(':') {
            return Err(RegistryError::crs_factory(
                code,
                "expected AUTHORITY:CODE",
            ));
        }
        self.known
            .read()
            .get(&normalized)
            .cloned()
            .ok_or_else(|| RegistryError::crs_not_found(code))
    }
}

/// Hit/miss counters of a [`CachedCrsResolver`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrsCacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups delegated to the inner resolver
    pub misses: u64,
}

/// LRU cache in front of another resolver. Only successful resolutions are
/// cached.
pub struct CachedCrsResolver {
    inner: Arc<dyn CrsResolver>,
    cache: Mutex<LruCache<String, Arc<CoordinateReferenceSystem>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Debug for CachedCrsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCrsResolver")
            .field("inner", &self.inner)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CachedCrsResolver {
    /// Wrap a resolver; a zero capacity is raised to one
    pub fn new(inner: Arc<dyn CrsResolver>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached resolver over [`StaticCrsResolver`]
    pub fn with_static(capacity: usize) -> Self {
        Self::new(Arc::new(StaticCrsResolver::new()), capacity)
    }

    /// Current counters
    pub fn stats(&self) -> CrsCacheStats {
        CrsCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl CrsResolver for CachedCrsResolver {
    fn decode(&self, code: &str) -> Result<Arc<CoordinateReferenceSystem>> {
        let key = normalize(code);
        if let Some(crs) = self.cache.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(crs);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Resolve outside the lock
        match self.inner.decode(code) {
            Ok(crs) => {
                debug!("resolved CRS {key}");
                self.cache.lock().put(key, crs.clone());
                Ok(crs)
            }
            Err(err) => {
                warn!("CRS resolution failed for '{code}': {err}");
                Err(err)
            }
        }
    }
}
