//! Code resolution
//!
//! Maps caller-supplied references (canonical ids, ISO codes, numeric codes,
//! names, `country/division` pairs) to canonical region ids.
//!
//! # Resolution order
//!
//! 1. canonical id grammar, looked up case-insensitively
//! 2. two letters: country short code
//! 3. three letters: country long code
//! 4. digits: country numeric code
//! 5. no `/`: country name, exact then substring
//! 6. `country/division` or `country-division`: the country part goes
//!    through steps 1-5, the division is searched within that country by
//!    numeric code, short/long code, exact name and substring name
//! 7. several division matches are ranked by [`TypePriority`]
//!
//! Results are memoised per input string in an LRU cache that lives as long
//! as the store snapshot the resolver was built for.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mundi::region::RegionStoreBuilder;
//! use mundi::resolver::CodeResolver;
//! use mundi::types::Region;
//!
//! let store = RegionStoreBuilder::new()
//!     .region(Region::new("XX", "World", "world"))
//!     .region(
//!         Region::new("BR", "Brazil", "country")
//!             .with_codes(Some("BR"), Some("BRA"), Some("076"))
//!             .with_parent("XX", 1),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let resolver = CodeResolver::new(Arc::new(store));
//! assert_eq!(resolver.resolve("bra").unwrap(), "BR");
//! assert_eq!(resolver.resolve("076").unwrap(), "BR");
//! ```

mod priority;

pub use priority::TypePriority;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::region::RegionStore;
use crate::types::{Region, RegionId};

lazy_static! {
    /// ASCII prefix plus optional `-suffix` / `:suffix`
    static ref MUNDI_CODE: Regex = Regex::new(r"^[A-Za-z]+(?:[-:][A-Za-z0-9_.:\-]+)?$").unwrap();
}

/// Outcome of one resolution step
#[derive(Debug)]
enum Lookup {
    Found(RegionId),
    /// Exact matches that cannot be ranked
    Ambiguous(Vec<RegionId>),
    /// Several substring matches; the step fails without guessing
    Inconclusive(Vec<RegionId>),
    Missing,
}

/// Resolver statistics
#[derive(Debug, Default)]
pub struct ResolverStats {
    /// Total resolution requests
    pub queries: AtomicU64,
    /// Requests answered from the cache
    pub cache_hits: AtomicU64,
    /// Requests that missed the cache
    pub cache_misses: AtomicU64,
    /// Requests that ended in NotFound
    pub not_found: AtomicU64,
    /// Requests that ended in AmbiguousReference
    pub ambiguous: AtomicU64,
}

impl ResolverStats {
    /// Get a snapshot of current stats
    pub fn snapshot(&self) -> ResolverStatsSnapshot {
        ResolverStatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            ambiguous: self.ambiguous.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of resolver statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolverStatsSnapshot {
    /// Total resolution requests
    pub queries: u64,
    /// Cache hits
    pub cache_hits: u64,
    /// Cache misses
    pub cache_misses: u64,
    /// NotFound outcomes
    pub not_found: u64,
    /// AmbiguousReference outcomes
    pub ambiguous: u64,
}

impl ResolverStatsSnapshot {
    /// Fraction of requests served from the cache
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

type Outcome = std::result::Result<RegionId, ResolveError>;

/// Resolves references against one store snapshot
pub struct CodeResolver {
    store: Arc<RegionStore>,
    priority: TypePriority,
    cache: Option<Mutex<LruCache<String, Outcome>>>,
    stats: ResolverStats,
}

impl std::fmt::Debug for CodeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeResolver")
            .field("regions", &self.store.len())
            .field("priority", &self.priority)
            .field("cached", &self.cache.as_ref().map(|c| c.lock().len()))
            .finish()
    }
}

impl CodeResolver {
    /// Create a resolver with the default configuration
    pub fn new(store: Arc<RegionStore>) -> Self {
        Self::with_config(store, &ResolverConfig::default())
    }

    /// Create a resolver with an explicit configuration
    pub fn with_config(store: Arc<RegionStore>, config: &ResolverConfig) -> Self {
        Self {
            store,
            priority: TypePriority::new(config.type_priority.iter().cloned()),
            cache: NonZeroUsize::new(config.cache_capacity).map(|n| Mutex::new(LruCache::new(n))),
            stats: ResolverStats::default(),
        }
    }

    /// Store snapshot this resolver answers for
    pub fn store(&self) -> &Arc<RegionStore> {
        &self.store
    }

    /// Tie-break policy
    pub fn priority(&self) -> &TypePriority {
        &self.priority
    }

    /// Resolve a reference to a canonical region id
    pub fn resolve(&self, reference: &str) -> Result<RegionId> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(reference).cloned() {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return hit.map_err(Into::into);
            }
            self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let outcome = self.resolve_uncached(reference);
        self.record_outcome(reference, &outcome);

        if let Some(cache) = &self.cache {
            cache.lock().put(reference.to_string(), outcome.clone());
        }
        outcome.map_err(Into::into)
    }

    /// Resolve a reference and return the region
    pub fn region(&self, reference: &str) -> Result<&Region> {
        let id = self.resolve(reference)?;
        self.store.get(&id)
    }

    /// Resolve a reference that must denote a country
    pub fn country_code(&self, reference: &str) -> Result<RegionId> {
        let outcome = match self.country_lookup(reference.trim()) {
            Lookup::Found(id) => Ok(id),
            Lookup::Ambiguous(candidates) | Lookup::Inconclusive(candidates) => {
                Err(ResolveError::Ambiguous {
                    reference: reference.to_string(),
                    candidates,
                })
            },
            Lookup::Missing => Err(not_found(reference)),
        };
        self.record_outcome(reference, &outcome);
        outcome.map_err(Into::into)
    }

    /// Resolve a division within an already known country
    pub fn resolve_in(&self, country: &str, division: &str) -> Result<RegionId> {
        let country_id = self.country_code(country)?;
        let reference = format!("{}/{}", country, division);
        let outcome = match self.division_lookup(&country_id, division) {
            Lookup::Found(id) => Ok(id),
            Lookup::Ambiguous(candidates) | Lookup::Inconclusive(candidates) => {
                Err(ResolveError::Ambiguous {
                    reference,
                    candidates,
                })
            },
            Lookup::Missing => Err(not_found(&reference)),
        };
        self.record_outcome(division, &outcome);
        outcome.map_err(Into::into)
    }

    /// Current statistics
    pub fn stats(&self) -> ResolverStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of memoised references
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.lock().len())
    }

    /// Drop every memoised result
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    fn record_outcome(&self, reference: &str, outcome: &Outcome) {
        match outcome {
            Ok(id) => debug!(reference, id = %id, "Resolved reference"),
            Err(ResolveError::NotFound { .. }) => {
                self.stats.not_found.fetch_add(1, Ordering::Relaxed);
                debug!(reference, "Reference not found");
            },
            Err(ResolveError::Ambiguous { candidates, .. }) => {
                self.stats.ambiguous.fetch_add(1, Ordering::Relaxed);
                debug!(reference, candidates = ?candidates, "Ambiguous reference");
            },
        }
    }

    fn resolve_uncached(&self, reference: &str) -> Outcome {
        let text = reference.trim();
        if text.is_empty() {
            return Err(not_found(reference));
        }

        if MUNDI_CODE.is_match(text) {
            if let Some(id) = self.store.canonical_id(text) {
                return Ok(id.clone());
            }
        }

        let mut inconclusive = None;
        match self.country_lookup(text) {
            Lookup::Found(id) => return Ok(id),
            Lookup::Ambiguous(candidates) => {
                return Err(ResolveError::Ambiguous {
                    reference: reference.to_string(),
                    candidates,
                })
            },
            Lookup::Inconclusive(candidates) => inconclusive = Some(candidates),
            Lookup::Missing => {},
        }

        if let Some((country, division)) = split_reference(text) {
            let country_id = match self.country_lookup(country) {
                Lookup::Found(id) => id,
                Lookup::Ambiguous(candidates) => {
                    return Err(ResolveError::Ambiguous {
                        reference: reference.to_string(),
                        candidates,
                    })
                },
                Lookup::Inconclusive(_) | Lookup::Missing => return Err(not_found(reference)),
            };
            match self.division_lookup(&country_id, division) {
                Lookup::Found(id) => return Ok(id),
                Lookup::Ambiguous(candidates) | Lookup::Inconclusive(candidates) => {
                    return Err(ResolveError::Ambiguous {
                        reference: reference.to_string(),
                        candidates,
                    })
                },
                Lookup::Missing => {},
            }
        }

        match inconclusive {
            Some(candidates) => Err(ResolveError::Ambiguous {
                reference: reference.to_string(),
                candidates,
            }),
            None => Err(not_found(reference)),
        }
    }

    /// Steps 1-5, restricted to countries
    fn country_lookup(&self, text: &str) -> Lookup {
        if let Ok(region) = self.store.get(text) {
            if region.is_country() {
                return Lookup::Found(region.id.clone());
            }
        }

        let upper = text.to_uppercase();
        if is_alpha_code(text, 2) {
            exact(countries(self.store.by_short_code(&upper, None)))
        } else if is_alpha_code(text, 3) {
            exact(countries(self.store.by_long_code(&upper, None)))
        } else if is_digits(text) {
            exact(countries(self.store.by_numeric_code(text, None)))
        } else if !text.contains('/') {
            match exact(countries(self.store.by_name(text, None))) {
                Lookup::Missing => {
                    let fuzzy = countries(self.store.search_name(text, None));
                    match fuzzy.as_slice() {
                        [] => Lookup::Missing,
                        [one] => Lookup::Found(one.id.clone()),
                        many => Lookup::Inconclusive(many.iter().map(|r| r.id.clone()).collect()),
                    }
                },
                other => other,
            }
        } else {
            Lookup::Missing
        }
    }

    /// Step 6 division search within a country, ranked per step 7
    fn division_lookup(&self, country_id: &str, division: &str) -> Lookup {
        let division = division.trim();
        if division.is_empty() {
            return Lookup::Missing;
        }
        let country = Some(country_id);

        if is_digits(division) {
            let found = self.ranked(self.store.by_numeric_code(division, country));
            if !matches!(found, Lookup::Missing) {
                return found;
            }
        }

        let upper = division.to_uppercase();
        let mut spellings = vec![division];
        if upper != division {
            spellings.push(upper.as_str());
        }
        for code in spellings {
            for found in [
                self.ranked(self.store.by_short_code(code, country)),
                self.ranked(self.store.by_long_code(code, country)),
            ] {
                if !matches!(found, Lookup::Missing) {
                    return found;
                }
            }
        }
        if let Some(id) = self.store.canonical_id(&format!("{}-{}", country_id, division)) {
            return Lookup::Found(id.clone());
        }

        match self.ranked(self.store.by_name(division, country)) {
            Lookup::Missing => self.ranked(self.store.search_name(division, country)),
            found => found,
        }
    }

    fn ranked(&self, candidates: Vec<&Region>) -> Lookup {
        match candidates.as_slice() {
            [] => Lookup::Missing,
            many => match self.priority.pick(many) {
                Ok(region) => Lookup::Found(region.id.clone()),
                Err(tied) => Lookup::Ambiguous(tied),
            },
        }
    }
}

fn countries(regions: Vec<&Region>) -> Vec<&Region> {
    regions.into_iter().filter(|r| r.is_country()).collect()
}

fn exact(candidates: Vec<&Region>) -> Lookup {
    match candidates.as_slice() {
        [] => Lookup::Missing,
        [one] => Lookup::Found(one.id.clone()),
        many => Lookup::Ambiguous(many.iter().map(|r| r.id.clone()).collect()),
    }
}

fn not_found(reference: &str) -> ResolveError {
    ResolveError::NotFound {
        reference: reference.to_string(),
    }
}

fn is_alpha_code(text: &str, len: usize) -> bool {
    text.len() == len && text.bytes().all(|b| b.is_ascii_alphabetic())
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// Split `country/division` (preferred) or `country-division`
fn split_reference(text: &str) -> Option<(&str, &str)> {
    text.split_once('/')
        .or_else(|| text.split_once('-'))
        .filter(|(country, division)| !country.trim().is_empty() && !division.trim().is_empty())
        .map(|(country, division)| (country.trim(), division.trim()))
}
