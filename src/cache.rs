//! Memoization of Correios quotes.
//!
//! A quote depends only on the request parameters, so identical requests are
//! answered from the store. Only successful quotes are stored: service-side
//! errors may be transient and are asked again on the next request.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::correios::CorreiosError;
use crate::quote::QuoteResult;

/// Every parameter of one price/delivery-time request.
///
/// Package measurements are the values actually sent: millimeters and grams
/// after applying the carrier's minimum box size.
#[derive(Clone, Debug, PartialEq)]
pub struct QuoteRequest {
    pub destination_postal_code: String,
    pub origin_postal_code: String,
    pub service_code: String,
    pub company_code: Option<String>,
    pub password: Option<String>,
    pub hand_delivery: bool,
    pub declared_value: Decimal,
    pub receipt_notice: bool,
    pub weight: f64,
    pub width: f64,
    pub length: f64,
    pub height: f64,
}

/// Canonical field order for hashing.
#[derive(Serialize)]
struct KeyMaterial<'a> {
    destination_postal_code: &'a str,
    origin_postal_code: &'a str,
    service_code: &'a str,
    company_code: Option<&'a str>,
    password: Option<&'a str>,
    hand_delivery: bool,
    declared_value: String,
    receipt_notice: bool,
    weight: f64,
    width: f64,
    length: f64,
    height: f64,
}

impl QuoteRequest {
    /// Content hash of all parameters.
    ///
    /// Equal parameters always give equal keys; `10` and `10.00` as declared
    /// value are the same amount and hash the same.
    pub fn cache_key(&self) -> CacheKey {
        let material = KeyMaterial {
            destination_postal_code: &self.destination_postal_code,
            origin_postal_code: &self.origin_postal_code,
            service_code: &self.service_code,
            company_code: self.company_code.as_deref(),
            password: self.password.as_deref(),
            hand_delivery: self.hand_delivery,
            declared_value: self.declared_value.normalize().to_string(),
            receipt_notice: self.receipt_notice,
            weight: self.weight,
            width: self.width,
            length: self.length,
            height: self.height,
        };
        // Serializing a struct of strings, bools and finite floats cannot fail;
        // a non-finite float serializes as null.
        let bytes = serde_json::to_vec(&material).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(b"correios-quote:v1:");
        hasher.update(&bytes);
        CacheKey(format!("{:x}", hasher.finalize()))
    }
}

/// Hex encoded SHA-256 cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key-value storage for quotes, shared between concurrent requests.
pub trait QuoteStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<QuoteResult>;
    fn set(&self, key: &CacheKey, result: QuoteResult);
}

impl<T: QuoteStore + ?Sized> QuoteStore for Arc<T> {
    fn get(&self, key: &CacheKey) -> Option<QuoteResult> {
        (**self).get(key)
    }

    fn set(&self, key: &CacheKey, result: QuoteResult) {
        (**self).set(key, result)
    }
}

/// In-process store. The first write for a key wins; later writes of the
/// same key are ignored.
#[derive(Debug, Default)]
pub struct MemoryQuoteStore {
    entries: RwLock<HashMap<CacheKey, QuoteResult>>,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuoteStore for MemoryQuoteStore {
    fn get(&self, key: &CacheKey) -> Option<QuoteResult> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &CacheKey, result: QuoteResult) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key.clone())
            .or_insert(result);
    }
}

/// Cache-or-fetch front for a `QuoteStore`.
#[derive(Debug, Default)]
pub struct QuoteCache<S> {
    store: S,
}

impl<S: QuoteStore> QuoteCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the stored quote for `key` or calls `fetch`.
    ///
    /// Fetched quotes are stored only when their error code is zero.
    /// Transport errors are returned unchanged and never stored.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> Result<QuoteResult, CorreiosError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<QuoteResult, CorreiosError>>,
    {
        if let Some(cached) = self.store.get(key) {
            debug!(key = %key, "using cached Correios quote");
            return Ok(cached);
        }

        let result = fetch().await?;
        if result.is_success() {
            self.store.set(key, result.clone());
        } else {
            debug!(key = %key, error = result.error, "not caching failed Correios quote");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> QuoteRequest {
        QuoteRequest {
            destination_postal_code: "89070210".to_string(),
            origin_postal_code: "89010000".to_string(),
            service_code: "41106".to_string(),
            company_code: None,
            password: None,
            hand_delivery: false,
            declared_value: dec!(0),
            receipt_notice: false,
            weight: 2340.0,
            width: 200.0,
            length: 160.0,
            height: 50.0,
        }
    }

    #[test]
    fn identical_requests_share_a_key() {
        let a = request();
        let b = request();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().as_str().len(), 64);
    }

    #[test]
    fn every_parameter_changes_the_key() {
        let base = request().cache_key();
        let variants: Vec<Box<dyn Fn(&mut QuoteRequest)>> = vec![
            Box::new(|r| r.destination_postal_code = "01310100".into()),
            Box::new(|r| r.origin_postal_code = "01310100".into()),
            Box::new(|r| r.service_code = "40010".into()),
            Box::new(|r| r.company_code = Some("123".into())),
            Box::new(|r| r.password = Some("secret".into())),
            Box::new(|r| r.hand_delivery = true),
            Box::new(|r| r.declared_value = dec!(150.00)),
            Box::new(|r| r.receipt_notice = true),
            Box::new(|r| r.weight = 2341.0),
            Box::new(|r| r.width = 201.0),
            Box::new(|r| r.length = 161.0),
            Box::new(|r| r.height = 51.0),
        ];
        for mutate in variants {
            let mut changed = request();
            mutate(&mut changed);
            assert_ne!(changed.cache_key(), base);
        }
    }

    #[test]
    fn declared_value_scale_does_not_change_key() {
        let mut a = request();
        a.declared_value = dec!(10);
        let mut b = request();
        b.declared_value = dec!(10.00);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn memory_store_first_writer_wins() {
        let store = MemoryQuoteStore::new();
        let key = request().cache_key();
        store.set(&key, QuoteResult::success("41106", dec!(10), 3));
        store.set(&key, QuoteResult::success("41106", dec!(99), 9));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).map(|r| r.price), Some(dec!(10)));
    }

    #[test]
    fn concurrent_writers_keep_a_single_entry() {
        let store = MemoryQuoteStore::new();
        let key = request().cache_key();
        let writers = 8;
        let barrier = std::sync::Barrier::new(writers);

        let seen: Vec<Decimal> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..writers)
                .map(|n| {
                    let (store, key, barrier) = (&store, &key, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        store.set(key, QuoteResult::success("41106", Decimal::from(n), 3));
                        store.get(key).map(|r| r.price).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(store.len(), 1);
        let stored = store.get(&key).unwrap().price;
        assert!(seen.iter().all(|price| *price == stored));
    }

    #[tokio::test]
    async fn second_lookup_hits_the_cache() {
        let cache = QuoteCache::new(MemoryQuoteStore::new());
        let calls = AtomicUsize::new(0);
        let key = request().cache_key();

        for _ in 0..2 {
            let result = cache
                .get_or_fetch(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(QuoteResult::success("41106", dec!(21.40), 6))
                })
                .await
                .unwrap();
            assert_eq!(result.price, dec!(21.40));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_quotes_are_not_cached() {
        let cache = QuoteCache::new(MemoryQuoteStore::new());
        let calls = AtomicUsize::new(0);
        let key = request().cache_key();

        for _ in 0..2 {
            let result = cache
                .get_or_fetch(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(QuoteResult::failure("41106", 7, "Sistema temporariamente fora do ar"))
                })
                .await
                .unwrap();
            assert!(!result.is_success());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let cache = QuoteCache::new(MemoryQuoteStore::new());
        let key = request().cache_key();
        let result = cache
            .get_or_fetch(&key, || async { Err(CorreiosError::Timeout) })
            .await;
        assert!(matches!(result, Err(CorreiosError::Timeout)));
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn shared_store_through_arc() {
        let store = Arc::new(MemoryQuoteStore::new());
        let cache = QuoteCache::new(Arc::clone(&store));
        let key = request().cache_key();
        cache
            .get_or_fetch(&key, || async { Ok(QuoteResult::success("41106", dec!(5), 1)) })
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }
}
