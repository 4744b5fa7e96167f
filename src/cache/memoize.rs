//! Memoization Module
//!
//! Wraps a function so its results are served from a [`Cache`] keyed by the
//! function name and its arguments.
//!
//! Keys are built from the `Display` form of each argument. That is stable for
//! numbers, strings and other primitive-like values; arguments whose textual
//! form contains the separator (`,`) or is not deterministic can collide or
//! miss, so prefer simple argument types.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use tracing::debug;

use crate::cache::Cache;

// == Key Arguments ==
/// Arguments that can be rendered into a cache key.
pub trait KeyArgs {
    /// Ordered textual parts of the key.
    fn key_parts(&self) -> Vec<String>;
}

impl KeyArgs for () {
    fn key_parts(&self) -> Vec<String> {
        Vec::new()
    }
}

macro_rules! impl_key_args_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Display),+> KeyArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn key_parts(&self) -> Vec<String> {
                let ($($name,)+) = self;
                vec![$($name.to_string()),+]
            }
        }
    };
}

impl_key_args_for_tuple!(A);
impl_key_args_for_tuple!(A, B);
impl_key_args_for_tuple!(A, B, C);
impl_key_args_for_tuple!(A, B, C, D);
impl_key_args_for_tuple!(A, B, C, D, E);
impl_key_args_for_tuple!(A, B, C, D, E, G);

// == Call Arguments ==
/// Positional plus keyword arguments.
///
/// Keyword arguments are kept sorted by name, so the key does not depend on
/// the order in which a call site supplies them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    keyword: BTreeMap<String, String>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Sets a keyword argument, replacing an earlier one with the same name.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.keyword.insert(name.into(), value.to_string());
        self
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn keyword(&self, name: &str) -> Option<&str> {
        self.keyword.get(name).map(String::as_str)
    }
}

impl KeyArgs for CallArgs {
    fn key_parts(&self) -> Vec<String> {
        self.positional
            .iter()
            .cloned()
            .chain(self.keyword.iter().map(|(k, v)| format!("{}={}", k, v)))
            .collect()
    }
}

/// Builds the cache key for a call: `name(part,part,k=v)`.
pub fn derive_key<A: KeyArgs + ?Sized>(name: &str, args: &A) -> String {
    format!("{}({})", name, args.key_parts().join(","))
}

// == Memoized ==
/// A function paired with the cache that holds its results.
///
/// The function body only runs on a miss. Two threads missing on the same key
/// at the same time may both run it; the last result written wins.
#[derive(Debug, Clone)]
pub struct Memoized<F, C> {
    name: String,
    cache: C,
    ttl: Option<Duration>,
    func: F,
}

/// Wraps `func` so results are cached in `cache` under keys derived from
/// `name` and the call arguments.
///
/// `name` identifies the function; two memoized functions sharing a cache
/// must use different names.
///
/// # Example
/// ```ignore
/// let store = Arc::new(CacheStore::<String>::new(Duration::from_secs(3600)));
/// let greet = memoize(store.clone(), "greet", |(name,): (String,)| format!("hi {}", name));
/// assert_eq!(greet.call(("ann".to_string(),)), "hi ann");
/// ```
pub fn memoize<F, C>(cache: C, name: impl Into<String>, func: F) -> Memoized<F, C> {
    Memoized {
        name: name.into(),
        cache,
        ttl: None,
        func,
    }
}

impl<F, C> Memoized<F, C> {
    /// Stores results with `ttl` instead of the cache default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Key under which the result for `args` is cached.
    pub fn key_for<A: KeyArgs>(&self, args: &A) -> String {
        derive_key(&self.name, args)
    }

    // == Call ==
    /// Returns the cached result for `args`, running the function on a miss.
    pub fn call<A, V>(&self, args: A) -> V
    where
        A: KeyArgs,
        F: Fn(A) -> V,
        C: Cache<V>,
        V: Clone,
    {
        let key = self.key_for(&args);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Memo hit for {}", key);
            return hit;
        }

        debug!("Memo miss for {}", key);
        let value = (self.func)(args);
        self.cache.set(&key, value.clone(), self.ttl);
        value
    }

    /// Like [`Memoized::call`] for fallible functions: only `Ok` results are
    /// cached, errors are returned and retried on the next call.
    pub fn try_call<A, V, E>(&self, args: A) -> Result<V, E>
    where
        A: KeyArgs,
        F: Fn(A) -> Result<V, E>,
        C: Cache<V>,
        V: Clone,
    {
        let key = self.key_for(&args);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Memo hit for {}", key);
            return Ok(hit);
        }

        let value = (self.func)(args)?;
        self.cache.set(&key, value.clone(), self.ttl);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread::sleep;

    fn store<V: Clone>() -> Arc<CacheStore<V>> {
        Arc::new(CacheStore::new(Duration::from_secs(300)))
    }

    #[test]
    fn test_body_runs_once_per_distinct_args() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let slow_function = memoize(store(), "slow_function", move |(a, b): (i32, i32)| {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("result_{}_{}", a, b)
        });

        assert_eq!(slow_function.call((1, 2)), "result_1_2");
        assert_eq!(slow_function.call((1, 2)), "result_1_2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(slow_function.call((2, 3)), "result_2_3");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_key_derivation() {
        let f = memoize(store::<i32>(), "sum", |(a, b): (i32, i32)| a + b);

        assert_eq!(f.key_for(&(1, 2)), "sum(1,2)");
        assert_eq!(f.key_for(&()), "sum()");
        assert_ne!(f.key_for(&(1, 2)), f.key_for(&(2, 1)));
    }

    #[test]
    fn test_keyword_order_does_not_change_key() {
        let first = CallArgs::new().arg("Paris").kwarg("units", "metric").kwarg("lang", "fr");
        let second = CallArgs::new().arg("Paris").kwarg("lang", "fr").kwarg("units", "metric");

        assert_eq!(derive_key("weather", &first), derive_key("weather", &second));
        assert_eq!(derive_key("weather", &first), "weather(Paris,lang=fr,units=metric)");
    }

    #[test]
    fn test_call_args_function() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let weather = memoize(store(), "weather", move |args: CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            format!(
                "{} in {}",
                args.positional()[0],
                args.keyword("units").unwrap_or("metric")
            )
        });

        let a = weather.call(CallArgs::new().arg("Oslo").kwarg("units", "si").kwarg("v", 2));
        let b = weather.call(CallArgs::new().arg("Oslo").kwarg("v", 2).kwarg("units", "si"));

        assert_eq!(a, "Oslo in si");
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_functions_sharing_a_cache_do_not_collide() {
        let shared = store::<i64>();
        let add = memoize(shared.clone(), "add", |(a, b): (i64, i64)| a + b);
        let mul = memoize(shared.clone(), "mul", |(a, b): (i64, i64)| a * b);

        assert_eq!(add.call((3, 4)), 7);
        assert_eq!(mul.call((3, 4)), 12);
        assert_eq!(shared.len(), 2);
    }

    #[test]
    fn test_ttl_expiry_reruns_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let f = memoize(store(), "ticking", move |(): ()| counter.fetch_add(1, Ordering::SeqCst))
            .with_ttl(Duration::from_millis(100));

        assert_eq!(f.call(()), 0);
        assert_eq!(f.call(()), 0);

        sleep(Duration::from_millis(200));

        assert_eq!(f.call(()), 1);
    }

    #[test]
    fn test_try_call_caches_only_ok() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let f = memoize(store::<u32>(), "flaky", move |(n,): (u32,)| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err("transient")
            } else {
                Ok(n * 10)
            }
        });

        assert_eq!(f.try_call((4,)), Err("transient"));
        assert_eq!(f.try_call((4,)), Ok(40));
        assert_eq!(f.try_call((4,)), Ok(40));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
