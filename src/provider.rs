// Copyright 2025 Cowboy AI, LLC.

//! Lazy, composable queries
//!
//! A [`Provider`] is a deferred computation yielding `DomainResult<T>`.
//! Nothing runs until it is awaited, so the same query can be reused for
//! "one", "many" and "decorated" reads by stacking combinators.
//!
//! ```rust
//! use realm_substrate::provider::Provider;
//!
//! # tokio_test::block_on(async {
//! let evens = Provider::fixed(vec![1, 2, 3, 4])
//!     .filter(|n| n % 2 == 0)
//!     .slice_map(|n| Ok(n * 10));
//! assert_eq!(evens.await.unwrap(), vec![20, 40]);
//! # });
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::future::{Future, IntoFuture};

use crate::errors::{DomainError, DomainResult};

/// Deferred computation of a `T`
pub struct Provider<'a, T> {
    inner: BoxFuture<'a, DomainResult<T>>,
}

/// Provider of a list
pub type SliceProvider<'a, T> = Provider<'a, Vec<T>>;

impl<'a, T: Send + 'a> Provider<'a, T> {
    /// Wrap a future
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = DomainResult<T>> + Send + 'a,
    {
        Self {
            inner: future.boxed(),
        }
    }

    /// Provider that yields `value`
    pub fn fixed(value: T) -> Self {
        Self::new(async move { Ok(value) })
    }

    /// Provider that fails with `err`
    pub fn error(err: DomainError) -> Self {
        Self::new(async move { Err(err) })
    }

    /// Transform the value
    pub fn map<U, F>(self, f: F) -> Provider<'a, U>
    where
        U: Send + 'a,
        F: FnOnce(T) -> U + Send + 'a,
    {
        Provider::new(async move { self.inner.await.map(f) })
    }

    /// Transform the value with a fallible function
    pub fn and_then<U, F>(self, f: F) -> Provider<'a, U>
    where
        U: Send + 'a,
        F: FnOnce(T) -> DomainResult<U> + Send + 'a,
    {
        Provider::new(async move { self.inner.await.and_then(f) })
    }

    /// Run the computation
    pub async fn get(self) -> DomainResult<T> {
        self.inner.await
    }
}

impl<'a, T: Send + 'a> Provider<'a, Vec<T>> {
    /// Transform every element, stopping at the first failure
    pub fn slice_map<U, F>(self, f: F) -> Provider<'a, Vec<U>>
    where
        U: Send + 'a,
        F: Fn(T) -> DomainResult<U> + Send + 'a,
    {
        self.and_then(move |items| items.into_iter().map(f).collect())
    }

    /// Keep elements matching `predicate`
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + 'a,
    {
        self.map(move |items| items.into_iter().filter(|t| predicate(t)).collect())
    }

    /// The first element; an empty list is "not found" for `entity`
    pub fn first(self, entity: &'static str) -> Provider<'a, T> {
        self.and_then(move |items| {
            items
                .into_iter()
                .next()
                .ok_or_else(|| DomainError::not_found(entity, "first"))
        })
    }
}

impl<'a, T: Send + 'a> IntoFuture for Provider<'a, T> {
    type Output = DomainResult<T>;
    type IntoFuture = BoxFuture<'a, DomainResult<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.inner
    }
}
