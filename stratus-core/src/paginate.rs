//! Pagination over token-based list APIs

use std::collections::HashSet;
use std::future::Future;

use crate::provider::{ProviderError, ProviderResult};

/// One page of a list call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    /// A final page
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

/// Visit every page until the API stops returning a token or `visit` returns
/// `false`. A token seen twice is an error rather than an endless loop.
pub async fn for_each_page<T, F, Fut, V>(mut fetch: F, mut visit: V) -> ProviderResult<()>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = ProviderResult<Page<T>>>,
    V: FnMut(Vec<T>) -> bool,
{
    let mut seen = HashSet::new();
    let mut token: Option<String> = None;
    loop {
        let page = fetch(token.clone()).await?;
        if !visit(page.items) {
            return Ok(());
        }
        match page.next_token {
            Some(next) if !next.is_empty() => {
                if !seen.insert(next.clone()) {
                    return Err(ProviderError::new(format!(
                        "pagination token '{}' repeated",
                        next
                    )));
                }
                token = Some(next);
            }
            _ => return Ok(()),
        }
    }
}

/// Collect the items of every page
pub async fn collect_pages<T, F, Fut>(fetch: F) -> ProviderResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = ProviderResult<Page<T>>>,
{
    let mut all = Vec::new();
    for_each_page(fetch, |items| {
        all.extend(items);
        true
    })
    .await?;
    Ok(all)
}
