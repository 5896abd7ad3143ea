//! Lazily hydrated result sets.

use super::connection::RowIter;
use super::error::{QueryError, QueryResult};
use super::hydrator::Hydrator;
use super::instance::Instance;

/// Instances of an executed query, hydrated as they are consumed.
///
/// A cached result set keeps every instance it produced and can be rewound.
/// An uncached one is single pass: once exhausted it stays empty.
pub struct ResultSet<'c> {
    rows: Option<RowIter<'c>>,
    hydrator: Hydrator,
    cache: Option<Vec<Instance>>,
    position: usize,
    peek_limit: Option<u64>,
    fetched: u64,
    has_more: bool,
}

impl<'c> ResultSet<'c> {
    pub fn new(
        rows: RowIter<'c>,
        hydrator: Hydrator,
        cached: bool,
        peek_limit: Option<u64>,
    ) -> Self {
        Self {
            rows: Some(rows),
            hydrator,
            cache: cached.then(Vec::new),
            position: 0,
            peek_limit,
            fetched: 0,
            has_more: false,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Start over from the first instance.
    pub fn rewind(&mut self) -> QueryResult<()> {
        if self.cache.is_none() {
            return Err(QueryError::NotRewindable);
        }
        self.position = 0;
        Ok(())
    }

    /// True if the peek-ahead row showed that more rows exist beyond the limit.
    ///
    /// Only known once the result set was consumed up to the limit.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    fn fetch(&mut self) -> Option<QueryResult<Instance>> {
        let rows = self.rows.as_mut()?;
        if self.peek_limit == Some(self.fetched) {
            let probe = rows.next();
            self.rows = None;
            return match probe {
                Some(Ok(_)) => {
                    self.has_more = true;
                    None
                }
                Some(Err(err)) => Some(Err(err.into())),
                None => None,
            };
        }

        match rows.next() {
            None => {
                self.rows = None;
                None
            }
            Some(Err(err)) => Some(Err(err.into())),
            Some(Ok(row)) => {
                self.fetched += 1;
                Some(Ok(self.hydrator.hydrate(row)))
            }
        }
    }
}

impl Iterator for ResultSet<'_> {
    type Item = QueryResult<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(cache) = &self.cache {
            if let Some(instance) = cache.get(self.position) {
                self.position += 1;
                return Some(Ok(instance.clone()));
            }
        }

        let item = self.fetch()?;
        if let (Ok(instance), Some(cache)) = (&item, self.cache.as_mut()) {
            cache.push(instance.clone());
            self.position += 1;
        }
        Some(item)
    }
}
