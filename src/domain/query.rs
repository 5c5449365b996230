//! Predicate/sort/page query engine.
//!
//! A [`Query`] describes one list request: an optional filter, relations to
//! eager-load, a sort field named at runtime, and a `skip`/`take` window. The
//! sort field is looked up in the entity's whitelist ([`Entity::comparator`]);
//! unknown names are rejected instead of falling back to some default. Rows
//! are always tie-broken by id, so paging through a result set is
//! reproducible.

use super::entity::{Comparator, Entity, Loaded};
use super::ports::{Source, SourceExt};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(CoreError::validation(format!(
                "unknown sort direction '{other}'"
            ))),
        }
    }
}

/// Boolean predicate over an entity. An empty filter matches everything.
pub struct Filter<T> {
    predicate: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
}

impl<T> Filter<T> {
    pub fn all() -> Self {
        Self { predicate: None }
    }

    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    pub fn matches(&self, entity: &T) -> bool {
        self.predicate.as_ref().is_none_or(|p| p(entity))
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
        }
    }
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Page {
    pub fn new(number: usize, size: usize) -> Result<Self> {
        if number == 0 || size == 0 {
            return Err(CoreError::validation(format!(
                "page number and size must be positive, got page {number} of size {size}"
            )));
        }
        Ok(Self { number, size })
    }

    /// Rows before this page. Saturates, so a page past the end is empty.
    pub fn skip(&self) -> usize {
        self.number.saturating_sub(1).saturating_mul(self.size)
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.size)
    }
}

/// One page of results plus the numbers a list endpoint reports.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone)]
pub struct Query<T> {
    filter: Filter<T>,
    includes: Vec<String>,
    order: Option<(String, SortDirection)>,
    skip: usize,
    take: Option<usize>,
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self {
            filter: Filter::all(),
            includes: Vec::new(),
            order: None,
            skip: 0,
            take: None,
        }
    }
}

impl<T: Entity> Query<T> {
    /// Matches every row, in id order, unpaginated.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Filter::new(predicate);
        self
    }

    pub fn with_filter(mut self, filter: Filter<T>) -> Self {
        self.filter = filter;
        self
    }

    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.includes.push(relation.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order = Some((field.into(), direction));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn page(self, page: Page) -> Self {
        self.skip(page.skip()).take(page.size)
    }

    pub fn filter_ref(&self) -> &Filter<T> {
        &self.filter
    }

    /// Resolves the sort field and relation names against the entity's
    /// whitelists.
    fn plan(&self) -> Result<Plan<T>> {
        let comparator = match &self.order {
            Some((field, _)) => Some(T::comparator(field).ok_or_else(|| {
                CoreError::validation(format!("unknown sort field '{field}' for {}", T::KIND))
            })?),
            None => None,
        };
        let direction = self.order.as_ref().map(|(_, d)| *d).unwrap_or_default();
        let mut relations = Vec::with_capacity(self.includes.len());
        for name in &self.includes {
            let relation = T::RELATIONS
                .iter()
                .copied()
                .find(|r| *r == name.as_str())
                .ok_or_else(|| {
                    CoreError::validation(format!("unknown relation '{name}' for {}", T::KIND))
                })?;
            if !relations.contains(&relation) {
                relations.push(relation);
            }
        }
        Ok(Plan {
            comparator,
            direction,
            relations,
        })
    }

    /// Filters, orders and windows `rows`, without loading relations.
    pub fn select(&self, rows: Vec<T>) -> Result<Vec<T>> {
        let plan = self.plan()?;
        Ok(self.window(plan.order(self.matching(rows))))
    }

    fn matching(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter().filter(|r| self.filter.matches(r)).collect()
    }

    fn window(&self, rows: Vec<T>) -> Vec<T> {
        let rows = rows.into_iter().skip(self.skip);
        match self.take {
            Some(take) => rows.take(take).collect(),
            None => rows.collect(),
        }
    }
}

struct Plan<T> {
    comparator: Option<Comparator<T>>,
    direction: SortDirection,
    relations: Vec<&'static str>,
}

impl<T: Entity> Plan<T> {
    fn order(&self, mut rows: Vec<T>) -> Vec<T> {
        rows.sort_by(|a, b| {
            let primary = match self.comparator {
                Some(cmp) => match self.direction {
                    SortDirection::Ascending => cmp(a, b),
                    SortDirection::Descending => cmp(b, a),
                },
                None => std::cmp::Ordering::Equal,
            };
            primary.then_with(|| a.id().cmp(&b.id()))
        });
        rows
    }

    fn attach(&self, source: &dyn Source, entity: T) -> Result<Loaded<T>> {
        let mut loaded = Loaded::new(entity);
        for relation in self.relations.iter().copied() {
            let related = loaded.entity.resolve(source, relation)?;
            loaded.related.insert(relation, related);
        }
        Ok(loaded)
    }
}

/// Runs `query` against `source`: filter, order, window, then eager-load.
pub fn find<T: Entity>(source: &dyn Source, query: &Query<T>) -> Result<Vec<Loaded<T>>> {
    let plan = query.plan()?;
    let rows = query.window(plan.order(query.matching(source.scan::<T>())));
    rows.into_iter()
        .map(|row| plan.attach(source, row))
        .collect()
}

/// Number of rows matching `filter`, independent of any paging.
pub fn count<T: Entity>(source: &dyn Source, filter: &Filter<T>) -> usize {
    source
        .scan::<T>()
        .iter()
        .filter(|row| filter.matches(row))
        .count()
}

/// One page of `query` together with the total count of its filter.
pub fn find_page<T: Entity>(
    source: &dyn Source,
    query: Query<T>,
    page: Page,
) -> Result<PagedResult<Loaded<T>>> {
    let total = count(source, query.filter_ref());
    let items = find(source, &query.page(page))?;
    Ok(PagedResult {
        items,
        total,
        page: page.number,
        page_size: page.size,
        total_pages: page.total_pages(total),
    })
}
