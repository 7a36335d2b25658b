//! Sorting and paging of filtered listings.

use std::cmp::Ordering;

use crate::{
  Error, Result,
  entity::{Entity, FieldValue},
  filter::Criteria,
};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Asc,
  Desc,
}

/// One `sort=<field>[,asc|desc]` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
  pub field:     String,
  pub direction: Direction,
}

impl SortOrder {
  /// Parse a `sort` parameter for entity `E`; only `id` and scalar fields
  /// are sortable.
  pub fn parse<E: Entity>(raw: &str) -> Result<Self> {
    let mut parts = raw.split(',').map(str::trim);
    let field = parts.next().filter(|f| !f.is_empty());
    let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
      None | Some("asc") => Direction::Asc,
      Some("desc") => Direction::Desc,
      Some(_) => return Err(Error::InvalidSort(raw.to_owned())),
    };
    match field {
      Some(field) if field == "id" || E::FIELDS.iter().any(|d| d.name == field) => {
        Ok(Self { field: field.to_owned(), direction })
      }
      _ => Err(Error::InvalidSort(raw.to_owned())),
    }
  }
}

/// A listing request: filter, sort and page window.
#[derive(Debug, Clone)]
pub struct EntityQuery {
  pub criteria: Criteria,
  pub sort:     Vec<SortOrder>,
  pub page:     usize,
  pub size:     usize,
}

impl Default for EntityQuery {
  fn default() -> Self {
    Self {
      criteria: Criteria::default(),
      sort:     Vec::new(),
      page:     0,
      size:     DEFAULT_PAGE_SIZE,
    }
  }
}

impl EntityQuery {
  /// Build a query from raw query-string pairs (`page`, `size`, `sort` and
  /// filter criteria).
  pub fn from_params<E: Entity>(params: &[(String, String)]) -> Result<Self> {
    let (page, size) = page_window(params)?;
    let sort = params
      .iter()
      .filter(|(key, _)| key == "sort")
      .map(|(_, value)| SortOrder::parse::<E>(value))
      .collect::<Result<_>>()?;
    Ok(Self { criteria: Criteria::from_params::<E>(params)?, sort, page, size })
  }
}

/// The `(page, size)` window requested by `params`; other keys are ignored.
pub fn page_window(params: &[(String, String)]) -> Result<(usize, usize)> {
  let mut window = (0, DEFAULT_PAGE_SIZE);
  for (key, value) in params {
    match key.as_str() {
      "page" => window.0 = parse_usize("page", value)?,
      "size" => window.1 = parse_usize("size", value)?.clamp(1, MAX_PAGE_SIZE),
      _ => {}
    }
  }
  Ok(window)
}

fn parse_usize(param: &str, raw: &str) -> Result<usize> {
  raw.trim().parse().map_err(|_| Error::InvalidFilter {
    param:  param.to_owned(),
    reason: format!("{raw:?} is not a non-negative integer"),
  })
}

/// One page of a listing plus the total number of matches.
#[derive(Debug, Clone)]
pub struct Page<E> {
  pub items: Vec<E>,
  pub total: u64,
}

fn sort_key<E: Entity>(entity: &E, field: &str) -> FieldValue {
  if field == "id" {
    entity.id().into()
  } else {
    entity.field(field)
  }
}

fn compare<E: Entity>(a: &E, b: &E, sort: &[SortOrder]) -> Ordering {
  sort
    .iter()
    .map(|order| {
      let ord = sort_key(a, &order.field).cmp(&sort_key(b, &order.field));
      match order.direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
      }
    })
    .find(|ord| ord.is_ne())
    .unwrap_or(Ordering::Equal)
    // `id` always breaks ties so paging is stable.
    .then_with(|| a.id().cmp(&b.id()))
}

/// Filter, sort and page `entities` according to `query`.
pub fn select<E: Entity>(entities: Vec<E>, query: &EntityQuery) -> Page<E> {
  let mut matched: Vec<E> = entities
    .into_iter()
    .filter(|e| query.criteria.matches(e))
    .collect();
  matched.sort_by(|a, b| compare(a, b, &query.sort));

  paginate(matched, query.page, query.size)
}

/// Cut page `page` of `size` items out of an already ordered result.
pub fn paginate<T>(items: Vec<T>, page: usize, size: usize) -> Page<T> {
  let total = items.len() as u64;
  let items = items
    .into_iter()
    .skip(page.saturating_mul(size))
    .take(size)
    .collect();
  Page { items, total }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Placeholder;

  fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  fn placeholders() -> Vec<Placeholder> {
    [(3, "c"), (1, "b"), (2, "b"), (4, "a")]
      .into_iter()
      .map(|(id, desc)| Placeholder {
        id: Some(id),
        description: Some(desc.into()),
        ..Default::default()
      })
      .collect()
  }

  fn ids(page: &Page<Placeholder>) -> Vec<i64> {
    page.items.iter().filter_map(|p| p.id).collect()
  }

  #[test]
  fn default_order_is_by_id() {
    let page = select(placeholders(), &EntityQuery::default());
    assert_eq!(ids(&page), vec![1, 2, 3, 4]);
    assert_eq!(page.total, 4);
  }

  #[test]
  fn sort_desc_with_id_tiebreak() {
    let query =
      EntityQuery::from_params::<Placeholder>(&params(&[("sort", "description,desc")]))
        .unwrap();
    let page = select(placeholders(), &query);
    assert_eq!(ids(&page), vec![3, 1, 2, 4]);
  }

  #[test]
  fn paging_reports_total() {
    let query = EntityQuery::from_params::<Placeholder>(&params(&[
      ("page", "1"),
      ("size", "3"),
      ("description.notEquals", "a"),
    ]))
    .unwrap();
    let page = select(placeholders(), &query);
    assert_eq!(page.total, 3);
    assert!(page.items.is_empty());
  }

  #[test]
  fn unknown_sort_field_is_rejected() {
    let err =
      EntityQuery::from_params::<Placeholder>(&params(&[("sort", "colour,asc")]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSort(_)));
    let err =
      EntityQuery::from_params::<Placeholder>(&params(&[("sort", "id,sideways")]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSort(_)));
  }

  #[test]
  fn page_window_clamps_size() {
    assert_eq!(page_window(&[]).unwrap(), (0, DEFAULT_PAGE_SIZE));
    assert_eq!(
      page_window(&params(&[("size", "999999"), ("page", "2")])).unwrap(),
      (2, MAX_PAGE_SIZE)
    );
    assert_eq!(page_window(&params(&[("size", "0")])).unwrap(), (0, 1));
    assert!(page_window(&params(&[("page", "-1")])).is_err());
  }
}
