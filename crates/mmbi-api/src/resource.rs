//! Generic CRUD handlers, instantiated once per entity kind.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/<kind>` | 201 + stored body + `Location`; id must be absent |
//! | `GET`    | `/<kind>` | Filters, `page`, `size`, `sort`; total in `X-Total-Count` |
//! | `GET`    | `/<kind>/count` | Integer count of filter matches |
//! | `GET`    | `/<kind>/_search` | `?query=field:value`, served from the search index |
//! | `GET`    | `/<kind>/{id}` | 200 or 404 |
//! | `PUT`    | `/<kind>/{id}` | Full replace; path and body id must agree |
//! | `PATCH`  | `/<kind>/{id}` | Merge of the supplied, non-null keys |
//! | `DELETE` | `/<kind>/{id}` | 204; 409 while still referenced |

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::{HeaderName, StatusCode, header},
  response::IntoResponse,
};
use mmbi_core::{
  Error,
  entity::{Entity, EntityId},
  filter::Criteria,
  listing::{self, EntityQuery},
  search::{SearchIndex, SearchQuery},
  store::EntityStore,
};
use serde_json::Value;

use crate::{AppState, error::ApiError};

pub const X_TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");

type Params = Result<Query<Vec<(String, String)>>, QueryRejection>;
type IdPath = Result<Path<EntityId>, PathRejection>;
type Body = Result<Json<Value>, JsonRejection>;

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /<kind>`
pub async fn create<E, S, I>(
  State(state): State<AppState<S, I>>,
  body: Body,
) -> Result<impl IntoResponse, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Json(body) = body?;
  tracing::debug!(kind = %E::KIND, "REST request to create");

  let entity = E::from_body(body)?;
  if entity.id().is_some() {
    return Err(Error::IdentifierConflict(E::KIND).into());
  }
  entity.validate()?;

  let stored = state.store.insert(entity).await.map_err(ApiError::from_store)?;
  state.sync.wake();

  let id = stored.id().ok_or(Error::MissingIdentifier(E::KIND))?;
  let location = format!("/api/{}/{id}", E::KIND.path());
  Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(stored)))
}

// ─── Read ─────────────────────────────────────────────────────────────────────

/// `GET /<kind>?<filters>&page=&size=&sort=`
pub async fn list<E, S, I>(
  State(state): State<AppState<S, I>>,
  params: Params,
) -> Result<impl IntoResponse, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Query(params) = params?;
  tracing::debug!(kind = %E::KIND, ?params, "REST request to list");
  let query = EntityQuery::from_params::<E>(&params)?;
  let page = state.store.list::<E>(&query).await.map_err(ApiError::from_store)?;
  Ok(([(X_TOTAL_COUNT, page.total.to_string())], Json(page.items)))
}

/// `GET /<kind>/count?<filters>`
pub async fn count<E, S, I>(
  State(state): State<AppState<S, I>>,
  params: Params,
) -> Result<Json<u64>, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Query(params) = params?;
  tracing::debug!(kind = %E::KIND, ?params, "REST request to count");
  let criteria = Criteria::from_params::<E>(&params)?;
  let n = state.store.count::<E>(&criteria).await.map_err(ApiError::from_store)?;
  Ok(Json(n))
}

/// `GET /<kind>/{id}`
pub async fn get_one<E, S, I>(
  State(state): State<AppState<S, I>>,
  id: IdPath,
) -> Result<Json<E>, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Path(id) = id?;
  tracing::debug!(kind = %E::KIND, id, "REST request to get");
  let entity = state
    .store
    .get::<E>(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or(Error::NotFound { kind: E::KIND, id })?;
  Ok(Json(entity))
}

/// `GET /<kind>/_search?query=...`
pub async fn search<E, S, I>(
  State(state): State<AppState<S, I>>,
  params: Params,
) -> Result<impl IntoResponse, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Query(params) = params?;
  let raw = params
    .iter()
    .find(|(key, _)| key == "query")
    .map_or("*", |(_, value)| value.as_str());
  tracing::debug!(kind = %E::KIND, query = raw, "REST request to search");

  let (page, size) = listing::page_window(&params)?;
  let hits = state
    .index
    .search(E::KIND, &SearchQuery::parse(raw))
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  let page = listing::paginate(hits, page, size);
  Ok(([(X_TOTAL_COUNT, page.total.to_string())], Json(page.items)))
}

// ─── Update ───────────────────────────────────────────────────────────────────

fn check_identifier<E: Entity>(
  path: EntityId,
  body: Option<EntityId>,
) -> Result<(), ApiError> {
  if body == Some(path) {
    Ok(())
  } else {
    Err(Error::IdentifierMismatch { kind: E::KIND, path, body }.into())
  }
}

/// `PUT /<kind>/{id}`
pub async fn update<E, S, I>(
  State(state): State<AppState<S, I>>,
  id: IdPath,
  body: Body,
) -> Result<Json<E>, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Path(id) = id?;
  let Json(body) = body?;
  tracing::debug!(kind = %E::KIND, id, "REST request to update");

  let entity = E::from_body(body)?;
  check_identifier::<E>(id, entity.id())?;
  entity.validate()?;

  let stored = state
    .store
    .update(entity)
    .await
    .map_err(|e| ApiError::from_store(e).on_update())?;
  state.sync.wake();
  Ok(Json(stored))
}

/// `PATCH /<kind>/{id}`
pub async fn partial_update<E, S, I>(
  State(state): State<AppState<S, I>>,
  id: IdPath,
  body: Body,
) -> Result<Json<E>, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Path(id) = id?;
  let Json(patch) = body?;
  tracing::debug!(kind = %E::KIND, id, "REST request to partially update");

  check_identifier::<E>(id, patch.get("id").and_then(Value::as_i64))?;
  let current = state
    .store
    .get::<E>(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or(Error::NotFound { kind: E::KIND, id })
    .map_err(|e| ApiError::from(e).on_update())?;

  let merged = current.merge_patch(&patch)?;
  merged.validate()?;

  let stored = state
    .store
    .update(merged)
    .await
    .map_err(|e| ApiError::from_store(e).on_update())?;
  state.sync.wake();
  Ok(Json(stored))
}

/// `PUT`/`PATCH` on the collection path: there is no id to update.
pub async fn missing_identifier<E: Entity>() -> ApiError {
  Error::MissingIdentifier(E::KIND).into()
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /<kind>/{id}`
pub async fn delete<E, S, I>(
  State(state): State<AppState<S, I>>,
  id: IdPath,
) -> Result<StatusCode, ApiError>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let Path(id) = id?;
  tracing::debug!(kind = %E::KIND, id, "REST request to delete");
  state.store.delete::<E>(id).await.map_err(ApiError::from_store)?;
  state.sync.wake();
  Ok(StatusCode::NO_CONTENT)
}
