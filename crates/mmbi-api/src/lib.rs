//! JSON REST gateway for the money-market BI entities.
//!
//! Exposes an axum [`Router`] backed by any [`EntityStore`] plus a
//! [`SearchIndex`]. Writes go to the store; the index is fed asynchronously
//! by an [`mmbi_search::IndexSync`] worker that the gateway wakes after every
//! successful write.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", mmbi_api::api_router(state))
//! ```

pub mod error;
pub mod resource;

use std::sync::Arc;

use axum::{Router, routing::get};
use mmbi_core::{
  entity::Entity,
  model::{
    ApplicationUser, Dealer, FiscalMonth, FiscalQuarter, FiscalYear, Placeholder,
    SecurityClearance,
  },
  search::SearchIndex,
  store::EntityStore,
};
use mmbi_search::SyncHandle;

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, I> {
  pub store: Arc<S>,
  pub index: Arc<I>,
  pub sync:  SyncHandle,
}

impl<S, I> AppState<S, I> {
  pub fn new(store: Arc<S>, index: Arc<I>, sync: SyncHandle) -> Self {
    Self { store, index, sync }
  }
}

// `S` and `I` need not be `Clone`.
impl<S, I> Clone for AppState<S, I> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      index: self.index.clone(),
      sync:  self.sync.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Register the routes of entity kind `E`.
fn mount<E, S, I>(router: Router<AppState<S, I>>) -> Router<AppState<S, I>>
where
  E: Entity,
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let base = format!("/{}", E::KIND.path());
  router
    .route(
      &base,
      get(resource::list::<E, S, I>)
        .post(resource::create::<E, S, I>)
        .put(resource::missing_identifier::<E>)
        .patch(resource::missing_identifier::<E>),
    )
    .route(&format!("{base}/count"), get(resource::count::<E, S, I>))
    .route(&format!("{base}/_search"), get(resource::search::<E, S, I>))
    .route(
      &format!("{base}/{{id}}"),
      get(resource::get_one::<E, S, I>)
        .put(resource::update::<E, S, I>)
        .patch(resource::partial_update::<E, S, I>)
        .delete(resource::delete::<E, S, I>),
    )
}

/// Build the API router for every entity kind.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, I>(state: AppState<S, I>) -> Router<()>
where
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  let router = Router::new();
  let router = mount::<Placeholder, S, I>(router);
  let router = mount::<Dealer, S, I>(router);
  let router = mount::<SecurityClearance, S, I>(router);
  let router = mount::<ApplicationUser, S, I>(router);
  let router = mount::<FiscalYear, S, I>(router);
  let router = mount::<FiscalQuarter, S, I>(router);
  let router = mount::<FiscalMonth, S, I>(router);
  router.with_state(state)
}
