//! # Catalog Core
//!
//! Product catalog logic: the record model, store clients, and the screen
//! controller that mirrors the collection and edits it.
//!
//! ## Architecture
//!
//! - `model` - wire records, flattened entries, full snapshots, id minting
//! - `store/` - `CatalogStore` trait with realtime, sqlite and memory backends
//! - `screen` - form state, edit toggle, submit/edit/delete transitions
//! - `config` - connection constants, config file and environment overrides
//! - `events` - outcomes broadcast to observers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use catalog_core::config::CatalogConfig;
//! use catalog_core::screen::{CatalogScreen, FormField};
//!
//! let config = CatalogConfig::load(None).await?;
//! let store = catalog_core::store::open(&config).await?;
//! let mut screen = CatalogScreen::new(store);
//!
//! let mut listener = screen.activate().await?;
//! if let Some(item) = listener.next().await {
//!     screen.on_snapshot(item);
//! }
//!
//! screen.set_field(FormField::Name, "Pen");
//! screen.set_field(FormField::Type, "Stationery");
//! screen.set_field(FormField::Price, "10");
//! screen.submit().await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod screen;
pub mod store;

pub use error::{ScreenError, StoreError};
pub use model::{CatalogEntry, ProductRecord, Snapshot};
pub use screen::CatalogScreen;
pub use store::CatalogStore;
