//! # Catalog Screen
//!
//! The controller behind the single catalog screen. It owns the form, the
//! current edit target, and a mirror of the collection, and changes them only
//! through the transitions below.
//!
//! ```text
//!            begin_edit(id)
//!   Create ─────────────────▶ Edit(id)
//!     ▲                          │
//!     └── submit ok / cancel ────┘
//!         delete(id) of the target
//! ```
//!
//! Store failures never disappear: each one is returned to the caller,
//! logged, and left on the state as an error [`Notice`]. The form is only
//! cleared after a successful write.

use crate::error::{ScreenError, StoreError};
use crate::events::{CatalogEvent, CatalogEventKind};
use crate::model::{CatalogEntry, IdMinter, ProductRecord, Snapshot};
use crate::store::{CatalogStore, SnapshotResult, Subscription};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const DELETE_TITLE: &str = "Confirm Delete";
pub const DELETE_MESSAGE: &str = "Are you sure you want to delete this product?";

/// A text field on the form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Type,
    Price,
    Image,
}

/// Raw text the user has typed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub name: String,
    pub product_type: String,
    pub price: String,
    pub image_url: String,
}

impl FormState {
    fn from_record(record: &ProductRecord) -> Self {
        Self {
            name: record.name.clone(),
            product_type: record.product_type.clone(),
            price: record.price.map(|p| p.to_string()).unwrap_or_default(),
            image_url: record.image_url.clone().unwrap_or_default(),
        }
    }

    /// Validate the form into a full record
    pub fn to_record(&self) -> Result<ProductRecord, ScreenError> {
        let image = self.image_url.trim();
        Ok(ProductRecord {
            name: self.name.clone(),
            product_type: self.product_type.clone(),
            price: Some(parse_price(&self.price)?),
            image_url: (!image.is_empty()).then(|| image.to_string()),
        })
    }
}

/// Price text must be a whole, non-negative number
pub fn parse_price(text: &str) -> Result<i64, ScreenError> {
    text.trim()
        .parse::<i64>()
        .ok()
        .filter(|price| *price >= 0)
        .ok_or_else(|| ScreenError::InvalidPrice(text.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Last outcome shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Everything the screen shows
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    pub form: FormState,
    /// Id being edited; `None` while creating
    pub editing: Option<String>,
    pub entries: Vec<CatalogEntry>,
    pub notice: Option<Notice>,
}

impl ScreenState {
    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn title(&self) -> &'static str {
        if self.is_editing() {
            "Edit Product"
        } else {
            "Add New Product"
        }
    }

    pub fn submit_label(&self) -> &'static str {
        if self.is_editing() {
            "Update Product"
        } else {
            "Add Product"
        }
    }

    pub fn entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Replace the list wholesale
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.entries = snapshot.entries();
    }

    pub fn set_field(&mut self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        match field {
            FormField::Name => self.form.name = value,
            FormField::Type => self.form.product_type = value,
            FormField::Price => self.form.price = value,
            FormField::Image => self.form.image_url = value,
        }
    }

    /// Load an entry into the form and make it the edit target
    pub fn begin_edit(&mut self, id: &str) -> Result<(), ScreenError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| ScreenError::UnknownEntry(id.to_string()))?;
        self.form = FormState::from_record(&entry.record);
        self.editing = Some(id.to_string());
        Ok(())
    }

    /// Clear the form and the edit target
    pub fn reset_form(&mut self) {
        self.form = FormState::default();
        self.editing = None;
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notice = Some(Notice {
            level,
            message: message.into(),
        });
    }
}

/// What the confirmation dialog asks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePrompt {
    pub id: String,
    pub title: &'static str,
    pub message: &'static str,
}

impl DeletePrompt {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: DELETE_TITLE,
            message: DELETE_MESSAGE,
        }
    }
}

/// Blocking yes/no dialog in front of every delete
#[async_trait]
pub trait ConfirmDelete: Send + Sync {
    async fn confirm(&self, prompt: &DeletePrompt) -> bool;
}

/// An answer given before the prompt was shown (`--yes`, `?confirm=true`)
#[derive(Debug, Clone, Copy)]
pub struct Preconfirmed(pub bool);

#[async_trait]
impl ConfirmDelete for Preconfirmed {
    async fn confirm(&self, _prompt: &DeletePrompt) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(String),
    Updated(String),
}

impl SubmitOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Created(id) | Self::Updated(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}

/// Screen controller bound to one store
pub struct CatalogScreen {
    store: Arc<dyn CatalogStore>,
    state: ScreenState,
    ids: IdMinter,
    events: Option<broadcast::Sender<CatalogEvent>>,
}

impl CatalogScreen {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            state: ScreenState::default(),
            ids: IdMinter::new(),
            events: None,
        }
    }

    /// Broadcast outcomes to observers
    pub fn with_events(mut self, tx: broadcast::Sender<CatalogEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    /// Attach the live listener; feed its items to [`Self::on_snapshot`]
    pub async fn activate(&self) -> Result<Subscription, StoreError> {
        let subscription = self.store.subscribe().await?;
        tracing::debug!("Catalog listener attached");
        Ok(subscription)
    }

    /// Handle one item from the live listener
    pub fn on_snapshot(&mut self, item: SnapshotResult) {
        match item {
            Ok(snapshot) => self.apply_snapshot(&snapshot),
            Err(e) => {
                tracing::error!(error = %e, "Live catalog update failed");
                self.state
                    .notify(NoticeLevel::Error, format!("Live updates failed: {}", e));
                self.emit(CatalogEvent::new(CatalogEventKind::OperationFailed).with_error(&e));
            }
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.state.apply_snapshot(snapshot);
        tracing::debug!(count = snapshot.len(), "Catalog snapshot applied");
        self.emit(
            CatalogEvent::new(CatalogEventKind::SnapshotApplied)
                .with_entries(self.state.entries.clone()),
        );
    }

    pub fn set_field(&mut self, field: FormField, value: impl Into<String>) {
        self.state.set_field(field, value);
    }

    pub fn begin_edit(&mut self, id: &str) -> Result<(), ScreenError> {
        self.state.begin_edit(id).map_err(|e| self.fail(e))
    }

    pub fn cancel_edit(&mut self) {
        self.state.reset_form();
    }

    /// Write the form as a new entry, or over the edit target
    #[tracing::instrument(skip(self), fields(editing = ?self.state.editing))]
    pub async fn submit(&mut self) -> Result<SubmitOutcome, ScreenError> {
        let record = self.state.form.to_record().map_err(|e| self.fail(e))?;

        let outcome = match &self.state.editing {
            Some(id) => SubmitOutcome::Updated(id.clone()),
            None => SubmitOutcome::Created(self.fresh_id()),
        };

        if let Err(e) = self.store.set(outcome.id(), &record).await {
            return Err(self.fail(e.into()));
        }

        let (message, kind) = match &outcome {
            SubmitOutcome::Created(_) => ("Product added", CatalogEventKind::EntryCreated),
            SubmitOutcome::Updated(_) => ("Product updated", CatalogEventKind::EntryUpdated),
        };
        tracing::info!(id = %outcome.id(), "{}", message);

        self.state.reset_form();
        self.state.notify(NoticeLevel::Info, message);
        self.emit(CatalogEvent::new(kind).with_entry(outcome.id()));

        Ok(outcome)
    }

    /// Ask for confirmation, then remove the entry
    pub async fn delete(
        &mut self,
        id: &str,
        confirm: &dyn ConfirmDelete,
    ) -> Result<DeleteOutcome, ScreenError> {
        let prompt = DeletePrompt::new(id);
        if !confirm.confirm(&prompt).await {
            tracing::debug!(id = %id, "Delete cancelled");
            self.emit(CatalogEvent::new(CatalogEventKind::DeleteCancelled).with_entry(id));
            return Ok(DeleteOutcome::Cancelled);
        }

        if let Err(e) = self.store.remove(id).await {
            return Err(self.fail(e.into()));
        }

        tracing::info!(id = %id, "Product deleted");
        if self.state.editing.as_deref() == Some(id) {
            self.state.reset_form();
        }
        self.state.notify(NoticeLevel::Info, "Product deleted");
        self.emit(CatalogEvent::new(CatalogEventKind::EntryDeleted).with_entry(id));

        Ok(DeleteOutcome::Deleted)
    }

    /// Timestamp id not already in the list
    fn fresh_id(&self) -> String {
        loop {
            let id = self.ids.next_id();
            if self.state.entry(&id).is_none() {
                return id;
            }
        }
    }

    /// Record a failure on the state and hand the error back
    fn fail(&mut self, err: ScreenError) -> ScreenError {
        tracing::error!(error = %err, "Catalog operation failed");
        self.state.notify(NoticeLevel::Error, err.to_string());
        self.emit(CatalogEvent::new(CatalogEventKind::OperationFailed).with_error(&err));
        err
    }

    fn emit(&self, event: CatalogEvent) {
        if let Some(tx) = &self.events {
            // No receivers is fine
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn screen_with(store: &Arc<InMemoryStore>) -> CatalogScreen {
        CatalogScreen::new(store.clone())
    }

    fn fill(screen: &mut CatalogScreen, name: &str, product_type: &str, price: &str) {
        screen.set_field(FormField::Name, name);
        screen.set_field(FormField::Type, product_type);
        screen.set_field(FormField::Price, price);
    }

    /// Fails every write
    struct BrokenStore;

    #[async_trait]
    impl CatalogStore for BrokenStore {
        async fn set(&self, _id: &str, _record: &ProductRecord) -> Result<(), StoreError> {
            Err(StoreError::Status {
                status: 401,
                body: "Permission denied".to_string(),
            })
        }

        async fn remove(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Status {
                status: 401,
                body: "Permission denied".to_string(),
            })
        }

        async fn snapshot(&self) -> Result<Snapshot, StoreError> {
            Ok(Snapshot::new())
        }

        async fn subscribe(&self) -> Result<Subscription, StoreError> {
            InMemoryStore::new().subscribe().await
        }
    }

    #[test]
    fn test_parse_price_policy() {
        assert_eq!(parse_price(" 10 ").unwrap(), 10);
        assert_eq!(parse_price("0").unwrap(), 0);
        assert!(matches!(parse_price(""), Err(ScreenError::InvalidPrice(_))));
        assert!(parse_price("10abc").is_err());
        assert!(parse_price("1.5").is_err());
        assert!(parse_price("-3").is_err());
    }

    #[test]
    fn test_title_and_label_toggle() {
        let mut state = ScreenState::default();
        assert_eq!(state.title(), "Add New Product");
        assert_eq!(state.submit_label(), "Add Product");

        let mut snapshot = Snapshot::new();
        snapshot.insert("1", ProductRecord::new("Pen", "Stationery", 10));
        state.apply_snapshot(&snapshot);
        state.begin_edit("1").unwrap();

        assert_eq!(state.title(), "Edit Product");
        assert_eq!(state.submit_label(), "Update Product");
    }

    #[test]
    fn test_snapshot_replaces_cache_wholesale() {
        let mut state = ScreenState::default();

        let mut first = Snapshot::new();
        first.insert("1", ProductRecord::new("Pen", "Stationery", 10));
        first.insert("2", ProductRecord::new("Mug", "Kitchen", 4));
        state.apply_snapshot(&first);
        assert_eq!(state.entries.len(), 2);

        let mut second = Snapshot::new();
        second.insert("3", ProductRecord::new("Cup", "Kitchen", 2));
        state.apply_snapshot(&second);

        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].id, "3");
        assert_eq!(state.entries[0].record.name, "Cup");
    }

    #[test]
    fn test_begin_edit_copies_fields() {
        let mut state = ScreenState::default();
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "7",
            ProductRecord::new("Pen", "Stationery", 10).with_image("file:///pen.png"),
        );
        state.apply_snapshot(&snapshot);

        state.begin_edit("7").unwrap();
        assert_eq!(state.editing.as_deref(), Some("7"));
        assert_eq!(
            state.form,
            FormState {
                name: "Pen".to_string(),
                product_type: "Stationery".to_string(),
                price: "10".to_string(),
                image_url: "file:///pen.png".to_string(),
            }
        );

        assert!(matches!(
            state.begin_edit("missing"),
            Err(ScreenError::UnknownEntry(_))
        ));
        assert_eq!(state.editing.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_submit_creates_new_record() {
        let store = Arc::new(InMemoryStore::new());
        let mut screen = screen_with(&store);
        fill(&mut screen, "Pen", "Stationery", "10");

        let outcome = screen.submit().await.unwrap();
        let SubmitOutcome::Created(id) = outcome else {
            panic!("expected a create");
        };

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            serde_json::to_value(snapshot.get(&id).unwrap()).unwrap(),
            json!({
                "products_name": "Pen",
                "products_type": "Stationery",
                "products_price": 10,
                "image_url": null
            })
        );

        assert_eq!(screen.state().form, FormState::default());
        assert!(screen.state().editing.is_none());
        assert_eq!(
            screen.state().notice.as_ref().map(|n| n.level),
            Some(NoticeLevel::Info)
        );
    }

    #[tokio::test]
    async fn test_created_ids_are_fresh() {
        let store = Arc::new(InMemoryStore::new());
        let mut screen = screen_with(&store);

        let mut ids = Vec::new();
        for name in ["A", "B", "C"] {
            fill(&mut screen, name, "t", "1");
            ids.push(screen.submit().await.unwrap().id().to_string());
        }

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.snapshot().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_submit_with_edit_target_overwrites_same_id() {
        let store = Arc::new(InMemoryStore::new());
        let mut screen = screen_with(&store);
        let mut sub = screen.activate().await.unwrap();
        screen.on_snapshot(sub.next().await.unwrap());

        fill(&mut screen, "Pen", "Stationery", "10");
        let id = screen.submit().await.unwrap().id().to_string();
        screen.on_snapshot(sub.next().await.unwrap());

        screen.begin_edit(&id).unwrap();
        screen.set_field(FormField::Price, "15");
        let outcome = screen.submit().await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Updated(id.clone()));

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        let record = snapshot.get(&id).unwrap();
        assert_eq!(record.price, Some(15));
        assert_eq!(record.name, "Pen");
        assert_eq!(record.product_type, "Stationery");
        assert!(screen.state().editing.is_none());
    }

    #[tokio::test]
    async fn test_invalid_price_keeps_form_and_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let mut screen = screen_with(&store);
        fill(&mut screen, "Pen", "Stationery", "ten");

        let result = screen.submit().await;
        assert!(matches!(result, Err(ScreenError::InvalidPrice(_))));

        assert!(store.snapshot().await.unwrap().is_empty());
        assert_eq!(screen.state().form.name, "Pen");
        assert_eq!(screen.state().form.price, "ten");
        assert_eq!(
            screen.state().notice.as_ref().map(|n| n.level),
            Some(NoticeLevel::Error)
        );
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_and_preserves_form() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut screen = CatalogScreen::new(Arc::new(BrokenStore)).with_events(tx);
        fill(&mut screen, "Pen", "Stationery", "10");

        let result = screen.submit().await;
        assert!(matches!(
            result,
            Err(ScreenError::Store(StoreError::Status { status: 401, .. }))
        ));
        assert_eq!(screen.state().form.price, "10");

        let notice = screen.state().notice.clone().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("Permission denied"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, CatalogEventKind::OperationFailed);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_edit_target() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut screen = CatalogScreen::new(Arc::new(BrokenStore)).with_events(tx);

        let mut snapshot = Snapshot::new();
        snapshot.insert("1", ProductRecord::new("Pen", "Stationery", 10));
        screen.apply_snapshot(&snapshot);
        screen.begin_edit("1").unwrap();
        let _ = rx.recv().await.unwrap();

        let result = screen.delete("1", &Preconfirmed(true)).await;
        assert!(matches!(
            result,
            Err(ScreenError::Store(StoreError::Status { status: 401, .. }))
        ));

        assert_eq!(screen.state().editing.as_deref(), Some("1"));
        assert_eq!(screen.state().form.name, "Pen");
        let notice = screen.state().notice.clone().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, CatalogEventKind::OperationFailed);
    }

    #[tokio::test]
    async fn test_confirmed_delete_removes_from_next_snapshot() {
        let mut initial = Snapshot::new();
        initial.insert("1", ProductRecord::new("Pen", "Stationery", 10));
        initial.insert("2", ProductRecord::new("Mug", "Kitchen", 4));
        let store = Arc::new(InMemoryStore::with_snapshot(initial));

        let mut screen = screen_with(&store);
        let mut sub = screen.activate().await.unwrap();
        screen.on_snapshot(sub.next().await.unwrap());
        assert_eq!(screen.state().entries.len(), 2);

        let outcome = screen.delete("1", &Preconfirmed(true)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);

        let next = sub.next().await.unwrap().unwrap();
        assert!(!next.contains("1"));
        assert!(next.contains("2"));

        screen.on_snapshot(Ok(next));
        assert!(screen.state().entry("1").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_delete_leaves_collection_unchanged() {
        let mut initial = Snapshot::new();
        initial.insert("1", ProductRecord::new("Pen", "Stationery", 10));
        let store = Arc::new(InMemoryStore::with_snapshot(initial.clone()));
        let mut screen = screen_with(&store);

        let outcome = screen.delete("1", &Preconfirmed(false)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert_eq!(store.snapshot().await.unwrap(), initial);
    }

    #[tokio::test]
    async fn test_deleting_edit_target_resets_form() {
        let mut initial = Snapshot::new();
        initial.insert("1", ProductRecord::new("Pen", "Stationery", 10));
        let store = Arc::new(InMemoryStore::with_snapshot(initial.clone()));
        let mut screen = screen_with(&store);
        screen.apply_snapshot(&initial);

        screen.begin_edit("1").unwrap();
        screen.delete("1", &Preconfirmed(true)).await.unwrap();

        assert!(screen.state().editing.is_none());
        assert_eq!(screen.state().form, FormState::default());
    }

    #[tokio::test]
    async fn test_listener_error_becomes_notice() {
        let store = Arc::new(InMemoryStore::new());
        let mut screen = screen_with(&store);

        screen.on_snapshot(Err(StoreError::Cancelled("permission_denied".to_string())));

        let notice = screen.state().notice.clone().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("Live updates failed"));
    }

    #[tokio::test]
    async fn test_cancel_edit_returns_to_create_mode() {
        let mut initial = Snapshot::new();
        initial.insert("1", ProductRecord::new("Pen", "Stationery", 10));
        let store = Arc::new(InMemoryStore::with_snapshot(initial.clone()));
        let mut screen = screen_with(&store);
        screen.apply_snapshot(&initial);

        screen.begin_edit("1").unwrap();
        screen.cancel_edit();

        assert_eq!(screen.state().title(), "Add New Product");
        assert_eq!(screen.state().form, FormState::default());
    }
}
