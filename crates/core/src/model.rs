//! # Catalog Model
//!
//! The wire record stored under each key of the collection, the flattened
//! entry the screen lists, and full collection snapshots.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// One product as stored in the collection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "products_name", default)]
    pub name: String,
    #[serde(rename = "products_type", default)]
    pub product_type: String,
    #[serde(
        rename = "products_price",
        default,
        deserialize_with = "lenient_price"
    )]
    pub price: Option<i64>,
    #[serde(rename = "image_url", default)]
    pub image_url: Option<String>,
}

impl ProductRecord {
    pub fn new(name: impl Into<String>, product_type: impl Into<String>, price: i64) -> Self {
        Self {
            name: name.into(),
            product_type: product_type.into(),
            price: Some(price),
            image_url: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// A record together with the key it lives under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(flatten)]
    pub record: ProductRecord,
}

/// Full point-in-time readout of the collection, keyed by entry id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: BTreeMap<String, ProductRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a raw collection value.
    ///
    /// `null` is an empty collection. Arrays are how the store renders maps
    /// with small integer keys, so indices become ids and null holes are
    /// skipped. Children that are not records are dropped with a warning.
    pub fn from_value(value: &Value) -> Self {
        let mut snapshot = Self::new();

        match value {
            Value::Null => {}
            Value::Object(map) => {
                for (id, child) in map {
                    snapshot.insert_raw(id, child);
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    if !child.is_null() {
                        snapshot.insert_raw(&index.to_string(), child);
                    }
                }
            }
            other => {
                tracing::warn!(value = %other, "Collection is not an object, treating as empty");
            }
        }

        snapshot
    }

    fn insert_raw(&mut self, id: &str, child: &Value) {
        match ProductRecord::deserialize(child) {
            Ok(record) => {
                self.records.insert(id.to_string(), record);
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Skipping malformed product record");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ProductRecord> {
        self.records.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn insert(&mut self, id: impl Into<String>, record: ProductRecord) {
        self.records.insert(id.into(), record);
    }

    pub fn remove(&mut self, id: &str) -> Option<ProductRecord> {
        self.records.remove(id)
    }

    /// Flatten into one entry per key, the key exposed as `id`
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.records
            .iter()
            .map(|(id, record)| CatalogEntry {
                id: id.clone(),
                record: record.clone(),
            })
            .collect()
    }
}

impl FromIterator<(String, ProductRecord)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, ProductRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Issues entry ids from the millisecond clock.
///
/// Ids strictly increase within one minter even when two are requested in
/// the same millisecond.
#[derive(Debug, Default)]
pub struct IdMinter {
    last: AtomicI64,
}

impl IdMinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        self.next_after(Utc::now().timestamp_millis()).to_string()
    }

    fn next_after(&self, now: i64) -> i64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

fn lenient_price<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(price_from_value))
}

fn price_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_wire_format() {
        let record = ProductRecord::new("Pen", "Stationery", 10);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            json!({
                "products_name": "Pen",
                "products_type": "Stationery",
                "products_price": 10,
                "image_url": null
            })
        );
    }

    #[test]
    fn test_entry_serializes_flat_with_id() {
        let entry = CatalogEntry {
            id: "1700000000000".to_string(),
            record: ProductRecord::new("Pen", "Stationery", 10).with_image("file:///pen.png"),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], "1700000000000");
        assert_eq!(json["products_name"], "Pen");
        assert_eq!(json["image_url"], "file:///pen.png");
    }

    #[test]
    fn test_snapshot_one_entry_per_key() {
        let raw = json!({
            "1": { "products_name": "Pen", "products_type": "Stationery", "products_price": 10 },
            "2": { "products_name": "Mug", "products_type": "Kitchen", "products_price": 7, "image_url": "http://x/mug.png" }
        });

        let snapshot = Snapshot::from_value(&raw);
        let entries = snapshot.entries();

        assert_eq!(entries.len(), 2);
        let mug = entries.iter().find(|e| e.id == "2").unwrap();
        assert_eq!(mug.record.name, "Mug");
        assert_eq!(mug.record.price, Some(7));
        assert_eq!(mug.record.image_url.as_deref(), Some("http://x/mug.png"));
    }

    #[test]
    fn test_snapshot_null_is_empty() {
        assert!(Snapshot::from_value(&Value::Null).is_empty());
    }

    #[test]
    fn test_snapshot_array_form_skips_holes() {
        let raw = json!([null, { "products_name": "A", "products_type": "t", "products_price": 1 }]);
        let snapshot = Snapshot::from_value(&raw);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("1"));
    }

    #[test]
    fn test_snapshot_skips_malformed_children() {
        let raw = json!({
            "1": "not a record",
            "2": { "products_name": "Ok", "products_type": "t", "products_price": 3 }
        });
        let snapshot = Snapshot::from_value(&raw);
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec!["2"]);
    }

    #[test]
    fn test_lenient_price_forms() {
        let raw = json!({
            "a": { "products_price": 12.0 },
            "b": { "products_price": "15" },
            "c": { "products_price": 1.5 },
            "d": { "products_price": null }
        });
        let snapshot = Snapshot::from_value(&raw);
        assert_eq!(snapshot.get("a").unwrap().price, Some(12));
        assert_eq!(snapshot.get("b").unwrap().price, Some(15));
        assert_eq!(snapshot.get("c").unwrap().price, None);
        assert_eq!(snapshot.get("d").unwrap().price, None);
    }

    #[test]
    fn test_id_minter_strictly_increasing() {
        let minter = IdMinter::new();
        assert_eq!(minter.next_after(1000), 1000);
        assert_eq!(minter.next_after(1000), 1001);
        assert_eq!(minter.next_after(999), 1002);
        assert_eq!(minter.next_after(5000), 5000);
    }

    #[test]
    fn test_id_minter_uses_clock() {
        let before = Utc::now().timestamp_millis();
        let id: i64 = IdMinter::new().next_id().parse().unwrap();
        assert!(id >= before);
    }
}
