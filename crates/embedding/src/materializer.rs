//! Materialize restaurants with their inspections embedded.
//!
//! Everything happens inside one store transaction.  Inspections are read once and bucketed by the restaurant their
//! foreign key refers to, then every restaurant is projected, given its bucket (possibly empty), and the whole set is
//! written to the destination in a single bulk insert under the destination's validator.
//!
//! Running twice without [MaterializerConfig::get_clear_destination] collides on every `_id`: the second run fails
//! (or, when skipping, reports every restaurant as a duplicate).
use std::collections::HashMap;

use log::*;
use serde_json::{Map, Value};

use hygiene_datastore::{
    Database, DocumentFailure, FailurePolicy, FailureReason, ObjectId, Transaction,
};

use crate::coercion::*;
use crate::config::MaterializerConfig;
use crate::errors::*;
use crate::models::*;
use crate::schema::embedded_restaurant_validator;

/// Copy `fields` out of `document`, in the order given.  Missing fields stay missing.
pub fn project(document: &Value, fields: &[&str]) -> Map<String, Value> {
    let mut ret = Map::with_capacity(fields.len());
    for f in fields {
        if let Some(v) = document.get(*f) {
            ret.insert(f.to_string(), v.clone());
        }
    }
    ret
}

/// Projected inspections grouped by the restaurant they refer to, in read order.
#[derive(Debug, Default)]
pub struct InspectionIndex {
    by_restaurant: HashMap<ObjectId, Vec<Value>>,
    unlinked: usize,
}

impl InspectionIndex {
    pub fn build<'a>(inspections: impl IntoIterator<Item = &'a Value>) -> InspectionIndex {
        let mut index = InspectionIndex::default();

        for inspection in inspections {
            match coerce_foreign_key(inspection.get(FOREIGN_KEY_FIELD)) {
                Some(key) => index
                    .by_restaurant
                    .entry(key)
                    .or_default()
                    .push(Value::Object(project(inspection, &INSPECTION_FIELDS))),
                None => {
                    debug!(
                        "Inspection {} has no usable {}",
                        inspection.get("_id").unwrap_or(&Value::Null),
                        FOREIGN_KEY_FIELD
                    );
                    index.unlinked += 1;
                }
            }
        }

        index
    }

    pub fn lookup(&self, restaurant: &ObjectId) -> &[Value] {
        self.by_restaurant
            .get(restaurant)
            .map(|v| &v[..])
            .unwrap_or(&[])
    }

    /// Inspections whose foreign key couldn't be converted.  They join to nothing.
    pub fn get_unlinked(&self) -> usize {
        self.unlinked
    }
}

/// Build the embedded form of one restaurant.
///
/// A restaurant whose `_id` is not an ObjectId matches no inspections.  The rating, when present, is normalized under
/// `policy`; a rating which can't be is a rejection of the whole restaurant.
pub fn embed_restaurant(
    restaurant: &Value,
    index: &InspectionIndex,
    policy: RatingPolicy,
) -> Result<Value, FailureReason> {
    if !restaurant.is_object() {
        return Err(FailureReason::NotAnObject);
    }

    let mut embedded = project(restaurant, &RESTAURANT_FIELDS);

    if let Some(rating) = embedded.get_mut("rating") {
        let normalized = normalize_rating(rating, policy).map_err(|e| FailureReason::Rejected(e.to_string()))?;
        *rating = Value::from(normalized);
    }

    let inspections = restaurant_key(restaurant)
        .map(|k| index.lookup(&k).to_vec())
        .unwrap_or_default();
    embedded.insert(INSPECTIONS_FIELD.to_string(), Value::Array(inspections));

    Ok(Value::Object(embedded))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterializeReport {
    pub restaurants_read: usize,
    pub inspections_read: usize,
    /// Inspections whose foreign key couldn't be converted.
    pub unlinked_inspections: usize,
    /// `_id`s written to the destination, in source order.
    pub inserted_ids: Vec<Value>,
    /// Restaurants which were not written.  Indices are positions among the source restaurants.
    pub failures: Vec<DocumentFailure>,
}

impl MaterializeReport {
    pub fn inserted(&self) -> usize {
        self.inserted_ids.len()
    }
}

fn load_all(tx: &Transaction, collection: &str) -> Result<Vec<Value>> {
    let mut ret = vec![];
    tx.load_collection(collection, |d: Value| {
        ret.push(d);
        Ok(())
    })?;
    Ok(ret)
}

/// Run the materialization in its own transaction, committing only if it succeeds.
pub fn materialize(db: &mut Database, config: &MaterializerConfig) -> Result<MaterializeReport> {
    let mut tx = db.transaction()?;
    let report = materialize_in(&mut tx, config)?;
    tx.commit()?;
    Ok(report)
}

/// Run the materialization inside a caller's transaction.
///
/// On error, the transaction may hold partial writes and should be dropped.
pub fn materialize_in(tx: &mut Transaction, config: &MaterializerConfig) -> Result<MaterializeReport> {
    let destination = config.get_destination();
    let policy = config.get_failure_policy();
    let validator = embedded_restaurant_validator(config.get_validation_action())?;

    if config.get_clear_destination() {
        tx.truncate_collection(destination)?;
    }

    let inspections = load_all(tx, config.get_inspections())?;
    let index = InspectionIndex::build(inspections.iter());
    let restaurants = load_all(tx, config.get_restaurants())?;
    info!(
        "Read {} restaurants and {} inspections ({} without a usable {})",
        restaurants.len(),
        inspections.len(),
        index.get_unlinked(),
        FOREIGN_KEY_FIELD
    );

    let mut report = MaterializeReport {
        restaurants_read: restaurants.len(),
        inspections_read: inspections.len(),
        unlinked_inspections: index.get_unlinked(),
        ..Default::default()
    };

    // Position in the source of each document handed to the store.
    let mut positions = Vec::with_capacity(restaurants.len());
    let mut embedded = Vec::with_capacity(restaurants.len());
    for (i, restaurant) in restaurants.iter().enumerate() {
        match embed_restaurant(restaurant, &index, config.get_rating_policy()) {
            Ok(doc) => {
                positions.push(i);
                embedded.push(doc);
            }
            Err(reason) => {
                let failure = DocumentFailure {
                    index: i,
                    id: restaurant.get("_id").cloned(),
                    reason,
                };
                match policy {
                    FailurePolicy::Abort => {
                        warn!("Aborting materialization: restaurant {}", failure);
                        return Err(Error::Aborted(failure));
                    }
                    FailurePolicy::SkipAndReport => {
                        warn!("Skipping restaurant {}", failure);
                        report.failures.push(failure);
                    }
                }
            }
        }
    }

    if config.get_attach_validator_first() {
        tx.set_validator(destination, &validator)?;
    }

    let inserted = match tx.insert_many(destination, &embedded, policy) {
        Ok(r) => r,
        Err(hygiene_datastore::Error::BatchAborted(mut failure)) => {
            failure.index = positions[failure.index];
            return Err(Error::Aborted(failure));
        }
        Err(e) => return Err(e.into()),
    };

    report.inserted_ids = inserted.inserted_ids;
    report
        .failures
        .extend(inserted.failures.into_iter().map(|mut f| {
            f.index = positions[f.index];
            f
        }));
    report.failures.sort_by_key(|f| f.index);

    if !config.get_attach_validator_first() {
        tx.set_validator(destination, &validator)?;
    }

    info!(
        "Materialized {} of {} restaurants into {} ({} failed)",
        report.inserted(),
        report.restaurants_read,
        destination,
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    const R1: &str = "55f14312c7447c3da7051b26";
    const R2: &str = "55f14312c7447c3da7051b27";

    fn restaurant(hex: &str, rating: Value) -> Value {
        json!({
            "_id": {"$oid": hex},
            "URL": "http://example.com",
            "address": "1 Road",
            "address_line_2": "Town",
            "name": "Place",
            "outcode": "AB1",
            "postcode": "2CD",
            "rating": rating,
            "type_of_food": "Pizza",
            "internal_note": "dropped",
        })
    }

    fn inspection(n: u8, restaurant_id: Value) -> Value {
        json!({
            "_id": {"$oid": format!("56d61033a378eccde8a8{:04x}", n)},
            "id": format!("{}-2015-ENFO", n),
            "certificate_number": 9000000 + n as i64,
            "date": "Feb 10 2015",
            "result": "Pass",
            "sector": "Retail",
            "restaurant_id": restaurant_id,
            "address": {"city": "dropped"},
        })
    }

    #[test]
    fn test_project_keeps_order_and_absence() {
        let doc = json!({"c": 3, "a": 1, "z": 26});
        let got = project(&doc, &["a", "b", "c"]);
        assert_eq!(got.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(Value::Object(got), json!({"a": 1, "c": 3}));
    }

    #[test]
    fn test_index_buckets_by_coerced_key() {
        let inspections = vec![
            inspection(1, json!(R1)),
            inspection(2, json!(R2)),
            inspection(3, json!(R1)),
            inspection(4, json!("not-an-id")),
            inspection(5, json!(null)),
            inspection(6, json!({"$oid": R2})),
        ];
        let index = InspectionIndex::build(inspections.iter());

        let r1: ObjectId = R1.parse().unwrap();
        let r2: ObjectId = R2.parse().unwrap();
        let ids = |k: &ObjectId| {
            index
                .lookup(k)
                .iter()
                .map(|i| i["id"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&r1), vec!["1-2015-ENFO", "3-2015-ENFO"]);
        assert_eq!(ids(&r2), vec!["2-2015-ENFO", "6-2015-ENFO"]);
        assert!(index.lookup(&ObjectId::new()).is_empty());
        assert_eq!(index.get_unlinked(), 2);

        // Only the six embedded fields survive.
        let first = index.lookup(&r1)[0].as_object().unwrap();
        assert_eq!(
            first.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            INSPECTION_FIELDS.to_vec()
        );
    }

    #[test]
    fn test_embed_restaurant() {
        let inspections = vec![inspection(1, json!(R1))];
        let index = InspectionIndex::build(inspections.iter());

        let got = embed_restaurant(&restaurant(R1, json!(5)), &index, RatingPolicy::Reject).unwrap();
        let mut expected_keys = RESTAURANT_FIELDS.to_vec();
        expected_keys.push(INSPECTIONS_FIELD);
        assert_eq!(
            got.as_object().unwrap().keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            expected_keys
        );
        assert_eq!(got["inspections"].as_array().unwrap().len(), 1);
        assert_eq!(got["inspections"][0]["id"], json!("1-2015-ENFO"));

        let lonely = embed_restaurant(&restaurant(R2, json!(5)), &index, RatingPolicy::Reject).unwrap();
        assert_eq!(lonely["inspections"], json!([]));
    }

    #[test]
    fn test_embed_restaurant_ratings() {
        let index = InspectionIndex::default();

        let got = embed_restaurant(&restaurant(R1, json!("4")), &index, RatingPolicy::Reject).unwrap();
        assert_eq!(got["rating"], json!(4));

        let err = embed_restaurant(&restaurant(R1, json!(7)), &index, RatingPolicy::Reject).unwrap_err();
        assert_eq!(err, FailureReason::Rejected("rating 7 is outside 0..=6".into()));

        let clamped = embed_restaurant(&restaurant(R1, json!(7)), &index, RatingPolicy::Clamp).unwrap();
        assert_eq!(clamped["rating"], json!(6));

        let mut unrated = restaurant(R1, json!(0));
        unrated.as_object_mut().unwrap().remove("rating");
        let got = embed_restaurant(&unrated, &index, RatingPolicy::Reject).unwrap();
        assert!(got.get("rating").is_none());

        assert_eq!(
            embed_restaurant(&json!("x"), &index, RatingPolicy::Reject),
            Err(FailureReason::NotAnObject)
        );
    }

    #[test]
    fn test_string_restaurant_id_matches_nothing() {
        let inspections = vec![inspection(1, json!(R1))];
        let index = InspectionIndex::build(inspections.iter());
        let mut r = restaurant(R1, json!(5));
        r["_id"] = json!(R1);
        let got = embed_restaurant(&r, &index, RatingPolicy::Reject).unwrap();
        assert_eq!(got["inspections"], json!([]));
    }
}
