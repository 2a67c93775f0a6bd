//! Reporting queries over the source and embedded collections.
//!
//! The embedded collection may hold documents the validator never saw, or only warned about, so reports which
//! deserialize it skip what doesn't fit rather than failing.
use std::cmp::Reverse;

use log::*;
use serde_json::Value;

use hygiene_datastore::{Filter, FindOptions, SortOrder, Transaction};

use crate::errors::*;
use crate::models::*;

/// Paths of the embedded collection which reports look up by.  `inspections.result` is an element index.
pub const REPORT_INDEX_PATHS: [&str; 3] = ["type_of_food", "rating", "inspections.result"];

#[derive(Clone, Debug, PartialEq)]
pub struct InspectionTally {
    /// The foreign key as stored on the inspections.
    pub restaurant_id: Value,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FoodTypeRating {
    pub type_of_food: Value,
    /// `None` if no restaurant of this type has a numeric rating.
    pub average_rating: Option<f64>,
    pub restaurants: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResultShare {
    pub result: Value,
    pub count: u64,
    /// Share of all inspections, from 0 to 100.
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FoodTypeCount {
    pub type_of_food: Value,
    pub count: u64,
}

/// Query plans of the embedded-collection lookups, each of which can use one of [create_report_indexes].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportPlans {
    pub by_food_type: Vec<String>,
    pub rated_at_least: Vec<String>,
    pub with_inspection_result: Vec<String>,
}

/// Restaurants with the most inspections, most first.  Ties keep key order.
pub fn most_inspected(tx: &Transaction, inspections: &str, limit: usize) -> Result<Vec<InspectionTally>> {
    let mut groups = tx.group_count(inspections, FOREIGN_KEY_FIELD)?;
    groups.sort_by_key(|g| Reverse(g.count));
    Ok(groups
        .into_iter()
        .take(limit)
        .map(|g| InspectionTally {
            restaurant_id: g.key,
            count: g.count,
        })
        .collect())
}

pub fn restaurants_by_food_type(tx: &Transaction, restaurants: &str, type_of_food: &str) -> Result<Vec<Value>> {
    Ok(tx.find(
        restaurants,
        &FindOptions::filtered(Filter::eq("type_of_food", type_of_food)),
    )?)
}

/// Inspections which issued a violation, oldest first.  Dates which don't parse sort last.
pub fn violations_by_date(tx: &Transaction, inspections: &str) -> Result<Vec<Value>> {
    let mut found = tx.find(
        inspections,
        &FindOptions::filtered(Filter::eq(
            "result",
            InspectionResult::ViolationIssued.as_str(),
        )),
    )?;

    found.sort_by_key(|i| {
        let date = i.get("date").and_then(Value::as_str).and_then(parse_inspection_date);
        (date.is_none(), date)
    });
    Ok(found)
}

/// Restaurants rated strictly above `threshold`.  Ratings which aren't numbers never qualify.
pub fn rated_above(tx: &Transaction, restaurants: &str, threshold: i64) -> Result<Vec<Value>> {
    Ok(tx.find(
        restaurants,
        &FindOptions::filtered(Filter::gt("rating", threshold)),
    )?)
}

pub fn average_rating_by_food_type(tx: &Transaction, restaurants: &str) -> Result<Vec<FoodTypeRating>> {
    Ok(tx
        .group_average(restaurants, "type_of_food", "rating")?
        .into_iter()
        .map(|g| FoodTypeRating {
            type_of_food: g.key,
            average_rating: g.average,
            restaurants: g.count,
        })
        .collect())
}

/// Inspections per result, most common first.
pub fn result_breakdown(tx: &Transaction, inspections: &str) -> Result<Vec<ResultShare>> {
    let mut groups = tx.group_count(inspections, "result")?;
    let total: u64 = groups.iter().map(|g| g.count).sum();
    groups.sort_by_key(|g| Reverse(g.count));

    Ok(groups
        .into_iter()
        .map(|g| ResultShare {
            percentage: 100.0 * g.count as f64 / total as f64,
            result: g.key,
            count: g.count,
        })
        .collect())
}

/// Restaurants per food type, most common first.
pub fn count_by_food_type(tx: &Transaction, restaurants: &str) -> Result<Vec<FoodTypeCount>> {
    let mut groups = tx.group_count(restaurants, "type_of_food")?;
    groups.sort_by_key(|g| Reverse(g.count));
    Ok(groups
        .into_iter()
        .map(|g| FoodTypeCount {
            type_of_food: g.key,
            count: g.count,
        })
        .collect())
}

/// Embedded restaurants with at least one inspection of the given result.
///
/// Matching documents which don't have the embedded shape are logged and left out.
pub fn with_inspection_result(
    tx: &Transaction,
    embedded: &str,
    result: InspectionResult,
) -> Result<Vec<EmbeddedRestaurant>> {
    let found = tx.find(
        embedded,
        &FindOptions::filtered(Filter::element_eq(
            INSPECTIONS_FIELD,
            "result",
            result.as_str(),
        )),
    )?;

    Ok(found
        .into_iter()
        .filter_map(|doc| {
            let id = doc.get("_id").cloned().unwrap_or(Value::Null);
            serde_json::from_value::<EmbeddedRestaurant>(doc)
                .map_err(|e| warn!("{}: skipping malformed restaurant {}: {}", embedded, id, e))
                .ok()
        })
        .collect())
}

/// Index the embedded collection for the lookups above, returning the index names.
pub fn create_report_indexes(tx: &Transaction, embedded: &str) -> Result<Vec<String>> {
    REPORT_INDEX_PATHS
        .iter()
        .map(|p| -> Result<String> { Ok(tx.create_index(embedded, p)?) })
        .collect()
}

pub fn explain_report_queries(
    tx: &Transaction,
    embedded: &str,
    type_of_food: &str,
    min_rating: i64,
    result: InspectionResult,
) -> Result<ReportPlans> {
    Ok(ReportPlans {
        by_food_type: tx.explain_find(
            embedded,
            &FindOptions::filtered(Filter::eq("type_of_food", type_of_food)),
        )?,
        rated_at_least: tx.explain_find(
            embedded,
            &FindOptions::filtered(Filter::gte("rating", min_rating))
                .sorted_by("rating", SortOrder::Descending),
        )?,
        with_inspection_result: tx.explain_find(
            embedded,
            &FindOptions::filtered(Filter::element_eq(
                INSPECTIONS_FIELD,
                "result",
                result.as_str(),
            )),
        )?,
    })
}
