//! Report queries over a small materialized dataset.
mod utils;

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use hygiene_datastore::{Database, ValidationAction};
use hygiene_embedding::reports::*;
use hygiene_embedding::*;

use utils::*;

const DESTINATION: &str = "restaurants_with_inspections";

fn build() -> Result<(tempfile::TempDir, Database)> {
    let (tdir, mut db) = open_store()?;
    let restaurants = vec![
        restaurant(1, "Chinese", 5),
        restaurant(2, "Pizza", 2),
        restaurant(3, "Chinese", 6),
        restaurant(4, "Curry", 4),
    ];
    let (r1, r2, r3) = (restaurant_id(1), restaurant_id(2), restaurant_id(3));
    let inspections = vec![
        inspection(1, &r1, InspectionResult::Pass, "Feb 10 2015"),
        inspection(2, &r3, InspectionResult::ViolationIssued, "Jan 5 2016"),
        inspection(3, &r3, InspectionResult::ViolationIssued, "Mar 1 2014"),
        inspection(4, &r3, InspectionResult::Pass, "Dec 31 2015"),
        inspection(5, &r2, InspectionResult::ViolationIssued, "Dec 31 2015"),
        inspection(6, &r1, InspectionResult::Fail, "Jul 4 2015"),
    ];
    seed(&mut db, &restaurants, &inspections)?;
    materialize(&mut db, &MaterializerConfig::default())?;
    Ok((tdir, db))
}

fn names(docs: &[Value]) -> Vec<&str> {
    docs.iter().map(|d| d["name"].as_str().unwrap()).collect()
}

#[test]
fn test_most_inspected() -> Result<()> {
    let (_tdir, mut db) = build()?;
    let tx = db.transaction()?;
    assert_eq!(
        most_inspected(&tx, "inspections", 2)?,
        vec![
            InspectionTally {
                restaurant_id: json!(restaurant_id(3).to_hex()),
                count: 3
            },
            InspectionTally {
                restaurant_id: json!(restaurant_id(1).to_hex()),
                count: 2
            },
        ]
    );
    assert_eq!(most_inspected(&tx, "inspections", 10)?.len(), 3);
    Ok(())
}

#[test]
fn test_lookups() -> Result<()> {
    let (_tdir, mut db) = build()?;
    let tx = db.transaction()?;

    let chinese = restaurants_by_food_type(&tx, "restaurants", "Chinese")?;
    assert_eq!(names(&chinese), vec!["Restaurant 1", "Restaurant 3"]);
    assert!(restaurants_by_food_type(&tx, "restaurants", "Sushi")?.is_empty());

    let good = rated_above(&tx, DESTINATION, 4)?;
    assert_eq!(names(&good), vec!["Restaurant 1", "Restaurant 3"]);
    assert_eq!(rated_above(&tx, DESTINATION, 6)?.len(), 0);
    Ok(())
}

#[test]
fn test_violations_are_chronological() -> Result<()> {
    let (_tdir, mut db) = build()?;
    {
        let mut tx = db.transaction()?;
        let odd = serde_json::to_value(inspection(
            7,
            &restaurant_id(4),
            InspectionResult::ViolationIssued,
            "sometime",
        ))?;
        tx.insert_one("inspections", &odd)?;
        tx.commit()?;
    }

    let tx = db.transaction()?;
    let dates = violations_by_date(&tx, "inspections")?
        .iter()
        .map(|i| i["date"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    // Calendar order, not string order.
    assert_eq!(
        dates,
        vec!["Mar 1 2014", "Dec 31 2015", "Jan 5 2016", "sometime"]
    );
    Ok(())
}

#[test]
fn test_aggregates() -> Result<()> {
    let (_tdir, mut db) = build()?;
    let tx = db.transaction()?;

    assert_eq!(
        average_rating_by_food_type(&tx, DESTINATION)?,
        vec![
            FoodTypeRating {
                type_of_food: json!("Chinese"),
                average_rating: Some(5.5),
                restaurants: 2
            },
            FoodTypeRating {
                type_of_food: json!("Curry"),
                average_rating: Some(4.0),
                restaurants: 1
            },
            FoodTypeRating {
                type_of_food: json!("Pizza"),
                average_rating: Some(2.0),
                restaurants: 1
            },
        ]
    );

    let breakdown = result_breakdown(&tx, "inspections")?;
    assert_eq!(
        breakdown.iter().map(|s| (s.result.clone(), s.count)).collect::<Vec<_>>(),
        vec![
            (json!("Violation Issued"), 3),
            (json!("Pass"), 2),
            (json!("Fail"), 1)
        ]
    );
    assert!((breakdown[0].percentage - 50.0).abs() < 1e-9);
    let total: f64 = breakdown.iter().map(|s| s.percentage).sum();
    assert!((total - 100.0).abs() < 1e-9);

    assert_eq!(
        count_by_food_type(&tx, "restaurants")?,
        vec![
            FoodTypeCount {
                type_of_food: json!("Chinese"),
                count: 2
            },
            FoodTypeCount {
                type_of_food: json!("Curry"),
                count: 1
            },
            FoodTypeCount {
                type_of_food: json!("Pizza"),
                count: 1
            },
        ]
    );
    Ok(())
}

#[test]
fn test_with_inspection_result() -> Result<()> {
    let (_tdir, mut db) = build()?;
    let tx = db.transaction()?;

    let failed = with_inspection_result(&tx, DESTINATION, InspectionResult::Fail)?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, restaurant_id(1));
    assert_eq!(failed[0].inspections.len(), 2);

    let violated = with_inspection_result(&tx, DESTINATION, InspectionResult::ViolationIssued)?;
    assert_eq!(
        violated.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![restaurant_id(2), restaurant_id(3)]
    );
    assert!(with_inspection_result(&tx, DESTINATION, InspectionResult::NoViolationIssued)?.is_empty());
    Ok(())
}

#[test]
fn test_with_inspection_result_skips_malformed() -> Result<()> {
    let (_tdir, mut db) = open_store()?;
    let mut raw = to_values(&[restaurant(1, "Thai", 2), restaurant(2, "Thai", 3)])?;
    raw[0].as_object_mut().unwrap().remove("postcode");
    let inspections = to_values(&[
        inspection(1, &restaurant_id(1), InspectionResult::Pass, "Feb 10 2015"),
        inspection(2, &restaurant_id(2), InspectionResult::Pass, "Feb 11 2015"),
    ])?;
    seed_raw(&mut db, &raw, &inspections)?;

    let config = MaterializerConfigBuilder::default()
        .validation_action(ValidationAction::Warn)
        .build()?;
    assert_eq!(materialize(&mut db, &config)?.inserted(), 2);

    let tx = db.transaction()?;
    let passed = with_inspection_result(&tx, DESTINATION, InspectionResult::Pass)?;
    assert_eq!(
        passed.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![restaurant_id(2)]
    );

    // Same answer through the element index.
    create_report_indexes(&tx, DESTINATION)?;
    let passed = with_inspection_result(&tx, DESTINATION, InspectionResult::Pass)?;
    assert_eq!(
        passed.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![restaurant_id(2)]
    );
    Ok(())
}

#[test]
fn test_report_indexes() -> Result<()> {
    let (_tdir, mut db) = build()?;
    let tx = db.transaction()?;

    let result_index = format!("index.{}.inspections.result", DESTINATION);
    let before = explain_report_queries(&tx, DESTINATION, "Chinese", 5, InspectionResult::Pass)?;
    assert!(
        before.by_food_type.iter().all(|l| !l.contains("USING INDEX")),
        "{:?}",
        before
    );
    assert!(
        before.with_inspection_result.iter().all(|l| !l.contains(&result_index)),
        "{:?}",
        before
    );

    assert_eq!(
        create_report_indexes(&tx, DESTINATION)?,
        vec![
            format!("{}.type_of_food", DESTINATION),
            format!("{}.rating", DESTINATION),
            format!("{}.inspections.result", DESTINATION)
        ]
    );
    assert_eq!(
        tx.list_indexes(DESTINATION)?,
        vec![
            "inspections.result".to_string(),
            "rating".to_string(),
            "type_of_food".to_string()
        ]
    );

    let after = explain_report_queries(&tx, DESTINATION, "Chinese", 5, InspectionResult::Pass)?;
    assert!(
        after.by_food_type.iter().any(|l| l.contains("USING INDEX")),
        "{:?}",
        after
    );
    assert!(!after.rated_at_least.is_empty());
    assert!(
        after.with_inspection_result.iter().any(|l| l.contains(&result_index)),
        "{:?}",
        after
    );

    // Indexes don't change answers.
    assert_eq!(names(&rated_above(&tx, DESTINATION, 4)?), vec!["Restaurant 1", "Restaurant 3"]);
    let violated = with_inspection_result(&tx, DESTINATION, InspectionResult::ViolationIssued)?;
    assert_eq!(
        violated.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![restaurant_id(2), restaurant_id(3)]
    );
    Ok(())
}
