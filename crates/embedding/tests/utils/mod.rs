#![allow(dead_code)]
use anyhow::Result;
use serde_json::Value;

use hygiene_datastore::{Database, FailurePolicy, ObjectId};
use hygiene_embedding::{Inspection, InspectionResult, Restaurant};

pub fn open_store() -> Result<(tempfile::TempDir, Database)> {
    hygiene_logging::log_to_stderr();
    let tdir = tempfile::TempDir::new()?;
    let db = Database::open(tdir.path())?;
    Ok((tdir, db))
}

pub fn restaurant_id(n: u8) -> ObjectId {
    let mut bytes = [0x55, 0xf1, 0x43, 0x12, 0xc7, 0x44, 0x7c, 0x3d, 0xa7, 0x05, 0x1b, 0];
    bytes[11] = n;
    ObjectId::from_bytes(bytes)
}

pub fn inspection_id(n: u16) -> ObjectId {
    let mut bytes = [0x56, 0xd6, 0x10, 0x33, 0xa3, 0x78, 0xec, 0xcd, 0xe8, 0xa8, 0, 0];
    bytes[10..].copy_from_slice(&n.to_be_bytes());
    ObjectId::from_bytes(bytes)
}

pub fn restaurant(n: u8, type_of_food: &str, rating: i64) -> Restaurant {
    Restaurant {
        id: restaurant_id(n),
        url: format!("http://www.just-eat.co.uk/restaurants-{}/menu", n),
        address: format!("{} High Street", n),
        address_line_2: Some("London".to_string()),
        name: format!("Restaurant {}", n),
        outcode: "SE1".to_string(),
        postcode: format!("{}AA", n % 10),
        rating,
        type_of_food: type_of_food.to_string(),
    }
}

pub fn inspection(n: u16, restaurant: &ObjectId, result: InspectionResult, date: &str) -> Inspection {
    Inspection {
        object_id: inspection_id(n),
        id: format!("{}-2015-ENFO", 10000 + n as u32),
        certificate_number: 9_000_000 + n as i64,
        date: date.to_string(),
        result,
        sector: "Cigarette Retail Dealer - 127".to_string(),
        restaurant_id: restaurant.to_hex(),
    }
}

pub fn to_values<T: serde::Serialize>(items: &[T]) -> Result<Vec<Value>> {
    Ok(items
        .iter()
        .map(serde_json::to_value)
        .collect::<serde_json::Result<Vec<_>>>()?)
}

/// Write raw source documents, committing.
pub fn seed_raw(db: &mut Database, restaurants: &[Value], inspections: &[Value]) -> Result<()> {
    let mut tx = db.transaction()?;
    tx.insert_many("restaurants", restaurants, FailurePolicy::Abort)?;
    tx.insert_many("inspections", inspections, FailurePolicy::Abort)?;
    tx.commit()?;
    Ok(())
}

pub fn seed(db: &mut Database, restaurants: &[Restaurant], inspections: &[Inspection]) -> Result<()> {
    seed_raw(db, &to_values(restaurants)?, &to_values(inspections)?)
}

pub fn load(db: &mut Database, collection: &str) -> Result<Vec<Value>> {
    let mut docs = vec![];
    db.transaction()?.load_collection(collection, |d: Value| {
        docs.push(d);
        Ok(())
    })?;
    Ok(docs)
}
