//! Restaurants, inspections, and the embedded form combining them.
//!
//! The materializer itself works on raw documents so that missing fields stay missing; these types describe the
//! well-formed shapes and are what the reports hand back for the embedded collection.
use serde::{Deserialize, Serialize};

use hygiene_datastore::ObjectId;

/// Fields of a restaurant which are copied into the embedded document.
pub const RESTAURANT_FIELDS: [&str; 9] = [
    "_id",
    "URL",
    "address",
    "address_line_2",
    "name",
    "outcode",
    "postcode",
    "rating",
    "type_of_food",
];

/// Fields of an inspection which are copied into the embedded document.
pub const INSPECTION_FIELDS: [&str; 6] = ["_id", "id", "certificate_number", "date", "result", "sector"];

/// Field of an inspection naming its restaurant.
pub const FOREIGN_KEY_FIELD: &str = "restaurant_id";

/// Field of an embedded restaurant holding its inspections.
pub const INSPECTIONS_FIELD: &str = "inspections";

pub const MIN_RATING: i64 = 0;
pub const MAX_RATING: i64 = 6;

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum InspectionResult {
    Pass,
    Fail,
    #[serde(rename = "Warning Issued")]
    WarningIssued,
    #[serde(rename = "Violation Issued")]
    ViolationIssued,
    #[serde(rename = "No Violation Issued")]
    NoViolationIssued,
}

impl InspectionResult {
    pub const ALL: [InspectionResult; 5] = [
        InspectionResult::Pass,
        InspectionResult::Fail,
        InspectionResult::WarningIssued,
        InspectionResult::ViolationIssued,
        InspectionResult::NoViolationIssued,
    ];

    /// The literal stored in documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionResult::Pass => "Pass",
            InspectionResult::Fail => "Fail",
            InspectionResult::WarningIssued => "Warning Issued",
            InspectionResult::ViolationIssued => "Violation Issued",
            InspectionResult::NoViolationIssued => "No Violation Issued",
        }
    }
}

impl std::fmt::Display for InspectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "URL")]
    pub url: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub name: String,
    pub outcode: String,
    pub postcode: String,
    pub rating: i64,
    pub type_of_food: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    #[serde(rename = "_id")]
    pub object_id: ObjectId,
    /// The inspection's external identifier.
    pub id: String,
    pub certificate_number: i64,
    /// `Mon D YYYY`.
    pub date: String,
    pub result: InspectionResult,
    pub sector: String,
    /// Hex form of the restaurant's `_id`.
    pub restaurant_id: String,
}

/// An inspection as copied into its restaurant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedInspection {
    #[serde(rename = "_id")]
    pub object_id: ObjectId,
    pub id: String,
    pub certificate_number: i64,
    pub date: String,
    pub result: InspectionResult,
    pub sector: String,
}

impl From<&Inspection> for EmbeddedInspection {
    fn from(i: &Inspection) -> EmbeddedInspection {
        EmbeddedInspection {
            object_id: i.object_id,
            id: i.id.clone(),
            certificate_number: i.certificate_number,
            date: i.date.clone(),
            result: i.result,
            sector: i.sector.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedRestaurant {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "URL")]
    pub url: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub name: String,
    pub outcode: String,
    pub postcode: String,
    pub rating: i64,
    pub type_of_food: String,
    pub inspections: Vec<EmbeddedInspection>,
}

impl EmbeddedRestaurant {
    pub fn new(restaurant: Restaurant, inspections: Vec<EmbeddedInspection>) -> EmbeddedRestaurant {
        EmbeddedRestaurant {
            id: restaurant.id,
            url: restaurant.url,
            address: restaurant.address,
            address_line_2: restaurant.address_line_2,
            name: restaurant.name,
            outcode: restaurant.outcode,
            postcode: restaurant.postcode,
            rating: restaurant.rating,
            type_of_food: restaurant.type_of_food,
            inspections,
        }
    }
}

/// Parse an inspection date of the form `Jan 5 2020`.
pub fn parse_inspection_date(text: &str) -> Option<time::Date> {
    let mut parts = text.split(' ');
    let month = match parts.next()? {
        "Jan" => time::Month::January,
        "Feb" => time::Month::February,
        "Mar" => time::Month::March,
        "Apr" => time::Month::April,
        "May" => time::Month::May,
        "Jun" => time::Month::June,
        "Jul" => time::Month::July,
        "Aug" => time::Month::August,
        "Sep" => time::Month::September,
        "Oct" => time::Month::October,
        "Nov" => time::Month::November,
        "Dec" => time::Month::December,
        _ => return None,
    };

    let day = parts.next()?;
    let year = parts.next()?;
    if parts.next().is_some() || day.len() > 2 || year.len() != 4 {
        return None;
    }

    time::Date::from_calendar_date(year.parse().ok()?, month, day.parse().ok()?).ok()
}
