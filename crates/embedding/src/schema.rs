//! The validator attached to the embedded collection.
use hygiene_datastore::{BsonType, SchemaNode, ValidationAction, Validator};

use crate::errors::*;
use crate::models::*;

pub const URL_PATTERN: &str = r"^https?://.*";
/// ASCII digits only: `\d` would also take digits from other scripts.
pub const DATE_PATTERN: &str = r"^(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec) [0-9]{1,2} [0-9]{4}$";

/// Top-level fields every embedded restaurant must have.  `address_line_2` is checked only when present.
pub const REQUIRED_RESTAURANT_FIELDS: [&str; 9] = [
    "_id",
    "URL",
    "address",
    "name",
    "outcode",
    "postcode",
    "rating",
    "type_of_food",
    INSPECTIONS_FIELD,
];

fn string(description: &str) -> SchemaNode {
    SchemaNode::typed(BsonType::String).describe(description)
}

pub fn embedded_inspection_schema() -> SchemaNode {
    SchemaNode::object()
        .require(INSPECTION_FIELDS)
        .property("_id", SchemaNode::typed(BsonType::ObjectId))
        .property("id", string("Inspection identifier"))
        .property(
            "certificate_number",
            SchemaNode::typed(BsonType::Int).describe("Certificate number"),
        )
        .property(
            "date",
            string("Date as 'Mon D YYYY'").pattern(DATE_PATTERN),
        )
        .property(
            "result",
            string("Outcome of the inspection")
                .one_of(InspectionResult::ALL.iter().map(|r| r.as_str())),
        )
        .property("sector", string("Sector of the inspected business"))
}

pub fn embedded_restaurant_schema() -> SchemaNode {
    SchemaNode::object()
        .require(REQUIRED_RESTAURANT_FIELDS)
        .property("_id", SchemaNode::typed(BsonType::ObjectId))
        .property("URL", string("Must be a valid URL").pattern(URL_PATTERN))
        .property("address", string("Street address"))
        .property("address_line_2", string("Second address line"))
        .property("name", string("Business name"))
        .property("outcode", string("Outward part of the postcode"))
        .property("postcode", string("Postcode"))
        .property(
            "rating",
            SchemaNode::typed(BsonType::Int)
                .range(MIN_RATING as f64, MAX_RATING as f64)
                .describe("Rating from 0 to 6"),
        )
        .property("type_of_food", string("Kind of food served"))
        .property(
            INSPECTIONS_FIELD,
            SchemaNode::array_of(embedded_inspection_schema()).describe("Inspections carried out"),
        )
}

pub fn embedded_restaurant_validator(action: ValidationAction) -> Result<Validator> {
    Ok(Validator::new(embedded_restaurant_schema(), action)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use hygiene_datastore::{ObjectId, Violation, ViolationKind};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn valid_document() -> Value {
        json!({
            "_id": ObjectId::new(),
            "URL": "http://www.just-eat.co.uk/restaurants-cn-chinese-cardiff/menu",
            "address": "228 City Road",
            "address_line_2": "Cardiff",
            "name": ".CN Chinese",
            "outcode": "CF24",
            "postcode": "3JH",
            "rating": 5,
            "type_of_food": "Chinese",
            "inspections": [{
                "_id": ObjectId::new(),
                "id": "10021-2015-ENFO",
                "certificate_number": 9278806,
                "date": "Feb 10 2015",
                "result": "No Violation Issued",
                "sector": "Cigarette Retail Dealer - 127",
            }],
        })
    }

    fn violations(doc: &Value) -> Vec<Violation> {
        embedded_restaurant_validator(ValidationAction::Error)
            .unwrap()
            .validate(doc)
    }

    #[test]
    fn test_valid() {
        assert_eq!(violations(&valid_document()), vec![]);

        let mut no_line_2 = valid_document();
        no_line_2.as_object_mut().unwrap().remove("address_line_2");
        no_line_2["inspections"] = json!([]);
        assert_eq!(violations(&no_line_2), vec![]);
    }

    #[test]
    fn test_rating_out_of_range() {
        let mut doc = valid_document();
        doc["rating"] = json!(7);
        assert_eq!(
            violations(&doc),
            vec![Violation {
                path: "rating".into(),
                kind: ViolationKind::AboveMaximum(6.0)
            }]
        );

        doc["rating"] = json!(-1);
        assert_eq!(violations(&doc)[0].kind, ViolationKind::BelowMinimum(0.0));

        doc["rating"] = json!(5.5);
        assert!(matches!(violations(&doc)[0].kind, ViolationKind::WrongType { .. }));
    }

    #[test]
    fn test_every_top_level_field_required() {
        for field in REQUIRED_RESTAURANT_FIELDS {
            let mut doc = valid_document();
            doc.as_object_mut().unwrap().remove(field);
            assert_eq!(
                violations(&doc),
                vec![Violation {
                    path: field.to_string(),
                    kind: ViolationKind::Missing
                }],
                "{}",
                field
            );
        }
    }

    #[test]
    fn test_url_pattern() {
        let mut doc = valid_document();
        doc["URL"] = json!("https://example.com");
        assert!(violations(&doc).is_empty());
        doc["URL"] = json!("ftp://example.com");
        assert_eq!(violations(&doc)[0].path, "URL");
    }

    #[test]
    fn test_inspection_constraints() {
        for field in INSPECTION_FIELDS {
            let mut doc = valid_document();
            doc["inspections"][0].as_object_mut().unwrap().remove(field);
            assert_eq!(
                violations(&doc),
                vec![Violation {
                    path: format!("inspections.0.{}", field),
                    kind: ViolationKind::Missing
                }]
            );
        }

        let mut doc = valid_document();
        doc["inspections"][0]["date"] = json!("2015-02-10");
        doc["inspections"][0]["result"] = json!("Closed");
        let got = violations(&doc);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].path, "inspections.0.date");
        assert_eq!(got[0].kind, ViolationKind::Pattern(DATE_PATTERN.into()));
        assert_eq!(got[1].path, "inspections.0.result");
        assert_eq!(got[1].kind, ViolationKind::NotInEnum);

        for date in ["Jan 5 2020", "Dec 31 1999"] {
            doc["inspections"][0]["date"] = json!(date);
            doc["inspections"][0]["result"] = json!("Pass");
            assert!(violations(&doc).is_empty());
        }
        for date in [
            "Jan 123 2020",
            "jan 5 2020",
            "Jan 5 20201",
            "Jan 5, 2020",
            // Arabic-Indic and fullwidth digits.
            "Jan \u{0665} \u{0662}\u{0660}\u{0662}\u{0660}",
            "Jan 5 \u{FF12}\u{FF10}\u{FF12}\u{FF10}",
        ] {
            doc["inspections"][0]["date"] = json!(date);
            assert_eq!(violations(&doc).len(), 1, "{}", date);
        }
    }

    #[test]
    fn test_id_must_be_object_id() {
        let mut doc = valid_document();
        doc["_id"] = json!("R1");
        assert_eq!(
            violations(&doc),
            vec![Violation {
                path: "_id".into(),
                kind: ViolationKind::WrongType {
                    expected: BsonType::ObjectId,
                    found: BsonType::String
                }
            }]
        );
    }
}
