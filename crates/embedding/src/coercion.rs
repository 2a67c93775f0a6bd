//! Conversions applied while joining: foreign keys to ids, and ratings to integers.
use serde_json::Value;

use hygiene_datastore::ObjectId;

use crate::models::{MAX_RATING, MIN_RATING};

/// Convert an inspection's foreign key to the id of the restaurant it refers to.
///
/// The key is normally the hex form of the id as a string, but an id already in extended-JSON form is taken as is.
/// Anything else, including a missing key, refers to nothing.
pub fn coerce_foreign_key(value: Option<&Value>) -> Option<ObjectId> {
    value.and_then(ObjectId::from_json)
}

/// The id restaurants are joined on.  Only a real ObjectId counts: a restaurant whose `_id` is a plain string, like
/// `"R1"`, can't be referred to by a coerced foreign key.  It gets no inspections and then fails the validator's
/// `objectId` rule on `_id` (see "Restaurant ids that aren't ObjectIds" in DESIGN.md).
pub fn restaurant_key(restaurant: &Value) -> Option<ObjectId> {
    restaurant.get("_id").and_then(ObjectId::from_extended_json)
}

/// What to do with a whole-number rating outside `MIN_RATING..=MAX_RATING`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RatingPolicy {
    /// Fail the restaurant.
    #[default]
    Reject,
    /// Pull it into range.
    Clamp,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RatingError {
    #[error("rating {0} is not a whole number")]
    NotWhole(Value),

    #[error("rating {0} is outside {}..={}", MIN_RATING, MAX_RATING)]
    OutOfRange(i64),
}

/// Convert a source rating to an integer.
///
/// Integers pass through; integral floats and strings holding an integer are converted.  Anything else can't be
/// rated, whatever the policy.
pub fn normalize_rating(value: &Value, policy: RatingPolicy) -> Result<i64, RatingError> {
    let whole = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| RatingError::NotWhole(value.clone()))?;

    if (MIN_RATING..=MAX_RATING).contains(&whole) {
        return Ok(whole);
    }

    match policy {
        RatingPolicy::Reject => Err(RatingError::OutOfRange(whole)),
        RatingPolicy::Clamp => Ok(whole.clamp(MIN_RATING, MAX_RATING)),
    }
}
