use hygiene_datastore::{FailurePolicy, ValidationAction};

use crate::coercion::RatingPolicy;

pub const DEFAULT_RESTAURANTS: &str = "restaurants";
pub const DEFAULT_INSPECTIONS: &str = "inspections";
pub const DEFAULT_DESTINATION: &str = "restaurants_with_inspections";

#[derive(Clone, Debug, derive_builder::Builder)]
pub struct MaterializerConfig {
    #[builder(default = "DEFAULT_RESTAURANTS.to_string()", setter(into))]
    restaurants: String,

    #[builder(default = "DEFAULT_INSPECTIONS.to_string()", setter(into))]
    inspections: String,

    #[builder(default = "DEFAULT_DESTINATION.to_string()", setter(into))]
    destination: String,

    /// What the bulk insert does with a document that can't be written.
    #[builder(default = "Default::default()")]
    failure_policy: FailurePolicy,

    #[builder(default = "Default::default()")]
    rating_policy: RatingPolicy,

    /// Action of the validator attached to the destination.
    #[builder(default = "Default::default()")]
    validation_action: ValidationAction,

    /// Attach the validator before inserting, so that the initial batch is validated too.
    ///
    /// When false the validator is attached after the insert and only governs later writes.
    #[builder(default = "true")]
    attach_validator_first: bool,

    /// Empty the destination before inserting.  Without this, running twice collides on every `_id`.
    #[builder(default = "false")]
    clear_destination: bool,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        MaterializerConfig {
            restaurants: DEFAULT_RESTAURANTS.to_string(),
            inspections: DEFAULT_INSPECTIONS.to_string(),
            destination: DEFAULT_DESTINATION.to_string(),
            failure_policy: Default::default(),
            rating_policy: Default::default(),
            validation_action: Default::default(),
            attach_validator_first: true,
            clear_destination: false,
        }
    }
}

impl MaterializerConfig {
    pub fn get_restaurants(&self) -> &str {
        &self.restaurants
    }

    pub fn get_inspections(&self) -> &str {
        &self.inspections
    }

    pub fn get_destination(&self) -> &str {
        &self.destination
    }

    pub fn get_failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn get_rating_policy(&self) -> RatingPolicy {
        self.rating_policy
    }

    pub fn get_validation_action(&self) -> ValidationAction {
        self.validation_action
    }

    pub fn get_attach_validator_first(&self) -> bool {
        self.attach_validator_first
    }

    pub fn get_clear_destination(&self) -> bool {
        self.clear_destination
    }
}
