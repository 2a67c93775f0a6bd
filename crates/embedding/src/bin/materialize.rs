//! Import restaurants and inspections, then materialize the embedded collection.
use std::path::PathBuf;

use anyhow::Result;
use structopt::StructOpt;

use hygiene_datastore::{Database, FailurePolicy, ValidationAction};
use hygiene_embedding::{
    import, materialize, reports, InspectionResult, MaterializerConfigBuilder, RatingPolicy,
};

#[derive(StructOpt)]
struct Params {
    /// Directory holding the document store.
    database: PathBuf,
    /// Restaurants to import first, as exported JSON.
    restaurants: Option<PathBuf>,
    /// Inspections to import first, as exported JSON.
    inspections: Option<PathBuf>,

    /// Skip and report documents which can't be written instead of aborting.
    #[structopt(long = "--skip-failures")]
    skip_failures: bool,
    /// Clamp out-of-range ratings instead of rejecting the restaurant.
    #[structopt(long = "--clamp-ratings")]
    clamp_ratings: bool,
    /// Attach the validator with the warn action.
    #[structopt(long = "--warn")]
    warn: bool,
    /// Attach the validator only after the initial insert.
    #[structopt(long = "--attach-after")]
    attach_after: bool,
    /// Empty the destination first.
    #[structopt(long = "--clear")]
    clear: bool,
    /// Log the report queries afterwards.
    #[structopt(long = "--reports")]
    reports: bool,
}

fn main() -> Result<()> {
    hygiene_logging::log_to_stderr();
    let params = Params::from_args();

    let policy = if params.skip_failures {
        FailurePolicy::SkipAndReport
    } else {
        FailurePolicy::Abort
    };

    let mut db = Database::open(&params.database)?;

    if let (Some(restaurants), Some(inspections)) = (params.restaurants.as_ref(), params.inspections.as_ref()) {
        let mut tx = db.transaction()?;
        import::import_file(&mut tx, "restaurants", restaurants, policy)?;
        import::import_file(&mut tx, "inspections", inspections, policy)?;
        tx.commit()?;
    } else if params.restaurants.is_some() {
        anyhow::bail!("Restaurants and inspections must be imported together");
    }

    let config = MaterializerConfigBuilder::default()
        .failure_policy(policy)
        .rating_policy(if params.clamp_ratings {
            RatingPolicy::Clamp
        } else {
            RatingPolicy::Reject
        })
        .validation_action(if params.warn {
            ValidationAction::Warn
        } else {
            ValidationAction::Error
        })
        .attach_validator_first(!params.attach_after)
        .clear_destination(params.clear)
        .build()?;

    let report = materialize(&mut db, &config)?;
    log::info!(
        "Read {} restaurants and {} inspections, wrote {}",
        report.restaurants_read,
        report.inspections_read,
        report.inserted()
    );
    for f in report.failures.iter() {
        log::warn!("Not written: restaurant {}", f);
    }

    if params.reports {
        log_reports(&mut db, config.get_destination())?;
    }

    Ok(())
}

fn log_reports(db: &mut Database, destination: &str) -> Result<()> {
    let tx = db.transaction()?;
    reports::create_report_indexes(&tx, destination)?;

    for t in reports::most_inspected(&tx, "inspections", 10)? {
        log::info!("Inspected {} times: {}", t.count, t.restaurant_id);
    }
    for s in reports::result_breakdown(&tx, "inspections")? {
        log::info!("{}: {} ({:.2}%)", s.result, s.count, s.percentage);
    }
    for r in reports::average_rating_by_food_type(&tx, destination)? {
        log::info!(
            "{}: {} restaurants, average rating {:?}",
            r.type_of_food,
            r.restaurants,
            r.average_rating
        );
    }

    let passed = reports::with_inspection_result(&tx, destination, InspectionResult::Pass)?;
    log::info!("{} restaurants passed at least one inspection", passed.len());

    let plans = reports::explain_report_queries(&tx, destination, "Chinese", 5, InspectionResult::Pass)?;
    log::info!("Plan by food type: {}", plans.by_food_type.join("; "));
    log::info!("Plan rated at least 5: {}", plans.rated_at_least.join("; "));
    log::info!(
        "Plan with a passed inspection: {}",
        plans.with_inspection_result.join("; ")
    );

    tx.commit()?;
    Ok(())
}
