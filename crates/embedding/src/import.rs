//! Loading source collections from exported JSON.
//!
//! Two layouts are accepted: one document per line, as `mongoexport` writes by default, or a single top-level array as
//! it writes with `--jsonArray`.  Blank lines are skipped.
use std::io::BufRead;
use std::path::Path;

use log::*;
use serde_json::Value;

use hygiene_datastore::{FailurePolicy, InsertReport, Transaction};

use crate::errors::*;

fn parse(text: &str, line: usize) -> Result<Value> {
    serde_json::from_str(text).map_err(|source| Error::InvalidJson { line, source })
}

pub fn read_documents(reader: impl BufRead) -> Result<Vec<Value>> {
    let mut lines = vec![];
    for l in reader.lines() {
        lines.push(l?);
    }

    let first = lines.iter().position(|l| !l.trim().is_empty());
    let first = match first {
        Some(f) => f,
        None => return Ok(vec![]),
    };

    if lines[first].trim_start().starts_with('[') {
        let whole = lines[first..].join("\n");
        return match parse(&whole, first + 1)? {
            Value::Array(docs) => Ok(docs),
            other => Ok(vec![other]),
        };
    }

    let mut docs = vec![];
    for (i, l) in lines.iter().enumerate().skip(first) {
        if l.trim().is_empty() {
            continue;
        }
        docs.push(parse(l, i + 1)?);
    }
    Ok(docs)
}

/// Insert every document in the file into `collection`.
pub fn import_file(
    tx: &mut Transaction,
    collection: &str,
    path: &Path,
    policy: FailurePolicy,
) -> Result<InsertReport> {
    let file = std::fs::File::open(path)?;
    let docs = read_documents(std::io::BufReader::new(file))?;
    let report = match tx.insert_many(collection, &docs, policy) {
        Ok(r) => r,
        Err(hygiene_datastore::Error::BatchAborted(f)) => return Err(Error::Aborted(f)),
        Err(e) => return Err(e.into()),
    };

    info!(
        "Imported {} of {} documents from {} into {}",
        report.inserted(),
        docs.len(),
        path.display(),
        collection
    );
    Ok(report)
}
