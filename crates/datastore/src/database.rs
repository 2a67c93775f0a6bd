//! The database wraps a rusqlite connection and provides collections of JSON documents on top of it.
use log::*;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::batch::*;
use crate::errors::*;
use crate::object_id::ObjectId;
use crate::query::*;
use crate::schema::BsonType;
use crate::validator::*;

pub struct Database {
    conn: rusqlite::Connection,
}

/// A transaction like that from rusqlite: drop rolls back, calling commit commits.
pub struct Transaction<'a> {
    transaction: rusqlite::Transaction<'a>,
}

/// Count of documents sharing a grouping key.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupCount {
    pub key: Value,
    pub count: u64,
}

/// Average of a numeric field over documents sharing a grouping key.
///
/// Documents whose field is missing or not a number still count towards `count` but not the average, which is `None`
/// if no document in the group had a number.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupAverage {
    pub key: Value,
    pub average: Option<f64>,
    pub count: u64,
}

/// SQL that we run as part of opening a connection.
///
/// - Sets up WAL.
/// - Enables the busy timeout
/// - Makes sure the WAL file is truncated, since it can grow quite large after a big bulk insert.
/// - Enables foreign key enforcement, which the metadata tables use to follow dropped collections.
/// - Raises the default cache size because the one sqlite sets up for us is only a couple megabytes.
const INITIAL_SQL: &str = r#"
PRAGMA busy_timeout = 1000;
PRAGMA cache_size = -100000;
PRAGMA foreign_keys = 1;
pragma journal_mode = WAL;
PRAGMA wal_autocheckpoint = 10000;
PRAGMA wal_checkpoint(full);
"#;

/// Migrations for the store's own metadata, in the order they must run.  Names must never change once released.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "collections",
        r#"CREATE TABLE collections (
            name TEXT PRIMARY KEY,
            -- Unix timestamp as real seconds.
            created_at REAL NOT NULL
        )"#,
    ),
    (
        "validators",
        r#"CREATE TABLE validators (
            collection TEXT PRIMARY KEY REFERENCES collections(name) ON DELETE CASCADE,
            -- ValidatorDefinition as JSON.
            definition TEXT NOT NULL
        )"#,
    ),
    (
        "indexes",
        r#"CREATE TABLE indexes (
            name TEXT PRIMARY KEY,
            collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
            path TEXT NOT NULL
        )"#,
    ),
    (
        "element_indexes",
        r#"-- The array holding the indexed objects, or NULL for a scalar index.
        ALTER TABLE indexes ADD COLUMN array_path TEXT"#,
    ),
];

const CREATE_COLLECTION_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {{ table }} (
    -- Insertion order, which is the natural order of the collection.
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    -- The document's _id, serialized as JSON.
    id TEXT NOT NULL UNIQUE,
    {{ doc }} TEXT NOT NULL
)
"#;

const CREATE_INDEX_TEMPLATE: &str = r#"
CREATE INDEX IF NOT EXISTS {{ index }} ON {{ table }}({{ expr }})
"#;

/// Side table of an element index.  Rows follow their document out through the foreign key.
const CREATE_ELEMENT_INDEX_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {{ side }} (
    seq INTEGER NOT NULL REFERENCES {{ table }}(seq) ON DELETE CASCADE,
    value NOT NULL,
    PRIMARY KEY (seq, value)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS {{ index }} ON {{ side }}(value);
"#;

/// Fill an element index from `elements`, a `json_each` source whose rows belong to the document at `seq`.
const ELEMENT_VALUES_TEMPLATE: &str = r#"
INSERT OR IGNORE INTO {{ side }}(seq, value)
SELECT s, v FROM (
    SELECT {{ seq }} AS s, CASE WHEN e.type = 'object' THEN json_extract(e.value, '{{ field }}') END AS v
    FROM {{ elements }} AS e
)
WHERE v IS NOT NULL
"#;

fn now_secs() -> f64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

/// Build the identifier of a collection's table.
fn build_table_ident(collection: &str) -> Result<String> {
    check_collection_name(collection)?;
    Ok(format!("`collection.{}`", collection))
}

fn build_index_name(collection: &str, path: &str) -> String {
    format!("{}.{}", collection, path)
}

fn build_element_table_ident(collection: &str, path: &str) -> Result<String> {
    check_collection_name(collection)?;
    json_path(path)?;
    Ok(format!("`elements.{}.{}`", collection, path))
}

/// The value stored in the unique `id` column.
///
/// ObjectIds are keyed by their lowercase hex, so `{"$oid": "55F1..."}` and `{"$oid": "55f1..."}` collide.  Plain
/// strings stay distinct from ObjectIds even if they look like hex.
fn build_id_key(id: &Value) -> Result<String> {
    match ObjectId::from_extended_json(id) {
        Some(oid) => Ok(serde_json::to_string(&oid.to_extended_json())?),
        None => Ok(serde_json::to_string(id)?),
    }
}

/// Render the statement adding element values for `index`.  `seq` and `elements` are SQL fragments.
fn build_element_values(index: &ElementIndex, seq: &str, elements: &str) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("side", &index.table);
    context.insert("seq", seq);
    context.insert("field", &json_path(&index.field)?);
    context.insert("elements", elements);
    Ok(tera::Tera::one_off(ELEMENT_VALUES_TEMPLATE, &context, false)?)
}

/// Run the migrations for a given database, creating the initial migrations infrastructure if necessary.
///
/// Note that the initial migrations table is, in effect, the only thing we can't migrate without a lot of work.
fn run_migrations(conn: &mut rusqlite::Connection) -> Result<()> {
    let transaction = conn.transaction()?;

    transaction.execute(
        r#"CREATE TABLE IF NOT EXISTS migrations (
        -- Name of the migration.
        name TEXT PRIMARY KEY,
        -- The sql run for this migration, which can be useful for debugging.
        sql TEXT NOT NULL,
        -- Unix timestamp as real seconds
        ran_at REAL,
        -- Duration taken as real seconds.
        duration REAL NOT NULL
    )"#,
        [],
    )?;

    for (name, sql) in MIGRATIONS.iter() {
        let had_migration = transaction
            .prepare("SELECT * FROM migrations where name = ?")?
            .exists(params![name])?;
        if had_migration {
            continue;
        }

        let ran_at = now_secs();
        let start_time = std::time::Instant::now();
        transaction.execute_batch(sql)?;
        let duration = start_time.elapsed().as_secs_f64();
        debug!("Ran migration {} in {}s", name, duration);

        transaction.execute(
            "INSERT INTO migrations(name, sql, ran_at, duration) VALUES(?, ?, ?, ?)",
            params![name, sql, ran_at, duration],
        )?;
    }

    transaction.commit()?;
    Ok(())
}

impl Database {
    /// Open or create the database in the given directory.
    pub fn open(dir: &std::path::Path) -> Result<Self> {
        let path = dir.join("documents.sqlite");
        info!("Opening document store at {}", path.display());
        let conn = rusqlite::Connection::open(&path)?;
        Database::with_connection(conn)
    }

    /// Build a database from an already-existing connection.
    ///
    /// This should be used for testing only, usually with an in-memory connection.
    pub fn with_connection(mut conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(INITIAL_SQL)?;
        run_migrations(&mut conn)?;
        Ok(Database { conn })
    }

    pub fn transaction(&mut self) -> Result<Transaction> {
        Ok(Transaction {
            transaction: self.conn.transaction()?,
        })
    }
}

/// Why a single document wasn't written.
enum Rejection {
    /// The document is at fault; the batch policy decides what happens.
    Document(FailureReason),
    /// The store is at fault; always fatal.
    Store(Error),
}

impl From<Error> for Rejection {
    fn from(e: Error) -> Rejection {
        Rejection::Store(e)
    }
}

/// Give the document an `_id` if it lacks one, returning the id and the document as it will be stored.
fn prepare_document(document: &Value) -> Result<(Value, Value), Rejection> {
    let map = document
        .as_object()
        .ok_or(Rejection::Document(FailureReason::NotAnObject))?;

    if let Some(id) = map.get("_id") {
        return Ok((id.clone(), document.clone()));
    }

    let id = ObjectId::new().to_extended_json();
    let mut with_id = serde_json::Map::with_capacity(map.len() + 1);
    with_id.insert("_id".to_string(), id.clone());
    with_id.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok((id, Value::Object(with_id)))
}

fn insert_document(
    statement: &mut rusqlite::CachedStatement<'_>,
    element_statements: &mut [rusqlite::CachedStatement<'_>],
    validator: Option<&Validator>,
    collection: &str,
    document: &Value,
) -> Result<Value, Rejection> {
    let (id, stored) = prepare_document(document)?;

    if let Some(v) = validator {
        let violations = v.validate(&stored);
        if !violations.is_empty() {
            match v.get_action() {
                ValidationAction::Error => {
                    return Err(Rejection::Document(FailureReason::Validation(violations)))
                }
                ValidationAction::Warn => {
                    warn!(
                        "{}: accepting document {} despite validation failure: {}",
                        collection,
                        id,
                        FailureReason::Validation(violations)
                    );
                }
            }
        }
    }

    let text = serde_json::to_string(&stored).map_err(Error::from)?;
    let seq = match statement.insert(params![build_id_key(&id)?, text]) {
        Ok(seq) => seq,
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(Rejection::Document(FailureReason::DuplicateId))
        }
        Err(e) => return Err(Rejection::Store(e.into())),
    };

    for s in element_statements.iter_mut() {
        s.execute(params![seq, text]).map_err(Error::from)?;
    }

    Ok(id)
}

impl<'a> Transaction<'a> {
    pub fn collection_exists(&self, collection: &str) -> Result<bool> {
        check_collection_name(collection)?;
        Ok(self
            .transaction
            .prepare_cached("SELECT 1 FROM collections WHERE name = ?")?
            .exists(params![collection])?)
    }

    /// Create the collection if it doesn't exist, returning its table identifier.
    fn ensure_collection(&self, collection: &str) -> Result<String> {
        let table = build_table_ident(collection)?;
        if self.collection_exists(collection)? {
            return Ok(table);
        }

        let mut context = tera::Context::new();
        context.insert("table", &table);
        context.insert("doc", DOC_COLUMN);
        let stmt = tera::Tera::one_off(CREATE_COLLECTION_TEMPLATE, &context, false)?;
        self.transaction.execute_batch(&stmt)?;
        self.transaction.execute(
            "INSERT INTO collections(name, created_at) VALUES(?, ?)",
            params![collection, now_secs()],
        )?;
        info!("Created collection {}", collection);
        Ok(table)
    }

    /// Names of every collection, sorted.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut statement = self
            .transaction
            .prepare_cached("SELECT name FROM collections ORDER BY name")?;
        let names = statement
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Insert one document, subject to the collection's validator.
    ///
    /// Returns the document's `_id`, which is generated if the document doesn't have one.
    pub fn insert_one(&mut self, collection: &str, document: &Value) -> Result<Value> {
        let mut report = self.insert_many(
            collection,
            std::slice::from_ref(document),
            FailurePolicy::Abort,
        )?;
        Ok(report.inserted_ids.remove(0))
    }

    /// Insert documents in order, creating the collection if needed.
    ///
    /// Every document goes through the collection's validator.  What happens to documents which fail validation or
    /// collide on `_id` is decided by `policy`; with [FailurePolicy::Abort] the batch fails with
    /// [Error::BatchAborted] and the transaction must be dropped to discard the documents already written.  Store
    /// errors always fail the batch.
    pub fn insert_many(
        &mut self,
        collection: &str,
        documents: &[Value],
        policy: FailurePolicy,
    ) -> Result<InsertReport> {
        let table = self.ensure_collection(collection)?;
        let validator = self.get_validator(collection)?;
        let mut statement = self
            .transaction
            .prepare_cached(&format!("INSERT INTO {}(id, {}) VALUES(?, ?)", table, DOC_COLUMN))?;
        let mut element_statements = vec![];
        for i in self.element_indexes(collection)? {
            let elements = format!("json_each(?2, '{}')", json_path(&i.array)?);
            let sql = build_element_values(&i, "?1", &elements)?;
            element_statements.push(self.transaction.prepare_cached(&sql)?);
        }

        let mut report = InsertReport::default();
        for (index, document) in documents.iter().enumerate() {
            match insert_document(
                &mut statement,
                &mut element_statements,
                validator.as_ref(),
                collection,
                document,
            ) {
                Ok(id) => report.inserted_ids.push(id),
                Err(Rejection::Store(e)) => return Err(e),
                Err(Rejection::Document(reason)) => {
                    let failure = DocumentFailure {
                        index,
                        id: document.get("_id").cloned(),
                        reason,
                    };

                    match policy {
                        FailurePolicy::Abort => {
                            warn!("{}: aborting batch: {}", collection, failure);
                            return Err(Error::BatchAborted(failure));
                        }
                        FailurePolicy::SkipAndReport => {
                            warn!("{}: skipping {}", collection, failure);
                            report.failures.push(failure);
                        }
                    }
                }
            }
        }

        debug!(
            "{}: inserted {} documents, skipped {}",
            collection,
            report.inserted(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Load a collection, calling the user-specified function with each document in insertion order.
    ///
    /// This function can fail in the middle, but will always pass valid objects to your callback.  A collection which
    /// doesn't exist is empty.
    pub fn load_collection<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        mut callback: impl FnMut(T) -> Result<()>,
    ) -> Result<()> {
        if !self.collection_exists(collection)? {
            return Ok(());
        }

        let (query_text, _) = FindOptions::default().to_sql(&build_table_ident(collection)?, &[])?;
        let mut statement = self.transaction.prepare_cached(&query_text)?;
        let mut rows = statement.query([])?;
        while let Some(r) = rows.next()? {
            let text: String = r.get(0)?;
            callback(serde_json::from_str(&text)?)?;
        }

        Ok(())
    }

    pub fn find(&self, collection: &str, options: &FindOptions) -> Result<Vec<Value>> {
        self.find_as(collection, options)
    }

    /// Like [Transaction::find], deserializing each document.
    pub fn find_as<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        options: &FindOptions,
    ) -> Result<Vec<T>> {
        if !self.collection_exists(collection)? {
            return Ok(vec![]);
        }

        let elements = self.element_indexes(collection)?;
        let (query_text, params) = options.to_sql(&build_table_ident(collection)?, &elements)?;
        let mut statement = self.transaction.prepare_cached(&query_text)?;
        let mut rows = statement.query(rusqlite::params_from_iter(params.iter()))?;
        let mut ret = vec![];
        while let Some(r) = rows.next()? {
            let text: String = r.get(0)?;
            ret.push(serde_json::from_str(&text)?);
        }

        Ok(ret)
    }

    pub fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<u64> {
        if !self.collection_exists(collection)? {
            return Ok(0);
        }

        let mut params = vec![];
        let mut query_text = format!("SELECT COUNT(*) FROM {}", build_table_ident(collection)?);
        if let Some(f) = filter {
            let elements = self.element_indexes(collection)?;
            query_text.push_str(&format!(" WHERE {}", f.to_sql(&mut params, &elements)?));
        }

        let count: i64 = self.transaction.query_row(
            &query_text,
            rusqlite::params_from_iter(params.iter()),
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Count documents per distinct value of `key_path`, in key order.  Missing keys group under `null`.
    pub fn group_count(&self, collection: &str, key_path: &str) -> Result<Vec<GroupCount>> {
        if !self.collection_exists(collection)? {
            return Ok(vec![]);
        }

        let query_text = format!(
            "SELECT {key} AS k, COUNT(*) FROM {table} GROUP BY k ORDER BY k",
            key = extract_expr(DOC_COLUMN, key_path)?,
            table = build_table_ident(collection)?,
        );
        let mut statement = self.transaction.prepare_cached(&query_text)?;
        let mut rows = statement.query([])?;
        let mut ret = vec![];
        while let Some(r) = rows.next()? {
            let count: i64 = r.get(1)?;
            ret.push(GroupCount {
                key: from_sql_value(r.get_ref(0)?),
                count: count as u64,
            });
        }

        Ok(ret)
    }

    /// Average `value_path` per distinct value of `key_path`, in key order.  Values which aren't numbers are ignored.
    pub fn group_average(
        &self,
        collection: &str,
        key_path: &str,
        value_path: &str,
    ) -> Result<Vec<GroupAverage>> {
        if !self.collection_exists(collection)? {
            return Ok(vec![]);
        }

        let query_text = format!(
            "SELECT {key} AS k, \
             AVG(CASE WHEN json_type({doc}, '{value_path}') IN ('integer', 'real') THEN {value} END), \
             COUNT(*) \
             FROM {table} GROUP BY k ORDER BY k",
            key = extract_expr(DOC_COLUMN, key_path)?,
            doc = DOC_COLUMN,
            value_path = json_path(value_path)?,
            value = extract_expr(DOC_COLUMN, value_path)?,
            table = build_table_ident(collection)?,
        );
        let mut statement = self.transaction.prepare_cached(&query_text)?;
        let mut rows = statement.query([])?;
        let mut ret = vec![];
        while let Some(r) = rows.next()? {
            let count: i64 = r.get(2)?;
            ret.push(GroupAverage {
                key: from_sql_value(r.get_ref(0)?),
                average: r.get::<_, Option<f64>>(1)?,
                count: count as u64,
            });
        }

        Ok(ret)
    }

    /// Delete every document of the collection, keeping its validator and indexes.  Element index rows go with their
    /// documents.
    pub fn truncate_collection(&self, collection: &str) -> Result<()> {
        if !self.collection_exists(collection)? {
            return Ok(());
        }

        self.transaction
            .execute(&format!("DELETE FROM {}", build_table_ident(collection)?), [])?;
        info!("Truncated collection {}", collection);
        Ok(())
    }

    /// Drop the collection along with its validator and indexes.
    pub fn drop_collection(&self, collection: &str) -> Result<()> {
        if !self.collection_exists(collection)? {
            return Ok(());
        }

        for index in self.element_indexes(collection)? {
            self.transaction
                .execute(&format!("DROP TABLE IF EXISTS {}", index.table), [])?;
        }
        self.transaction
            .execute(&format!("DROP TABLE {}", build_table_ident(collection)?), [])?;
        self.transaction
            .execute("DELETE FROM collections WHERE name = ?", params![collection])?;
        info!("Dropped collection {}", collection);
        Ok(())
    }

    /// Attach a standing validator to the collection, replacing any previous one.
    ///
    /// Documents already stored are not rechecked.  Creates the collection if needed.
    pub fn set_validator(&self, collection: &str, validator: &Validator) -> Result<()> {
        self.ensure_collection(collection)?;
        let definition = serde_json::to_string(validator.get_definition())?;
        self.transaction.execute(
            "INSERT OR REPLACE INTO validators(collection, definition) VALUES(?, ?)",
            params![collection, definition],
        )?;
        info!(
            "Attached validator to {} with action {:?}",
            collection,
            validator.get_action()
        );
        Ok(())
    }

    pub fn get_validator(&self, collection: &str) -> Result<Option<Validator>> {
        let definition: Option<String> = self
            .transaction
            .query_row(
                "SELECT definition FROM validators WHERE collection = ?",
                params![collection],
                |r| r.get(0),
            )
            .optional()?;

        definition
            .map(|d| Validator::from_definition(serde_json::from_str(&d)?))
            .transpose()
    }

    pub fn remove_validator(&self, collection: &str) -> Result<()> {
        self.transaction
            .execute("DELETE FROM validators WHERE collection = ?", params![collection])?;
        Ok(())
    }

    /// Find the first proper prefix of `path` which holds an array, either according to the collection's validator
    /// or in any stored document.
    fn find_array_prefix(&self, collection: &str, path: &str) -> Result<Option<String>> {
        let segments = path.split('.').collect::<Vec<_>>();
        let validator = self.get_validator(collection)?;
        let table = build_table_ident(collection)?;

        for end in 1..segments.len() {
            let prefix = segments[..end].join(".");

            let declared = validator
                .as_ref()
                .and_then(|v| v.get_schema().nodes_along(&prefix).last().copied())
                .and_then(|n| n.bson_type)
                == Some(BsonType::Array);

            let stored = self.transaction.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE json_type({}, '{}') = 'array')",
                    table,
                    DOC_COLUMN,
                    json_path(&prefix)?
                ),
                [],
                |r| r.get::<_, bool>(0),
            )?;

            if declared || stored {
                return Ok(Some(prefix));
            }
        }

        Ok(None)
    }

    /// Find the first proper prefix of `field` which holds an array inside the objects of the array at `array`.
    fn find_element_array_prefix(&self, collection: &str, array: &str, field: &str) -> Result<Option<String>> {
        let segments = field.split('.').collect::<Vec<_>>();
        let validator = self.get_validator(collection)?;
        let table = build_table_ident(collection)?;

        for end in 1..segments.len() {
            let prefix = segments[..end].join(".");
            let full = format!("{}.{}", array, prefix);

            let nodes = validator
                .as_ref()
                .map(|v| v.get_schema().nodes_along(&full))
                .unwrap_or_default();
            let declared = nodes.len() == full.split('.').count()
                && nodes.last().and_then(|n| n.bson_type) == Some(BsonType::Array);

            let stored = self.transaction.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {} AS t, json_each(t.{}, '{}') AS e WHERE \
                     CASE WHEN e.type = 'object' THEN json_type(e.value, '{}') END = 'array')",
                    table,
                    DOC_COLUMN,
                    json_path(array)?,
                    json_path(&prefix)?
                ),
                [],
                |r| r.get::<_, bool>(0),
            )?;

            if declared || stored {
                return Ok(Some(full));
            }
        }

        Ok(None)
    }

    /// Element indexes of the collection, which queries and inserts must know about.
    fn element_indexes(&self, collection: &str) -> Result<Vec<ElementIndex>> {
        let mut statement = self.transaction.prepare_cached(
            "SELECT path, array_path FROM indexes WHERE collection = ? AND array_path IS NOT NULL ORDER BY path",
        )?;
        let rows = statement
            .query_map(params![collection], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(path, array)| -> Result<ElementIndex> {
                Ok(ElementIndex {
                    table: build_element_table_ident(collection, &path)?,
                    field: path.get(array.len() + 1..).unwrap_or_default().to_string(),
                    array,
                })
            })
            .collect()
    }

    /// Create an index, returning the index name.  Creating an existing index does nothing.
    ///
    /// A path through an array of objects, like `inspections.result`, gets an element index: a side table holding the
    /// field's value for every object in the array, which [Filter::ElementEq] lookups then use.  Paths through more
    /// than one level of arrays can't be indexed.
    pub fn create_index(&self, collection: &str, path: &str) -> Result<String> {
        let table = self.ensure_collection(collection)?;
        let expr = extract_expr(DOC_COLUMN, path)?;
        let name = build_index_name(collection, path);

        let array = self.find_array_prefix(collection, path)?;
        let mut context = tera::Context::new();
        context.insert("index", &format!("`index.{}`", name));
        context.insert("table", &table);

        let stmt = match array.as_deref() {
            None => {
                context.insert("expr", &expr);
                tera::Tera::one_off(CREATE_INDEX_TEMPLATE, &context, false)?
            }
            Some(array) => {
                let field = &path[array.len() + 1..];
                if let Some(prefix) = self.find_element_array_prefix(collection, array, field)? {
                    return Err(Error::UnsupportedIndex {
                        path: path.to_string(),
                        prefix,
                    });
                }

                let index = ElementIndex {
                    array: array.to_string(),
                    field: field.to_string(),
                    table: build_element_table_ident(collection, path)?,
                };
                context.insert("side", &index.table);
                let elements = format!("{} AS t, json_each(t.{}, '{}')", table, DOC_COLUMN, json_path(array)?);
                format!(
                    "{}\n{};",
                    tera::Tera::one_off(CREATE_ELEMENT_INDEX_TEMPLATE, &context, false)?.trim_end(),
                    build_element_values(&index, "t.seq", &elements)?.trim()
                )
            }
        };

        debug!("Index statement for {}: {}", name, stmt);
        self.transaction.execute_batch(&stmt)?;
        self.transaction.execute(
            "INSERT OR IGNORE INTO indexes(name, collection, path, array_path) VALUES(?, ?, ?, ?)",
            params![name, collection, path, array],
        )?;
        Ok(name)
    }

    /// Paths indexed on the collection, sorted.
    pub fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        let mut statement = self
            .transaction
            .prepare_cached("SELECT path FROM indexes WHERE collection = ? ORDER BY path")?;
        let paths = statement
            .query_map(params![collection], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// SQLite's query plan for the equivalent [Transaction::find], one line per plan step.
    pub fn explain_find(&self, collection: &str, options: &FindOptions) -> Result<Vec<String>> {
        if !self.collection_exists(collection)? {
            return Ok(vec![]);
        }

        let elements = self.element_indexes(collection)?;
        let (query_text, params) = options.to_sql(&build_table_ident(collection)?, &elements)?;
        let mut statement = self
            .transaction
            .prepare(&format!("EXPLAIN QUERY PLAN {}", query_text))?;
        let lines = statement
            .query_map(rusqlite::params_from_iter(params.iter()), |r| {
                r.get::<_, String>(3)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lines)
    }

    pub fn commit(self) -> Result<()> {
        Ok(self.transaction.commit()?)
    }
}
