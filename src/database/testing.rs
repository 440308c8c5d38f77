use async_trait::async_trait;
use bson::{doc, Bson, Document};
use std::collections::HashMap;
use std::sync::Mutex;

use super::driver::{is_operator_document, DocumentDriver, DriverError, FindAndModify, UpdateMode, UpdateOutcome};
use super::Namespace;

/// In-memory driver with scripted failures
///
/// Filters match on top-level equality only. Updates understand `$set`,
/// `$setOnInsert` and full replacements, which is all the managers emit.
#[derive(Debug, Default)]
pub(crate) struct FakeDriver {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    open: bool,
    connect_calls: u32,
    close_calls: u32,
    connect_failures: u32,
    operation_failures: u32,
    calls: HashMap<&'static str, u32>,
    collections: HashMap<Namespace, Vec<Document>>,
    next_id: i64,
    updates: Vec<(Document, Document, UpdateMode)>,
}

impl FakeDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connects fail
    pub(crate) fn fail_connects(&self, count: u32) {
        self.state.lock().unwrap().connect_failures = count;
    }

    /// Make the next `count` CRUD calls fail
    pub(crate) fn fail_operations(&self, count: u32) {
        self.state.lock().unwrap().operation_failures = count;
    }

    pub(crate) fn seed(&self, namespace: &Namespace, documents: Vec<Document>) {
        self.state
            .lock()
            .unwrap()
            .collections
            .entry(namespace.clone())
            .or_default()
            .extend(documents);
    }

    pub(crate) fn documents(&self, namespace: &Namespace) -> Vec<Document> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    pub(crate) fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    pub(crate) fn close_calls(&self) -> u32 {
        self.state.lock().unwrap().close_calls
    }

    pub(crate) fn calls(&self, operation: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// The most recent `(filter, update, mode)` passed to `update`
    pub(crate) fn last_update(&self) -> Option<(Document, Document, UpdateMode)> {
        self.state.lock().unwrap().updates.last().cloned()
    }

    fn begin(&self, operation: &'static str) -> Result<std::sync::MutexGuard<'_, FakeState>, DriverError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(operation).or_insert(0) += 1;
        if state.operation_failures > 0 {
            state.operation_failures -= 1;
            return Err(DriverError::NotConnected);
        }
        if !state.open {
            return Err(DriverError::NotConnected);
        }
        Ok(state)
    }
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .filter(|(key, _)| !key.starts_with('$'))
        .all(|(key, value)| document.get(key) == Some(value))
}

fn project(document: &Document, projection: &Option<Document>) -> Document {
    match projection {
        Some(fields) if !fields.is_empty() => document
            .iter()
            .filter(|(key, _)| key.as_str() == "_id" || fields.contains_key(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => document.clone(),
    }
}

fn apply(target: &mut Document, update: &Document, inserting: bool) {
    if !is_operator_document(update) {
        let id = target.get("_id").cloned();
        *target = update.clone();
        if let Some(id) = id {
            target.insert("_id", id);
        }
        return;
    }
    if let Ok(set) = update.get_document("$set") {
        for (key, value) in set {
            target.insert(key.clone(), value.clone());
        }
    }
    if inserting {
        if let Ok(set_on_insert) = update.get_document("$setOnInsert") {
            for (key, value) in set_on_insert {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

impl FakeState {
    fn insert_document(&mut self, namespace: &Namespace, mut document: Document) -> Result<Bson, DriverError> {
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                self.next_id += 1;
                let id = Bson::Int64(self.next_id);
                document.insert("_id", id.clone());
                id
            }
        };
        let collection = self.collections.entry(namespace.clone()).or_default();
        if collection.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(DriverError::DuplicateKey(format!(
                "E11000 duplicate key error collection: {} dup key: {{ _id: {} }}",
                namespace, id
            )));
        }
        collection.push(document);
        Ok(id)
    }

    fn seed_from_filter(filter: &Document) -> Document {
        filter
            .iter()
            .filter(|(key, _)| !key.starts_with('$'))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[async_trait]
impl DocumentDriver for FakeDriver {
    async fn connect(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(DriverError::NotConnected);
        }
        state.open = true;
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        state.open = false;
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, DriverError> {
        let state = self.begin("find")?;
        Ok(state
            .collections
            .get(namespace)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| matches_filter(document, &filter))
                    .map(|document| project(document, &projection))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>, DriverError> {
        let state = self.begin("find_one")?;
        Ok(state.collections.get(namespace).and_then(|documents| {
            documents
                .iter()
                .find(|document| matches_filter(document, &filter))
                .map(|document| project(document, &projection))
        }))
    }

    async fn insert(&self, namespace: &Namespace, document: Document) -> Result<Bson, DriverError> {
        let mut state = self.begin("insert")?;
        state.insert_document(namespace, document)
    }

    async fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        mode: UpdateMode,
    ) -> Result<UpdateOutcome, DriverError> {
        let mut state = self.begin("update")?;
        state.updates.push((filter.clone(), update.clone(), mode));

        let mut outcome = UpdateOutcome::default();
        if let Some(documents) = state.collections.get_mut(namespace) {
            for document in documents.iter_mut().filter(|document| matches_filter(document, &filter)) {
                apply(document, &update, false);
                outcome.matched += 1;
                outcome.modified += 1;
                if !mode.multiple {
                    break;
                }
            }
        }

        if outcome.matched == 0 && mode.upsert {
            let mut document = FakeState::seed_from_filter(&filter);
            apply(&mut document, &update, true);
            outcome.upserted_id = Some(state.insert_document(namespace, document)?);
        }

        Ok(outcome)
    }

    async fn remove(
        &self,
        namespace: &Namespace,
        filter: Document,
        just_one: bool,
    ) -> Result<u64, DriverError> {
        let mut state = self.begin("remove")?;
        let Some(documents) = state.collections.get_mut(namespace) else {
            return Ok(0);
        };

        let mut removed = 0;
        documents.retain(|document| {
            if (just_one && removed > 0) || !matches_filter(document, &filter) {
                return true;
            }
            removed += 1;
            false
        });
        Ok(removed)
    }

    async fn count(&self, namespace: &Namespace, filter: Document) -> Result<u64, DriverError> {
        let state = self.begin("count")?;
        Ok(state
            .collections
            .get(namespace)
            .map(|documents| documents.iter().filter(|document| matches_filter(document, &filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn distinct(
        &self,
        namespace: &Namespace,
        key: &str,
        filter: Document,
    ) -> Result<Vec<Bson>, DriverError> {
        let state = self.begin("distinct")?;
        let mut values: Vec<Bson> = Vec::new();
        for document in state
            .collections
            .get(namespace)
            .into_iter()
            .flatten()
            .filter(|document| matches_filter(document, &filter))
        {
            if let Some(value) = document.get(key) {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        Ok(values)
    }

    async fn find_and_modify(
        &self,
        namespace: &Namespace,
        query: Document,
        request: FindAndModify,
    ) -> Result<Option<Document>, DriverError> {
        let mut state = self.begin("find_and_modify")?;
        let documents = state.collections.entry(namespace.clone()).or_default();
        let position = documents.iter().position(|document| matches_filter(document, &query));

        if request.remove {
            return Ok(position.map(|index| project(&documents.remove(index), &request.fields)));
        }

        let update = request.update.unwrap_or_else(|| doc! {});
        match position {
            Some(index) => {
                let before = documents[index].clone();
                apply(&mut documents[index], &update, false);
                let returned = if request.return_new { &documents[index] } else { &before };
                Ok(Some(project(returned, &request.fields)))
            }
            None if request.upsert => {
                let mut document = FakeState::seed_from_filter(&query);
                apply(&mut document, &update, true);
                state.insert_document(namespace, document.clone())?;
                Ok(request.return_new.then(|| project(&document, &request.fields)))
            }
            None => Ok(None),
        }
    }
}
