//! In-memory datasets of evaluation examples.
//!
//! A [`Dataset`] is an ordered collection of JSON-object examples. Transforms
//! (`shuffle`, `select`, `map`, `filter`) return new datasets and leave the
//! original untouched, so one loaded dataset can seed many eval runs.

use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Examples
// ---------------------------------------------------------------------------

/// A single dataset example: a JSON object with free-form fields.
///
/// Environments read the conventional `question`/`prompt`, `answer`, and
/// `task` fields; everything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Example(Map<String, Value>);

impl Example {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Look up a raw field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a field and require it to be a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The question posed to the model: `question`, falling back to `prompt`.
    pub fn question(&self) -> Option<&str> {
        self.text("question").or_else(|| self.text("prompt"))
    }

    /// The ground-truth answer for scoring.
    pub fn answer(&self) -> Option<&str> {
        self.text("answer")
    }

    /// The routing key used by environment groups.
    pub fn task(&self) -> Option<&str> {
        self.text("task")
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Example {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// An ordered, immutable collection of [`Example`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    items: Vec<Example>,
}

impl Dataset {
    pub fn new(items: Vec<Example>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Example> {
        self.items.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.items.iter()
    }

    /// A new dataset with the items in seeded-random order.
    pub fn shuffle(&self, seed: u64) -> Dataset {
        let mut items = self.items.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        items.shuffle(&mut rng);
        Dataset { items }
    }

    /// A new dataset containing the items at `indices`, in that order.
    ///
    /// Out-of-range indices are skipped.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        let items = indices
            .iter()
            .filter_map(|&idx| self.items.get(idx).cloned())
            .collect();
        Dataset { items }
    }

    /// A new dataset with `f` applied to every item.
    pub fn map(&self, f: impl Fn(Example) -> Example) -> Dataset {
        let items = self.items.iter().cloned().map(f).collect();
        Dataset { items }
    }

    /// A new dataset with only the items matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&Example) -> bool) -> Dataset {
        let items = self.items.iter().filter(|e| predicate(e)).cloned().collect();
        Dataset { items }
    }

    /// Join several datasets into one, preserving order.
    pub fn concatenate(datasets: &[Dataset]) -> Dataset {
        let items = datasets.iter().flat_map(|d| d.items.iter().cloned()).collect();
        Dataset { items }
    }

    /// Parse a dataset from a JSON array of objects (or a single object).
    pub fn from_json_str(json: &str) -> Result<Dataset> {
        if let Ok(items) = serde_json::from_str::<Vec<Example>>(json) {
            return Ok(Dataset { items });
        }
        let item: Example = serde_json::from_str(json).context("failed to parse JSON")?;
        Ok(Dataset { items: vec![item] })
    }

    /// Parse a dataset from JSON Lines text. Blank lines are skipped.
    pub fn from_jsonl_str(jsonl: &str) -> Result<Dataset> {
        let mut items = Vec::new();
        for (line_no, line) in jsonl.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let item: Example = serde_json::from_str(line)
                .with_context(|| format!("failed to parse JSON on line {}", line_no + 1))?;
            items.push(item);
        }
        Ok(Dataset { items })
    }

    /// Load a dataset from a `.json` or `.jsonl` file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Dataset> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset from {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "jsonl") {
            Self::from_jsonl_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }
}

/// Build a dataset from `(question, answer)` pairs.
pub fn question_answer_pairs<I, S>(pairs: I) -> Dataset
where
    I: IntoIterator<Item = (S, S)>,
    S: Into<String>,
{
    pairs_with_keys(pairs, "question", "answer")
}

/// Build a dataset from `(prompt, answer)` pairs.
pub fn prompt_answer_pairs<I, S>(pairs: I) -> Dataset
where
    I: IntoIterator<Item = (S, S)>,
    S: Into<String>,
{
    pairs_with_keys(pairs, "prompt", "answer")
}

fn pairs_with_keys<I, S>(pairs: I, first_key: &str, second_key: &str) -> Dataset
where
    I: IntoIterator<Item = (S, S)>,
    S: Into<String>,
{
    let items = pairs
        .into_iter()
        .map(|(first, second)| {
            let mut fields = Map::new();
            fields.insert(first_key.to_string(), Value::String(first.into()));
            fields.insert(second_key.to_string(), Value::String(second.into()));
            Example(fields)
        })
        .collect();
    Dataset { items }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Incremental [`Dataset`] construction from items and JSON fragments.
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    items: Vec<Example>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, item: Example) -> Self {
        self.items.push(item);
        self
    }

    /// Append items parsed from a JSON array of objects or a single object.
    pub fn add_json(mut self, json: &str) -> Result<Self> {
        let parsed = Dataset::from_json_str(json)?;
        self.items.extend(parsed.items);
        Ok(self)
    }

    pub fn build(self) -> Dataset {
        Dataset { items: self.items }
    }
}
