//! Result bag: labeled values collected from resolved tokens

use serde::Serialize;
use serde_json::{Map, Value};

/// Mapping from token label to the value(s) its resolver was called with
///
/// A bag lives for the whole lifetime of its driver and is handed to the
/// completion handler when the driver terminates. Entries are written only
/// by token resolution; later resolutions of the same label overwrite
/// earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultBag {
    entries: Map<String, Value>,
}

impl ResultBag {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the values a resolver was called with
    ///
    /// Zero values are recorded as `Null`, a single value as itself, and
    /// several values as an array in call order.
    pub(crate) fn store(&mut self, label: String, mut values: Vec<Value>) {
        let value = match values.len() {
            0 => Value::Null,
            1 => values.swap_remove(0),
            _ => Value::Array(values),
        };
        self.entries.insert(label, value);
    }

    /// Look up a label
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.entries.get(label)
    }

    /// Look up a label holding a string value
    pub fn get_str(&self, label: &str) -> Option<&str> {
        self.entries.get(label).and_then(Value::as_str)
    }

    /// Whether a token with this label has been resolved
    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    /// Number of labels recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no labeled token has been resolved yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over labels and values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Convert the bag into a JSON object, the shape it takes when nested
    /// inside another bag
    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

impl From<ResultBag> for Value {
    fn from(bag: ResultBag) -> Self {
        bag.into_value()
    }
}
