use crate::{
    error::ExpressionError,
    ids::{CategoryId, DataSourceId},
};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

const INTEREST: &str = "interest";
const INCLUDE: &str = "include";
const EXCLUDE: &str = "exclude";

/// A stored audience-targeting expression.
///
/// Only the `interest` part is interpreted. Every other top-level field (`age`, `gender`, `geo`,
/// ...) is kept as raw JSON and written back at its original position.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    fields: Map<String, Value>,
    interest: Option<Interest>,
}

impl Expression {
    /// Parse an expression from its stored JSON text.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use taxonomy_remap::Expression;
    ///
    /// let text = r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[4]}]}],"exclude":[]},"age":[]}"#;
    /// let expression = Expression::parse(text).unwrap();
    ///
    /// assert!(expression.interest().is_some());
    /// assert_eq!(text, expression.to_compact_string().unwrap());
    /// ```
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let mut fields: Map<String, Value> =
            serde_json::from_str(text).map_err(ExpressionError::Malformed)?;
        let interest = match fields.get_mut(INTEREST) {
            Some(slot) if !slot.is_null() => {
                let Value::Object(raw) = slot.take() else {
                    return Err(ExpressionError::Shape("`interest` must be an object"));
                };
                Some(Interest::from_fields(raw)?)
            }
            _ => None,
        };
        Ok(Self { fields, interest })
    }

    #[inline]
    pub fn interest(&self) -> Option<&Interest> {
        self.interest.as_ref()
    }

    #[inline]
    pub fn interest_mut(&mut self) -> Option<&mut Interest> {
        self.interest.as_mut()
    }

    /// Serialize without any whitespace, keeping the key order of the parsed document.
    pub fn to_compact_string(&self) -> Result<String, ExpressionError> {
        serde_json::to_string(self).map_err(ExpressionError::Serialize)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            match (key.as_str(), &self.interest) {
                (INTEREST, Some(interest)) => map.serialize_entry(key, interest)?,
                _ => map.serialize_entry(key, value)?,
            }
        }
        map.end()
    }
}

/// The included and excluded category criteria of an [`Expression`].
///
/// Both sections are AND-ed lists of [`Clause`]. A section missing from the input stays missing
/// on output.
#[derive(Clone, Debug, PartialEq)]
pub struct Interest {
    fields: Map<String, Value>,
    include: Option<Vec<Clause>>,
    exclude: Option<Vec<Clause>>,
}

impl Interest {
    pub fn new(include: Vec<Clause>, exclude: Vec<Clause>) -> Self {
        let mut fields = Map::new();
        fields.insert(INCLUDE.to_owned(), Value::Null);
        fields.insert(EXCLUDE.to_owned(), Value::Null);
        Self {
            fields,
            include: Some(include),
            exclude: Some(exclude),
        }
    }

    fn from_fields(mut fields: Map<String, Value>) -> Result<Self, ExpressionError> {
        let include = take_section(&mut fields, INCLUDE)?;
        let exclude = take_section(&mut fields, EXCLUDE)?;
        Ok(Self {
            fields,
            include,
            exclude,
        })
    }

    pub fn include(&self) -> &[Clause] {
        self.include.as_deref().unwrap_or_default()
    }

    pub fn exclude(&self) -> &[Clause] {
        self.exclude.as_deref().unwrap_or_default()
    }

    /// The present sections, `include` first.
    pub fn sections_mut(&mut self) -> impl Iterator<Item = &mut Vec<Clause>> + '_ {
        self.include
            .as_mut()
            .into_iter()
            .chain(self.exclude.as_mut())
    }
}

fn take_section(
    fields: &mut Map<String, Value>,
    name: &'static str,
) -> Result<Option<Vec<Clause>>, ExpressionError> {
    match fields.get_mut(name) {
        Some(slot) if !slot.is_null() => serde_json::from_value(slot.take())
            .map(Some)
            .map_err(ExpressionError::Malformed),
        _ => Ok(None),
    }
}

impl Serialize for Interest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            match (key.as_str(), &self.include, &self.exclude) {
                (INCLUDE, Some(include), _) => map.serialize_entry(key, include)?,
                (EXCLUDE, _, Some(exclude)) => map.serialize_entry(key, exclude)?,
                _ => map.serialize_entry(key, value)?,
            }
        }
        map.end()
    }
}

/// One AND-ed disjunction of [`Term`]s, stored under the `or` key.
///
/// The `or` key is required: a clause of any other shape makes the whole expression malformed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(rename = "or")]
    pub terms: Vec<Term>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Clause {
    pub fn new(terms: Vec<Term>) -> Self {
        Self {
            terms,
            extra: Map::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// The categories of a single data source inside a [`Clause`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub data_source_id: DataSourceId,
    #[serde(default)]
    pub cats: Vec<CategoryId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Term {
    pub fn new(data_source_id: DataSourceId, cats: Vec<CategoryId>) -> Self {
        Self {
            data_source_id,
            cats,
            extra: Map::new(),
        }
    }
}
