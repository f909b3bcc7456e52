use serde_json::{Map, Value};
use crate::{Error, Result};

/// How a single top-level key is treated when the store opens.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// Insert this value when the key is absent.
    Default(Value),
    /// Opening fails when the key is absent.
    Required,
    /// Insert `null` when the key is absent.
    Optional,
}

/// Top-level keys the dataset is expected to carry, in declaration order.
///
/// The schema is consulted once, at open time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field. A later declaration of the same key replaces the earlier one.
    pub fn field(mut self, key: impl Into<String>, spec: FieldSpec) -> Self {
        let key = key.into();
        match self.fields.iter().position(|(k, _)| *k == key) {
            Some(i) => self.fields[i].1 = spec,
            None => self.fields.push((key, spec)),
        }
        self
    }

    pub fn with_default(self, key: impl Into<String>, value: Value) -> Self {
        self.field(key, FieldSpec::Default(value))
    }

    pub fn required(self, key: impl Into<String>) -> Self {
        self.field(key, FieldSpec::Required)
    }

    pub fn optional(self, key: impl Into<String>) -> Self {
        self.field(key, FieldSpec::Optional)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// Builds a schema from its JSON form.
    ///
    /// Each member is either a descriptor object (`{"default": ..}`,
    /// `{"required": true}`) or a literal default value.
    pub fn from_json(value: &Value) -> Result<Self> {
        let members = value.as_object().ok_or_else(|| {
            Error::InvalidConfiguration("schema must be a JSON object".to_string())
        })?;

        let mut schema = Schema::new();
        for (key, member) in members {
            schema = schema.field(key.clone(), Self::parse_member(key, member)?);
        }
        Ok(schema)
    }

    fn parse_member(key: &str, member: &Value) -> Result<FieldSpec> {
        let descriptor = match member.as_object() {
            Some(obj)
                if !obj.is_empty()
                    && obj.keys().all(|k| k == "default" || k == "required") =>
            {
                obj
            }
            _ => return Ok(FieldSpec::Default(member.clone())),
        };

        if let Some(default) = descriptor.get("default") {
            return Ok(FieldSpec::Default(default.clone()));
        }
        match descriptor.get("required") {
            Some(Value::Bool(true)) => Ok(FieldSpec::Required),
            Some(Value::Bool(false)) | None => Ok(FieldSpec::Optional),
            Some(other) => Err(Error::InvalidConfiguration(format!(
                "schema field {:?}: \"required\" must be a boolean, got {}",
                key, other
            ))),
        }
    }

    /// Fills absent keys in `data`. Present keys are never touched.
    ///
    /// Returns how many keys were inserted.
    pub fn apply(&self, data: &mut Map<String, Value>) -> Result<usize> {
        let mut filled = 0;
        for (key, spec) in &self.fields {
            if data.contains_key(key) {
                continue;
            }
            let value = match spec {
                FieldSpec::Default(v) => v.clone(),
                FieldSpec::Optional => Value::Null,
                FieldSpec::Required => return Err(Error::RequiredKeyMissing(key.clone())),
            };
            data.insert(key.clone(), value);
            filled += 1;
        }
        Ok(filled)
    }
}
