//! Declared metric fields and how each is reduced after summation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Sum divided by user count.
    Averaged,
    /// Raw sum.
    Count,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricField {
    pub name: String,
    pub kind: FieldKind,
    /// Largest value one user may report. Sums are searched only up to `users * max`.
    #[serde(default = "full_range")]
    pub max: u32,
}

fn full_range() -> u32 {
    u32::MAX
}

impl MetricField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, max: u32::MAX }
    }

    pub fn with_max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricSchema {
    fields: Vec<MetricField>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid metric schema: {0}")]
pub struct SchemaError(String);

impl MetricSchema {
    pub fn new(fields: Vec<MetricField>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError("no fields declared".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for f in &fields {
            if f.name.is_empty() {
                return Err(SchemaError("empty field name".into()));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(SchemaError(format!("duplicate field `{}`", f.name)));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[MetricField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&MetricField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn kind(&self, name: &str) -> Option<FieldKind> {
        self.field(name).map(|f| f.kind)
    }

    /// `Ok` when the record's keys are exactly the declared fields; otherwise the first difference.
    pub fn check_keys<V>(&self, record: &BTreeMap<String, V>) -> Result<(), String> {
        for f in &self.fields {
            if !record.contains_key(&f.name) {
                return Err(format!("missing field `{}`", f.name));
            }
        }
        if let Some(extra) = record.keys().find(|k| self.kind(k).is_none()) {
            return Err(format!("undeclared field `{extra}`"));
        }
        Ok(())
    }
}

impl Default for MetricSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                MetricField::new("mood", FieldKind::Averaged).with_max(100),
                MetricField::new("sleep_hours", FieldKind::Averaged).with_max(24),
                MetricField::new("sessions", FieldKind::Count).with_max(1_000),
            ],
        }
    }
}

/// Parses `name:avg,name:count:1000,...`; the optional third part is the per-user maximum.
impl FromStr for MetricSchema {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|part| {
                let mut pieces = part.split(':').map(str::trim);
                let (Some(name), Some(kind)) = (pieces.next(), pieces.next()) else {
                    return Err(SchemaError(format!("expected name:kind[:max], got `{part}`")));
                };
                let kind = match kind {
                    "avg" | "averaged" => FieldKind::Averaged,
                    "count" => FieldKind::Count,
                    other => return Err(SchemaError(format!("unknown field kind `{other}`"))),
                };
                let max = match pieces.next() {
                    Some(max) => max
                        .parse::<u32>()
                        .map_err(|e| SchemaError(format!("bad maximum `{max}` for `{name}`: {e}")))?,
                    None => u32::MAX,
                };
                if pieces.next().is_some() {
                    return Err(SchemaError(format!("expected name:kind[:max], got `{part}`")));
                }
                Ok(MetricField::new(name, kind).with_max(max))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(fields)
    }
}

impl fmt::Display for MetricSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let kind = match field.kind {
                FieldKind::Averaged => "avg",
                FieldKind::Count => "count",
            };
            write!(f, "{}:{kind}", field.name)?;
            if field.max != u32::MAX {
                write!(f, ":{}", field.max)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_form() {
        let schema: MetricSchema = "mood:avg, sessions:count".parse().unwrap();
        assert_eq!(schema.kind("mood"), Some(FieldKind::Averaged));
        assert_eq!(schema.kind("sessions"), Some(FieldKind::Count));
        assert_eq!(schema.to_string(), "mood:avg,sessions:count");
        assert_eq!(MetricSchema::default().to_string().parse::<MetricSchema>().unwrap(), MetricSchema::default());
    }

    #[test]
    fn parses_per_field_maximum() {
        let schema: MetricSchema = "mood:avg:100, sessions:count".parse().unwrap();
        assert_eq!(schema.field("mood").unwrap().max, 100);
        assert_eq!(schema.field("sessions").unwrap().max, u32::MAX);
        assert_eq!(schema.to_string(), "mood:avg:100,sessions:count");
        assert_eq!(MetricSchema::default().to_string(), "mood:avg:100,sleep_hours:avg:24,sessions:count:1000");
    }

    #[test]
    fn rejects_bad_declarations() {
        assert!("".parse::<MetricSchema>().is_err());
        assert!("mood".parse::<MetricSchema>().is_err());
        assert!("mood:median".parse::<MetricSchema>().is_err());
        assert!("mood:avg,mood:count".parse::<MetricSchema>().is_err());
        assert!("mood:avg:-1".parse::<MetricSchema>().is_err());
        assert!("mood:avg:10:20".parse::<MetricSchema>().is_err());
    }

    #[test]
    fn key_check_reports_missing_and_extra() {
        let schema: MetricSchema = "mood:avg,sessions:count".parse().unwrap();
        let mut record = BTreeMap::new();
        record.insert("mood".to_string(), 1u32);
        assert_eq!(schema.check_keys(&record).unwrap_err(), "missing field `sessions`");
        record.insert("sessions".to_string(), 2);
        assert!(schema.check_keys(&record).is_ok());
        record.insert("steps".to_string(), 3);
        assert_eq!(schema.check_keys(&record).unwrap_err(), "undeclared field `steps`");
    }
}
