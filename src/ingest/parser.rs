use std::collections::BTreeMap;

use crate::{
    ingest::{CsvRecord, Entity, Literal, Parser},
    Result,
};

/// Parse JSON objects into [Entity]. Value under the subject key, if
/// configured and present, is used as the entity's subject and is not
/// treated as a property.
#[derive(Clone, Debug, Default)]
pub struct JsonParser {
    subject: Option<String>,
}

impl JsonParser {
    pub fn new() -> JsonParser {
        JsonParser::default()
    }

    pub fn set_subject(&mut self, key: &str) -> &mut Self {
        self.subject = Some(key.to_string());
        self
    }

    fn parse_value(&self, value: serde_json::Value) -> Result<Entity> {
        let obj = match value {
            serde_json::Value::Object(obj) => obj,
            value => err_at!(FailParse, msg: "expected json object, {}", kind(&value))?,
        };

        let mut entity = Entity::new();
        for (key, value) in obj.into_iter() {
            match &self.subject {
                Some(subject) if subject == &key => {
                    entity.subject = Some(to_subject(&key, value)?);
                }
                _ => {
                    entity.props.insert(key, to_literal(value));
                }
            }
        }

        Ok(entity)
    }
}

impl Parser<String> for JsonParser {
    fn parse(&self, record: String) -> Result<Entity> {
        let value: serde_json::Value = err_at!(FailParse, serde_json::from_str(&record))?;
        self.parse_value(value)
    }
}

impl Parser<Vec<u8>> for JsonParser {
    fn parse(&self, record: Vec<u8>) -> Result<Entity> {
        let value: serde_json::Value = err_at!(FailParse, serde_json::from_slice(&record))?;
        self.parse_value(value)
    }
}

impl Parser<serde_json::Value> for JsonParser {
    fn parse(&self, record: serde_json::Value) -> Result<Entity> {
        self.parse_value(record)
    }
}

fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn to_subject(key: &str, value: serde_json::Value) -> Result<Vec<u8>> {
    match value {
        serde_json::Value::String(s) => Ok(s.into_bytes()),
        serde_json::Value::Number(n) => Ok(n.to_string().into_bytes()),
        value => err_at!(FailParse, msg: "subject {:?} is {}", key, kind(&value)),
    }
}

fn to_literal(value: serde_json::Value) -> Literal {
    use serde_json::Value;

    match value {
        Value::Null => Literal::Null,
        Value::Bool(val) => Literal::Bool(val),
        Value::Number(n) => match n.as_i64() {
            Some(val) => Literal::Int(val),
            None => Literal::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(val) => Literal::Str(val),
        Value::Array(items) => Literal::List(items.into_iter().map(to_literal).collect()),
        Value::Object(obj) => {
            let map: BTreeMap<String, Literal> =
                obj.into_iter().map(|(k, v)| (k, to_literal(v))).collect();
            Literal::Map(map)
        }
    }
}

/// Parse CSV rows into [Entity]. Values are typed as integer, float or
/// boolean when they parse as one, as string otherwise. Empty values are
/// skipped.
#[derive(Clone, Debug, Default)]
pub struct CsvParser {
    subject: Option<String>,
    strings: Vec<String>,
}

impl CsvParser {
    pub fn new() -> CsvParser {
        CsvParser::default()
    }

    pub fn set_subject(&mut self, header: &str) -> &mut Self {
        self.subject = Some(header.to_string());
        self
    }

    /// Treat values under these headers as strings, even if they look
    /// like numbers. Like zip codes.
    pub fn set_strings(&mut self, headers: Vec<String>) -> &mut Self {
        self.strings = headers;
        self
    }
}

impl Parser<CsvRecord> for CsvParser {
    fn parse(&self, record: CsvRecord) -> Result<Entity> {
        let mut entity = Entity::new();
        for (header, value) in record.into_iter() {
            if value.is_empty() {
                continue;
            }
            match &self.subject {
                Some(subject) if subject == &header => {
                    entity.subject = Some(value.into_bytes());
                }
                _ if self.strings.contains(&header) => {
                    entity.props.insert(header, Literal::Str(value));
                }
                _ => {
                    entity.props.insert(header, parse_csv_value(value));
                }
            }
        }

        Ok(entity)
    }
}

fn parse_csv_value(value: String) -> Literal {
    if let Ok(val) = value.parse::<i64>() {
        Literal::Int(val)
    } else if let Ok(val) = value.parse::<f64>() {
        match val.is_finite() {
            true => Literal::Float(val),
            false => Literal::Str(value),
        }
    } else {
        match value.as_str() {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            _ => Literal::Str(value),
        }
    }
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod parser_test;
