use std::sync::Arc;

use crate::{
    ingest::{Entity, IndexRecord, Literal, Mapper, Row, Val},
    nexter::{RangeAllocator, RangeNexter},
    translate::Translator,
    Result,
};

/// Default frame for translating entity subjects into column identifiers.
pub const COLUMN_FRAME: &str = "columns";
/// Default frame for integer fields.
pub const FIELD_FRAME: &str = "fields";
/// Default frame for boolean properties.
pub const BOOL_FRAME: &str = "bools";

/// Mapper collapsing every property of an entity into a single column.
///
/// * Column identifier is the subject translated under the column frame,
///   entities without subject get the next identifier from a
///   [RangeNexter].
/// * String and bytes properties set the value's translated identifier as
///   row under a frame named after the property.
/// * Integer properties are set as values under the field frame, with the
///   property name as field. Floats are scaled and truncated into integers.
/// * `true` properties set the property's translated identifier as row
///   under the bool frame. `false` and null properties are skipped.
/// * Lists are mapped element-wise under the same property.
/// * Nested maps are flattened, property names joined by `.`.
#[derive(Clone)]
pub struct CollapsingMapper {
    translator: Arc<dyn Translator>,
    nexter: RangeNexter,
    col_frame: String,
    field_frame: String,
    bool_frame: String,
    scale: f64,
}

impl CollapsingMapper {
    pub fn new(
        translator: Arc<dyn Translator>,
        allocator: Arc<RangeAllocator>,
    ) -> CollapsingMapper {
        CollapsingMapper {
            translator,
            nexter: RangeNexter::new(allocator),
            col_frame: COLUMN_FRAME.to_string(),
            field_frame: FIELD_FRAME.to_string(),
            bool_frame: BOOL_FRAME.to_string(),
            scale: 1.0,
        }
    }

    pub fn set_column_frame(&mut self, frame: &str) -> &mut Self {
        self.col_frame = frame.to_string();
        self
    }

    pub fn set_field_frame(&mut self, frame: &str) -> &mut Self {
        self.field_frame = frame.to_string();
        self
    }

    pub fn set_bool_frame(&mut self, frame: &str) -> &mut Self {
        self.bool_frame = frame.to_string();
        self
    }

    /// Floats are multiplied by `scale` before truncating into integers.
    pub fn set_float_scale(&mut self, scale: f64) -> &mut Self {
        self.scale = scale;
        self
    }

    fn walk(&self, path: &str, lit: &Literal, rec: &mut IndexRecord) -> Result<()> {
        match lit {
            Literal::Null | Literal::Bool(false) => (),
            Literal::Bool(true) => {
                let id = self.translator.get_id(&self.bool_frame, path.as_bytes())?;
                rec.rows.push(Row {
                    frame: self.bool_frame.clone(),
                    id,
                });
            }
            Literal::Int(value) => rec.vals.push(Val {
                frame: self.field_frame.clone(),
                field: path.to_string(),
                value: *value,
            }),
            Literal::Float(value) => {
                let scaled = value * self.scale;
                if !scaled.is_finite() || scaled.abs() >= (i64::MAX as f64) {
                    err_at!(FailConvert, msg: "{} float {} out of range", path, value)?
                }
                rec.vals.push(Val {
                    frame: self.field_frame.clone(),
                    field: path.to_string(),
                    value: scaled.trunc() as i64,
                })
            }
            Literal::Str(value) => self.set_row(path, value.as_bytes(), rec)?,
            Literal::Bytes(value) => self.set_row(path, value, rec)?,
            Literal::List(items) => {
                for item in items.iter() {
                    self.walk(path, item, rec)?;
                }
            }
            Literal::Map(props) => {
                for (key, item) in props.iter() {
                    self.walk(&format!("{}.{}", path, key), item, rec)?;
                }
            }
        }

        Ok(())
    }

    fn set_row(&self, frame: &str, value: &[u8], rec: &mut IndexRecord) -> Result<()> {
        let id = self.translator.get_id(frame, value)?;
        rec.rows.push(Row {
            frame: frame.to_string(),
            id,
        });
        Ok(())
    }
}

impl Mapper for CollapsingMapper {
    fn map(&mut self, entity: &Entity) -> Result<IndexRecord> {
        let col = match &entity.subject {
            Some(subject) => self.translator.get_id(&self.col_frame, subject)?,
            None => self.nexter.next()?,
        };

        let mut rec = IndexRecord::new(col);
        for (name, lit) in entity.props.iter() {
            self.walk(name, lit, &mut rec)?;
        }

        Ok(rec)
    }

    fn close(&mut self) -> Result<()> {
        self.nexter.give_back()
    }
}

#[cfg(test)]
#[path = "mapper_test.rs"]
mod mapper_test;
