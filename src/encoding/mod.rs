use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{macros::format_description, Date, PrimitiveDateTime};

use crate::{
    error::{Error, Result},
    scan::Delimiter,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Date(Date),
    DateTime(PrimitiveDateTime),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Str(_) => FieldType::Str,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::DateTime(_) => FieldType::DateTime,
        }
    }
}

fn write_date(f: &mut fmt::Formatter<'_>, d: &Date) -> fmt::Result {
    write!(f, "{:02}/{:02}/", u8::from(d.month()), d.day())?;
    // Always four digits after the sign, which is what `[year]` parses.
    if d.year() < 0 {
        write!(f, "-{:04}", -d.year())
    } else {
        write!(f, "{:04}", d.year())
    }
}

/// The canonical text form written to the log. Datetimes are written to the
/// second; anything finer is dropped.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Date(d) => write_date(f, d),
            FieldValue::DateTime(dt) => {
                write_date(f, &dt.date())?;
                write!(
                    f,
                    " {:02}:{:02}:{:02}",
                    dt.hour(),
                    dt.minute(),
                    dt.second()
                )
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl From<Date> for FieldValue {
    fn from(d: Date) -> Self {
        FieldValue::Date(d)
    }
}

impl From<PrimitiveDateTime> for FieldValue {
    fn from(dt: PrimitiveDateTime) -> Self {
        FieldValue::DateTime(dt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Str,
    Int,
    Float,
    Date,
    DateTime,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Str => "str",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }

    fn parse_field(self, idx: usize, raw: &[u8]) -> Result<FieldValue> {
        let bad = || Error::Parse {
            field: idx,
            ty: self,
            text: String::from_utf8_lossy(raw).into_owned(),
        };
        let text = std::str::from_utf8(raw).map_err(|_| bad())?;
        Ok(match self {
            FieldType::Str => FieldValue::Str(text.to_owned()),
            FieldType::Int => FieldValue::Int(text.parse().map_err(|_| bad())?),
            FieldType::Float => FieldValue::Float(text.parse().map_err(|_| bad())?),
            FieldType::Date => FieldValue::Date(
                Date::parse(text, format_description!("[month]/[day]/[year]"))
                    .map_err(|_| bad())?,
            ),
            FieldType::DateTime => FieldValue::DateTime(
                PrimitiveDateTime::parse(
                    text,
                    format_description!("[month]/[day]/[year] [hour]:[minute]:[second]"),
                )
                .map_err(|_| bad())?,
            ),
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "str" | "string" => Ok(FieldType::Str),
            "int" | "integer" => Ok(FieldType::Int),
            "float" => Ok(FieldType::Float),
            "date" => Ok(FieldType::Date),
            "datetime" => Ok(FieldType::DateTime),
            other => Err(Error::UnsupportedType(other.to_owned())),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_owned()
    }
}

/// The ordered field types of a record. Never stored in the log; both the
/// writer and the reader must hold the same one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Vec<FieldType>);

impl Schema {
    pub fn new(types: Vec<FieldType>) -> Self {
        Schema(types)
    }

    pub fn types(&self) -> &[FieldType] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that `record` has exactly this schema's shape.
    pub fn check(&self, record: &[FieldValue]) -> Result<()> {
        if record.len() != self.len() {
            return Err(Error::SchemaMismatch {
                expected: self.len(),
                found: record.len(),
            });
        }
        for (idx, (v, t)) in record.iter().zip(self.0.iter()).enumerate() {
            if v.field_type() != *t {
                return Err(Error::TypeMismatch {
                    field: idx,
                    expected: *t,
                    found: v.field_type(),
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<FieldType>> for Schema {
    fn from(types: Vec<FieldType>) -> Self {
        Schema(types)
    }
}

/// Parses a comma-separated tag list such as `int,str,date`.
impl FromStr for Schema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Schema::default());
        }
        s.split(',')
            .map(FieldType::from_str)
            .collect::<Result<Vec<_>>>()
            .map(Schema)
    }
}

#[derive(Debug)]
pub struct RecordWriter {
    pub(crate) buf: Vec<u8>,
    separator: Vec<u8>,
    fields: usize,
}

impl RecordWriter {
    pub fn new(separator: &[u8]) -> Self {
        RecordWriter {
            buf: Vec::new(),
            separator: separator.to_vec(),
            fields: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.fields = 0;
    }

    pub fn field(&mut self, value: &FieldValue) {
        if self.fields > 0 {
            self.buf.extend(&self.separator);
        }
        self.buf.extend(value.to_string().as_bytes());
        self.fields += 1;
    }

    pub fn record(&mut self, record: &[FieldValue]) {
        for v in record {
            self.field(v);
        }
    }

    /// Appends raw bytes after the fields, e.g. a record delimiter.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

pub struct RecordReader {
    separator: Delimiter,
}

impl RecordReader {
    pub fn new(separator: &[u8]) -> Result<Self> {
        Ok(RecordReader {
            separator: Delimiter::new(separator)?,
        })
    }

    pub fn decode(&self, payload: &[u8], schema: &Schema) -> Result<Vec<FieldValue>> {
        let raw: Vec<&[u8]> = self.separator.split(payload).collect();
        if raw.len() != schema.len() {
            return Err(Error::SchemaMismatch {
                expected: schema.len(),
                found: raw.len(),
            });
        }
        raw.into_iter()
            .zip(schema.types())
            .enumerate()
            .map(|(idx, (raw, ty))| ty.parse_field(idx, raw))
            .collect()
    }
}

pub fn encode(record: &[FieldValue], separator: &[u8]) -> Vec<u8> {
    let mut w = RecordWriter::new(separator);
    w.record(record);
    w.buf
}

pub fn decode(payload: &[u8], separator: &[u8], schema: &Schema) -> Result<Vec<FieldValue>> {
    RecordReader::new(separator)?.decode(payload, schema)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl TryFrom<&Value> for FieldValue {
    type Error = Error;

    fn try_from(v: &Value) -> Result<Self> {
        match v {
            Value::String(s) => Ok(FieldValue::Str(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Int(i))
                } else if n.is_f64() {
                    // is_f64 guarantees as_f64 is Some.
                    Ok(FieldValue::Float(n.as_f64().unwrap_or_default()))
                } else {
                    Err(Error::UnsupportedType(format!("integer {} out of range", n)))
                }
            }
            other => Err(Error::UnsupportedType(json_kind(other).to_owned())),
        }
    }
}

/// Encodes a dynamically-typed record. The value must be a JSON array of
/// strings and numbers.
pub fn encode_json(record: &Value, separator: &[u8]) -> Result<Vec<u8>> {
    let items = match record {
        Value::Array(items) => items,
        other => return Err(Error::NotARecord(json_kind(other).to_owned())),
    };
    let fields = items
        .iter()
        .map(FieldValue::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(encode(&fields, separator))
}
