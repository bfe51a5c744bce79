// 🏗️ Input sources - tab-separated rows and JSON trees as uniform records
//
// A record is a bag of named fields. A field holds a scalar string, a child
// record (JSON object) or a nested sequence of records (JSON array). Blank
// values read as absent.

use crate::error::{IngestError, IngestResult};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(String),
    Child(Box<Record>),
    Nested(Vec<Record>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// 1-based line (TSV) or element position (JSON)
    pub line: usize,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(line: usize) -> Self {
        Record {
            line,
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    /// Builder: add a scalar field
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, FieldValue::Scalar(value.to_string()));
        self
    }

    /// Builder: add a child record
    pub fn with_child(mut self, name: &str, child: Record) -> Self {
        self.insert(name, FieldValue::Child(Box::new(child)));
        self
    }

    /// Builder: add a nested sequence
    pub fn with_nested(mut self, name: &str, items: Vec<Record>) -> Self {
        self.insert(name, FieldValue::Nested(items));
        self
    }

    /// Trimmed scalar value; blank and non-scalar fields are absent
    pub fn scalar(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Scalar(value)) => {
                let value = value.trim();
                (!value.is_empty()).then_some(value)
            }
            _ => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<&Record> {
        match self.fields.get(name) {
            Some(FieldValue::Child(child)) => Some(child),
            _ => None,
        }
    }

    pub fn nested(&self, name: &str) -> &[Record] {
        match self.fields.get(name) {
            Some(FieldValue::Nested(items)) => items,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub type RecordStream = Box<dyn Iterator<Item = IngestResult<Record>>>;

/// Column index -> field name
pub type ColumnLayout = &'static [(usize, &'static str)];

#[derive(Debug, Clone, Copy)]
pub enum InputLayout {
    Tsv(ColumnLayout),
    JsonTree,
}

/// Open a record stream over `reader` in the given layout
pub fn read_records<R: Read + 'static>(
    reader: R,
    source_name: &str,
    layout: InputLayout,
) -> IngestResult<RecordStream> {
    match layout {
        InputLayout::Tsv(columns) => Ok(Box::new(TsvSource::new(reader, source_name, columns))),
        InputLayout::JsonTree => Ok(Box::new(JsonTreeSource::from_reader(reader, source_name)?)),
    }
}

// ============================================================================
// TAB-SEPARATED SOURCE
// ============================================================================

/// Lazy reader over tab-separated rows. `#` lines are comments.
pub struct TsvSource<R: Read> {
    source_name: String,
    columns: ColumnLayout,
    rows: csv::StringRecordsIntoIter<R>,
}

impl<R: Read> TsvSource<R> {
    pub fn new(reader: R, source_name: &str, columns: ColumnLayout) -> Self {
        let rows = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .comment(Some(b'#'))
            .from_reader(reader)
            .into_records();

        TsvSource {
            source_name: source_name.to_string(),
            columns,
            rows,
        }
    }

    fn to_record(&self, row: csv::StringRecord) -> Record {
        let line = row.position().map_or(0, |p| p.line() as usize);
        let mut record = Record::new(line);

        // Short rows leave trailing columns absent
        for (index, name) in self.columns {
            if let Some(value) = row.get(*index) {
                record.insert(name, FieldValue::Scalar(value.to_string()));
            }
        }
        record
    }
}

impl<R: Read> Iterator for TsvSource<R> {
    type Item = IngestResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(match row {
            Ok(row) => Ok(self.to_record(row)),
            Err(err) => Err(IngestError::MalformedInput {
                source_name: self.source_name.clone(),
                line: err.position().map_or(0, |p| p.line() as usize),
                message: err.to_string(),
            }),
        })
    }
}

// ============================================================================
// JSON TREE SOURCE
// ============================================================================

/// Records from a JSON document whose root is an object (its values, in key
/// order, are the records) or an array (its items are the records).
pub struct JsonTreeSource {
    source_name: String,
    items: std::iter::Enumerate<std::vec::IntoIter<Value>>,
}

impl JsonTreeSource {
    pub fn from_reader<R: Read>(reader: R, source_name: &str) -> IngestResult<Self> {
        let root: Value = serde_json::from_reader(reader).map_err(|err| {
            IngestError::MalformedInput {
                source_name: source_name.to_string(),
                line: err.line(),
                message: err.to_string(),
            }
        })?;

        let items: Vec<Value> = match root {
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Array(items) => items,
            _ => {
                return Err(IngestError::MalformedInput {
                    source_name: source_name.to_string(),
                    line: 1,
                    message: "document root must be an object or an array".to_string(),
                })
            }
        };

        Ok(JsonTreeSource {
            source_name: source_name.to_string(),
            items: items.into_iter().enumerate(),
        })
    }

    pub fn from_json(content: &str, source_name: &str) -> IngestResult<Self> {
        Self::from_reader(content.as_bytes(), source_name)
    }
}

fn object_to_record(line: usize, object: serde_json::Map<String, Value>) -> Record {
    let mut record = Record::new(line);

    for (name, value) in object {
        match value {
            Value::Null => {}
            Value::String(s) => record.insert(&name, FieldValue::Scalar(s)),
            Value::Number(n) => record.insert(&name, FieldValue::Scalar(n.to_string())),
            Value::Bool(b) => record.insert(&name, FieldValue::Scalar(b.to_string())),
            Value::Object(child) => {
                record.insert(&name, FieldValue::Child(Box::new(object_to_record(line, child))))
            }
            Value::Array(items) => {
                let nested = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(child) => Some(object_to_record(line, child)),
                        Value::Null => None,
                        // Bare scalars inside arrays become single-field records
                        other => Some(Record::new(line).with("value", &scalar_text(&other))),
                    })
                    .collect();
                record.insert(&name, FieldValue::Nested(nested));
            }
        }
    }

    record
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Iterator for JsonTreeSource {
    type Item = IngestResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, item) = self.items.next()?;
        let line = index + 1;

        Some(match item {
            Value::Object(object) => Ok(object_to_record(line, object)),
            other => Err(IngestError::MalformedInput {
                source_name: self.source_name.clone(),
                line,
                message: format!("expected an object, found {}", json_type(&other)),
            }),
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// SOURCE KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Alleles,
    Genes,
    Orthologues,
    Diseases,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Alleles => "alleles",
            SourceKind::Genes => "genes",
            SourceKind::Orthologues => "orthologues",
            SourceKind::Diseases => "diseases",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alleles" | "allele" | "phenotypes" => Ok(SourceKind::Alleles),
            "genes" | "gene" => Ok(SourceKind::Genes),
            "orthologues" | "orthologs" | "orthologue" => Ok(SourceKind::Orthologues),
            "diseases" | "disease" => Ok(SourceKind::Diseases),
            other => Err(format!(
                "unknown source `{}` (expected alleles, genes, orthologues or diseases)",
                other
            )),
        }
    }
}

/// Detect the source kind from a file name
///
/// ```text
/// detect_source("pombe-cerevisiae-orthologs.txt") -> Orthologues
/// detect_source("phenotype_annotations.pombase.phaf") -> Alleles
/// detect_source("genes.json") -> Genes
/// ```
pub fn detect_source(file_path: &Path) -> Result<SourceKind> {
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let filename_lower = filename.to_lowercase();

    if filename_lower.contains("ortholog") {
        return Ok(SourceKind::Orthologues);
    }

    if filename_lower.contains("disease") {
        return Ok(SourceKind::Diseases);
    }

    if filename_lower.contains("allele") || filename_lower.contains("phenotype") {
        return Ok(SourceKind::Alleles);
    }

    if filename_lower.contains("gene") || filename_lower.ends_with(".json") {
        return Ok(SourceKind::Genes);
    }

    Err(anyhow!(
        "Could not detect source type from filename: {} (use --source)",
        filename
    ))
}
