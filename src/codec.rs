//! Row decoding for the fire calls dataset.
//!
//! A raw CSV record is a list of strings. Decoding turns it into a
//! [`DecodedRow`]: exactly [`COLUMN_COUNT`] typed, nullable values laid out in
//! the same positional order as the `fire_calls` table.
//!
//! Decoding is lenient about values and strict about shape:
//! - a record with the wrong number of fields is rejected
//! - a numeric field that does not parse becomes `NULL`
//! - the boolean field is never `NULL`

use crate::error::ImportError;

/// Number of columns in a fire calls record.
pub const COLUMN_COUNT: usize = 28;

/// One CSV line, split into fields.
pub type RawRecord = Vec<String>;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
}

/// Target columns in positional order.
pub const COLUMNS: [(&str, FieldKind); COLUMN_COUNT] = [
    ("call_number", FieldKind::Text),
    ("unit_id", FieldKind::Text),
    ("incident_number", FieldKind::Integer),
    ("call_type", FieldKind::Text),
    ("call_date", FieldKind::Text),
    ("watch_date", FieldKind::Text),
    ("call_final_disposition", FieldKind::Text),
    ("available_dt_tm", FieldKind::Text),
    ("address", FieldKind::Text),
    ("city", FieldKind::Text),
    ("zipcode", FieldKind::Text),
    ("battalion", FieldKind::Text),
    ("station_area", FieldKind::Text),
    ("box", FieldKind::Text),
    ("original_priority", FieldKind::Integer),
    ("priority", FieldKind::Integer),
    ("final_priority", FieldKind::Integer),
    ("als_unit", FieldKind::Boolean),
    ("call_type_group", FieldKind::Text),
    ("num_alarms", FieldKind::Integer),
    ("unit_type", FieldKind::Text),
    ("unit_sequence_in_call_dispatch", FieldKind::Integer),
    ("fire_prevention_district", FieldKind::Text),
    ("supervisor_district", FieldKind::Text),
    ("neighborhood", FieldKind::Text),
    ("location", FieldKind::Text),
    ("row_id", FieldKind::Text),
    ("delay", FieldKind::Float),
];

/// A single typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Integer(Option<i32>),
    Float(Option<f64>),
    Boolean(bool),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Text(v) => v.is_none(),
            FieldValue::Integer(v) => v.is_none(),
            FieldValue::Float(v) => v.is_none(),
            FieldValue::Boolean(_) => false,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Boolean(_) => FieldKind::Boolean,
        }
    }
}

/// A fully decoded record, one value per column of `fire_calls`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow(pub [FieldValue; COLUMN_COUNT]);

impl DecodedRow {
    pub fn values(&self) -> &[FieldValue; COLUMN_COUNT] {
        &self.0
    }

    /// The primary key column (`row_id`).
    pub fn row_id(&self) -> Option<&str> {
        match &self.0[26] {
            FieldValue::Text(value) => value.as_deref(),
            _ => None,
        }
    }
}

/// Decode one raw record into a typed row.
///
/// Returns [`ImportError::MalformedRecord`] when the record does not have
/// exactly [`COLUMN_COUNT`] fields.
pub fn decode_record<S: AsRef<str>>(record: &[S]) -> Result<DecodedRow, ImportError> {
    if record.len() != COLUMN_COUNT {
        return Err(ImportError::MalformedRecord {
            expected: COLUMN_COUNT,
            actual: record.len(),
        });
    }

    let values = std::array::from_fn(|idx| {
        let raw = record[idx].as_ref();
        match COLUMNS[idx].1 {
            FieldKind::Text => FieldValue::Text(parse_text(raw)),
            FieldKind::Integer => FieldValue::Integer(parse_integer(raw)),
            FieldKind::Float => FieldValue::Float(parse_float(raw)),
            FieldKind::Boolean => FieldValue::Boolean(parse_bool(raw)),
        }
    });

    Ok(DecodedRow(values))
}

fn parse_text(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

// Unparsable input is stored as NULL rather than rejecting the row.
fn parse_integer(raw: &str) -> Option<i32> {
    if raw.is_empty() {
        return None;
    }
    raw.parse::<i32>().ok()
}

fn parse_float(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok()
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "t" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Vec<String> {
        let fields = [
            "20110016",
            "T13",
            "2003235",
            "Structure Fire",
            "01/11/2002",
            "01/10/2002",
            "Other",
            "01/11/2002 01:51:44 AM",
            "2000 Block of CALIFORNIA ST",
            "SF",
            "94109",
            "B04",
            "38",
            "3362",
            "3",
            "3",
            "3",
            "false",
            "",
            "1",
            "TRUCK",
            "2",
            "4",
            "5",
            "Pacific Heights",
            "(37.7895840679362, -122.428071912459)",
            "020110016-T13",
            "2.95",
        ];
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decodes_every_column_by_kind() {
        let row = decode_record(&sample_record()).expect("valid record");
        let values = row.values();

        assert_eq!(values.len(), COLUMN_COUNT);
        assert_eq!(values[0], FieldValue::Text(Some("20110016".to_string())));
        assert_eq!(values[2], FieldValue::Integer(Some(2003235)));
        assert_eq!(values[17], FieldValue::Boolean(false));
        assert_eq!(values[18], FieldValue::Text(None));
        assert_eq!(values[27], FieldValue::Float(Some(2.95)));
        assert_eq!(row.row_id(), Some("020110016-T13"));

        for (value, (_, kind)) in values.iter().zip(COLUMNS.iter()) {
            assert_eq!(value.kind(), *kind);
        }
    }

    #[test]
    fn rejects_wrong_field_count() {
        let mut short = sample_record();
        short.pop();
        match decode_record(&short) {
            Err(ImportError::MalformedRecord { expected, actual }) => {
                assert_eq!(expected, 28);
                assert_eq!(actual, 27);
            }
            other => panic!("expected malformed record, got {other:?}"),
        }

        let mut long = sample_record();
        long.push("extra".to_string());
        assert!(matches!(
            decode_record(&long),
            Err(ImportError::MalformedRecord { actual: 29, .. })
        ));

        let empty: Vec<String> = Vec::new();
        assert!(decode_record(&empty).is_err());
    }

    #[test]
    fn unparsable_numbers_become_null() {
        let mut record = sample_record();
        record[2] = "abc".to_string();
        record[14] = "99999999999".to_string();
        record[27] = "n/a".to_string();
        let row = decode_record(&record).expect("valid record");

        assert_eq!(row.values()[2], FieldValue::Integer(None));
        assert_eq!(row.values()[14], FieldValue::Integer(None));
        assert_eq!(row.values()[27], FieldValue::Float(None));
    }

    #[test]
    fn text_is_passed_through_verbatim() {
        let mut record = sample_record();
        record[8] = "  padded, \"quoted\"  ".to_string();
        let row = decode_record(&record).expect("valid record");
        assert_eq!(
            row.values()[8],
            FieldValue::Text(Some("  padded, \"quoted\"  ".to_string()))
        );
    }

    #[test]
    fn boolean_is_never_null() {
        let cases = [
            ("true", true),
            ("TRUE", true),
            (" t ", true),
            ("1", true),
            ("T", true),
            ("false", false),
            ("yes", false),
            ("0", false),
            ("", false),
        ];
        for (raw, expected) in cases {
            let mut record = sample_record();
            record[17] = raw.to_string();
            let row = decode_record(&record).expect("valid record");
            assert_eq!(row.values()[17], FieldValue::Boolean(expected), "input {raw:?}");
            assert!(!row.values()[17].is_null());
        }
    }

    #[test]
    fn decoding_is_repeatable() {
        let record = sample_record();
        let first = decode_record(&record).expect("valid record");
        let second = decode_record(&record).expect("valid record");
        assert_eq!(first, second);
    }

    #[test]
    fn all_empty_record_is_all_null_except_boolean() {
        let record = vec![String::new(); COLUMN_COUNT];
        let row = decode_record(&record).expect("valid record");
        for (idx, value) in row.values().iter().enumerate() {
            if idx == 17 {
                assert_eq!(*value, FieldValue::Boolean(false));
            } else {
                assert!(value.is_null(), "column {idx} should be null");
            }
        }
    }
}
