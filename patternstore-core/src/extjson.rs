//! Extended JSON codec.
//!
//! JSON has no way to express dates, object identifiers, references between documents,
//! regular expressions or raw bytes. Callers send those as single-purpose tagged mappings,
//! and this module translates between those mappings and native [`Bson`] values:
//!
//! | native value                 | wire form                                          |
//! |------------------------------|----------------------------------------------------|
//! | `Bson::DateTime`             | `{"$date": "2017-03-13T16:21:18.000Z"}`            |
//! | `Bson::ObjectId`             | `{"$oid": "58c6c65ed78c6a977a0041a8"}`             |
//! | DBRef document               | `{"$ref": "users", "$id": {"$oid": "..."}}`        |
//! | `Bson::RegularExpression`    | `{"$regex": "^jac", "$options": "i"}`              |
//! | `Bson::Binary`               | `{"$binary": "aGVsbG8=", "$type": "00"}`           |
//! | `Bson::Int64`                | `{"$numberLong": "9007199254740993"}`              |
//! | non-finite `Bson::Double`    | `{"$numberDouble": "NaN"}`                         |
//!
//! The tag set is closed: a mapping is only treated as tagged when its key set is exactly
//! one of the shapes above. Anything else, including `{"$set": ...}` style operators, is an
//! ordinary mapping and passes through unchanged. A mapping that *is* tag-shaped but carries
//! a bad payload is rejected rather than stored as-is.
//!
//! [`encode`] and [`decode`] are inverse over the supported types, and [`encode`] is
//! deterministic.

use base64::{Engine, engine::general_purpose::STANDARD};
use bson::{
    Binary, Bson, DateTime, Document, Regex, error::Error as BsonError, oid::ObjectId,
    spec::BinarySubtype,
};
use chrono::{DateTime as ChronoDateTime, Datelike, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::error::PatternError;

pub const DATE_TAG: &str = "$date";
pub const OID_TAG: &str = "$oid";
pub const REF_TAG: &str = "$ref";
pub const REF_ID_TAG: &str = "$id";
pub const REF_DB_TAG: &str = "$db";
pub const REGEX_TAG: &str = "$regex";
pub const REGEX_OPTIONS_TAG: &str = "$options";
pub const BINARY_TAG: &str = "$binary";
pub const BINARY_TYPE_TAG: &str = "$type";
pub const LONG_TAG: &str = "$numberLong";
pub const DOUBLE_TAG: &str = "$numberDouble";

const LOG_TARGET: &str = "patternstore::extjson";

/// Regular expression flags accepted in `$options`.
const REGEX_FLAGS: &str = "ilmsux";

/// A tag-shaped mapping whose payload could not be turned into a native value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{tag}: {reason}")]
pub struct ExtJsonError {
    pub tag: &'static str,
    pub reason: String,
}

impl ExtJsonError {
    fn new(tag: &'static str, reason: impl Into<String>) -> Self {
        Self { tag, reason: reason.into() }
    }
}

impl From<ExtJsonError> for PatternError {
    fn from(err: ExtJsonError) -> Self {
        PatternError::MalformedExtendedValue(err.to_string())
    }
}

/// A recognised tagged mapping, borrowed from the wire value.
#[derive(Debug)]
enum Tagged<'a> {
    Date(&'a Value),
    ObjectId(&'a Value),
    Reference {
        collection: &'a Value,
        id: &'a Value,
        database: Option<&'a Value>,
    },
    Pattern {
        source: &'a Value,
        options: Option<&'a Value>,
    },
    Binary {
        payload: &'a Value,
        subtype: &'a Value,
    },
    Int64(&'a Value),
    Double(&'a Value),
}

impl<'a> Tagged<'a> {
    /// Matches the exact key set of a mapping against the closed tag set.
    fn classify(map: &'a Map<String, Value>) -> Option<Self> {
        let shaped = |keys: &[&str]| map.len() == keys.len() && keys.iter().all(|key| map.contains_key(*key));

        if shaped(&[DATE_TAG]) {
            Some(Tagged::Date(&map[DATE_TAG]))
        } else if shaped(&[OID_TAG]) {
            Some(Tagged::ObjectId(&map[OID_TAG]))
        } else if shaped(&[LONG_TAG]) {
            Some(Tagged::Int64(&map[LONG_TAG]))
        } else if shaped(&[DOUBLE_TAG]) {
            Some(Tagged::Double(&map[DOUBLE_TAG]))
        } else if shaped(&[REF_TAG, REF_ID_TAG]) || shaped(&[REF_TAG, REF_ID_TAG, REF_DB_TAG]) {
            Some(Tagged::Reference {
                collection: &map[REF_TAG],
                id: &map[REF_ID_TAG],
                database: map.get(REF_DB_TAG),
            })
        } else if shaped(&[REGEX_TAG]) || shaped(&[REGEX_TAG, REGEX_OPTIONS_TAG]) {
            Some(Tagged::Pattern {
                source: &map[REGEX_TAG],
                options: map.get(REGEX_OPTIONS_TAG),
            })
        } else if shaped(&[BINARY_TAG, BINARY_TYPE_TAG]) {
            Some(Tagged::Binary {
                payload: &map[BINARY_TAG],
                subtype: &map[BINARY_TYPE_TAG],
            })
        } else {
            None
        }
    }

    fn into_bson(self) -> Result<Bson, ExtJsonError> {
        match self {
            Tagged::Date(payload) => decode_date(payload).map(Bson::DateTime),
            Tagged::ObjectId(payload) => {
                let hex = payload
                    .as_str()
                    .ok_or_else(|| ExtJsonError::new(OID_TAG, "expected a hex string"))?;

                ObjectId::parse_str(hex)
                    .map(Bson::ObjectId)
                    .map_err(|e| ExtJsonError::new(OID_TAG, e.to_string()))
            }
            Tagged::Reference { collection, id, database } => {
                let collection = collection
                    .as_str()
                    .ok_or_else(|| ExtJsonError::new(REF_TAG, "collection must be a string"))?;

                let mut reference = Document::new();
                reference.insert(REF_TAG, collection);
                reference.insert(REF_ID_TAG, decode(id)?);

                if let Some(database) = database {
                    let database = database
                        .as_str()
                        .ok_or_else(|| ExtJsonError::new(REF_DB_TAG, "database must be a string"))?;
                    reference.insert(REF_DB_TAG, database);
                }

                Ok(Bson::Document(reference))
            }
            Tagged::Pattern { source, options } => {
                let source = source
                    .as_str()
                    .ok_or_else(|| ExtJsonError::new(REGEX_TAG, "source must be a string"))?;
                let options = match options {
                    Some(value) => value
                        .as_str()
                        .ok_or_else(|| ExtJsonError::new(REGEX_OPTIONS_TAG, "options must be a string"))?,
                    None => "",
                };

                pattern(source, options).map(Bson::RegularExpression)
            }
            Tagged::Binary { payload, subtype } => {
                let payload = payload
                    .as_str()
                    .ok_or_else(|| ExtJsonError::new(BINARY_TAG, "expected a base64 string"))?;
                let subtype = subtype
                    .as_str()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| ExtJsonError::new(BINARY_TYPE_TAG, "expected a hex subtype"))?;
                let bytes = STANDARD
                    .decode(payload)
                    .map_err(|e| ExtJsonError::new(BINARY_TAG, e.to_string()))?;

                Ok(Bson::Binary(Binary {
                    subtype: BinarySubtype::from(subtype),
                    bytes,
                }))
            }
            Tagged::Int64(payload) => decode_long(LONG_TAG, payload).map(Bson::Int64),
            Tagged::Double(payload) => {
                let text = payload
                    .as_str()
                    .ok_or_else(|| ExtJsonError::new(DOUBLE_TAG, "expected a numeric string"))?;

                match text {
                    "NaN" => Ok(Bson::Double(f64::NAN)),
                    "Infinity" => Ok(Bson::Double(f64::INFINITY)),
                    "-Infinity" => Ok(Bson::Double(f64::NEG_INFINITY)),
                    _ => text
                        .parse::<f64>()
                        .map(Bson::Double)
                        .map_err(|e| ExtJsonError::new(DOUBLE_TAG, e.to_string())),
                }
            }
        }
    }
}

/// Builds a native regular expression, validating and sorting its flags.
pub fn pattern(source: &str, options: &str) -> Result<Regex, ExtJsonError> {
    if let Some(flag) = options.chars().find(|flag| !REGEX_FLAGS.contains(*flag)) {
        return Err(ExtJsonError::new(
            REGEX_OPTIONS_TAG,
            format!("unsupported flag '{flag}'"),
        ));
    }

    let mut flags = options.chars().collect::<Vec<_>>();
    flags.sort_unstable();
    flags.dedup();

    Ok(Regex {
        pattern: source.to_string().try_into().map_err(malformed(REGEX_TAG))?,
        options: flags
            .into_iter()
            .collect::<String>()
            .try_into()
            .map_err(malformed(REGEX_OPTIONS_TAG))?,
    })
}

fn malformed(tag: &'static str) -> impl Fn(BsonError) -> ExtJsonError {
    move |e| ExtJsonError::new(tag, e.to_string())
}

fn decode_long(tag: &'static str, payload: &Value) -> Result<i64, ExtJsonError> {
    payload
        .as_str()
        .ok_or_else(|| ExtJsonError::new(tag, "expected a decimal string"))?
        .parse::<i64>()
        .map_err(|e| ExtJsonError::new(tag, e.to_string()))
}

fn decode_date(payload: &Value) -> Result<DateTime, ExtJsonError> {
    match payload {
        Value::String(text) => ChronoDateTime::parse_from_rfc3339(text)
            .map(|date| DateTime::from_millis(date.timestamp_millis()))
            .map_err(|e| ExtJsonError::new(DATE_TAG, format!("'{text}' is not an RFC 3339 date: {e}"))),
        Value::Number(millis) => millis
            .as_i64()
            .map(DateTime::from_millis)
            .ok_or_else(|| ExtJsonError::new(DATE_TAG, "milliseconds must be an integer")),
        Value::Object(map) if map.len() == 1 && map.contains_key(LONG_TAG) => {
            decode_long(DATE_TAG, &map[LONG_TAG]).map(DateTime::from_millis)
        }
        _ => Err(ExtJsonError::new(DATE_TAG, "expected a date string or milliseconds")),
    }
}

fn encode_date(date: &DateTime) -> Value {
    let millis = date.timestamp_millis();

    match ChronoDateTime::<Utc>::from_timestamp_millis(millis) {
        // RFC 3339 only covers four-digit years.
        Some(utc) if (0..=9999).contains(&utc.year()) => {
            tagged(DATE_TAG, Value::String(utc.to_rfc3339_opts(SecondsFormat::Millis, true)))
        }
        _ => tagged(DATE_TAG, tagged(LONG_TAG, Value::String(millis.to_string()))),
    }
}

fn tagged(tag: &str, payload: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), payload);
    Value::Object(map)
}

fn decode_number(number: &Number) -> Bson {
    match number.as_i64() {
        Some(value) => match i32::try_from(value) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(value),
        },
        None => Bson::Double(number.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Decodes a wire value into its native form.
///
/// # Errors
///
/// Returns an [`ExtJsonError`] when a tag-shaped mapping, at any depth, carries an invalid payload.
pub fn decode(value: &Value) -> Result<Bson, ExtJsonError> {
    match value {
        Value::Null => Ok(Bson::Null),
        Value::Bool(flag) => Ok(Bson::Boolean(*flag)),
        Value::Number(number) => Ok(decode_number(number)),
        Value::String(text) => Ok(Bson::String(text.clone())),
        Value::Array(items) => items
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()
            .map(Bson::Array),
        Value::Object(map) => match Tagged::classify(map) {
            Some(tagged) => tagged.into_bson(),
            None => decode_map(map).map(Bson::Document),
        },
    }
}

/// Decodes every value of a mapping, keeping key order.
pub fn decode_map(map: &Map<String, Value>) -> Result<Document, ExtJsonError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), decode(value)?)))
        .collect()
}

/// Encodes a native value into its wire form.
pub fn encode(value: &Bson) -> Value {
    match value {
        Bson::Null => Value::Null,
        Bson::Boolean(flag) => Value::Bool(*flag),
        Bson::Int32(number) => Value::from(*number),
        Bson::Int64(number) => tagged(LONG_TAG, Value::String(number.to_string())),
        Bson::Double(number) => match Number::from_f64(*number) {
            Some(finite) => Value::Number(finite),
            None if number.is_nan() => tagged(DOUBLE_TAG, Value::String("NaN".into())),
            None if number.is_sign_positive() => tagged(DOUBLE_TAG, Value::String("Infinity".into())),
            None => tagged(DOUBLE_TAG, Value::String("-Infinity".into())),
        },
        Bson::String(text) => Value::String(text.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(encode).collect()),
        Bson::Document(document) => encode_document(document),
        Bson::ObjectId(oid) => tagged(OID_TAG, Value::String(oid.to_hex())),
        Bson::DateTime(date) => encode_date(date),
        Bson::RegularExpression(regex) => {
            let mut map = Map::with_capacity(2);
            map.insert(REGEX_TAG.to_string(), Value::String(regex.pattern.as_str().to_string()));
            map.insert(REGEX_OPTIONS_TAG.to_string(), Value::String(regex.options.as_str().to_string()));
            Value::Object(map)
        }
        Bson::Binary(binary) => {
            let mut map = Map::with_capacity(2);
            map.insert(BINARY_TAG.to_string(), Value::String(STANDARD.encode(&binary.bytes)));
            map.insert(
                BINARY_TYPE_TAG.to_string(),
                Value::String(format!("{:02x}", u8::from(binary.subtype))),
            );
            Value::Object(map)
        }
        // Timestamps, decimals, code and min/max keys keep BSON's own serde form.
        other => serde_json::to_value(other).unwrap_or_else(|e| {
            tracing::warn!(
                target: LOG_TARGET,
                element_type = ?other.element_type(),
                error = %e,
                "Value has no JSON form, encoding it as null"
            );
            Value::Null
        }),
    }
}

/// Encodes a document into a wire mapping, keeping key order.
pub fn encode_document(document: &Document) -> Value {
    Value::Object(
        document
            .iter()
            .map(|(key, value)| (key.clone(), encode(value)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    fn fixed_oid() -> ObjectId {
        ObjectId::parse_str("58c6c65ed78c6a977a0041a8").unwrap()
    }

    fn assert_round_trip(value: Bson) {
        let wire = encode(&value);
        assert_eq!(decode(&wire).unwrap(), value, "wire form was {wire}");
    }

    #[test]
    fn every_supported_type_round_trips() {
        assert_round_trip(Bson::DateTime(DateTime::from_millis(1_489_422_078_123)));
        assert_round_trip(Bson::ObjectId(fixed_oid()));
        assert_round_trip(Bson::Document(doc! { "$ref": "test", "$id": fixed_oid() }));
        assert_round_trip(Bson::Document(doc! { "$ref": "test", "$id": fixed_oid(), "$db": "other" }));
        assert_round_trip(Bson::RegularExpression(pattern("^jac", "i").unwrap()));
        assert_round_trip(Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![0, 1, 2, 254, 255],
        }));
        assert_round_trip(Bson::Int64(42));
        assert_round_trip(Bson::Int32(42));
        assert_round_trip(Bson::Double(1.5));
        assert_round_trip(Bson::Double(f64::INFINITY));
        assert_round_trip(Bson::String("plain".into()));
        assert_round_trip(Bson::Boolean(true));
        assert_round_trip(Bson::Null);
    }

    #[test]
    fn nested_values_round_trip() {
        let document = doc! {
            "name": "peter",
            "created": DateTime::from_millis(0),
            "owner": { "$ref": "users", "$id": fixed_oid() },
            "history": [
                { "at": DateTime::from_millis(86_400_000), "by": fixed_oid() },
                [ Bson::Int64(7), Bson::RegularExpression(pattern("a.b", "mi").unwrap()) ],
            ],
        };

        assert_round_trip(Bson::Document(document));
    }

    #[test]
    fn encoding_uses_the_stable_tag_names() {
        let document = doc! {
            "date": DateTime::from_millis(1_489_422_078_123),
            "objectId": fixed_oid(),
            "ref": { "$ref": "test", "$id": fixed_oid() },
            "name": Bson::RegularExpression(pattern("^jac", "i").unwrap()),
        };

        assert_eq!(
            encode_document(&document),
            json!({
                "date": { "$date": "2017-03-13T16:21:18.123Z" },
                "objectId": { "$oid": "58c6c65ed78c6a977a0041a8" },
                "ref": { "$ref": "test", "$id": { "$oid": "58c6c65ed78c6a977a0041a8" } },
                "name": { "$regex": "^jac", "$options": "i" },
            })
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let document = Bson::Document(doc! { "a": DateTime::from_millis(5), "b": Bson::Int64(9) });

        assert_eq!(encode(&document), encode(&document));
    }

    #[test]
    fn dates_outside_rfc3339_fall_back_to_milliseconds() {
        let far_future = DateTime::from_millis(i64::MAX);

        assert_eq!(
            encode(&Bson::DateTime(far_future)),
            json!({ "$date": { "$numberLong": i64::MAX.to_string() } })
        );
        assert_round_trip(Bson::DateTime(far_future));
    }

    #[test]
    fn dates_accept_offsets_and_milliseconds() {
        let expected = Bson::DateTime(DateTime::from_millis(1_489_422_078_123));

        assert_eq!(decode(&json!({ "$date": "2017-03-13T17:21:18.123+01:00" })).unwrap(), expected);
        assert_eq!(decode(&json!({ "$date": 1_489_422_078_123_i64 })).unwrap(), expected);
    }

    #[test]
    fn plain_json_passes_through() {
        let wire = json!({ "$set": { "name": "nadja" }, "count": 3, "tags": ["a", "b"], "$type": "string" });
        let decoded = decode(&wire).unwrap();

        assert_eq!(
            decoded,
            Bson::Document(doc! {
                "$set": { "name": "nadja" },
                "count": 3,
                "tags": ["a", "b"],
                "$type": "string",
            })
        );
        assert_eq!(encode(&decoded), wire);
    }

    #[test]
    fn mappings_with_extra_keys_are_not_tags() {
        let wire = json!({ "$oid": "not hex", "note": "kept" });

        assert_eq!(
            decode(&wire).unwrap(),
            Bson::Document(doc! { "$oid": "not hex", "note": "kept" })
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let cases = [
            (json!({ "$oid": "58c6c65ed78c6a977a0041" }), OID_TAG),
            (json!({ "$oid": 12 }), OID_TAG),
            (json!({ "$date": "yesterday" }), DATE_TAG),
            (json!({ "$ref": 5, "$id": { "$oid": "58c6c65ed78c6a977a0041a8" } }), REF_TAG),
            (json!({ "$ref": "test", "$id": { "$oid": "zz" } }), OID_TAG),
            (json!({ "$regex": "^a", "$options": "q" }), REGEX_OPTIONS_TAG),
            (json!({ "$binary": "***", "$type": "00" }), BINARY_TAG),
            (json!({ "$numberLong": "twelve" }), LONG_TAG),
        ];

        for (wire, tag) in cases {
            let err = decode(&json!({ "nested": [wire.clone()] })).unwrap_err();
            assert_eq!(err.tag, tag, "decoding {wire}");
        }
    }

    #[test]
    fn malformed_payload_becomes_a_pattern_error() {
        let err = PatternError::from(decode(&json!({ "$oid": "xyz" })).unwrap_err());

        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedExtendedValue);
    }

    #[test]
    fn unsupported_types_keep_their_bson_form() {
        let encoded = encode(&Bson::Timestamp(bson::Timestamp { time: 7, increment: 1 }));

        assert_ne!(encoded, Value::Null);
        assert_eq!(encoded["$timestamp"]["t"], json!(7));
    }

    #[test]
    fn regex_sources_cannot_hold_nul_bytes() {
        let err = decode(&json!({ "$regex": "a\u{0}b", "$options": "i" })).unwrap_err();

        assert_eq!(err.tag, REGEX_TAG);
        assert_eq!(pattern("^jac", "i").unwrap().options.as_str(), "i");
    }

    #[test]
    fn regex_flags_are_sorted() {
        let decoded = decode(&json!({ "$regex": "x", "$options": "xmi" })).unwrap();

        assert_eq!(encode(&decoded), json!({ "$regex": "x", "$options": "imx" }));
    }

    #[test]
    fn large_integers_stay_integers() {
        assert_eq!(decode(&json!(3_000_000_000_i64)).unwrap(), Bson::Int64(3_000_000_000));
        assert_eq!(decode(&json!(12)).unwrap(), Bson::Int32(12));
    }
}
