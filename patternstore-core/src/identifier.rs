//! Coercion of wire identifiers into store identifiers.

use bson::{Bson, oid::ObjectId};
use serde_json::Value;

use crate::{
    error::{PatternError, PatternResult},
    extjson::{self, OID_TAG},
};

/// Parses the `id` field of a pattern into an [`ObjectId`].
///
/// The wire form is the 24 character hex string. The tagged `{"$oid": "..."}` form is
/// accepted as well, so an `_id` taken from an encoded document can be sent back as-is.
///
/// # Errors
///
/// Returns [`PatternError::InvalidIdentifier`] for any other value.
pub fn coerce_id(value: &Value) -> PatternResult<ObjectId> {
    match value {
        Value::String(hex) => parse_hex(hex),
        Value::Object(map) if map.len() == 1 && map.contains_key(OID_TAG) => match extjson::decode(value) {
            Ok(Bson::ObjectId(oid)) => Ok(oid),
            _ => Err(invalid(value)),
        },
        other => Err(invalid(other)),
    }
}

/// Parses a 24 character hex string into an [`ObjectId`].
pub fn parse_hex(hex: &str) -> PatternResult<ObjectId> {
    ObjectId::parse_str(hex).map_err(|e| PatternError::InvalidIdentifier(format!("'{hex}': {e}")))
}

/// Renders a stored identifier in its wire form: hex for object ids, encoded otherwise.
pub fn wire_id(id: &Bson) -> Value {
    match id {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => extjson::encode(other),
    }
}

fn invalid(value: &Value) -> PatternError {
    PatternError::InvalidIdentifier(format!("{value} is not an object id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn accepts_hex_in_either_case() {
        let lower = coerce_id(&json!("58c6c65ed78c6a977a0041a8")).unwrap();
        let upper = coerce_id(&json!("58C6C65ED78C6A977A0041A8")).unwrap();

        assert_eq!(lower, upper);
        assert_eq!(lower.to_hex(), "58c6c65ed78c6a977a0041a8");
    }

    #[test]
    fn accepts_the_tagged_form() {
        let oid = coerce_id(&json!({ "$oid": "58c6c65ed78c6a977a0041a8" })).unwrap();

        assert_eq!(oid.to_hex(), "58c6c65ed78c6a977a0041a8");
    }

    #[test]
    fn rejects_wrong_length_charset_and_type() {
        for value in [
            json!("58c6c65ed78c6a977a0041a"),
            json!("58c6c65ed78c6a977a0041a8ff"),
            json!("zzc6c65ed78c6a977a0041a8"),
            json!(""),
            json!(12),
            json!({ "$oid": "nope" }),
            json!({ "id": "58c6c65ed78c6a977a0041a8" }),
        ] {
            let err = coerce_id(&value).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidIdentifier, "coercing {value}");
        }
    }

    #[test]
    fn wire_id_uses_hex_for_object_ids() {
        let oid = ObjectId::parse_str("58c6c65ed78c6a977a0041a8").unwrap();

        assert_eq!(wire_id(&Bson::ObjectId(oid)), json!("58c6c65ed78c6a977a0041a8"));
        assert_eq!(wire_id(&Bson::String("custom".into())), json!("custom"));
    }
}
