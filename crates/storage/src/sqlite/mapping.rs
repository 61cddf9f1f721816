use crate::repository::StorageError;

pub(super) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(super) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

pub(super) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Encodes the answers column as a JSON array (`[1,-1,3]`).
pub(super) fn encode_answers(answers: &[i8]) -> Result<String, StorageError> {
    serde_json::to_string(answers).map_err(ser)
}

pub(super) fn decode_answers(raw: &str) -> Result<Vec<i8>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(super) fn encode_options(options: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(options).map_err(ser)
}

pub(super) fn decode_options(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}
