//! Record types decoded from model completions and task endpoints.
//!
//! Every shape is validated in one place through [`decode_record`] instead of
//! hand-written guards at each call site.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::domain::error::{AppError, Result};

pub fn decode_record<T>(value: Value) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let record: T = serde_json::from_value(value)
        .map_err(|e| AppError::ValidationError(format!("Unexpected record shape: {}", e)))?;
    record
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    Ok(record)
}

/// `{ "result": ... }` answer envelope. A missing field is rejected, `null` is not.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ResultObj {
    #[serde(deserialize_with = "required_nullable")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPage {
    #[serde(deserialize_with = "required_nullable")]
    pub answer: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImagesData {
    #[validate(length(min = 1))]
    pub base_url: String,
    #[validate(nested)]
    pub files: Vec<ImageFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageFile {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub full_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MsgId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyMessage {
    pub text: String,
    #[serde(rename = "msgID")]
    pub msg_id: MsgId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct DroneDescription {
    #[validate(length(min = 1))]
    pub description: String,
}

fn required_nullable<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}
