// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub(crate) mod aws_sourced;
pub(crate) mod file_sourced;
pub(crate) mod url_sourced;

use crate::Result;
use crate::errors::CredentialsError;
use serde_json::Value;

const JSON_FORMAT_TYPE: &str = "json";

/// Extracts the subject token from a `text` or `json` formatted payload.
pub(crate) fn parse_subject_token(
    content: String,
    format: &str,
    subject_token_field_name: &str,
) -> Result<String> {
    if format != JSON_FORMAT_TYPE {
        return Ok(content);
    }
    let json: Value = serde_json::from_str(&content).map_err(CredentialsError::non_retryable)?;
    match json.get(subject_token_field_name) {
        Some(Value::String(token)) => Ok(token.clone()),
        None | Some(_) => Err(CredentialsError::non_retryable_from_str(format!(
            "failed to read subject token field `{subject_token_field_name}` as string, body=<{json}>"
        ))),
    }
}
