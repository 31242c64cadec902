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

use super::parse_subject_token;
use crate::Result;
use crate::credentials::external_account::CredentialSourceFormat;
use crate::credentials::subject_token::SubjectTokenProvider;
use crate::errors::CredentialsError;

/// Reads the subject token from a local file, e.g. a Kubernetes projected
/// service account token.
#[derive(Debug, Clone)]
pub(crate) struct FileSourcedCredentials {
    pub file: String,
    pub format: String,
    pub subject_token_field_name: String,
}

impl FileSourcedCredentials {
    pub(crate) fn new(file: String, format: Option<CredentialSourceFormat>) -> Self {
        let (format, subject_token_field_name) = CredentialSourceFormat::split(format);
        Self {
            file,
            format,
            subject_token_field_name,
        }
    }
}

#[async_trait::async_trait]
impl SubjectTokenProvider for FileSourcedCredentials {
    async fn subject_token(&self) -> Result<String> {
        let content = tokio::fs::read_to_string(&self.file).await.map_err(|e| {
            CredentialsError::from_str(
                false,
                format!("failed to read subject token file {}: {e}", self.file),
            )
        })?;
        parse_subject_token(content, &self.format, &self.subject_token_field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    type TestResult = anyhow::Result<()>;

    fn create_temp_file(content: &str) -> std::io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(content.as_bytes())?;
        Ok(file)
    }

    #[tokio::test]
    async fn get_text_token() -> TestResult {
        let file = create_temp_file("an_example_token")?;
        let token_provider =
            FileSourcedCredentials::new(file.path().to_string_lossy().into_owned(), None);
        let resp = token_provider.subject_token().await?;
        assert_eq!(resp, "an_example_token");
        Ok(())
    }

    #[tokio::test]
    async fn get_json_token() -> TestResult {
        let body = json!({"id_token": "an_example_token"}).to_string();
        let file = create_temp_file(&body)?;
        let token_provider = FileSourcedCredentials::new(
            file.path().to_string_lossy().into_owned(),
            Some(CredentialSourceFormat {
                format_type: "json".into(),
                subject_token_field_name: Some("id_token".into()),
            }),
        );
        let resp = token_provider.subject_token().await?;
        assert_eq!(resp, "an_example_token");
        Ok(())
    }

    #[tokio::test]
    async fn missing_file() {
        let token_provider =
            FileSourcedCredentials::new("/this/path/does/not/exist".to_string(), None);
        let err = token_provider.subject_token().await.unwrap_err();
        assert!(!err.is_retryable(), "{err:?}");
        assert!(err.to_string().contains("/this/path/does/not/exist"), "{err}");
    }
}
