use std::collections::HashMap;

use axum::extract::Multipart;
use hypertext::prelude::*;

use crate::{
    template::Page,
    util_resp::FailureResponse,
    widgets::alert::ErrorAlert,
};

pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A fully buffered multipart submission.
#[derive(Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, FailureResponse> {
        let mut form = MultipartForm::default();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return Err(malformed(e.body_text())),
            };

            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| malformed(e.body_text()))?;
                    // Browsers send an empty part for an untouched file input.
                    if !filename.is_empty() && !bytes.is_empty() {
                        form.files.insert(
                            name,
                            UploadedFile {
                                filename,
                                bytes: bytes.to_vec(),
                            },
                        );
                    }
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| malformed(e.body_text()))?;
                    form.fields.push((name, text));
                }
            }
        }

        Ok(form)
    }

    /// First value submitted for `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn text_or_empty(&self, name: &str) -> &str {
        self.text(name).unwrap_or_default()
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.fields
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    #[cfg(test)]
    pub fn from_fields(fields: &[(&str, &str)]) -> MultipartForm {
        MultipartForm {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }
}

fn malformed(reason: String) -> FailureResponse {
    tracing::warn!("malformed multipart body: {reason}");
    FailureResponse::BadRequest(
        Page::new()
            .body(maud! {
                ErrorAlert msg=(format!("The submitted form could not be read: {reason}"));
            })
            .render(),
    )
}
