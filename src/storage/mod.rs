//! Storage for question images and activity attachments.
//!
//! Files are handed to a [`BlobStore`], which returns the public URL that is
//! saved alongside the question or answer. The public id of a stored file is
//! the last path segment of its URL with the extension removed, which is
//! what [`BlobStore::destroy`] expects.

use std::{
    fs,
    path::{Path, PathBuf},
};

use uuid::Uuid;

pub mod upload;

/// File extensions accepted for activity attachments.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "pdf", "doc", "docx", "xls", "xlsx",
];

/// File extensions accepted for question images. Excludes `.svg`.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// Question illustrations.
    Image,
    /// Anything else, such as activity attachments.
    Raw,
}

impl ResourceType {
    fn folder(self) -> &'static str {
        match self {
            ResourceType::Image => "images",
            ResourceType::Raw => "attachments",
        }
    }

    pub fn accepts(self, filename: &str) -> bool {
        match self {
            ResourceType::Image => extension(filename)
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str())),
            ResourceType::Raw => allowed_file(filename),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("files of type `{0}` are not accepted")]
    DisallowedExtension(String),
    #[error("no stored file has the public id `{0}`")]
    Missing(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns the public URL of the new file.
    fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        resource_type: ResourceType,
    ) -> Result<String, BlobError>;

    fn destroy(
        &self,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<(), BlobError>;
}

pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

pub fn allowed_file(filename: &str) -> bool {
    extension(filename)
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// `https://host/a/b/abc123.png` -> `abc123`
pub fn public_id_from_url(url: &str) -> Option<&str> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    let id = last.split('.').next()?;
    (!id.is_empty()).then_some(id)
}

/// Removes the file behind `url`, logging instead of failing. Used when a
/// question is deleted or its image replaced.
pub fn destroy_quietly(
    store: &dyn BlobStore,
    url: &str,
    resource_type: ResourceType,
) {
    let Some(public_id) = public_id_from_url(url) else {
        tracing::warn!(url, "could not derive a public id from stored url");
        return;
    };
    match store.destroy(public_id, resource_type) {
        Ok(()) => tracing::info!(public_id, "removed stored file"),
        Err(e) => tracing::error!(public_id, "could not remove stored file: {e}"),
    }
}

/// Writes files below a local directory, which the router serves under
/// [`crate::config::UPLOADS_PREFIX`].
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(
        root: impl AsRef<Path>,
        public_prefix: &str,
    ) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        for resource_type in [ResourceType::Image, ResourceType::Raw] {
            fs::create_dir_all(root.join(resource_type.folder()))?;
        }
        Ok(Self {
            root,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        })
    }
}

impl BlobStore for LocalBlobStore {
    fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        resource_type: ResourceType,
    ) -> Result<String, BlobError> {
        let ext = extension(filename).unwrap_or_default();
        if !resource_type.accepts(filename) {
            return Err(BlobError::DisallowedExtension(ext));
        }

        let public_id = Uuid::now_v7().simple().to_string();
        let name = if ext.is_empty() {
            public_id
        } else {
            format!("{public_id}.{ext}")
        };

        fs::write(self.root.join(resource_type.folder()).join(&name), bytes)?;

        Ok(format!(
            "{}/{}/{}",
            self.public_prefix,
            resource_type.folder(),
            name
        ))
    }

    fn destroy(
        &self,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<(), BlobError> {
        let dir = self.root.join(resource_type.folder());
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(public_id) {
                fs::remove_file(path)?;
                return Ok(());
            }
        }
        Err(BlobError::Missing(public_id.to_string()))
    }
}
