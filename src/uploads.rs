//! Image upload handling: multipart parsing with MIME/size checks, disk
//! storage, and cleanup of files that an update made stale.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use rand::Rng;

use crate::db::models::DEFAULT_AVATAR;
use crate::error::{AppError, AppResult};

/// URL prefix under which stored files are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Where a kind of image lives and what it falls back to when removed.
#[derive(Debug, Clone, Copy)]
pub struct ImageSlot {
    pub dir: &'static str,
    pub placeholder: Option<&'static str>,
}

pub const AVATAR: ImageSlot = ImageSlot {
    dir: "profiles",
    placeholder: Some(DEFAULT_AVATAR),
};

pub const POST_IMAGE: ImageSlot = ImageSlot {
    dir: "posts",
    placeholder: None,
};

impl ImageSlot {
    fn is_placeholder(&self, reference: &str) -> bool {
        self.placeholder == Some(reference)
    }
}

#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug)]
pub enum ImageChange {
    Keep,
    Remove,
    Replace(ImageFile),
}

impl ImageChange {
    /// A new file wins over a simultaneous remove request.
    pub fn from_form(remove: bool, file: Option<ImageFile>) -> Self {
        match (file, remove) {
            (Some(file), _) => ImageChange::Replace(file),
            (None, true) => ImageChange::Remove,
            (None, false) => ImageChange::Keep,
        }
    }
}

/// Outcome of [`UploadStore::replace_image`]. `reference` is the value to
/// persist; `stale` must be discarded once that write has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub reference: Option<String>,
    pub stale: Option<String>,
    written: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for slot in [AVATAR, POST_IMAGE] {
            std::fs::create_dir_all(self.root.join(slot.dir))?;
        }
        Ok(())
    }

    /// Write `file` into the slot's directory and return its public reference.
    pub fn save(&self, slot: &ImageSlot, file: &ImageFile) -> io::Result<String> {
        let dir = self.root.join(slot.dir);
        std::fs::create_dir_all(&dir)?;
        let name = stored_name(&file.file_name, &file.content_type);
        std::fs::write(dir.join(&name), &file.data)?;
        Ok(format!("{}/{}/{}", PUBLIC_PREFIX, slot.dir, name))
    }

    /// Work out the new reference for an image field. Any new file is
    /// written here; deleting the previous one is left to
    /// [`UploadStore::discard_stale`] after the metadata update.
    pub fn replace_image(
        &self,
        slot: &ImageSlot,
        current: Option<&str>,
        change: ImageChange,
    ) -> io::Result<Replacement> {
        let current_owned = current.map(str::to_string);
        let removable = current.filter(|r| !slot.is_placeholder(r)).map(str::to_string);

        match change {
            ImageChange::Keep => Ok(Replacement {
                reference: current_owned,
                stale: None,
                written: None,
            }),
            ImageChange::Remove => match removable {
                Some(old) => Ok(Replacement {
                    reference: slot.placeholder.map(str::to_string),
                    stale: Some(old),
                    written: None,
                }),
                None => Ok(Replacement {
                    reference: current_owned,
                    stale: None,
                    written: None,
                }),
            },
            ImageChange::Replace(file) => {
                let reference = self.save(slot, &file)?;
                Ok(Replacement {
                    reference: Some(reference.clone()),
                    stale: removable,
                    written: Some(reference),
                })
            }
        }
    }

    pub fn discard_stale(&self, replacement: &Replacement) {
        if let Some(stale) = &replacement.stale {
            self.discard(stale);
        }
    }

    /// Undo the file write of a replacement whose metadata update failed.
    pub fn rollback(&self, replacement: &Replacement) {
        if let Some(written) = &replacement.written {
            self.discard(written);
        }
    }

    /// Best-effort delete of a stored file. A missing file is not an
    /// error, and no failure is ever propagated.
    pub fn discard(&self, reference: &str) -> bool {
        let Some(path) = self.resolve(reference) else {
            tracing::warn!("Refusing to delete unrecognised upload reference {}", reference);
            return false;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Deleted stored file {}", path.display());
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Map a public reference back onto the storage root.
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let rest = reference.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        let mut path = self.root.clone();
        for segment in rest.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return None;
            }
            path.push(segment);
        }
        Some(path)
    }
}

fn stored_name(original: &str, content_type: &str) -> String {
    let original = Path::new(original);
    let stem: String = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(40)
        .collect();
    let stem = if stem.is_empty() { "image".to_string() } else { stem };

    let ext = image_extension(content_type, original.extension().and_then(|e| e.to_str()));

    let suffix: [u8; 3] = rand::thread_rng().gen();
    let mut name = format!(
        "{}_{}_{}",
        stem,
        Utc::now().timestamp_millis(),
        hex::encode(suffix)
    );
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Extension for a stored file, always one registered for `content_type`.
/// The client's own extension is kept only when it is one of those, so a
/// stored file is always served back with an image type.
fn image_extension(content_type: &str, requested: Option<&str>) -> Option<&'static str> {
    let served_as_image = |ext: &&&str| {
        mime_guess::from_ext(ext)
            .first()
            .is_some_and(|m| is_raster(m.essence_str()))
    };
    let known = mime_guess::get_mime_extensions_str(content_type)?;
    requested
        .and_then(|r| {
            known
                .iter()
                .filter(served_as_image)
                .find(|k| k.eq_ignore_ascii_case(r))
        })
        .or_else(|| known.iter().find(served_as_image))
        .copied()
}

fn is_raster(content_type: &str) -> bool {
    content_type.starts_with("image/") && content_type != "image/svg+xml"
}

/// Raster image types with a registered extension. SVG is refused since
/// it can carry script.
fn is_image(content_type: &str) -> bool {
    is_raster(content_type) && image_extension(content_type, None).is_some()
}

/// A parsed multipart body: text fields plus at most one image file.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<ImageFile>,
}

impl UploadForm {
    /// Read every part of `multipart`. The part named `file_field` is
    /// treated as the image upload and must be an image no larger than
    /// `max_bytes`; an empty file part counts as no upload.
    pub async fn read(
        mut multipart: Multipart,
        file_field: &str,
        max_bytes: usize,
    ) -> AppResult<Self> {
        let mut form = UploadForm::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name != file_field {
                let value = field.text().await?;
                form.fields.insert(name, value);
                continue;
            }

            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .map(|ct| {
                    ct.split(';')
                        .next()
                        .unwrap_or_default()
                        .trim()
                        .to_ascii_lowercase()
                })
                .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
                .or_else(|| {
                    mime_guess::from_path(&file_name)
                        .first()
                        .map(|m| m.essence_str().to_string())
                })
                .unwrap_or_default();

            let mut data = BytesMut::new();
            while let Some(chunk) = field.chunk().await? {
                if data.len() + chunk.len() > max_bytes {
                    return Err(AppError::Upload(format!(
                        "Image must be {} bytes or smaller",
                        max_bytes
                    )));
                }
                data.extend_from_slice(&chunk);
            }

            if data.is_empty() && file_name.is_empty() {
                continue;
            }
            if !is_image(&content_type) {
                return Err(AppError::Upload("Only image files can be uploaded".into()));
            }

            form.file = Some(ImageFile {
                file_name,
                content_type,
                data: data.freeze(),
            });
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// HTML forms send checkbox-like flags as the string "true".
    pub fn flag(&self, name: &str) -> bool {
        self.text(name).map(str::trim) == Some("true")
    }

    pub fn take_file(&mut self) -> Option<ImageFile> {
        self.file.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: &str) -> ImageFile {
        ImageFile {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"\x89PNG fake"),
        }
    }

    fn store() -> (tempfile::TempDir, UploadStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = UploadStore::new(tmp.path(), 1024);
        store.ensure_dirs().unwrap();
        (tmp, store)
    }

    fn path_of(store: &UploadStore, reference: &str) -> PathBuf {
        store.resolve(reference).unwrap()
    }

    #[test]
    fn save_writes_under_slot_dir() {
        let (_tmp, store) = store();
        let reference = store.save(&POST_IMAGE, &png("cat photo.PNG")).unwrap();
        assert!(reference.starts_with("/uploads/posts/catphoto_"));
        assert!(reference.ends_with(".png"));
        assert!(path_of(&store, &reference).exists());
    }

    #[test]
    fn stored_name_falls_back_to_mime_extension() {
        let name = stored_name("../../etc/passwd", "image/jpeg");
        assert!(name.starts_with("passwd_"));
        assert!(!name.contains('/'));
        let ext = name.rsplit('.').next().unwrap();
        let known = mime_guess::get_mime_extensions_str("image/jpeg").unwrap();
        assert!(known.contains(&ext), "got {}", name);
    }

    #[test]
    fn stored_extension_follows_the_image_type_not_the_file_name() {
        let name = stored_name("evil.html", "image/png");
        assert!(name.starts_with("evil_"));
        assert!(name.ends_with(".png"), "got {}", name);

        let name = stored_name("holiday.JPG", "image/jpeg");
        assert!(name.ends_with(".jpg"), "got {}", name);

        let served = mime_guess::from_path(stored_name("x.svg", "image/gif")).first_or_octet_stream();
        assert_eq!(served.essence_str(), "image/gif");
    }

    #[test]
    fn only_raster_images_are_accepted() {
        assert!(is_image("image/png"));
        assert!(is_image("image/jpeg"));
        assert!(!is_image("image/svg+xml"));
        assert!(!is_image("text/html"));
        assert!(!is_image(""));
    }

    #[test]
    fn remove_on_placeholder_avatar_changes_nothing() {
        let (_tmp, store) = store();
        let placeholder = store.root().join("profiles/default_profile.png");
        std::fs::write(&placeholder, b"default").unwrap();

        let outcome = store
            .replace_image(&AVATAR, Some(DEFAULT_AVATAR), ImageChange::Remove)
            .unwrap();
        assert_eq!(outcome.reference.as_deref(), Some(DEFAULT_AVATAR));
        assert!(outcome.stale.is_none());

        store.discard_stale(&outcome);
        assert!(placeholder.exists());
    }

    #[test]
    fn remove_resets_avatar_to_placeholder_and_deletes_old_file() {
        let (_tmp, store) = store();
        let old = store.save(&AVATAR, &png("me.png")).unwrap();

        let outcome = store
            .replace_image(&AVATAR, Some(&old), ImageChange::Remove)
            .unwrap();
        assert_eq!(outcome.reference.as_deref(), Some(DEFAULT_AVATAR));
        assert_eq!(outcome.stale.as_deref(), Some(old.as_str()));
        assert!(path_of(&store, &old).exists());

        store.discard_stale(&outcome);
        assert!(!path_of(&store, &old).exists());
    }

    #[test]
    fn remove_post_image_clears_reference() {
        let (_tmp, store) = store();
        let old = store.save(&POST_IMAGE, &png("p.png")).unwrap();
        let outcome = store
            .replace_image(&POST_IMAGE, Some(&old), ImageChange::Remove)
            .unwrap();
        assert!(outcome.reference.is_none());
        assert_eq!(outcome.stale.as_deref(), Some(old.as_str()));
    }

    #[test]
    fn replace_writes_new_and_marks_old_stale() {
        let (_tmp, store) = store();
        let old = store.save(&POST_IMAGE, &png("old.png")).unwrap();

        let outcome = store
            .replace_image(&POST_IMAGE, Some(&old), ImageChange::Replace(png("new.png")))
            .unwrap();
        let new = outcome.reference.clone().unwrap();
        assert_ne!(new, old);
        assert!(path_of(&store, &new).exists());
        assert_eq!(outcome.stale.as_deref(), Some(old.as_str()));

        store.discard_stale(&outcome);
        assert!(!path_of(&store, &old).exists());
        assert!(path_of(&store, &new).exists());
    }

    #[test]
    fn replace_never_marks_placeholder_stale() {
        let (_tmp, store) = store();
        let outcome = store
            .replace_image(&AVATAR, Some(DEFAULT_AVATAR), ImageChange::Replace(png("a.png")))
            .unwrap();
        assert!(outcome.stale.is_none());
        assert!(outcome.reference.unwrap().starts_with("/uploads/profiles/"));
    }

    #[test]
    fn keep_leaves_reference_alone() {
        let (_tmp, store) = store();
        let outcome = store
            .replace_image(&POST_IMAGE, Some("/uploads/posts/x.png"), ImageChange::Keep)
            .unwrap();
        assert_eq!(outcome.reference.as_deref(), Some("/uploads/posts/x.png"));
        assert!(outcome.stale.is_none());
    }

    #[test]
    fn rollback_removes_the_new_file_only() {
        let (_tmp, store) = store();
        let old = store.save(&POST_IMAGE, &png("old.png")).unwrap();
        let outcome = store
            .replace_image(&POST_IMAGE, Some(&old), ImageChange::Replace(png("new.png")))
            .unwrap();
        let new = outcome.reference.clone().unwrap();

        store.rollback(&outcome);
        assert!(!path_of(&store, &new).exists());
        assert!(path_of(&store, &old).exists());
    }

    #[test]
    fn discarding_a_missing_file_is_not_an_error() {
        let (_tmp, store) = store();
        assert!(!store.discard("/uploads/posts/never-existed.png"));
    }

    #[test]
    fn traversal_references_are_ignored() {
        let (tmp, store) = store();
        let outside = tmp.path().join("secret.txt");
        std::fs::write(&outside, b"keep me").unwrap();

        assert!(!store.discard("/uploads/../secret.txt"));
        assert!(!store.discard("/elsewhere/secret.txt"));
        assert!(outside.exists());
    }

    #[test]
    fn new_file_beats_remove_flag() {
        assert!(matches!(
            ImageChange::from_form(true, Some(png("x.png"))),
            ImageChange::Replace(_)
        ));
        assert!(matches!(ImageChange::from_form(true, None), ImageChange::Remove));
        assert!(matches!(ImageChange::from_form(false, None), ImageChange::Keep));
    }
}
