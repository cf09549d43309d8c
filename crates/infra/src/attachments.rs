//! Image bytes, keyed by image id. Metadata lives on the product.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use harvest_catalog::ImageId;

/// A stored file with the content type sniffed at upload time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub trait AttachmentStore: Send + Sync {
    fn put(&self, id: ImageId, attachment: StoredAttachment);
    fn get(&self, id: ImageId) -> Option<StoredAttachment>;
    fn remove(&self, id: ImageId);
}

impl<S> AttachmentStore for Arc<S>
where
    S: AttachmentStore + ?Sized,
{
    fn put(&self, id: ImageId, attachment: StoredAttachment) {
        (**self).put(id, attachment)
    }

    fn get(&self, id: ImageId) -> Option<StoredAttachment> {
        (**self).get(id)
    }

    fn remove(&self, id: ImageId) {
        (**self).remove(id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAttachmentStore {
    files: RwLock<HashMap<ImageId, StoredAttachment>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttachmentStore for InMemoryAttachmentStore {
    fn put(&self, id: ImageId, attachment: StoredAttachment) {
        if let Ok(mut files) = self.files.write() {
            files.insert(id, attachment);
        }
    }

    fn get(&self, id: ImageId) -> Option<StoredAttachment> {
        self.files.read().ok()?.get(&id).cloned()
    }

    fn remove(&self, id: ImageId) {
        if let Ok(mut files) = self.files.write() {
            files.remove(&id);
        }
    }
}
