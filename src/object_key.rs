use std::fmt::Display;

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::aspect::AspectCategory;

const NAME_BYTES: usize = 32;
const FALLBACK_EXTENSION: &str = "bin";

/// Location of a stored video within the bucket
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ObjectKey {
    category: AspectCategory,
    name: String,
    extension: String,
}

impl ObjectKey {
    /// Build a fresh key for a video of the given media type
    ///
    /// Media types that don't look like `type/subtype` get the `bin` extension instead of
    /// failing the upload.
    pub(crate) fn generate(media_type: &str, category: AspectCategory) -> Self {
        let mut bytes = [0u8; NAME_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);

        ObjectKey {
            category,
            name: BASE64_URL_SAFE_NO_PAD.encode(bytes),
            extension: extension(media_type),
        }
    }

    pub(crate) const fn category(&self) -> AspectCategory {
        self.category
    }
}

fn extension(media_type: &str) -> String {
    let essence = media_type.split(';').next().unwrap_or_default().trim();

    let parts = essence.split('/').collect::<Vec<_>>();

    match parts.as_slice() {
        [kind, subtype]
            if !kind.is_empty()
                && !subtype.is_empty()
                && subtype.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            subtype.to_ascii_lowercase()
        }
        _ => String::from(FALLBACK_EXTENSION),
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}.{}",
            self.category.prefix(),
            self.name,
            self.extension
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{extension, ObjectKey};
    use crate::aspect::AspectCategory;
    use std::collections::HashSet;

    fn matches_key_pattern(key: &str) -> bool {
        let Some((prefix, file)) = key.split_once('/') else {
            return false;
        };

        let Some((name, ext)) = file.rsplit_once('.') else {
            return false;
        };

        matches!(prefix, "horizontal" | "portrait" | "other")
            && !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
            && !ext.is_empty()
            && ext
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    }

    #[test]
    fn keys_are_distinct_and_well_formed() {
        let categories = [
            AspectCategory::Horizontal,
            AspectCategory::Portrait,
            AspectCategory::Other,
        ];

        let mut seen = HashSet::new();

        for i in 0..10_000 {
            let key = ObjectKey::generate("video/mp4", categories[i % 3]).to_string();

            assert!(matches_key_pattern(&key), "{key}");
            assert!(seen.insert(key), "duplicate key generated");
        }
    }

    #[test]
    fn name_carries_32_bytes() {
        let key = ObjectKey::generate("video/mp4", AspectCategory::Horizontal);

        // 32 bytes in unpadded base64 is 43 characters
        assert_eq!(key.name.len(), 43);
        assert!(!key.name.contains('='));
    }

    #[test]
    fn prefix_follows_category() {
        let key = ObjectKey::generate("video/mp4", AspectCategory::Portrait);

        assert!(key.to_string().starts_with("portrait/"));
        assert!(key.to_string().ends_with(".mp4"));
        assert_eq!(key.category(), AspectCategory::Portrait);
    }

    #[test]
    fn extensions() {
        assert_eq!(extension("video/mp4"), "mp4");
        assert_eq!(extension("video/MP4"), "mp4");
        assert_eq!(extension("video/mp4; codecs=avc1"), "mp4");
        assert_eq!(extension("application/octet-stream"), "bin");
        assert_eq!(extension("mp4"), "bin");
        assert_eq!(extension("video/mp4/extra"), "bin");
        assert_eq!(extension(""), "bin");
        assert_eq!(extension("/mp4"), "bin");
    }

    #[test]
    fn odd_media_types_still_build_keys() {
        let key = ObjectKey::generate("application/octet-stream", AspectCategory::Other);

        assert_eq!(key.extension, "bin");
        assert!(matches_key_pattern(&key.to_string()));
    }
}
