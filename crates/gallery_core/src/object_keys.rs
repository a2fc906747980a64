use crate::contract::ValidationError;

pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// S3 event notifications carry form-encoded keys (`+` for space).
pub fn decode_event_key(raw: &str) -> Result<String, ValidationError> {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).map_err(|error| {
        ValidationError::new(format!("Object key '{raw}' is not valid UTF-8: {error}"))
    })?;
    if decoded.is_empty() {
        return Err(ValidationError::new("Object key cannot be empty"));
    }
    Ok(decoded.into_owned())
}

pub fn media_type_for_key(key: &str) -> &'static str {
    match extension(key).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => DEFAULT_MEDIA_TYPE,
    }
}

/// Key under which an uploaded image is stored: `{id}.{ext}`.
pub fn upload_object_key(id: &str, file_name: &str) -> String {
    let ext = extension(file_name)
        .filter(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string());
    format!("{id}.{ext}")
}

fn extension(key: &str) -> Option<String> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plus_and_percent_escapes() {
        assert_eq!(
            decode_event_key("holiday+photos/beach%20day%281%29.jpg").expect("decodes"),
            "holiday photos/beach day(1).jpg"
        );
    }

    #[test]
    fn literal_plus_survives_when_percent_encoded() {
        assert_eq!(decode_event_key("a%2Bb.png").expect("decodes"), "a+b.png");
    }

    #[test]
    fn rejects_empty_key() {
        assert!(decode_event_key("").is_err());
    }

    #[test]
    fn infers_media_type_from_extension() {
        assert_eq!(media_type_for_key("x/photo.JPG"), "image/jpeg");
        assert_eq!(media_type_for_key("photo.jpeg"), "image/jpeg");
        assert_eq!(media_type_for_key("diagram.png"), "image/png");
        assert_eq!(media_type_for_key("anim.gif"), "image/gif");
        assert_eq!(media_type_for_key("shot.webp"), "image/webp");
        assert_eq!(media_type_for_key("notes.txt"), "image/jpeg");
        assert_eq!(media_type_for_key("no-extension"), "image/jpeg");
        assert_eq!(media_type_for_key(".png"), "image/jpeg");
    }

    #[test]
    fn upload_key_keeps_supported_extensions() {
        assert_eq!(upload_object_key("abc", "/tmp/cat.PNG"), "abc.png");
        assert_eq!(upload_object_key("abc", "cat.jpeg"), "abc.jpeg");
        assert_eq!(upload_object_key("abc", "cat.bmp"), "abc.jpg");
        assert_eq!(upload_object_key("abc", "cat"), "abc.jpg");
    }
}
