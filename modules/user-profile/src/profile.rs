//! Rules for user-edited profile fields

use crate::models::ProfileUpdate;
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid user name")]
    InvalidName,

    #[error("invalid user surname")]
    InvalidSurname,

    #[error("invalid user avatar: {0}")]
    InvalidAvatar(String),
}

/// Check an update before it replaces the stored profile
///
/// Name and surname must not be blank. The avatar is optional.
pub fn validate_update(update: &ProfileUpdate) -> Result<(), ValidationError> {
    if update.name.trim().is_empty() {
        return Err(ValidationError::InvalidName);
    }
    if update.surname.trim().is_empty() {
        return Err(ValidationError::InvalidSurname);
    }
    validate_avatar(&update.avatar)
}

/// An avatar is either empty or a square PNG or JPEG image
pub fn validate_avatar(avatar: &[u8]) -> Result<(), ValidationError> {
    if avatar.is_empty() {
        return Ok(());
    }

    let (width, height) = image::ImageReader::new(Cursor::new(avatar))
        .with_guessed_format()
        .map_err(|e| ValidationError::InvalidAvatar(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ValidationError::InvalidAvatar(e.to_string()))?;

    if width != height {
        return Err(ValidationError::InvalidAvatar(format!(
            "image is {width}x{height}, expected a square"
        )));
    }

    Ok(())
}
