//! Derivation of cloud object names from program identifiers.
//!
//! Bucket objects and instance names share the same constraints: at most 63
//! characters, and the first character must be a letter. Program identifiers
//! are typically content hashes that may start with a digit, so every name is
//! prefixed with a fixed letter and the identifier is truncated to fit.

/// Letter prepended to every derived image name.
pub const IMAGE_NAME_PREFIX: char = 'a';

/// Maximum length of a derived image name, prefix included.
pub const MAX_IMAGE_NAME_LEN: usize = 63;

/// Maps a program identifier to a cloud-object-safe image name.
///
/// The result is the prefix letter followed by the first
/// `min(len(program), 62)` characters of `program`. Identifiers that share
/// their first 62 characters therefore map to the same name.
///
/// # Examples
///
/// ```
/// # use orca::naming::image_name_for_program;
/// assert_eq!(image_name_for_program("my-app-1"), "amy-app-1");
/// ```
#[must_use]
pub fn image_name_for_program(program: &str) -> String {
    let mut name = String::with_capacity(MAX_IMAGE_NAME_LEN);
    name.push(IMAGE_NAME_PREFIX);
    name.extend(program.chars().take(MAX_IMAGE_NAME_LEN - 1));
    name
}
