use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};

use crate::errors::AppError;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Argon2::default()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map(|hash| hash.to_string())
        .map_err(|e| {
            log::error!("Failed to hash password: {}", e);
            AppError::PasswordError(e.to_string())
        })
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is malformed.
pub fn verify_password(provided: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AppError::PasswordError(e.to_string()))?;
    match Argon2::default().verify_password(provided.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::PasswordError(e.to_string())),
    }
}

/// 256 random bits, URL-safe.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Uniform six-digit code, leading zeros kept.
pub fn random_otp() -> String {
    const RANGE: u32 = 1_000_000;
    let zone = u32::MAX - u32::MAX % RANGE;
    loop {
        let n = OsRng.next_u32();
        if n < zone {
            return format!("{:06}", n % RANGE);
        }
    }
}

const IMAGE_SIGNATURES: [(&str, &[u8]); 4] = [
    ("png", b"\x89PNG\r\n\x1a\n"),
    ("jpeg", b"\xff\xd8\xff"),
    ("gif", b"GIF8"),
    ("webp", b"RIFF"),
];

/// Accepts `data:image/<png|jpeg|jpg|gif|webp>;base64,<payload>` where the
/// decoded payload starts with the signature of the declared format.
pub fn validate_image(data_url: &str) -> Result<(), AppError> {
    let rest = data_url.strip_prefix("data:image/").ok_or(AppError::InvalidImage)?;
    let (subtype, payload) = rest.split_once(";base64,").ok_or(AppError::InvalidImage)?;
    let subtype = match subtype.to_ascii_lowercase().as_str() {
        "jpg" => "jpeg".to_owned(),
        other => other.to_owned(),
    };
    let signature = IMAGE_SIGNATURES
        .iter()
        .find(|(name, _)| *name == subtype)
        .map(|(_, sig)| *sig)
        .ok_or(AppError::InvalidImage)?;
    let bytes = STANDARD.decode(payload.trim()).map_err(|_| AppError::InvalidImage)?;
    if !bytes.starts_with(signature) {
        return Err(AppError::InvalidImage);
    }
    if subtype == "webp" && bytes.get(8..12) != Some(b"WEBP".as_slice()) {
        return Err(AppError::InvalidImage);
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn only_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}
