//! Credential store: registration and password verification on top of the
//! `users` table. Passwords are hashed with argon2 and never persisted or
//! logged in plaintext.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use shared::{normalize_email, RegisterRequest};

use crate::{
    db::{Database, NewUser, User},
    error::AppError,
};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash =
        PasswordHash::new(password_hash).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub async fn register(db: &Database, req: &RegisterRequest) -> Result<i64, AppError> {
    let password_hash = hash_password(&req.password)?;
    let user = NewUser {
        email: normalize_email(&req.email),
        password_hash,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
    };
    let id = db.create_user(&user).await?;
    Ok(id)
}

/// Unknown email and wrong password both come back as `None`.
pub async fn verify(db: &Database, email: &str, password: &str) -> Result<Option<User>, AppError> {
    let Some(user) = db.get_user_by_email(&normalize_email(email)).await? else {
        return Ok(None);
    };
    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}
