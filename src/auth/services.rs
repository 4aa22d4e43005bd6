use tracing::{info, warn};

use super::{
    dto::{AuthResponse, PublicUser},
    jwt::JwtKeys,
    password::{hash_in_background, verify_in_background},
    repo_types::User,
};
use crate::{db::now_timestamp, error::AppError, state::AppState, validators::Credentials};

pub async fn signup(state: &AppState, creds: Credentials) -> Result<AuthResponse, AppError> {
    if User::find_by_email(&state.db, &creds.email).await?.is_some() {
        warn!(email = %creds.email, "email already registered");
        return Err(AppError::Conflict("Email already in use".into()));
    }

    let hash = hash_in_background(state.config.password.clone(), creds.password.clone()).await?;
    let created_at = now_timestamp()?;
    // The UNIQUE constraint still decides races between concurrent signups.
    let user = User::create(&state.db, &creds.email, &hash, &created_at).await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    issue(state, user)
}

/// Unknown email and wrong password fail identically.
pub async fn login(state: &AppState, creds: Credentials) -> Result<AuthResponse, AppError> {
    let Some(user) = User::find_by_email(&state.db, &creds.email).await? else {
        warn!(email = %creds.email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_in_background(creds.password, user.password_hash.clone()).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = user.id, "user logged in");
    issue(state, user)
}

fn issue(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let token = JwtKeys::from(&state.config.jwt).sign(user.id, &user.email)?;
    Ok(AuthResponse {
        token,
        user: PublicUser::from(user),
    })
}
