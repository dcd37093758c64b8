use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        password::{check_password_policy, hash_password, verify_password},
        AuthUser, JwtKeys, TokenPair,
    },
    error::{AppError, AppResult},
    state::AppState,
    store::{NewUser, StoreError, UserChanges, UserRecord},
};

const INVALID_CREDENTIALS: &str = "unable to authenticate with provided credentials";

/// Lowercases the domain part only; the local part keeps its case.
pub fn normalize_email(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => trimmed.to_string(),
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn checked_email(raw: &str) -> AppResult<String> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(AppError::field("email", "this field is required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::field("email", "enter a valid email address"));
    }
    Ok(email)
}

fn email_taken() -> AppError {
    AppError::field("email", "user with this email already exists")
}

async fn create_user(
    state: &AppState,
    email: &str,
    password: &str,
    name: Option<String>,
    superuser: bool,
) -> AppResult<UserRecord> {
    let email = checked_email(email)?;
    check_password_policy(password)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(email_taken());
    }

    let new = NewUser {
        email,
        name: name.map(|n| n.trim().to_string()).unwrap_or_default(),
        password_hash: hash_password(password)?,
        is_staff: superuser,
        is_superuser: superuser,
    };
    let user = match state.store.insert_user(new).await {
        Ok(u) => u,
        Err(StoreError::Conflict(_)) => return Err(email_taken()),
        Err(e) => return Err(e.into()),
    };
    info!(user_id = user.id, email = %user.email, superuser, "user registered");
    Ok(user)
}

pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    name: Option<String>,
) -> AppResult<UserRecord> {
    create_user(state, email, password, name, false).await
}

pub async fn register_superuser(
    state: &AppState,
    email: &str,
    password: &str,
) -> AppResult<UserRecord> {
    create_user(state, email, password, None, true).await
}

/// Unknown email, wrong password and inactive account all fail the same way.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> AppResult<TokenPair> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
    }

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
    };
    if !user.is_active || !verify_password(password, &user.password_hash) {
        warn!(user_id = user.id, "login refused");
        return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
    }

    let pair = JwtKeys::from(&state.config.jwt).issue_pair(user.id)?;
    info!(user_id = user.id, "user logged in");
    Ok(pair)
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenPair> {
    let keys = JwtKeys::from(&state.config.jwt);
    let claims = keys
        .verify_refresh(refresh_token)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    match state.store.find_user(claims.sub).await? {
        Some(user) if user.is_active => Ok(keys.issue_pair(user.id)?),
        _ => Err(AppError::Auth("user not found".into())),
    }
}

pub async fn get_self(state: &AppState, auth: AuthUser) -> AppResult<UserRecord> {
    match state.store.find_user(auth.0).await? {
        Some(user) if user.is_active => Ok(user),
        Some(_) => Err(AppError::Auth("user account is disabled".into())),
        None => Err(AppError::Auth("user not found".into())),
    }
}

/// Applies the present fields to the caller's own record.
pub async fn update_self(
    state: &AppState,
    auth: AuthUser,
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
) -> AppResult<UserRecord> {
    let mut changes = UserChanges::default();
    if let Some(email) = email {
        let email = checked_email(&email)?;
        if let Some(other) = state.store.find_user_by_email(&email).await? {
            if other.id != auth.0 {
                return Err(email_taken());
            }
        }
        changes.email = Some(email);
    }
    if let Some(password) = password {
        check_password_policy(&password)?;
        changes.password_hash = Some(hash_password(&password)?);
    }
    changes.name = name.map(|n| n.trim().to_string());

    let user = match state.store.update_user(auth.0, changes).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err(AppError::Auth("user not found".into())),
        Err(StoreError::Conflict(_)) => return Err(email_taken()),
        Err(e) => return Err(e.into()),
    };
    info!(user_id = user.id, "profile updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_domain_is_lowercased() {
        let samples = [
            ("test1@example.com", "test1@example.com"),
            ("TEST2@example.com", "TEST2@example.com"),
            ("Test3@example.com", "Test3@example.com"),
            ("test4@EXAMPLE.com", "test4@example.com"),
            ("test5@example.COM", "test5@example.com"),
            ("TEST4@EXAMPLE.com", "TEST4@example.com"),
            ("  spaced@Example.org ", "spaced@example.org"),
        ];
        for (raw, expected) in samples {
            assert_eq!(normalize_email(raw), expected);
        }
    }

    #[tokio::test]
    async fn register_stores_normalized_email_and_hash() {
        let state = AppState::fake();
        let user = register(&state, "TEST4@EXAMPLE.com", "test123", Some("Test".into()))
            .await
            .unwrap();
        assert_eq!(user.email, "TEST4@example.com");
        assert_eq!(user.name, "Test");
        assert_ne!(user.password_hash, "test123");
        assert!(verify_password("test123", &user.password_hash));
        assert!(user.is_active);
        assert!(!user.is_staff && !user.is_superuser);
    }

    #[tokio::test]
    async fn register_without_email_fails_and_creates_nothing() {
        let state = AppState::fake();
        let err = register(&state, "", "password1234", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(state.store.find_user(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_rejects_short_password_and_duplicates() {
        let state = AppState::fake();
        let err = register(&state, "a@example.com", "pw", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        register(&state, "a@example.com", "test123", None).await.unwrap();
        let err = register(&state, "a@EXAMPLE.com", "test123", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn superuser_gets_flags() {
        let state = AppState::fake();
        let user = register_superuser(&state, "admin@example.com", "test123")
            .await
            .unwrap();
        assert!(user.is_staff);
        assert!(user.is_superuser);
    }

    #[tokio::test]
    async fn authenticate_issues_verifiable_token() {
        let state = AppState::fake();
        let user = register(&state, "me@example.com", "test123", None).await.unwrap();

        let pair = authenticate(&state, "me@EXAMPLE.com", "test123").await.unwrap();
        let claims = JwtKeys::from(&state.config.jwt)
            .verify_access(&pair.access)
            .unwrap();
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn bad_credentials_look_the_same() {
        let state = AppState::fake();
        register(&state, "me@example.com", "test123", None).await.unwrap();

        let wrong_pw = authenticate(&state, "me@example.com", "nope123").await.unwrap_err();
        let unknown = authenticate(&state, "who@example.com", "test123").await.unwrap_err();
        assert_eq!(wrong_pw.to_string(), INVALID_CREDENTIALS);
        assert_eq!(unknown.to_string(), INVALID_CREDENTIALS);
        assert!(matches!(wrong_pw, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn refresh_issues_new_pair() {
        let state = AppState::fake();
        register(&state, "me@example.com", "test123", None).await.unwrap();
        let pair = authenticate(&state, "me@example.com", "test123").await.unwrap();

        assert!(refresh(&state, &pair.refresh).await.is_ok());
        assert!(refresh(&state, &pair.access).await.is_err());
    }

    #[tokio::test]
    async fn inactive_account_cannot_read_self() {
        let state = AppState::fake();
        let me = register(&state, "me@example.com", "test123", None).await.unwrap();
        assert!(get_self(&state, AuthUser(me.id)).await.is_ok());

        let changes = UserChanges {
            is_active: Some(false),
            ..Default::default()
        };
        state.store.update_user(me.id, changes).await.unwrap();

        let err = get_self(&state, AuthUser(me.id)).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        let err = authenticate(&state, "me@example.com", "test123").await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn update_self_changes_only_caller() {
        let state = AppState::fake();
        let me = register(&state, "me@example.com", "test123", None).await.unwrap();
        let other = register(&state, "other@example.com", "test123", None)
            .await
            .unwrap();

        let updated = update_self(
            &state,
            AuthUser(me.id),
            None,
            Some("newpass123".into()),
            Some("Updated".into()),
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Updated");
        assert!(verify_password("newpass123", &updated.password_hash));

        let untouched = state.store.find_user(other.id).await.unwrap().unwrap();
        assert_eq!(untouched.name, "");

        let err = update_self(
            &state,
            AuthUser(me.id),
            Some("other@example.com".into()),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
