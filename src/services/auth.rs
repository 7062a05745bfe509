//! Registration and login

use std::sync::Arc;
use std::time::Duration;

use crate::{
    auth::{CredentialVerifier, TokenCodec},
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        ensure_valid,
        user::{AuthResponse, LoginRequest, NewUser, RegisterRequest, Role, User},
    },
    repository::{bounded, UserStore},
};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenCodec>,
    credentials: CredentialVerifier,
    token_ttl: chrono::Duration,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenCodec>,
        config: &AuthConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            credentials: CredentialVerifier::new(),
            token_ttl: chrono::Duration::minutes(config.jwt_expiration_minutes),
            store_timeout,
        }
    }

    /// Register a new reader account and log it in
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        ensure_valid(&request)?;
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_string();
        tracing::info!("Registering user {}", username);

        if bounded(self.store_timeout, "username check", self.users.username_exists(&username)).await? {
            return Err(AppError::Conflict(format!("Username already taken: {}", username)));
        }
        if bounded(self.store_timeout, "email check", self.users.email_exists(&email)).await? {
            return Err(AppError::Conflict(format!("Email already registered: {}", email)));
        }

        let user = self
            .create_user(&username, &request.password, &email, Role::Reader)
            .await?;

        self.issue(&user)
    }

    /// Check credentials and issue a token
    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        ensure_valid(&request)?;
        tracing::info!("Login attempt for {}", request.username);

        let user = bounded(
            self.store_timeout,
            "user lookup",
            self.users.get_by_username(&request.username),
        )
        .await?;

        let user = match user {
            Some(user) if self.credentials.verify_password(&request.password, &user.password) => user,
            _ => {
                tracing::warn!("Failed login for {}", request.username);
                return Err(AppError::Authentication("Invalid username or password".to_string()));
            }
        };

        self.issue(&user)
    }

    /// Hash the password and store a new account
    pub async fn create_user(&self, username: &str, password: &str, email: &str, role: Role) -> AppResult<User> {
        let new_user = NewUser {
            username: username.to_string(),
            password_hash: self.credentials.hash_password(password)?,
            email: email.to_string(),
            role,
        };
        bounded(self.store_timeout, "user insert", self.users.insert(&new_user)).await
    }

    fn issue(&self, user: &User) -> AppResult<AuthResponse> {
        let token = self.tokens.encode(&user.username, user.role, self.token_ttl)?;

        Ok(AuthResponse {
            token,
            token_type: "Bearer".to_string(),
            username: user.username.clone(),
            role: user.role,
        })
    }
}
