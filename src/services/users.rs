//! Authentication and membership service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult, LendingError},
    models::user::{
        ChangePassword, CreateUser, LoginRequest, NewUser, Principal, RegisterUser, Role,
        UpdateUser, User, UserClaims,
    },
    repository::{Repository, UserFilter},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Check credentials and issue a token
    pub async fn authenticate(&self, login: LoginRequest) -> AppResult<(String, User)> {
        login.validate()?;

        let user = self
            .repository
            .members
            .get_user_by_email(&login.email)
            .await?
            .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(&user.password_hash, &login.password)? {
            tracing::info!(user_id = user.id, "Rejected login with wrong password");
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }
        if !user.is_active {
            return Err(AppError::Authentication(
                "Account is deactivated".to_string(),
            ));
        }

        let token = self.issue_token(&user)?;
        tracing::info!(user_id = user.id, role = %user.role, "User logged in");
        Ok((token, user))
    }

    /// Self-service sign-up; the account is always a member
    pub async fn register(&self, request: RegisterUser) -> AppResult<(String, User)> {
        let user = self.create_user(request.into()).await?;
        let token = self.issue_token(&user)?;
        Ok((token, user))
    }

    /// Create an account with any role
    pub async fn create_user(&self, request: CreateUser) -> AppResult<User> {
        request.validate()?;

        if self
            .repository
            .members
            .get_user_by_email(&request.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let new_user = NewUser {
            name: request.name,
            email: request.email,
            password_hash: hash_password(&request.password)?,
            phone: request.phone,
            address: request.address.unwrap_or_default(),
            role: request.role.unwrap_or_default(),
        };

        let user = self
            .repository
            .members
            .create_user(new_user, Utc::now())
            .await?;
        tracing::info!(user_id = user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.repository
            .members
            .get_user(id)
            .await?
            .ok_or_else(|| LendingError::UserNotFound.into())
    }

    /// Active accounts
    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.repository.members.list_users(UserFilter::Active).await
    }

    pub async fn search_users(&self, q: Option<String>) -> AppResult<Vec<User>> {
        let q = required_query(q)?;
        self.repository.members.list_users(UserFilter::Search(q)).await
    }

    pub async fn update_user(&self, id: i32, patch: UpdateUser) -> AppResult<User> {
        let patch = patch.normalized();
        patch.validate()?;

        let current = self.get_user(id).await?;

        // Uniqueness only matters when the address actually changes
        if let Some(ref email) = patch.email {
            if !email.eq_ignore_ascii_case(&current.email) {
                if let Some(other) = self.repository.members.get_user_by_email(email).await? {
                    if other.id != id {
                        return Err(AppError::Conflict("Email already exists".to_string()));
                    }
                }
            }
        }

        let user = self
            .repository
            .members
            .update_user(id, patch, Utc::now())
            .await?;
        tracing::info!(user_id = id, "User updated");
        Ok(user)
    }

    pub async fn delete_user(&self, id: i32) -> AppResult<()> {
        self.repository.members.delete_user(id, Utc::now()).await?;
        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }

    pub async fn change_password(&self, user_id: i32, request: ChangePassword) -> AppResult<()> {
        request.validate()?;

        let user = self.get_user(user_id).await?;
        if !verify_password(&user.password_hash, &request.current_password)? {
            return Err(AppError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        let hash = hash_password(&request.new_password)?;
        self.repository
            .members
            .set_password(user_id, hash, Utc::now())
            .await?;
        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Sign a token for the user
    pub fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.id.to_string(),
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            iss: self.config.jwt_issuer.clone(),
            iat: now,
            nbf: now,
            exp,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Resolve a bearer token to the current state of its account.
    /// The role comes from the store, so demotions apply to live tokens.
    pub async fn principal_from_token(&self, token: &str) -> AppResult<Principal> {
        let claims = UserClaims::from_token(token, &self.config.jwt_secret, &self.config.jwt_issuer)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))?;

        let user = self
            .repository
            .members
            .get_user(claims.user_id)
            .await?
            .ok_or_else(|| AppError::Authentication("Account no longer exists".to_string()))?;

        if !user.is_active {
            return Err(AppError::Authentication(
                "Account is deactivated".to_string(),
            ));
        }

        Ok(Principal::from(&user))
    }

    /// Cheap round trip used by the readiness probe
    pub async fn store_ready(&self) -> AppResult<()> {
        self.repository.members.admin_exists().await?;
        Ok(())
    }

    /// Create the configured admin account when no admin exists yet
    pub async fn ensure_bootstrap_admin(&self) -> AppResult<Option<User>> {
        let (Some(email), Some(password)) = (
            self.config.bootstrap_admin_email.clone(),
            self.config.bootstrap_admin_password.clone(),
        ) else {
            return Ok(None);
        };

        if self.repository.members.admin_exists().await? {
            return Ok(None);
        }

        let admin = self
            .create_user(CreateUser {
                name: "Administrator".to_string(),
                email,
                password,
                phone: "0000000000".to_string(),
                address: None,
                role: Some(Role::Admin),
            })
            .await?;
        tracing::warn!(user_id = admin.id, email = %admin.email, "Bootstrap admin account created");
        Ok(Some(admin))
    }
}

/// Rejects a missing or blank search term
pub(crate) fn required_query(q: Option<String>) -> AppResult<String> {
    match q.map(|q| q.trim().to_string()) {
        Some(q) if !q.is_empty() => Ok(q),
        _ => Err(AppError::Validation(
            "Search query 'q' is required".to_string(),
        )),
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;

    fn service() -> UsersService {
        let config = AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            ..AuthConfig::default()
        };
        UsersService::new(Repository::in_memory(), config)
    }

    fn registration(email: &str) -> RegisterUser {
        RegisterUser {
            name: "Siti Nurhaliza".to_string(),
            email: email.to_string(),
            password: "rahasia123".to_string(),
            phone: "081234567890".to_string(),
            address: None,
        }
    }

    #[tokio::test]
    async fn register_always_creates_a_member() {
        let svc = service();
        let (token, user) = svc.register(registration("siti@example.com")).await.unwrap();
        assert_eq!(user.role, Role::Member);

        let principal = svc.principal_from_token(&token).await.unwrap();
        assert_eq!(principal.user_id, user.id);
        assert_eq!(principal.role, Role::Member);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_regardless_of_case() {
        let svc = service();
        svc.register(registration("siti@example.com")).await.unwrap();
        let err = svc.register(registration("SITI@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_and_deactivated_accounts() {
        let svc = service();
        let (_, user) = svc.register(registration("budi@example.com")).await.unwrap();

        let wrong = svc
            .authenticate(LoginRequest {
                email: "budi@example.com".to_string(),
                password: "nope-nope".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(AppError::Authentication(_))));

        svc.update_user(
            user.id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let inactive = svc
            .authenticate(LoginRequest {
                email: "budi@example.com".to_string(),
                password: "rahasia123".to_string(),
            })
            .await;
        match inactive {
            Err(AppError::Authentication(msg)) => assert_eq!(msg, "Account is deactivated"),
            other => panic!("unexpected result: {:?}", other.map(|(_, u)| u.id)),
        }
    }

    #[tokio::test]
    async fn tokens_of_deactivated_accounts_stop_working() {
        let svc = service();
        let (token, user) = svc.register(registration("ani@example.com")).await.unwrap();
        svc.update_user(
            user.id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            svc.principal_from_token(&token).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn change_password_checks_the_current_one() {
        let svc = service();
        let (_, user) = svc.register(registration("dewi@example.com")).await.unwrap();

        let bad = svc
            .change_password(
                user.id,
                ChangePassword {
                    current_password: "not-it".to_string(),
                    new_password: "baru-12345".to_string(),
                },
            )
            .await;
        assert!(matches!(bad, Err(AppError::Authentication(_))));

        svc.change_password(
            user.id,
            ChangePassword {
                current_password: "rahasia123".to_string(),
                new_password: "baru-12345".to_string(),
            },
        )
        .await
        .unwrap();

        let (_, logged_in) = svc
            .authenticate(LoginRequest {
                email: "dewi@example.com".to_string(),
                password: "baru-12345".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let config = AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            bootstrap_admin_email: Some("admin@library.test".to_string()),
            bootstrap_admin_password: Some("admin-password".to_string()),
            ..AuthConfig::default()
        };
        let svc = UsersService::new(Repository::in_memory(), config);

        let first = svc.ensure_bootstrap_admin().await.unwrap();
        assert_eq!(first.map(|u| u.role), Some(Role::Admin));
        assert!(svc.ensure_bootstrap_admin().await.unwrap().is_none());
    }

    #[test]
    fn blank_search_is_rejected() {
        assert!(required_query(None).is_err());
        assert!(required_query(Some("   ".to_string())).is_err());
        assert_eq!(required_query(Some(" ani ".to_string())).unwrap(), "ani");
    }
}
