//! User (member) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Librarian,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Librarian => "librarian",
            Role::Member => "member",
        }
    }

    /// Admins and librarians run the desk
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "librarian" => Ok(Role::Librarian),
            "member" => Ok(Role::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// Stored as VARCHAR
impl sqlx::Type<Postgres> for Role {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for Role {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<Postgres>>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for Role {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip)]
    pub password_hash: String,
    pub phone: String,
    pub address: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Apply a partial update; absent fields are left untouched
    pub fn apply_update(&mut self, patch: &UpdateUser, now: DateTime<Utc>) {
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(ref email) = patch.email {
            self.email = email.clone();
        }
        if let Some(ref phone) = patch.phone {
            self.phone = phone.clone();
        }
        if let Some(ref address) = patch.address {
            self.address = address.clone();
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}

/// Short user representation attached to borrow records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
}

/// User search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Case-insensitive substring matched against name, email and phone
    pub q: Option<String>,
}

/// Create user request (staff side)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 10, max = 15, message = "Phone must be 10 to 15 characters"))]
    pub phone: String,
    pub address: Option<String>,
    pub role: Option<Role>,
}

/// Self-service registration request; always yields a member account
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub address: Option<String>,
}

impl From<RegisterUser> for CreateUser {
    fn from(r: RegisterUser) -> Self {
        CreateUser {
            name: r.name,
            email: r.email,
            password: r.password,
            phone: r.phone,
            address: r.address,
            role: Some(Role::Member),
        }
    }
}

/// Normalized user ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub address: String,
    pub role: Role,
}

/// Update user request; empty strings count as absent
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 10, max = 15, message = "Phone must be 10 to 15 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UpdateUser {
    /// Drop empty string fields so they do not overwrite stored values
    pub fn normalized(self) -> Self {
        fn keep(s: Option<String>) -> Option<String> {
            s.filter(|v| !v.trim().is_empty())
        }
        UpdateUser {
            name: keep(self.name),
            email: keep(self.email),
            phone: keep(self.phone),
            address: keep(self.address),
            role: self.role,
            is_active: self.is_active,
        }
    }
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Password change request for the authenticated user
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePassword {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

/// JWT claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub email: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl UserClaims {
    /// Create a new HS256 token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a token (signature, expiry, not-before and issuer)
    pub fn from_token(
        token: &str,
        secret: &str,
        issuer: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;
        Ok(token_data.claims)
    }
}

/// Authenticated identity attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i32,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Require one of the listed roles
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "Access denied for role: {}",
                self.role
            )))
        }
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        self.require_role(&[Role::Admin, Role::Librarian])
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_role(&[Role::Admin])
    }

    /// Staff may act on anyone; members only on themselves
    pub fn require_self_or_staff(&self, user_id: i32) -> Result<(), AppError> {
        if self.is_staff() || self.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "Access to another member's records is not allowed".to_string(),
            ))
        }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Principal {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}
