//! Users repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::{contains_pattern, MembershipStore, UserFilter};
use crate::{
    error::{is_unique_violation, AppError, AppResult, LendingError},
    models::user::{NewUser, UpdateUser, User},
};

const EMAIL_INDEX: &str = "users_email_key";

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn email_conflict(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e, EMAIL_INDEX) {
        AppError::Conflict("Email already exists".to_string())
    } else {
        AppError::Database(e)
    }
}

#[async_trait]
impl MembershipStore for UsersRepository {
    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, filter: UserFilter) -> AppResult<Vec<User>> {
        let users = match filter {
            UserFilter::Active => {
                sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE is_active AND deleted_at IS NULL ORDER BY name, id",
                )
                .fetch_all(&self.pool)
                .await?
            }
            UserFilter::Search(q) => {
                sqlx::query_as::<_, User>(
                    r#"
                    SELECT * FROM users
                    WHERE deleted_at IS NULL
                      AND (name ILIKE $1 OR email ILIKE $1 OR phone ILIKE $1)
                    ORDER BY name, id
                    "#,
                )
                .bind(contains_pattern(&q))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(users)
    }

    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, phone, address, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $7)
            RETURNING *
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.role)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(email_conflict)
    }

    async fn update_user(&self, id: i32, patch: UpdateUser, now: DateTime<Utc>) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        let mut user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LendingError::UserNotFound)?;

        user.apply_update(&patch, now);

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = $2, email = $3, phone = $4, address = $5, role = $6,
                is_active = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(email_conflict)?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn set_password(&self, id: i32, password_hash: String, now: DateTime<Utc>) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LendingError::UserNotFound.into());
        }
        Ok(())
    }

    async fn delete_user(&self, id: i32, now: DateTime<Utc>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Borrowers take FOR SHARE on the user row, so this waits for them
        let exists: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(LendingError::UserNotFound.into());
        }

        let on_loan: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrows WHERE user_id = $1 AND status IN ('borrowed', 'overdue'))",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if on_loan {
            return Err(LendingError::HasActiveBorrows.into());
        }

        sqlx::query(
            "UPDATE users SET deleted_at = $2, is_active = FALSE, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn admin_exists(&self) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin' AND deleted_at IS NULL)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
