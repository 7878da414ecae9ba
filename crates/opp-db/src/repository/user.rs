//! SurrealDB implementation of [`UserRepository`].
//!
//! Passwords are hashed with Argon2id (memory: 19 MiB, iterations: 2,
//! parallelism: 1) and a fresh random salt. An optional server-side
//! pepper can be provided at construction time.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::models::user::{CreateUser, GlobalRole, UpdateUser, User};
use opp_core::repository::{PaginatedResult, Pagination, UserRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use super::CountRow;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct UserRow {
    username: String,
    name: String,
    surname: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        let role = self
            .role
            .parse::<GlobalRole>()
            .map_err(|e| DbError::decode("user", e))?;
        Ok(User {
            username: self.username,
            name: self.name,
            surname: self.surname,
            email: self.email,
            password_hash: self.password_hash,
            role,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn peppered<'a>(password: &'a str, pepper: Option<&str>, buf: &'a mut String) -> &'a [u8] {
    match pepper {
        Some(p) => {
            *buf = format!("{p}{password}");
            buf.as_bytes()
        }
        None => password.as_bytes(),
    }
}

fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::decode("user", format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut buf = String::new();
    let input = peppered(password, pepper, &mut buf);
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| DbError::decode("user", format!("password hash: {e}")))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored Argon2id PHC string.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> Result<bool, DbError> {
    use argon2::PasswordVerifier;

    let mut buf = String::new();
    let input = peppered(password, pepper, &mut buf);
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| DbError::decode("user", format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(input, &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(DbError::decode("user", format!("verify: {e}"))),
    }
}

#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    pepper: Option<String>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db, pepper: None }
    }

    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self {
            db,
            pepper: Some(pepper),
        }
    }

    async fn owns_anything(&self, username: &str) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM car WHERE owner = $username GROUP ALL")
            .bind(("username", username.to_string()))
            .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> OppResult<User> {
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;

        let mut result = self
            .db
            .query(
                "CREATE type::record('user', $username) SET \
                 username = $username, name = $name, surname = $surname, \
                 email = $email, password_hash = $password_hash, role = $role",
            )
            .bind(("username", input.username.clone()))
            .bind(("name", input.name))
            .bind(("surname", input.surname))
            .bind(("email", input.email))
            .bind(("password_hash", password_hash))
            .bind(("role", input.role.as_str().to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("user", e))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user", &input.username))?;
        Ok(row.try_into_user()?)
    }

    async fn get(&self, username: &str) -> OppResult<User> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('user', $username)")
            .bind(("username", username.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user", username))?;
        Ok(row.try_into_user()?)
    }

    async fn exists(&self, username: &str) -> OppResult<bool> {
        match self.get(username).await {
            Ok(_) => Ok(true),
            Err(OppError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, username: &str, input: UpdateUser) -> OppResult<User> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.surname.is_some() {
            sets.push("surname = $surname");
        }
        if input.email.is_some() {
            sets.push("email = $email");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('user', $username) SET {}",
            sets.join(", ")
        );
        let mut builder = self
            .db
            .query(&query)
            .bind(("username", username.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(surname) = input.surname {
            builder = builder.bind(("surname", surname));
        }
        if let Some(email) = input.email {
            builder = builder.bind(("email", email));
        }

        let mut result = builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("user", e))?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user", username))?;
        Ok(row.try_into_user()?)
    }

    async fn delete(&self, username: &str) -> OppResult<()> {
        if !self.exists(username).await? {
            return Err(OppError::not_found("user", username));
        }
        if self.owns_anything(username).await? {
            return Err(OppError::InUse {
                entity: "user".into(),
                id: username.to_string(),
                referenced_by: "car".into(),
            });
        }

        let response = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE zone_user_role WHERE username = $username; \
                 DELETE type::record('user', $username); \
                 COMMIT TRANSACTION;",
            )
            .bind(("username", username.to_string()))
            .await
            .map_err(DbError::from)?;
        DbError::check_transaction("user", response)?;
        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> OppResult<PaginatedResult<User>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM user GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT * FROM user ORDER BY created_at ASC, username ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
