//! User directory service.

use opp_core::error::{OppError, OppResult};
use opp_core::models::user::{CreateUser, GlobalRole, Subject, UpdateUser, User};
use opp_core::permission::require_global;
use opp_core::repository::{PaginatedResult, Pagination, UserRepository};
use tracing::info;

pub struct UserService<U: UserRepository> {
    users: U,
}

impl<U: UserRepository> UserService<U> {
    pub fn new(users: U) -> Self {
        Self { users }
    }

    /// Register a user.
    ///
    /// Anyone may sign up as a plain user. Staff accounts need a global
    /// admin caller, and only a superuser can create another superuser.
    pub async fn add_user(&self, caller: Option<&Subject>, input: CreateUser) -> OppResult<User> {
        // 1. Who may create an account with this role.
        match (input.role, caller) {
            (GlobalRole::User, _) => {}
            (GlobalRole::Superuser, Some(subject)) if subject.is_superuser() => {}
            (GlobalRole::Admin | GlobalRole::Controller, Some(subject))
                if subject.role.is_admin() => {}
            (role, _) => {
                return Err(OppError::forbidden(format!(
                    "creating a {role} account requires higher privileges"
                )));
            }
        }

        // 2. Shape of the account.
        validate_username(&input.username)?;
        validate_email(&input.email)?;
        if input.password.is_empty() {
            return Err(OppError::invalid_input("password must not be empty"));
        }

        let user = self.users.create(input).await?;
        info!(username = %user.username, role = %user.role, "User registered");
        Ok(user)
    }

    pub async fn get_user(&self, username: &str) -> OppResult<User> {
        self.users.get(username).await
    }

    pub async fn update_user(
        &self,
        subject: &Subject,
        username: &str,
        input: UpdateUser,
    ) -> OppResult<User> {
        ensure_self_or_admin(subject, username, "update")?;
        if let Some(email) = &input.email {
            validate_email(email)?;
        }
        let user = self.users.update(username, input).await?;
        info!(username, by = %subject.username, "User updated");
        Ok(user)
    }

    pub async fn delete_user(&self, subject: &Subject, username: &str) -> OppResult<()> {
        ensure_self_or_admin(subject, username, "delete")?;
        self.users.delete(username).await?;
        info!(username, by = %subject.username, "User deleted");
        Ok(())
    }

    pub async fn list_users(
        &self,
        subject: &Subject,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<User>> {
        require_global(subject, GlobalRole::is_admin, "list users")?;
        self.users.list(pagination).await
    }
}

fn ensure_self_or_admin(subject: &Subject, username: &str, action: &str) -> OppResult<()> {
    if subject.username == username || subject.role.is_admin() {
        Ok(())
    } else {
        Err(OppError::forbidden(format!(
            "{} may not {action} user {username}",
            subject.username
        )))
    }
}

fn validate_username(username: &str) -> OppResult<()> {
    if username.is_empty() || username.chars().any(char::is_whitespace) {
        return Err(OppError::invalid_input(
            "username must be non-empty and contain no whitespace",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> OppResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(OppError::invalid_input(format!("invalid email address: {email}"))),
    }
}
