//! User aggregate for marketplace accounts (event-sourced).
//!
//! Email uniqueness spans every user and is therefore checked by the service
//! layer against the user read model; this aggregate only guards its own
//! stream (format, role escalation, lifecycle).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_core::{Aggregate, AggregateRoot, DomainError, FieldErrors, UserId};
use harvest_events::Event;

use crate::{PasswordDigest, Role};

pub const MIN_PASSWORD_LEN: usize = 6;

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Marketplace account.
///
/// # Invariants
/// - Email is stored trimmed and lowercased and always contains `@`.
/// - Users cannot grant roles they do not hold themselves (admins excepted).
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_digest: Option<PasswordDigest>,
    pub roles: Vec<Role>,
    pub created_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            password_digest: None,
            roles: Vec::new(),
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Compare a plaintext password against the stored digest.
    pub fn password_matches(&self, password: &str) -> bool {
        self.password_digest
            .as_ref()
            .is_some_and(|digest| digest.verify(password))
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Normalise an email address the way it is stored.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Field checks for a candidate email.
pub fn validate_email(email: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let email = email.trim();
    if email.is_empty() {
        errors.add("email", "can't be blank");
    } else if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.add("email", "is invalid");
    }
    errors
}

/// Field checks for a new password and its confirmation.
pub fn validate_password(password: &str, confirmation: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("is too short (minimum is {MIN_PASSWORD_LEN} characters)"),
        );
    }
    if password != confirmation {
        errors.add("password_confirmation", "doesn't match Password");
    }
    errors
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub user_id: UserId,
    pub email: String,
    pub password_digest: PasswordDigest,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

/// Change email and/or password; `None` leaves the attribute untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUser {
    pub user_id: UserId,
    pub email: Option<String>,
    pub password_digest: Option<PasswordDigest>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRole {
    pub user_id: UserId,
    pub role: Role,
    /// Roles of the acting user, for the escalation check.
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRole {
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    Update(UpdateUser),
    AssignRole(AssignRole),
    RevokeRole(RevokeRole),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub email: String,
    pub password_digest: PasswordDigest,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdated {
    pub user_id: UserId,
    pub email: Option<String>,
    pub password_digest: Option<PasswordDigest>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssigned {
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRevoked {
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    Updated(UserUpdated),
    RoleAssigned(RoleAssigned),
    RoleRevoked(RoleRevoked),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::Updated(_) => "auth.user.updated",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::RoleRevoked(_) => "auth.user.role_revoked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::Updated(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) => e.occurred_at,
            UserEvent::RoleRevoked(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.email = e.email.clone();
                self.password_digest = Some(e.password_digest.clone());
                self.roles = e.roles.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            UserEvent::Updated(e) => {
                if let Some(email) = &e.email {
                    self.email = email.clone();
                }
                if let Some(digest) = &e.password_digest {
                    self.password_digest = Some(digest.clone());
                }
            }
            UserEvent::RoleAssigned(e) => self.roles.push(e.role.clone()),
            UserEvent::RoleRevoked(e) => self.roles.retain(|r| r != &e.role),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::Update(cmd) => self.handle_update(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
        }
    }
}

impl User {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if self.created {
            Ok(())
        } else {
            Err(DomainError::NotFound)
        }
    }

    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        validate_email(&cmd.email).into_result()?;

        Ok(vec![UserEvent::Created(UserCreated {
            user_id: cmd.user_id,
            email: normalize_email(&cmd.email),
            password_digest: cmd.password_digest.clone(),
            roles: cmd.roles.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;

        let email = match &cmd.email {
            Some(raw) => {
                validate_email(raw).into_result()?;
                let email = normalize_email(raw);
                (email != self.email).then_some(email)
            }
            None => None,
        };

        if email.is_none() && cmd.password_digest.is_none() {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::Updated(UserUpdated {
            user_id: cmd.user_id,
            email,
            password_digest: cmd.password_digest.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;

        if self.roles.contains(&cmd.role) {
            return Err(DomainError::invariant("role already assigned"));
        }

        // Non-admin actors may only hand out roles they hold.
        let actor_is_admin = cmd.actor_roles.iter().any(Role::is_admin);
        if !actor_is_admin && !cmd.actor_roles.contains(&cmd.role) {
            return Err(DomainError::Unauthorized);
        }

        Ok(vec![UserEvent::RoleAssigned(RoleAssigned {
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;

        if !self.roles.contains(&cmd.role) {
            return Err(DomainError::invariant("role not assigned"));
        }

        Ok(vec![UserEvent::RoleRevoked(RoleRevoked {
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(email: &str, roles: Vec<Role>) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        let cmd = UserCommand::Create(CreateUser {
            user_id,
            email: email.to_string(),
            password_digest: PasswordDigest::hash("secret1"),
            roles,
            occurred_at: now(),
        });
        for event in user.handle(&cmd).unwrap() {
            user.apply(&event);
        }
        user
    }

    #[test]
    fn create_normalises_email() {
        let user = created("  Alice@Example.COM ", vec![Role::USER]);
        assert_eq!(user.email, "alice@example.com");
        assert!(user.password_matches("secret1"));
        assert!(!user.password_matches("secret2"));
        assert_eq!(user.version, 1);
    }

    #[test]
    fn create_rejects_invalid_email() {
        let user_id = UserId::new();
        let cmd = UserCommand::Create(CreateUser {
            user_id,
            email: "invalid-email".to_string(),
            password_digest: PasswordDigest::hash("secret1"),
            roles: vec![],
            occurred_at: now(),
        });

        let err = User::empty(user_id).handle(&cmd).unwrap_err();
        let DomainError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("email"), Some(&["is invalid".to_string()][..]));
    }

    #[test]
    fn creating_twice_conflicts() {
        let user = created("bob@example.com", vec![]);
        let cmd = UserCommand::Create(CreateUser {
            user_id: user.id,
            email: "bob@example.com".to_string(),
            password_digest: PasswordDigest::hash("secret1"),
            roles: vec![],
            occurred_at: now(),
        });
        assert!(matches!(user.handle(&cmd), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn update_changes_email_and_password() {
        let mut user = created("carol@example.com", vec![]);
        let cmd = UserCommand::Update(UpdateUser {
            user_id: user.id,
            email: Some("carol@shop.example".to_string()),
            password_digest: Some(PasswordDigest::hash("another1")),
            occurred_at: now(),
        });
        for event in user.handle(&cmd).unwrap() {
            user.apply(&event);
        }

        assert_eq!(user.email, "carol@shop.example");
        assert!(user.password_matches("another1"));
    }

    #[test]
    fn update_without_changes_emits_nothing() {
        let user = created("dave@example.com", vec![]);
        let cmd = UserCommand::Update(UpdateUser {
            user_id: user.id,
            email: Some("DAVE@example.com".to_string()),
            password_digest: None,
            occurred_at: now(),
        });
        assert!(user.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn assign_role_privilege_escalation_blocked() {
        let user = created("eve@example.com", vec![]);
        let cmd = UserCommand::AssignRole(AssignRole {
            user_id: user.id,
            role: Role::ADMIN,
            actor_roles: vec![Role::USER],
            occurred_at: now(),
        });
        assert!(matches!(user.handle(&cmd), Err(DomainError::Unauthorized)));
    }

    #[test]
    fn admins_assign_and_revoke_roles() {
        let mut user = created("frank@example.com", vec![Role::USER]);
        let assign = UserCommand::AssignRole(AssignRole {
            user_id: user.id,
            role: Role::ADMIN,
            actor_roles: vec![Role::ADMIN],
            occurred_at: now(),
        });
        for event in user.handle(&assign).unwrap() {
            user.apply(&event);
        }
        assert!(user.is_admin());

        let revoke = UserCommand::RevokeRole(RevokeRole {
            user_id: user.id,
            role: Role::ADMIN,
            occurred_at: now(),
        });
        for event in user.handle(&revoke).unwrap() {
            user.apply(&event);
        }
        assert!(!user.is_admin());
        assert!(user.handle(&revoke).is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("foobar", "foobar").is_empty());
        let errors = validate_password("foo", "bar");
        assert!(errors.get("password").is_some());
        assert!(errors.get("password_confirmation").is_some());
    }
}
