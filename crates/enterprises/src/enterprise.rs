use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use harvest_events::Event;

/// Enterprise identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnterpriseId(pub AggregateId);

impl EnterpriseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl From<AggregateId> for EnterpriseId {
    fn from(value: AggregateId) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for EnterpriseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for EnterpriseId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// What an enterprise sells through its shopfront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sells {
    /// Producer-only profile, no shopfront.
    #[default]
    None,
    /// Sells only its own products.
    Own,
    /// Sells products from any supplier.
    Any,
}

/// Aggregate root: Enterprise (supplier and/or distributor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enterprise {
    id: EnterpriseId,
    name: String,
    owner: Option<UserId>,
    managers: Vec<UserId>,
    is_primary_producer: bool,
    sells: Sells,
    version: u64,
    created: bool,
}

impl Enterprise {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: EnterpriseId) -> Self {
        Self {
            id,
            name: String::new(),
            owner: None,
            managers: Vec::new(),
            is_primary_producer: false,
            sells: Sells::None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> EnterpriseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn managers(&self) -> &[UserId] {
        &self.managers
    }

    pub fn sells(&self) -> Sells {
        self.sells
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Suppliers own products.
    pub fn is_supplier(&self) -> bool {
        self.is_primary_producer
    }

    /// Distributors run a shopfront and receive orders.
    pub fn is_distributor(&self) -> bool {
        self.sells != Sells::None
    }

    /// Owners manage their enterprise implicitly.
    pub fn manages(&self, user: UserId) -> bool {
        self.owner == Some(user) || self.managers.contains(&user)
    }
}

impl AggregateRoot for Enterprise {
    type Id = EnterpriseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEnterprise {
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub owner: UserId,
    pub is_primary_producer: bool,
    pub sells: Sells,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddManager {
    pub enterprise_id: EnterpriseId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveManager {
    pub enterprise_id: EnterpriseId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnterpriseCommand {
    Register(RegisterEnterprise),
    AddManager(AddManager),
    RemoveManager(RemoveManager),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseRegistered {
    pub enterprise_id: EnterpriseId,
    pub name: String,
    pub owner: UserId,
    pub is_primary_producer: bool,
    pub sells: Sells,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAdded {
    pub enterprise_id: EnterpriseId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerRemoved {
    pub enterprise_id: EnterpriseId,
    pub user: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnterpriseEvent {
    Registered(EnterpriseRegistered),
    ManagerAdded(ManagerAdded),
    ManagerRemoved(ManagerRemoved),
}

impl Event for EnterpriseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EnterpriseEvent::Registered(_) => "enterprises.enterprise.registered",
            EnterpriseEvent::ManagerAdded(_) => "enterprises.enterprise.manager_added",
            EnterpriseEvent::ManagerRemoved(_) => "enterprises.enterprise.manager_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EnterpriseEvent::Registered(e) => e.occurred_at,
            EnterpriseEvent::ManagerAdded(e) => e.occurred_at,
            EnterpriseEvent::ManagerRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Enterprise {
    type Command = EnterpriseCommand;
    type Event = EnterpriseEvent;
    type Error = DomainError;

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EnterpriseCommand::Register(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("enterprise already exists"));
                }
                if cmd.enterprise_id != self.id {
                    return Err(DomainError::invariant("enterprise_id mismatch"));
                }
                let name = cmd.name.trim();
                if name.is_empty() {
                    return Err(DomainError::validation("name", "can't be blank"));
                }

                Ok(vec![EnterpriseEvent::Registered(EnterpriseRegistered {
                    enterprise_id: cmd.enterprise_id,
                    name: name.to_string(),
                    owner: cmd.owner,
                    is_primary_producer: cmd.is_primary_producer,
                    sells: cmd.sells,
                    occurred_at: cmd.occurred_at,
                })])
            }
            EnterpriseCommand::AddManager(cmd) => {
                if !self.created {
                    return Err(DomainError::NotFound);
                }
                // Adding an existing manager (or the owner) is a no-op.
                if self.manages(cmd.user) {
                    return Ok(vec![]);
                }

                Ok(vec![EnterpriseEvent::ManagerAdded(ManagerAdded {
                    enterprise_id: cmd.enterprise_id,
                    user: cmd.user,
                    occurred_at: cmd.occurred_at,
                })])
            }
            EnterpriseCommand::RemoveManager(cmd) => {
                if !self.created {
                    return Err(DomainError::NotFound);
                }
                if self.owner == Some(cmd.user) {
                    return Err(DomainError::invariant("the owner cannot be removed"));
                }
                if !self.managers.contains(&cmd.user) {
                    return Ok(vec![]);
                }

                Ok(vec![EnterpriseEvent::ManagerRemoved(ManagerRemoved {
                    enterprise_id: cmd.enterprise_id,
                    user: cmd.user,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EnterpriseEvent::Registered(e) => {
                self.id = e.enterprise_id;
                self.name = e.name.clone();
                self.owner = Some(e.owner);
                self.is_primary_producer = e.is_primary_producer;
                self.sells = e.sells;
                self.created = true;
            }
            EnterpriseEvent::ManagerAdded(e) => self.managers.push(e.user),
            EnterpriseEvent::ManagerRemoved(e) => self.managers.retain(|u| *u != e.user),
        }
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(owner: UserId, is_primary_producer: bool, sells: Sells) -> Enterprise {
        let id = EnterpriseId::new(AggregateId::new());
        let mut enterprise = Enterprise::empty(id);
        let cmd = EnterpriseCommand::Register(RegisterEnterprise {
            enterprise_id: id,
            name: "  Green Acres  ".to_string(),
            owner,
            is_primary_producer,
            sells,
            occurred_at: now(),
        });
        for e in enterprise.handle(&cmd).unwrap() {
            enterprise.apply(&e);
        }
        enterprise
    }

    #[test]
    fn register_sets_roles_from_flags() {
        let supplier = registered(UserId::new(), true, Sells::None);
        assert_eq!(supplier.name(), "Green Acres");
        assert!(supplier.is_supplier());
        assert!(!supplier.is_distributor());

        let shop = registered(UserId::new(), false, Sells::Any);
        assert!(!shop.is_supplier());
        assert!(shop.is_distributor());
    }

    #[test]
    fn register_requires_name() {
        let id = EnterpriseId::new(AggregateId::new());
        let cmd = EnterpriseCommand::Register(RegisterEnterprise {
            enterprise_id: id,
            name: "   ".to_string(),
            owner: UserId::new(),
            is_primary_producer: true,
            sells: Sells::Own,
            occurred_at: now(),
        });
        assert!(matches!(
            Enterprise::empty(id).handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn owner_and_managers_manage() {
        let owner = UserId::new();
        let manager = UserId::new();
        let stranger = UserId::new();
        let mut enterprise = registered(owner, true, Sells::Own);

        let add = EnterpriseCommand::AddManager(AddManager {
            enterprise_id: enterprise.id_typed(),
            user: manager,
            occurred_at: now(),
        });
        for e in enterprise.handle(&add).unwrap() {
            enterprise.apply(&e);
        }
        assert!(enterprise.handle(&add).unwrap().is_empty());

        assert!(enterprise.manages(owner));
        assert!(enterprise.manages(manager));
        assert!(!enterprise.manages(stranger));

        let remove = EnterpriseCommand::RemoveManager(RemoveManager {
            enterprise_id: enterprise.id_typed(),
            user: manager,
            occurred_at: now(),
        });
        for e in enterprise.handle(&remove).unwrap() {
            enterprise.apply(&e);
        }
        assert!(!enterprise.manages(manager));
        assert_eq!(enterprise.version(), 3);
    }

    #[test]
    fn owner_cannot_be_removed() {
        let owner = UserId::new();
        let enterprise = registered(owner, true, Sells::Own);
        let cmd = EnterpriseCommand::RemoveManager(RemoveManager {
            enterprise_id: enterprise.id_typed(),
            user: owner,
            occurred_at: now(),
        });
        assert!(matches!(
            enterprise.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
