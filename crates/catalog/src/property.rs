use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use harvest_events::Event;

/// Property identifier (`Origin`, `Certification`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub AggregateId);

impl PropertyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Property.
///
/// Names are unique marketplace-wide (case-insensitive); that is enforced by
/// the service layer, which sees every property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    id: PropertyId,
    name: String,
    presentation: String,
    version: u64,
    created: bool,
}

impl Property {
    pub fn empty(id: PropertyId) -> Self {
        Self {
            id,
            name: String::new(),
            presentation: String::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PropertyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn presentation(&self) -> &str {
        &self.presentation
    }
}

impl AggregateRoot for Property {
    type Id = PropertyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProperty {
    pub property_id: PropertyId,
    pub name: String,
    /// Defaults to the name when blank.
    pub presentation: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyCommand {
    Create(CreateProperty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCreated {
    pub property_id: PropertyId,
    pub name: String,
    pub presentation: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyEvent {
    Created(PropertyCreated),
}

impl Event for PropertyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PropertyEvent::Created(_) => "catalog.property.created",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PropertyEvent::Created(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Property {
    type Command = PropertyCommand;
    type Event = PropertyEvent;
    type Error = DomainError;

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PropertyCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("property already exists"));
                }
                let name = cmd.name.trim();
                if name.is_empty() {
                    return Err(DomainError::validation("name", "can't be blank"));
                }
                let presentation = cmd
                    .presentation
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .unwrap_or(name);

                Ok(vec![PropertyEvent::Created(PropertyCreated {
                    property_id: cmd.property_id,
                    name: name.to_string(),
                    presentation: presentation.to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PropertyEvent::Created(e) => {
                self.id = e.property_id;
                self.name = e.name.clone();
                self.presentation = e.presentation.clone();
                self.created = true;
            }
        }
        self.version += 1;
    }
}
