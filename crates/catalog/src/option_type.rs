use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_core::{Aggregate, AggregateId, AggregateRoot, DomainError, FieldErrors, uuid_newtype};
use harvest_events::Event;

/// Option type identifier (`Size`, `Colour`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionTypeId(pub AggregateId);

impl OptionTypeId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OptionTypeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

uuid_newtype!(
    /// Identifier of a value within an option type (`Large`, `Red`).
    pub struct OptionValueId,
    "OptionValueId"
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    pub id: OptionValueId,
    pub name: String,
    pub presentation: String,
}

/// Copy of an option value kept on the variant, so variant reads need no join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValueSnapshot {
    pub id: OptionValueId,
    pub name: String,
    pub presentation: String,
    pub option_type_name: String,
    pub option_type_id: OptionTypeId,
}

/// Aggregate root: OptionType.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionType {
    id: OptionTypeId,
    name: String,
    presentation: String,
    values: Vec<OptionValue>,
    version: u64,
    created: bool,
}

impl OptionType {
    pub fn empty(id: OptionTypeId) -> Self {
        Self {
            id,
            name: String::new(),
            presentation: String::new(),
            values: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OptionTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn presentation(&self) -> &str {
        &self.presentation
    }

    pub fn values(&self) -> &[OptionValue] {
        &self.values
    }

    pub fn snapshot(&self, value: OptionValueId) -> Option<OptionValueSnapshot> {
        self.values
            .iter()
            .find(|v| v.id == value)
            .map(|v| OptionValueSnapshot {
                id: v.id,
                name: v.name.clone(),
                presentation: v.presentation.clone(),
                option_type_name: self.name.clone(),
                option_type_id: self.id,
            })
    }
}

impl AggregateRoot for OptionType {
    type Id = OptionTypeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptionType {
    pub option_type_id: OptionTypeId,
    pub name: String,
    pub presentation: String,
    pub values: Vec<OptionValue>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOptionValue {
    pub option_type_id: OptionTypeId,
    pub value: OptionValue,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionTypeCommand {
    Create(CreateOptionType),
    AddValue(AddOptionValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTypeCreated {
    pub option_type_id: OptionTypeId,
    pub name: String,
    pub presentation: String,
    pub values: Vec<OptionValue>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValueAdded {
    pub option_type_id: OptionTypeId,
    pub value: OptionValue,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionTypeEvent {
    Created(OptionTypeCreated),
    ValueAdded(OptionValueAdded),
}

impl Event for OptionTypeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OptionTypeEvent::Created(_) => "catalog.option_type.created",
            OptionTypeEvent::ValueAdded(_) => "catalog.option_type.value_added",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OptionTypeEvent::Created(e) => e.occurred_at,
            OptionTypeEvent::ValueAdded(e) => e.occurred_at,
        }
    }
}

fn validate_value(value: &OptionValue, prefix: &str, errors: &mut FieldErrors) {
    let mut own = FieldErrors::new();
    if value.name.trim().is_empty() {
        own.add("name", "can't be blank");
    }
    if value.presentation.trim().is_empty() {
        own.add("presentation", "can't be blank");
    }
    errors.merge_prefixed(prefix, own);
}

impl Aggregate for OptionType {
    type Command = OptionTypeCommand;
    type Event = OptionTypeEvent;
    type Error = DomainError;

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OptionTypeCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("option type already exists"));
                }
                let mut errors = FieldErrors::new();
                if cmd.name.trim().is_empty() {
                    errors.add("name", "can't be blank");
                }
                if cmd.presentation.trim().is_empty() {
                    errors.add("presentation", "can't be blank");
                }
                for value in &cmd.values {
                    validate_value(value, "option_values", &mut errors);
                }
                errors.into_result()?;

                Ok(vec![OptionTypeEvent::Created(OptionTypeCreated {
                    option_type_id: cmd.option_type_id,
                    name: cmd.name.trim().to_string(),
                    presentation: cmd.presentation.trim().to_string(),
                    values: cmd.values.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            OptionTypeCommand::AddValue(cmd) => {
                if !self.created {
                    return Err(DomainError::NotFound);
                }
                let mut errors = FieldErrors::new();
                validate_value(&cmd.value, "", &mut errors);
                if self.values.iter().any(|v| v.name.eq_ignore_ascii_case(cmd.value.name.trim())) {
                    errors.add("name", "has already been taken");
                }
                errors.into_result()?;

                Ok(vec![OptionTypeEvent::ValueAdded(OptionValueAdded {
                    option_type_id: cmd.option_type_id,
                    value: cmd.value.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OptionTypeEvent::Created(e) => {
                self.id = e.option_type_id;
                self.name = e.name.clone();
                self.presentation = e.presentation.clone();
                self.values = e.values.clone();
                self.created = true;
            }
            OptionTypeEvent::ValueAdded(e) => self.values.push(e.value.clone()),
        }
        self.version += 1;
    }
}
