//! Application services: command wiring, read models and the checks that
//! span more than one aggregate (uniqueness, ownership, atomic bulk edits).
//!
//! Commands run under a single write lock and their committed events are
//! applied to every projection before the lock is released, so reads issued
//! after a successful call always observe it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use harvest_auth::user::{AssignRole, CreateUser, RevokeRole, UpdateUser};
use harvest_auth::{
    AuthzError, Hs256JwtValidator, JwtClaims, JwtError, PasswordDigest, Principal, Role, User,
    UserCommand, normalize_email, permissions, role_permissions, validate_email, validate_password,
};
use harvest_catalog::{
    AddVariant, AttachImage, CreateOptionType, CreateProduct, CreateProperty, DeleteProduct, Image,
    ImageId, OptionType, OptionTypeCommand, OptionTypeId, OptionValue, OptionValueId,
    OptionValueSnapshot, Product, ProductCommand, ProductId, ProductProperty, Property,
    PropertyCommand, PropertyId, ReplaceImage, SetProperty, SoftDeleteVariant, UnitSettings,
    UpdateProduct, UpdateVariant, Variant, VariantChanges, VariantEdit, VariantId, VariantUnit,
};
use harvest_core::{Aggregate, AggregateId, DomainError, FieldErrors, UserId, slugify};
use harvest_enterprises::{
    AddManager, Enterprise, EnterpriseCommand, EnterpriseId, RegisterEnterprise, RemoveManager, Sells,
};
use harvest_events::Event;
use harvest_infra::{
    AttachmentStore, CatalogProjection, CommandDispatcher, DispatchError, InMemoryAttachmentStore,
    InMemoryEventStore, InMemoryProductsCache, PRODUCT_AGGREGATE_TYPE, Page, Paginated,
    ProductsCache, ProjectionError, SnapshotProjection, StoredAttachment, StoredEvent, VariantSearch,
    paginate,
};
use harvest_orders::{AddLineItem, CompleteOrder, CreateOrder, Order, OrderCommand, OrderId};

use crate::authz;
use crate::context::CurrentUser;

pub const USER_AGGREGATE_TYPE: &str = "auth.user";
pub const ENTERPRISE_AGGREGATE_TYPE: &str = "enterprises.enterprise";
pub const OPTION_TYPE_AGGREGATE_TYPE: &str = "catalog.option_type";
pub const PROPERTY_AGGREGATE_TYPE: &str = "catalog.property";
pub const ORDER_AGGREGATE_TYPE: &str = "orders.order";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation(FieldErrors::single(field, message))
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(errors) => ServiceError::Validation(errors),
            DispatchError::InvariantViolation(msg) => ServiceError::validation("base", msg),
            DispatchError::NotFound => ServiceError::NotFound,
            DispatchError::Unauthorized => ServiceError::Unauthorized("refused by the domain".to_string()),
            DispatchError::Conflict(msg) | DispatchError::Concurrency(msg) => ServiceError::Conflict(msg),
            DispatchError::Deserialize(msg) => ServiceError::Internal(msg),
            DispatchError::Store(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        DispatchError::from(value).into()
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Unauthorized(value.to_string())
    }
}

impl From<ProjectionError> for ServiceError {
    fn from(value: ProjectionError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

impl From<JwtError> for ServiceError {
    fn from(value: JwtError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs / outputs
// ─────────────────────────────────────────────────────────────────────────────

/// An uploaded file before format detection.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file_name: Option<String>,
    pub alt: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub supplier_id: Option<EnterpriseId>,
    pub name: String,
    pub description: String,
    pub permalink: Option<String>,
    pub units: UnitSettings,
    pub sku: String,
    pub price: Option<u64>,
    pub cost_price: Option<u64>,
    pub unit_value: Option<f64>,
    pub unit_description: String,
    pub on_hand: i64,
    pub on_demand: bool,
    pub image: Option<Upload>,
}

/// Submitted unit fields; unsent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitChanges {
    pub variant_unit: Option<VariantUnit>,
    pub variant_unit_scale: Option<f64>,
    pub variant_unit_name: Option<String>,
}

impl UnitChanges {
    pub fn is_empty(&self) -> bool {
        *self == UnitChanges::default()
    }

    /// Overlay onto the current settings. Switching to `items` without a
    /// scale drops the old scale, which items never carry.
    pub fn merge(&self, current: &UnitSettings) -> UnitSettings {
        let variant_unit = self.variant_unit.or(current.variant_unit);
        let switched = self.variant_unit.is_some() && self.variant_unit != current.variant_unit;
        let variant_unit_scale = match self.variant_unit_scale {
            Some(scale) => Some(scale),
            None if switched && variant_unit == Some(VariantUnit::Items) => None,
            None => current.variant_unit_scale,
        };
        UnitSettings {
            variant_unit,
            variant_unit_scale,
            variant_unit_name: self
                .variant_unit_name
                .clone()
                .or_else(|| current.variant_unit_name.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VariantInput {
    pub changes: VariantChanges,
    pub option_value_ids: Option<Vec<OptionValueId>>,
}

/// One `variants_attributes` entry: with an id it edits, without one it adds.
#[derive(Debug, Clone, Default)]
pub struct VariantAttributes {
    pub id: Option<VariantId>,
    pub input: VariantInput,
}

#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub units: UnitChanges,
    /// `(property name, value)`.
    pub properties: Vec<(String, String)>,
    pub variants: Vec<VariantAttributes>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewEnterprise {
    pub name: String,
    pub owner: UserId,
    pub is_primary_producer: bool,
    pub sells: Sells,
}

#[derive(Debug, Clone, Default)]
pub struct NewOptionType {
    pub name: String,
    pub presentation: String,
    /// `(name, presentation)`.
    pub values: Vec<(String, String)>,
}

/// A variant with the product it belongs to.
#[derive(Debug, Clone)]
pub struct VariantView {
    pub product: Product,
    pub variant: Variant,
}

impl From<(Product, Variant)> for VariantView {
    fn from((product, variant): (Product, Variant)) -> Self {
        Self { product, variant }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
}

/// The signed-in user's completed orders and the shops they were placed with.
#[derive(Debug, Clone)]
pub struct AccountOverview {
    pub user: User,
    pub orders: Vec<Order>,
    pub shops: Vec<Enterprise>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>>;

pub struct AppServices {
    dispatcher: Dispatcher,
    users: SnapshotProjection<User>,
    enterprises: SnapshotProjection<Enterprise>,
    option_types: SnapshotProjection<OptionType>,
    properties: SnapshotProjection<Property>,
    orders: SnapshotProjection<Order>,
    catalog: CatalogProjection,
    attachments: Arc<dyn AttachmentStore>,
    products_cache: Arc<dyn ProductsCache>,
    tokens: Arc<Hs256JwtValidator>,
    token_ttl: Duration,
    write_lock: Mutex<()>,
}

fn make_product(id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

fn make_order(id: AggregateId) -> Order {
    Order::empty(OrderId::new(id))
}

impl AppServices {
    pub fn in_memory(tokens: Arc<Hs256JwtValidator>, token_ttl: Duration) -> Self {
        Self::with_collaborators(
            tokens,
            token_ttl,
            Arc::new(InMemoryAttachmentStore::new()),
            Arc::new(InMemoryProductsCache::new()),
        )
    }

    pub fn with_collaborators(
        tokens: Arc<Hs256JwtValidator>,
        token_ttl: Duration,
        attachments: Arc<dyn AttachmentStore>,
        products_cache: Arc<dyn ProductsCache>,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(Arc::new(InMemoryEventStore::new())),
            users: SnapshotProjection::in_memory(USER_AGGREGATE_TYPE, |id| User::empty(UserId::from(id))),
            enterprises: SnapshotProjection::in_memory(ENTERPRISE_AGGREGATE_TYPE, |id| {
                Enterprise::empty(EnterpriseId::new(id))
            }),
            option_types: SnapshotProjection::in_memory(OPTION_TYPE_AGGREGATE_TYPE, |id| {
                OptionType::empty(OptionTypeId::new(id))
            }),
            properties: SnapshotProjection::in_memory(PROPERTY_AGGREGATE_TYPE, |id| {
                Property::empty(PropertyId::new(id))
            }),
            orders: SnapshotProjection::in_memory(ORDER_AGGREGATE_TYPE, make_order),
            catalog: CatalogProjection::new(),
            attachments,
            products_cache,
            tokens,
            token_ttl,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, ServiceError> {
        self.write_lock
            .lock()
            .map_err(|_| ServiceError::Internal("write lock poisoned".to_string()))
    }

    /// Dispatch and project. Callers hold the write lock.
    fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, ServiceError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let committed = self.dispatcher.dispatch(aggregate_id, aggregate_type, command, make)?;
        self.project(&committed)?;
        Ok(committed)
    }

    fn project(&self, committed: &[StoredEvent]) -> Result<(), ProjectionError> {
        for stored in committed {
            let envelope = stored.to_envelope();
            self.users.apply_envelope(&envelope)?;
            self.enterprises.apply_envelope(&envelope)?;
            self.option_types.apply_envelope(&envelope)?;
            self.properties.apply_envelope(&envelope)?;
            self.orders.apply_envelope(&envelope)?;
            self.catalog.apply_envelope(&envelope)?;
        }
        Ok(())
    }

    // ── users ────────────────────────────────────────────────────────────────

    pub fn register_user(&self, email: &str, password: &str, confirmation: &str) -> Result<User, ServiceError> {
        self.create_user(email, password, confirmation, vec![Role::USER])
    }

    /// Create the configured administrator unless the email is already taken.
    pub fn bootstrap_admin(&self, email: &str, password: &str) -> Result<(), ServiceError> {
        if self.is_registered(email) {
            return Ok(());
        }
        let admin = self.create_user(email, password, password, vec![Role::ADMIN, Role::USER])?;
        tracing::info!(user_id = %admin.id, "bootstrap administrator created");
        Ok(())
    }

    fn create_user(
        &self,
        email: &str,
        password: &str,
        confirmation: &str,
        roles: Vec<Role>,
    ) -> Result<User, ServiceError> {
        let _guard = self.lock()?;

        let mut errors = validate_email(email);
        errors.merge_prefixed("", validate_password(password, confirmation));
        if self.find_user_by_email(email).is_some() {
            errors.add("email", "has already been taken");
        }
        errors.into_result()?;

        let user_id = UserId::new();
        self.execute(
            user_id.into(),
            USER_AGGREGATE_TYPE,
            UserCommand::Create(CreateUser {
                user_id,
                email: email.to_string(),
                password_digest: PasswordDigest::hash(password),
                roles,
                occurred_at: Utc::now(),
            }),
            |id| User::empty(UserId::from(id)),
        )?;
        self.user(user_id)
            .ok_or_else(|| ServiceError::Internal("created user missing from read model".to_string()))
    }

    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.users.get(user_id.into()).filter(|u| u.created)
    }

    /// Case-insensitive lookup.
    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let email = normalize_email(email);
        if email.is_empty() {
            return None;
        }
        self.users.list().into_iter().find(|u| u.created && u.email == email)
    }

    pub fn is_registered(&self, email: &str) -> bool {
        self.find_user_by_email(email).is_some()
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let user = self
            .find_user_by_email(email)
            .filter(|u| u.password_matches(password))
            .ok_or_else(|| ServiceError::Unauthorized("invalid email or password".to_string()))?;

        let claims = JwtClaims::new(user.id, user.roles.clone(), Utc::now(), self.token_ttl);
        let token = self.tokens.issue(&claims)?;
        Ok(Session { token, user_id: user.id })
    }

    pub fn update_account(&self, user_id: UserId, changes: &AccountChanges) -> Result<User, ServiceError> {
        let _guard = self.lock()?;
        self.user(user_id).ok_or(ServiceError::NotFound)?;

        let mut errors = FieldErrors::new();
        let email = changes.email.as_deref().filter(|e| !e.trim().is_empty());
        if let Some(email) = email {
            errors.merge_prefixed("", validate_email(email));
            if self.find_user_by_email(email).is_some_and(|other| other.id != user_id) {
                errors.add("email", "has already been taken");
            }
        }
        let password = changes.password.as_deref().filter(|p| !p.is_empty());
        if let Some(password) = password {
            let confirmation = changes.password_confirmation.as_deref().unwrap_or_default();
            errors.merge_prefixed("", validate_password(password, confirmation));
        }
        errors.into_result()?;

        self.execute(
            user_id.into(),
            USER_AGGREGATE_TYPE,
            UserCommand::Update(UpdateUser {
                user_id,
                email: email.map(str::to_string),
                password_digest: password.map(PasswordDigest::hash),
                occurred_at: Utc::now(),
            }),
            |id| User::empty(UserId::from(id)),
        )?;
        self.user(user_id).ok_or(ServiceError::NotFound)
    }

    /// Grant a known role. Non-administrators may only pass on roles they
    /// hold themselves.
    pub fn assign_role(&self, principal: &Principal, user_id: UserId, role: Role) -> Result<User, ServiceError> {
        authz::require(principal, &permissions::USERS_ADMIN)?;
        if role_permissions(role.as_str()).is_empty() {
            return Err(ServiceError::validation("role", "is not included in the list"));
        }
        let _guard = self.lock()?;
        self.user(user_id).ok_or(ServiceError::NotFound)?;

        self.execute(
            user_id.into(),
            USER_AGGREGATE_TYPE,
            UserCommand::AssignRole(AssignRole {
                user_id,
                role: role.clone(),
                actor_roles: principal.roles.clone(),
                occurred_at: Utc::now(),
            }),
            |id| User::empty(UserId::from(id)),
        )?;
        tracing::info!(user_id = %user_id, role = %role, "role assigned");
        self.user(user_id).ok_or(ServiceError::NotFound)
    }

    pub fn revoke_role(&self, principal: &Principal, user_id: UserId, role: Role) -> Result<User, ServiceError> {
        authz::require(principal, &permissions::USERS_ADMIN)?;
        let _guard = self.lock()?;
        self.user(user_id).ok_or(ServiceError::NotFound)?;

        self.execute(
            user_id.into(),
            USER_AGGREGATE_TYPE,
            UserCommand::RevokeRole(RevokeRole {
                user_id,
                role: role.clone(),
                occurred_at: Utc::now(),
            }),
            |id| User::empty(UserId::from(id)),
        )?;
        tracing::info!(user_id = %user_id, role = %role, "role revoked");
        self.user(user_id).ok_or(ServiceError::NotFound)
    }

    pub fn account_overview(
        &self,
        user_id: UserId,
        distributor: Option<EnterpriseId>,
    ) -> Result<AccountOverview, ServiceError> {
        let user = self.user(user_id).ok_or(ServiceError::NotFound)?;
        let completed: Vec<Order> = self
            .orders
            .list()
            .into_iter()
            .filter(|o| o.user() == Some(user_id) && o.is_complete())
            .collect();

        let shop_ids: BTreeSet<EnterpriseId> = completed.iter().filter_map(Order::distributor).collect();
        let shops = shop_ids.into_iter().filter_map(|id| self.enterprise(id)).collect();
        let orders = completed
            .into_iter()
            .filter(|o| distributor.is_none_or(|d| o.distributor() == Some(d)))
            .collect();

        Ok(AccountOverview { user, orders, shops })
    }

    // ── enterprises ──────────────────────────────────────────────────────────

    pub fn enterprise(&self, id: EnterpriseId) -> Option<Enterprise> {
        self.enterprises.get(id.0).filter(Enterprise::is_created)
    }

    pub fn managed_enterprises(&self, user_id: UserId) -> Vec<EnterpriseId> {
        self.enterprises
            .list()
            .into_iter()
            .filter(|e| e.manages(user_id))
            .map(|e| e.id_typed())
            .collect()
    }

    pub fn principal(&self, user: &CurrentUser) -> Principal {
        authz::principal_for(user, self.managed_enterprises(user.user_id()))
    }

    pub fn register_enterprise(&self, principal: &Principal, new: NewEnterprise) -> Result<Enterprise, ServiceError> {
        authz::require(principal, &permissions::ENTERPRISES_ADMIN)?;
        let _guard = self.lock()?;

        if self.user(new.owner).is_none() {
            return Err(ServiceError::validation("owner_id", "does not exist"));
        }

        let enterprise_id = EnterpriseId::new(AggregateId::new());
        self.execute(
            enterprise_id.0,
            ENTERPRISE_AGGREGATE_TYPE,
            EnterpriseCommand::Register(RegisterEnterprise {
                enterprise_id,
                name: new.name,
                owner: new.owner,
                is_primary_producer: new.is_primary_producer,
                sells: new.sells,
                occurred_at: Utc::now(),
            }),
            |id| Enterprise::empty(EnterpriseId::new(id)),
        )?;
        tracing::info!(enterprise_id = %enterprise_id, "enterprise registered");
        self.enterprise(enterprise_id)
            .ok_or_else(|| ServiceError::Internal("registered enterprise missing from read model".to_string()))
    }

    /// Owners add their own managers; administrators add anyone's.
    pub fn add_manager(
        &self,
        principal: &Principal,
        enterprise_id: EnterpriseId,
        user_id: UserId,
    ) -> Result<Enterprise, ServiceError> {
        let _guard = self.lock()?;
        let enterprise = self.enterprise(enterprise_id).ok_or(ServiceError::NotFound)?;
        if enterprise.owner() != Some(principal.user_id) {
            authz::require(principal, &permissions::ENTERPRISES_ADMIN)?;
        }
        if self.user(user_id).is_none() {
            return Err(ServiceError::validation("user_id", "does not exist"));
        }

        self.execute(
            enterprise_id.0,
            ENTERPRISE_AGGREGATE_TYPE,
            EnterpriseCommand::AddManager(AddManager {
                enterprise_id,
                user: user_id,
                occurred_at: Utc::now(),
            }),
            |id| Enterprise::empty(EnterpriseId::new(id)),
        )?;
        self.enterprise(enterprise_id).ok_or(ServiceError::NotFound)
    }

    /// Owners remove their own managers; administrators anyone's. The owner
    /// always stays.
    pub fn remove_manager(
        &self,
        principal: &Principal,
        enterprise_id: EnterpriseId,
        user_id: UserId,
    ) -> Result<Enterprise, ServiceError> {
        let _guard = self.lock()?;
        let enterprise = self.enterprise(enterprise_id).ok_or(ServiceError::NotFound)?;
        if enterprise.owner() != Some(principal.user_id) {
            authz::require(principal, &permissions::ENTERPRISES_ADMIN)?;
        }

        self.execute(
            enterprise_id.0,
            ENTERPRISE_AGGREGATE_TYPE,
            EnterpriseCommand::RemoveManager(RemoveManager {
                enterprise_id,
                user: user_id,
                occurred_at: Utc::now(),
            }),
            |id| Enterprise::empty(EnterpriseId::new(id)),
        )?;
        tracing::info!(enterprise_id = %enterprise_id, user_id = %user_id, "manager removed");
        self.enterprise(enterprise_id).ok_or(ServiceError::NotFound)
    }

    // ── catalog metadata ─────────────────────────────────────────────────────

    pub fn create_option_type(&self, principal: &Principal, new: NewOptionType) -> Result<OptionType, ServiceError> {
        authz::require(principal, &permissions::CATALOG_ADMIN)?;
        let _guard = self.lock()?;

        let option_type_id = OptionTypeId::new(AggregateId::new());
        let values = new
            .values
            .into_iter()
            .map(|(name, presentation)| OptionValue {
                id: OptionValueId::new(),
                name,
                presentation,
            })
            .collect();
        self.execute(
            option_type_id.0,
            OPTION_TYPE_AGGREGATE_TYPE,
            OptionTypeCommand::Create(CreateOptionType {
                option_type_id,
                name: new.name,
                presentation: new.presentation,
                values,
                occurred_at: Utc::now(),
            }),
            |id| OptionType::empty(OptionTypeId::new(id)),
        )?;
        self.option_types
            .get(option_type_id.0)
            .ok_or_else(|| ServiceError::Internal("created option type missing from read model".to_string()))
    }

    /// Resolve option value ids to the snapshots variants carry.
    pub fn option_value_snapshots(&self, ids: &[OptionValueId]) -> Result<Vec<OptionValueSnapshot>, ServiceError> {
        let option_types = self.option_types.list();
        ids.iter()
            .map(|id| {
                option_types
                    .iter()
                    .find_map(|ot| ot.snapshot(*id))
                    .ok_or_else(|| ServiceError::validation("option_value_ids", "is invalid"))
            })
            .collect()
    }

    pub fn create_property(
        &self,
        principal: &Principal,
        name: &str,
        presentation: Option<String>,
    ) -> Result<Property, ServiceError> {
        authz::require(principal, &permissions::CATALOG_ADMIN)?;
        let _guard = self.lock()?;

        if self.property_by_name(name).is_some() {
            return Err(ServiceError::validation("name", "has already been taken"));
        }

        let property_id = PropertyId::new(AggregateId::new());
        self.execute(
            property_id.0,
            PROPERTY_AGGREGATE_TYPE,
            PropertyCommand::Create(CreateProperty {
                property_id,
                name: name.to_string(),
                presentation,
                occurred_at: Utc::now(),
            }),
            |id| Property::empty(PropertyId::new(id)),
        )?;
        self.properties
            .get(property_id.0)
            .ok_or_else(|| ServiceError::Internal("created property missing from read model".to_string()))
    }

    pub fn property_by_name(&self, name: &str) -> Option<Property> {
        let name = name.trim();
        self.properties
            .list()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    // ── products ─────────────────────────────────────────────────────────────

    /// Product by id or permalink, deleted ones included.
    pub fn find_product(&self, key: &str) -> Option<Product> {
        key.parse::<ProductId>()
            .ok()
            .and_then(|id| self.catalog.product(id))
            .or_else(|| self.catalog.find_by_permalink(key.trim()))
    }

    fn unique_permalink(&self, base: &str) -> String {
        let taken = |candidate: &str| self.catalog.find_by_permalink(candidate).is_some();
        if !taken(base) {
            return base.to_string();
        }
        (2u32..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn create_product(&self, principal: &Principal, new: NewProduct) -> Result<Product, ServiceError> {
        let _guard = self.lock()?;

        let supplier_id = new
            .supplier_id
            .ok_or_else(|| ServiceError::validation("supplier_id", "can't be blank"))?;
        let supplier = self
            .enterprise(supplier_id)
            .ok_or_else(|| ServiceError::validation("supplier_id", "does not exist"))?;
        harvest_auth::authorize_supplier(principal, supplier_id.0)?;

        let mut errors = FieldErrors::new();
        if !supplier.is_supplier() {
            errors.add("supplier_id", "is not a primary producer");
        }

        let image = match &new.image {
            Some(upload) => {
                match Image::from_upload(ImageId::new(), upload.file_name.as_deref(), upload.alt.clone(), &upload.bytes) {
                    Ok(image) => Some(image),
                    Err(DomainError::Validation(e)) => {
                        errors.merge_prefixed("", e);
                        None
                    }
                    Err(other) => return Err(other.into()),
                }
            }
            None => None,
        };

        let base = match new.permalink.as_deref().map(str::trim) {
            Some(given) if !given.is_empty() => slugify(given),
            _ => slugify(&new.name),
        };
        let product_id = ProductId::new(AggregateId::new());
        let mut cmd = CreateProduct {
            product_id,
            name: new.name,
            description: new.description,
            permalink: self.unique_permalink(&base),
            supplier: supplier_id,
            units: new.units,
            master_variant_id: VariantId::new(),
            variant_id: VariantId::new(),
            sku: new.sku,
            price: new.price,
            cost_price: new.cost_price,
            unit_value: new.unit_value,
            unit_description: new.unit_description,
            on_hand: new.on_hand,
            on_demand: new.on_demand,
            image: None,
            occurred_at: Utc::now(),
        };

        // Collect every form error in one pass, image included.
        match Product::empty(product_id).handle(&ProductCommand::Create(cmd.clone())) {
            Ok(_) => {}
            Err(DomainError::Validation(e)) => errors.merge_prefixed("", e),
            Err(other) => return Err(other.into()),
        }
        errors.into_result()?;

        cmd.image = image.clone();
        self.execute(product_id.0, PRODUCT_AGGREGATE_TYPE, ProductCommand::Create(cmd), make_product)?;
        if let (Some(image), Some(upload)) = (image, new.image) {
            self.attachments.put(
                image.id,
                StoredAttachment {
                    content_type: image.attachment_content_type,
                    bytes: upload.bytes,
                },
            );
        }

        tracing::info!(product_id = %product_id, supplier_id = %supplier_id, "product created");
        self.catalog
            .product(product_id)
            .ok_or_else(|| ServiceError::Internal("created product missing from catalog".to_string()))
    }

    fn resolve_variant_input(&self, input: &VariantInput) -> Result<VariantChanges, ServiceError> {
        let mut changes = input.changes.clone();
        if let Some(ids) = &input.option_value_ids {
            changes.option_values = Some(self.option_value_snapshots(ids)?);
        }
        Ok(changes)
    }

    /// Translate submitted changes into the update command plus the property
    /// values to set afterwards. Unknown property names are skipped.
    fn build_update(
        &self,
        product: &Product,
        changes: &ProductChanges,
    ) -> Result<(UpdateProduct, Vec<ProductProperty>), ServiceError> {
        let mut variants = Vec::new();
        for attributes in &changes.variants {
            let variant_changes = self.resolve_variant_input(&attributes.input)?;
            if variant_changes.is_empty() {
                continue;
            }
            variants.push(match attributes.id {
                Some(variant_id) => VariantEdit::Update {
                    variant_id,
                    changes: variant_changes,
                },
                None => VariantEdit::Add {
                    variant_id: VariantId::new(),
                    changes: variant_changes,
                },
            });
        }

        let properties = changes
            .properties
            .iter()
            .filter_map(|(name, value)| {
                self.property_by_name(name).map(|property| ProductProperty {
                    property_id: property.id_typed(),
                    name: property.name().to_string(),
                    value: value.clone(),
                })
            })
            .collect();

        let update = UpdateProduct {
            product_id: product.id_typed(),
            name: changes.name.clone(),
            description: changes.description.clone(),
            units: (!changes.units.is_empty()).then(|| changes.units.merge(product.units())),
            variants,
            occurred_at: Utc::now(),
        };
        Ok((update, properties))
    }

    fn apply_product_changes(&self, product: &Product, changes: &ProductChanges) -> Result<(), ServiceError> {
        let product_id = product.id_typed();
        let (update, properties) = self.build_update(product, changes)?;
        self.execute(product_id.0, PRODUCT_AGGREGATE_TYPE, ProductCommand::Update(update), make_product)?;
        for property in properties {
            self.execute(
                product_id.0,
                PRODUCT_AGGREGATE_TYPE,
                ProductCommand::SetProperty(SetProperty {
                    product_id,
                    property,
                    occurred_at: Utc::now(),
                }),
                make_product,
            )?;
        }
        Ok(())
    }

    pub fn update_product(
        &self,
        principal: &Principal,
        product_id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, ServiceError> {
        let _guard = self.lock()?;
        let product = self.catalog.live_product(product_id).ok_or(ServiceError::NotFound)?;
        authz::authorize_product(principal, &product)?;

        self.apply_product_changes(&product, changes)?;
        self.catalog.product(product_id).ok_or(ServiceError::NotFound)
    }

    /// All-or-nothing: every product is authorised, then every edit is
    /// validated, and only then is anything committed. A product listed more
    /// than once is validated against a working copy carrying its earlier
    /// entries.
    pub fn bulk_update(
        &self,
        principal: &Principal,
        entries: &[(ProductId, ProductChanges)],
    ) -> Result<(), ServiceError> {
        let _guard = self.lock()?;

        let mut working: Vec<Product> = Vec::new();
        for (product_id, _) in entries {
            if working.iter().any(|p| p.id_typed() == *product_id) {
                continue;
            }
            let product = self.catalog.live_product(*product_id).ok_or(ServiceError::NotFound)?;
            authz::authorize_product(principal, &product)?;
            working.push(product);
        }

        let mut errors = FieldErrors::new();
        for (index, (product_id, changes)) in entries.iter().enumerate() {
            let product = working
                .iter_mut()
                .find(|p| p.id_typed() == *product_id)
                .ok_or(ServiceError::NotFound)?;
            let (update, _) = self.build_update(product, changes)?;
            match product.handle(&ProductCommand::Update(update)) {
                Ok(events) => events.iter().for_each(|event| product.apply(event)),
                Err(DomainError::Validation(e)) => errors.merge_prefixed(&format!("products[{index}]"), e),
                Err(other) => return Err(other.into()),
            }
        }
        errors.into_result()?;

        for (product_id, changes) in entries {
            let product = self.catalog.live_product(*product_id).ok_or(ServiceError::NotFound)?;
            self.apply_product_changes(&product, changes)?;
        }
        tracing::info!(entries = entries.len(), products = working.len(), "bulk update applied");
        Ok(())
    }

    pub fn delete_product(&self, principal: &Principal, key: &str) -> Result<(), ServiceError> {
        let _guard = self.lock()?;
        let product = self
            .find_product(key)
            .filter(|p| !p.is_deleted())
            .ok_or(ServiceError::NotFound)?;
        authz::authorize_product(principal, &product)?;

        let product_id = product.id_typed();
        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::Delete(DeleteProduct {
                product_id,
                occurred_at: Utc::now(),
            }),
            make_product,
        )?;
        tracing::info!(product_id = %product_id, "product deleted");
        Ok(())
    }

    /// Attach the product's first image, or replace it when one exists.
    /// Returns the stored image and whether it is new.
    pub fn upload_product_image(
        &self,
        principal: &Principal,
        product_id: ProductId,
        upload: Upload,
    ) -> Result<(Image, bool), ServiceError> {
        let _guard = self.lock()?;
        let product = self.catalog.live_product(product_id).ok_or(ServiceError::NotFound)?;
        authz::authorize_product(principal, &product)?;

        let master = product
            .master()
            .filter(|m| !m.is_deleted())
            .ok_or(ServiceError::NotFound)?;
        let image = Image::from_upload(ImageId::new(), upload.file_name.as_deref(), upload.alt.clone(), &upload.bytes)?;

        let existing = master.images.iter().min_by_key(|i| i.position).map(|i| i.id);
        let stored_id = existing.unwrap_or(image.id);
        let command = match existing {
            Some(image_id) => ProductCommand::ReplaceImage(ReplaceImage {
                product_id,
                variant_id: master.id,
                image_id,
                image,
                occurred_at: Utc::now(),
            }),
            None => ProductCommand::AttachImage(AttachImage {
                product_id,
                variant_id: master.id,
                image,
                occurred_at: Utc::now(),
            }),
        };
        self.execute(product_id.0, PRODUCT_AGGREGATE_TYPE, command, make_product)?;

        let stored = self
            .catalog
            .product(product_id)
            .and_then(|p| p.images().iter().find(|i| i.id == stored_id).cloned())
            .ok_or_else(|| ServiceError::Internal("uploaded image missing from catalog".to_string()))?;
        self.attachments.put(
            stored.id,
            StoredAttachment {
                content_type: stored.attachment_content_type.clone(),
                bytes: upload.bytes,
            },
        );
        Ok((stored, existing.is_none()))
    }

    pub fn image(&self, image_id: ImageId) -> Option<StoredAttachment> {
        self.attachments.get(image_id)
    }

    /// Products the principal may edit, with their variants.
    pub fn bulk_products(&self, principal: &Principal, page: Page) -> Paginated<Product> {
        let products = self
            .catalog
            .products()
            .into_iter()
            .filter(|p| authz::authorize_product(principal, p).is_ok())
            .collect();
        paginate(products, page)
    }

    // ── variants ─────────────────────────────────────────────────────────────

    /// Variants of live products, masters included. Deleted variants are
    /// listed only for administrators who ask for them.
    pub fn list_variants(
        &self,
        principal: &Principal,
        search: &VariantSearch,
        show_deleted: bool,
        page: Page,
    ) -> Result<Paginated<VariantView>, ServiceError> {
        authz::require(principal, &permissions::CATALOG_READ)?;
        let include_deleted = show_deleted && principal.is_admin();

        let views = self
            .catalog
            .products()
            .into_iter()
            .flat_map(|product| {
                let variants: Vec<Variant> = product
                    .all_variants()
                    .iter()
                    .filter(|v| include_deleted || !v.is_deleted())
                    .filter(|v| search.matches(&product, v))
                    .cloned()
                    .collect();
                variants.into_iter().map(move |variant| VariantView {
                    product: product.clone(),
                    variant,
                })
            })
            .collect();
        Ok(paginate(views, page))
    }

    pub fn variant(&self, variant_id: VariantId) -> Result<VariantView, ServiceError> {
        self.catalog
            .live_variant(variant_id)
            .map(VariantView::from)
            .ok_or(ServiceError::NotFound)
    }

    pub fn create_variant(
        &self,
        principal: &Principal,
        product_id: Option<ProductId>,
        input: &VariantInput,
    ) -> Result<VariantView, ServiceError> {
        let _guard = self.lock()?;
        let Some(product_id) = product_id else {
            // Only administrators get as far as being told what is missing.
            authz::require(principal, &permissions::ALL)?;
            return Err(ServiceError::validation("product_id", "can't be blank"));
        };
        let product = self.catalog.live_product(product_id).ok_or(ServiceError::NotFound)?;
        authz::authorize_product(principal, &product)?;

        let variant_id = VariantId::new();
        let changes = self.resolve_variant_input(input)?;
        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::AddVariant(AddVariant {
                product_id,
                variant_id,
                changes,
                occurred_at: Utc::now(),
            }),
            make_product,
        )?;
        self.variant(variant_id)
    }

    pub fn update_variant(
        &self,
        principal: &Principal,
        variant_id: VariantId,
        input: &VariantInput,
    ) -> Result<VariantView, ServiceError> {
        let _guard = self.lock()?;
        let current = self.variant(variant_id)?;
        authz::authorize_product(principal, &current.product)?;

        let product_id = current.product.id_typed();
        let changes = self.resolve_variant_input(input)?;
        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::UpdateVariant(UpdateVariant {
                product_id,
                variant_id,
                changes,
                occurred_at: Utc::now(),
            }),
            make_product,
        )?;
        self.variant(variant_id)
    }

    /// Plain deletion: the variant disappears from lookups, even the last one.
    pub fn destroy_variant(&self, principal: &Principal, variant_id: VariantId) -> Result<(), ServiceError> {
        let _guard = self.lock()?;
        let view = self.variant(variant_id)?;
        self.delete_variant(principal, view, false)
    }

    /// Soft delete that keeps at least one live variant per product.
    pub fn soft_delete_variant(
        &self,
        principal: &Principal,
        product_id: ProductId,
        variant_id: VariantId,
    ) -> Result<(), ServiceError> {
        let _guard = self.lock()?;
        let view = self.variant(variant_id)?;
        if view.product.id_typed() != product_id {
            return Err(ServiceError::NotFound);
        }
        self.delete_variant(principal, view, true)
    }

    fn delete_variant(&self, principal: &Principal, view: VariantView, guard: bool) -> Result<(), ServiceError> {
        authz::authorize_product(principal, &view.product)?;

        let product_id = view.product.id_typed();
        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::SoftDeleteVariant(SoftDeleteVariant {
                product_id,
                variant_id: view.variant.id,
                guard,
                occurred_at: Utc::now(),
            }),
            make_product,
        )?;
        if !view.variant.is_master {
            self.products_cache.variant_destroyed(product_id, &view.variant);
        }
        tracing::info!(product_id = %product_id, variant_id = %view.variant.id, guard, "variant deleted");
        Ok(())
    }

    // ── orders ───────────────────────────────────────────────────────────────

    /// Open a cart with the distributor. Prices come from the variants.
    pub fn create_order(
        &self,
        user: &CurrentUser,
        distributor_id: EnterpriseId,
        lines: &[(VariantId, u32)],
    ) -> Result<Order, ServiceError> {
        let _guard = self.lock()?;

        let mut errors = FieldErrors::new();
        let distributor = self.enterprise(distributor_id);
        match &distributor {
            None => errors.add("distributor_id", "does not exist"),
            Some(d) if !d.is_distributor() => errors.add("distributor_id", "is not a distributor"),
            Some(_) => {}
        }

        let mut items = Vec::with_capacity(lines.len());
        for (variant_id, quantity) in lines {
            if *quantity == 0 {
                errors.add("line_items.quantity", "must be greater than 0");
                continue;
            }
            let Some((product, variant)) = self.catalog.live_variant(*variant_id) else {
                errors.add("line_items.variant_id", "does not exist");
                continue;
            };
            if variant.is_master {
                errors.add("line_items.variant_id", "is not purchasable");
                continue;
            }
            let own_only = distributor.as_ref().is_some_and(|d| d.sells() == Sells::Own);
            if own_only && product.supplier() != Some(distributor_id) {
                errors.add("line_items.variant_id", "is not sold by this distributor");
                continue;
            }
            items.push((variant.id, *quantity, variant.price));
        }
        errors.into_result()?;

        let order_id = OrderId::new(AggregateId::new());
        let number = format!("R{:09}", self.orders.list().len() + 1);
        self.execute(
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            OrderCommand::Create(CreateOrder {
                order_id,
                number,
                user: Some(user.user_id()),
                distributor: distributor_id,
                occurred_at: Utc::now(),
            }),
            make_order,
        )?;
        for (variant_id, quantity, price) in items {
            self.execute(
                order_id.0,
                ORDER_AGGREGATE_TYPE,
                OrderCommand::AddLineItem(AddLineItem {
                    order_id,
                    variant_id,
                    quantity,
                    price,
                    occurred_at: Utc::now(),
                }),
                make_order,
            )?;
        }
        self.orders
            .get(order_id.0)
            .ok_or_else(|| ServiceError::Internal("created order missing from read model".to_string()))
    }

    pub fn complete_order(&self, user: &CurrentUser, order_id: OrderId) -> Result<Order, ServiceError> {
        let _guard = self.lock()?;
        let order = self.orders.get(order_id.0).ok_or(ServiceError::NotFound)?;
        if order.user() != Some(user.user_id()) && !user.is_admin() {
            return Err(ServiceError::Unauthorized("order belongs to another user".to_string()));
        }

        self.execute(
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            OrderCommand::Complete(CompleteOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            make_order,
        )?;
        self.orders.get(order_id.0).ok_or(ServiceError::NotFound)
    }
}
