use crate::{
    error::{PushError, StoreError},
    ids::{CategoryId, DataSourceId, EntityId, OwnerId},
};
use serde::{Deserialize, Serialize};

/// The expression type of boolean interest expressions in the targeting service.
pub const EXPRESSION_TYPE_ID: u8 = 2;

/// A stored expression that may reference an origin data source.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub entity_id: EntityId,
    pub expression: String,
    pub owner_id: OwnerId,
    pub owner_name: String,
}

/// A rewritten expression waiting to be pushed to the targeting service.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionUpdate {
    pub entity_id: EntityId,
    pub owner_id: OwnerId,
    pub expression: String,
}

/// The body of an expression update request.
#[derive(Debug, PartialEq, Serialize)]
pub struct UpdateBody<'a> {
    pub expression: &'a str,
    #[serde(rename = "expressionTypeId")]
    pub expression_type_id: u8,
}

impl ExpressionUpdate {
    pub fn body(&self) -> UpdateBody<'_> {
        UpdateBody {
            expression: &self.expression,
            expression_type_id: EXPRESSION_TYPE_ID,
        }
    }
}

/// Which stored expressions are considered for a rewrite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CandidateScope {
    /// Every boolean interest expression.
    #[default]
    All,
    /// Only expressions attached to an active campaign group.
    ActiveCampaignGroups,
}

/// The store holding the expressions.
pub trait CandidateStore {
    /// Fetch every expression that may reference one of the `origins`.
    ///
    /// The filter is a prefilter only: some candidates may not reference any origin at all.
    fn fetch_candidates(
        &self,
        origins: &[DataSourceId],
        scope: CandidateScope,
    ) -> Result<Vec<Candidate>, StoreError>;
}

/// The service applying expressions to live campaigns.
pub trait TargetingService {
    fn push_update(&self, update: &ExpressionUpdate) -> Result<(), PushError>;
}

/// A store keeping a copy of a data source taxonomy.
pub trait TaxonomyStore {
    fn name(&self) -> &str;

    /// Flag the categories of the data source as deprecated, returning the amount of updated rows.
    fn deprecate(
        &self,
        data_source_id: DataSourceId,
        categories: &[CategoryId],
    ) -> Result<usize, StoreError>;
}

/// Stands in for a store that could not be opened, failing every request with the reason.
#[derive(Clone, Debug, PartialEq)]
pub struct UnavailableStore {
    name: String,
    reason: String,
}

impl UnavailableStore {
    pub fn new(name: &str, reason: String) -> Self {
        Self {
            name: name.to_owned(),
            reason,
        }
    }
}

impl TaxonomyStore for UnavailableStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn deprecate(&self, _: DataSourceId, _: &[CategoryId]) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}

/// The providers whose segments are automatically distributed through LiveRamp.
pub trait ProviderRegistry {
    /// Stop the automated updates of the provider, returning the amount of removed entries.
    fn remove_provider(&self, provider_name: &str) -> Result<usize, StoreError>;
}
