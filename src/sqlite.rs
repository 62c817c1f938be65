//! SQLite-backed collaborators: the operational store holding the expressions and the
//! data-source taxonomy, and the warehouse keeping one category table per data source.

use crate::{
    config::WarehouseSettings,
    error::StoreError,
    ids::{CategoryId, DataSourceId, EntityId, OwnerId},
    store::{
        Candidate, CandidateScope, CandidateStore, ProviderRegistry, TaxonomyStore,
        UnavailableStore, EXPRESSION_TYPE_ID,
    },
};
use itertools::Itertools;
use rusqlite::{params, params_from_iter, types::Value, Connection};
use std::{collections::BTreeMap, path::Path};
use tracing::warn;

// Stays well below SQLITE_MAX_VARIABLE_NUMBER on every SQLite version.
const MAX_CATEGORIES_PER_STATEMENT: usize = 500;

/// The operational database: expressions, their owners and the shared category taxonomy.
pub struct AudienceDb {
    connection: Connection,
}

impl AudienceDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

/// The textual patterns matching a reference to the data source in a stored expression, compact
/// or not. Also matches longer ids sharing the prefix (`1` matches `11`).
fn reference_patterns(data_source_id: DataSourceId) -> [String; 2] {
    [
        format!("%\"data_source_id\":{data_source_id}%"),
        format!("%\"data_source_id\": {data_source_id}%"),
    ]
}

impl CandidateStore for AudienceDb {
    fn fetch_candidates(
        &self,
        origins: &[DataSourceId],
        scope: CandidateScope,
    ) -> Result<Vec<Candidate>, StoreError> {
        if origins.is_empty() {
            return Ok(Vec::new());
        }

        let patterns = origins
            .iter()
            .flat_map(|origin| reference_patterns(*origin))
            .collect_vec();
        // ?1 is the expression type.
        let references = (2..patterns.len() + 2)
            .map(|i| format!("a.expression LIKE ?{i}"))
            .join(" OR ");
        let active_only = match scope {
            CandidateScope::All => "",
            CandidateScope::ActiveCampaignGroups => {
                "AND EXISTS (
                    SELECT 1 FROM audience_campaign_groups cg
                    INNER JOIN active_campaign_groups ac ON ac.campaign_group_id = cg.campaign_group_id
                    WHERE cg.audience_id = a.audience_id
                )"
            }
        };
        let sql = format!(
            "SELECT a.audience_id, a.expression, adv.advertiser_id, adv.company_name
             FROM audiences a
             INNER JOIN advertisers adv ON adv.advertiser_id = a.advertiser_id
             WHERE a.expression_type_id = ?1 AND ({references}) {active_only}
             ORDER BY a.audience_id"
        );

        let parameters = std::iter::once(Value::from(i64::from(EXPRESSION_TYPE_ID)))
            .chain(patterns.into_iter().map(Value::from));
        let mut statement = self.connection.prepare(&sql)?;
        let candidates = statement
            .query_map(params_from_iter(parameters), |row| {
                Ok(Candidate {
                    entity_id: EntityId(row.get(0)?),
                    expression: row.get(1)?,
                    owner_id: OwnerId(row.get(2)?),
                    owner_name: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }
}

impl TaxonomyStore for AudienceDb {
    fn name(&self) -> &str {
        "operational"
    }

    fn deprecate(
        &self,
        data_source_id: DataSourceId,
        categories: &[CategoryId],
    ) -> Result<usize, StoreError> {
        let mut updated = 0;
        for chunk in categories.chunks(MAX_CATEGORIES_PER_STATEMENT) {
            let sql = format!(
                "UPDATE categories SET deprecated = 1
                 WHERE data_source_id = ?1 AND data_source_category_id IN ({})",
                placeholders(2, chunk.len())
            );
            let parameters =
                std::iter::once(data_source_id.0).chain(chunk.iter().map(|category| category.0));
            updated += self
                .connection
                .execute(&sql, params_from_iter(parameters))?;
        }
        Ok(updated)
    }
}

impl ProviderRegistry for AudienceDb {
    fn remove_provider(&self, provider_name: &str) -> Result<usize, StoreError> {
        Ok(self.connection.execute(
            "DELETE FROM non_restricted_providers WHERE provider_name = ?1",
            params![provider_name],
        )?)
    }
}

/// Open the configured warehouse.
///
/// A warehouse that cannot be opened, or whose tables are misconfigured, is replaced by an
/// [`UnavailableStore`] so that deprecating its categories fails on its own.
pub fn open_warehouse(settings: &WarehouseSettings) -> Box<dyn TaxonomyStore> {
    let opened = settings
        .tables()
        .map_err(|error| error.to_string())
        .and_then(|tables| {
            WarehouseDb::open(&settings.path, tables).map_err(|error| error.to_string())
        });
    match opened {
        Ok(warehouse) => Box::new(warehouse),
        Err(reason) => {
            warn!(path = %settings.path, %reason, "warehouse is unavailable");
            Box::new(UnavailableStore::new("warehouse", reason))
        }
    }
}

/// The data warehouse, where each data source keeps its taxonomy in its own table.
pub struct WarehouseDb {
    connection: Connection,
    tables: BTreeMap<DataSourceId, String>,
}

impl WarehouseDb {
    pub fn open<P: AsRef<Path>>(
        path: P,
        tables: BTreeMap<DataSourceId, String>,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(Connection::open(path)?, tables))
    }

    pub fn new(connection: Connection, tables: BTreeMap<DataSourceId, String>) -> Self {
        Self { connection, tables }
    }

    fn table_of(&self, data_source_id: DataSourceId) -> Result<&str, StoreError> {
        self.tables
            .get(&data_source_id)
            .map(String::as_str)
            .ok_or(StoreError::UnknownDataSource(data_source_id))
    }
}

impl TaxonomyStore for WarehouseDb {
    fn name(&self) -> &str {
        "warehouse"
    }

    fn deprecate(
        &self,
        data_source_id: DataSourceId,
        categories: &[CategoryId],
    ) -> Result<usize, StoreError> {
        let table = quote_identifier(self.table_of(data_source_id)?);
        let mut updated = 0;
        for chunk in categories.chunks(MAX_CATEGORIES_PER_STATEMENT) {
            let sql = format!(
                "UPDATE {table} SET deprecated = 1, updated_date = date('now')
                 WHERE data_source_category_id IN ({})",
                placeholders(1, chunk.len())
            );
            updated += self.connection.execute(
                &sql,
                params_from_iter(chunk.iter().map(|category| category.0)),
            )?;
        }
        Ok(updated)
    }
}

fn placeholders(first: usize, count: usize) -> String {
    (first..first + count).map(|i| format!("?{i}")).join(", ")
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
