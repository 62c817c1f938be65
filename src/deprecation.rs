use crate::{
    ids::{CategoryId, DataSourceId},
    mapping::Mapping,
    rewrite::Rewriter,
    store::{ProviderRegistry, TaxonomyStore},
};
use tracing::{info, warn};

pub const LIVERAMP_DATA_SOURCE_ID: DataSourceId = DataSourceId(11);

/// Flags the remapped origin categories as deprecated in the warehouse and in the operational
/// store.
///
/// Deprecation is best-effort: a failing store is logged and never affects the rewrites already
/// pushed, nor the other store.
pub struct DeprecationNotifier<'a, W: ?Sized, O: ?Sized> {
    warehouse: &'a W,
    operational: &'a O,
}

impl<'a, W, O> DeprecationNotifier<'a, W, O>
where
    W: TaxonomyStore + ?Sized,
    O: TaxonomyStore + ?Sized,
{
    pub fn new(warehouse: &'a W, operational: &'a O) -> Self {
        Self {
            warehouse,
            operational,
        }
    }

    pub fn deprecate(&self, data_source_id: DataSourceId, categories: &[CategoryId]) {
        if categories.is_empty() {
            info!(%data_source_id, "no categories to deprecate");
            return;
        }

        notify(self.warehouse, data_source_id, categories);
        notify(self.operational, data_source_id, categories);
    }

    /// Deprecate the mapped categories of every origin of the rewriter.
    ///
    /// A relabelled origin moves all of its categories without listing them, so there is nothing
    /// to deprecate for it.
    pub fn deprecate_origins(&self, rewriter: &Rewriter) {
        for rule in rewriter.origins() {
            match &rule.mapping {
                Mapping::Table(table) => self.deprecate(rule.data_source_id, &table.origins()),
                Mapping::Relabel => {
                    info!(
                        data_source_id = %rule.data_source_id,
                        "relabelled data source, skipping deprecation"
                    );
                }
            }
        }
    }
}

/// Stop the automated LiveRamp updates of a provider whose LiveRamp segments were remapped, so that
/// they are neither distributed again nor re-added.
///
/// Only applies when LiveRamp is one of the origins of the rewriter. Failures are logged and
/// returned as `false`.
pub fn remove_liveramp_provider<R: ProviderRegistry + ?Sized>(
    registry: &R,
    rewriter: &Rewriter,
    provider_name: &str,
) -> bool {
    let from_liveramp = rewriter
        .origins()
        .iter()
        .any(|rule| rule.data_source_id == LIVERAMP_DATA_SOURCE_ID);
    if !from_liveramp {
        warn!(provider_name, "LiveRamp is not an origin, keeping the provider");
        return false;
    }

    match registry.remove_provider(provider_name) {
        Ok(removed) => {
            info!(provider_name, removed, "removed provider from automated LiveRamp updates");
            true
        }
        Err(error) => {
            warn!(provider_name, %error, "failed to remove provider from automated LiveRamp updates");
            false
        }
    }
}

fn notify<S: TaxonomyStore + ?Sized>(
    store: &S,
    data_source_id: DataSourceId,
    categories: &[CategoryId],
) {
    match store.deprecate(data_source_id, categories) {
        Ok(updated) => info!(
            store = store.name(),
            %data_source_id,
            categories = categories.len(),
            updated,
            "deprecated categories"
        ),
        Err(error) => warn!(
            store = store.name(),
            %data_source_id,
            %error,
            "failed to deprecate categories"
        ),
    }
}
