//! Moves audience targeting expressions from one data source taxonomy to another.
//!
//! Audience expressions target users through the categories of third-party data sources. When a
//! data source is retired, its categories are mapped to equivalent categories of another data
//! source and every stored expression is rewritten to reference the new ones.
//!
//! # Examples
//!
//! Rewriting a single expression:
//!
//! ```
//! use taxonomy_remap::{CategoryId, DataSourceId, MappingTable, Rewriter};
//!
//! // Data source 1 is retired in favour of data source 17
//! let mapping = MappingTable::from_pairs([
//!     (CategoryId(4), CategoryId(1004)),
//!     (CategoryId(5), CategoryId(1005)),
//! ]).unwrap();
//! let rewriter = Rewriter::single(DataSourceId(1), DataSourceId(17), mapping).unwrap();
//!
//! let expression = r#"{"age":[18,34],"interest":{"include":[{"or":[{"data_source_id":1,"cats":[5,4,6]},{"data_source_id":17,"cats":[1004]}]}],"exclude":[]}}"#;
//! let rewritten = rewriter.rewrite_text(expression).unwrap();
//!
//! assert!(rewritten.changed);
//! assert_eq!(
//!     r#"{"age":[18,34],"interest":{"include":[{"or":[{"data_source_id":1,"cats":[6]},{"data_source_id":17,"cats":[1004,1005]}]}],"exclude":[]}}"#,
//!     rewritten.expression
//! );
//! ```
//!
//! Rewriting every stored expression is done by a [`BatchDriver`], which fetches the candidates
//! from a [`CandidateStore`] and pushes the changed ones to a [`TargetingService`]. The
//! [`DeprecationNotifier`] then flags the remapped categories as deprecated.
//!
//! # Rewrite rules
//!
//! Within every `or` clause of the `include` and `exclude` sections of the interest:
//!
//! * mapped categories are removed from the terms of the origin data source and a term left
//!   without categories is removed;
//! * their targets are merged into the first term of the target data source, which is then sorted
//!   and deduplicated, or into a new term appended to the clause;
//! * unmapped categories are kept as they are;
//! * a clause left without terms is removed from its section.
//!
//! Every other field of the expression is kept untouched, in its original position. Rewriting an
//! already rewritten expression is a no-op.
mod config;
mod deprecation;
mod driver;
mod error;
mod expression;
mod ids;
mod mapping;
mod rewrite;
mod service;
mod sqlite;
mod store;
#[cfg(test)]
mod test_utils;

pub use crate::{
    config::{
        default_tables, AudienceServiceSettings, Config, DatabaseSettings, RunSettings,
        WarehouseSettings,
    },
    deprecation::{remove_liveramp_provider, DeprecationNotifier, LIVERAMP_DATA_SOURCE_ID},
    driver::{BatchDriver, FailedPush, RunOptions, RunReport},
    error::{
        ConfigError, ExpressionError, MappingError, PushError, RemapError, RewriteError,
        StoreError,
    },
    expression::{Clause, Expression, Interest, Term},
    ids::{CategoryId, DataSourceId, EntityId, OwnerId},
    mapping::{CategoryMapping, Mapping, MappingTable},
    rewrite::{rewrite_clause, rewrite_expression, OriginRule, Rewriter, RewriterBuilder, Rewritten},
    service::{AudienceServiceClient, RetryPolicy},
    sqlite::{open_warehouse, AudienceDb, WarehouseDb},
    store::{
        Candidate, CandidateScope, CandidateStore, ExpressionUpdate, ProviderRegistry,
        TargetingService, TaxonomyStore, UnavailableStore, UpdateBody, EXPRESSION_TYPE_ID,
    },
};
