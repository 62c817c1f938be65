use crate::{
    error::{ExpressionError, RemapError, RewriteError},
    expression::{Clause, Expression, Term},
    ids::DataSourceId,
    mapping::{CategoryMapping, Mapping, MappingTable},
};
use itertools::Itertools;
use std::{collections::BTreeSet, path::Path};

/// Replace the mapped categories of `origin` in `clause` by their `target` equivalents.
///
/// Mapped categories are removed from every `origin` term (a term left without categories is
/// removed) and their targets are merged into the first `target` term of the clause, or into a new
/// `target` term appended at the end. A merged term is sorted and deduplicated. Unmapped categories
/// stay where they are.
///
/// Returns whether the clause was modified. A clause is never modified when `origin` is `target`.
///
/// # Examples
///
/// ```rust
/// use taxonomy_remap::{rewrite_clause, CategoryId, Clause, DataSourceId, MappingTable, Term};
///
/// let mapping = MappingTable::from_pairs([
///     (CategoryId(4), CategoryId(1004)),
///     (CategoryId(5), CategoryId(1005)),
/// ]).unwrap();
/// let mut clause = Clause::new(vec![
///     Term::new(DataSourceId(1), vec![CategoryId(4), CategoryId(5), CategoryId(6)]),
///     Term::new(DataSourceId(11), vec![CategoryId(1001)]),
/// ]);
///
/// assert!(rewrite_clause(&mut clause, DataSourceId(1), DataSourceId(11), &mapping));
/// assert_eq!(vec![CategoryId(6)], clause.terms[0].cats);
/// assert_eq!(
///     vec![CategoryId(1001), CategoryId(1004), CategoryId(1005)],
///     clause.terms[1].cats
/// );
/// ```
pub fn rewrite_clause<M>(
    clause: &mut Clause,
    origin: DataSourceId,
    target: DataSourceId,
    mapping: &M,
) -> bool
where
    M: CategoryMapping + ?Sized,
{
    if origin == target {
        return false;
    }

    let mut matched = BTreeSet::new();
    let mut changed = false;
    clause.terms.retain_mut(|term| {
        if term.data_source_id != origin {
            return true;
        }

        let before = term.cats.len();
        term.cats
            .retain(|category| match mapping.target_of(*category) {
                Some(replacement) => {
                    matched.insert(replacement);
                    false
                }
                None => true,
            });
        if term.cats.len() == before {
            return true;
        }

        changed = true;
        !term.cats.is_empty()
    });

    if matched.is_empty() {
        return changed;
    }

    match clause
        .terms
        .iter_mut()
        .find(|term| term.data_source_id == target)
    {
        Some(existing) => {
            existing.cats = existing
                .cats
                .iter()
                .copied()
                .chain(matched)
                .sorted()
                .dedup()
                .collect();
        }
        None => clause
            .terms
            .push(Term::new(target, matched.into_iter().collect())),
    }
    true
}

/// The result of rewriting a serialized expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Rewritten {
    /// The compact serialization of the rewritten expression.
    pub expression: String,
    pub changed: bool,
}

/// Rewrite a serialized expression for a single origin data source.
///
/// Expressions without an `interest` are left untouched. Clauses emptied by the rewrite are
/// removed from their section.
pub fn rewrite_expression<M>(
    expression: &str,
    origin: DataSourceId,
    target: DataSourceId,
    mapping: &M,
) -> Result<Rewritten, ExpressionError>
where
    M: CategoryMapping + ?Sized,
{
    let mut expression = Expression::parse(expression)?;
    let changed = rewrite_sections(&mut expression, |clause| {
        rewrite_clause(clause, origin, target, mapping)
    });
    Ok(Rewritten {
        expression: expression.to_compact_string()?,
        changed,
    })
}

fn rewrite_sections<F>(expression: &mut Expression, mut rewrite: F) -> bool
where
    F: FnMut(&mut Clause) -> bool,
{
    let Some(interest) = expression.interest_mut() else {
        return false;
    };

    let mut changed = false;
    for clauses in interest.sections_mut() {
        for clause in clauses.iter_mut() {
            changed |= rewrite(clause);
        }
        clauses.retain(|clause| !clause.is_empty());
    }
    changed
}

/// The categories of one origin data source and how they translate to the target.
#[derive(Clone, Debug, PartialEq)]
pub struct OriginRule {
    pub data_source_id: DataSourceId,
    pub mapping: Mapping,
}

/// A [`Rewriter`] builder.
#[derive(Debug)]
pub struct RewriterBuilder {
    target: DataSourceId,
    origins: Vec<OriginRule>,
}

impl RewriterBuilder {
    /// Add an origin data source whose categories move to the target.
    ///
    /// The origin must differ from the target and from every other origin.
    pub fn with_origin<M: Into<Mapping>>(
        &mut self,
        data_source_id: DataSourceId,
        mapping: M,
    ) -> Result<(), RewriteError> {
        if data_source_id == self.target {
            return Err(RewriteError::OriginIsTarget(data_source_id));
        }
        if self
            .origins
            .iter()
            .any(|rule| rule.data_source_id == data_source_id)
        {
            return Err(RewriteError::DuplicateOrigin(data_source_id));
        }

        self.origins.push(OriginRule {
            data_source_id,
            mapping: mapping.into(),
        });
        Ok(())
    }

    /// Add an origin data source whose mapping is read from a CSV file, returning the amount of
    /// mapped categories.
    pub fn with_mapping_file<P: AsRef<Path>>(
        &mut self,
        data_source_id: DataSourceId,
        path: P,
    ) -> Result<usize, RemapError> {
        let table = MappingTable::from_csv_path(path)?;
        let categories = table.len();
        self.with_origin(data_source_id, table)?;
        Ok(categories)
    }

    pub fn build(self) -> Result<Rewriter, RewriteError> {
        if self.origins.is_empty() {
            return Err(RewriteError::NoOrigin);
        }

        Ok(Rewriter {
            target: self.target,
            origins: self.origins,
        })
    }
}

/// The rewrite engine of a run: one target data source fed by one or more origins.
///
/// # Examples
///
/// ```rust
/// use taxonomy_remap::{CategoryId, DataSourceId, Mapping, MappingTable, Rewriter};
///
/// let mut builder = Rewriter::builder(DataSourceId(17));
/// let oracle = MappingTable::from_pairs([(CategoryId(1), CategoryId(1001))]).unwrap();
/// let liveramp = MappingTable::from_pairs([(CategoryId(100), CategoryId(1002))]).unwrap();
/// builder.with_origin(DataSourceId(1), oracle).unwrap();
/// builder.with_origin(DataSourceId(11), liveramp).unwrap();
/// let rewriter = builder.build().unwrap();
///
/// let rewritten = rewriter
///     .rewrite_text(r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[1]},{"data_source_id":11,"cats":[100]}]}],"exclude":[]}}"#)
///     .unwrap();
///
/// assert!(rewritten.changed);
/// assert_eq!(
///     r#"{"interest":{"include":[{"or":[{"data_source_id":17,"cats":[1001,1002]}]}],"exclude":[]}}"#,
///     rewritten.expression
/// );
/// ```
#[derive(Clone, Debug)]
pub struct Rewriter {
    target: DataSourceId,
    origins: Vec<OriginRule>,
}

impl Rewriter {
    pub fn builder(target: DataSourceId) -> RewriterBuilder {
        RewriterBuilder {
            target,
            origins: Vec::new(),
        }
    }

    /// A rewriter with a single origin.
    pub fn single<M: Into<Mapping>>(
        origin: DataSourceId,
        target: DataSourceId,
        mapping: M,
    ) -> Result<Self, RewriteError> {
        let mut builder = Self::builder(target);
        builder.with_origin(origin, mapping)?;
        builder.build()
    }

    #[inline]
    pub fn target(&self) -> DataSourceId {
        self.target
    }

    #[inline]
    pub fn origins(&self) -> &[OriginRule] {
        &self.origins
    }

    /// Apply every origin rule, in declaration order, to the clause.
    pub fn rewrite_clause(&self, clause: &mut Clause) -> bool {
        self.origins.iter().fold(false, |changed, rule| {
            rewrite_clause(clause, rule.data_source_id, self.target, &rule.mapping) || changed
        })
    }

    /// Rewrite the `include` then the `exclude` section of the expression in place.
    pub fn rewrite(&self, expression: &mut Expression) -> bool {
        rewrite_sections(expression, |clause| self.rewrite_clause(clause))
    }

    pub fn rewrite_text(&self, expression: &str) -> Result<Rewritten, ExpressionError> {
        let mut expression = Expression::parse(expression)?;
        let changed = self.rewrite(&mut expression);
        Ok(Rewritten {
            expression: expression.to_compact_string()?,
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::MappingError,
        ids::CategoryId,
        test_utils::{clause, mapping, sorted_cats, term},
    };
    use proptest::prelude::{proptest, *};

    const ORIGIN: DataSourceId = DataSourceId(1);
    const TARGET: DataSourceId = DataSourceId(11);
    const OTHER: DataSourceId = DataSourceId(17);

    fn a_mapping() -> MappingTable {
        mapping! { 4 => 1004, 5 => 1005 }
    }

    fn rewrite(mut clause: Clause) -> (Clause, bool) {
        let changed = rewrite_clause(&mut clause, ORIGIN, TARGET, &a_mapping());
        (clause, changed)
    }

    #[test]
    fn merge_the_mapped_categories_into_the_existing_target_term() {
        let (clause, changed) = rewrite(clause!(term!(1 => [4, 5, 6]), term!(11 => [1001])));

        assert!(changed);
        assert_eq!(
            clause!(term!(1 => [6]), term!(11 => [1001, 1004, 1005])),
            clause
        );
    }

    #[test]
    fn append_a_target_term_when_there_is_none() {
        let (clause, changed) = rewrite(clause!(term!(1 => [4, 5])));

        assert!(changed);
        assert_eq!(clause!(term!(11 => [1004, 1005])), clause);
    }

    #[test]
    fn leave_the_clause_untouched_when_nothing_is_mapped() {
        let (clause, changed) = rewrite(clause!(term!(1 => [9])));

        assert!(!changed);
        assert_eq!(clause!(term!(1 => [9])), clause);
    }

    #[test]
    fn leave_other_data_sources_untouched() {
        let (clause, changed) = rewrite(clause!(term!(17 => [5, 4]), term!(11 => [3, 1])));

        assert!(!changed);
        assert_eq!(clause!(term!(17 => [5, 4]), term!(11 => [3, 1])), clause);
    }

    #[test]
    fn keep_the_unmapped_categories_in_their_original_order() {
        let (clause, _) = rewrite(clause!(term!(1 => [9, 4, 3, 8])));

        assert_eq!(clause!(term!(1 => [9, 3, 8]), term!(11 => [1004])), clause);
    }

    #[test]
    fn deduplicate_the_merged_target_categories() {
        let (clause, _) = rewrite(clause!(term!(11 => [1005, 1004, 7]), term!(1 => [4, 5])));

        assert_eq!(clause!(term!(11 => [7, 1004, 1005])), clause);
    }

    #[test]
    fn map_duplicated_origin_categories_once() {
        let (clause, _) = rewrite(clause!(term!(1 => [4, 4, 5])));

        assert_eq!(clause!(term!(11 => [1004, 1005])), clause);
    }

    #[test]
    fn process_each_origin_term_of_a_clause_independently() {
        let (clause, changed) = rewrite(clause!(
            term!(1 => [4]),
            term!(17 => [2]),
            term!(1 => [5, 6])
        ));

        assert!(changed);
        assert_eq!(
            clause!(term!(17 => [2]), term!(1 => [6]), term!(11 => [1004, 1005])),
            clause
        );
    }

    #[test]
    fn merge_into_the_first_target_term_when_there_are_several() {
        let (clause, _) = rewrite(clause!(
            term!(11 => [1001]),
            term!(11 => [1002]),
            term!(1 => [4])
        ));

        assert_eq!(
            clause!(term!(11 => [1001, 1004]), term!(11 => [1002])),
            clause
        );
    }

    #[test]
    fn leave_an_origin_term_that_was_already_empty() {
        let (clause, changed) = rewrite(clause!(term!(1 => [])));

        assert!(!changed);
        assert_eq!(clause!(term!(1 => [])), clause);
    }

    #[test]
    fn leave_the_clause_untouched_with_an_empty_mapping() {
        let mut clause = clause!(term!(1 => [4]));

        let changed = rewrite_clause(&mut clause, ORIGIN, TARGET, &MappingTable::default());

        assert!(!changed);
        assert_eq!(clause!(term!(1 => [4])), clause);
    }

    #[test]
    fn leave_the_clause_untouched_when_the_origin_is_the_target() {
        let mut clause = clause!(term!(1 => [4, 5]), term!(17 => [2]));

        let changed = rewrite_clause(&mut clause, ORIGIN, ORIGIN, &mapping! { 4 => 4, 5 => 1005 });

        assert!(!changed);
        assert_eq!(clause!(term!(1 => [4, 5]), term!(17 => [2])), clause);
    }

    #[test]
    fn do_not_report_a_change_on_every_pass_when_the_origin_is_the_target() {
        let expression = r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[4]}]}],"exclude":[]}}"#;

        let rewritten = rewrite_expression(expression, ORIGIN, ORIGIN, &mapping! { 4 => 4 }).unwrap();

        assert!(!rewritten.changed);
        assert_eq!(expression, rewritten.expression);
    }

    #[test]
    fn relabel_every_category_of_the_origin() {
        let mut clause = clause!(term!(1 => [3, 2]), term!(11 => [2, 9]));

        let changed = rewrite_clause(&mut clause, ORIGIN, TARGET, &Mapping::Relabel);

        assert!(changed);
        assert_eq!(clause!(term!(11 => [2, 3, 9])), clause);
    }

    #[test]
    fn rewrite_an_expression_and_prune_the_emptied_clauses() {
        let expression = r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[4,5]}]},{"or":[{"data_source_id":17,"cats":[3]}]}],"exclude":[{"or":[{"data_source_id":1,"cats":[6]}]}]},"age":[18],"geo":{"include":[491]}}"#;

        let rewritten = rewrite_expression(expression, ORIGIN, TARGET, &a_mapping()).unwrap();

        assert!(rewritten.changed);
        assert_eq!(
            r#"{"interest":{"include":[{"or":[{"data_source_id":11,"cats":[1004,1005]}]},{"or":[{"data_source_id":17,"cats":[3]}]}],"exclude":[{"or":[{"data_source_id":1,"cats":[6]}]}]},"age":[18],"geo":{"include":[491]}}"#,
            rewritten.expression
        );
    }

    #[test]
    fn rewrite_the_exclude_section_even_when_the_include_section_changed() {
        let expression = r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[4]}]}],"exclude":[{"or":[{"data_source_id":1,"cats":[5]}]}]}}"#;

        let rewritten = rewrite_expression(expression, ORIGIN, TARGET, &a_mapping()).unwrap();

        assert_eq!(
            r#"{"interest":{"include":[{"or":[{"data_source_id":11,"cats":[1004]}]}],"exclude":[{"or":[{"data_source_id":11,"cats":[1005]}]}]}}"#,
            rewritten.expression
        );
    }

    #[test]
    fn refuse_to_rewrite_an_expression_with_an_unknown_clause_shape() {
        let expression = r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[4]}]},{"any":[{"data_source_id":17,"cats":[3]}],"weight":2}],"exclude":[]}}"#;

        let result = rewrite_expression(expression, ORIGIN, TARGET, &a_mapping());

        assert!(matches!(result, Err(ExpressionError::Malformed(_))));
    }

    #[test]
    fn do_not_change_an_expression_without_interest() {
        let expression = r#"{"age":[],"gender":[],"geo":{"include":[1]}}"#;

        let rewritten = rewrite_expression(expression, ORIGIN, TARGET, &a_mapping()).unwrap();

        assert!(!rewritten.changed);
        assert_eq!(expression, rewritten.expression);
    }

    #[test]
    fn do_not_change_an_expression_that_only_mentions_the_origin_in_other_fields() {
        let expression = r#"{"interest":{"include":[{"or":[{"data_source_id":17,"cats":[4]}]}],"exclude":[]},"note":"\"data_source_id\":1"}"#;

        let rewritten = rewrite_expression(expression, ORIGIN, TARGET, &a_mapping()).unwrap();

        assert!(!rewritten.changed);
    }

    #[test]
    fn return_an_error_on_a_malformed_expression() {
        let result = rewrite_expression(r#"{"interest":{"include":"#, ORIGIN, TARGET, &a_mapping());

        assert!(matches!(result, Err(ExpressionError::Malformed(_))));
    }

    #[test]
    fn can_build_a_rewriter_with_several_origins() {
        let mut builder = Rewriter::builder(OTHER);
        assert!(builder.with_origin(ORIGIN, a_mapping()).is_ok());
        assert!(builder.with_origin(TARGET, Mapping::Relabel).is_ok());

        let rewriter = builder.build().unwrap();

        assert_eq!(OTHER, rewriter.target());
        assert_eq!(2, rewriter.origins().len());
    }

    #[test]
    fn return_an_error_when_building_a_rewriter_without_origins() {
        let result = Rewriter::builder(TARGET).build();

        assert!(matches!(result, Err(RewriteError::NoOrigin)));
    }

    #[test]
    fn return_an_error_when_the_origin_is_the_target() {
        let result = Rewriter::single(TARGET, TARGET, a_mapping());

        assert!(matches!(result, Err(RewriteError::OriginIsTarget(TARGET))));
    }

    #[test]
    fn return_an_error_on_duplicate_origins() {
        let mut builder = Rewriter::builder(TARGET);
        builder.with_origin(ORIGIN, a_mapping()).unwrap();

        let result = builder.with_origin(ORIGIN, Mapping::Relabel);

        assert_eq!(Err(RewriteError::DuplicateOrigin(ORIGIN)), result);
    }

    fn a_mapping_file(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "taxonomy-remap-{}-{name}.csv",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn can_add_an_origin_from_a_mapping_file() {
        let path = a_mapping_file(
            "oracle",
            "origin_data_source_category_id,target_data_source_category_id\n4,1004\n5,1005\n",
        );
        let mut builder = Rewriter::builder(TARGET);

        let categories = builder.with_mapping_file(ORIGIN, &path).unwrap();
        let rewriter = builder.build().unwrap();

        assert_eq!(2, categories);
        assert_eq!(Mapping::Table(a_mapping()), rewriter.origins()[0].mapping);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn return_a_mapping_error_when_the_mapping_file_is_missing() {
        let mut builder = Rewriter::builder(TARGET);

        let result = builder.with_mapping_file(ORIGIN, "/nonexistent/dir/mapping.csv");

        assert!(matches!(result, Err(RemapError::Mapping(MappingError::Io(_)))));
        assert!(matches!(builder.build(), Err(RewriteError::NoOrigin)));
    }

    #[test]
    fn return_a_rewrite_error_when_the_mapping_file_targets_the_target() {
        let path = a_mapping_file(
            "target",
            "origin_data_source_category_id,target_data_source_category_id\n4,1004\n",
        );
        let mut builder = Rewriter::builder(TARGET);

        let result = builder.with_mapping_file(TARGET, &path);

        assert!(matches!(
            result,
            Err(RemapError::Rewrite(RewriteError::OriginIsTarget(TARGET)))
        ));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn apply_every_origin_rule_to_a_clause() {
        let mut builder = Rewriter::builder(OTHER);
        builder.with_origin(ORIGIN, mapping! { 1 => 1001 }).unwrap();
        builder.with_origin(TARGET, mapping! { 100 => 1002, 101 => 1001 }).unwrap();
        let rewriter = builder.build().unwrap();
        let mut clause = clause!(
            term!(1 => [1, 2]),
            term!(11 => [100, 101, 103]),
            term!(17 => [1006])
        );

        assert!(rewriter.rewrite_clause(&mut clause));
        assert_eq!(
            clause!(
                term!(1 => [2]),
                term!(11 => [103]),
                term!(17 => [1001, 1002, 1006])
            ),
            clause
        );
    }

    #[test]
    fn match_the_reference_multi_origin_expression() {
        let mut builder = Rewriter::builder(OTHER);
        builder
            .with_origin(ORIGIN, mapping! { 1 => 1001, 2 => 1002, 3 => 1003 })
            .unwrap();
        builder
            .with_origin(TARGET, mapping! { 100 => 1001, 101 => 1002, 102 => 1003 })
            .unwrap();
        let rewriter = builder.build().unwrap();
        let mut expression = Expression::parse(
            r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[1,2,3,4,5]},{"data_source_id":11,"cats":[101,102,103,104]},{"data_source_id":17,"cats":[1006,1007]}]},{"or":[{"data_source_id":1,"cats":[1,2]},{"data_source_id":11,"cats":[101,102]}]}],"exclude":[{"or":[{"data_source_id":1,"cats":[1]}]},{"or":[{"data_source_id":11,"cats":[106]}]}]},"age":[],"gender":[]}"#,
        )
        .unwrap();

        assert!(rewriter.rewrite(&mut expression));

        let interest = expression.interest().unwrap();
        assert_eq!(
            vec![
                clause!(
                    term!(1 => [4, 5]),
                    term!(11 => [103, 104]),
                    term!(17 => [1001, 1002, 1003, 1006, 1007])
                ),
                clause!(term!(17 => [1001, 1002, 1003])),
            ],
            sorted_cats(interest.include())
        );
        assert_eq!(
            vec![clause!(term!(17 => [1001])), clause!(term!(11 => [106]))],
            sorted_cats(interest.exclude())
        );
    }

    #[test]
    fn rewriting_twice_is_a_no_op_the_second_time() {
        let rewriter = Rewriter::single(ORIGIN, TARGET, a_mapping()).unwrap();
        let expression = r#"{"interest":{"include":[{"or":[{"data_source_id":1,"cats":[4,9]},{"data_source_id":11,"cats":[1]}]}],"exclude":[{"or":[{"data_source_id":1,"cats":[5]}]}]}}"#;

        let first = rewriter.rewrite_text(expression).unwrap();
        let second = rewriter.rewrite_text(&first.expression).unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.expression, second.expression);
    }

    proptest! {
        #[test]
        #[cfg_attr(miri, ignore)]
        fn rewriting_is_idempotent(clauses in clauses()) {
            let rewriter = Rewriter::single(ORIGIN, TARGET, a_wide_mapping()).unwrap();
            let mut once = an_expression(clauses);
            rewriter.rewrite(&mut once);
            let mut twice = once.clone();

            prop_assert!(!rewriter.rewrite(&mut twice));
            prop_assert_eq!(once, twice);
        }

        #[test]
        #[cfg_attr(miri, ignore)]
        fn unmapped_origin_categories_are_kept_verbatim(clause in a_clause()) {
            let mapping = a_wide_mapping();
            let expected = origin_categories(&clause)
                .into_iter()
                .filter(|category| mapping.get(*category).is_none())
                .collect_vec();
            let mut rewritten = clause;

            rewrite_clause(&mut rewritten, ORIGIN, TARGET, &mapping);

            prop_assert_eq!(expected, origin_categories(&rewritten));
        }

        #[test]
        #[cfg_attr(miri, ignore)]
        fn target_categories_are_the_union_of_existing_and_mapped_ones(clause in a_clause()) {
            let mapping = a_wide_mapping();
            let mapped = origin_categories(&clause)
                .into_iter()
                .filter_map(|category| mapping.get(category))
                .collect_vec();
            let existing = categories_of(&clause, TARGET);
            let mut rewritten = clause;

            rewrite_clause(&mut rewritten, ORIGIN, TARGET, &mapping);

            if mapped.is_empty() {
                prop_assert_eq!(existing, categories_of(&rewritten, TARGET));
            } else {
                let expected = existing.into_iter().chain(mapped).sorted().dedup().collect_vec();
                prop_assert_eq!(expected, categories_of(&rewritten, TARGET));
                let targets = rewritten.terms.iter().filter(|term| term.data_source_id == TARGET).count();
                prop_assert_eq!(1, targets);
            }
        }

        #[test]
        #[cfg_attr(miri, ignore)]
        fn no_empty_term_or_clause_is_left(clauses in clauses()) {
            let rewriter = Rewriter::single(ORIGIN, TARGET, a_wide_mapping()).unwrap();
            let mut expression = an_expression(clauses);

            rewriter.rewrite(&mut expression);

            let interest = expression.interest().unwrap();
            for clause in interest.include().iter().chain(interest.exclude()) {
                prop_assert!(!clause.is_empty());
                prop_assert!(clause.terms.iter().all(|term| !term.cats.is_empty()));
            }
        }

        #[test]
        #[cfg_attr(miri, ignore)]
        fn other_data_sources_are_not_modified(clause in a_clause()) {
            let expected = clause.terms.iter().filter(|term| term.data_source_id == OTHER).cloned().collect_vec();
            let mut rewritten = clause;

            rewrite_clause(&mut rewritten, ORIGIN, TARGET, &a_wide_mapping());

            let actual = rewritten.terms.into_iter().filter(|term| term.data_source_id == OTHER).collect_vec();
            prop_assert_eq!(expected, actual);
        }
    }

    fn a_wide_mapping() -> MappingTable {
        MappingTable::from_pairs((0..10).map(|i| (CategoryId(i), CategoryId(1000 + i)))).unwrap()
    }

    fn an_expression(clauses: (Vec<Clause>, Vec<Clause>)) -> Expression {
        let (include, exclude) = clauses;
        let text = serde_json::json!({
            "interest": {
                "include": include,
                "exclude": exclude,
            },
            "age": [],
        })
        .to_string();
        Expression::parse(&text).unwrap()
    }

    fn origin_categories(clause: &Clause) -> Vec<CategoryId> {
        clause
            .terms
            .iter()
            .filter(|term| term.data_source_id == ORIGIN)
            .flat_map(|term| term.cats.iter().copied())
            .collect()
    }

    fn categories_of(clause: &Clause, data_source_id: DataSourceId) -> Vec<CategoryId> {
        clause
            .terms
            .iter()
            .find(|term| term.data_source_id == data_source_id)
            .map(|term| term.cats.clone())
            .unwrap_or_default()
    }

    fn a_clause() -> impl Strategy<Value = Clause> {
        prop::sample::subsequence(vec![ORIGIN.0, TARGET.0, OTHER.0], 1..=3)
            .prop_shuffle()
            .prop_flat_map(|data_sources| {
                let length = data_sources.len();
                (
                    Just(data_sources),
                    prop::collection::vec(prop::collection::vec(0i64..20, 1..6), length),
                )
            })
            .prop_map(|(data_sources, cats)| {
                let terms = data_sources
                    .into_iter()
                    .zip(cats)
                    .map(|(data_source, cats)| {
                        Term::new(
                            DataSourceId(data_source),
                            cats.into_iter().map(CategoryId).collect(),
                        )
                    })
                    .collect();
                Clause::new(terms)
            })
    }

    fn clauses() -> impl Strategy<Value = (Vec<Clause>, Vec<Clause>)> {
        (
            prop::collection::vec(a_clause(), 0..5),
            prop::collection::vec(a_clause(), 0..5),
        )
    }
}
