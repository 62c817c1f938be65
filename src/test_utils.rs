macro_rules! term {
    ($data_source:expr => [$($cat:expr),* $(,)?]) => {
        $crate::expression::Term::new(
            $crate::ids::DataSourceId($data_source),
            vec![$($crate::ids::CategoryId($cat)),*],
        )
    };
}

macro_rules! clause {
    ($($term:expr),* $(,)?) => {
        $crate::expression::Clause::new(vec![$($term),*])
    };
}

macro_rules! mapping {
    ($($origin:expr => $target:expr),* $(,)?) => {
        $crate::mapping::MappingTable::from_pairs([
            $(($crate::ids::CategoryId($origin), $crate::ids::CategoryId($target))),*
        ])
        .unwrap()
    };
}

pub(crate) use clause;
pub(crate) use mapping;
pub(crate) use term;

/// Sort every `cats` list so that expressions can be compared without caring about the order
/// produced by merges.
pub fn sorted_cats(clauses: &[crate::expression::Clause]) -> Vec<crate::expression::Clause> {
    clauses
        .iter()
        .cloned()
        .map(|mut clause| {
            clause
                .terms
                .iter_mut()
                .for_each(|term| term.cats.sort_unstable());
            clause
        })
        .collect()
}
