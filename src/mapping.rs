use crate::{error::MappingError, ids::CategoryId};
use itertools::Itertools;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

/// A lookup from an origin category to the category replacing it.
pub trait CategoryMapping {
    fn target_of(&self, category: CategoryId) -> Option<CategoryId>;
}

/// The immutable origin category → target category table driving a rewrite.
///
/// # Examples
///
/// ```rust
/// use taxonomy_remap::{CategoryId, CategoryMapping, MappingTable};
///
/// let csv = "origin_data_source_category_id,target_data_source_category_id\n4,1004\n5,1005\n";
/// let mapping = MappingTable::from_csv(csv.as_bytes()).unwrap();
///
/// assert_eq!(Some(CategoryId(1004)), mapping.target_of(CategoryId(4)));
/// assert_eq!(None, mapping.target_of(CategoryId(9)));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappingTable {
    by_origin: HashMap<CategoryId, CategoryId>,
}

impl MappingTable {
    pub const ORIGIN_COLUMN: &'static str = "origin_data_source_category_id";
    pub const TARGET_COLUMN: &'static str = "target_data_source_category_id";

    /// Build the table from `(origin, target)` pairs, e.g. the rows of a query.
    ///
    /// Repeating an origin with the same target is tolerated; mapping one origin to two different
    /// targets is an error.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (CategoryId, CategoryId)>,
    {
        let mut table = Self::default();
        for (i, (origin, target)) in pairs.into_iter().enumerate() {
            table.insert(i + 1, origin, target)?;
        }
        Ok(table)
    }

    /// Read a delimited file with an `origin_data_source_category_id` and a
    /// `target_data_source_category_id` column, in any order.
    pub fn from_csv<R: BufRead>(reader: R) -> Result<Self, MappingError> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(header) => header?,
            None => return Err(MappingError::MissingColumn(Self::ORIGIN_COLUMN)),
        };
        let columns = split_record(header.trim_start_matches('\u{feff}'));
        let origin_index = column_index(&columns, Self::ORIGIN_COLUMN)?;
        let target_index = column_index(&columns, Self::TARGET_COLUMN)?;

        let mut table = Self::default();
        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // The header is line 1.
            let number = i + 2;
            let record = split_record(&line);
            let origin = parse_category(&record, origin_index, number)?;
            let target = parse_category(&record, target_index, number)?;
            table.insert(number, origin, target)?;
        }
        Ok(table)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let file = File::open(path)?;
        Self::from_csv(BufReader::new(file))
    }

    fn insert(
        &mut self,
        line: usize,
        origin: CategoryId,
        target: CategoryId,
    ) -> Result<(), MappingError> {
        match self.by_origin.insert(origin, target) {
            Some(previous) if previous != target => {
                Err(MappingError::DuplicateOrigin { line, origin })
            }
            _ => Ok(()),
        }
    }

    #[inline]
    pub fn get(&self, origin: CategoryId) -> Option<CategoryId> {
        self.by_origin.get(&origin).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_origin.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_origin.is_empty()
    }

    /// The mapped origin categories, sorted.
    pub fn origins(&self) -> Vec<CategoryId> {
        self.by_origin.keys().copied().sorted().collect()
    }
}

impl CategoryMapping for MappingTable {
    #[inline]
    fn target_of(&self, category: CategoryId) -> Option<CategoryId> {
        self.get(category)
    }
}

fn split_record(line: &str) -> Vec<&str> {
    line.trim_end_matches(['\r', '\n'])
        .split(',')
        .map(|field| field.trim().trim_matches('"').trim())
        .collect()
}

fn column_index(columns: &[&str], name: &'static str) -> Result<usize, MappingError> {
    columns
        .iter()
        .position(|column| *column == name)
        .ok_or(MappingError::MissingColumn(name))
}

fn parse_category(record: &[&str], index: usize, line: usize) -> Result<CategoryId, MappingError> {
    let value = record.get(index).copied().unwrap_or_default();
    value
        .parse::<i64>()
        .map(CategoryId)
        .map_err(|_| MappingError::InvalidInteger {
            line,
            value: value.to_owned(),
        })
}

/// How the categories of one origin data source translate to the target data source.
#[derive(Clone, Debug, PartialEq)]
pub enum Mapping {
    Table(MappingTable),
    /// Moves every category of the origin, unchanged, to the target.
    Relabel,
}

impl CategoryMapping for Mapping {
    #[inline]
    fn target_of(&self, category: CategoryId) -> Option<CategoryId> {
        match self {
            Self::Table(table) => table.target_of(category),
            Self::Relabel => Some(category),
        }
    }
}

impl From<MappingTable> for Mapping {
    fn from(table: MappingTable) -> Self {
        Self::Table(table)
    }
}
