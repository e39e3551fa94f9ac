//! BigQuery table names.

use std::fmt;

/// A fully-qualified BigQuery table name, displayed as
/// `"project.dataset.table"`.
///
/// The parts are passed through to BigQuery unchecked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TableName {
    /// The name of the Google Cloud project.
    project: String,
    /// The BigQuery dataset.
    dataset: String,
    /// The table.
    table: String,
}

impl TableName {
    /// Build a table name from its parts.
    pub(crate) fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        TableName {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Return the name of the table's project.
    pub(crate) fn project(&self) -> &str {
        &self.project
    }

    /// Return the name of the table's dataset.
    pub(crate) fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Return the bare table name itself, without project or dataset.
    pub(crate) fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[test]
fn table_names_are_joined_with_dots() {
    let name = TableName::new("my-project", "my_dataset", "events");
    assert_eq!(name.to_string(), "my-project.my_dataset.events");
    assert_eq!(name.project(), "my-project");
    assert_eq!(name.dataset(), "my_dataset");
    assert_eq!(name.table(), "events");
}
