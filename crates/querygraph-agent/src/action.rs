use std::fmt;

use crate::graph::Label;

/// Actions the reasoner may choose that have a route in the agent graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// In-process SQL generation (`create_query_SQL`).
    CreateQuerySql,
    /// Run SQL on the tool server (`execute_sql`).
    ExecuteSql,
    /// List tables via the tool server (`list_tables`).
    ListTables,
    /// Anything else, including the empty string.
    Unknown(String),
}

impl Action {
    pub const CREATE_QUERY_SQL: &'static str = "create_query_SQL";
    pub const EXECUTE_SQL: &'static str = "execute_sql";
    pub const LIST_TABLES: &'static str = "list_tables";

    pub fn parse(name: &str) -> Self {
        match name.trim() {
            Self::CREATE_QUERY_SQL => Self::CreateQuerySql,
            Self::EXECUTE_SQL => Self::ExecuteSql,
            Self::LIST_TABLES => Self::ListTables,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateQuerySql => Self::CREATE_QUERY_SQL,
            Self::ExecuteSql => Self::EXECUTE_SQL,
            Self::ListTables => Self::LIST_TABLES,
            Self::Unknown(name) => name,
        }
    }

    /// Actions with a registered edge out of the decide node.
    pub fn routable() -> [Action; 3] {
        [Self::CreateQuerySql, Self::ExecuteSql, Self::ListTables]
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    pub fn label(&self) -> Label {
        Label::new(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known() {
        assert_eq!(Action::parse("create_query_SQL"), Action::CreateQuerySql);
        assert_eq!(Action::parse(" execute_sql\n"), Action::ExecuteSql);
        assert_eq!(Action::parse("list_tables"), Action::ListTables);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(
            Action::parse("create_query_sql"),
            Action::Unknown("create_query_sql".into())
        );
    }

    #[test]
    fn test_unknown_keeps_name() {
        let action = Action::parse("drop_table");
        assert!(!action.is_known());
        assert_eq!(action.as_str(), "drop_table");
        assert_eq!(action.label(), Label::from("drop_table"));
    }

    #[test]
    fn test_routable_are_known() {
        assert!(Action::routable().iter().all(Action::is_known));
        assert_eq!(Action::CreateQuerySql.to_string(), "create_query_SQL");
    }
}
