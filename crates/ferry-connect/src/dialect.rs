//! Per-engine SQL spelling: identifier quoting and bind placeholders.

use ferry_core::EngineKind;

/// The bits of SQL syntax that differ between supported engines.
pub trait Dialect {
    /// Quote a single identifier, escaping embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String;

    /// Placeholder for the `index`-th bound parameter (1-based).
    fn placeholder(&self, index: usize) -> String;

    /// Quote a possibly schema-qualified table name (`schema.table`),
    /// quoting each segment on its own.
    fn quote_table(&self, name: &str) -> String {
        name.split('.')
            .map(|segment| self.quote_identifier(segment))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Dialect for EngineKind {
    fn quote_identifier(&self, name: &str) -> String {
        match self {
            EngineKind::MySql => format!("`{}`", name.replace('`', "``")),
            EngineKind::Postgres | EngineKind::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            EngineKind::Postgres => format!("${index}"),
            EngineKind::MySql | EngineKind::Sqlite => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_quotes_with_double_quotes() {
        assert_eq!(EngineKind::Postgres.quote_identifier("user"), "\"user\"");
        assert_eq!(EngineKind::Postgres.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn mysql_quotes_with_backticks() {
        assert_eq!(EngineKind::MySql.quote_identifier("order"), "`order`");
        assert_eq!(EngineKind::MySql.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn schema_qualified_tables_quote_each_segment() {
        assert_eq!(
            EngineKind::Postgres.quote_table("public.orders"),
            "\"public\".\"orders\""
        );
        assert_eq!(EngineKind::MySql.quote_table("shop.orders"), "`shop`.`orders`");
    }

    #[test]
    fn placeholders_follow_engine_style() {
        assert_eq!(EngineKind::Postgres.placeholder(3), "$3");
        assert_eq!(EngineKind::MySql.placeholder(3), "?");
        assert_eq!(EngineKind::Sqlite.placeholder(1), "?");
    }
}
