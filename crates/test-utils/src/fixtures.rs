// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Test fixtures and sample Flink SQL documents

/// Sample Flink SQL documents for testing
pub struct SqlFixtures;

impl SqlFixtures {
    // ===== Basic SELECT queries =====

    /// Simple SELECT with a qualified column
    pub const fn simple_alias() -> &'static str {
        "SELECT a.x FROM t AS a"
    }

    /// SELECT with WHERE, GROUP BY and ORDER BY
    pub const fn select_with_clauses() -> &'static str {
        "SELECT u.region, COUNT(*) AS cnt
FROM users AS u
WHERE u.active = TRUE
GROUP BY u.region
HAVING COUNT(*) > 1
ORDER BY cnt DESC
LIMIT 10"
    }

    // ===== JOIN queries =====

    /// JOIN with an ON condition over two aliases
    pub const fn inner_join() -> &'static str {
        "SELECT o.id, c.name
FROM orders AS o
JOIN customers AS c ON o.customer_id = c.id"
    }

    /// Aliased derived table over a derived table
    pub const fn nested_derived() -> &'static str {
        "SELECT s.total
FROM (SELECT o.amount AS total FROM orders AS o) AS s
WHERE s.total > 100"
    }

    /// CTE referenced from the main query
    pub const fn with_cte() -> &'static str {
        "WITH recent AS (
  SELECT id, amount FROM orders WHERE amount > 10
)
SELECT r.id FROM recent AS r"
    }

    // ===== Flink DDL =====

    /// Source table with computed column, watermark and primary key
    pub const fn create_table_with_watermark() -> &'static str {
        "CREATE TABLE orders (
  order_id BIGINT,
  price DECIMAL(10, 2),
  quantity INT,
  ts TIMESTAMP(3),
  total AS price * quantity,
  WATERMARK FOR ts AS ts - INTERVAL '5' SECOND,
  PRIMARY KEY (order_id) NOT ENFORCED
) WITH (
  'connector' = 'kafka',
  'topic' = 'orders'
)"
    }

    /// View over a query, with an explicit column list
    pub const fn create_view() -> &'static str {
        "CREATE VIEW big_orders (id, amount) AS
SELECT o.order_id, o.price FROM orders AS o WHERE o.price > 100"
    }

    // ===== Streaming queries =====

    /// Tumbling window aggregation through a window TVF
    pub const fn window_tvf() -> &'static str {
        "SELECT window_start, window_end, SUM(price) AS revenue
FROM TABLE(
  TUMBLE(TABLE bids, DESCRIPTOR(bidtime), INTERVAL '10' MINUTE))
GROUP BY window_start, window_end"
    }

    /// Temporal join against a versioned table
    pub const fn temporal_join() -> &'static str {
        "SELECT o.order_id, r.rate
FROM orders AS o
JOIN rates FOR SYSTEM_TIME AS OF o.proc_time AS r
ON o.currency = r.currency"
    }

    /// Full pipeline: source and sink tables plus an INSERT between them
    pub const fn insert_pipeline() -> &'static str {
        "CREATE TABLE clicks (
  user_id BIGINT,
  url STRING,
  ts TIMESTAMP(3),
  WATERMARK FOR ts AS ts - INTERVAL '1' SECOND
) WITH ('connector' = 'datagen');

CREATE TABLE click_counts (
  user_id BIGINT,
  cnt BIGINT
) WITH ('connector' = 'print');

INSERT INTO click_counts (user_id, cnt)
SELECT c.user_id, COUNT(*) FROM clicks AS c GROUP BY c.user_id;"
    }

    // ===== Problem documents =====

    /// Qualifier that names no range variable
    pub const fn unknown_qualifier() -> &'static str {
        "SELECT b.x FROM t AS a"
    }

    /// Alias keyword with nothing after it
    pub const fn dangling_as() -> &'static str {
        "SELECT a.x FROM t AS"
    }

    /// Two range variables with the same name in one FROM clause
    pub const fn duplicate_alias() -> &'static str {
        "SELECT a.x FROM t AS a, s AS a"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_parse_cleanly() {
        let documents = [
            SqlFixtures::simple_alias(),
            SqlFixtures::select_with_clauses(),
            SqlFixtures::inner_join(),
            SqlFixtures::nested_derived(),
            SqlFixtures::with_cte(),
            SqlFixtures::create_table_with_watermark(),
            SqlFixtures::create_view(),
            SqlFixtures::window_tvf(),
            SqlFixtures::temporal_join(),
            SqlFixtures::insert_pipeline(),
            SqlFixtures::unknown_qualifier(),
            SqlFixtures::dangling_as(),
            SqlFixtures::duplicate_alias(),
        ];

        for document in documents {
            let tree = flink_sql_grammar::parse(document);
            assert!(tree.errors.is_empty(), "{}: {:?}", document, tree.errors);
        }
    }

    #[test]
    fn test_pipeline_has_three_statements() {
        let tree = flink_sql_grammar::parse(SqlFixtures::insert_pipeline());
        assert_eq!(tree.script.statements.len(), 3);
    }
}
