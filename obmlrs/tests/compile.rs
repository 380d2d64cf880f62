//! End-to-end compilation tests against the Customers/Orders/Returns model,
//! mirroring the worked scenarios: a plain star query, a metric, a
//! composite-fact (multi-source) query, a grand-total measure, fanout
//! rejection, and secondary join path selection.

use obml::{compile, Query, SemanticModel};

const MODEL_YAML: &str = r#"
dataObjects:
  Customers:
    code: CUSTOMERS
    columns:
      - {name: CUST_ID, type: integer}
      - {name: COUNTRY, type: string}
  Orders:
    code: ORDERS
    columns:
      - {name: ORDER_ID, type: integer}
      - {name: ORDER_CUSTOMER_ID, type: integer}
      - {name: AMOUNT, type: decimal}
    joins:
      - joinType: left
        joinTo: Customers
        cardinality: many-to-one
        columnsFrom: [ORDER_CUSTOMER_ID]
        columnsTo: [CUST_ID]
  Returns:
    code: RETURNS
    columns:
      - {name: RETURN_ID, type: integer}
      - {name: RETURN_CUSTOMER_ID, type: integer}
      - {name: REFUND, type: decimal}
    joins:
      - joinType: left
        joinTo: Customers
        cardinality: many-to-one
        columnsFrom: [RETURN_CUSTOMER_ID]
        columnsTo: [CUST_ID]
dimensions:
  Customer Country:
    dataObject: Customers
    column: COUNTRY
  Order ID:
    dataObject: Orders
    column: ORDER_ID
measures:
  Revenue:
    aggregation: sum
    columns:
      - {view: Orders, column: AMOUNT}
  Refunds:
    aggregation: sum
    columns:
      - {view: Returns, column: REFUND}
  Order Count:
    aggregation: count
    columns:
      - {view: Orders, column: ORDER_ID}
  Grand Revenue:
    aggregation: sum
    columns:
      - {view: Orders, column: AMOUNT}
    total: true
metrics:
  Revenue per Order:
    formula: "{[Revenue]} / {[Order Count]}"
"#;

fn model() -> SemanticModel {
    serde_yaml::from_str(MODEL_YAML).expect("worked model parses")
}

fn query(json: &str) -> Query {
    serde_json::from_str(json).expect("query parses")
}

#[test]
fn simple_star_query_joins_and_groups_by_the_dimension() {
    let result = compile(
        &model(),
        &query(r#"{"select": {"dimensions": ["Customer Country"], "measures": ["Revenue"]}}"#),
        "postgres",
    )
    .unwrap();

    assert!(result.sql.contains("FROM ORDERS AS \"Orders\""));
    assert!(result.sql.contains("LEFT JOIN CUSTOMERS AS \"Customers\""));
    assert!(result.sql.contains("GROUP BY \"Customers\".\"COUNTRY\""));
    assert!(result.sql.contains("SUM(\"Orders\".\"AMOUNT\") AS \"Revenue\""));
}

#[test]
fn metric_compiles_both_components_with_a_single_alias() {
    let result = compile(
        &model(),
        &query(r#"{"select": {"dimensions": ["Customer Country"], "measures": ["Revenue per Order"]}}"#),
        "postgres",
    )
    .unwrap();

    assert!(result.sql.contains("SUM("));
    assert!(result.sql.contains("COUNT("));
    assert_eq!(result.sql.matches("\"Revenue per Order\"").count(), 1);
}

#[test]
fn measures_spanning_two_facts_trigger_the_composite_fact_planner() {
    let result = compile(
        &model(),
        &query(r#"{"select": {"dimensions": ["Customer Country"], "measures": ["Revenue", "Refunds"]}}"#),
        "postgres",
    )
    .unwrap();

    assert!(result.sql.contains("composite_01 AS ("));
    assert!(result.sql.contains("UNION ALL"));
    assert!(result.sql.contains("FROM ORDERS AS \"Orders\""));
    assert!(result.sql.contains("FROM RETURNS AS \"Returns\""));
    assert!(result.sql.contains("GROUP BY \"Customer Country\""));
    assert!(result.sql.contains("SUM(\"Revenue\") AS \"Revenue\""));
    assert!(result.sql.contains("SUM(\"Refunds\") AS \"Refunds\""));
}

#[test]
fn composite_fact_query_on_snowflake_unions_by_name() {
    let result = compile(
        &model(),
        &query(r#"{"select": {"dimensions": ["Customer Country"], "measures": ["Revenue", "Refunds"]}}"#),
        "snowflake",
    )
    .unwrap();
    assert!(result.sql.contains("UNION ALL BY NAME"));
}

#[test]
fn a_total_measure_wraps_the_plan_in_a_base_cte_with_a_window_function() {
    let result = compile(
        &model(),
        &query(r#"{"select": {"dimensions": ["Customer Country"], "measures": ["Revenue", "Grand Revenue"]}}"#),
        "postgres",
    )
    .unwrap();

    assert!(result.sql.contains("\"base\" AS ("));
    assert!(result.sql.contains("OVER ()"));
    assert!(result.sql.contains("SUM(\"Grand Revenue\") OVER ()"));
}

#[test]
fn a_non_cfl_non_total_query_groups_by_exactly_the_selected_dimensions() {
    let result = compile(
        &model(),
        &query(r#"{"select": {"dimensions": ["Customer Country", "Order ID"], "measures": ["Revenue"]}}"#),
        "postgres",
    )
    .unwrap();
    assert_eq!(result.sql.matches("GROUP BY").count(), 1);
    let group_by_line = result
        .sql
        .lines()
        .find(|l| l.starts_with("GROUP BY"))
        .unwrap();
    assert_eq!(group_by_line.matches(',').count(), 1);
}

#[test]
fn fanout_unsafe_measure_is_rejected() {
    let yaml = r#"
dataObjects:
  Customers:
    code: CUSTOMERS
    columns:
      - {name: CUST_ID, type: integer}
      - {name: REVENUE, type: decimal}
  Orders:
    code: ORDERS
    columns:
      - {name: ORDER_ID, type: integer}
      - {name: ORDER_CUSTOMER_ID, type: integer}
    joins:
      - joinType: left
        joinTo: Customers
        cardinality: many-to-one
        columnsFrom: [ORDER_CUSTOMER_ID]
        columnsTo: [CUST_ID]
dimensions:
  Order ID:
    dataObject: Orders
    column: ORDER_ID
measures:
  Cust Revenue:
    aggregation: sum
    columns:
      - {view: Customers, column: REVENUE}
"#;
    let model: SemanticModel = serde_yaml::from_str(yaml).unwrap();
    let err = compile(
        &model,
        &query(r#"{"select": {"dimensions": ["Order ID"], "measures": ["Cust Revenue"]}}"#),
        "postgres",
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.to_lowercase().contains("fanout") || message.to_lowercase().contains("one-to-many"));
}

#[test]
fn use_path_names_selects_the_named_secondary_join() {
    let yaml = r#"
dataObjects:
  Airports:
    code: AIRPORTS
    columns:
      - {name: AIRPORT_ID, type: integer}
      - {name: AIRPORT_NAME, type: string}
  Flights:
    code: FLIGHTS
    columns:
      - {name: FLIGHT_ID, type: integer}
      - {name: DEP_AIRPORT, type: integer}
      - {name: ARR_AIRPORT, type: integer}
      - {name: TICKET_PRICE, type: decimal}
    joins:
      - joinType: left
        joinTo: Airports
        cardinality: many-to-one
        columnsFrom: [DEP_AIRPORT]
        columnsTo: [AIRPORT_ID]
      - joinType: left
        joinTo: Airports
        cardinality: many-to-one
        columnsFrom: [ARR_AIRPORT]
        columnsTo: [AIRPORT_ID]
        secondary: true
        pathName: arrival
dimensions:
  Airport Name:
    dataObject: Airports
    column: AIRPORT_NAME
measures:
  Ticket Price:
    aggregation: sum
    columns:
      - {view: Flights, column: TICKET_PRICE}
"#;
    let model: SemanticModel = serde_yaml::from_str(yaml).unwrap();
    let result = compile(
        &model,
        &query(
            r#"{
                "select": {"dimensions": ["Airport Name"], "measures": ["Ticket Price"]},
                "usePathNames": [{"source": "Flights", "target": "Airports", "pathName": "arrival"}]
            }"#,
        ),
        "postgres",
    )
    .unwrap();

    assert!(result.sql.contains("\"ARR_AIRPORT\""));
    assert!(!result.sql.contains("\"DEP_AIRPORT\""));
}

#[test]
fn numeric_order_by_renders_as_a_literal_position() {
    let result = compile(
        &model(),
        &query(
            r#"{
                "select": {"dimensions": ["Customer Country"], "measures": ["Revenue"]},
                "orderBy": [{"field": "2", "direction": "desc"}]
            }"#,
        ),
        "postgres",
    )
    .unwrap();

    let order_by_line = result
        .sql
        .lines()
        .find(|l| l.starts_with("ORDER BY"))
        .unwrap();
    assert_eq!(order_by_line.trim(), "ORDER BY 2 DESC");
}

#[test]
fn query_without_a_limit_stays_unbounded() {
    let result = compile(
        &model(),
        &query(r#"{"select": {"dimensions": ["Customer Country"], "measures": ["Revenue"]}}"#),
        "postgres",
    )
    .unwrap();

    assert!(!result.sql.to_uppercase().contains("LIMIT"));
}
