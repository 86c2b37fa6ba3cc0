//! In-memory tables built from fetched rows, plus the tools the reasoning
//! agent calls on them.
//!
//! Datastore APIs often return every cell as a string, so numeric
//! operations parse cells leniently: a JSON number or a string that parses
//! as a finite `f64` counts as a number, anything else is text.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::chat::ToolDefinition;
use crate::models::{Record, RowSet};
use crate::AppError;

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn number_value(x: f64) -> Value {
    serde_json::Number::from_f64(x)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => as_text(a).trim().eq_ignore_ascii_case(as_text(b).trim()),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        (Some(_), None) | (None, Some(_)) => None,
        _ if is_blank(a) || is_blank(b) => None,
        _ => Some(as_text(a).cmp(&as_text(b))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    /// Case-insensitive substring match on the text form.
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    fn matches(&self, record: &Record) -> bool {
        let cell = record.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => values_equal(cell, &self.value),
            FilterOp::Ne => !values_equal(cell, &self.value),
            FilterOp::Contains => as_text(cell)
                .to_lowercase()
                .contains(&as_text(&self.value).to_lowercase()),
            FilterOp::Gt => compare(cell, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(cell, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare(cell, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(cell, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    Mean,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Aggregation {
    pub function: AggregateFn,
    /// Required for everything but `count`. With `count`, counts non-blank cells.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

fn compute(function: AggregateFn, column: Option<&str>, rows: &[&Record]) -> Value {
    if function == AggregateFn::Count {
        let count = match column {
            None => rows.len(),
            Some(c) => rows
                .iter()
                .filter(|r| r.get(c).is_some_and(|v| !is_blank(v)))
                .count(),
        };
        return json!(count);
    }

    let numbers: Vec<f64> = rows
        .iter()
        .filter_map(|r| column.and_then(|c| r.get(c)).and_then(as_number))
        .collect();
    if numbers.is_empty() {
        return Value::Null;
    }

    let sum: f64 = numbers.iter().sum();
    let value = match function {
        AggregateFn::Sum => sum,
        AggregateFn::Mean => sum / numbers.len() as f64,
        AggregateFn::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFn::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateFn::Count => numbers.len() as f64,
    };
    number_value(value)
}

/// Rows of one dataset with columns in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub dataset_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub truncated: bool,
}

impl Table {
    pub fn new(
        name: impl Into<String>,
        dataset_id: impl Into<String>,
        rows: Vec<Record>,
        truncated: bool,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for key in rows.iter().flat_map(|r| r.keys()) {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }

        Self {
            name: name.into(),
            dataset_id: dataset_id.into(),
            columns,
            rows,
            truncated,
        }
    }

    pub fn from_row_set(name: impl Into<String>, rows: RowSet) -> Self {
        let truncated = rows.is_truncated();
        Self::new(name, rows.dataset_id, rows.records, truncated)
    }

    fn check_column(&self, column: &str) -> Result<(), AppError> {
        if self.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(AppError::ToolError(format!(
                "table '{}' has no column '{}'; columns are {:?}",
                self.name, column, self.columns
            )))
        }
    }

    /// Column names, inferred kinds, fill counts and a few example values.
    pub fn describe(&self) -> Value {
        let columns: Vec<Value> = self
            .columns
            .iter()
            .map(|column| {
                let cells: Vec<&Value> = self
                    .rows
                    .iter()
                    .filter_map(|r| r.get(column))
                    .filter(|v| !is_blank(v))
                    .collect();
                let numeric: Vec<f64> = cells.iter().filter_map(|v| as_number(v)).collect();

                let kind = if cells.is_empty() {
                    "empty"
                } else if numeric.len() == cells.len() {
                    "number"
                } else if numeric.is_empty() {
                    "text"
                } else {
                    "mixed"
                };

                let mut examples = Vec::new();
                for cell in &cells {
                    if examples.len() == 3 {
                        break;
                    }
                    if !examples.contains(*cell) {
                        examples.push((*cell).clone());
                    }
                }

                let mut entry = json!({
                    "name": column,
                    "kind": kind,
                    "non_empty": cells.len(),
                    "examples": examples,
                });
                if kind == "number" {
                    entry["min"] =
                        number_value(numeric.iter().copied().fold(f64::INFINITY, f64::min));
                    entry["max"] =
                        number_value(numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max));
                }
                entry
            })
            .collect();

        json!({
            "table": self.name,
            "dataset_id": self.dataset_id,
            "rows": self.rows.len(),
            "truncated": self.truncated,
            "columns": columns,
        })
    }

    pub fn head(&self, n: usize) -> &[Record] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Rows matching every filter, in table order.
    pub fn filter(&self, filters: &[Filter]) -> Result<Vec<&Record>, AppError> {
        for f in filters {
            self.check_column(&f.column)?;
        }
        Ok(self
            .rows
            .iter()
            .filter(|r| filters.iter().all(|f| f.matches(r)))
            .collect())
    }

    pub fn aggregate(&self, aggregation: &Aggregation) -> Result<Value, AppError> {
        let column = aggregation.column.as_deref();
        if let Some(c) = column {
            self.check_column(c)?;
        } else if aggregation.function != AggregateFn::Count {
            return Err(AppError::ToolError(format!(
                "{:?} needs a column",
                aggregation.function
            )));
        }

        let rows = self.filter(&aggregation.filters)?;
        let function = aggregation.function;

        match &aggregation.group_by {
            None => Ok(json!({
                "function": function,
                "column": column,
                "matched_rows": rows.len(),
                "value": compute(function, column, &rows),
            })),
            Some(group_by) => {
                self.check_column(group_by)?;
                let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
                for row in rows {
                    let key = as_text(row.get(group_by).unwrap_or(&Value::Null));
                    groups.entry(key).or_default().push(row);
                }
                let groups: Vec<Value> = groups
                    .into_iter()
                    .map(|(key, rows)| {
                        json!({ "group": key, "value": compute(function, column, &rows) })
                    })
                    .collect();
                Ok(json!({
                    "function": function,
                    "column": column,
                    "group_by": group_by,
                    "groups": groups,
                }))
            }
        }
    }
}

// =============================================================================
// Table set and tool dispatch
// =============================================================================

pub const DESCRIBE_TABLE: &str = "describe_table";
pub const HEAD_ROWS: &str = "head_rows";
pub const FILTER_ROWS: &str = "filter_rows";
pub const AGGREGATE: &str = "aggregate";

#[derive(Deserialize)]
struct TableArgs {
    table: String,
}

#[derive(Deserialize)]
struct HeadArgs {
    table: String,
    #[serde(default)]
    n: Option<usize>,
}

#[derive(Deserialize)]
struct FilterArgs {
    table: String,
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct AggregateArgs {
    table: String,
    #[serde(flatten)]
    aggregation: Aggregation,
}

fn parse_args<T: DeserializeOwned>(arguments: &str) -> Result<T, AppError> {
    let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(arguments)
        .map_err(|e| AppError::ToolError(format!("invalid arguments: {e}")))
}

/// The tables handed to the agent, addressed by unique name.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: Vec<Table>,
}

impl TableSet {
    /// Renames tables whose name is already taken to `name_2`, `name_3`, ...
    pub fn new(tables: Vec<Table>) -> Self {
        let mut taken: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(tables.len());
        for mut table in tables {
            if !taken.insert(table.name.clone()) {
                let mut n = 2;
                while !taken.insert(format!("{}_{}", table.name, n)) {
                    n += 1;
                }
                table.name = format!("{}_{}", table.name, n);
            }
            out.push(table);
        }
        Self { tables: out }
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<&Table, AppError> {
        self.tables.iter().find(|t| t.name == name).ok_or_else(|| {
            let names: Vec<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
            AppError::ToolError(format!("no table named '{}'; tables are {:?}", name, names))
        })
    }

    /// Plain-text summary for the agent's opening message.
    pub fn overview(&self, preview_rows: usize) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!(
                "Table `{}` (dataset id {}): {} rows{}\nColumns: {}\n",
                table.name,
                table.dataset_id,
                table.rows.len(),
                if table.truncated {
                    ", INCOMPLETE: pagination stopped early"
                } else {
                    ""
                },
                table.columns.join(", ")
            ));
            for row in table.head(preview_rows) {
                out.push_str(&Value::Object(row.clone()).to_string());
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    /// Runs one tool call. `max_rows` caps rows returned by row-listing tools.
    pub fn call_tool(
        &self,
        name: &str,
        arguments: &str,
        max_rows: usize,
    ) -> Result<Value, AppError> {
        match name {
            DESCRIBE_TABLE => {
                let args: TableArgs = parse_args(arguments)?;
                Ok(self.get(&args.table)?.describe())
            }
            HEAD_ROWS => {
                let args: HeadArgs = parse_args(arguments)?;
                let table = self.get(&args.table)?;
                let n = args.n.unwrap_or(5).min(max_rows);
                Ok(json!({ "rows": table.head(n) }))
            }
            FILTER_ROWS => {
                let args: FilterArgs = parse_args(arguments)?;
                let table = self.get(&args.table)?;
                for c in &args.columns {
                    table.check_column(c)?;
                }
                let matched = table.filter(&args.filters)?;
                let limit = args.limit.unwrap_or(max_rows).min(max_rows);
                let rows: Vec<Value> = matched
                    .iter()
                    .take(limit)
                    .map(|r| {
                        if args.columns.is_empty() {
                            Value::Object((*r).clone())
                        } else {
                            let projected: Map<String, Value> = args
                                .columns
                                .iter()
                                .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                                .collect();
                            Value::Object(projected)
                        }
                    })
                    .collect();
                Ok(json!({ "matched": matched.len(), "returned": rows.len(), "rows": rows }))
            }
            AGGREGATE => {
                let args: AggregateArgs = parse_args(arguments)?;
                self.get(&args.table)?.aggregate(&args.aggregation)
            }
            other => Err(AppError::ToolError(format!("unknown tool '{}'", other))),
        }
    }
}

/// Tool schemas advertised to the agent.
pub fn table_tools() -> Vec<ToolDefinition> {
    let filter_schema = json!({
        "type": "array",
        "description": "Conditions that must all hold",
        "items": {
            "type": "object",
            "properties": {
                "column": { "type": "string" },
                "op": {
                    "type": "string",
                    "enum": ["eq", "ne", "contains", "gt", "gte", "lt", "lte"]
                },
                "value": { "description": "Number or string to compare against" }
            },
            "required": ["column", "op", "value"]
        }
    });

    vec![
        ToolDefinition {
            name: DESCRIBE_TABLE.to_string(),
            description: "Describe a table: row count, columns, value kinds and examples"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "table": { "type": "string" } },
                "required": ["table"]
            }),
        },
        ToolDefinition {
            name: HEAD_ROWS.to_string(),
            description: "Return the first n rows of a table".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string" },
                    "n": { "type": "integer", "minimum": 1 }
                },
                "required": ["table"]
            }),
        },
        ToolDefinition {
            name: FILTER_ROWS.to_string(),
            description: "Return rows matching all filters, optionally projected to some columns"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string" },
                    "filters": filter_schema,
                    "columns": { "type": "array", "items": { "type": "string" } },
                    "limit": { "type": "integer", "minimum": 1 }
                },
                "required": ["table"]
            }),
        },
        ToolDefinition {
            name: AGGREGATE.to_string(),
            description: "Compute count, sum, mean, min or max of a column, optionally per group"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string" },
                    "function": {
                        "type": "string",
                        "enum": ["count", "sum", "mean", "min", "max"]
                    },
                    "column": { "type": "string" },
                    "group_by": { "type": "string" },
                    "filters": filter_schema
                },
                "required": ["table", "function"]
            }),
        },
    ]
}
