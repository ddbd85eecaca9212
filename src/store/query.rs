//! Queries over a collection

use serde_json::Value;
use std::cmp::Ordering;

use super::Document;

/// Operator for filter expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to
    Eq,

    /// Not equal to
    Neq,
}

impl FilterOperator {
    /// Convert the operator to its REST representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
        }
    }
}

/// A single field comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    /// Whether a document satisfies the filter.
    ///
    /// Comparison is exact: strings match case-sensitively, a missing field
    /// never equals anything.
    pub fn matches(&self, doc: &Document) -> bool {
        let field = doc.get(&self.field);
        match self.operator {
            FilterOperator::Eq => field == Some(&self.value),
            FilterOperator::Neq => field != Some(&self.value),
        }
    }

    /// `field=op.value` as used in REST query strings and realtime filters
    pub fn to_param(&self) -> (String, String) {
        (
            self.field.clone(),
            format!("{}.{}", self.operator.as_str(), render(&self.value)),
        )
    }
}

/// Sort order for query results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

/// A query against one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
}

impl Query {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order: None,
        }
    }

    /// Keep documents whose `field` equals `value`
    pub fn eq<T: Into<Value>>(mut self, field: &str, value: T) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            operator: FilterOperator::Eq,
            value: value.into(),
        });
        self
    }

    /// Keep documents whose `field` differs from `value`
    pub fn neq<T: Into<Value>>(mut self, field: &str, value: T) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            operator: FilterOperator::Neq,
            value: value.into(),
        });
        self
    }

    /// Order the results by a field
    pub fn order_by(mut self, field: &str, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            field: field.to_string(),
            ascending,
        });
        self
    }

    /// Whether a document satisfies every filter
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Sort documents in place according to `order`; stable, so unordered
    /// queries keep their input order
    pub fn sort(&self, docs: &mut [Document]) {
        if let Some(order) = &self.order {
            docs.sort_by(|a, b| {
                let ord = compare(a.get(&order.field), b.get(&order.field));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
    }

    /// REST query parameters for the filters and order
    pub fn to_rest_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self.filters.iter().map(Filter::to_param).collect();
        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.field, direction)));
        }
        params
    }

    /// Realtime change filter (`field=eq.value`).
    ///
    /// The realtime service accepts a single filter, so only the first one
    /// is pushed down; the re-run REST query applies the rest.
    pub fn to_realtime_filter(&self) -> Option<String> {
        self.filters.first().map(|f| {
            let (field, expr) = f.to_param();
            format!("{}={}", field, expr)
        })
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
