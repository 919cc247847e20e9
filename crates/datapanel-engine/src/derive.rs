//! Table and graph values derived from an upstream panel

use datapanel_model::{GraphConfig, GraphType, TableConfig};
use serde_json::{json, Map, Value};

/// Project upstream rows onto the table's columns
///
/// Without configured columns rows pass through unchanged. A missing or
/// non-array upstream yields an empty table.
#[must_use]
pub fn table(config: &TableConfig, upstream: Option<&Value>) -> Value {
    let Some(Value::Array(rows)) = upstream else {
        return Value::Array(Vec::new());
    };
    if config.columns.is_empty() {
        return Value::Array(rows.clone());
    }

    let projected = rows
        .iter()
        .map(|row| {
            let out: Map<String, Value> = config
                .columns
                .iter()
                .map(|col| {
                    let cell = row.get(&col.field).cloned().unwrap_or(Value::Null);
                    (col.field.clone(), cell)
                })
                .collect();
            Value::Object(out)
        })
        .collect();
    Value::Array(projected)
}

/// Build the chart description for the upstream rows
#[must_use]
pub fn graph(config: &GraphConfig, upstream: Option<&Value>) -> Value {
    let series: Vec<Value> = match upstream {
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| {
                json!({
                    "x": row.get(&config.x).cloned().unwrap_or(Value::Null),
                    "y": row.get(&config.y.field).cloned().unwrap_or(Value::Null),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    let graph_type = match config.graph_type {
        GraphType::Bar => "bar",
    };
    json!({
        "type": graph_type,
        "x": config.x,
        "y": {"field": config.y.field, "label": config.y.label},
        "series": series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use datapanel_model::{GraphY, TableColumn};

    fn rows() -> Value {
        json!([{"name": "Morgan", "age": 17}, {"name": "James", "age": 22, "extra": true}])
    }

    #[test]
    fn table_projects_columns() {
        let config = TableConfig {
            columns: vec![TableColumn::new("Who", "name"), TableColumn::new("Where", "city")],
            panel_source: 0,
        };
        assert_eq!(
            table(&config, Some(&rows())),
            json!([{"name": "Morgan", "city": null}, {"name": "James", "city": null}])
        );
    }

    #[test]
    fn table_without_columns_passes_rows() {
        assert_eq!(table(&TableConfig::default(), Some(&rows())), rows());
    }

    #[test]
    fn table_of_nothing_is_empty() {
        assert_eq!(table(&TableConfig::default(), None), json!([]));
        assert_eq!(table(&TableConfig::default(), Some(&json!({"a": 1}))), json!([]));
    }

    #[test]
    fn graph_series_from_rows() {
        let config = GraphConfig {
            panel_source: 1,
            y: GraphY::new("age", "Age"),
            x: "name".to_string(),
            graph_type: GraphType::Bar,
        };
        assert_eq!(
            graph(&config, Some(&rows())),
            json!({
                "type": "bar",
                "x": "name",
                "y": {"field": "age", "label": "Age"},
                "series": [{"x": "Morgan", "y": 17}, {"x": "James", "y": 22}],
            })
        );
    }

    #[test]
    fn graph_of_nothing_has_empty_series() {
        let value = graph(&GraphConfig::default(), None);
        assert_eq!(value["series"], json!([]));
        assert_eq!(value["type"], json!("bar"));
    }
}
