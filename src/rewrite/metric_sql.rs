//! SQL bodies for metric, rollup and cumulative metric CTEs.

use indexmap::IndexSet;

use super::model_sql::{ExpressionCompiler, JoinPlan};
use crate::analyzer::MetricRollupInfo;
use crate::error::{Error, Result};
use crate::mdl::{is_temporal_type, Catalog, Column, CumulativeMetric, Metric};
use crate::sql::parse::{quote_ident, quote_literal, SqlDialect};

/// `SELECT <dims>, <measures> FROM "<base>" ... GROUP BY <dims>`.
///
/// With a rollup, the grain column is truncated to the requested unit and
/// replaces the dimension of the same name.
pub(crate) fn metric_cte_body(
    catalog: &Catalog,
    dialect: SqlDialect,
    metric: &Metric,
    rollup: Option<&MetricRollupInfo>,
) -> Result<String> {
    let base = metric.base_object.as_str();
    if catalog.object(base).is_none() {
        return Err(Error::not_found(format!("metric model {} not exists", base)));
    }
    let alias = quote_ident(base);
    let own_columns: IndexSet<String> = catalog.column_names(base).into_iter().collect();
    let compiler = ExpressionCompiler::new(catalog, dialect, base, own_columns, true);
    let mut joins = JoinPlan::default();

    let mut items = Vec::new();
    let mut dimensions = 0;
    if let Some(rollup) = rollup {
        items.push(format!(
            "date_trunc({}, {}.{}) AS {}",
            quote_literal(rollup.unit.as_sql()),
            alias,
            quote_ident(&rollup.time_grain.ref_column),
            quote_ident(&rollup.time_grain.name)
        ));
        dimensions += 1;
    }
    let grain = rollup.map(|r| r.time_grain.name.as_str());
    for column in metric.dimension.iter().filter(|c| Some(c.name.as_str()) != grain) {
        items.push(column_item(&compiler, &alias, column, &mut joins)?);
        dimensions += 1;
    }
    for column in &metric.measure {
        items.push(column_item(&compiler, &alias, column, &mut joins)?);
    }
    if items.is_empty() {
        return Err(Error::malformed(format!(
            "metric {} should have at least one column",
            metric.name
        )));
    }

    let group_by = if dimensions > 0 {
        format!(
            " GROUP BY {}",
            (1..=dimensions)
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    } else {
        String::new()
    };
    Ok(format!(
        "SELECT {} FROM {} AS {}{}{}",
        items.join(", "),
        alias,
        alias,
        joins.to_sql(),
        group_by
    ))
}

fn column_item(
    compiler: &ExpressionCompiler<'_>,
    alias: &str,
    column: &Column,
    joins: &mut JoinPlan,
) -> Result<String> {
    let name = quote_ident(&column.name);
    match column.expression() {
        Some(text) => Ok(format!("{} AS {}", compiler.compile(text, false, joins)?, name)),
        None => Ok(format!("{}.{} AS {}", alias, name, name)),
    }
}

/// One row per window period, aggregating every base row up to that period.
pub(crate) fn cumulative_metric_cte_body(
    catalog: &Catalog,
    cumulative: &CumulativeMetric,
) -> Result<String> {
    let base = cumulative.base_object.as_str();
    let window = &cumulative.window;
    let measure = &cumulative.measure;

    let window_type = catalog.column_type(base, &window.ref_column).ok_or_else(|| {
        Error::not_found(format!(
            "column {} not found in {}",
            window.ref_column, base
        ))
    })?;
    if !is_temporal_type(&window_type) {
        return Err(Error::invalid_relationship(
            "CumulativeMetric measure cannot be window as it is not date/timestamp type",
        ));
    }
    if catalog.column_type(base, &measure.ref_column).is_none() {
        return Err(Error::not_found(format!(
            "column {} not found in {}",
            measure.ref_column, base
        )));
    }

    let spine = catalog.date_spine();
    let unit = quote_literal(window.time_unit.as_sql());
    let period = format!("date_trunc({}, CAST(d AS DATE))", unit);
    let start = format!("DATE {}", quote_literal(&window.start));
    let end = format!("DATE {}", quote_literal(&window.end));
    let window_ref = format!("b.{}", quote_ident(&window.ref_column));

    Ok(format!(
        "SELECT CAST(s.\"period\" AS DATE) AS {window_name}, {op}(b.{measure_ref}) AS {measure_name} \
         FROM (SELECT DISTINCT {period} AS \"period\" \
         FROM (SELECT unnest(generate_series(DATE {spine_start}, DATE {spine_end}, INTERVAL 1 {spine_unit})) AS d) AS spine \
         WHERE {period} BETWEEN date_trunc({unit}, {start}) AND date_trunc({unit}, {end})) AS s \
         LEFT JOIN {base} AS b ON date_trunc({unit}, {window_ref}) <= s.\"period\" AND {window_ref} >= {start} \
         GROUP BY 1",
        window_name = quote_ident(&window.name),
        op = measure.operator,
        measure_ref = quote_ident(&measure.ref_column),
        measure_name = quote_ident(&measure.name),
        spine_start = quote_literal(&spine.start),
        spine_end = quote_literal(&spine.end),
        spine_unit = spine.unit,
        base = quote_ident(base),
    ))
}
