//! SQL bodies for model CTEs and the expression compiler shared with metrics.

use indexmap::{IndexMap, IndexSet};
use sqlparser::ast::{Expr, Ident};

use super::order::referenced_tables;
use crate::analyzer::{RelationshipInfo, RelationshipResolver};
use crate::error::{Error, Result};
use crate::mdl::{Catalog, Model, Relationship};
use crate::sql::parse::{parse_expr, parse_query, quote_ident, quoted, SqlDialect};
use crate::sql::walk::{function_name, replace_paths, PathPart};

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "sum",
    "count",
    "avg",
    "min",
    "max",
    "array_agg",
    "bool_or",
    "bool_and",
    "every",
    "any_value",
    "string_agg",
    "median",
    "stddev",
    "variance",
];

/// Whether the top of `expr` is a plain (non-window) aggregate call.
pub(crate) fn is_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function(function) => {
            function.over.is_none()
                && AGGREGATE_FUNCTIONS.contains(&function_name(function).as_str())
        }
        Expr::Nested(inner) => is_aggregate(inner),
        _ => false,
    }
}

/// Relation a model reads from, without alias.
pub(crate) fn model_source(model: &Model) -> Result<String> {
    if let Some(sql) = model.ref_sql.as_deref().filter(|s| !s.trim().is_empty()) {
        return Ok(format!("({})", sql.trim().trim_end_matches(';')));
    }
    match &model.base_object {
        Some(base) => Ok(quote_ident(base)),
        None => Err(Error::malformed(format!(
            "model {} should have either refSql or baseObject",
            model.name
        ))),
    }
}

/// Join condition of `relationship` with its model names replaced by the given aliases.
pub(crate) fn condition_sql(
    dialect: SqlDialect,
    relationship: &Relationship,
    source_alias: &Ident,
    target_alias: &Ident,
) -> Result<String> {
    if relationship.source() == relationship.target() {
        return Err(Error::unsupported(format!(
            "self relationship {} is not supported",
            relationship.name
        )));
    }
    let mut condition = parse_expr(dialect, &relationship.condition)?;
    replace_paths(&mut condition, &mut |parts| {
        let [PathPart::Name(qualifier), rest @ ..] = parts else {
            return None;
        };
        if rest.is_empty() {
            return None;
        }
        let alias = if qualifier.value == relationship.source() {
            source_alias
        } else if qualifier.value == relationship.target() {
            target_alias
        } else {
            return None;
        };
        let mut idents = vec![alias.clone()];
        for part in rest {
            match part {
                PathPart::Name(ident) => idents.push(ident.clone()),
                PathPart::Index(_) => return None,
            }
        }
        Some(Expr::CompoundIdentifier(idents))
    });
    Ok(condition.to_string())
}

/// `LEFT JOIN` clauses keyed by relationship, plus whether each reads a model CTE.
#[derive(Debug, Default)]
pub(crate) struct JoinPlan {
    joins: IndexMap<String, (bool, String)>,
}

impl JoinPlan {
    fn add(&mut self, relationship: &str, reads_cte: bool, sql: String) {
        match self.joins.get(relationship) {
            Some((true, _)) => {}
            Some((false, _)) if !reads_cte => {}
            _ => {
                self.joins.insert(relationship.to_string(), (reads_cte, sql));
            }
        }
    }

    pub fn to_sql(&self) -> String {
        self.joins
            .values()
            .map(|(_, sql)| format!(" {}", sql))
            .collect()
    }
}

/// Compiles entity expressions: relationship paths become joins, own columns get qualified.
pub(crate) struct ExpressionCompiler<'a> {
    catalog: &'a Catalog,
    dialect: SqlDialect,
    entity: &'a str,
    own_columns: IndexSet<String>,
    /// Calculated columns of the entity by name: expression text and whether it aggregates.
    calculated: IndexMap<String, (String, bool)>,
    /// Join the related models' CTEs instead of their sources.
    join_model_ctes: bool,
}

impl<'a> ExpressionCompiler<'a> {
    pub fn new(
        catalog: &'a Catalog,
        dialect: SqlDialect,
        entity: &'a str,
        own_columns: IndexSet<String>,
        join_model_ctes: bool,
    ) -> Self {
        Self {
            catalog,
            dialect,
            entity,
            own_columns,
            calculated: IndexMap::new(),
            join_model_ctes,
        }
    }

    /// Inline the calculated columns of `model` wherever an expression names them.
    ///
    /// An aggregated column read from a single-row expression resolves to its
    /// grouped sub-join `"__name"."name"` instead.
    pub fn with_calculated_columns(mut self, model: &Model) -> Result<Self> {
        for column in model.columns.iter().filter(|c| !c.is_relationship()) {
            if let Some(text) = column.expression() {
                let aggregate = is_aggregate(&parse_expr(self.dialect, text)?);
                self.calculated
                    .insert(column.name.clone(), (text.to_string(), aggregate));
            }
        }
        Ok(self)
    }

    pub fn compile(&self, text: &str, to_one_only: bool, joins: &mut JoinPlan) -> Result<Expr> {
        self.compile_inner(text, to_one_only, !to_one_only, joins, &mut Vec::new())
    }

    /// Compile the expression of the entity's own column `name`.
    pub fn compile_column(
        &self,
        name: &str,
        text: &str,
        to_one_only: bool,
        joins: &mut JoinPlan,
    ) -> Result<Expr> {
        let mut stack = vec![name.to_string()];
        self.compile_inner(text, to_one_only, !to_one_only, joins, &mut stack)
    }

    fn compile_inner(
        &self,
        text: &str,
        to_one_only: bool,
        in_aggregate: bool,
        joins: &mut JoinPlan,
        stack: &mut Vec<String>,
    ) -> Result<Expr> {
        let mut expr = parse_expr(self.dialect, text)?;
        let infos =
            RelationshipResolver::new(self.catalog).rewrite(&mut expr, self.entity, to_one_only)?;
        for info in infos.iter().filter(|i| i.needs_rewrite()) {
            self.plan_joins(info, joins)?;
        }

        let own = quoted(self.entity);
        let mut failure = None;
        replace_paths(&mut expr, &mut |parts| match parts {
            [PathPart::Name(ident)] if self.own_columns.contains(&ident.value) => {
                Some(Expr::CompoundIdentifier(vec![own.clone(), ident.clone()]))
            }
            [PathPart::Name(ident)] if failure.is_none() => {
                match self.inline_calculated(&ident.value, in_aggregate, joins, stack) {
                    Ok(replacement) => replacement,
                    Err(err) => {
                        failure = Some(err);
                        None
                    }
                }
            }
            _ => None,
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(expr),
        }
    }

    fn inline_calculated(
        &self,
        name: &str,
        in_aggregate: bool,
        joins: &mut JoinPlan,
        stack: &mut Vec<String>,
    ) -> Result<Option<Expr>> {
        let Some((text, aggregate)) = self.calculated.get(name) else {
            return Ok(None);
        };
        if stack.iter().any(|n| n == name) {
            return Err(Error::cycle(self.entity, name));
        }
        if *aggregate {
            if in_aggregate {
                return Err(Error::unsupported(format!(
                    "aggregated column {}.{} cannot be used inside another aggregation",
                    self.entity, name
                )));
            }
            let sub_alias = quoted(&format!("__{}", name));
            return Ok(Some(Expr::CompoundIdentifier(vec![sub_alias, quoted(name)])));
        }
        stack.push(name.to_string());
        let inlined = self.compile_inner(text, true, in_aggregate, joins, stack);
        stack.pop();
        Ok(Some(Expr::Nested(Box::new(inlined?))))
    }

    fn plan_joins(&self, info: &RelationshipInfo, joins: &mut JoinPlan) -> Result<()> {
        let last = info.relationships.len().saturating_sub(1);
        for (i, relationship) in info.relationships.iter().enumerate() {
            let target_name = relationship.target();
            let target = self
                .catalog
                .model(target_name)
                .ok_or_else(|| Error::not_found(format!("model {} not found", target_name)))?;
            let terminal_is_derived = i == last
                && info
                    .terminal_column()
                    .and_then(|c| target.column(c))
                    .is_some_and(|c| !c.is_physical());
            let reads_cte = self.join_model_ctes || terminal_is_derived;
            let source = if reads_cte {
                quote_ident(target_name)
            } else {
                model_source(target)?
            };
            let condition = condition_sql(
                self.dialect,
                relationship,
                &quoted(relationship.source()),
                &quoted(target_name),
            )?;
            joins.add(
                &relationship.name,
                reads_cte,
                format!(
                    "LEFT JOIN {} AS {} ON {}",
                    source,
                    quote_ident(target_name),
                    condition
                ),
            );
        }
        Ok(())
    }
}

/// Body of the CTE that materializes `model` with every declared column.
pub(crate) fn model_cte_body(catalog: &Catalog, dialect: SqlDialect, model: &Model) -> Result<String> {
    let alias = quote_ident(&model.name);
    let source = model_source(model)?;

    let mut own_columns: IndexSet<String> = model
        .columns
        .iter()
        .filter(|c| c.is_physical())
        .map(|c| c.name.clone())
        .collect();
    if let Some(base) = &model.base_object {
        own_columns.extend(catalog.column_names(base));
    }
    let compiler = ExpressionCompiler::new(catalog, dialect, &model.name, own_columns, false)
        .with_calculated_columns(model)?;

    let mut items = Vec::new();
    let mut joins = JoinPlan::default();
    let mut grouped = Vec::new();
    for column in &model.columns {
        let name = quote_ident(&column.name);
        if let Some(relationship) = &column.relationship {
            items.push(format!("'relationship<{}>' AS {}", relationship, name));
            continue;
        }
        let Some(text) = column.expression() else {
            items.push(format!("{}.{} AS {}", alias, name, name));
            continue;
        };
        if !is_aggregate(&parse_expr(dialect, text)?) {
            let expr = compiler.compile_column(&column.name, text, true, &mut joins)?;
            items.push(format!("{} AS {}", expr, name));
            continue;
        }

        let pk = model.primary_key.as_deref().ok_or_else(|| {
            Error::not_found(format!(
                "primary key of model {} is required by aggregated column {}",
                model.name, column.name
            ))
        })?;
        let pk = quote_ident(pk);
        let mut sub_joins = JoinPlan::default();
        let expr = compiler.compile_column(&column.name, text, false, &mut sub_joins)?;
        let sub_alias = quote_ident(&format!("__{}", column.name));
        grouped.push(format!(
            " LEFT JOIN (SELECT {alias}.{pk} AS \"__pk\", {expr} AS {name} FROM {source} AS {alias}{joins} GROUP BY 1) AS {sub_alias} ON {alias}.{pk} = {sub_alias}.\"__pk\"",
            joins = sub_joins.to_sql(),
        ));
        items.push(format!("{}.{} AS {}", sub_alias, name, name));
    }
    if items.is_empty() {
        return Err(Error::malformed(format!(
            "model {} should have at least one column",
            model.name
        )));
    }

    Ok(format!(
        "SELECT {} FROM {} AS {}{}{}",
        items.join(", "),
        source,
        alias,
        joins.to_sql(),
        grouped.concat()
    ))
}

/// Models whose CTEs the CTE of `model` reads.
pub fn model_dependencies(
    catalog: &Catalog,
    dialect: SqlDialect,
    model: &Model,
) -> Result<IndexSet<String>> {
    let body = parse_query(dialect, &model_cte_body(catalog, dialect, model)?)?;
    Ok(referenced_tables(&body)?
        .into_iter()
        .filter(|name| *name != model.name && catalog.model(name).is_some())
        .collect())
}
