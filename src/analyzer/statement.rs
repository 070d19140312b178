//! Scope-threading walk over a statement.
//!
//! The walk assigns ordinals as it goes: one per SELECT on entry (before its
//! FROM clause), one per table factor in FROM order. Rewrite rules walk the same
//! tree in the same order and use those ordinals to find the nodes recorded here.
//!
//! Within a SELECT the order is: FROM factors, JOIN constraints, projection,
//! WHERE, GROUP BY, HAVING. ORDER BY of the enclosing query follows the body.

use std::collections::HashSet;
use std::str::FromStr;

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, GroupByExpr, Join, JoinConstraint,
    JoinOperator, LambdaFunction, OneOrManyWithParens, Query, Select, SelectItem, SetExpr,
    Statement, TableAlias, TableFactor, TableFunctionArgs, TableWithJoins, Value,
};
use tracing::trace;

use super::analysis::{
    Analysis, ArrayCall, ArrayFunction, ArrayInput, MetricRollupInfo, PathStep, PathUsage,
    SelectAnalysis, TableKind,
};
use super::scope::{Field, RelationType, ScopeId, Scopes};
use crate::error::{Error, Result};
use crate::mdl::{Catalog, SessionContext, TimeUnit};
use crate::sql::parse::quote_ident;
use crate::sql::walk::{children, dotted_path, function_args, function_name, Child, PathPart};

/// Analyzes statements against one catalog and session.
pub struct StatementAnalyzer<'a> {
    catalog: &'a Catalog,
    session: &'a SessionContext,
}

impl<'a> StatementAnalyzer<'a> {
    pub fn new(catalog: &'a Catalog, session: &'a SessionContext) -> Self {
        Self { catalog, session }
    }

    /// Analyze `statement`. Statements other than queries produce an empty analysis.
    pub fn analyze(&self, statement: &Statement) -> Result<Analysis> {
        let Statement::Query(query) = statement else {
            return Ok(Analysis::default());
        };
        self.analyze_query(query)
    }

    pub fn analyze_query(&self, query: &Query) -> Result<Analysis> {
        let mut walk = Walk {
            catalog: self.catalog,
            session: self.session,
            scopes: Scopes::new(),
            analysis: Analysis::default(),
            next_factor: 0,
        };
        let root = walk.scopes.root();
        walk.visit_query(query, root)?;
        walk.backfill()?;
        Ok(walk.analysis)
    }
}

/// Fields exposed by a FROM item and whether they come from a genuine table.
struct Relation {
    fields: Vec<Field>,
    table_scope: bool,
}

impl Relation {
    fn empty() -> Self {
        Self {
            fields: Vec::new(),
            table_scope: false,
        }
    }
}

/// State threaded through one analysis.
struct Walk<'a> {
    catalog: &'a Catalog,
    session: &'a SessionContext,
    scopes: Scopes,
    analysis: Analysis,
    next_factor: usize,
}

impl<'a> Walk<'a> {
    fn visit_query(&mut self, query: &Query, parent: ScopeId) -> Result<()> {
        let mut scope = parent;
        if let Some(with) = &query.with {
            let with_scope = self.scopes.child(parent);
            let mut seen = HashSet::new();
            for cte in &with.cte_tables {
                let name = cte.alias.name.value.clone();
                if !seen.insert(name.clone()) {
                    return Err(Error::malformed(format!(
                        "WITH query name '{}' specified more than once",
                        name
                    )));
                }
                self.visit_query(&cte.query, with_scope)?;
                self.scopes.add_named_query(with_scope, &name);
            }
            scope = with_scope;
        }

        let select = self.visit_set_expr(&query.body, scope)?;
        if let (Some(order_by), Some((ordinal, select_scope))) = (&query.order_by, select) {
            for item in &order_by.exprs {
                self.visit_expr(&item.expr, ordinal, select_scope)?;
            }
        }
        Ok(())
    }

    /// Returns the ordinal and scope of the body when it is a plain SELECT.
    fn visit_set_expr(
        &mut self,
        body: &SetExpr,
        scope: ScopeId,
    ) -> Result<Option<(usize, ScopeId)>> {
        match body {
            SetExpr::Select(select) => self.visit_select(select, scope).map(Some),
            SetExpr::Query(query) => {
                self.visit_query(query, scope)?;
                Ok(None)
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left, scope)?;
                self.visit_set_expr(right, scope)?;
                Ok(None)
            }
            SetExpr::Values(_) => Ok(None),
            other => Err(Error::unsupported(format!(
                "query body not supported: {}",
                other
            ))),
        }
    }

    fn visit_select(&mut self, select: &Select, parent: ScopeId) -> Result<(usize, ScopeId)> {
        let ordinal = self.analysis.selects.len();
        self.analysis.selects.push(SelectAnalysis::default());

        let mut fields = Vec::new();
        let mut table_scope = false;
        for from in &select.from {
            let relation = self.visit_table_with_joins(from, parent)?;
            fields.extend(relation.fields);
            table_scope |= relation.table_scope;
        }
        let scope =
            self.scopes
                .child_with_relation(parent, RelationType::new(fields), table_scope);

        for from in &select.from {
            for constraint in join_constraints(from) {
                self.visit_expr(constraint, ordinal, scope)?;
            }
        }
        for item in &select.projection {
            if let Some(expr) = select_item_expr(item) {
                self.visit_expr(expr, ordinal, scope)?;
            }
        }
        if let Some(selection) = &select.selection {
            self.visit_expr(selection, ordinal, scope)?;
        }
        self.visit_group_by(select, ordinal, scope)?;
        if let Some(having) = &select.having {
            self.visit_expr(having, ordinal, scope)?;
        }
        Ok((ordinal, scope))
    }

    fn visit_group_by(&mut self, select: &Select, ordinal: usize, scope: ScopeId) -> Result<()> {
        let exprs = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs,
            GroupByExpr::All(_) => return Ok(()),
        };
        for expr in exprs {
            match expr {
                Expr::GroupingSets(_) | Expr::Cube(_) | Expr::Rollup(_) => {
                    return Err(Error::unsupported(format!(
                        "grouping element not supported: {}",
                        expr
                    )));
                }
                Expr::Value(Value::Number(n, _)) => {
                    let resolved = n
                        .parse::<usize>()
                        .ok()
                        .filter(|p| *p >= 1)
                        .and_then(|p| select.projection.get(p - 1))
                        .and_then(select_item_expr)
                        .ok_or_else(|| {
                            Error::malformed(format!(
                                "GROUP BY position {} is not in select list",
                                n
                            ))
                        })?;
                    self.analysis.selects[ordinal].group_by.push(resolved.clone());
                }
                other => {
                    self.visit_expr(other, ordinal, scope)?;
                    self.analysis.selects[ordinal].group_by.push(other.clone());
                }
            }
        }
        Ok(())
    }

    fn visit_table_with_joins(
        &mut self,
        from: &TableWithJoins,
        parent: ScopeId,
    ) -> Result<Relation> {
        let mut relation = self.visit_factor(&from.relation, parent)?;
        for join in &from.joins {
            let right = self.visit_factor(&join.relation, parent)?;
            relation.fields.extend(right.fields);
            relation.table_scope |= right.table_scope;
        }
        Ok(relation)
    }

    fn visit_factor(&mut self, factor: &TableFactor, parent: ScopeId) -> Result<Relation> {
        let ordinal = self.next_factor;
        self.next_factor += 1;

        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                if let Some(args) = args {
                    return self.visit_function_relation(ordinal, &name.to_string(), args);
                }
                let parts: Vec<String> = name.0.iter().map(|i| i.value.clone()).collect();
                let relation = if parts.len() == 1 && self.scopes.is_named_query(parent, &parts[0])
                {
                    trace!(name = %parts[0], "table reference bound to WITH query");
                    Relation {
                        fields: Vec::new(),
                        table_scope: true,
                    }
                } else {
                    self.visit_table(ordinal, &parts)
                };
                Ok(with_alias(relation, alias.as_ref()))
            }
            TableFactor::Derived { subquery, .. } => {
                self.visit_query(subquery, parent)?;
                Ok(Relation::empty())
            }
            TableFactor::UNNEST { .. } => Ok(Relation::empty()),
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
            } => {
                let relation = self.visit_table_with_joins(table_with_joins, parent)?;
                Ok(with_alias(relation, alias.as_ref()))
            }
            TableFactor::TableFunction { expr, .. } => Err(Error::unsupported(format!(
                "FunctionRelation not supported: {}",
                expr
            ))),
            TableFactor::Function { name, .. } => Err(Error::unsupported(format!(
                "FunctionRelation not supported: {}",
                name
            ))),
            other => Err(Error::unsupported(format!(
                "relation not supported: {}",
                other
            ))),
        }
    }

    fn visit_table(&mut self, ordinal: usize, parts: &[String]) -> Relation {
        let Some(name) = self.session.qualify(parts) else {
            return Relation::empty();
        };
        self.analysis.tables.insert(name.clone());

        let analysis = &mut self.analysis;
        if let Some(model) = self.catalog.model_by_table(&name) {
            trace!(model = %model.name, "table reference bound to model");
            analysis.model_refs.insert(model.name.clone());
            analysis
                .table_bindings
                .insert(ordinal, (TableKind::Model, model.name.clone()));
            let fields = model
                .columns
                .iter()
                .map(|c| Field::from_column(&name, c))
                .collect();
            return Relation {
                fields,
                table_scope: true,
            };
        }

        let bound = if let Some(metric) = self.catalog.metric_by_table(&name) {
            analysis.metrics.insert(metric.name.clone());
            Some((TableKind::Metric, metric.name.clone()))
        } else if let Some(cm) = self.catalog.cumulative_metric_by_table(&name) {
            analysis.cumulative_metrics.insert(cm.name.clone());
            Some((TableKind::CumulativeMetric, cm.name.clone()))
        } else if let Some(view) = self.catalog.view_by_table(&name) {
            analysis.views.insert(view.name.clone());
            Some((TableKind::View, view.name.clone()))
        } else {
            None
        };
        if let Some((kind, object)) = bound {
            trace!(?kind, name = %object, "table reference bound to catalog object");
            analysis.table_bindings.insert(ordinal, (kind, object));
        }
        Relation::empty()
    }

    fn visit_function_relation(
        &mut self,
        ordinal: usize,
        name: &str,
        args: &TableFunctionArgs,
    ) -> Result<Relation> {
        if !name.eq_ignore_ascii_case("roll_up") {
            return Err(Error::unsupported(format!(
                "FunctionRelation not supported: {}",
                name
            )));
        }
        let args: Vec<&Expr> = args
            .args
            .iter()
            .filter_map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e),
                _ => None,
            })
            .collect();
        if args.len() != 3 {
            return Err(Error::malformed("rollup function should have 3 arguments"));
        }

        let metric = dotted_path(args[0])
            .and_then(|parts| parts.iter().map(|p| p.name().map(str::to_string)).collect::<Option<Vec<_>>>())
            .and_then(|parts| self.session.qualify(&parts))
            .and_then(|table| self.catalog.metric_by_table(&table))
            .ok_or_else(|| Error::not_found(format!("Metric not found: {}", args[0])))?;
        let Expr::Identifier(grain_name) = args[1] else {
            return Err(Error::malformed(format!(
                "rollup time column should be an identifier: {}",
                args[1]
            )));
        };
        let Expr::Identifier(unit) = args[2] else {
            return Err(Error::malformed(format!(
                "rollup time unit should be an identifier: {}",
                args[2]
            )));
        };
        let unit = TimeUnit::from_str(&unit.value)?;
        let grain = metric.time_grain(&grain_name.value).ok_or_else(|| {
            Error::not_found(format!("Time column not found in metric: {}", grain_name.value))
        })?;
        if !grain.date_parts.is_empty() && !grain.date_parts.contains(&unit) {
            return Err(Error::malformed(format!(
                "time unit {} is not allowed for time grain {}",
                unit, grain.name
            )));
        }

        let signature = format!(
            "{}({})",
            name,
            args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
        );
        trace!(%signature, metric = %metric.name, "metric rollup binding");
        self.analysis.metric_rollups.insert(
            signature.clone(),
            MetricRollupInfo {
                metric: metric.name.clone(),
                time_grain: grain.clone(),
                unit,
            },
        );
        self.analysis
            .table_bindings
            .insert(ordinal, (TableKind::MetricRollup, signature));
        Ok(Relation::empty())
    }

    fn visit_expr(&mut self, expr: &Expr, ordinal: usize, scope: ScopeId) -> Result<()> {
        if let Some(parts) = dotted_path(expr) {
            if let [PathPart::Name(ident)] = parts.as_slice() {
                let field = self
                    .scopes
                    .relation(scope)
                    .resolve_unique(&[ident.value.clone()])?;
                if let Some(qualifier) = field.and_then(Field::qualifier) {
                    self.analysis.selects[ordinal]
                        .columns
                        .insert(ident.to_string(), qualifier);
                }
            }
            if let Some(usage) = self.resolve_path(expr, &parts, scope)? {
                self.analysis.selects[ordinal].paths.push(usage);
            }
            return Ok(());
        }
        if matches!(expr, Expr::Lambda(_)) {
            return Ok(());
        }
        if let Expr::Function(function) = expr {
            if let Some(kind) = ArrayFunction::from_name(&function_name(function)) {
                if let Some(call) = self.array_call(expr, function, kind, scope)? {
                    self.analysis.selects[ordinal].array_calls.push(call);
                    return Ok(());
                }
            }
        }
        for child in children(expr) {
            match child {
                Child::Expr(e) => self.visit_expr(e, ordinal, scope)?,
                Child::Query(q) => self.visit_query(q, scope)?,
            }
        }
        Ok(())
    }

    fn array_call(
        &mut self,
        expr: &Expr,
        function: &Function,
        kind: ArrayFunction,
        scope: ScopeId,
    ) -> Result<Option<ArrayCall>> {
        let args = function_args(function);
        let Some(first) = args.first().copied() else {
            return Ok(None);
        };

        let input = match first {
            Expr::Function(inner) => {
                let Some(inner_kind) = ArrayFunction::from_name(&function_name(inner)) else {
                    return Ok(None);
                };
                match self.array_call(first, inner, inner_kind, scope)? {
                    Some(call) if call.function.yields_array() => ArrayInput::Call(Box::new(call)),
                    _ => return Ok(None),
                }
            }
            _ => {
                let Some(parts) = dotted_path(first) else {
                    return Ok(None);
                };
                match self.resolve_path(first, &parts, scope)? {
                    Some(usage) if usage.yields_array() => ArrayInput::Relationship(usage),
                    _ => return Ok(None),
                }
            }
        };
        if matches!(kind, ArrayFunction::Transform | ArrayFunction::Filter)
            && lambda_arg(function).is_none()
        {
            return Err(Error::malformed(format!(
                "{} expects a lambda as its second argument",
                function_name(function)
            )));
        }
        Ok(Some(ArrayCall {
            key: expr.to_string(),
            function: kind,
            input,
            call: function.clone(),
        }))
    }

    /// Bind a dotted path to a field of the current scope and walk its relationships.
    fn resolve_path(
        &mut self,
        expr: &Expr,
        parts: &[PathPart],
        scope: ScopeId,
    ) -> Result<Option<PathUsage>> {
        let names: Vec<String> = parts
            .iter()
            .map_while(|p| p.name().map(str::to_string))
            .collect();
        let relation = self.scopes.relation(scope);

        let mut bound = None;
        for i in 0..names.len() {
            let candidates = relation.resolve(&names[..=i]);
            match candidates.len() {
                0 => continue,
                1 => {
                    bound = Some((i, candidates[0].clone()));
                    break;
                }
                _ => return Err(Error::ambiguous(&names[..=i].join("."))),
            }
        }
        let Some((i, field)) = bound else {
            return Ok(None);
        };
        let (Some(relationship), Some(base_model)) = (&field.relationship, field.model_name())
        else {
            return Ok(None);
        };

        let first = self.relationship(relationship, &field.data_type)?;
        let mut steps = vec![PathStep {
            column: field.column.clone(),
            relationship: first,
            index: None,
        }];
        let mut current = field.data_type.clone();
        let mut terminal: Vec<String> = Vec::new();

        for part in &parts[i + 1..] {
            match part {
                PathPart::Index(index) => match steps.last_mut() {
                    Some(step) if terminal.is_empty() && step.yields_array() => {
                        step.index = Some(index.to_string());
                    }
                    _ => {
                        return Err(Error::unsupported(format!(
                            "subscript is not supported here: {}",
                            expr
                        )))
                    }
                },
                PathPart::Name(ident) => {
                    if let Some(step) = steps.last().filter(|s| s.yields_array()) {
                        return Err(Error::invalid_relationship(format!(
                            "to-many relationship {} must be accessed through an array function or an index: {}",
                            step.column, expr
                        )));
                    }
                    let next = terminal
                        .is_empty()
                        .then(|| self.catalog.relationship_column(&current, &ident.value))
                        .flatten();
                    match next {
                        Some(column) => {
                            let name = column.relationship.clone().unwrap_or_default();
                            let target = column.data_type.clone();
                            steps.push(PathStep {
                                column: column.name.clone(),
                                relationship: self.relationship(&name, &target)?,
                                index: None,
                            });
                            current = target;
                        }
                        None => terminal.push(ident.to_string()),
                    }
                }
            }
        }

        for step in &steps {
            self.analysis
                .relationships
                .insert(step.relationship.name.clone());
        }
        Ok(Some(PathUsage {
            key: expr.to_string(),
            qualifier: field
                .qualifier()
                .unwrap_or_else(|| quote_ident(base_model)),
            base_model: base_model.to_string(),
            steps,
            terminal,
        }))
    }

    fn relationship(&self, name: &str, target: &str) -> Result<crate::mdl::Relationship> {
        self.catalog
            .relationship(name)
            .map(|r| r.reverse_if_needed(target))
            .ok_or_else(|| Error::not_found(format!("relationship {} not found", name)))
    }

    /// Record models reached through relationships, metrics and rollups.
    fn backfill(&mut self) -> Result<()> {
        let analysis = &mut self.analysis;
        let direct: Vec<String> = analysis.model_refs.iter().cloned().collect();
        analysis.models.extend(direct);

        for name in &analysis.relationships {
            let Some(relationship) = self.catalog.relationship(name) else {
                continue;
            };
            for model in &relationship.models {
                if self.catalog.model(model).is_none() {
                    return Err(Error::not_found(format!(
                        "relationship model {} not exists",
                        model
                    )));
                }
                analysis.models.insert(model.clone());
            }
        }

        if analysis
            .metric_rollups
            .values()
            .any(|r| analysis.metrics.contains(&r.metric))
        {
            return Err(Error::malformed(
                "duplicate metrics in metrics and metric rollups",
            ));
        }

        let mut bases = Vec::new();
        for name in analysis
            .metrics
            .iter()
            .chain(analysis.metric_rollups.values().map(|r| &r.metric))
        {
            if let Some(metric) = self.catalog.metric(name) {
                bases.push(metric.base_object.clone());
            }
        }
        for name in &analysis.cumulative_metrics {
            if let Some(cm) = self.catalog.cumulative_metric(name) {
                bases.push(cm.base_object.clone());
            }
        }
        for base in bases {
            if self.catalog.model(&base).is_some() {
                analysis.models.insert(base);
            } else if self.catalog.metric(&base).is_none()
                && self.catalog.cumulative_metric(&base).is_none()
            {
                return Err(Error::not_found(format!("metric model {} not exists", base)));
            }
        }
        Ok(())
    }
}

fn with_alias(relation: Relation, alias: Option<&TableAlias>) -> Relation {
    match alias {
        Some(alias) if relation.table_scope => Relation {
            fields: relation
                .fields
                .iter()
                .map(|f| f.with_alias(&alias.name.to_string(), &alias.name.value))
                .collect(),
            table_scope: true,
        },
        _ => relation,
    }
}

/// Expression of a projection item, if it has one.
fn select_item_expr(item: &SelectItem) -> Option<&Expr> {
    match item {
        SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => Some(expr),
        _ => None,
    }
}

/// ON constraint of a join, if it has one.
fn join_constraint(join: &Join) -> Option<&Expr> {
    match &join.join_operator {
        JoinOperator::Inner(JoinConstraint::On(expr))
        | JoinOperator::LeftOuter(JoinConstraint::On(expr))
        | JoinOperator::RightOuter(JoinConstraint::On(expr))
        | JoinOperator::FullOuter(JoinConstraint::On(expr)) => Some(expr),
        _ => None,
    }
}

/// ON constraints of a FROM item, nested joins first, in FROM order.
fn join_constraints(from: &TableWithJoins) -> Vec<&Expr> {
    fn factor<'e>(f: &'e TableFactor, out: &mut Vec<&'e Expr>) {
        if let TableFactor::NestedJoin {
            table_with_joins, ..
        } = f
        {
            collect(table_with_joins, out);
        }
    }
    fn collect<'e>(from: &'e TableWithJoins, out: &mut Vec<&'e Expr>) {
        factor(&from.relation, out);
        for join in &from.joins {
            factor(&join.relation, out);
            if let Some(expr) = join_constraint(join) {
                out.push(expr);
            }
        }
    }
    let mut out = Vec::new();
    collect(from, &mut out);
    out
}

/// The lambda argument of an array function call, if present.
pub(crate) fn lambda_arg(function: &Function) -> Option<&LambdaFunction> {
    function_args(function).into_iter().find_map(|e| match e {
        Expr::Lambda(lambda) => Some(lambda),
        _ => None,
    })
}

/// First parameter name of a lambda.
pub(crate) fn lambda_param(lambda: &LambdaFunction) -> Option<&str> {
    match &lambda.params {
        OneOrManyWithParens::One(ident) => Some(ident.value.as_str()),
        OneOrManyWithParens::Many(idents) => idents.first().map(|i| i.value.as_str()),
    }
}
