//! Mutable walk that visits nodes in the same order as the statement analyzer.
//!
//! SELECT and table factor ordinals line up with the ones recorded in the
//! [`Analysis`](crate::analyzer::Analysis) of the same statement text.

use sqlparser::ast::{
    Expr, GroupByExpr, Join, JoinConstraint, JoinOperator, Query, Select, SelectItem, SetExpr,
    TableFactor, TableWithJoins,
};

use crate::error::Result;
use crate::sql::walk::{children_mut, dotted_path, ChildMut};

/// Callbacks invoked by [`walk_query`].
pub(crate) trait RewriteHooks {
    /// Called for every table factor after its subtree has been walked.
    fn table_factor(&mut self, _ordinal: usize, _factor: &mut TableFactor) -> Result<()> {
        Ok(())
    }

    /// Called before descending into an expression. Returning `true` stops the descent.
    fn expression(&mut self, _select: usize, _expr: &mut Expr) -> Result<bool> {
        Ok(false)
    }

    /// Called for every SELECT after all its clauses have been walked.
    fn select(&mut self, _ordinal: usize, _select: &mut Select) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn walk_query(query: &mut Query, hooks: &mut dyn RewriteHooks) -> Result<()> {
    let mut walker = Walker {
        hooks,
        next_select: 0,
        next_factor: 0,
    };
    walker.query(query)
}

struct Walker<'h> {
    hooks: &'h mut dyn RewriteHooks,
    next_select: usize,
    next_factor: usize,
}

impl Walker<'_> {
    fn query(&mut self, query: &mut Query) -> Result<()> {
        if let Some(with) = &mut query.with {
            for cte in &mut with.cte_tables {
                self.query(&mut cte.query)?;
            }
        }
        let ordinal = self.set_expr(&mut query.body)?;
        if let (Some(order_by), Some(ordinal)) = (&mut query.order_by, ordinal) {
            for item in &mut order_by.exprs {
                self.expr(&mut item.expr, ordinal)?;
            }
        }
        Ok(())
    }

    fn set_expr(&mut self, body: &mut SetExpr) -> Result<Option<usize>> {
        match body {
            SetExpr::Select(select) => self.select(select).map(Some),
            SetExpr::Query(query) => {
                self.query(query)?;
                Ok(None)
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left)?;
                self.set_expr(right)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn select(&mut self, select: &mut Select) -> Result<usize> {
        let ordinal = self.next_select;
        self.next_select += 1;

        for from in &mut select.from {
            self.table_with_joins(from)?;
        }
        for from in &mut select.from {
            for constraint in join_constraints_mut(from) {
                self.expr(constraint, ordinal)?;
            }
        }
        for item in &mut select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    self.expr(expr, ordinal)?
                }
                _ => {}
            }
        }
        if let Some(selection) = &mut select.selection {
            self.expr(selection, ordinal)?;
        }
        if let GroupByExpr::Expressions(exprs, _) = &mut select.group_by {
            for expr in exprs {
                self.expr(expr, ordinal)?;
            }
        }
        if let Some(having) = &mut select.having {
            self.expr(having, ordinal)?;
        }
        self.hooks.select(ordinal, select)?;
        Ok(ordinal)
    }

    fn table_with_joins(&mut self, from: &mut TableWithJoins) -> Result<()> {
        self.factor(&mut from.relation)?;
        for join in &mut from.joins {
            self.factor(&mut join.relation)?;
        }
        Ok(())
    }

    fn factor(&mut self, factor: &mut TableFactor) -> Result<()> {
        let ordinal = self.next_factor;
        self.next_factor += 1;
        match factor {
            TableFactor::Derived { subquery, .. } => self.query(subquery)?,
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins)?,
            _ => {}
        }
        self.hooks.table_factor(ordinal, factor)
    }

    fn expr(&mut self, expr: &mut Expr, select: usize) -> Result<()> {
        if self.hooks.expression(select, expr)? {
            return Ok(());
        }
        if dotted_path(expr).is_some() || matches!(expr, Expr::Lambda(_)) {
            return Ok(());
        }
        for child in children_mut(expr) {
            match child {
                ChildMut::Expr(e) => self.expr(e, select)?,
                ChildMut::Query(q) => self.query(q)?,
            }
        }
        Ok(())
    }
}

fn join_constraints_mut(from: &mut TableWithJoins) -> Vec<&mut Expr> {
    fn factor<'e>(f: &'e mut TableFactor, out: &mut Vec<&'e mut Expr>) {
        if let TableFactor::NestedJoin {
            table_with_joins, ..
        } = f
        {
            collect(table_with_joins, out);
        }
    }
    fn collect<'e>(from: &'e mut TableWithJoins, out: &mut Vec<&'e mut Expr>) {
        factor(&mut from.relation, out);
        for join in &mut from.joins {
            let Join {
                relation,
                join_operator,
                ..
            } = join;
            factor(relation, out);
            if let Some(expr) = constraint_of(join_operator) {
                out.push(expr);
            }
        }
    }
    fn constraint_of(op: &mut JoinOperator) -> Option<&mut Expr> {
        match op {
            JoinOperator::Inner(JoinConstraint::On(expr))
            | JoinOperator::LeftOuter(JoinConstraint::On(expr))
            | JoinOperator::RightOuter(JoinConstraint::On(expr))
            | JoinOperator::FullOuter(JoinConstraint::On(expr)) => Some(expr),
            _ => None,
        }
    }
    let mut out = Vec::new();
    collect(from, &mut out);
    out
}
