//! Expression traversal helpers.
//!
//! `sqlparser` expressions are a large closed enum. These helpers expose the
//! direct children of the variants that can carry column references, in a
//! fixed order shared by the analyzer and the rewriters, so that both walks
//! visit nested subqueries in the same sequence.

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, Query, Subscript,
};

/// A direct child of an expression.
pub enum Child<'a> {
    Expr(&'a Expr),
    Query(&'a Query),
}

/// A direct child of an expression, mutably borrowed.
pub enum ChildMut<'a> {
    Expr(&'a mut Expr),
    Query(&'a mut Query),
}

/// Positional expression arguments of a function call. Named arguments are included;
/// wildcards are skipped.
pub fn function_args(function: &Function) -> Vec<&Expr> {
    match &function.args {
        FunctionArguments::List(list) => list
            .args
            .iter()
            .filter_map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e),
                FunctionArg::Named {
                    arg: FunctionArgExpr::Expr(e),
                    ..
                } => Some(e),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Mutable counterpart of [`function_args`].
pub fn function_args_mut(function: &mut Function) -> Vec<&mut Expr> {
    match &mut function.args {
        FunctionArguments::List(list) => list
            .args
            .iter_mut()
            .filter_map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e),
                FunctionArg::Named {
                    arg: FunctionArgExpr::Expr(e),
                    ..
                } => Some(e),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Lower-case, unqualified function name.
pub fn function_name(function: &Function) -> String {
    function
        .name
        .0
        .last()
        .map(|i| i.value.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn children(expr: &Expr) -> Vec<Child<'_>> {
    use Child::Expr as E;
    match expr {
        Expr::BinaryOp { left, right, .. }
        | Expr::AnyOp { left, right, .. }
        | Expr::AllOp { left, right, .. } => vec![E(left), E(right)],
        Expr::IsDistinctFrom(a, b) | Expr::IsNotDistinctFrom(a, b) => vec![E(a), E(b)],
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::Cast { expr, .. }
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr)
        | Expr::IsUnknown(expr)
        | Expr::IsNotUnknown(expr)
        | Expr::Collate { expr, .. }
        | Expr::Extract { expr, .. }
        | Expr::Ceil { expr, .. }
        | Expr::Floor { expr, .. }
        | Expr::Trim { expr, .. } => vec![E(expr)],
        Expr::AtTimeZone {
            timestamp,
            time_zone,
        } => vec![E(timestamp), E(time_zone)],
        Expr::Position { expr, r#in } => vec![E(expr), E(r#in)],
        Expr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            let mut out = vec![E(expr.as_ref())];
            out.extend(substring_from.iter().map(|e| E(e.as_ref())));
            out.extend(substring_for.iter().map(|e| E(e.as_ref())));
            out
        }
        Expr::InList { expr, list, .. } => {
            let mut out = vec![E(expr.as_ref())];
            out.extend(list.iter().map(E));
            out
        }
        Expr::InSubquery { expr, subquery, .. } => {
            vec![E(expr), Child::Query(subquery)]
        }
        Expr::Between {
            expr, low, high, ..
        } => vec![E(expr), E(low), E(high)],
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => vec![E(expr), E(pattern)],
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let mut out: Vec<Child<'_>> = operand.iter().map(|e| E(e.as_ref())).collect();
            for (condition, result) in conditions.iter().zip(results.iter()) {
                out.push(E(condition));
                out.push(E(result));
            }
            out.extend(else_result.iter().map(|e| E(e.as_ref())));
            out
        }
        Expr::Exists { subquery, .. } => vec![Child::Query(subquery)],
        Expr::Subquery(query) => vec![Child::Query(query)],
        Expr::Tuple(items) => items.iter().map(E).collect(),
        Expr::Array(array) => array.elem.iter().map(E).collect(),
        Expr::Function(function) => {
            let mut out: Vec<Child<'_>> = function_args(function).into_iter().map(E).collect();
            if let FunctionArguments::Subquery(query) = &function.args {
                out.push(Child::Query(query));
            }
            out.extend(function.filter.iter().map(|e| E(e.as_ref())));
            out
        }
        Expr::Subscript { expr, subscript } => {
            let mut out = vec![E(expr.as_ref())];
            if let Subscript::Index { index } = subscript.as_ref() {
                out.push(E(index));
            }
            out
        }
        Expr::CompositeAccess { expr, .. } => vec![E(expr)],
        Expr::Interval(interval) => vec![E(&interval.value)],
        _ => Vec::new(),
    }
}

pub fn children_mut(expr: &mut Expr) -> Vec<ChildMut<'_>> {
    use ChildMut::Expr as E;
    match expr {
        Expr::BinaryOp { left, right, .. }
        | Expr::AnyOp { left, right, .. }
        | Expr::AllOp { left, right, .. } => vec![E(left), E(right)],
        Expr::IsDistinctFrom(a, b) | Expr::IsNotDistinctFrom(a, b) => vec![E(a), E(b)],
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::Cast { expr, .. }
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr)
        | Expr::IsUnknown(expr)
        | Expr::IsNotUnknown(expr)
        | Expr::Collate { expr, .. }
        | Expr::Extract { expr, .. }
        | Expr::Ceil { expr, .. }
        | Expr::Floor { expr, .. }
        | Expr::Trim { expr, .. } => vec![E(expr)],
        Expr::AtTimeZone {
            timestamp,
            time_zone,
        } => vec![E(timestamp), E(time_zone)],
        Expr::Position { expr, r#in } => vec![E(expr), E(r#in)],
        Expr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            let mut out = vec![E(expr.as_mut())];
            out.extend(substring_from.iter_mut().map(|e| E(e.as_mut())));
            out.extend(substring_for.iter_mut().map(|e| E(e.as_mut())));
            out
        }
        Expr::InList { expr, list, .. } => {
            let mut out = vec![E(expr.as_mut())];
            out.extend(list.iter_mut().map(E));
            out
        }
        Expr::InSubquery { expr, subquery, .. } => {
            vec![E(expr), ChildMut::Query(subquery)]
        }
        Expr::Between {
            expr, low, high, ..
        } => vec![E(expr), E(low), E(high)],
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => vec![E(expr), E(pattern)],
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let mut out: Vec<ChildMut<'_>> = operand.iter_mut().map(|e| E(e.as_mut())).collect();
            for (condition, result) in conditions.iter_mut().zip(results.iter_mut()) {
                out.push(E(condition));
                out.push(E(result));
            }
            out.extend(else_result.iter_mut().map(|e| E(e.as_mut())));
            out
        }
        Expr::Exists { subquery, .. } => vec![ChildMut::Query(subquery)],
        Expr::Subquery(query) => vec![ChildMut::Query(query)],
        Expr::Tuple(items) => items.iter_mut().map(E).collect(),
        Expr::Array(array) => array.elem.iter_mut().map(E).collect(),
        Expr::Function(function) => {
            let Function { args, filter, .. } = function;
            let mut out: Vec<ChildMut<'_>> = Vec::new();
            match args {
                FunctionArguments::List(list) => {
                    for arg in list.args.iter_mut() {
                        match arg {
                            FunctionArg::Unnamed(FunctionArgExpr::Expr(e))
                            | FunctionArg::Named {
                                arg: FunctionArgExpr::Expr(e),
                                ..
                            } => out.push(E(e)),
                            _ => {}
                        }
                    }
                }
                FunctionArguments::Subquery(query) => out.push(ChildMut::Query(query)),
                FunctionArguments::None => {}
            }
            out.extend(filter.iter_mut().map(|e| E(e.as_mut())));
            out
        }
        Expr::Subscript { expr, subscript } => {
            let mut out = vec![E(expr.as_mut())];
            if let Subscript::Index { index } = subscript.as_mut() {
                out.push(E(index));
            }
            out
        }
        Expr::CompositeAccess { expr, .. } => vec![E(expr)],
        Expr::Interval(interval) => vec![E(&mut interval.value)],
        _ => Vec::new(),
    }
}

/// One segment of a dotted path such as `a.books[1].name`.
#[derive(Debug, Clone, PartialEq)]
pub enum PathPart {
    Name(Ident),
    Index(Expr),
}

impl PathPart {
    pub fn name(&self) -> Option<&str> {
        match self {
            PathPart::Name(ident) => Some(&ident.value),
            PathPart::Index(_) => None,
        }
    }
}

/// Decompose an identifier, dereference or subscript chain into its parts.
pub fn dotted_path(expr: &Expr) -> Option<Vec<PathPart>> {
    match expr {
        Expr::Identifier(ident) => Some(vec![PathPart::Name(ident.clone())]),
        Expr::CompoundIdentifier(idents) => {
            Some(idents.iter().cloned().map(PathPart::Name).collect())
        }
        Expr::Subscript { expr, subscript } => match subscript.as_ref() {
            Subscript::Index { index } => {
                let mut parts = dotted_path(expr)?;
                parts.push(PathPart::Index(index.clone()));
                Some(parts)
            }
            _ => None,
        },
        Expr::CompositeAccess { expr, key } => {
            let mut parts = dotted_path(expr)?;
            parts.push(PathPart::Name(key.clone()));
            Some(parts)
        }
        _ => None,
    }
}

/// Text form of path parts: names joined with `.`, indexes as `[expr]`.
pub fn path_text(parts: &[PathPart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            PathPart::Name(ident) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(&ident.value);
            }
            PathPart::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Text form of path parts as SQL, keeping the original identifier quoting.
pub fn path_sql(parts: &[PathPart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            PathPart::Name(ident) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(&ident.to_string());
            }
            PathPart::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Call `f` on every dotted path in `expr` that is not nested inside a lambda or subquery.
pub fn for_each_path(expr: &Expr, f: &mut dyn FnMut(&Expr, Vec<PathPart>)) {
    if let Some(parts) = dotted_path(expr) {
        f(expr, parts);
        return;
    }
    if matches!(expr, Expr::Lambda(_)) {
        return;
    }
    for child in children(expr) {
        if let Child::Expr(e) = child {
            for_each_path(e, f);
        }
    }
}

/// Replace every dotted path for which `f` returns a new expression.
pub fn replace_paths(expr: &mut Expr, f: &mut dyn FnMut(&[PathPart]) -> Option<Expr>) {
    if let Some(parts) = dotted_path(expr) {
        if let Some(replacement) = f(&parts) {
            *expr = replacement;
        }
        return;
    }
    if matches!(expr, Expr::Lambda(_)) {
        return;
    }
    for child in children_mut(expr) {
        if let ChildMut::Expr(e) = child {
            replace_paths(e, f);
        }
    }
}
