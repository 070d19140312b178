//! CTEs synthesized for relationship paths and array functions in queries.
//!
//! Every CTE built here is keyed by `bk`, the key of the row the path starts
//! from, so the main query joins it back with `<relation>.<pk> = cte.bk`.
//! Hops chain: the CTE for `a.b.c` reads the CTE for `a.b`.

use indexmap::IndexMap;
use sqlparser::ast::{Expr, Ident, Value};

use super::model_sql::condition_sql;
use super::registry::CteRegistry;
use crate::analyzer::{lambda_arg, lambda_param, ArrayCall, ArrayFunction, ArrayInput, PathUsage};
use crate::error::{Error, Result};
use crate::mdl::{Catalog, Model};
use crate::sql::parse::{parse_expr, quote_ident, SqlDialect};
use crate::sql::walk::{function_args, function_name, replace_paths, PathPart};

const KEY: &str = "\"bk\"";
const FUNCTION_COLUMN: &str = "\"f1\"";

/// Where the main query reads a rewritten path from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CteTarget {
    pub cte: String,
    /// Name the CTE is joined under. Differs from `cte` when several relations
    /// of one SELECT read the same CTE.
    pub alias: String,
    /// Column read from the CTE, as SQL.
    pub column: String,
    /// Relation the path starts from, as SQL.
    pub qualifier: String,
    /// Quoted primary key of the starting model.
    pub base_key: String,
}

impl CteTarget {
    fn new(cte: String, column: String, qualifier: &str, base_key: String) -> Self {
        Self {
            alias: cte.clone(),
            cte,
            column,
            qualifier: qualifier.to_string(),
            base_key,
        }
    }

    /// Expression that replaces the path in the main query.
    pub fn replacement(&self, dialect: SqlDialect) -> Result<Expr> {
        parse_expr(dialect, &format!("{}.{}", quote_ident(&self.alias), self.column))
    }

    /// Join that attaches the CTE to the originating relation.
    pub fn join_sql(&self) -> String {
        let alias = quote_ident(&self.alias);
        let relation = if self.alias == self.cte {
            alias.clone()
        } else {
            format!("{} AS {}", quote_ident(&self.cte), alias)
        };
        format!(
            "LEFT JOIN {relation} ON {q}.{pk} = {alias}.{KEY}",
            q = self.qualifier,
            pk = self.base_key,
        )
    }
}

/// Relation a hop reads from.
struct Source {
    relation: String,
    key: String,
}

/// An array-valued CTE: its name and the column holding the array.
struct ArrayCte {
    name: String,
    column: String,
    signature: String,
}

pub(crate) struct RelationshipCtes<'a> {
    catalog: &'a Catalog,
    dialect: SqlDialect,
    registry: CteRegistry,
    ctes: IndexMap<String, String>,
}

impl<'a> RelationshipCtes<'a> {
    pub fn new(catalog: &'a Catalog, dialect: SqlDialect, prefix: &str) -> Self {
        Self {
            catalog,
            dialect,
            registry: CteRegistry::new(prefix),
            ctes: IndexMap::new(),
        }
    }

    /// Synthesized CTEs as `(name, body)` in creation order.
    pub fn into_ctes(self) -> Vec<(String, String)> {
        self.ctes.into_iter().collect()
    }

    fn model(&self, name: &str) -> Result<&'a Model> {
        self.catalog
            .model(name)
            .ok_or_else(|| Error::not_found(format!("model {} not found", name)))
    }

    fn primary_key(&self, model: &str, usage: &str) -> Result<String> {
        self.model(model)?
            .primary_key
            .as_deref()
            .map(quote_ident)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "primary key of model {} is required by {}",
                    model, usage
                ))
            })
    }

    /// Columns of `model` projected from alias `t`.
    fn target_columns(&self, model: &str) -> Result<String> {
        Ok(self
            .model(model)?
            .columns
            .iter()
            .filter(|c| !c.is_relationship())
            .map(|c| format!("t.{q} AS {q}, ", q = quote_ident(&c.name)))
            .collect())
    }

    fn define(&mut self, signature: &str, body: impl FnOnce(&Self) -> Result<String>) -> Result<String> {
        let name = self.registry.name_for(signature);
        if !self.ctes.contains_key(&name) {
            let sql = body(self)?;
            self.ctes.insert(name.clone(), sql);
        }
        Ok(name)
    }

    /// CTEs for every prefix of `usage`, returning how the main query reads the full path.
    ///
    /// A path that ends on a single row without reading a field, such as
    /// `p.books[1]`, reads the primary key of that row.
    pub fn path(&mut self, usage: &PathUsage) -> Result<CteTarget> {
        let base_key = self.primary_key(&usage.base_model, &usage.key)?;
        let (name, array_column) = self.hops(usage, &base_key)?;

        let column = match array_column {
            Some(column) if usage.terminal.is_empty() => column,
            _ if !usage.terminal.is_empty() => usage.terminal.join("."),
            _ => {
                let target = usage
                    .last_step()
                    .map(|s| s.relationship.target().to_string())
                    .unwrap_or_default();
                self.primary_key(&target, &usage.key)?
            }
        };
        Ok(CteTarget::new(name, column, &usage.qualifier, base_key))
    }

    /// Build hop CTEs. Returns the last CTE and, for an array result, its column.
    fn hops(&mut self, usage: &PathUsage, base_key: &str) -> Result<(String, Option<String>)> {
        let mut source = Source {
            relation: quote_ident(&usage.base_model),
            key: base_key.to_string(),
        };
        let mut last = None;

        for (k, step) in usage.steps.iter().enumerate() {
            let relationship = &step.relationship;
            let target = relationship.target().to_string();

            if step.is_to_many() {
                let array = self.array_hop(usage, k, &source)?;
                let Some(index) = &step.index else {
                    return Ok((array.name, Some(array.column)));
                };
                let pk = self.primary_key(&target, &usage.key)?;
                let name = self.define(&usage.signature(k + 1), |this| {
                    Ok(format!(
                        "SELECT {cols}s.{KEY} AS {KEY} FROM {arr} AS s LEFT JOIN {t} AS t ON s.{col}[{index}] = t.{pk}",
                        cols = this.target_columns(&target)?,
                        arr = quote_ident(&array.name),
                        t = quote_ident(&target),
                        col = array.column,
                    ))
                })?;
                source = Source {
                    relation: quote_ident(&name),
                    key: KEY.to_string(),
                };
                last = Some(name);
                continue;
            }

            let name = self.define(&usage.signature(k + 1), |this| {
                let condition = condition_sql(
                    this.dialect,
                    relationship,
                    &Ident::new("s"),
                    &Ident::new("t"),
                )?;
                Ok(format!(
                    "SELECT {cols}s.{key} AS {KEY} FROM {src} AS s LEFT JOIN {t} AS t ON {condition}",
                    cols = this.target_columns(&target)?,
                    key = source.key,
                    src = source.relation,
                    t = quote_ident(&target),
                ))
            })?;
            source = Source {
                relation: quote_ident(&name),
                key: KEY.to_string(),
            };
            last = Some(name);
        }

        last.map(|name| (name, None))
            .ok_or_else(|| Error::malformed(format!("not a relationship path: {}", usage.key)))
    }

    /// Aggregated CTE holding the target keys of the to-many hop `k`.
    fn array_hop(&mut self, usage: &PathUsage, k: usize, source: &Source) -> Result<ArrayCte> {
        let step = &usage.steps[k];
        let relationship = &step.relationship;
        let target = relationship.target();
        let pk = self.primary_key(target, &usage.key)?;
        let signature = format!("{}.{}", usage.signature(k), step.column);
        let column = quote_ident(&step.column);

        let order_by = if relationship.sort_keys.is_empty() {
            format!("t.{} ASC", pk)
        } else {
            relationship
                .sort_keys
                .iter()
                .map(|key| format!("t.{} {}", quote_ident(&key.name), key.ordering.as_sql()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let name = self.define(&signature, |this| {
            let condition =
                condition_sql(this.dialect, relationship, &Ident::new("s"), &Ident::new("t"))?;
            Ok(format!(
                "SELECT s.{key} AS {KEY}, array_agg(t.{pk} ORDER BY {order_by}) FILTER (WHERE t.{pk} IS NOT NULL) AS {column} \
                 FROM {src} AS s LEFT JOIN {t} AS t ON {condition} GROUP BY 1",
                key = source.key,
                src = source.relation,
                t = quote_ident(target),
            ))
        })?;
        Ok(ArrayCte {
            name,
            column,
            signature,
        })
    }

    /// CTE computing an array function per originating row.
    pub fn array_call(&mut self, call: &ArrayCall) -> Result<CteTarget> {
        let root = call.root_path();
        let base_key = self.primary_key(&root.base_model, &call.key)?;
        let cte = self.function_cte(call, &base_key)?;
        Ok(CteTarget::new(
            cte.name,
            FUNCTION_COLUMN.to_string(),
            &root.qualifier,
            base_key,
        ))
    }

    fn function_cte(&mut self, call: &ArrayCall, base_key: &str) -> Result<ArrayCte> {
        let input = match &call.input {
            ArrayInput::Relationship(path) => {
                let (name, column) = self.hops(path, base_key)?;
                let column = column.ok_or_else(|| {
                    Error::malformed(format!("array function input is not an array: {}", call.key))
                })?;
                ArrayCte {
                    name,
                    column,
                    signature: path.signature(path.steps.len()),
                }
            }
            ArrayInput::Call(inner) => self.function_cte(inner, base_key)?,
        };

        let args = function_args(&call.call);
        let rest: Vec<String> = args.iter().skip(1).map(|a| a.to_string()).collect();
        let signature = format!(
            "{}({}, {})",
            function_name(&call.call),
            input.signature,
            rest.join(", ")
        );

        let element_model = call.input_element_model();
        let element_pk = match &element_model {
            Some(model) => Some(self.primary_key(model, &call.key)?),
            None => None,
        };
        let element = match &element_pk {
            Some(pk) => format!("t.{}", pk),
            None => "u.uc".to_string(),
        };

        let input_sql = quote_ident(&input.name);
        let unnest = format!(
            "{input_sql} AS s CROSS JOIN UNNEST(s.{col}) AS u(uc){join}",
            col = input.column,
            join = match (&element_model, &element_pk) {
                (Some(model), Some(pk)) =>
                    format!(" LEFT JOIN {} AS t ON u.uc = t.{}", quote_ident(model), pk),
                _ => String::new(),
            },
        );

        let item = match call.function {
            ArrayFunction::Transform => {
                format!("array_agg({})", self.lambda_body(call, &element, element_pk.is_some())?)
            }
            ArrayFunction::Filter => format!(
                "array_agg({element}) FILTER (WHERE {})",
                self.lambda_body(call, &element, element_pk.is_some())?
            ),
            ArrayFunction::ArraySort => {
                if element_pk.is_none() {
                    return Err(Error::unsupported(format!(
                        "array_sort needs an array of model rows: {}",
                        call.key
                    )));
                }
                let (column, ordering) = sort_args(&args)?;
                format!("array_agg({element} ORDER BY t.{} {})", quote_ident(&column), ordering)
            }
            ArrayFunction::Aggregate(op) => format!("{}({})", op, element),
            ArrayFunction::Slice => {
                if args.len() != 3 {
                    return Err(Error::malformed(format!(
                        "slice function should have 3 arguments: {}",
                        call.key
                    )));
                }
                let name = self.define(&signature, |_| {
                    Ok(format!(
                        "SELECT s.{KEY} AS {KEY}, array_slice(s.{col}, {from}, {to}) AS {FUNCTION_COLUMN} FROM {input_sql} AS s",
                        col = input.column,
                        from = args[1],
                        to = args[2],
                    ))
                })?;
                return Ok(ArrayCte {
                    name,
                    column: FUNCTION_COLUMN.to_string(),
                    signature,
                });
            }
        };

        let name = self.define(&signature, |_| {
            Ok(format!(
                "SELECT s.{KEY} AS {KEY}, {item} AS {FUNCTION_COLUMN} FROM {unnest} GROUP BY 1"
            ))
        })?;
        Ok(ArrayCte {
            name,
            column: FUNCTION_COLUMN.to_string(),
            signature,
        })
    }

    /// Lambda body with its parameter bound to the unnested element.
    fn lambda_body(&self, call: &ArrayCall, element: &str, has_model: bool) -> Result<String> {
        let lambda = lambda_arg(&call.call).ok_or_else(|| {
            Error::malformed(format!(
                "{} expects a lambda as its second argument",
                function_name(&call.call)
            ))
        })?;
        let param = lambda_param(lambda).unwrap_or_default().to_string();
        let element = parse_expr(self.dialect, element)?;
        let mut body = (*lambda.body).clone();
        let mut failure = None;
        replace_paths(&mut body, &mut |parts| {
            let [PathPart::Name(first), rest @ ..] = parts else {
                return None;
            };
            if first.value != param {
                return None;
            }
            if rest.is_empty() {
                return Some(element.clone());
            }
            if !has_model {
                failure.get_or_insert_with(|| {
                    Error::unsupported(format!(
                        "field access on a non-model array element: {}",
                        call.key
                    ))
                });
                return None;
            }
            let mut idents = vec![Ident::new("t")];
            for part in rest {
                match part {
                    PathPart::Name(ident) => idents.push(ident.clone()),
                    PathPart::Index(_) => return None,
                }
            }
            Some(Expr::CompoundIdentifier(idents))
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(body.to_string()),
        }
    }
}

/// Column and direction of an `array_sort(arr, column, ASC|DESC)` call.
fn sort_args(args: &[&Expr]) -> Result<(String, &'static str)> {
    let column = match args.get(1) {
        Some(Expr::Identifier(ident)) => ident.value.clone(),
        Some(Expr::Value(Value::SingleQuotedString(s))) => s.clone(),
        other => {
            return Err(Error::malformed(format!(
                "array_sort expects a column name, found {}",
                other.map(|e| e.to_string()).unwrap_or_default()
            )))
        }
    };
    let direction = match args.get(2) {
        None => "ASC".to_string(),
        Some(Expr::Identifier(ident)) => ident.value.to_ascii_uppercase(),
        Some(Expr::Value(Value::SingleQuotedString(s))) => s.to_ascii_uppercase(),
        Some(other) => other.to_string().to_ascii_uppercase(),
    };
    match direction.as_str() {
        "ASC" => Ok((column, "ASC")),
        "DESC" => Ok((column, "DESC")),
        other => Err(Error::malformed(format!(
            "array_sort ordering should be ASC or DESC, found {}",
            other
        ))),
    }
}
