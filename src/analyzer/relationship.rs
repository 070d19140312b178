//! Relationship resolution for dotted paths inside single-entity expressions.
//!
//! Given the model an expression is declared on, each dotted path is split into
//! the relationships it walks and the terminal parts left after the last one.

use sqlparser::ast::{Expr, Ident};

use crate::error::{Error, Result};
use crate::mdl::{Catalog, Relationship};
use crate::sql::parse::quoted;
use crate::sql::walk::{for_each_path, replace_paths, PathPart};

/// Relationships walked by one dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInfo {
    /// Every name part of the path.
    pub parts: Vec<String>,
    /// Relationships in traversal order, each oriented from the current model.
    pub relationships: Vec<Relationship>,
    /// Parts after the last relationship.
    pub remaining: Vec<String>,
}

impl RelationshipInfo {
    /// Only paths that walk a relationship and then read a field are rewritten.
    pub fn needs_rewrite(&self) -> bool {
        !self.relationships.is_empty() && !self.remaining.is_empty()
    }

    /// Model reached after the last relationship.
    pub fn target_model(&self) -> Option<&str> {
        self.relationships.last().map(|r| r.target())
    }

    /// The column read on the target model, if any.
    pub fn terminal_column(&self) -> Option<&str> {
        self.remaining.first().map(String::as_str)
    }

    pub fn validate_to_one(&self) -> Result<()> {
        if self.relationships.iter().all(|r| r.join_type.is_to_one()) {
            Ok(())
        } else {
            Err(Error::invalid_relationship(
                "only to-one relationships are allowed inside a single-row expression",
            ))
        }
    }
}

/// Resolves dotted paths against relationship-valued columns of a model.
pub struct RelationshipResolver<'a> {
    catalog: &'a Catalog,
}

fn name_parts(parts: &[PathPart]) -> Option<Vec<String>> {
    parts
        .iter()
        .map(|p| p.name().map(str::to_string))
        .collect()
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Walk `parts` starting at `model`.
    pub fn resolve_path(&self, model: &str, parts: &[String]) -> Result<RelationshipInfo> {
        let mut current = model.to_string();
        let mut relationships = Vec::new();
        let mut consumed = 0;

        for part in parts {
            let Some(column) = self.catalog.relationship_column(&current, part) else {
                break;
            };
            let name = column.relationship.as_deref().unwrap_or_default();
            let relationship = self
                .catalog
                .relationship(name)
                .ok_or_else(|| Error::not_found(format!("relationship {} not found", name)))?;
            if self.catalog.model(&column.data_type).is_none() {
                return Err(Error::not_found(format!(
                    "model {} not found",
                    column.data_type
                )));
            }
            relationships.push(relationship.reverse_if_needed(&column.data_type));
            current = column.data_type.clone();
            consumed += 1;
        }

        Ok(RelationshipInfo {
            parts: parts.to_vec(),
            relationships,
            remaining: parts[consumed..].to_vec(),
        })
    }

    /// Every dotted path in `expr`, resolved against `model`.
    pub fn analyze(&self, expr: &Expr, model: &str) -> Result<Vec<RelationshipInfo>> {
        let mut paths = Vec::new();
        for_each_path(expr, &mut |_, parts| {
            if let Some(names) = name_parts(&parts) {
                paths.push(names);
            }
        });
        paths
            .iter()
            .map(|names| self.resolve_path(model, names))
            .collect()
    }

    /// Rewrite each relationship path in `expr` to `"<Target>".<remaining>`.
    ///
    /// With `to_one_only`, a to-many traversal on a path that gets rewritten is
    /// rejected before rewriting.
    pub fn rewrite(
        &self,
        expr: &mut Expr,
        model: &str,
        to_one_only: bool,
    ) -> Result<Vec<RelationshipInfo>> {
        let infos = self.analyze(expr, model)?;
        if to_one_only {
            for info in infos.iter().filter(|i| i.needs_rewrite()) {
                info.validate_to_one()?;
            }
        }

        let mut failure = None;
        replace_paths(expr, &mut |parts| {
            let names = name_parts(parts)?;
            match self.resolve_path(model, &names) {
                Ok(info) if info.needs_rewrite() => {
                    let mut idents = vec![quoted(info.target_model()?)];
                    let skip = parts.len() - info.remaining.len();
                    idents.extend(parts[skip..].iter().filter_map(|p| match p {
                        PathPart::Name(ident) => Some(ident.clone()),
                        PathPart::Index(_) => None,
                    }));
                    Some(Expr::CompoundIdentifier(idents))
                }
                Ok(_) => None,
                Err(e) => {
                    failure.get_or_insert(e);
                    None
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(infos),
        }
    }
}

/// Single identifier references of `expr` that are not part of a dotted path.
pub fn bare_identifiers(expr: &Expr) -> Vec<Ident> {
    let mut out = Vec::new();
    for_each_path(expr, &mut |node, _| {
        if let Expr::Identifier(ident) = node {
            out.push(ident.clone());
        }
    });
    out
}
