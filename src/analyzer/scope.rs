//! Lexical scopes and field resolution.
//!
//! Scopes live in an arena and point at their parent by index, so walking
//! outward for CTE names is a plain loop that ends at the root.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::mdl::{CatalogSchemaTableName, Column};
use crate::sql::parse::quote_ident;

/// A column exposed by a relation in FROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Originating model, if the relation is model-backed.
    pub model: Option<CatalogSchemaTableName>,
    pub column: String,
    /// Output name.
    pub name: String,
    /// Alias of the relation as written, quotes included.
    pub relation_alias: Option<String>,
    /// Unquoted alias, used for matching qualified references.
    pub relation_alias_name: Option<String>,
    pub relationship: Option<String>,
    pub data_type: String,
}

impl Field {
    pub fn from_column(model: &CatalogSchemaTableName, column: &Column) -> Self {
        Self {
            model: Some(model.clone()),
            column: column.name.clone(),
            name: column.name.clone(),
            relation_alias: None,
            relation_alias_name: None,
            relationship: column.relationship.clone(),
            data_type: column.data_type.clone(),
        }
    }

    /// Same field seen through an aliased relation.
    pub fn with_alias(&self, alias_sql: &str, alias_name: &str) -> Self {
        Self {
            relation_alias: Some(alias_sql.to_string()),
            relation_alias_name: Some(alias_name.to_string()),
            ..self.clone()
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.table.as_str())
    }

    /// SQL qualifier for this field: the relation alias, else the quoted model name.
    pub fn qualifier(&self) -> Option<String> {
        self.relation_alias
            .clone()
            .or_else(|| self.model_name().map(quote_ident))
    }

    /// Whether `parts` (qualifier parts followed by the field name) can denote this field.
    ///
    /// An aliased relation only answers to its alias; an unaliased model answers to
    /// any suffix of its catalog-qualified name.
    pub fn can_resolve(&self, parts: &[String]) -> bool {
        let Some((name, prefix)) = parts.split_last() else {
            return false;
        };
        if *name != self.name {
            return false;
        }
        if prefix.is_empty() {
            return true;
        }
        if let Some(alias) = &self.relation_alias_name {
            return prefix.len() == 1 && prefix[0] == *alias;
        }
        match &self.model {
            Some(model) => {
                let full = [
                    model.catalog.as_str(),
                    model.schema.as_str(),
                    model.table.as_str(),
                ];
                prefix.len() <= full.len()
                    && full[full.len() - prefix.len()..]
                        .iter()
                        .zip(prefix)
                        .all(|(a, b)| *a == b.as_str())
            }
            None => false,
        }
    }
}

/// Ordered fields a relation exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationType {
    pub fields: Vec<Field>,
}

impl RelationType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn resolve(&self, parts: &[String]) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.can_resolve(parts)).collect()
    }

    /// Resolve to at most one field; more than one match is an ambiguity error.
    pub fn resolve_unique(&self, parts: &[String]) -> Result<Option<&Field>> {
        let mut matches = self.resolve(parts);
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(Error::ambiguous(&parts.join("."))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
struct ScopeData {
    parent: Option<ScopeId>,
    relation: RelationType,
    table_scope: bool,
    named_queries: HashSet<String>,
}

/// Arena of scopes created during one analysis.
#[derive(Debug)]
pub struct Scopes {
    scopes: Vec<ScopeData>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            scopes: vec![ScopeData::default()],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Pass-through child scope with no fields.
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(ScopeData {
            parent: Some(parent),
            ..Default::default()
        });
        ScopeId(self.scopes.len() - 1)
    }

    pub fn child_with_relation(
        &mut self,
        parent: ScopeId,
        relation: RelationType,
        table_scope: bool,
    ) -> ScopeId {
        let id = self.child(parent);
        let data = &mut self.scopes[id.0];
        data.relation = relation;
        data.table_scope = table_scope;
        id
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id.0].parent
    }

    pub fn relation(&self, id: ScopeId) -> &RelationType {
        &self.scopes[id.0].relation
    }

    pub fn is_table_scope(&self, id: ScopeId) -> bool {
        self.scopes[id.0].table_scope
    }

    pub fn add_named_query(&mut self, id: ScopeId, name: &str) {
        self.scopes[id.0].named_queries.insert(name.to_string());
    }

    /// Whether `name` is a WITH query visible from `id`, searching outward.
    pub fn is_named_query(&self, id: ScopeId, name: &str) -> bool {
        let mut current = Some(id);
        while let Some(scope) = current {
            let data = &self.scopes[scope.0];
            if data.named_queries.contains(name) {
                return true;
            }
            current = data.parent;
        }
        false
    }
}
