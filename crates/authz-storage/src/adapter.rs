//! Casbin adapter over a [`FactStore`].
//!
//! [`FactAdapter`] lets a `casbin::Enforcer` persist through any fact store.
//! Only the `p` and `g` sections are supported. Store errors cross the casbin
//! boundary boxed inside `casbin::error::AdapterError` and can be recovered
//! with [`storage_error`].

use std::sync::Arc;

use async_trait::async_trait;
use authz_core::{Fact, FactKind, FactSet};
use casbin::error::AdapterError;
use casbin::{Adapter, Filter, Model};

use crate::filter::FactFilter;
use crate::traits::FactStore;
use crate::{Error, Result};

/// Casbin adapter backed by a shared [`FactStore`].
pub struct FactAdapter {
    store: Arc<dyn FactStore>,
    scope: Option<FactFilter>,
    filtered: bool,
}

impl FactAdapter {
    /// Adapter whose `load_policy` reads every stored fact.
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self {
            store,
            scope: None,
            filtered: false,
        }
    }

    /// Adapter whose `load_policy` only reads the rows matching `filter`.
    pub fn scoped(store: Arc<dyn FactStore>, filter: FactFilter) -> Self {
        Self {
            store,
            scope: Some(filter),
            filtered: false,
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }
}

impl std::fmt::Debug for FactAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactAdapter")
            .field("store", &self.store.name())
            .field("scope", &self.scope)
            .field("filtered", &self.filtered)
            .finish()
    }
}

/// Recovers the store error carried by a casbin adapter error, if any.
pub fn storage_error(err: casbin::Error) -> std::result::Result<Error, casbin::Error> {
    match err {
        casbin::Error::AdapterError(AdapterError(inner)) => match inner.downcast::<Error>() {
            Ok(e) => Ok(*e),
            Err(inner) => Err(casbin::Error::AdapterError(AdapterError(inner))),
        },
        other => Err(other),
    }
}

fn to_casbin(err: impl Into<Error>) -> casbin::Error {
    AdapterError(Box::new(err.into())).into()
}

fn kind_of(ptype: &str) -> casbin::Result<FactKind> {
    ptype.parse::<FactKind>().map_err(|_| {
        to_casbin(authz_core::Error::invalid_fact(format!(
            "unsupported policy type '{ptype}'"
        )))
    })
}

fn fact_of(ptype: &str, rule: &[String]) -> casbin::Result<Fact> {
    Fact::from_fields(kind_of(ptype)?, rule).map_err(to_casbin)
}

fn load_into(m: &mut dyn Model, facts: &FactSet) {
    for fact in facts.iter() {
        let sec = fact.kind().as_str();
        let rule = fact.fields().into_iter().map(str::to_string).collect();
        m.add_policy(sec, sec, rule);
    }
}

fn collect(m: &mut dyn Model) -> casbin::Result<FactSet> {
    let mut facts = FactSet::new();
    for kind in [FactKind::Policy, FactKind::Role] {
        let sec = kind.as_str();
        for rule in m.get_policy(sec, sec) {
            facts.insert(Fact::from_fields(kind, &rule).map_err(to_casbin)?);
        }
    }
    Ok(facts)
}

/// Translates casbin's positional filter for one section into a row filter.
fn section_filter(kind: FactKind, values: &[&str]) -> Result<FactFilter> {
    let mut filter = FactFilter::new().kind(kind);
    for (index, value) in values.iter().enumerate() {
        if !value.is_empty() {
            filter = filter.field(index, [*value])?;
        }
    }
    Ok(filter)
}

#[async_trait]
impl Adapter for FactAdapter {
    async fn load_policy(&mut self, m: &mut dyn Model) -> casbin::Result<()> {
        let facts = match &self.scope {
            None => {
                self.filtered = false;
                self.store.load_all().await.map_err(to_casbin)?
            }
            Some(filter) => {
                let loaded = self.store.load_filtered(filter).await.map_err(to_casbin)?;
                self.filtered = loaded.is_partial;
                loaded.facts
            }
        };
        tracing::debug!(
            store = self.store.name(),
            facts = facts.len(),
            filtered = self.filtered,
            "adapter loaded policy"
        );
        load_into(m, &facts);
        Ok(())
    }

    async fn load_filtered_policy<'a>(
        &mut self,
        m: &mut dyn Model,
        f: Filter<'a>,
    ) -> casbin::Result<()> {
        let mut partial = false;
        for (kind, values) in [(FactKind::Policy, &f.p), (FactKind::Role, &f.g)] {
            let filter = section_filter(kind, values).map_err(to_casbin)?;
            let loaded = self.store.load_filtered(&filter).await.map_err(to_casbin)?;
            partial |= values.iter().any(|v| !v.is_empty());
            load_into(m, &loaded.facts);
        }
        self.filtered = partial;
        Ok(())
    }

    async fn save_policy(&mut self, m: &mut dyn Model) -> casbin::Result<()> {
        let facts = collect(m)?;
        self.store.replace_all(&facts).await.map_err(to_casbin)
    }

    async fn clear_policy(&mut self) -> casbin::Result<()> {
        self.store
            .replace_all(&FactSet::new())
            .await
            .map_err(to_casbin)
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }

    async fn add_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> casbin::Result<bool> {
        let fact = fact_of(ptype, &rule)?;
        self.store.add_one(&fact).await.map_err(to_casbin)?;
        Ok(true)
    }

    async fn add_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        for rule in &rules {
            let fact = fact_of(ptype, rule)?;
            self.store.add_one(&fact).await.map_err(to_casbin)?;
        }
        Ok(true)
    }

    async fn remove_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> casbin::Result<bool> {
        let fact = fact_of(ptype, &rule)?;
        self.store.remove_one(&fact).await.map_err(to_casbin)?;
        Ok(true)
    }

    async fn remove_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        for rule in &rules {
            let fact = fact_of(ptype, rule)?;
            self.store.remove_one(&fact).await.map_err(to_casbin)?;
        }
        Ok(true)
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> casbin::Result<bool> {
        let kind = kind_of(ptype)?;
        let rows = self
            .store
            .remove_matching(kind, field_index, &field_values)
            .await
            .map_err(to_casbin)?;
        tracing::debug!(
            %kind,
            field_index,
            ?field_values,
            rows,
            "adapter removed matching rows"
        );
        Ok(true)
    }
}
