//! Request-data providers for injected parameters.
//!
//! # Responsibilities
//! - Hold providers in registration order, optionally under a name
//! - Find the provider for a (controller type, parameter type) pair once,
//!   when a route is compiled
//!
//! # Design Decisions
//! - Typed providers are matched by `TypeId`; dynamic providers answer a
//!   capability check instead
//! - The first compatible provider wins

use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::webapi::Controller;

/// Produces a `T` for parameters of controller `C`.
#[async_trait]
pub trait RequestDataProvider<C, T>: Send + Sync + 'static {
    async fn provide(&self, controller: &C, parameter: &str) -> Result<T, HandlerError>;
}

/// Produces values of any type it declares it can build.
#[async_trait]
pub trait DynamicDataProvider<C>: Send + Sync + 'static {
    /// Whether this provider can build values of `declared`.
    fn can_provide(&self, declared: TypeId, type_name: &'static str) -> bool;

    /// Build a value of `declared`. Must return exactly that type.
    async fn provide(
        &self,
        controller: &C,
        declared: TypeId,
        parameter: &str,
    ) -> Result<Box<dyn Any + Send>, HandlerError>;
}

/// Provider selected for a parameter.
pub(crate) enum ResolvedProvider<C, T> {
    Typed(Arc<dyn RequestDataProvider<C, T>>),
    Dynamic(Arc<dyn DynamicDataProvider<C>>),
}

enum Stored {
    /// An `Arc<dyn RequestDataProvider<C, T>>` producing `produces`.
    Typed {
        produces: TypeId,
        provider: Box<dyn Any + Send + Sync>,
    },
    /// An `Arc<dyn DynamicDataProvider<C>>`.
    Dynamic(Box<dyn Any + Send + Sync>),
}

struct Entry {
    name: Option<String>,
    controller: TypeId,
    stored: Stored,
}

/// Ordered provider list.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: Vec<Entry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C, T, P>(&mut self, provider: P)
    where
        C: Controller,
        T: Send + 'static,
        P: RequestDataProvider<C, T>,
    {
        self.push_typed::<C, T>(None, Arc::new(provider));
    }

    /// Register under `name`, selectable with `Param::inject_from`.
    pub fn register_named<C, T, P>(&mut self, name: impl Into<String>, provider: P)
    where
        C: Controller,
        T: Send + 'static,
        P: RequestDataProvider<C, T>,
    {
        self.push_typed::<C, T>(Some(name.into()), Arc::new(provider));
    }

    pub fn register_dynamic<C, P>(&mut self, provider: P)
    where
        C: Controller,
        P: DynamicDataProvider<C>,
    {
        let provider: Arc<dyn DynamicDataProvider<C>> = Arc::new(provider);
        self.entries.push(Entry {
            name: None,
            controller: TypeId::of::<C>(),
            stored: Stored::Dynamic(Box::new(provider)),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push_typed<C: Controller, T: Send + 'static>(
        &mut self,
        name: Option<String>,
        provider: Arc<dyn RequestDataProvider<C, T>>,
    ) {
        self.entries.push(Entry {
            name,
            controller: TypeId::of::<C>(),
            stored: Stored::Typed {
                produces: TypeId::of::<T>(),
                provider: Box::new(provider),
            },
        });
    }

    /// First provider that can bind a `T` parameter on controller `C`.
    /// With `name`, only providers registered under that name qualify.
    pub(crate) fn resolve<C: Controller, T: Send + 'static>(
        &self,
        name: Option<&str>,
    ) -> Option<ResolvedProvider<C, T>> {
        self.entries
            .iter()
            .filter(|e| e.controller == TypeId::of::<C>())
            .filter(|e| name.is_none() || e.name.as_deref() == name)
            .find_map(|e| match &e.stored {
                Stored::Typed { produces, provider } if *produces == TypeId::of::<T>() => provider
                    .downcast_ref::<Arc<dyn RequestDataProvider<C, T>>>()
                    .map(|p| ResolvedProvider::Typed(Arc::clone(p))),
                Stored::Typed { .. } => None,
                Stored::Dynamic(provider) => provider
                    .downcast_ref::<Arc<dyn DynamicDataProvider<C>>>()
                    .filter(|p| p.can_provide(TypeId::of::<T>(), std::any::type_name::<T>()))
                    .map(|p| ResolvedProvider::Dynamic(Arc::clone(p))),
            })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.entries.len())
            .finish()
    }
}
