//! Runtime registry of service constructors keyed by kind and identifier.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use strata_core::{
    Consumer, Context, Filter, Producer, Service, ServiceFactory, ServiceKind, Transition,
};

use crate::error::PluginError;
use crate::metadata::ServiceMetadata;

/// Builds a service from a context and an optional argument (usually a
/// resource name).
pub type Constructor =
    Arc<dyn Fn(&Context, Option<&str>) -> strata_core::Result<Service> + Send + Sync>;

struct Registration {
    constructor: Constructor,
    metadata: ServiceMetadata,
}

/// Registry of constructors. Shared by reference; registration takes `&self`.
#[derive(Default)]
pub struct Repository {
    entries: RwLock<HashMap<(ServiceKind, String), Registration>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. A later registration under the same kind
    /// and identifier replaces the earlier one.
    pub fn register<F>(&self, kind: ServiceKind, id: &str, constructor: F, metadata: Option<ServiceMetadata>)
    where
        F: Fn(&Context, Option<&str>) -> strata_core::Result<Service> + Send + Sync + 'static,
    {
        let metadata = metadata.unwrap_or_else(|| ServiceMetadata::new(kind, id));
        let registration = Registration {
            constructor: Arc::new(constructor),
            metadata,
        };
        let replaced = self
            .entries
            .write()
            .insert((kind, id.to_string()), registration)
            .is_some();
        if replaced {
            warn!(%kind, id, "service registration replaced");
        } else {
            debug!(%kind, id, "service registered");
        }
    }

    pub fn contains(&self, kind: ServiceKind, id: &str) -> bool {
        self.entries.read().contains_key(&(kind, id.to_string()))
    }

    /// Construct a service. The new service's `service` property holds `id`
    /// and, when given, its `resource` property holds `arg`.
    pub fn create(
        &self,
        kind: ServiceKind,
        id: &str,
        ctx: &Context,
        arg: Option<&str>,
    ) -> Result<Service, PluginError> {
        let constructor = self
            .entries
            .read()
            .get(&(kind, id.to_string()))
            .map(|r| Arc::clone(&r.constructor))
            .ok_or_else(|| PluginError::NotFound {
                kind,
                id: id.to_string(),
            })?;

        let construction = |reason: String| PluginError::Construction {
            kind,
            id: id.to_string(),
            reason,
        };
        let service = constructor(ctx, arg).map_err(|e| construction(e.to_string()))?;
        if service.kind() != kind && !(kind == ServiceKind::Producer && service.kind().is_producer()) {
            return Err(construction(format!("constructor built a {}", service.kind())));
        }
        service
            .set("service", id)
            .map_err(|e| construction(e.to_string()))?;
        if let Some(resource) = arg {
            service
                .set("resource", resource)
                .map_err(|e| construction(e.to_string()))?;
        }
        info!(%kind, id, resource = arg.unwrap_or(""), "service created");
        Ok(service)
    }

    pub fn producer(&self, id: &str, ctx: &Context, arg: Option<&str>) -> Result<Producer, PluginError> {
        let service = self.create(ServiceKind::Producer, id, ctx, arg)?;
        Producer::from_service(service).ok_or_else(|| mismatch(ServiceKind::Producer, id))
    }

    pub fn filter(&self, id: &str, ctx: &Context, arg: Option<&str>) -> Result<Filter, PluginError> {
        let service = self.create(ServiceKind::Filter, id, ctx, arg)?;
        Filter::from_service(service).ok_or_else(|| mismatch(ServiceKind::Filter, id))
    }

    pub fn transition(&self, id: &str, ctx: &Context, arg: Option<&str>) -> Result<Transition, PluginError> {
        let service = self.create(ServiceKind::Transition, id, ctx, arg)?;
        Transition::from_service(service).ok_or_else(|| mismatch(ServiceKind::Transition, id))
    }

    pub fn consumer(&self, id: &str, ctx: &Context, arg: Option<&str>) -> Result<Consumer, PluginError> {
        let service = self.create(ServiceKind::Consumer, id, ctx, arg)?;
        Consumer::from_service(service).ok_or_else(|| mismatch(ServiceKind::Consumer, id))
    }

    /// Registered identifiers of `kind`, sorted.
    pub fn list(&self, kind: ServiceKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn metadata(&self, kind: ServiceKind, id: &str) -> Option<ServiceMetadata> {
        self.entries
            .read()
            .get(&(kind, id.to_string()))
            .map(|r| r.metadata.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn mismatch(kind: ServiceKind, id: &str) -> PluginError {
    PluginError::Construction {
        kind,
        id: id.to_string(),
        reason: format!("service does not expose the {kind} interface"),
    }
}

impl ServiceFactory for Repository {
    fn create(
        &self,
        kind: ServiceKind,
        id: &str,
        ctx: &Context,
        arg: Option<&str>,
    ) -> strata_core::Result<Service> {
        Ok(Repository::create(self, kind, id, ctx, arg)?)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("services", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Frame, FilterImpl, Position, ProducerImpl, StrataError};

    struct Still;

    impl ProducerImpl for Still {
        fn produce(&self, producer: &Producer, position: Position) -> strata_core::Result<Frame> {
            Ok(Frame::from_context(producer.context(), position))
        }
    }

    struct Passthrough;

    impl FilterImpl for Passthrough {
        fn process(&self, _filter: &Filter, frame: Frame) -> strata_core::Result<Frame> {
            Ok(frame)
        }
    }

    fn repository() -> Repository {
        let repo = Repository::new();
        repo.register(
            ServiceKind::Producer,
            "still",
            |ctx, _| Ok(Producer::new(ctx, Still).into_service()),
            None,
        );
        repo.register(
            ServiceKind::Filter,
            "pass",
            |ctx, _| Ok(Filter::new(ctx, Passthrough).into_service()),
            Some(ServiceMetadata::new(ServiceKind::Filter, "pass").with_title("Pass through")),
        );
        repo.register(
            ServiceKind::Filter,
            "broken",
            |_, _| Err(StrataError::Service("no device".into())),
            None,
        );
        repo.register(
            ServiceKind::Transition,
            "liar",
            |ctx, _| Ok(Filter::new(ctx, Passthrough).into_service()),
            None,
        );
        repo
    }

    #[test]
    fn test_create_sets_identity() {
        let ctx = Context::default();
        let repo = repository();
        let producer = repo.producer("still", &ctx, Some("clip.dv")).unwrap();
        assert_eq!(producer.get("service").as_deref(), Some("still"));
        assert_eq!(producer.get("resource").as_deref(), Some("clip.dv"));
        let filter = repo.filter("pass", &ctx, None).unwrap();
        assert!(!filter.exists("resource"));
    }

    #[test]
    fn test_failures() {
        let ctx = Context::default();
        let repo = repository();
        assert!(matches!(
            repo.create(ServiceKind::Producer, "nope", &ctx, None),
            Err(PluginError::NotFound { .. })
        ));
        assert!(matches!(
            repo.filter("broken", &ctx, None),
            Err(PluginError::Construction { .. })
        ));
        assert!(matches!(
            repo.transition("liar", &ctx, None),
            Err(PluginError::Construction { .. })
        ));
        let factory: &dyn ServiceFactory = &repo;
        assert!(matches!(
            factory.create(ServiceKind::Consumer, "nope", &ctx, None),
            Err(StrataError::Factory(_))
        ));
    }

    #[test]
    fn test_listing_and_metadata() {
        let repo = repository();
        assert_eq!(repo.list(ServiceKind::Filter), ["broken", "pass"]);
        assert_eq!(repo.metadata(ServiceKind::Filter, "pass").unwrap().title, "Pass through");
        assert_eq!(repo.metadata(ServiceKind::Producer, "still").unwrap().title, "still");
        assert!(repo.metadata(ServiceKind::Consumer, "still").is_none());
        repo.register(ServiceKind::Producer, "still", |ctx, _| Ok(Producer::new(ctx, Still).into_service()), None);
        assert_eq!(repo.len(), 4);
    }
}
