//! Strata Effects - Reference services
//!
//! Small, complete implementations of each service kind:
//! - `colour` producer
//! - `brightness` and `gamma` filters
//! - `mix` transition
//! - `null` consumer
//!
//! [`register`] installs all of them into a [`Repository`].

pub mod brightness;
pub mod colour;
pub mod gamma;
pub mod mix;
pub mod null;

pub use brightness::BrightnessFilter;
pub use colour::{parse_colour, ColourProducer};
pub use gamma::GammaFilter;
pub use mix::MixTransition;
pub use null::NullConsumer;

use strata_core::ServiceKind;
use strata_plugin::{ParameterMetadata, ParameterType, Repository, ServiceMetadata};
use tracing::info;

/// Register every reference service with `repo`.
pub fn register(repo: &Repository) {
    repo.register(
        ServiceKind::Producer,
        "colour",
        |ctx, arg| Ok(ColourProducer::create(ctx, arg)?.into_service()),
        Some(
            ServiceMetadata::new(ServiceKind::Producer, "colour")
                .with_title("Colour")
                .with_description("A flat colour with silent audio")
                .with_parameter(
                    ParameterMetadata::new("colour", ParameterType::Colour).with_default("black"),
                ),
        ),
    );
    repo.register(
        ServiceKind::Filter,
        "brightness",
        |ctx, arg| Ok(BrightnessFilter::create(ctx, arg)?.into_service()),
        Some(
            ServiceMetadata::new(ServiceKind::Filter, "brightness")
                .with_title("Brightness")
                .with_parameter(
                    ParameterMetadata::new("start", ParameterType::Float)
                        .with_default("1")
                        .with_range(0.0, 15.0),
                )
                .with_parameter(ParameterMetadata::new("end", ParameterType::Float).with_range(0.0, 15.0)),
        ),
    );
    repo.register(
        ServiceKind::Filter,
        "gamma",
        |ctx, arg| Ok(GammaFilter::create(ctx, arg)?.into_service()),
        Some(
            ServiceMetadata::new(ServiceKind::Filter, "gamma")
                .with_title("Gamma")
                .with_parameter(
                    ParameterMetadata::new("gamma", ParameterType::Float)
                        .with_default("1")
                        .with_range(0.01, 10.0),
                ),
        ),
    );
    repo.register(
        ServiceKind::Transition,
        "mix",
        |ctx, arg| Ok(MixTransition::create(ctx, arg)?.into_service()),
        Some(
            ServiceMetadata::new(ServiceKind::Transition, "mix")
                .with_title("Mix")
                .with_description("Crossfade of image and audio")
                .with_parameter(ParameterMetadata::new("start", ParameterType::Float).with_range(0.0, 1.0))
                .with_parameter(ParameterMetadata::new("end", ParameterType::Float).with_range(0.0, 1.0)),
        ),
    );
    repo.register(
        ServiceKind::Consumer,
        "null",
        |ctx, arg| Ok(NullConsumer::create(ctx, arg)?.into_service()),
        Some(ServiceMetadata::new(ServiceKind::Consumer, "null").with_title("Null")),
    );
    info!(services = repo.len(), "reference services registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Context;

    #[test]
    fn test_register_installs_every_kind() {
        let repo = Repository::new();
        register(&repo);
        assert_eq!(repo.list(ServiceKind::Filter), ["brightness", "gamma"]);
        let ctx = Context::default();
        let colour = repo.producer("colour", &ctx, Some("#ff0000")).unwrap();
        assert_eq!(colour.get("colour").as_deref(), Some("#ff0000"));
        assert!(repo.transition("mix", &ctx, None).is_ok());
        assert!(repo.consumer("null", &ctx, None).is_ok());
        assert_eq!(
            repo.metadata(ServiceKind::Filter, "gamma").unwrap().parameter("gamma").unwrap().default.as_deref(),
            Some("1")
        );
    }
}
