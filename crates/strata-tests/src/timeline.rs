//! Complete graphs: services from the repository assembled into a tractor
//! and played out through a consumer.

use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::{
    Context, Frame, ImageFormat, ImageRequest, Position, Properties, ServiceKind,
    CONSUMER_FRAME_SHOW,
};
use strata_effects::register;
use strata_plugin::{PluginError, Repository};
use strata_timeline::{Playlist, Tractor};

// ── Helpers ────────────────────────────────────────────────────

fn repository() -> Repository {
    let repo = Repository::new();
    register(&repo);
    repo
}

/// Track 0: black for 12 frames. Track 1: five red frames, a two frame
/// gap, then five blue frames. Red is darkened by a planted brightness
/// filter and blue fades in over black during 7..=11.
fn news_edit(repo: &Repository, ctx: &Context) -> (Tractor, Playlist) {
    let background = repo.producer("colour", ctx, Some("black")).unwrap();
    background.set_length(12).unwrap();
    let red = repo.producer("colour", ctx, Some("red")).unwrap();
    red.set_length(100).unwrap();
    let blue = repo.producer("colour", ctx, Some("blue")).unwrap();
    blue.set_length(100).unwrap();

    let overlay = Playlist::new(ctx);
    overlay.append(&red, 10, 14).unwrap();
    overlay.blank(2).unwrap();
    overlay.append(&blue, 0, 4).unwrap();

    let tractor = Tractor::new(ctx).unwrap();
    tractor.set_track(&background, 0).unwrap();
    tractor.set_track(overlay.producer(), 1).unwrap();

    let brightness = repo.filter("brightness", ctx, Some("0.5")).unwrap();
    tractor.plant_filter(&brightness, 1).unwrap();
    let mix = repo.transition("mix", ctx, None).unwrap();
    mix.set_in_and_out(7, 11).unwrap();
    tractor.plant_transition(&mix, 0, 1).unwrap();
    (tractor, overlay)
}

fn frame_at(tractor: &Tractor, position: Position) -> Frame {
    tractor.seek(position).unwrap();
    tractor.get_frame(0)
}

fn first_pixel(frame: &Frame) -> [u8; 3] {
    let image = frame
        .get_image(ImageRequest::new(ImageFormat::Rgb24, 4, 4))
        .unwrap();
    [image.data()[0], image.data()[1], image.data()[2]]
}

// ── Assembly ───────────────────────────────────────────────────

#[test]
fn tractor_spans_longest_track() {
    let repo = repository();
    let ctx = Context::default();
    let (tractor, overlay) = news_edit(&repo, &ctx);
    assert_eq!(overlay.total_length(), 12);
    assert_eq!(overlay.get_clip_index_at(6), Some(1));
    assert!(overlay.is_blank(1));
    assert_eq!(tractor.count(), 2);
    assert_eq!(tractor.length(), 12);
}

#[test]
fn overlay_shows_through_except_in_gaps() {
    let repo = repository();
    let ctx = Context::default();
    let (tractor, _) = news_edit(&repo, &ctx);

    let red = frame_at(&tractor, 2);
    assert_eq!(red.get("colour").as_deref(), Some("red"));
    assert_eq!(red.position(), 2);
    assert_eq!(first_pixel(&red), [127, 0, 0]);

    let gap = frame_at(&tractor, 5);
    assert_eq!(gap.get("colour").as_deref(), Some("black"));
    assert!(!gap.is_test_card());
}

#[test]
fn crossfade_blends_filtered_overlay_into_background() {
    let repo = repository();
    let ctx = Context::default();
    let (tractor, _) = news_edit(&repo, &ctx);

    let mixed = frame_at(&tractor, 9);
    assert_eq!(mixed.get("colour").as_deref(), Some("black"));
    assert_eq!(mixed.get_double("mix"), 0.5);
    assert_eq!(first_pixel(&mixed), [0, 0, 64]);
}

#[test]
fn null_consumer_plays_whole_edit() {
    let repo = repository();
    let ctx = Context::default();
    let (tractor, _) = news_edit(&repo, &ctx);
    let consumer = repo.consumer("null", &ctx, None).unwrap();
    consumer.set_int("terminate_on_pause", 1).unwrap();
    consumer.connect(tractor.service()).unwrap();

    let shown = Arc::new(Mutex::new(Vec::new()));
    let s = shown.clone();
    consumer
        .listen(CONSUMER_FRAME_SHOW, move |_, args| {
            if let Some(frame) = args[0].as_data().and_then(|d| d.downcast::<Frame>()) {
                s.lock().push(frame.position());
            }
        })
        .unwrap();

    consumer.start().unwrap();
    consumer.wait();
    consumer.stop();
    let shown = shown.lock().clone();
    assert_eq!(shown.len(), 13);
    assert!(shown.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(shown.last(), Some(&11));
    assert_eq!(consumer.get_int("frames"), 13);
}

// ── Repository ─────────────────────────────────────────────────

#[test]
fn unknown_services_are_reported() {
    let repo = repository();
    let ctx = Context::default();
    assert!(matches!(
        repo.filter("sharpen", &ctx, None),
        Err(PluginError::NotFound { kind: ServiceKind::Filter, .. })
    ));
    let colour = repo.producer("colour", &ctx, Some("mauve")).unwrap();
    assert!(colour.get_frame(0).is_test_card());
}

#[test]
fn metadata_survives_yaml() {
    let repo = repository();
    let meta = repo.metadata(ServiceKind::Filter, "brightness").unwrap();
    let yaml = meta.to_yaml().unwrap();
    let back = Properties::from_yaml(&yaml).unwrap();
    assert_eq!(back.get("identifier").as_deref(), Some("brightness"));
    assert_eq!(back.get("type").as_deref(), Some("filter"));
    assert!(back.get_properties("parameters").is_some_and(|p| p.count() >= 1));
}
