//! Frame pipelines: pool reuse, stack order, memoization and test cards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::{Context, Frame, ImageFormat, ImageRequest, MemoryPool, StrataError};
use strata_effects::{BrightnessFilter, ColourProducer, GammaFilter};

// ── Helpers ────────────────────────────────────────────────────

fn rgb(width: u32, height: u32) -> ImageRequest {
    ImageRequest::new(ImageFormat::Rgb24, width, height)
}

fn push_named(frame: &Frame, name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) {
    let order = order.clone();
    frame.push_get_image(move |frame, request| {
        order.lock().push(name);
        frame.get_image(request)
    });
}

// ── Pool ───────────────────────────────────────────────────────

#[test]
fn released_block_is_reused_first() {
    let pool = MemoryPool::new();
    let size = ImageFormat::Rgb24.buffer_size(720, 576);
    let before = pool.idle_count(size);

    let buffer = pool.alloc(size).unwrap();
    let address = buffer.as_ptr();
    pool.release(buffer);
    assert_eq!(pool.idle_count(size), before + 1);

    let again = pool.alloc(size).unwrap();
    assert_eq!(again.as_ptr(), address);
    assert_eq!(pool.idle_count(size), before);
}

#[test]
fn frame_images_return_to_context_pool() {
    let ctx = Context::default();
    let producer = ColourProducer::create(&ctx, Some("blue")).unwrap();
    let size = ImageFormat::Rgb24.buffer_size(32, 32);
    {
        let frame = producer.get_frame(0);
        frame.get_image(rgb(32, 32)).unwrap();
    }
    let idle = ctx.pool().idle_count(size);
    assert!(idle >= 1);
    ctx.pool().purge();
    assert_eq!(ctx.pool().idle_count(size), 0);
}

// ── Image stack ────────────────────────────────────────────────

#[test]
fn last_pushed_transform_runs_first() {
    let ctx = Context::default();
    let frame = Frame::from_context(&ctx, 0);
    let order = Arc::new(Mutex::new(Vec::new()));
    push_named(&frame, "A", &order);
    push_named(&frame, "B", &order);
    push_named(&frame, "C", &order);

    let image = frame.get_image(rgb(8, 8)).unwrap();
    assert_eq!(*order.lock(), ["C", "B", "A"]);
    assert_eq!((image.width(), image.height()), (8, 8));
    assert_eq!(frame.image_stack_len(), 0);
}

#[test]
fn repeated_request_is_served_from_cache() {
    let ctx = Context::default();
    let producer = ColourProducer::create(&ctx, Some("#336699")).unwrap();
    let frame = producer.get_frame(0);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    frame.push_get_image(move |frame, request| {
        c.fetch_add(1, Ordering::SeqCst);
        frame.get_image(request)
    });

    let first = frame.get_image(rgb(16, 16)).unwrap();
    let second = frame.get_image(rgb(16, 16)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.data(), second.data());
    assert_eq!(&second.data()[..3], &[0x33, 0x66, 0x99]);
}

#[test]
fn empty_frame_yields_flat_test_card() {
    let ctx = Context::default();
    let frame = Frame::from_context(&ctx, 0);
    let image = frame.get_image(rgb(64, 64)).unwrap();
    assert_eq!(image.len(), 64 * 64 * ImageFormat::Rgb24.bytes_per_pixel());
    assert!(image.data().iter().all(|&b| b == image.data()[0]));
    assert_eq!(frame.get_int("test_image"), 1);
    assert!(frame.is_test_card());
}

#[test]
fn failing_transform_stops_the_unwind() {
    let ctx = Context::default();
    let frame = Frame::from_context(&ctx, 0);
    let order = Arc::new(Mutex::new(Vec::new()));
    push_named(&frame, "A", &order);
    frame.push_get_image(|_, _| Err(StrataError::Image("decoder gave up".into())));
    push_named(&frame, "C", &order);

    assert!(matches!(frame.get_image(rgb(4, 4)), Err(StrataError::Image(_))));
    assert_eq!(*order.lock(), ["C"]);
    assert_eq!(frame.image_stack_len(), 1);
    assert!(!frame.is_test_card());
}

// ── Filter chains ──────────────────────────────────────────────

#[test]
fn connected_filters_decorate_producer_frames() {
    let ctx = Context::default();
    let producer = ColourProducer::create(&ctx, Some("#808080")).unwrap();
    let brightness = BrightnessFilter::create(&ctx, Some("0.5")).unwrap();
    brightness.connect(producer.service()).unwrap();
    let gamma = GammaFilter::create(&ctx, Some("1")).unwrap();
    gamma.connect(brightness.service()).unwrap();

    let frame = gamma.get_frame(0);
    assert_eq!(frame.get_double("brightness"), 0.5);
    let image = frame.get_image(rgb(2, 2)).unwrap();
    assert_eq!(&image.data()[..3], &[64, 64, 64]);
    assert!(!frame.is_test_card());
}
