//! Null consumer: pulls every frame's image and audio and discards them.
//!
//! Useful for driving a graph to completion, and for benchmarks. Rendered
//! frames are counted in the `frames` property.

use strata_core::{AudioRequest, Consumer, ConsumerImpl, Context, Frame, ImageRequest, Result};

pub struct NullConsumer;

impl NullConsumer {
    pub fn create(ctx: &Context, _arg: Option<&str>) -> Result<Consumer> {
        let consumer = Consumer::new(ctx, NullConsumer);
        consumer.set_int("frames", 0)?;
        Ok(consumer)
    }
}

impl ConsumerImpl for NullConsumer {
    fn render(&self, consumer: &Consumer, frame: &Frame) -> Result<()> {
        frame.get_image(ImageRequest::default())?;
        frame.get_audio(AudioRequest::default())?;
        consumer.set_int64("frames", consumer.get_int64("frames") + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colour::ColourProducer;

    #[test]
    fn test_renders_until_pause() {
        let ctx = Context::default();
        let producer = ColourProducer::create(&ctx, Some("green")).unwrap();
        producer.set_length(12).unwrap();
        let consumer = NullConsumer::create(&ctx, None).unwrap();
        consumer.set_int("terminate_on_pause", 1).unwrap();
        consumer.connect(producer.service()).unwrap();

        consumer.start().unwrap();
        consumer.wait();
        assert!(consumer.is_stopped());
        // Twelve frames plus the held last frame that carries speed 0.
        assert_eq!(consumer.get_int64("frames"), 13);
    }
}
